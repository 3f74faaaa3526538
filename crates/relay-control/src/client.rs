use async_trait::async_trait;
use relay_core::{BlobStore, ControlError, ControlPlane};
use relay_model::{
    AgentInfo, BuildInfo, JobId, JobRecord, PingReply, ReportRecord, SaveLogRecord, StatusUpdate,
    TokenGrant, UploadDestination,
};
use reqwest::{
    Client, RequestBuilder, Response,
    header::{ACCEPT, CONTENT_TYPE},
};
use tracing::{error, info, trace};
use url::Url;

use crate::{
    classify::{self, api_reply, blob_reply, decode, decode_or_default, token_reply},
    config::ControlConfig,
    endpoints,
    error::ClientError,
};

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";
const OCTET: &str = "application/octet-stream";

/// `reqwest`-backed control-server client.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    base: Url,
    client_id: String,
    client_secret: String,
}

impl HttpControlPlane {
    pub fn new(cfg: ControlConfig) -> Result<Self, ClientError> {
        cfg.validate()?;

        let mut raw = cfg.server_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).map_err(|source| ClientError::InvalidUrl {
            url: raw.clone(),
            source,
        })?;

        let mut builder = Client::builder().timeout(cfg.timeout);
        if let Some(proxy) = &cfg.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }

        Ok(Self {
            client: builder.build()?,
            base,
            client_id: cfg.client_id,
            client_secret: cfg.client_secret,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ControlError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| ControlError::Network(format!("invalid endpoint '{path}': {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ControlError> {
        let req = req.build().map_err(classify::transport)?;
        let method = req.method().clone();
        let shown = display_url(req.url());
        trace!(%method, url = %shown, headers = ?req.headers().keys().collect::<Vec<_>>(), "request");

        match self.client.execute(req).await {
            Ok(resp) => {
                info!("{method} {shown} {}", resp.status().as_u16());
                Ok(resp)
            }
            Err(e) => {
                error!(%method, url = %shown, error = %e, "request failed");
                Err(classify::transport(e))
            }
        }
    }

    async fn api(&self, req: RequestBuilder) -> Result<String, ControlError> {
        let resp = self.send(req.header(ACCEPT, JSON)).await?;
        let body = api_reply(resp).await?;
        trace!(body = %body, "response");
        Ok(body)
    }

    async fn token(&self, form: String) -> Result<TokenGrant, ControlError> {
        let url = self.endpoint(endpoints::TOKEN, &[])?;
        let req = self
            .client
            .post(url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(CONTENT_TYPE, FORM)
            .header(ACCEPT, JSON)
            .body(form);
        let body = token_reply(self.send(req).await?).await?;
        decode(&body)
    }
}

/// URL without its query string, which may carry signatures.
fn display_url(url: &Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}

fn form(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn build_info(&self) -> Result<BuildInfo, ControlError> {
        let url = self.endpoint(endpoints::BUILD_INFO, &[])?;
        let body = self.api(self.client.get(url)).await?;
        decode_or_default(&body)
    }

    async fn issue_token(&self, email: &str, password: &str) -> Result<TokenGrant, ControlError> {
        self.token(form(&[
            ("grant_type", "password"),
            ("username", email),
            ("password", password),
        ]))
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ControlError> {
        self.token(form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ]))
        .await
    }

    async fn request_job(
        &self,
        token: &str,
        uuid: &str,
        team_id: &str,
    ) -> Result<JobRecord, ControlError> {
        let url = self.endpoint(endpoints::GET_JOB, &[("uuid", uuid), ("teamId", team_id)])?;
        let body = self.api(self.client.get(url).bearer_auth(token)).await?;
        decode_or_default(&body)
    }

    async fn update_job(&self, token: &str, update: &StatusUpdate) -> Result<(), ControlError> {
        let url = self.endpoint(endpoints::UPDATE_JOB, &[])?;
        self.api(self.client.post(url).bearer_auth(token).json(update))
            .await
            .map(|_| ())
    }

    async fn upload_destination(
        &self,
        token: &str,
        project_id: &str,
    ) -> Result<UploadDestination, ControlError> {
        let url = self.endpoint(endpoints::UPLOAD_URL, &[("projectId", project_id)])?;
        let body = self.api(self.client.get(url).bearer_auth(token)).await?;
        decode(&body)
    }

    async fn save_job_log(&self, token: &str, record: &SaveLogRecord) -> Result<(), ControlError> {
        let mut query = vec![
            ("projectId", record.project_id.as_str()),
            ("jobId", record.job_id.as_str()),
            ("batch", record.batch.as_str()),
            ("folderPath", ""),
            ("fileName", record.file_name.as_str()),
            ("uploadedPath", record.uploaded_path.as_str()),
        ];
        if let Some(old) = record.old_uploaded_path.as_deref() {
            query.push(("oldUploadedPath", old));
        }
        let url = self.endpoint(endpoints::SAVE_LOG, &query)?;
        self.api(self.client.post(url).bearer_auth(token))
            .await
            .map(|_| ())
    }

    async fn save_report(&self, token: &str, record: &ReportRecord) -> Result<(), ControlError> {
        let is_end = record.is_end.to_string();
        let mut query = vec![
            ("projectId", record.project_id.as_str()),
            ("batch", record.batch.as_str()),
            ("folderPath", record.folder_path.as_str()),
            ("fileName", record.file_name.as_str()),
            ("uploadedPath", record.uploaded_path.as_str()),
            ("isEnd", is_end.as_str()),
        ];
        if let Some(session) = record.session_id.as_deref() {
            query.push(("sessionId", session));
        }
        let url = self.endpoint(endpoints::JUNIT_REPORTS, &query)?;
        self.api(self.client.post(url).bearer_auth(token))
            .await
            .map(|_| ())
    }

    async fn notify_job(
        &self,
        token: &str,
        job_id: &JobId,
        project_id: &str,
    ) -> Result<(), ControlError> {
        let path = endpoints::notify_job(job_id.as_str());
        let url = self.endpoint(&path, &[("projectId", project_id)])?;
        self.api(self.client.post(url).bearer_auth(token))
            .await
            .map(|_| ())
    }

    async fn ping_agent(&self, token: &str, info: &AgentInfo) -> Result<PingReply, ControlError> {
        let url = self.endpoint(endpoints::AGENT, &[])?;
        let body = self
            .api(self.client.post(url).bearer_auth(token).json(info))
            .await?;
        decode_or_default(&body)
    }
}

#[async_trait]
impl BlobStore for HttpControlPlane {
    async fn put(
        &self,
        destination: &UploadDestination,
        body: Vec<u8>,
    ) -> Result<(), ControlError> {
        let url = Url::parse(&destination.upload_url).map_err(|e| {
            ControlError::InvalidResponse(format!("invalid upload url: {e}"))
        })?;
        let req = self.client.put(url).header(CONTENT_TYPE, OCTET).body(body);
        blob_reply(self.send(req).await?).await
    }
}
