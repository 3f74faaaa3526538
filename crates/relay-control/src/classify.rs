use relay_core::ControlError;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

fn error_body(body: &str) -> ErrorBody {
    serde_json::from_str(body).unwrap_or_default()
}

pub(crate) fn transport(e: reqwest::Error) -> ControlError {
    ControlError::Network(e.to_string())
}

/// Reply of a bearer-authenticated or anonymous endpoint.
///
/// `401 invalid_token` mentioning expiry is `TokenExpired`; any other non-success status,
/// or a success body carrying an `error` field, is `Status`.
pub(crate) async fn api_reply(resp: Response) -> Result<String, ControlError> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport)?;
    let err = error_body(&body);

    if status == StatusCode::UNAUTHORIZED
        && err.error.as_deref() == Some("invalid_token")
        && err
            .error_description
            .as_deref()
            .is_some_and(|d| d.contains("expired"))
    {
        return Err(ControlError::TokenExpired);
    }
    if !status.is_success() || err.error.is_some() {
        return Err(ControlError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

/// Reply of the token endpoint. Client errors with a description, and any 401, are `Auth`.
pub(crate) async fn token_reply(resp: Response) -> Result<String, ControlError> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport)?;

    if status.is_client_error() {
        let err = error_body(&body);
        if let Some(desc) = err.error_description.filter(|d| !d.is_empty()) {
            return Err(ControlError::Auth(desc));
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ControlError::Auth(
                err.error.unwrap_or_else(|| "unauthorized".to_string()),
            ));
        }
    }
    if !status.is_success() {
        return Err(ControlError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

pub(crate) async fn blob_reply(resp: Response) -> Result<(), ControlError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ControlError::Status {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ControlError> {
    serde_json::from_str(body)
        .map_err(|e| ControlError::InvalidResponse(format!("{e}, body: {body}")))
}

/// Like [`decode`], but an empty body yields `T::default()`.
pub(crate) fn decode_or_default<T: DeserializeOwned + Default>(body: &str) -> Result<T, ControlError> {
    if body.trim().is_empty() {
        return Ok(T::default());
    }
    decode(body)
}
