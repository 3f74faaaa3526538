use thiserror::Error;

/// Failure to construct the HTTP transport.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid server url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("http client build failed: {0}")]
    Build(#[from] reqwest::Error),
}
