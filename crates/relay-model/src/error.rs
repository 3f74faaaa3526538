use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("job {job}: missing field '{field}'")]
    MissingField { job: String, field: &'static str },
    #[error("job {job}: unsupported project source '{source_type}'")]
    UnsupportedSource { job: String, source_type: String },
}
