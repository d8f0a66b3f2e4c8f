use reqwest::StatusCode;
use shared::domain::TemplateId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("unknown template {0}")]
    UnknownTemplate(TemplateId),
    #[error("parameter prompt failed: {source}")]
    Prompt { source: anyhow::Error },
}

impl ClientError {
    pub fn is_unknown_template(&self) -> bool {
        matches!(self, ClientError::UnknownTemplate(_))
    }
}
