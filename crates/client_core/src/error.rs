use admin_core::ReorderError;
use shared::error::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http transport failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected request ({status}): {}", error.message)]
    Api { status: u16, error: ApiError },
    #[error("admin session required")]
    NotAuthenticated,
    #[error(transparent)]
    Reorder(#[from] ReorderError),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
