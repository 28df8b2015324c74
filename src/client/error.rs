use thiserror::Error;

/// Failure outcome of a single API request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The backend rejected the credentials. Subscribers of the unauthorized
    /// channel have already been notified when this is returned.
    #[error("unauthorized: the configured token was rejected")]
    Unauthorized,
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error(
        "network error: could not reach the API at {base_url} ({reason}); check that the server is running and reachable"
    )]
    Network { base_url: String, reason: String },
    #[error("invalid request: {0}")]
    Validation(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Http { status, .. } => Some(*status),
            Self::Network { .. } | Self::Validation(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
