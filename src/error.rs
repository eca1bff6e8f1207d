use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("{id} not found in {context}")]
    NotFound { id: String, context: String },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("cannot {action} {id}: it is already {state}")]
    InvalidStateTransition {
        id: String,
        state: String,
        action: String,
    },

    #[error("no '{command}' adapter registered for provider '{provider}'")]
    ProviderNotFound { provider: String, command: String },

    #[error("invalid id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error("{0}")]
    Backend(String),
}

impl ProviderError {
    /// Stable label used in JSON error output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Authentication(_) => "authentication",
            Self::Authorization(_) => "authorization",
            Self::NotFound { .. } => "not_found",
            Self::Transient(_) => "transient",
            Self::MalformedResponse(_) => "malformed_response",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::ProviderNotFound { .. } => "provider_not_found",
            Self::InvalidId { .. } => "invalid_id",
            Self::Backend(_) => "backend",
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
