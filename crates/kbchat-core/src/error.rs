use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{service} call failed: {message}")]
    Collaborator { service: &'static str, message: String },

    #[error("{service} call timed out after {millis}ms")]
    Timeout { service: &'static str, millis: u64 },

    #[error("Request cancelled during {0}")]
    Cancelled(&'static str),
}

impl Error {
    pub fn collaborator(service: &'static str, err: &anyhow::Error) -> Self {
        Self::Collaborator { service, message: format!("{err:#}") }
    }

    /// Validation failures are the caller's fault; everything else is ours.
    pub fn is_client_error(&self) -> bool { matches!(self, Self::Validation(_)) }
}

pub type Result<T> = std::result::Result<T, Error>;
