use thiserror::Error;

#[derive(Error, Debug)]
pub enum RythmError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Todo not found in system: {0}")]
    TodoNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Client cannot own this todo for this operation")]
    SelfReactionForbidden,

    #[error("Client needs to own this todo for this operation")]
    NotOwner,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl RythmError {
    /// HTTP status code this error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            RythmError::Validation(_) => 422,
            RythmError::TodoNotFound(_) | RythmError::UserNotFound(_) | RythmError::NotFound(_) => {
                404
            }
            RythmError::SelfReactionForbidden
            | RythmError::NotOwner
            | RythmError::Unauthorized(_) => 401,
            RythmError::Conflict(_) => 409,
            RythmError::StoreUnavailable(_)
            | RythmError::Serialization(_)
            | RythmError::BadRequest(_) => 400,
            RythmError::Provider(_) => 502,
            RythmError::Io(_)
            | RythmError::Config(_)
            | RythmError::Task(_)
            | RythmError::Other(_) => 500,
        }
    }
}

impl From<reqwest::Error> for RythmError {
    fn from(e: reqwest::Error) -> Self {
        RythmError::Provider(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RythmError>;
