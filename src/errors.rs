use axum::http::StatusCode;
use thiserror::Error;

/// Failure writing to the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("every sync read failed")]
    SyncFailed,
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

/// Errors surfaced by session controller operations. Invariant violations are
/// raised before any state is touched.
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("at least one counter must remain")]
    LastCounter,

    #[error("cannot complete a session with a count of zero")]
    EmptySession,

    #[error("count must be greater than zero")]
    InvalidCount,

    #[error("counter name must not be empty")]
    EmptyName,

    #[error("invalid session date: {0}")]
    InvalidDate(String),

    #[error("unknown counter: {0}")]
    UnknownCounter(String),

    #[error("counter already exists: {0}")]
    DuplicateCounter(String),

    #[error("no active counter")]
    NoActiveCounter,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<TallyError> for AppError {
    fn from(err: TallyError) -> Self {
        match err {
            TallyError::LastCounter | TallyError::DuplicateCounter(_) => Self {
                status: StatusCode::CONFLICT,
                message: err.to_string(),
            },
            TallyError::EmptySession
            | TallyError::InvalidCount
            | TallyError::EmptyName
            | TallyError::InvalidDate(_)
            | TallyError::NoActiveCounter => Self::bad_request(err.to_string()),
            TallyError::UnknownCounter(_) => Self::not_found(err.to_string()),
            TallyError::Store(inner) => Self::internal(inner),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
