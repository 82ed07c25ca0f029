use reqwest::StatusCode;

/// A non-success response from the backend.
///
/// `message` is the response body with newlines stripped, or the status
/// reason phrase when the body was empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RequestError {
    pub status: StatusCode,
    pub message: String,
}

/// Anything that can go wrong issuing a single backend call
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// Status code of the failed response, if the request got that far
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Request(err) => Some(err.status),
            FetchError::Transport(err) => err.status(),
            FetchError::Decode(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session storage encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to replace session file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Errors surfaced by the session core. None of them are fatal; the worst
/// outcome of any of them is a return to the unauthenticated state.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not start sign-in: {0}")]
    HandshakeInit(#[source] FetchError),
    #[error("stored session is no longer valid: {0}")]
    SessionInvalid(#[source] FetchError),
    #[error("token login failed: {0}")]
    TokenLogin(#[source] FetchError),
    #[error("sign-in failed: {0}")]
    Poll(#[source] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SessionResult<T> = Result<T, SessionError>;
