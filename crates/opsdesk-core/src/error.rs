//! Error taxonomy for the dashboard core.
//!
//! Validation and authorization failures surface synchronously to the caller;
//! collaborator failures (store/transport) wrap the underlying reason. A
//! failed send carries the rejected text so the UI can restore the input.

/// Failure from the data store collaborator.
#[derive(Debug, Clone, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Failure from the transport channel collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    Disconnected,
    #[error("call timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Uniform bad-credentials error; never says which field was wrong.
    #[error("invalid email or password")]
    Auth,
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    /// A message send that failed before or during dispatch. `text` is the
    /// unsent input, preserved for resubmission.
    #[error("send failed: {reason}")]
    Send { reason: String, text: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("no active session")]
    NoSession,
}

impl CoreError {
    /// The unsent message text, when this error came from a failed send.
    pub fn unsent_text(&self) -> Option<&str> {
        match self {
            Self::Send { text, .. } => Some(text),
            _ => None,
        }
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Collaborator errors that can represent a timed-out call.
pub(crate) trait TimeoutError {
    fn timed_out() -> Self;
}

impl TimeoutError for StoreError {
    fn timed_out() -> Self {
        Self::new("call timed out")
    }
}

impl TimeoutError for TransportError {
    fn timed_out() -> Self {
        Self::Timeout
    }
}

/// Bound a store or transport call; a hang becomes a reported timeout
/// instead of an indefinite suspension.
pub(crate) async fn call_with_timeout<T, E, F>(
    limit: std::time::Duration,
    fut: F,
) -> Result<T, E>
where
    E: TimeoutError,
    F: std::future::Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(E::timed_out()),
    }
}
