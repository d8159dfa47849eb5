use thiserror::Error;

/// Failures surfaced by the client SDK. Domain rejections from the
/// server arrive as `Api` with the status and the server's short
/// message; transport problems stay separate so callers can tell "the
/// server said no" from "the network broke".
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("session storage error: {0}")]
    Storage(String),
}
