//! Upload error types.

/// Errors from a single chunk request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request aborted")]
    Aborted,

    #[error("Chunk upload failed ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),
}

/// Errors from a finalize request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FinalizeError {
    /// 401 with the invalid email/password body; eligible for the token fallback.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid finalize response: {0}")]
    Decode(String),
}

/// Errors from the persistent credential store.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Terminal failure of one file upload.
///
/// The `Display` text is what gets shown next to the file.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Encode(#[from] nimbus_transfer::EncodeError),

    /// A chunk request was aborted without a pause or cancel behind it.
    #[error("chunk {index} aborted unexpectedly")]
    TransportAbort { index: u64 },

    #[error("Chunk upload failed ({status}): {body}")]
    TransportHttp { status: u16, body: String },

    #[error("Chunk upload failed: {0}")]
    Network(String),

    /// The anonymous-token retry after a credential rejection also failed.
    #[error("Retry finalization failed: {0}")]
    FinalizationAuth(String),

    #[error("Finalization failed: {0}")]
    Finalization(String),

    #[error("upload incomplete: {completed} of {total} chunks confirmed")]
    Incomplete { completed: u64, total: u64 },

    #[error("credential store error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("upload task failed: {0}")]
    Task(String),
}
