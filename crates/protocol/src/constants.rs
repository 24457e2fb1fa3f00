//! Protocol constants: limits, endpoint paths, and multipart field names.

/// Size of one upload chunk before compression: 7 MiB.
pub const CHUNK_SIZE: usize = 7 * 1024 * 1024;

/// Maximum number of files uploading at the same time.
pub const MAX_CONCURRENT_UPLOADS: usize = 3;

/// Maximum number of chunk requests in flight for a single file.
pub const MAX_CONCURRENT_CHUNKS_PER_FILE: usize = 6;

/// Body the backend returns with a 401 when email/password auth fails.
pub const INVALID_CREDENTIALS_BODY: &str = "Invalid email or password";

/// Suffix appended to the original file name for the compressed chunk part.
pub const CHUNK_FILE_SUFFIX: &str = ".gz";

/// Multipart field names used by the chunk endpoint.
pub mod chunk_fields {
    pub const CHUNK: &str = "chunk";
    pub const CHUNK_INDEX: &str = "chunkIndex";
}

/// Multipart field names used by the finalize endpoint.
pub mod finalize_fields {
    pub const TOTAL_CHUNKS: &str = "totalChunks";
    pub const ORIGINAL_FILE_NAME: &str = "originalFileName";
    pub const COLLECTION_ID: &str = "collectionId";
    pub const TOKEN: &str = "token";
    pub const EMAIL: &str = "email";
    pub const PASSWORD: &str = "password";
}

/// Path of the chunk endpoint for an upload session.
pub fn chunk_path(upload_id: &str) -> String {
    format!("/upload/{upload_id}")
}

/// Path of the finalize endpoint for an upload session.
pub fn finalize_path(upload_id: &str) -> String {
    format!("/upload/success/{upload_id}")
}
