use thiserror::Error;

/// Result type for index persistence and discovery
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// No index has been saved for the file
    #[error("No index found for {file_id}")]
    NotFound { file_id: String },

    /// Stored index is unreadable or violates its invariants
    #[error("Corrupt index for {file_id}: {reason}")]
    Corrupt { file_id: String, reason: String },

    /// Stored index was written with a different format version
    #[error("Index for {file_id} has format version {found}, expected {expected}")]
    VersionMismatch {
        file_id: String,
        found: u32,
        expected: u32,
    },

    /// The data file changed or disappeared after it was indexed
    #[error("Stale index for {file_id}: {reason}; re-run indexing")]
    Stale { file_id: String, reason: String },

    /// File id with no file name component
    #[error("Invalid file id: '{0}'")]
    InvalidFileId(String),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn corrupt(file_id: &str, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            file_id: file_id.to_string(),
            reason: reason.into(),
        }
    }
}
