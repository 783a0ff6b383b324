//! crates/doc_library_core/src/error.rs
//!
//! The error type returned by every `DataService` operation.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A backend failure, propagated unchanged.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(#[from] PortError),

    /// A point lookup matched no row.
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("File size exceeds {}MB limit ({size} bytes)", .limit / 1024 / 1024)]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Could not decode image: {0}")]
    ImageDecode(String),

    /// A file payload that is not a well-formed `data:` payload.
    #[error("Invalid file payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Maps a backend `NotFound` on a point lookup to the typed variant and
    /// leaves every other failure untouched.
    pub(crate) fn lookup(resource: &'static str, id: impl ToString) -> impl FnOnce(PortError) -> Self {
        let id = id.to_string();
        move |e| match e {
            PortError::NotFound(_) => CoreError::NotFound { resource, id },
            other => CoreError::BackendUnavailable(other),
        }
    }
}
