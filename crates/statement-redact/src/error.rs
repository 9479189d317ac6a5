use statement_core::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedactError {
    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Page {page} does not exist (document has {page_count} pages)")]
    PageNotFound { page: u32, page_count: u32 },

    #[error("Page {0} has no usable MediaBox")]
    MissingMediaBox(u32),

    #[error("PDF operation failed: {0}")]
    OperationError(String),
}

impl From<RedactError> for ApiError {
    fn from(err: RedactError) -> Self {
        ApiError::Failed(err.to_string())
    }
}
