use thiserror::Error;

/// Failure reported by an external collaborator (page count, page render,
/// extraction, redaction, transaction fetch)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The collaborator answered with a non-OK status
    #[error("{}", .message.as_deref().unwrap_or("An error occurred"))]
    Rejected {
        status: u16,
        message: Option<String>,
    },

    /// The request never produced a response
    #[error("{0}")]
    Transport(String),

    /// The response body did not have the expected shape
    #[error("{0}")]
    Decode(String),

    /// A local collaborator failed
    #[error("{0}")]
    Failed(String),
}

impl ApiError {
    /// HTTP-style status of a rejected call
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure of a preview resource host
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Preview resource error: {0}")]
pub struct PreviewError(pub String);

/// Errors surfaced by the import workflow
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("You must be logged in to upload a file")]
    NotAuthenticated,

    #[error("Authentication check failed. Please try signing in again.")]
    AuthCheckFailed(String),

    #[error("Please select a valid PDF file")]
    InvalidFileType { media_type: String },

    #[error("Invalid page count: {0}")]
    InvalidPageCount(u32),

    #[error("Page {page} is outside the document (1-{num_pages})")]
    PageOutOfRange { page: u32, num_pages: u32 },

    #[error("Invalid scale factor: {0}")]
    InvalidScale(f64),

    #[error("Drawing mode is not active")]
    NotDrawing,

    #[error("Page render is not bound, re-render the page before saving")]
    RenderNotBound,

    #[error("Redaction region {0} does not exist")]
    RegionNotFound(usize),

    #[error("No file is loaded")]
    NoFile,

    /// A newer file intake or a reset replaced this one
    #[error("File selection was replaced before it finished")]
    Superseded,

    #[error(transparent)]
    Api(#[from] ApiError),
}
