//! Bank statement import workflow
//!
//! Drives one import session: file intake, per-page previews, page selection,
//! redaction region capture, extraction submission, and a staged
//! edit-then-commit review of the extracted transactions.
//!
//! The remote services (page count, page rendering, extraction, stored
//! transactions) and the redaction applier are collaborators behind the
//! [`StatementApi`] and [`PageRedactor`] traits; preview images are handed to a
//! [`PreviewHost`].

pub mod api;
pub mod coords;
pub mod error;
pub mod preview;
pub mod redaction;
pub mod selection;
pub mod statement;
pub mod store;
pub mod submit;

pub use api::{AuthStatus, PageCount, PageRedactor, StatementApi};
pub use coords::{fit_scale, to_native, to_pixel, Rect};
pub use error::{ApiError, PreviewError, WorkflowError};
pub use preview::{MemoryPreviewHost, PagePreviewCache, PreviewHandle, PreviewHost};
pub use redaction::{DrawnRegion, RedactionCapture, RedactionRegion, RegionDefaults, Stretch};
pub use selection::{parse_page_list, PageSelection, SelectionState, UploadedFile, PDF_MEDIA_TYPE};
pub use statement::{StatementData, Transaction, TransactionEditBuffer};
pub use store::{SessionState, StoreConfig, StoreEvent, SubmitOutcome, SubscriptionId, WorkflowStore};
pub use submit::{ExtractionRequest, ExtractionSubmitter, SubmissionPlan, SubmitWarning};
