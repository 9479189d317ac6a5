//! Command-line bank statement import
//!
//! Drives a [`statement_core::WorkflowStore`] session against the HTTP
//! statement API: upload, previews on disk, page selection, redaction,
//! extraction and transaction review.

pub mod import;
pub mod plan;
pub mod previews;

pub use import::{run_import, run_transactions, ImportOptions, ImportReport};
pub use plan::{RedactionPlan, TransactionEdits};
pub use previews::DirectoryPreviewHost;
