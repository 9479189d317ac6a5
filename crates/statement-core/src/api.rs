//! Contracts of the external collaborators the workflow depends on

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::redaction::RedactionRegion;
use crate::selection::UploadedFile;
use crate::statement::{string_or_number, StatementData, Transaction};
use crate::submit::ExtractionRequest;

/// Session status reported by the auth check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub ok: bool,
    /// Seconds until the session token expires
    pub token_expires_in: i64,
    /// The account has been marked inactive
    pub inactive: bool,
}

impl AuthStatus {
    /// Whether file intake may proceed
    pub fn permits_upload(&self) -> bool {
        self.ok && self.token_expires_in > 0 && !self.inactive
    }
}

/// Answer of the page-count collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCount {
    #[serde(deserialize_with = "string_or_number")]
    pub file_id: String,
    pub num_pages: u32,
}

/// Remote services backing the import workflow
#[async_trait]
pub trait StatementApi: Send + Sync {
    /// Validate the current session
    async fn auth_check(&self) -> Result<AuthStatus, ApiError>;

    /// Count the pages of an uploaded document
    async fn page_count(&self, document: &UploadedFile) -> Result<PageCount, ApiError>;

    /// Render one page to image bytes.
    ///
    /// `Ok(None)` means the collaborator answered with a non-OK status; the
    /// page is skipped rather than treated as a failure.
    async fn render_page(
        &self,
        document: &UploadedFile,
        page: u32,
    ) -> Result<Option<Vec<u8>>, ApiError>;

    /// Extract statement data from the requested pages
    async fn extract(&self, request: &ExtractionRequest) -> Result<StatementData, ApiError>;

    /// Transactions already stored for the user, with their server identifiers
    async fn user_transactions(&self) -> Result<Vec<Transaction>, ApiError>;
}

/// Produces the single-page redacted substitute for one page
#[async_trait]
pub trait PageRedactor: Send + Sync {
    async fn redact_page(
        &self,
        document: &UploadedFile,
        page: u32,
        regions: &[RedactionRegion],
    ) -> Result<UploadedFile, ApiError>;
}
