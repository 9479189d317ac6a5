//! Extraction submission: which document and which pages to send

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::StatementApi;
use crate::error::ApiError;
use crate::selection::{PageSelection, UploadedFile};
use crate::statement::StatementData;

/// Non-fatal condition raised while planning a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitWarning {
    /// Several pages are selected and some of them have a redacted
    /// substitute; the unredacted original is submitted instead
    UnredactedFallback {
        redacted_pages: Vec<u32>,
        selected_pages: Vec<u32>,
    },
}

impl fmt::Display for SubmitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitWarning::UnredactedFallback { .. } => write!(
                f,
                "Multiple pages with redactions not yet supported - using original file"
            ),
        }
    }
}

/// Document plus page spec handed to the extraction collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub document: UploadedFile,
    /// Comma-joined page numbers, or "1" for a redacted substitute
    pub pages: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPlan {
    pub request: ExtractionRequest,
    pub warning: Option<SubmitWarning>,
}

/// Join page numbers in selection order
pub fn page_spec(pages: &[u32]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Decide what to submit.
///
/// Returns `None` when there is no file or no selected page.
pub fn plan_submission(
    file: Option<&UploadedFile>,
    selection: Option<&PageSelection>,
    redacted: &BTreeMap<u32, UploadedFile>,
) -> Option<SubmissionPlan> {
    let file = file?;
    let selection = selection?;
    let selected = &selection.selected_pages;
    if selected.is_empty() {
        return None;
    }

    if let [page] = selected.as_slice() {
        if let Some(substitute) = redacted.get(page) {
            return Some(SubmissionPlan {
                request: ExtractionRequest {
                    document: substitute.clone(),
                    pages: "1".to_string(),
                },
                warning: None,
            });
        }
    }

    let redacted_pages: Vec<u32> = selected
        .iter()
        .copied()
        .filter(|p| redacted.contains_key(p))
        .collect();

    let warning = if redacted_pages.is_empty() {
        None
    } else {
        Some(SubmitWarning::UnredactedFallback {
            redacted_pages,
            selected_pages: selected.clone(),
        })
    };

    Some(SubmissionPlan {
        request: ExtractionRequest {
            document: file.clone(),
            pages: page_spec(selected),
        },
        warning,
    })
}

/// Give every transaction a fresh session-local identifier
pub fn assign_session_ids(statement: &mut StatementData, prefix: &str) {
    for transaction in &mut statement.transactions {
        transaction.id = format!("{}{}", prefix, Uuid::new_v4());
    }
}

/// Sends a planned submission to the extraction collaborator
pub struct ExtractionSubmitter {
    api: Arc<dyn StatementApi>,
    id_prefix: String,
}

impl ExtractionSubmitter {
    pub fn new(api: Arc<dyn StatementApi>, id_prefix: impl Into<String>) -> Self {
        Self {
            api,
            id_prefix: id_prefix.into(),
        }
    }

    /// Run the extraction and stamp the result with session identifiers
    #[instrument(skip(self, plan), fields(pages = %plan.request.pages))]
    pub async fn submit(&self, plan: &SubmissionPlan) -> Result<StatementData, ApiError> {
        if let Some(warning) = &plan.warning {
            warn!(warning = ?warning, "{}", warning);
        }

        let mut statement = self.api.extract(&plan.request).await?;
        assign_session_ids(&mut statement, &self.id_prefix);

        info!(
            transactions = statement.transactions.len(),
            "Extraction completed"
        );
        Ok(statement)
    }
}
