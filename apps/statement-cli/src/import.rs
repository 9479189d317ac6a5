//! One import session driven end to end

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use statement_core::{
    fit_scale, PreviewHandle, StatementData, SubmitOutcome, SubmitWarning, UploadedFile,
    WorkflowStore, PDF_MEDIA_TYPE,
};
use tracing::{info, warn};

use crate::plan::{PlannedRegion, RedactionPlan, TransactionEdits};

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub file: PathBuf,
    /// Pages to submit, in selection order
    pub pages: Vec<u32>,
    pub load_previews: bool,
    pub redactions: Option<RedactionPlan>,
    pub edits: Option<TransactionEdits>,
    /// Merge the reviewed working copy into the statement
    pub commit: bool,
}

/// What an import produced, printed as JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub file_id: String,
    pub num_pages: u32,
    pub selected_pages: Vec<u32>,
    pub previews: Vec<PreviewHandle>,
    pub redacted_pages: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<SubmitWarning>,
    pub committed: bool,
    pub statement: Option<StatementData>,
    /// Working copy, present only while it differs from the statement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<StatementData>,
}

/// Media type for an input path, judged by its extension
pub fn media_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => PDF_MEDIA_TYPE,
        _ => "application/octet-stream",
    }
}

pub async fn read_upload(path: &Path) -> Result<UploadedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "statement.pdf".to_string());
    Ok(UploadedFile::new(name, media_type_for(path), bytes))
}

pub async fn run_import(store: &WorkflowStore, options: ImportOptions) -> Result<ImportReport> {
    let upload = read_upload(&options.file).await?;
    store
        .handle_file_change(upload.clone())
        .await
        .context("File was not accepted")?;

    if options.load_previews {
        let loaded = store.load_previews().await;
        info!(loaded, "Previews ready");
    }

    for &page in &options.pages {
        store.toggle_page(page);
    }

    if let Some(plan) = &options.redactions {
        for (&page, regions) in &plan.pages {
            redact(store, &upload, plan, page, regions).await?;
        }
    }

    let warning = match store.submit_selected_pages().await.context("Extraction failed")? {
        SubmitOutcome::Completed {
            transactions,
            warning,
        } => {
            info!(transactions, "Statement extracted");
            warning
        }
        SubmitOutcome::Skipped => bail!("No pages selected"),
        SubmitOutcome::Discarded => bail!("Session was replaced during extraction"),
    };

    if let Some(edits) = &options.edits {
        apply_edits(store, edits)?;
    }

    let committed = options.commit && store.merge_statement();
    Ok(report(store, warning, committed))
}

/// Draw the planned regions on `page`, save them and record the substitute
async fn redact(
    store: &WorkflowStore,
    upload: &UploadedFile,
    plan: &RedactionPlan,
    page: u32,
    regions: &[PlannedRegion],
) -> Result<()> {
    let scale = match plan.surface {
        Some(surface) => {
            let (width, height) = statement_redact::page_size(upload.bytes(), page)
                .with_context(|| format!("Cannot read the size of page {}", page))?;
            fit_scale(width, height, surface.width, surface.height)?
        }
        None => 1.0,
    };

    store.enter_drawing_mode(page)?;
    store.bind_render(scale)?;
    for region in regions {
        let index = store.add_region()?;
        store.update_region(index, region.rect, region.stretch)?;
    }
    let (page, saved) = store.save_redaction()?;

    store
        .apply_redaction(page, &saved)
        .await
        .with_context(|| format!("Failed to redact page {}", page))?;
    info!(page, regions = saved.len(), "Page redacted");
    Ok(())
}

fn apply_edits(store: &WorkflowStore, edits: &TransactionEdits) -> Result<()> {
    let working = store
        .statement_copy()
        .ok_or_else(|| anyhow!("No statement to edit"))?;

    for &index in edits.0.keys() {
        if index >= working.transactions.len() {
            bail!(
                "No transaction at position {} (statement has {})",
                index,
                working.transactions.len()
            );
        }
    }

    for (index, transaction) in working.transactions.iter().enumerate() {
        if let Some(edited) = edits.apply(index, transaction) {
            if !store.adjust_transaction(edited) {
                warn!(index, id = %transaction.id, "Edit did not match a transaction");
            }
        }
    }
    Ok(())
}

fn report(store: &WorkflowStore, warning: Option<SubmitWarning>, committed: bool) -> ImportReport {
    let state = store.snapshot();
    let (file_id, num_pages, selected_pages, previews) = match state.page_selection {
        Some(selection) => (
            selection.file_id,
            selection.num_pages,
            selection.selected_pages,
            selection.previews.iter().cloned().collect(),
        ),
        None => (String::new(), 0, Vec::new(), Vec::new()),
    };
    let pending = state
        .statement_copy
        .filter(|copy| state.statement.as_ref() != Some(copy));

    ImportReport {
        file_id,
        num_pages,
        selected_pages,
        previews,
        redacted_pages: state.redacted_page_files.keys().copied().collect(),
        warning,
        committed,
        statement: state.statement,
        pending,
    }
}

/// Load the user's stored transactions through the store
pub async fn run_transactions(store: &WorkflowStore) -> Result<StatementData> {
    let count = store
        .get_user_transactions()
        .await
        .context("Failed to fetch transactions")?;
    info!(count, "Fetched stored transactions");
    Ok(store.statement().unwrap_or_default())
}
