//! Workflow store integration tests
//!
//! Drives a full import session against in-memory collaborators.
//!
//! Run with: cargo test -p statement-core --test workflow

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::Semaphore;

use statement_core::{
    ApiError, AuthStatus, ExtractionRequest, MemoryPreviewHost, PageCount, PageRedactor,
    PreviewError, PreviewHandle, PreviewHost, RedactionRegion, SessionState, StatementApi,
    StatementData, StoreEvent, SubmitOutcome, SubmitWarning, Transaction, UploadedFile,
    WorkflowError, WorkflowStore,
};

// ============================================================================
// Fakes
// ============================================================================

struct FakeApi {
    auth: Mutex<Result<AuthStatus, ApiError>>,
    page_count: Mutex<Result<PageCount, ApiError>>,
    failing_pages: Mutex<HashSet<u32>>,
    missing_pages: Mutex<HashSet<u32>>,
    extraction: Mutex<Result<StatementData, ApiError>>,
    extract_gate: Mutex<Option<Arc<Semaphore>>>,
    render_gate: Mutex<Option<Arc<Semaphore>>>,
    auth_gate: Mutex<Option<Arc<Semaphore>>>,
    auth_checks: Mutex<usize>,
    extract_requests: Mutex<Vec<ExtractionRequest>>,
    user_transactions: Mutex<Result<Vec<Transaction>, ApiError>>,
}

fn install_gate(slot: &Mutex<Option<Arc<Semaphore>>>) -> Arc<Semaphore> {
    let gate = Arc::new(Semaphore::new(0));
    *slot.lock() = Some(Arc::clone(&gate));
    gate
}

async fn pass_gate(slot: &Mutex<Option<Arc<Semaphore>>>) {
    let gate = slot.lock().clone();
    if let Some(gate) = gate {
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }
}

impl FakeApi {
    fn new(num_pages: u32) -> Self {
        Self {
            auth: Mutex::new(Ok(AuthStatus {
                ok: true,
                token_expires_in: 3600,
                inactive: false,
            })),
            page_count: Mutex::new(Ok(PageCount {
                file_id: "file-42".to_string(),
                num_pages,
            })),
            failing_pages: Mutex::new(HashSet::new()),
            missing_pages: Mutex::new(HashSet::new()),
            extraction: Mutex::new(Ok(extracted())),
            extract_gate: Mutex::new(None),
            render_gate: Mutex::new(None),
            auth_gate: Mutex::new(None),
            auth_checks: Mutex::new(0),
            extract_requests: Mutex::new(Vec::new()),
            user_transactions: Mutex::new(Ok(Vec::new())),
        }
    }

    /// Hold extraction calls until permits are added to the returned gate,
    /// one call per permit
    fn gate_extraction(&self) -> Arc<Semaphore> {
        install_gate(&self.extract_gate)
    }

    /// Hold page renders, one render per permit
    fn gate_renders(&self) -> Arc<Semaphore> {
        install_gate(&self.render_gate)
    }

    /// Hold auth checks, one check per permit
    fn gate_auth(&self) -> Arc<Semaphore> {
        install_gate(&self.auth_gate)
    }

    fn requests(&self) -> Vec<ExtractionRequest> {
        self.extract_requests.lock().clone()
    }
}

#[async_trait]
impl StatementApi for FakeApi {
    async fn auth_check(&self) -> Result<AuthStatus, ApiError> {
        let status = self.auth.lock().clone();
        *self.auth_checks.lock() += 1;
        pass_gate(&self.auth_gate).await;
        status
    }

    async fn page_count(&self, _document: &UploadedFile) -> Result<PageCount, ApiError> {
        self.page_count.lock().clone()
    }

    async fn render_page(
        &self,
        _document: &UploadedFile,
        page: u32,
    ) -> Result<Option<Vec<u8>>, ApiError> {
        pass_gate(&self.render_gate).await;
        if self.failing_pages.lock().contains(&page) {
            return Err(ApiError::Transport(format!("render of page {} failed", page)));
        }
        if self.missing_pages.lock().contains(&page) {
            return Ok(None);
        }
        Ok(Some(format!("image-{}", page).into_bytes()))
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<StatementData, ApiError> {
        self.extract_requests.lock().push(request.clone());
        pass_gate(&self.extract_gate).await;
        self.extraction.lock().clone()
    }

    async fn user_transactions(&self) -> Result<Vec<Transaction>, ApiError> {
        self.user_transactions.lock().clone()
    }
}

#[derive(Default)]
struct FakeRedactor {
    calls: Mutex<Vec<(u32, usize)>>,
}

#[async_trait]
impl PageRedactor for FakeRedactor {
    async fn redact_page(
        &self,
        _document: &UploadedFile,
        page: u32,
        regions: &[RedactionRegion],
    ) -> Result<UploadedFile, ApiError> {
        self.calls.lock().push((page, regions.len()));
        Ok(UploadedFile::pdf(
            format!("page-{}-redacted.pdf", page),
            b"%PDF-redacted".to_vec(),
        ))
    }
}

/// Memory host that records the order of publish/release calls
#[derive(Default)]
struct RecordingHost {
    inner: MemoryPreviewHost,
    log: Mutex<Vec<String>>,
}

impl PreviewHost for RecordingHost {
    fn publish(&self, page: u32, image: &[u8]) -> Result<PreviewHandle, PreviewError> {
        let handle = self.inner.publish(page, image)?;
        self.log.lock().push(format!("publish {}", handle.locator));
        Ok(handle)
    }

    fn release(&self, handle: &PreviewHandle) -> Result<(), PreviewError> {
        self.log.lock().push(format!("release {}", handle.locator));
        self.inner.release(handle)
    }
}

fn extracted() -> StatementData {
    serde_json::from_value(json!({
        "transactions": [
            { "id": "1", "date": "2024-03-01", "description": "Coffee", "amount": -3.5 },
            { "id": "1", "date": "2024-03-02", "description": "Salary", "amount": 2500.0 }
        ],
        "bank": "Example Bank"
    }))
    .unwrap()
}

fn april_pdf() -> UploadedFile {
    UploadedFile::pdf("april.pdf", b"%PDF april".to_vec())
}

/// Let spawned tasks run until `ready` holds
async fn wait_until(ready: impl Fn() -> bool) {
    while !ready() {
        tokio::task::yield_now().await;
    }
}

fn statement_pdf() -> UploadedFile {
    UploadedFile::pdf("statement.pdf", b"%PDF-1.7 original".to_vec())
}

struct Harness {
    api: Arc<FakeApi>,
    redactor: Arc<FakeRedactor>,
    host: Arc<RecordingHost>,
    store: Arc<WorkflowStore>,
}

fn harness(num_pages: u32) -> Harness {
    let api = Arc::new(FakeApi::new(num_pages));
    let redactor = Arc::new(FakeRedactor::default());
    let host = Arc::new(RecordingHost::default());
    let store = Arc::new(WorkflowStore::new(
        api.clone(),
        redactor.clone(),
        host.clone(),
    ));
    Harness {
        api,
        redactor,
        host,
        store,
    }
}

async fn loaded_harness(num_pages: u32) -> Harness {
    let h = harness(num_pages);
    h.store.handle_file_change(statement_pdf()).await.unwrap();
    h
}

// ============================================================================
// File intake
// ============================================================================

#[tokio::test]
async fn test_file_intake_initializes_selection() {
    let h = loaded_harness(4).await;

    let state = h.store.snapshot();
    assert_eq!(state.file, Some(statement_pdf()));
    assert_eq!(state.error, None);
    let selection = state.page_selection.unwrap();
    assert_eq!(selection.file_id, "file-42");
    assert_eq!(selection.num_pages, 4);
    assert!(selection.selected_pages.is_empty());
    assert!(selection.previews.is_empty());
}

#[tokio::test]
async fn test_expired_session_rejects_upload() {
    let h = harness(2);
    *h.api.auth.lock() = Ok(AuthStatus {
        ok: true,
        token_expires_in: 0,
        inactive: false,
    });

    let result = h.store.handle_file_change(statement_pdf()).await;
    assert_eq!(result, Err(WorkflowError::NotAuthenticated));
    assert_eq!(
        h.store.error().as_deref(),
        Some("You must be logged in to upload a file")
    );
    assert_eq!(h.store.file(), None);
    assert_eq!(h.store.page_selection(), None);
}

#[tokio::test]
async fn test_inactive_account_rejects_upload() {
    let h = harness(2);
    *h.api.auth.lock() = Ok(AuthStatus {
        ok: true,
        token_expires_in: 100,
        inactive: true,
    });

    assert!(h.store.handle_file_change(statement_pdf()).await.is_err());
    assert_eq!(h.store.file(), None);
}

#[tokio::test]
async fn test_unreachable_auth_check_clears_file() {
    let h = loaded_harness(2).await;
    *h.api.auth.lock() = Err(ApiError::Transport("connection refused".into()));

    let result = h.store.handle_file_change(statement_pdf()).await;
    assert!(matches!(result, Err(WorkflowError::AuthCheckFailed(_))));
    assert_eq!(
        h.store.error().as_deref(),
        Some("Authentication check failed. Please try signing in again.")
    );
    assert_eq!(h.store.file(), None);
}

#[tokio::test]
async fn test_non_pdf_is_rejected() {
    let h = harness(2);
    let image = UploadedFile::new("scan.png", "image/png", b"png".to_vec());

    let result = h.store.handle_file_change(image).await;
    assert_eq!(
        result,
        Err(WorkflowError::InvalidFileType {
            media_type: "image/png".to_string()
        })
    );
    assert_eq!(h.store.error().as_deref(), Some("Please select a valid PDF file"));
    assert_eq!(h.store.file(), None);
}

#[tokio::test]
async fn test_page_count_failure_clears_file() {
    let h = harness(2);
    *h.api.page_count.lock() = Err(ApiError::Rejected {
        status: 422,
        message: Some("Encrypted PDFs are not supported".into()),
    });

    assert!(h.store.handle_file_change(statement_pdf()).await.is_err());
    assert_eq!(
        h.store.error().as_deref(),
        Some("Encrypted PDFs are not supported")
    );
    assert_eq!(h.store.file(), None);
    assert_eq!(h.store.page_selection(), None);
}

#[tokio::test]
async fn test_zero_page_document_is_invalid() {
    let h = harness(0);
    let result = h.store.handle_file_change(statement_pdf()).await;
    assert_eq!(result, Err(WorkflowError::InvalidPageCount(0)));
    assert_eq!(h.store.file(), None);
}

#[tokio::test]
async fn test_new_file_replaces_previous_document_state() {
    let h = loaded_harness(3).await;
    h.store.load_previews().await;
    h.store.toggle_page(2);
    h.store.set_redacted_page_file(2, UploadedFile::pdf("r.pdf", b"r".to_vec()));
    assert_eq!(h.host.inner.live_count(), 3);

    *h.api.page_count.lock() = Ok(PageCount {
        file_id: "file-43".to_string(),
        num_pages: 5,
    });
    h.store
        .handle_file_change(UploadedFile::pdf("april.pdf", b"%PDF april".to_vec()))
        .await
        .unwrap();

    let state = h.store.snapshot();
    assert_eq!(h.host.inner.live_count(), 0);
    assert!(state.redacted_page_files.is_empty());
    let selection = state.page_selection.unwrap();
    assert_eq!(selection.file_id, "file-43");
    assert!(selection.selected_pages.is_empty());
}

#[tokio::test]
async fn test_latest_intake_wins_over_earlier_one() {
    let h = harness(3);
    let gate = h.api.gate_auth();

    let first = tokio::spawn({
        let store = Arc::clone(&h.store);
        async move { store.handle_file_change(statement_pdf()).await }
    });
    wait_until(|| *h.api.auth_checks.lock() == 1).await;
    let second = tokio::spawn({
        let store = Arc::clone(&h.store);
        async move { store.handle_file_change(april_pdf()).await }
    });
    wait_until(|| *h.api.auth_checks.lock() == 2).await;

    gate.add_permits(1);
    assert_eq!(first.await.unwrap(), Err(WorkflowError::Superseded));
    assert_eq!(h.store.file(), None);
    assert_eq!(h.store.error(), None);

    gate.add_permits(1);
    second.await.unwrap().unwrap();
    assert_eq!(h.store.file(), Some(april_pdf()));
    assert_eq!(h.store.page_selection().unwrap().num_pages, 3);
}

#[tokio::test]
async fn test_earlier_intake_failure_leaves_latest_alone() {
    let h = loaded_harness(2).await;
    let gate = h.api.gate_auth();

    let first = tokio::spawn({
        let store = Arc::clone(&h.store);
        async move {
            let scan = UploadedFile::new("scan.png", "image/png", b"png".to_vec());
            store.handle_file_change(scan).await
        }
    });
    wait_until(|| *h.api.auth_checks.lock() == 2).await;
    let second = tokio::spawn({
        let store = Arc::clone(&h.store);
        async move { store.handle_file_change(april_pdf()).await }
    });
    wait_until(|| *h.api.auth_checks.lock() == 3).await;

    gate.add_permits(2);
    assert_eq!(first.await.unwrap(), Err(WorkflowError::Superseded));
    second.await.unwrap().unwrap();
    assert_eq!(h.store.file(), Some(april_pdf()));
    assert_eq!(h.store.error(), None);
}

#[tokio::test]
async fn test_reset_during_intake_supersedes_it() {
    let h = harness(3);
    let gate = h.api.gate_auth();

    let intake = tokio::spawn({
        let store = Arc::clone(&h.store);
        async move { store.handle_file_change(statement_pdf()).await }
    });
    wait_until(|| *h.api.auth_checks.lock() == 1).await;

    h.store.reset();
    gate.add_permits(1);

    assert_eq!(intake.await.unwrap(), Err(WorkflowError::Superseded));
    assert_eq!(h.store.snapshot(), SessionState::default());
}

// ============================================================================
// Previews
// ============================================================================

#[tokio::test]
async fn test_preview_failure_is_skipped() {
    let h = loaded_harness(3).await;
    h.api.failing_pages.lock().insert(2);

    let loaded = h.store.load_previews().await;

    assert_eq!(loaded, 2);
    let selection = h.store.page_selection().unwrap();
    assert_eq!(selection.previews.pages().collect::<Vec<_>>(), vec![1, 3]);
    assert!(!h.store.previews_loading());
    assert_eq!(h.store.error(), None);
}

#[tokio::test]
async fn test_non_ok_render_is_skipped() {
    let h = loaded_harness(3).await;
    h.api.missing_pages.lock().insert(1);

    h.store.load_previews().await;
    let selection = h.store.page_selection().unwrap();
    assert_eq!(selection.previews.pages().collect::<Vec<_>>(), vec![2, 3]);
}

#[tokio::test]
async fn test_previews_arrive_incrementally() {
    let h = loaded_harness(3).await;
    h.api.failing_pages.lock().insert(2);

    let seen: Arc<Mutex<Vec<(u32, Vec<u32>, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    let weak = Arc::downgrade(&h.store);
    let sink = Arc::clone(&seen);
    h.store.subscribe(move |event| {
        if let StoreEvent::PreviewUpdated { page } = event {
            if let Some(store) = weak.upgrade() {
                let state = store.snapshot();
                let pages = state
                    .page_selection
                    .map(|s| s.previews.pages().collect())
                    .unwrap_or_default();
                sink.lock().push((*page, pages, state.previews_loading));
            }
        }
    });

    h.store.load_previews().await;

    assert_eq!(
        *seen.lock(),
        vec![(1, vec![1], true), (3, vec![1, 3], true)]
    );
}

#[tokio::test]
async fn test_new_pass_releases_previous_handles_first() {
    let h = loaded_harness(3).await;
    h.store.load_previews().await;
    let first: HashSet<String> = h
        .store
        .page_selection()
        .unwrap()
        .previews
        .iter()
        .map(|handle| handle.locator.clone())
        .collect();
    h.host.log.lock().clear();

    h.store.load_previews().await;

    let log = h.host.log.lock().clone();
    let released: HashSet<String> = log[..3]
        .iter()
        .map(|entry| entry.strip_prefix("release ").unwrap().to_string())
        .collect();
    assert_eq!(released, first);
    assert!(log[3..].iter().all(|entry| entry.starts_with("publish ")));
    assert_eq!(h.host.inner.live_count(), 3);
}

#[tokio::test]
async fn test_overlapping_passes_do_not_leak() {
    let h = loaded_harness(4).await;

    let (a, b) = tokio::join!(h.store.load_previews(), h.store.load_previews());

    assert_eq!(a + b, 8);
    let selection = h.store.page_selection().unwrap();
    assert_eq!(selection.previews.len(), 4);
    assert_eq!(h.host.inner.live_count(), 4);
    for handle in selection.previews.iter() {
        assert!(h.host.inner.image(handle).is_some());
    }
    assert!(!h.store.previews_loading());
}

#[tokio::test]
async fn test_reset_during_preview_pass_releases_late_preview() {
    let h = loaded_harness(3).await;
    let gate = h.api.gate_renders();
    gate.add_permits(1);

    let pass = tokio::spawn({
        let store = Arc::clone(&h.store);
        async move { store.load_previews().await }
    });
    wait_until(|| h.host.inner.live_count() == 1).await;
    assert!(h.store.previews_loading());

    h.store.reset();
    assert_eq!(h.host.inner.live_count(), 0);
    gate.add_permits(1);

    assert_eq!(pass.await.unwrap(), 1);
    assert_eq!(h.host.inner.live_count(), 0);
    assert!(!h.store.previews_loading());
    assert_eq!(h.store.snapshot(), SessionState::default());
}

#[tokio::test]
async fn test_new_file_during_preview_pass_clears_flag_and_releases() {
    let h = loaded_harness(3).await;
    let gate = h.api.gate_renders();
    gate.add_permits(1);

    let flags: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&flags);
    h.store.subscribe(move |event| {
        if let StoreEvent::PreviewsLoadingChanged { loading } = event {
            sink.lock().push(*loading);
        }
    });

    let pass = tokio::spawn({
        let store = Arc::clone(&h.store);
        async move { store.load_previews().await }
    });
    wait_until(|| h.host.inner.live_count() == 1).await;

    h.store.handle_file_change(april_pdf()).await.unwrap();
    assert!(!h.store.previews_loading());
    assert_eq!(h.host.inner.live_count(), 0);

    gate.add_permits(1);
    assert_eq!(pass.await.unwrap(), 1);
    assert_eq!(h.host.inner.live_count(), 0);
    assert!(!h.store.previews_loading());
    assert!(h.store.page_selection().unwrap().previews.is_empty());
    assert_eq!(*flags.lock(), vec![true, false]);

    // A pass for the new file starts from a clean flag
    gate.add_permits(3);
    assert_eq!(h.store.load_previews().await, 3);
    assert_eq!(h.host.inner.live_count(), 3);
    assert!(!h.store.previews_loading());
}

#[tokio::test]
async fn test_previews_without_file_is_noop() {
    let h = harness(3);
    assert_eq!(h.store.load_previews().await, 0);
    assert!(!h.store.previews_loading());
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn test_selected_pages_keep_selection_order() {
    let h = loaded_harness(6).await;
    h.store.toggle_page(2);
    h.store.toggle_page(5);

    let outcome = h.store.submit_selected_pages().await.unwrap();

    assert_eq!(
        outcome,
        SubmitOutcome::Completed {
            transactions: 2,
            warning: None
        }
    );
    let requests = h.api.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].pages, "2,5");
    assert_eq!(requests[0].document, statement_pdf());
}

#[tokio::test]
async fn test_single_redacted_page_submits_substitute() {
    let h = loaded_harness(6).await;
    let substitute = UploadedFile::pdf("page-4-redacted.pdf", b"%PDF redacted".to_vec());
    h.store.set_redacted_page_file(4, substitute.clone());
    h.store.toggle_page(4);

    h.store.submit_selected_pages().await.unwrap();

    let request = &h.api.requests()[0];
    assert_eq!(request.pages, "1");
    assert_eq!(request.document, substitute);
}

#[tokio::test]
async fn test_multi_page_redaction_falls_back_with_warning() {
    let h = loaded_harness(6).await;
    h.store
        .set_redacted_page_file(5, UploadedFile::pdf("r.pdf", b"r".to_vec()));
    h.store.toggle_page(2);
    h.store.toggle_page(5);

    let outcome = h.store.submit_selected_pages().await.unwrap();

    let expected = SubmitWarning::UnredactedFallback {
        redacted_pages: vec![5],
        selected_pages: vec![2, 5],
    };
    assert_eq!(
        outcome,
        SubmitOutcome::Completed {
            transactions: 2,
            warning: Some(expected.clone())
        }
    );
    assert_eq!(h.store.warning(), Some(expected));
    assert_eq!(h.api.requests()[0].document, statement_pdf());
}

#[tokio::test]
async fn test_extraction_assigns_session_ids() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(1);
    h.store.submit_selected_pages().await.unwrap();

    let statement = h.store.statement().unwrap();
    assert_eq!(h.store.statement_copy(), Some(statement.clone()));
    assert_eq!(statement.metadata.get("bank"), Some(&json!("Example Bank")));

    let ids: HashSet<&str> = statement.transactions.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| id.starts_with("transaction-")));
    assert!(!h.store.is_loading());
}

#[tokio::test]
async fn test_submit_without_selection_is_skipped() {
    let h = loaded_harness(2).await;
    assert_eq!(
        h.store.submit_selected_pages().await.unwrap(),
        SubmitOutcome::Skipped
    );

    let empty = harness(2);
    assert_eq!(
        empty.store.submit_selected_pages().await.unwrap(),
        SubmitOutcome::Skipped
    );
    assert!(h.api.requests().is_empty());
    assert_eq!(h.store.error(), None);
}

#[tokio::test]
async fn test_out_of_range_page_is_rejected_before_submission() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(1);
    h.store.toggle_page(7);

    let result = h.store.submit_selected_pages().await;
    assert_eq!(
        result,
        Err(WorkflowError::PageOutOfRange {
            page: 7,
            num_pages: 2
        })
    );
    assert!(h.api.requests().is_empty());
    assert!(!h.store.is_loading());
}

#[tokio::test]
async fn test_extraction_failure_keeps_previous_statement() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(1);
    h.store.submit_selected_pages().await.unwrap();

    let mut edited = h.store.statement_copy().unwrap().transactions[0].clone();
    edited.set_field("amount", -4.0);
    h.store.adjust_transaction(edited);
    let before = h.store.snapshot();

    *h.api.extraction.lock() = Err(ApiError::Rejected {
        status: 400,
        message: Some("No transactions found".into()),
    });
    let result = h.store.submit_selected_pages().await;

    assert!(result.is_err());
    let after = h.store.snapshot();
    assert_eq!(after.error.as_deref(), Some("No transactions found"));
    assert_eq!(after.statement, before.statement);
    assert_eq!(after.statement_copy, before.statement_copy);
    assert!(!after.is_loading);
}

#[tokio::test]
async fn test_failure_without_message_uses_generic_text() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(2);
    *h.api.extraction.lock() = Err(ApiError::Rejected {
        status: 500,
        message: None,
    });

    assert!(h.store.submit_selected_pages().await.is_err());
    assert_eq!(h.store.error().as_deref(), Some("An error occurred"));
    assert_eq!(h.store.statement(), None);
}

#[tokio::test]
async fn test_loading_flag_brackets_extraction() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(1);

    let flags: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&flags);
    h.store.subscribe(move |event| {
        if let StoreEvent::LoadingChanged { loading } = event {
            sink.lock().push(*loading);
        }
    });

    h.store.submit_selected_pages().await.unwrap();
    assert_eq!(*flags.lock(), vec![true, false]);
}

#[tokio::test]
async fn test_reset_during_extraction_discards_result() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(1);
    let gate = h.api.gate_extraction();

    let task = tokio::spawn({
        let store = Arc::clone(&h.store);
        async move { store.submit_selected_pages().await }
    });
    while !h.store.is_loading() {
        tokio::task::yield_now().await;
    }

    h.store.reset();
    gate.add_permits(1);

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, SubmitOutcome::Discarded);
    assert_eq!(h.store.snapshot(), SessionState::default());
}

#[tokio::test]
async fn test_new_file_during_extraction_discards_and_clears_loading() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(1);
    let gate = h.api.gate_extraction();

    let task = tokio::spawn({
        let store = Arc::clone(&h.store);
        async move { store.submit_selected_pages().await }
    });
    wait_until(|| h.store.is_loading()).await;

    h.store.handle_file_change(april_pdf()).await.unwrap();
    assert!(!h.store.is_loading());
    gate.add_permits(1);

    assert_eq!(task.await.unwrap().unwrap(), SubmitOutcome::Discarded);
    assert!(!h.store.is_loading());
    assert_eq!(h.store.statement(), None);
    assert_eq!(h.store.file(), Some(april_pdf()));

    h.store.toggle_page(2);
    gate.add_permits(1);
    assert!(matches!(
        h.store.submit_selected_pages().await.unwrap(),
        SubmitOutcome::Completed { .. }
    ));
    assert!(!h.store.is_loading());
}

#[tokio::test]
async fn test_overlapping_submissions_stay_loading_until_last_ends() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(1);
    let gate = h.api.gate_extraction();

    let flags: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&flags);
    h.store.subscribe(move |event| {
        if let StoreEvent::LoadingChanged { loading } = event {
            sink.lock().push(*loading);
        }
    });

    let submit = || {
        let store = Arc::clone(&h.store);
        tokio::spawn(async move { store.submit_selected_pages().await })
    };
    let first = submit();
    wait_until(|| h.api.requests().len() == 1).await;
    let second = submit();
    wait_until(|| h.api.requests().len() == 2).await;

    gate.add_permits(1);
    assert!(matches!(
        first.await.unwrap().unwrap(),
        SubmitOutcome::Completed { .. }
    ));
    assert!(h.store.is_loading());

    gate.add_permits(1);
    assert!(matches!(
        second.await.unwrap().unwrap(),
        SubmitOutcome::Completed { .. }
    ));
    assert!(!h.store.is_loading());
    assert_eq!(*flags.lock(), vec![true, false]);
}

// ============================================================================
// Transaction review
// ============================================================================

#[tokio::test]
async fn test_edit_merge_and_discard() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(1);
    h.store.submit_selected_pages().await.unwrap();

    let committed = h.store.statement().unwrap();
    let mut edited = committed.transactions[1].clone();
    edited.set_field("description", "Monthly salary");

    assert!(h.store.adjust_transaction(edited.clone()));
    assert_eq!(h.store.statement(), Some(committed.clone()));
    assert_eq!(h.store.statement_copy().unwrap().transactions[1], edited);

    h.store.reset_statement_copy();
    assert_eq!(h.store.statement_copy(), Some(committed));

    h.store.adjust_transaction(edited.clone());
    assert!(h.store.merge_statement());
    let merged = h.store.statement().unwrap();
    assert_eq!(merged.transactions[1], edited);

    h.store.reset_statement_copy();
    assert_eq!(h.store.statement_copy(), Some(merged));
}

#[tokio::test]
async fn test_adjust_unknown_transaction_is_noop() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(1);
    h.store.submit_selected_pages().await.unwrap();
    let before = h.store.statement_copy();

    assert!(!h.store.adjust_transaction(Transaction::new("missing")));
    assert_eq!(h.store.statement_copy(), before);
}

#[tokio::test]
async fn test_user_transactions_overwrite_both_copies() {
    let h = loaded_harness(2).await;
    h.store.toggle_page(1);
    h.store.submit_selected_pages().await.unwrap();

    let stored = vec![
        Transaction::new("981").with_field("amount", 12.0),
        Transaction::new("982").with_field("amount", -7.25),
    ];
    *h.api.user_transactions.lock() = Ok(stored.clone());

    assert_eq!(h.store.get_user_transactions().await.unwrap(), 2);
    let state = h.store.snapshot();
    assert_eq!(state.statement.as_ref().unwrap().transactions, stored);
    assert_eq!(state.statement_copy.as_ref().unwrap().transactions, stored);
    assert_eq!(
        state.statement.unwrap().metadata.get("bank"),
        Some(&json!("Example Bank"))
    );
}

#[tokio::test]
async fn test_user_transactions_failure_reports_status() {
    let h = harness(1);
    *h.api.user_transactions.lock() = Err(ApiError::Rejected {
        status: 500,
        message: None,
    });

    assert!(h.store.get_user_transactions().await.is_err());
    assert_eq!(h.store.error().as_deref(), Some("HTTP error! status: 500"));
    assert_eq!(h.store.statement(), None);
}

// ============================================================================
// Redaction
// ============================================================================

#[tokio::test]
async fn test_drawing_flow_produces_substitute() {
    let h = loaded_harness(3).await;

    h.store.enter_drawing_mode(2).unwrap();
    assert!(h.store.is_drawing_mode());
    assert_eq!(h.store.selected_page_for_drawing(), Some(2));

    h.store.bind_render(2.0).unwrap();
    h.store.add_region().unwrap();
    assert_eq!(h.store.active_region(), Some(0));

    let (page, regions) = h.store.save_redaction().unwrap();
    assert_eq!(page, 2);
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].rect(), statement_core::Rect::new(50.0, 50.0, 200.0, 20.0));
    assert!(!h.store.is_drawing_mode());

    h.store.apply_redaction(page, &regions).await.unwrap();
    assert_eq!(*h.redactor.calls.lock(), vec![(2, 1)]);
    assert!(h.store.redacted_page_file(2).is_some());

    h.store.toggle_page(2);
    h.store.submit_selected_pages().await.unwrap();
    assert_eq!(h.api.requests()[0].pages, "1");
}

#[tokio::test]
async fn test_enter_drawing_mode_same_page_keeps_regions() {
    let h = loaded_harness(3).await;
    h.store.enter_drawing_mode(1).unwrap();
    h.store.add_region().unwrap();

    h.store.enter_drawing_mode(1).unwrap();
    assert_eq!(h.store.snapshot().capture.unwrap().regions().len(), 1);

    h.store.enter_drawing_mode(3).unwrap();
    let state = h.store.snapshot();
    assert_eq!(state.selected_page_for_drawing, Some(3));
    assert!(state.capture.unwrap().regions().is_empty());
}

#[tokio::test]
async fn test_resize_requires_rebind_before_save() {
    let h = loaded_harness(1).await;
    h.store.enter_drawing_mode(1).unwrap();
    h.store.bind_render(1.0).unwrap();
    h.store.add_region().unwrap();

    h.store.invalidate_render().unwrap();
    assert_eq!(h.store.save_redaction(), Err(WorkflowError::RenderNotBound));
    assert!(h.store.is_drawing_mode());

    h.store.bind_render(0.5).unwrap();
    let (_, regions) = h.store.save_redaction().unwrap();
    assert_eq!(regions[0].left, 100.0);
    assert_eq!(regions[0].width, 400.0);
}

#[tokio::test]
async fn test_close_drawing_mode_emits_nothing() {
    let h = loaded_harness(1).await;
    h.store.enter_drawing_mode(1).unwrap();
    h.store.add_region().unwrap();
    h.store.close_drawing_mode();

    assert!(!h.store.is_drawing_mode());
    assert_eq!(h.store.add_region(), Err(WorkflowError::NotDrawing));
    assert!(h.redactor.calls.lock().is_empty());
}

#[tokio::test]
async fn test_drawing_on_missing_page_is_rejected() {
    let h = loaded_harness(2).await;
    assert_eq!(
        h.store.enter_drawing_mode(3),
        Err(WorkflowError::PageOutOfRange {
            page: 3,
            num_pages: 2
        })
    );
    assert!(!h.store.is_drawing_mode());
}

// ============================================================================
// Reset and observers
// ============================================================================

#[tokio::test]
async fn test_reset_restores_initial_state() {
    let h = loaded_harness(3).await;
    h.store.load_previews().await;
    h.store.toggle_page(1);
    h.store.set_redacted_page_file(1, UploadedFile::pdf("r.pdf", b"r".to_vec()));
    h.store.submit_selected_pages().await.unwrap();
    h.store.enter_drawing_mode(2).unwrap();
    h.store.set_error(Some("stale".into()));

    h.store.reset();

    assert_eq!(h.store.snapshot(), SessionState::default());
    assert_eq!(h.host.inner.live_count(), 0);
}

#[tokio::test]
async fn test_unsubscribe_stops_notifications() {
    let h = loaded_harness(3).await;
    let count = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&count);
    let id = h.store.subscribe(move |_| *sink.lock() += 1);

    h.store.toggle_page(1);
    assert_eq!(*count.lock(), 1);

    assert!(h.store.unsubscribe(id));
    h.store.toggle_page(2);
    assert_eq!(*count.lock(), 1);
    assert!(!h.store.unsubscribe(id));
}

#[tokio::test]
async fn test_set_page_selection_releases_dropped_previews() {
    let h = loaded_harness(2).await;
    h.store.load_previews().await;
    assert_eq!(h.host.inner.live_count(), 2);

    let mut selection = h.store.page_selection().unwrap();
    selection.toggle(1);
    h.store.set_page_selection(Some(selection));
    assert_eq!(h.host.inner.live_count(), 2);

    h.store.set_page_selection(None);
    assert_eq!(h.host.inner.live_count(), 0);
}
