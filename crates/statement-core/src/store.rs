//! Workflow store: one import session and its action surface
//!
//! The store is the single source of truth for a session. Every action
//! replaces whole fields of the session state under a short synchronous lock,
//! then notifies observers with the events the action produced. Collaborator
//! calls happen outside the lock; their results are applied only if the
//! session they were started for is still current.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::api::{PageRedactor, StatementApi};
use crate::coords::Rect;
use crate::error::{ApiError, WorkflowError};
use crate::preview::{release_all, PreviewHandle, PreviewHost};
use crate::redaction::{RedactionCapture, RedactionRegion, RegionDefaults, Stretch};
use crate::selection::{PageSelection, SelectionState, UploadedFile, PDF_MEDIA_TYPE};
use crate::statement::{StatementData, Transaction, TransactionEditBuffer};
use crate::submit::{plan_submission, ExtractionSubmitter, SubmitWarning};

/// Tunables of a workflow session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Media type accepted on file intake
    pub accepted_media_type: String,
    /// Prefix of generated transaction identifiers
    pub id_prefix: String,
    /// Placement and style of new redaction regions
    pub region_defaults: RegionDefaults,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            accepted_media_type: PDF_MEDIA_TYPE.to_string(),
            id_prefix: "transaction-".to_string(),
            region_defaults: RegionDefaults::default(),
        }
    }
}

/// What changed in the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    FileChanged,
    PageSelectionChanged,
    PreviewUpdated { page: u32 },
    LoadingChanged { loading: bool },
    PreviewsLoadingChanged { loading: bool },
    ErrorChanged,
    WarningChanged,
    StatementChanged,
    DrawingChanged,
    RedactedPageChanged { page: u32 },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Point-in-time copy of the whole session, for rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub file: Option<UploadedFile>,
    pub page_selection: Option<PageSelection>,
    pub statement: Option<StatementData>,
    pub statement_copy: Option<StatementData>,
    pub error: Option<String>,
    pub warning: Option<SubmitWarning>,
    pub is_loading: bool,
    pub previews_loading: bool,
    pub is_drawing_mode: bool,
    pub selected_page_for_drawing: Option<u32>,
    pub capture: Option<RedactionCapture>,
    pub redacted_page_files: BTreeMap<u32, UploadedFile>,
}

/// Result of [`WorkflowStore::submit_selected_pages`]
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// No file or no selected page
    Skipped,
    /// The session was reset or replaced while extraction ran
    Discarded,
    Completed {
        transactions: usize,
        warning: Option<SubmitWarning>,
    },
}

#[derive(Default)]
struct Session {
    selection: SelectionState,
    buffer: TransactionEditBuffer,
    error: Option<String>,
    warning: Option<SubmitWarning>,
    /// Tokens of the submissions still running
    submissions: BTreeSet<u64>,
    /// Token of the preview pass still running
    preview_passes: BTreeSet<u64>,
    capture: Option<RedactionCapture>,
    redacted_page_files: BTreeMap<u32, UploadedFile>,
    epoch: u64,
    /// Ticket of the most recent file intake; older intakes stop writing
    latest_intake: u64,
}

impl Session {
    fn snapshot(&self) -> SessionState {
        SessionState {
            file: self.selection.file().cloned(),
            page_selection: self.selection.page_selection().cloned(),
            statement: self.buffer.committed().cloned(),
            statement_copy: self.buffer.working().cloned(),
            error: self.error.clone(),
            warning: self.warning.clone(),
            is_loading: !self.submissions.is_empty(),
            previews_loading: !self.preview_passes.is_empty(),
            is_drawing_mode: self.capture.is_some(),
            selected_page_for_drawing: self.capture.as_ref().map(RedactionCapture::page),
            capture: self.capture.clone(),
            redacted_page_files: self.redacted_page_files.clone(),
        }
    }

    fn set_error(&mut self, error: Option<String>, events: &mut Vec<StoreEvent>) {
        self.error = error;
        events.push(StoreEvent::ErrorChanged);
    }

    fn check_page(&self, page: u32) -> Result<(), WorkflowError> {
        match self.selection.page_selection() {
            Some(selection) if page == 0 || page > selection.num_pages => {
                Err(WorkflowError::PageOutOfRange {
                    page,
                    num_pages: selection.num_pages,
                })
            }
            _ => Ok(()),
        }
    }

    fn capture_mut(&mut self) -> Result<&mut RedactionCapture, WorkflowError> {
        self.capture.as_mut().ok_or(WorkflowError::NotDrawing)
    }

    fn running(&mut self, flag: Flag) -> &mut BTreeSet<u64> {
        match flag {
            Flag::Loading => &mut self.submissions,
            Flag::PreviewsLoading => &mut self.preview_passes,
        }
    }

    /// Register a running action; the flag turns on with the first one
    fn begin_action(&mut self, flag: Flag, token: u64, events: &mut Vec<StoreEvent>) {
        let running = self.running(flag);
        let was_idle = running.is_empty();
        running.insert(token);
        if was_idle {
            events.push(flag.changed(true));
        }
    }

    /// The flag turns off when the last registered action finishes
    fn finish_action(&mut self, flag: Flag, token: u64, events: &mut Vec<StoreEvent>) {
        let running = self.running(flag);
        if running.remove(&token) && running.is_empty() {
            events.push(flag.changed(false));
        }
    }

    /// Forget every running action, e.g. when their document is replaced
    fn abandon_actions(&mut self, events: &mut Vec<StoreEvent>) {
        for flag in [Flag::Loading, Flag::PreviewsLoading] {
            let running = self.running(flag);
            if !running.is_empty() {
                running.clear();
                events.push(flag.changed(false));
            }
        }
    }

    fn intake_is_current(&self, epoch: u64, ticket: u64) -> bool {
        self.epoch == epoch && self.latest_intake == ticket
    }
}

#[derive(Debug, Clone, Copy)]
enum Flag {
    Loading,
    PreviewsLoading,
}

impl Flag {
    fn changed(self, loading: bool) -> StoreEvent {
        match self {
            Flag::Loading => StoreEvent::LoadingChanged { loading },
            Flag::PreviewsLoading => StoreEvent::PreviewsLoadingChanged { loading },
        }
    }
}

/// Unregisters a running action when it ends, however it ends
struct FlagReset<'a> {
    store: &'a WorkflowStore,
    flag: Flag,
    token: u64,
}

impl Drop for FlagReset<'_> {
    fn drop(&mut self) {
        let (flag, token) = (self.flag, self.token);
        self.store
            .update(|s, events| s.finish_action(flag, token, events));
    }
}

/// Orchestrates one statement import session
pub struct WorkflowStore {
    api: Arc<dyn StatementApi>,
    redactor: Arc<dyn PageRedactor>,
    previews: Arc<dyn PreviewHost>,
    submitter: ExtractionSubmitter,
    config: StoreConfig,
    state: Mutex<Session>,
    preview_pass: tokio::sync::Mutex<()>,
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
    next_subscription: AtomicU64,
    next_action: AtomicU64,
}

impl WorkflowStore {
    pub fn new(
        api: Arc<dyn StatementApi>,
        redactor: Arc<dyn PageRedactor>,
        previews: Arc<dyn PreviewHost>,
    ) -> Self {
        Self::with_config(api, redactor, previews, StoreConfig::default())
    }

    pub fn with_config(
        api: Arc<dyn StatementApi>,
        redactor: Arc<dyn PageRedactor>,
        previews: Arc<dyn PreviewHost>,
        config: StoreConfig,
    ) -> Self {
        let submitter = ExtractionSubmitter::new(Arc::clone(&api), config.id_prefix.clone());
        Self {
            api,
            redactor,
            previews,
            submitter,
            config,
            state: Mutex::new(Session::default()),
            preview_pass: tokio::sync::Mutex::new(()),
            observers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            next_action: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ---- observers ----

    /// Register a callback invoked after every state change.
    ///
    /// Callbacks run outside the state lock and may read the store.
    pub fn subscribe(&self, observer: impl Fn(&StoreEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn update<R>(&self, f: impl FnOnce(&mut Session, &mut Vec<StoreEvent>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut session = self.state.lock();
            f(&mut session, &mut events)
        };
        self.notify(&events);
        result
    }

    fn notify(&self, events: &[StoreEvent]) {
        if events.is_empty() {
            return;
        }
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for event in events {
            for observer in &observers {
                observer(event);
            }
        }
    }

    fn current_epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Token identifying one loading action; unique for the store's lifetime
    fn action_token(&self) -> u64 {
        self.next_action.fetch_add(1, Ordering::Relaxed)
    }

    fn release(&self, handles: Vec<PreviewHandle>) {
        if !handles.is_empty() {
            release_all(self.previews.as_ref(), handles);
        }
    }

    // ---- reads ----

    pub fn snapshot(&self) -> SessionState {
        self.state.lock().snapshot()
    }

    pub fn file(&self) -> Option<UploadedFile> {
        self.state.lock().selection.file().cloned()
    }

    pub fn page_selection(&self) -> Option<PageSelection> {
        self.state.lock().selection.page_selection().cloned()
    }

    pub fn statement(&self) -> Option<StatementData> {
        self.state.lock().buffer.committed().cloned()
    }

    pub fn statement_copy(&self) -> Option<StatementData> {
        self.state.lock().buffer.working().cloned()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn warning(&self) -> Option<SubmitWarning> {
        self.state.lock().warning.clone()
    }

    pub fn is_loading(&self) -> bool {
        !self.state.lock().submissions.is_empty()
    }

    pub fn previews_loading(&self) -> bool {
        !self.state.lock().preview_passes.is_empty()
    }

    pub fn is_drawing_mode(&self) -> bool {
        self.state.lock().capture.is_some()
    }

    pub fn selected_page_for_drawing(&self) -> Option<u32> {
        self.state.lock().capture.as_ref().map(RedactionCapture::page)
    }

    pub fn redacted_page_file(&self, page: u32) -> Option<UploadedFile> {
        self.state.lock().redacted_page_files.get(&page).cloned()
    }

    // ---- whole-field setters ----

    /// Replace the uploaded file. The page selection is left alone.
    pub fn set_file(&self, file: Option<UploadedFile>) {
        self.update(|s, events| {
            s.selection.set_file(file);
            events.push(StoreEvent::FileChanged);
        });
    }

    /// Replace the page selection, releasing previews the new one no longer holds
    pub fn set_page_selection(&self, selection: Option<PageSelection>) {
        let stale = self.update(|s, events| {
            let kept: HashSet<String> = selection
                .iter()
                .flat_map(|sel| sel.previews.iter().map(|h| h.locator.clone()))
                .collect();
            let previous = s.selection.set_page_selection(selection);
            events.push(StoreEvent::PageSelectionChanged);
            previous
                .map(|mut old| old.previews.take_all())
                .unwrap_or_default()
                .into_iter()
                .filter(|h| !kept.contains(&h.locator))
                .collect::<Vec<_>>()
        });
        self.release(stale);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.update(|s, events| s.set_error(error, events));
    }

    /// Store a page preview, releasing the one it supersedes.
    ///
    /// Without a page selection the handle is released immediately.
    pub fn update_page_preview(&self, handle: PreviewHandle) {
        let page = handle.page;
        let stale = self.update(|s, events| match s.selection.page_selection_mut() {
            Some(selection) => {
                events.push(StoreEvent::PreviewUpdated { page });
                selection.previews.insert(handle)
            }
            None => Some(handle),
        });
        self.release(stale.into_iter().collect());
    }

    /// Record the redacted substitute of a page, replacing any previous one
    pub fn set_redacted_page_file(&self, page: u32, file: UploadedFile) {
        self.update(|s, events| {
            s.redacted_page_files.insert(page, file);
            events.push(StoreEvent::RedactedPageChanged { page });
        });
    }

    // ---- file intake ----

    /// Validate the session and the file, then count its pages.
    ///
    /// On acceptance the previous document's selection, previews, redacted
    /// substitutes and drawing state are dropped, and actions still running
    /// for it stop counting as loading. The extracted statement is kept until
    /// the next submission.
    ///
    /// When intakes overlap the most recent one wins. An older intake, or one
    /// interrupted by a reset, leaves the session alone and returns
    /// [`WorkflowError::Superseded`].
    #[instrument(skip(self, file), fields(name = %file.name, size_bytes = file.len()))]
    pub async fn handle_file_change(&self, file: UploadedFile) -> Result<(), WorkflowError> {
        let (epoch, ticket) = self.update(|s, _| {
            s.latest_intake += 1;
            (s.epoch, s.latest_intake)
        });

        let auth = match self.api.auth_check().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Auth check failed");
                let err = WorkflowError::AuthCheckFailed(e.to_string());
                return self.reject_intake(epoch, ticket, err, true);
            }
        };

        if !auth.permits_upload() {
            info!(?auth, "Upload rejected, session not valid");
            return self.reject_intake(epoch, ticket, WorkflowError::NotAuthenticated, false);
        }

        if file.media_type != self.config.accepted_media_type {
            let err = WorkflowError::InvalidFileType {
                media_type: file.media_type.clone(),
            };
            return self.reject_intake(epoch, ticket, err, true);
        }

        let accepted = self.update(|s, events| {
            if !s.intake_is_current(epoch, ticket) {
                return None;
            }
            s.epoch += 1;
            let previous = s.selection.set_page_selection(None);
            s.selection.set_file(Some(file.clone()));
            s.redacted_page_files.clear();
            s.capture = None;
            s.warning = None;
            events.extend([
                StoreEvent::FileChanged,
                StoreEvent::PageSelectionChanged,
                StoreEvent::DrawingChanged,
                StoreEvent::WarningChanged,
            ]);
            s.abandon_actions(events);
            s.set_error(None, events);
            let stale = previous
                .map(|mut old| old.previews.take_all())
                .unwrap_or_default();
            Some((s.epoch, stale))
        });
        let Some((epoch, stale)) = accepted else {
            debug!("Session changed during auth check, dropping file");
            return Err(WorkflowError::Superseded);
        };
        self.release(stale);

        match self.api.page_count(&file).await {
            Ok(count) => self.update(|s, events| {
                if !s.intake_is_current(epoch, ticket) {
                    debug!("Session changed during page count, dropping file");
                    return Err(WorkflowError::Superseded);
                }
                match s.selection.init_selection(count.file_id.clone(), count.num_pages) {
                    Ok(_) => {
                        info!(file_id = %count.file_id, num_pages = count.num_pages, "Page count loaded");
                        events.push(StoreEvent::PageSelectionChanged);
                        Ok(())
                    }
                    Err(e) => {
                        s.selection.set_file(None);
                        events.push(StoreEvent::FileChanged);
                        s.set_error(Some(e.to_string()), events);
                        Err(e)
                    }
                }
            }),
            Err(e) => {
                warn!(error = %e, "Page count failed");
                self.reject_intake(epoch, ticket, WorkflowError::from(e), true)
            }
        }
    }

    /// Record why an intake failed, optionally dropping the file.
    ///
    /// Only the current intake writes; an outdated one reports
    /// [`WorkflowError::Superseded`] instead of `err`.
    fn reject_intake(
        &self,
        epoch: u64,
        ticket: u64,
        err: WorkflowError,
        clear_file: bool,
    ) -> Result<(), WorkflowError> {
        self.update(|s, events| {
            if !s.intake_is_current(epoch, ticket) {
                debug!(error = %err, "Outdated intake failed, session untouched");
                return Err(WorkflowError::Superseded);
            }
            if clear_file {
                s.selection.set_file(None);
                events.push(StoreEvent::FileChanged);
            }
            s.set_error(Some(err.to_string()), events);
            Err(err)
        })
    }

    // ---- previews ----

    /// Render a preview for every page, one page at a time.
    ///
    /// Previews held before the pass are released before the first render.
    /// Each preview is visible as soon as it arrives; a failed page stays
    /// absent. Passes never overlap: a second call waits for the first.
    /// Returns the number of previews stored.
    #[instrument(skip(self))]
    pub async fn load_previews(&self) -> usize {
        let _pass = self.preview_pass.lock().await;
        let token = self.action_token();

        let started = self.update(|s, events| {
            let file = s.selection.file()?.clone();
            let selection = s.selection.page_selection_mut()?;
            let stale = selection.previews.take_all();
            let num_pages = selection.num_pages;
            if !stale.is_empty() {
                events.push(StoreEvent::PageSelectionChanged);
            }
            s.begin_action(Flag::PreviewsLoading, token, events);
            Some((s.epoch, file, num_pages, stale))
        });
        let Some((epoch, file, num_pages, stale)) = started else {
            debug!("No file or page selection, skipping previews");
            return 0;
        };
        let _loading = FlagReset {
            store: self,
            flag: Flag::PreviewsLoading,
            token,
        };
        self.release(stale);

        let mut loaded = 0;
        for page in 1..=num_pages {
            if self.current_epoch() != epoch {
                debug!(page, "Session changed, stopping preview pass");
                break;
            }

            let image = match self.api.render_page(&file, page).await {
                Ok(Some(image)) => image,
                Ok(None) => {
                    debug!(page, "Preview not available");
                    continue;
                }
                Err(e) => {
                    warn!(page, error = %e, "Failed to load preview");
                    continue;
                }
            };

            let handle = match self.previews.publish(page, &image) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(page, error = %e, "Failed to publish preview");
                    continue;
                }
            };

            let stored = self.update(|s, events| {
                if s.epoch != epoch {
                    return Err(handle);
                }
                match s.selection.page_selection_mut() {
                    Some(selection) => {
                        events.push(StoreEvent::PreviewUpdated { page });
                        Ok(selection.previews.insert(handle))
                    }
                    None => Err(handle),
                }
            });
            match stored {
                Ok(superseded) => {
                    loaded += 1;
                    self.release(superseded.into_iter().collect());
                }
                Err(orphan) => {
                    self.release(vec![orphan]);
                    break;
                }
            }
        }

        info!(loaded, num_pages, "Preview pass finished");
        loaded
    }

    // ---- selection ----

    /// Select or deselect a page. Returns false without a page selection.
    pub fn toggle_page(&self, page: u32) -> bool {
        self.update(|s, events| {
            let toggled = s.selection.toggle(page);
            if toggled {
                events.push(StoreEvent::PageSelectionChanged);
            }
            toggled
        })
    }

    // ---- submission ----

    /// Submit the selected pages for extraction.
    ///
    /// The previous statement is cleared while extraction runs and restored if
    /// it fails. Selected pages outside the document are rejected before any
    /// call is made.
    #[instrument(skip(self))]
    pub async fn submit_selected_pages(&self) -> Result<SubmitOutcome, WorkflowError> {
        let token = self.action_token();
        let prepared = self.update(|s, events| {
            if let Some(selection) = s.selection.page_selection() {
                if let Some(&page) = selection.out_of_range().first() {
                    let err = WorkflowError::PageOutOfRange {
                        page,
                        num_pages: selection.num_pages,
                    };
                    s.set_error(Some(err.to_string()), events);
                    return Err(err);
                }
            }

            let Some(plan) = plan_submission(
                s.selection.file(),
                s.selection.page_selection(),
                &s.redacted_page_files,
            ) else {
                return Ok(None);
            };

            s.begin_action(Flag::Loading, token, events);
            s.warning = plan.warning.clone();
            let previous = s.buffer.take();
            events.extend([
                StoreEvent::StatementChanged,
                StoreEvent::WarningChanged,
            ]);
            s.set_error(None, events);
            Ok(Some((s.epoch, plan, previous)))
        })?;

        let Some((epoch, plan, previous)) = prepared else {
            debug!("Nothing selected, skipping submission");
            return Ok(SubmitOutcome::Skipped);
        };
        let _loading = FlagReset {
            store: self,
            flag: Flag::Loading,
            token,
        };

        let result = self.submitter.submit(&plan).await;

        self.update(|s, events| {
            if s.epoch != epoch {
                debug!("Session changed during extraction, discarding result");
                return Ok(SubmitOutcome::Discarded);
            }
            match result {
                Ok(statement) => {
                    let transactions = statement.transactions.len();
                    s.buffer.load(statement);
                    events.push(StoreEvent::StatementChanged);
                    Ok(SubmitOutcome::Completed {
                        transactions,
                        warning: plan.warning.clone(),
                    })
                }
                Err(e) => {
                    warn!(error = %e, "Extraction failed");
                    if s.buffer.is_empty() {
                        s.buffer.restore(previous);
                        events.push(StoreEvent::StatementChanged);
                    }
                    let err = WorkflowError::from(e);
                    s.set_error(Some(err.to_string()), events);
                    Err(err)
                }
            }
        })
    }

    // ---- transaction review ----

    /// Replace the working-copy transaction with the same id
    pub fn adjust_transaction(&self, transaction: Transaction) -> bool {
        self.update(|s, events| {
            let edited = s.buffer.edit(transaction);
            if edited {
                events.push(StoreEvent::StatementChanged);
            }
            edited
        })
    }

    /// Commit the whole working copy into the statement
    pub fn merge_statement(&self) -> bool {
        self.update(|s, events| {
            let merged = s.buffer.commit();
            if merged {
                events.push(StoreEvent::StatementChanged);
            }
            merged
        })
    }

    /// Throw away edits by copying the statement over the working copy
    pub fn reset_statement_copy(&self) {
        self.update(|s, events| {
            s.buffer.discard_edits();
            events.push(StoreEvent::StatementChanged);
        });
    }

    /// Load the user's stored transactions into statement and working copy
    #[instrument(skip(self))]
    pub async fn get_user_transactions(&self) -> Result<usize, WorkflowError> {
        let epoch = self.current_epoch();

        match self.api.user_transactions().await {
            Ok(transactions) => {
                let count = transactions.len();
                self.update(|s, events| {
                    if s.epoch == epoch {
                        s.buffer.replace_transactions(transactions);
                        events.push(StoreEvent::StatementChanged);
                    }
                });
                info!(count, "Loaded user transactions");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch transactions");
                let message = transaction_fetch_message(&e);
                self.update(|s, events| {
                    if s.epoch == epoch {
                        s.set_error(Some(message), events);
                    }
                });
                Err(e.into())
            }
        }
    }

    // ---- redaction ----

    /// Start capturing regions on a page. No-op for the page already being
    /// drawn on; without a page selection nothing happens.
    pub fn enter_drawing_mode(&self, page: u32) -> Result<(), WorkflowError> {
        let defaults = self.config.region_defaults.clone();
        self.update(|s, events| {
            if s.selection.page_selection().is_none() {
                debug!(page, "No page selection, not entering drawing mode");
                return Ok(());
            }
            s.check_page(page)?;
            if s.capture.as_ref().map(RedactionCapture::page) == Some(page) {
                return Ok(());
            }
            s.capture = Some(RedactionCapture::new(page, defaults));
            events.push(StoreEvent::DrawingChanged);
            Ok(())
        })
    }

    /// Leave drawing mode without emitting regions
    pub fn close_drawing_mode(&self) {
        self.update(|s, events| {
            if s.capture.take().is_some() {
                events.push(StoreEvent::DrawingChanged);
            }
        });
    }

    /// Bind the scale of the latest page render
    pub fn bind_render(&self, scale: f64) -> Result<(), WorkflowError> {
        self.update(|s, events| {
            s.capture_mut()?.bind_render(scale)?;
            events.push(StoreEvent::DrawingChanged);
            Ok(())
        })
    }

    /// The surface was resized; saves fail until the next `bind_render`
    pub fn invalidate_render(&self) -> Result<(), WorkflowError> {
        self.update(|s, events| {
            s.capture_mut()?.invalidate_render();
            events.push(StoreEvent::DrawingChanged);
            Ok(())
        })
    }

    pub fn add_region(&self) -> Result<usize, WorkflowError> {
        self.update(|s, events| {
            let index = s.capture_mut()?.add_region();
            events.push(StoreEvent::DrawingChanged);
            Ok(index)
        })
    }

    pub fn update_region(&self, index: usize, rect: Rect, stretch: Stretch) -> Result<(), WorkflowError> {
        self.update(|s, events| {
            s.capture_mut()?.update_region(index, rect, stretch)?;
            events.push(StoreEvent::DrawingChanged);
            Ok(())
        })
    }

    pub fn remove_region(&self, index: usize) -> Result<(), WorkflowError> {
        self.update(|s, events| {
            s.capture_mut()?.remove_region(index)?;
            events.push(StoreEvent::DrawingChanged);
            Ok(())
        })
    }

    pub fn active_region(&self) -> Option<usize> {
        self.state
            .lock()
            .capture
            .as_ref()
            .and_then(RedactionCapture::active_region)
    }

    /// Convert the drawn regions to page units and leave drawing mode.
    ///
    /// Returns the page the regions belong to. On failure drawing mode stays
    /// active so the user can re-render and retry.
    pub fn save_redaction(&self) -> Result<(u32, Vec<RedactionRegion>), WorkflowError> {
        self.update(|s, events| {
            let capture = s.capture.as_ref().ok_or(WorkflowError::NotDrawing)?;
            let regions = capture.save()?;
            let page = capture.page();
            s.capture = None;
            events.push(StoreEvent::DrawingChanged);
            Ok((page, regions))
        })
    }

    /// Produce the redacted substitute for a page and record it
    #[instrument(skip(self, regions), fields(regions = regions.len()))]
    pub async fn apply_redaction(
        &self,
        page: u32,
        regions: &[RedactionRegion],
    ) -> Result<(), WorkflowError> {
        let (epoch, file) = self.update(|s, _| {
            let file = s.selection.file().cloned().ok_or(WorkflowError::NoFile)?;
            s.check_page(page)?;
            Ok::<_, WorkflowError>((s.epoch, file))
        })?;

        match self.redactor.redact_page(&file, page, regions).await {
            Ok(substitute) => {
                self.update(|s, events| {
                    if s.epoch == epoch {
                        s.redacted_page_files.insert(page, substitute);
                        events.push(StoreEvent::RedactedPageChanged { page });
                    }
                });
                info!(page, "Redacted substitute recorded");
                Ok(())
            }
            Err(e) => {
                warn!(page, error = %e, "Redaction failed");
                let err = WorkflowError::from(e);
                self.update(|s, events| {
                    if s.epoch == epoch {
                        s.set_error(Some(err.to_string()), events);
                    }
                });
                Err(err)
            }
        }
    }

    // ---- teardown ----

    /// Restore every field to its initial value and release held previews.
    ///
    /// Results of calls still in flight are discarded when they arrive.
    pub fn reset(&self) {
        let stale = self.update(|s, events| {
            let previews = s
                .selection
                .clear()
                .map(|mut old| old.previews.take_all())
                .unwrap_or_default();
            *s = Session {
                epoch: s.epoch + 1,
                latest_intake: s.latest_intake,
                ..Session::default()
            };
            events.push(StoreEvent::Reset);
            previews
        });
        self.release(stale);
        info!("Session reset");
    }
}

fn transaction_fetch_message(error: &ApiError) -> String {
    match error {
        ApiError::Rejected { status, .. } => format!("HTTP error! status: {}", status),
        other => {
            let text = other.to_string();
            if text.is_empty() {
                "Failed to fetch transactions".to_string()
            } else {
                text
            }
        }
    }
}
