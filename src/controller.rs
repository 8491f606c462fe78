//! The per-page grid controller.
//!
//! One instance exists per page. It owns the selection, the job guard, the
//! current rows and the log panel, and every handler goes through it.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{ActionSettings, App};
use crate::daterange::DateRange;
use crate::dispatch::{BulkDispatcher, BulkRequest, DispatchOutcome};
use crate::error::GridError;
use crate::mapper::{is_resync, map_records, RowViewModel, SortOrder};
use crate::model::{ActionKind, JobRunState, MergeCandidate, PageQuery, PreflightPolicy};
use crate::pagination::{Cursors, PageDirection};
use crate::progress::{self, LogPanel, ProgressEnd, ProgressSubscription};
use crate::selection::SelectionTracker;
use crate::services::{ListFilter, Notice, Services};
use crate::view::{action_bar, GridView, RowView};

/// Entity opened when an operator inspects an id or SKU.
pub const ITEM_ENTITY: &str = "Item";
pub const ITEM_CODE_FIELD: &str = "item_code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridOptions {
    pub max_batch_size: usize,
    pub preflight_policy: PreflightPolicy,
    pub sort: SortOrder,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            preflight_policy: PreflightPolicy::Proceed,
            sort: SortOrder::CreatedAscending,
        }
    }
}

impl From<&App> for GridOptions {
    fn from(app: &App) -> Self {
        Self {
            max_batch_size: app.max_batch_size,
            preflight_policy: app.preflight_failure,
            ..Self::default()
        }
    }
}

/// Request-scoped freeze; released on drop so an abandoned fetch cannot
/// leave the controls disabled.
struct FreezeGuard(Arc<AtomicBool>);

impl FreezeGuard {
    fn engage(flag: &Arc<AtomicBool>) -> Result<Self, GridError> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(GridError::Busy);
        }
        Ok(Self(flag.clone()))
    }
}

impl Drop for FreezeGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Finished {
        dispatch_id: Uuid,
        count: usize,
        merges: usize,
        end: ProgressEnd,
    },
    Declined,
    NothingSelected,
}

#[derive(Debug)]
pub struct GridController {
    action: ActionKind,
    settings: ActionSettings,
    options: GridOptions,
    services: Services,
    tracker: SelectionTracker,
    dispatcher: BulkDispatcher,
    rows: Vec<RowViewModel>,
    /// Primary SKU of every visible or selected id, so the merge pre-check
    /// covers picks made on other pages.
    skus: HashMap<String, Option<String>>,
    cursors: Cursors,
    range: DateRange,
    default_range: DateRange,
    log: LogPanel,
    frozen: Arc<AtomicBool>,
}

impl GridController {
    pub fn new(
        action: ActionKind,
        settings: ActionSettings,
        options: GridOptions,
        services: Services,
        default_range: DateRange,
    ) -> Self {
        Self {
            action,
            settings,
            dispatcher: BulkDispatcher::new(options.preflight_policy),
            options,
            services,
            tracker: SelectionTracker::new(),
            rows: Vec::new(),
            skus: HashMap::new(),
            cursors: Cursors::default(),
            range: default_range.clone(),
            default_range,
            log: LogPanel::default(),
            frozen: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Page load: first fetch, then pick up a job that is already running.
    #[instrument(skip_all, fields(action = %self.action))]
    pub async fn init(&mut self) -> Result<Option<ProgressSubscription>, GridError> {
        self.load(PageDirection::First).await?;
        match self.refresh_job_status().await {
            Ok(JobRunState::Running) => {
                info!("job already running; following its progress");
                Ok(Some(self.resume_progress().await?))
            }
            Ok(JobRunState::Idle) => Ok(None),
            Err(err) => {
                warn!(%err, "job status unavailable at page load");
                Ok(None)
            }
        }
    }

    pub async fn load(&mut self, direction: PageDirection) -> Result<(), GridError> {
        let cursor = self.cursors.target(direction)?;
        let _freeze = FreezeGuard::engage(&self.frozen)?;
        self.fetch(cursor).await
    }

    async fn fetch(&mut self, cursor: Option<String>) -> Result<(), GridError> {
        // Fold what is checked now into the set before the rows go away.
        let snapshot = self.tracker.snapshot_visible();
        let query = PageQuery {
            range: self.range.clone(),
            cursor: cursor.clone(),
        };
        let page = match self.services.data.fetch_page(&query).await {
            Ok(page) => page,
            Err(err) => {
                let err = GridError::Fetch(err);
                self.services.operator.notify(Notice::error(err.to_string()));
                return Err(err);
            }
        };

        let mapped = map_records(&page.records, &page.merge_flags, self.action, self.options.sort);
        self.tracker.set_rows(mapped.rows.iter().map(|r| r.id.clone()));
        self.tracker.reapply(&snapshot);
        let mut skus: HashMap<String, Option<String>> = mapped
            .rows
            .iter()
            .map(|row| (row.id.clone(), row.primary_sku.clone()))
            .collect();
        for (id, sku) in std::mem::take(&mut self.skus) {
            if self.tracker.is_selected(&id) {
                skus.entry(id).or_insert(sku);
            }
        }
        self.skus = skus;
        self.rows = mapped.rows;
        self.cursors.advance(cursor, &page);
        info!(rows = mapped.total, selected = self.tracker.selected_count(), "page loaded");
        Ok(())
    }

    /// Date filter search. Resets pagination and the selection.
    #[instrument(skip(self))]
    pub async fn search(&mut self, from: &str, to: &str) -> Result<(), GridError> {
        let offset = *self.default_range.from.offset();
        let range = match DateRange::parse_inputs(from, to, &self.default_range, offset) {
            Ok(range) => range,
            Err(err) => {
                self.services.operator.notify(Notice::error(err.to_string()));
                return Err(err);
            }
        };

        let previous = std::mem::replace(&mut self.range, range);
        let previous_cursors = self.cursors.clone();
        self.cursors.reset();
        if let Err(err) = self.load(PageDirection::First).await {
            self.range = previous;
            self.cursors = previous_cursors;
            return Err(err);
        }
        self.tracker.clear();
        Ok(())
    }

    pub async fn next_page(&mut self) -> Result<(), GridError> {
        self.load(PageDirection::Next).await
    }

    pub async fn prev_page(&mut self) -> Result<(), GridError> {
        self.load(PageDirection::Prev).await
    }

    pub fn observe_row_state(&mut self, row_index: usize, record_id: &str, is_checked: bool) -> bool {
        self.tracker.observe_row_state(row_index, record_id, is_checked)
    }

    pub fn observe_snapshot(&mut self, checked: &[bool]) {
        self.tracker.observe_snapshot(checked);
    }

    pub fn toggle_all(&mut self, checked: bool) {
        self.tracker.toggle_all(checked);
    }

    pub fn clear_selection(&mut self) {
        self.tracker.clear();
    }

    /// Capacity-check the selection and hand it to the dispatcher.
    pub async fn dispatch_selected(&mut self) -> Result<DispatchOutcome, GridError> {
        let dropped = self.tracker.enforce_capacity(self.options.max_batch_size);
        if !dropped.is_empty() {
            info!(dropped = dropped.len(), max = self.options.max_batch_size, "selection over batch limit");
        }

        let ids = self.tracker.selected().to_vec();
        let candidates: Vec<MergeCandidate> = self
            .tracker
            .selected()
            .iter()
            .filter_map(|id| {
                let sku = self.skus.get(id)?.as_ref()?;
                Some(MergeCandidate {
                    id: id.to_string(),
                    sku: sku.clone(),
                })
            })
            .collect();

        let outcome = self
            .dispatcher
            .dispatch(
                &self.services,
                BulkRequest {
                    action: self.action,
                    settings: &self.settings,
                    ids: &ids,
                    candidates: &candidates,
                },
            )
            .await?;
        if matches!(outcome, DispatchOutcome::Submitted { .. }) {
            self.log.reset();
        }
        Ok(outcome)
    }

    /// Drain a progress subscription; on completion reload and reset.
    pub async fn follow_progress(&mut self, sub: ProgressSubscription) -> Result<ProgressEnd, GridError> {
        let end = progress::consume(sub, self.services.progress.as_ref(), &mut self.log).await;
        match end {
            ProgressEnd::Done => self.finish_run().await?,
            ProgressEnd::Closed => {
                warn!("progress stream closed before done");
                if let Ok(JobRunState::Idle) = self.refresh_job_status().await {
                    self.finish_run().await?;
                }
            }
        }
        Ok(end)
    }

    async fn finish_run(&mut self) -> Result<(), GridError> {
        let reloaded = self.load(PageDirection::Current).await;
        self.tracker.clear();
        self.dispatcher.complete(self.action);
        info!("bulk run finished");
        reloaded
    }

    /// Dispatch the selection and follow the job to its end.
    pub async fn run_bulk(&mut self) -> Result<RunOutcome, GridError> {
        match self.dispatch_selected().await? {
            DispatchOutcome::Submitted {
                dispatch_id,
                count,
                merges,
                progress,
            } => {
                let end = self.follow_progress(progress).await?;
                Ok(RunOutcome::Finished {
                    dispatch_id,
                    count,
                    merges,
                    end,
                })
            }
            DispatchOutcome::Declined => Ok(RunOutcome::Declined),
            DispatchOutcome::NothingSelected => Ok(RunOutcome::NothingSelected),
        }
    }

    /// Per-row action button.
    #[instrument(skip(self), fields(action = %self.action))]
    pub async fn act_on_row(&mut self, id: &str) -> Result<(), GridError> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(GridError::Busy);
        }
        let synced = self.rows.iter().any(|row| row.id == id && row.synced);
        let resync = is_resync(self.action, synced);
        if let Err(err) = self.services.jobs.run_single(self.action, id, resync).await {
            let err = GridError::Submit(self.action, err);
            self.services.operator.notify(Notice::error(err.to_string()));
            return Err(err);
        }
        self.services.operator.notify(Notice::info(format!(
            "{} finished for product {}",
            self.action.label(),
            id
        )));
        self.load(PageDirection::Current).await
    }

    /// Open the item list filtered on `value` (an id or SKU cell).
    pub async fn inspect(&self, value: &str) -> Result<(), GridError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }
        let filter = ListFilter::contains(ITEM_CODE_FIELD, value);
        self.services
            .navigator
            .open_filtered_list(ITEM_ENTITY, &filter)
            .await
            .map_err(GridError::Navigation)
    }

    pub async fn refresh_job_status(&mut self) -> Result<JobRunState, GridError> {
        self.dispatcher
            .refresh_status(&self.services, self.action, &self.settings)
            .await
    }

    /// Subscribe to the action's channel for a job started elsewhere.
    pub async fn resume_progress(&mut self) -> Result<ProgressSubscription, GridError> {
        let channel = self.settings.channel.clone();
        let stream = self
            .services
            .progress
            .subscribe(&channel)
            .await
            .map_err(|err| GridError::Channel(channel.clone(), err))?;
        self.log.reset();
        Ok(ProgressSubscription::new(channel, stream))
    }

    pub fn view(&self) -> GridView<'_> {
        GridView {
            rows: self
                .rows
                .iter()
                .enumerate()
                .map(|(index, row)| RowView {
                    checked: self.tracker.is_row_checked(index),
                    row,
                })
                .collect(),
            header_checked: self.tracker.header_checked(),
            action_bar: action_bar(
                self.action,
                self.tracker.selected_count(),
                self.options.max_batch_size,
                self.job_state(),
            ),
            controls_enabled: !self.is_frozen(),
            has_next: self.cursors.has_next(),
            has_prev: self.cursors.has_prev(),
            log: &self.log,
        }
    }

    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn rows(&self) -> &[RowViewModel] {
        &self.rows
    }

    pub fn selection(&self) -> &SelectionTracker {
        &self.tracker
    }

    pub fn job_state(&self) -> JobRunState {
        self.dispatcher.state(self.action)
    }

    pub fn log(&self) -> &LogPanel {
        &self.log
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}
