//! Bulk action dispatch with a local duplicate-submission guard.
//!
//! The guard here is advisory. The job queue on the host is the real
//! authority on exclusivity; this only keeps a second click from racing the
//! first round trip.
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::ActionSettings;
use crate::error::GridError;
use crate::model::{ActionKind, JobRunState, JobStatus, MergeCandidate, PreflightPolicy};
use crate::progress::ProgressSubscription;
use crate::services::{Confirmation, Notice, Services, Severity};

/// Batch ids travel as one delimiter-joined string.
pub const ID_DELIMITER: &str = ",";

#[derive(Debug, Clone, Default)]
pub struct JobGuard {
    states: HashMap<ActionKind, JobRunState>,
}

impl JobGuard {
    pub fn state(&self, action: ActionKind) -> JobRunState {
        self.states.get(&action).copied().unwrap_or_default()
    }

    pub fn is_running(&self, action: ActionKind) -> bool {
        self.state(action) == JobRunState::Running
    }

    pub fn set(&mut self, action: ActionKind, state: JobRunState) {
        self.states.insert(action, state);
    }
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Submitted {
        dispatch_id: Uuid,
        count: usize,
        merges: usize,
        progress: ProgressSubscription,
    },
    /// The operator backed out at a confirmation gate.
    Declined,
    NothingSelected,
}

#[derive(Debug, Clone, Copy)]
pub struct BulkRequest<'a> {
    pub action: ActionKind,
    pub settings: &'a ActionSettings,
    pub ids: &'a [String],
    /// `(id, sku)` pairs for the merge pre-check.
    pub candidates: &'a [MergeCandidate],
}

#[derive(Debug, Clone, Default)]
pub struct BulkDispatcher {
    guard: JobGuard,
    policy: PreflightPolicy,
}

impl BulkDispatcher {
    pub fn new(policy: PreflightPolicy) -> Self {
        Self {
            guard: JobGuard::default(),
            policy,
        }
    }

    pub fn state(&self, action: ActionKind) -> JobRunState {
        self.guard.state(action)
    }

    /// Called when the progress stream reports done.
    pub fn complete(&mut self, action: ActionKind) {
        self.guard.set(action, JobRunState::Idle);
    }

    /// Ask the job queue whether a job for `action` is queued or started.
    #[instrument(skip_all, fields(action = %action))]
    pub async fn refresh_status(
        &mut self,
        services: &Services,
        action: ActionKind,
        settings: &ActionSettings,
    ) -> Result<JobRunState, GridError> {
        let jobs = services
            .jobs
            .list_active_jobs(&JobStatus::ACTIVE)
            .await
            .map_err(GridError::Fetch)?;
        let state = if jobs
            .iter()
            .any(|j| j.job_name == settings.job_name && j.status.is_active())
        {
            JobRunState::Running
        } else {
            JobRunState::Idle
        };
        self.guard.set(action, state);
        info!(?state, "job status refreshed");
        Ok(state)
    }

    #[instrument(skip_all, fields(action = %req.action, count = req.ids.len()))]
    pub async fn dispatch(
        &mut self,
        services: &Services,
        req: BulkRequest<'_>,
    ) -> Result<DispatchOutcome, GridError> {
        let action = req.action;
        let operator = services.operator.as_ref();

        if self.guard.is_running(action) {
            operator.notify(Notice::info(format!("{} already in progress", action.label())));
            return Err(GridError::ActionInFlight(action));
        }
        if req.ids.is_empty() {
            return Ok(DispatchOutcome::NothingSelected);
        }

        match services.jobs.list_active_jobs(&JobStatus::ACTIVE).await {
            Ok(jobs) if jobs.iter().any(|j| j.job_name == req.settings.job_name) => {
                self.guard.set(action, JobRunState::Running);
                operator.notify(Notice::info(format!("{} already in progress", action.label())));
                return Err(GridError::ActionInFlight(action));
            }
            Ok(_) => {}
            Err(err) => warn!(?err, "job status check failed; trusting local state"),
        }

        let first_gate = Confirmation {
            severity: Severity::Caution,
            message: format!(
                "Are you sure you want to proceed {} these {} products? Careful, this action is irreversible! Proceed anyway?",
                action.progressive().to_lowercase(),
                req.ids.len()
            ),
        };
        if !operator.confirm(&first_gate).await {
            info!("declined at confirmation");
            return Ok(DispatchOutcome::Declined);
        }

        let merges = if action.supports_preflight() {
            self.preflight(services, req.candidates).await?
        } else {
            0
        };
        if merges > 0 {
            let second_gate = Confirmation {
                severity: Severity::Destructive,
                message: format!(
                    "WARNING: {merges} detected items needing to be merged. Proceed to merge them anyway? THIS ACTION CANNOT BE UNDONE."
                ),
            };
            if !operator.confirm(&second_gate).await {
                info!(merges, "declined at merge confirmation");
                return Ok(DispatchOutcome::Declined);
            }
        }

        // Subscribe first so that lines pushed right after acceptance are kept.
        let channel = req.settings.channel.as_str();
        let stream = services
            .progress
            .subscribe(channel)
            .await
            .map_err(|err| GridError::Channel(channel.to_string(), err))?;
        self.guard.set(action, JobRunState::Running);

        let dispatch_id = Uuid::new_v4();
        let joined = req.ids.join(ID_DELIMITER);
        if let Err(err) = services.jobs.submit_batch(action, &joined).await {
            self.guard.set(action, JobRunState::Idle);
            if let Err(unsub) = services.progress.unsubscribe(channel).await {
                warn!(?unsub, "unsubscribe after failed submit");
            }
            let err = GridError::Submit(action, err);
            operator.notify(Notice::error(err.to_string()));
            return Err(err);
        }

        info!(%dispatch_id, count = req.ids.len(), merges, "batch submitted");
        Ok(DispatchOutcome::Submitted {
            dispatch_id,
            count: req.ids.len(),
            merges,
            progress: ProgressSubscription::new(channel, stream),
        })
    }

    async fn preflight(&self, services: &Services, candidates: &[MergeCandidate]) -> Result<usize, GridError> {
        if candidates.is_empty() {
            return Ok(0);
        }
        match services.merge_check.check_merge_required(candidates).await {
            Ok(needing) => Ok(needing.len()),
            Err(err) => match self.policy {
                PreflightPolicy::Proceed => {
                    warn!(?err, "merge pre-check failed; assuming no merges");
                    Ok(0)
                }
                PreflightPolicy::Block => {
                    let err = GridError::Preflight(err);
                    services.operator.notify(Notice::error(err.to_string()));
                    Err(err)
                }
            },
        }
    }
}
