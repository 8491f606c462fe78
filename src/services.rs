//! Collaborators owned by the host environment.
//!
//! The controller only talks to the outside world through these traits; the
//! HTTP adapter in [`crate::host`] and the test doubles implement them.
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;

use crate::model::{ActionKind, ActiveJob, JobStatus, MergeCandidate, Page, PageQuery, ProgressMessage};

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page>;
}

#[async_trait]
pub trait MergeCheck: Send + Sync {
    /// Returns the subset of `candidates` whose SKU already exists downstream.
    async fn check_merge_required(&self, candidates: &[MergeCandidate]) -> Result<Vec<MergeCandidate>>;
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn submit_batch(&self, action: ActionKind, delimited_ids: &str) -> Result<()>;

    /// Per-row action, executed synchronously by the host. `resync` is set
    /// for rows that were already synced.
    async fn run_single(&self, action: ActionKind, id: &str, resync: bool) -> Result<()>;

    async fn list_active_jobs(&self, statuses: &[JobStatus]) -> Result<Vec<ActiveJob>>;
}

#[async_trait]
pub trait ProgressChannel: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, ProgressMessage>>;
    async fn unsubscribe(&self, channel: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub field: String,
    pub operator: String,
    pub value: String,
}

impl ListFilter {
    /// `field like %value%`
    pub fn contains(field: &str, value: &str) -> Self {
        Self {
            field: field.to_string(),
            operator: "like".to_string(),
            value: format!("%{}%", value),
        }
    }
}

impl fmt::Display for ListFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

#[async_trait]
pub trait Navigator: Send + Sync {
    async fn open_filtered_list(&self, entity_type: &str, filter: &ListFilter) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Caution,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// The person at the screen: answers confirmation gates, reads notices.
#[async_trait]
pub trait Operator: Send + Sync {
    async fn confirm(&self, prompt: &Confirmation) -> bool;
    fn notify(&self, notice: Notice);
}

/// Handles to every collaborator a page needs.
#[derive(Clone)]
pub struct Services {
    pub data: Arc<dyn DataSource>,
    pub merge_check: Arc<dyn MergeCheck>,
    pub jobs: Arc<dyn JobQueue>,
    pub progress: Arc<dyn ProgressChannel>,
    pub navigator: Arc<dyn Navigator>,
    pub operator: Arc<dyn Operator>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
