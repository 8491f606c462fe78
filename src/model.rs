use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::daterange::DateRange;

/// The bulk operation a page offers. Each page owns exactly one family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Sync,
    Rename,
    Reconcile,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Sync => "sync",
            ActionKind::Rename => "rename",
            ActionKind::Reconcile => "reconcile",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Sync => "Sync",
            ActionKind::Rename => "Rename",
            ActionKind::Reconcile => "Reconcile",
        }
    }

    pub fn progressive(&self) -> &'static str {
        match self {
            ActionKind::Sync => "Syncing",
            ActionKind::Rename => "Renaming",
            ActionKind::Reconcile => "Reconciling",
        }
    }

    /// Only reconciliation can collide with an existing item code.
    pub fn supports_preflight(&self) -> bool {
        matches!(self, ActionKind::Reconcile)
    }

    pub fn all() -> [ActionKind; 3] {
        [ActionKind::Sync, ActionKind::Rename, ActionKind::Reconcile]
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown action '{0}' (expected sync, rename or reconcile)")]
pub struct ParseActionError(String);

impl FromStr for ActionKind {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(ActionKind::Sync),
            "rename" => Ok(ActionKind::Rename),
            "reconcile" => Ok(ActionKind::Reconcile),
            other => Err(ParseActionError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobRunState {
    #[default]
    Idle,
    Running,
}

/// What to do when the merge pre-check call itself fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreflightPolicy {
    /// Treat the failure as "nothing needs merging".
    #[default]
    Proceed,
    /// Abort the bulk action.
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variant {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sku: String,
}

/// Product snapshot as returned by the remote store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteRecord {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub synced: bool,
}

impl RemoteRecord {
    /// First non-empty variant SKU.
    pub fn primary_sku(&self) -> Option<&str> {
        self.variants
            .iter()
            .map(|v| v.sku.as_str())
            .find(|sku| !sku.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<RemoteRecord>,
    /// Merge requirement by record id, when the source knows it.
    pub merge_flags: HashMap<String, bool>,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub range: DateRange,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeCandidate {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sku: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Started,
    Finished,
    Failed,
    Stopped,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
            JobStatus::Unknown => "unknown",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Started)
    }

    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Queued, JobStatus::Started];
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveJob {
    pub job_name: String,
    pub status: JobStatus,
}

/// One push from a job's progress channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressMessage {
    #[serde(alias = "message", default)]
    pub text: String,
    #[serde(default)]
    pub done: bool,
}

impl ProgressMessage {
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
        }
    }

    pub fn done(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: true,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// Store ids arrive as JSON numbers; everything downstream keys on strings.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(u64),
        Text(String),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Num(n) => n.to_string(),
        RawId::Text(s) => s.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_from_store_json() {
        let rec: RemoteRecord = serde_json::from_value(serde_json::json!({
            "id": 8123456789u64,
            "title": "Linen Shirt",
            "created_at": "2024-08-30T17:28:18-04:00",
            "variants": [{"sku": null}, {"sku": "LS-01"}],
        }))
        .unwrap();
        assert_eq!(rec.id, "8123456789");
        assert!(!rec.synced);
        assert_eq!(rec.variants[0].sku, "");
        assert_eq!(rec.primary_sku(), Some("LS-01"));
    }

    #[test]
    fn action_parsing() {
        assert_eq!("Reconcile".parse::<ActionKind>().unwrap(), ActionKind::Reconcile);
        assert!("merge".parse::<ActionKind>().is_err());
        assert!(ActionKind::Reconcile.supports_preflight());
        assert!(!ActionKind::Sync.supports_preflight());
    }

    #[test]
    fn progress_message_accepts_message_alias() {
        let msg: ProgressMessage =
            serde_json::from_str(r#"{"message": "Synced 1 of 3", "done": false}"#).unwrap();
        assert_eq!(msg, ProgressMessage::line("Synced 1 of 3"));
    }

    #[test]
    fn job_status_unknown_values() {
        let job: ActiveJob =
            serde_json::from_str(r#"{"job_name": "x", "status": "deferred"}"#).unwrap();
        assert_eq!(job.status, JobStatus::Unknown);
        assert!(!job.status.is_active());
    }
}
