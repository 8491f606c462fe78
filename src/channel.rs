//! Progress channel implementations.
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::{JobStatus, ProgressMessage};
use crate::services::{JobQueue, ProgressChannel};

fn receiver_stream(rx: mpsc::UnboundedReceiver<ProgressMessage>) -> BoxStream<'static, ProgressMessage> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|msg| (msg, rx)) }).boxed()
}

/// In-process publish/subscribe hub for hosts that push progress lines.
#[derive(Clone, Default)]
pub struct LocalChannelHub {
    subscribers: Arc<Mutex<HashMap<String, Vec<mpsc::UnboundedSender<ProgressMessage>>>>>,
}

impl LocalChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver to every live subscriber of `channel`; returns how many got it.
    pub async fn publish(&self, channel: &str, msg: ProgressMessage) -> usize {
        let mut guard = self.subscribers.lock().await;
        let Some(senders) = guard.get_mut(channel) else {
            debug!(channel, "publish without subscribers");
            return 0;
        };
        senders.retain(|tx| tx.send(msg.clone()).is_ok());
        senders.len()
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .lock()
            .await
            .get(channel)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProgressChannel for LocalChannelHub {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, ProgressMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .await
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(receiver_stream(rx))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.subscribers.lock().await.remove(channel);
        Ok(())
    }
}

/// Progress derived from the job status query, for hosts without push.
///
/// Emits a line whenever the tracked job changes status and a `done` message
/// once no queued or started job with that name remains.
pub struct PollingProgress {
    jobs: Arc<dyn JobQueue>,
    job_names: HashMap<String, String>,
    interval: Duration,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl PollingProgress {
    /// `job_names` maps channel name to the job name polled for it.
    pub fn new(jobs: Arc<dyn JobQueue>, job_names: HashMap<String, String>, interval: Duration) -> Self {
        Self {
            jobs,
            job_names,
            interval,
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

async fn poll_job(
    jobs: Arc<dyn JobQueue>,
    job_name: String,
    interval: Duration,
    tx: mpsc::UnboundedSender<ProgressMessage>,
) {
    let mut last: Option<JobStatus> = None;
    loop {
        match jobs.list_active_jobs(&JobStatus::ACTIVE).await {
            Ok(active) => {
                let current = active.iter().find(|j| j.job_name == job_name).map(|j| j.status);
                match current {
                    Some(status) if Some(status) != last => {
                        last = Some(status);
                        if tx.send(ProgressMessage::line(format!("{job_name}: {}", status.as_str()))).is_err() {
                            return;
                        }
                    }
                    Some(_) => {}
                    None => {
                        info!(job_name, "job no longer active");
                        let _ = tx.send(ProgressMessage::done(format!("{job_name}: finished")));
                        return;
                    }
                }
            }
            Err(err) => warn!(?err, job_name, "job status poll failed"),
        }
        tokio::time::sleep(interval).await;
    }
}

#[async_trait]
impl ProgressChannel for PollingProgress {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, ProgressMessage>> {
        let job_name = self
            .job_names
            .get(channel)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no job configured for channel {channel}"))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(poll_job(self.jobs.clone(), job_name, self.interval, tx));
        if let Some(previous) = self.tasks.lock().await.insert(channel.to_string(), handle) {
            previous.abort();
        }
        Ok(receiver_stream(rx))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        if let Some(handle) = self.tasks.lock().await.remove(channel) {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionKind, ActiveJob};
    use std::collections::VecDeque;

    #[tokio::test]
    async fn hub_delivers_in_order_until_unsubscribed() {
        let hub = LocalChannelHub::new();
        let mut stream = hub.subscribe("chan").await.unwrap();
        assert_eq!(hub.publish("chan", ProgressMessage::line("A")).await, 1);
        assert_eq!(hub.publish("chan", ProgressMessage::line("B")).await, 1);
        assert_eq!(stream.next().await.unwrap().text, "A");
        assert_eq!(stream.next().await.unwrap().text, "B");

        hub.unsubscribe("chan").await.unwrap();
        assert_eq!(hub.subscriber_count("chan").await, 0);
        assert_eq!(hub.publish("chan", ProgressMessage::line("C")).await, 0);
        assert!(stream.next().await.is_none());
    }

    struct ScriptedJobs {
        polls: Mutex<VecDeque<Vec<ActiveJob>>>,
    }

    #[async_trait]
    impl JobQueue for ScriptedJobs {
        async fn submit_batch(&self, _action: ActionKind, _ids: &str) -> Result<()> {
            Ok(())
        }

        async fn run_single(&self, _action: ActionKind, _id: &str, _resync: bool) -> Result<()> {
            Ok(())
        }

        async fn list_active_jobs(&self, _statuses: &[JobStatus]) -> Result<Vec<ActiveJob>> {
            Ok(self.polls.lock().await.pop_front().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn polling_reports_status_changes_then_done() {
        let job = |status| ActiveJob {
            job_name: "sync-job".into(),
            status,
        };
        let jobs = Arc::new(ScriptedJobs {
            polls: Mutex::new(VecDeque::from(vec![
                vec![job(JobStatus::Queued)],
                vec![job(JobStatus::Queued)],
                vec![job(JobStatus::Started)],
                vec![],
            ])),
        });
        let progress = PollingProgress::new(
            jobs,
            HashMap::from([("sync-chan".to_string(), "sync-job".to_string())]),
            Duration::from_millis(1),
        );
        let stream = progress.subscribe("sync-chan").await.unwrap();
        let msgs: Vec<ProgressMessage> = stream.collect().await;
        assert_eq!(
            msgs,
            vec![
                ProgressMessage::line("sync-job: queued"),
                ProgressMessage::line("sync-job: started"),
                ProgressMessage::done("sync-job: finished"),
            ]
        );
        progress.unsubscribe("sync-chan").await.unwrap();
    }

    #[tokio::test]
    async fn polling_rejects_unknown_channel() {
        let jobs = Arc::new(ScriptedJobs {
            polls: Mutex::new(VecDeque::new()),
        });
        let progress = PollingProgress::new(jobs, HashMap::new(), Duration::from_millis(1));
        assert!(progress.subscribe("nope").await.is_err());
    }
}
