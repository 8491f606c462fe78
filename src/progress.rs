//! Progress stream consumption into the append-only log panel.
use futures::stream::{BoxStream, StreamExt};
use std::fmt;
use tracing::{debug, instrument, warn};

use crate::model::ProgressMessage;
use crate::services::ProgressChannel;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPanel {
    entries: Vec<String>,
    visible: bool,
}

impl LogPanel {
    /// Clear and show the panel for a new run.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.visible = true;
    }

    pub fn append(&mut self, text: impl Into<String>) {
        self.entries.push(text.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn text(&self) -> String {
        self.entries.join("\n")
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// The panel is always scrolled to its newest entry.
    pub fn scroll_position(&self) -> Option<usize> {
        self.entries.len().checked_sub(1)
    }
}

/// A live subscription to one action's progress channel.
pub struct ProgressSubscription {
    pub channel: String,
    stream: BoxStream<'static, ProgressMessage>,
}

impl ProgressSubscription {
    pub fn new(channel: impl Into<String>, stream: BoxStream<'static, ProgressMessage>) -> Self {
        Self {
            channel: channel.into(),
            stream,
        }
    }
}

impl fmt::Debug for ProgressSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSubscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEnd {
    /// A message with `done` arrived.
    Done,
    /// The stream ended without a terminal message.
    Closed,
}

/// Append every message to `log` in arrival order until the job reports done.
///
/// The channel is unsubscribed on either ending so the subscription never
/// outlives the job.
#[instrument(skip_all, fields(channel = %sub.channel))]
pub async fn consume(
    mut sub: ProgressSubscription,
    channel: &dyn ProgressChannel,
    log: &mut LogPanel,
) -> ProgressEnd {
    let mut end = ProgressEnd::Closed;
    while let Some(msg) = sub.stream.next().await {
        debug!(done = msg.done, "progress message");
        log.append(msg.text);
        if msg.done {
            end = ProgressEnd::Done;
            break;
        }
    }
    if let Err(err) = channel.unsubscribe(&sub.channel).await {
        warn!(?err, "unsubscribe failed");
    }
    end
}
