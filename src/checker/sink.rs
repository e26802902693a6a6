use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::Finding;

/// Destination of the findings of a check.
#[async_trait]
pub trait FindingSink: Send + Sync {
    async fn emit(&self, finding: &Finding);
}

/// Logs every finding at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl FindingSink for TracingSink {
    async fn emit(&self, finding: &Finding) {
        warn!(
            group = finding.group.as_str(),
            topic = finding.topic.as_str(),
            partition = finding.partition,
            "{finding}",
        );
    }
}

/// Sends findings to a channel, e.g. for an alerting task.
///
/// Waits for capacity if the receiver lags behind. Findings are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Finding>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Finding>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FindingSink for ChannelSink {
    async fn emit(&self, finding: &Finding) {
        if self.tx.send(finding.clone()).await.is_err() {
            debug!(%finding, "Finding receiver gone, dropping finding");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(partition: i32) -> Finding {
        Finding {
            group: String::from("g1"),
            topic: String::from("topic1"),
            partition,
        }
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (sink, mut rx) = ChannelSink::new(4);

        sink.emit(&finding(0)).await;
        sink.emit(&finding(1)).await;

        assert_eq!(rx.recv().await.unwrap(), finding(0));
        assert_eq!(rx.recv().await.unwrap(), finding(1));
    }

    #[tokio::test]
    async fn test_channel_sink_without_receiver() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);

        // must not block or panic
        sink.emit(&finding(0)).await;
    }

    #[tokio::test]
    async fn test_tracing_sink() {
        TracingSink.emit(&finding(3)).await;
    }
}
