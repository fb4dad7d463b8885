//! Read-position tracking, debounced read receipts and unread indicators.
//!
//! The read position is the highest message id seen in the active channel.
//! It only moves forward. Each advance re-arms a short debounce so a burst
//! of reads collapses into one HTTP write carrying the latest id.

use std::collections::BTreeSet;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::debug;

use parley_shared::types::{ChannelId, MessageId};

use crate::config::ClientConfig;
use crate::error::SyncError;

#[derive(Debug)]
pub struct ReadTracker {
    position: MessageId,
    debounce: Duration,
    deadline: Option<Instant>,
}

impl ReadTracker {
    pub fn new(debounce: Duration) -> Self {
        Self {
            position: MessageId(0),
            debounce,
            deadline: None,
        }
    }

    pub fn position(&self) -> MessageId {
        self.position
    }

    /// When the pending write is due, if one is scheduled.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Advance the read position. Ids at or below the current position are
    /// ignored. Returns whether the position moved.
    pub fn mark_read(&mut self, id: MessageId, now: Instant) -> bool {
        if id.0 == 0 || id <= self.position {
            return false;
        }
        self.position = id;
        self.deadline = Some(now + self.debounce);
        debug!(message_id = %id, "Read position advanced");
        true
    }

    /// The id to write if the debounce window has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<MessageId> {
        match self.deadline {
            Some(at) if at <= now => self.take_pending(),
            _ => None,
        }
    }

    /// The id of any scheduled write, regardless of its deadline. Used on
    /// teardown so the final position is not lost.
    pub fn take_pending(&mut self) -> Option<MessageId> {
        self.deadline.take().map(|_| self.position)
    }
}

/// Channels whose selector shows an unread marker.
#[derive(Debug, Default)]
pub struct UnreadTracker {
    unread: BTreeSet<ChannelId>,
}

impl UnreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear the marker. Returns whether anything changed.
    pub fn set(&mut self, channel: ChannelId, unread: bool) -> bool {
        if unread {
            self.unread.insert(channel)
        } else {
            self.unread.remove(&channel)
        }
    }

    pub fn is_unread(&self, channel: ChannelId) -> bool {
        self.unread.contains(&channel)
    }
}

/// Destination of read receipts.
pub trait ReadReceiptSink: Send + Sync {
    fn post_read(&self, channel: &str, message_id: MessageId)
        -> BoxFuture<'static, Result<(), SyncError>>;
}

/// Posts read receipts to the server's form endpoint.
#[derive(Debug, Clone)]
pub struct HttpReadReceipts {
    client: reqwest::Client,
    url: String,
}

impl HttpReadReceipts {
    /// Every request is bounded by `read_timeout` so a stalled endpoint
    /// cannot hold up teardown.
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.read_timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.read_url(),
        })
    }
}

impl ReadReceiptSink for HttpReadReceipts {
    fn post_read(
        &self,
        channel: &str,
        message_id: MessageId,
    ) -> BoxFuture<'static, Result<(), SyncError>> {
        let request = self
            .client
            .post(&self.url)
            .form(&[("channel", channel.to_string()), ("message_id", message_id.to_string())]);

        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(SyncError::Status(status.as_u16()));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_mark_read_is_monotonic() {
        let now = Instant::now();
        let mut tracker = ReadTracker::new(ms(400));

        assert!(tracker.mark_read(MessageId(7), now));
        assert!(!tracker.mark_read(MessageId(5), now));
        assert!(!tracker.mark_read(MessageId(7), now));
        assert!(!tracker.mark_read(MessageId(0), now));
        assert_eq!(tracker.position(), MessageId(7));

        assert!(tracker.mark_read(MessageId(9), now));
        assert_eq!(tracker.position(), MessageId(9));
    }

    #[test]
    fn test_burst_collapses_into_one_write() {
        let start = Instant::now();
        let mut tracker = ReadTracker::new(ms(400));

        tracker.mark_read(MessageId(5), start);
        tracker.mark_read(MessageId(7), start + ms(100));

        assert_eq!(tracker.take_due(start + ms(400)), None);
        assert_eq!(tracker.take_due(start + ms(500)), Some(MessageId(7)));
        assert_eq!(tracker.take_due(start + ms(1000)), None);
        assert!(tracker.deadline().is_none());
    }

    #[test]
    fn test_ignored_read_does_not_rearm() {
        let start = Instant::now();
        let mut tracker = ReadTracker::new(ms(400));
        tracker.mark_read(MessageId(5), start);
        tracker.mark_read(MessageId(3), start + ms(300));
        assert_eq!(tracker.deadline(), Some(start + ms(400)));
    }

    #[test]
    fn test_take_pending_flushes_early() {
        let now = Instant::now();
        let mut tracker = ReadTracker::new(ms(400));
        assert_eq!(tracker.take_pending(), None);

        tracker.mark_read(MessageId(12), now);
        assert_eq!(tracker.take_pending(), Some(MessageId(12)));
        assert_eq!(tracker.take_pending(), None);
    }

    #[test]
    fn test_unread_markers() {
        let mut unread = UnreadTracker::new();
        assert!(unread.set(ChannelId(2), true));
        assert!(!unread.set(ChannelId(2), true));
        assert!(unread.is_unread(ChannelId(2)));
        assert!(unread.set(ChannelId(2), false));
        assert!(!unread.set(ChannelId(3), false));
        assert!(!unread.is_unread(ChannelId(2)));
    }

    #[tokio::test]
    async fn test_http_receipt_reports_transport_failure() {
        let config = ClientConfig {
            server_url: "http://127.0.0.1:9".to_string(),
            ..ClientConfig::default()
        };
        let sink = HttpReadReceipts::new(&config).unwrap();
        let result = sink.post_read("general", MessageId(3)).await;
        assert!(matches!(result, Err(SyncError::Http(_))));
    }

    #[tokio::test]
    async fn test_http_receipt_gives_up_on_silent_endpoint() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold connections without ever answering.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = ClientConfig {
            server_url: format!("http://{addr}"),
            read_timeout: ms(200),
            ..ClientConfig::default()
        };
        let sink = HttpReadReceipts::new(&config).unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            sink.post_read("general", MessageId(3)),
        )
        .await
        .expect("request should time out on its own");
        match result {
            Err(SyncError::Http(e)) => assert!(e.is_timeout()),
            other => panic!("expected a timeout, got {other:?}"),
        }
        server.abort();
    }
}
