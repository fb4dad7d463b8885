//! Outbound message queue with a single request in flight.
//!
//! The backend acknowledges sends in submission order, so overlapping
//! requests would make ordering and retry ambiguous. The queue therefore
//! hands out at most one draft at a time and keeps the rest in a FIFO
//! backlog. A draft whose request failed at the transport level goes to the
//! back of the backlog rather than the front, so a stuck draft cannot block
//! newer ones forever.

use std::collections::VecDeque;

use tracing::{debug, warn};
use uuid::Uuid;

use parley_shared::protocol::{Message, SendAck, SendMessage};
use parley_shared::types::MessageId;

use crate::error::AckError;

/// An unsent message request. Owned by the queue until acknowledged or
/// abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Local correlation id, only used to follow retries in the logs.
    pub local_id: Uuid,
    pub channel: String,
    pub content: String,
    pub reply_to: Option<MessageId>,
}

impl Draft {
    pub fn new(channel: impl Into<String>, content: impl Into<String>, reply_to: Option<MessageId>) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            channel: channel.into(),
            content: content.into(),
            reply_to,
        }
    }

    pub fn payload(&self) -> SendMessage {
        SendMessage {
            channel: self.channel.clone(),
            content: self.content.clone(),
            reply_to: self.reply_to,
        }
    }
}

/// How an in-flight draft was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// The server stored the message.
    Delivered(Option<Message>),
    /// The server refused the message; the draft is gone.
    Rejected(Draft),
    /// Transport failure; the draft is back in the backlog.
    Requeued,
}

#[derive(Debug, Default)]
pub struct SendQueue {
    sending: bool,
    backlog: VecDeque<Draft>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn backlog(&self) -> impl Iterator<Item = &Draft> {
        self.backlog.iter()
    }

    /// Accept a draft. Returns the draft to issue now, if the queue was idle.
    /// Anything already waiting goes first.
    pub fn submit(&mut self, draft: Draft) -> Option<Draft> {
        debug!(draft = %draft.local_id, queued = self.backlog.len(), "Draft submitted");
        self.backlog.push_back(draft);
        self.take_next()
    }

    /// Claim the head of the backlog if nothing is in flight.
    pub fn take_next(&mut self) -> Option<Draft> {
        if self.sending {
            return None;
        }
        let next = self.backlog.pop_front()?;
        self.sending = true;
        Some(next)
    }

    /// Put a draft that never reached the transport back at the end and
    /// release the in-flight slot.
    pub fn requeue(&mut self, draft: Draft) {
        warn!(draft = %draft.local_id, "Draft requeued");
        self.sending = false;
        self.backlog.push_back(draft);
    }

    /// Resolve the in-flight draft with the acknowledgment outcome.
    ///
    /// A parsed acknowledgment with `ok: false` drops the draft; a missing
    /// acknowledgment or transport failure requeues it.
    pub fn settle(&mut self, draft: Draft, outcome: Result<SendAck, AckError>) -> Settlement {
        self.sending = false;
        match outcome {
            Err(e) => {
                warn!(draft = %draft.local_id, error = %e, "Send failed, requeueing");
                self.backlog.push_back(draft);
                Settlement::Requeued
            }
            Ok(ack) if !ack.ok => {
                warn!(draft = %draft.local_id, "Send rejected by server");
                Settlement::Rejected(draft)
            }
            Ok(ack) => {
                debug!(
                    draft = %draft.local_id,
                    message_id = ?ack.message.as_ref().map(|m| m.id),
                    "Send acknowledged"
                );
                Settlement::Delivered(ack.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(content: &str) -> Draft {
        Draft::new("general", content, None)
    }

    fn contents(queue: &SendQueue) -> Vec<&str> {
        queue.backlog().map(|d| d.content.as_str()).collect()
    }

    #[test]
    fn test_single_in_flight() {
        let mut queue = SendQueue::new();
        let first = queue.submit(draft("a")).expect("idle queue sends immediately");
        assert_eq!(first.content, "a");
        assert!(queue.is_sending());

        assert!(queue.submit(draft("b")).is_none());
        assert!(queue.submit(draft("c")).is_none());
        assert!(queue.take_next().is_none());
        assert_eq!(contents(&queue), ["b", "c"]);
    }

    #[test]
    fn test_timeout_moves_draft_to_back() {
        let mut queue = SendQueue::new();
        let first = queue.submit(draft("a")).unwrap();
        queue.submit(draft("b"));

        let settlement = queue.settle(first, Err(AckError::Timeout(5000)));
        assert_eq!(settlement, Settlement::Requeued);
        assert!(!queue.is_sending());
        assert_eq!(contents(&queue), ["b", "a"]);

        let next = queue.take_next().unwrap();
        assert_eq!(next.content, "b");
    }

    #[test]
    fn test_rejection_drops_draft() {
        let mut queue = SendQueue::new();
        let first = queue.submit(draft("a")).unwrap();
        let local_id = first.local_id;

        let settlement = queue.settle(first, Ok(SendAck { ok: false, message: None }));
        match settlement {
            Settlement::Rejected(d) => assert_eq!(d.local_id, local_id),
            other => panic!("unexpected settlement {other:?}"),
        }
        assert_eq!(queue.backlog_len(), 0);
        assert!(!queue.is_sending());
    }

    #[test]
    fn test_submit_while_idle_respects_backlog_order() {
        let mut queue = SendQueue::new();
        let first = queue.submit(draft("a")).unwrap();
        queue.requeue(first);

        // The requeued draft is older, so it goes before the new one.
        let next = queue.submit(draft("b")).unwrap();
        assert_eq!(next.content, "a");
        assert_eq!(contents(&queue), ["b"]);
    }

    #[test]
    fn test_retry_keeps_draft_identity() {
        let mut queue = SendQueue::new();
        let first = queue.submit(draft("a")).unwrap();
        let local_id = first.local_id;
        queue.settle(first, Err(AckError::Dropped));
        assert_eq!(queue.take_next().unwrap().local_id, local_id);
    }
}
