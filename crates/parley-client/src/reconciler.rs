//! Local projection of the active channel's message list.
//!
//! The server is the only source of ordering: creations are appended in
//! arrival order and never reordered. Updates and deletions touch entries
//! in place and are no-ops for ids the view never materialized. Deletion is
//! soft; the entry keeps its id and position and shows a tombstone.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use parley_shared::constants::TOMBSTONE_TEXT;
use parley_shared::protocol::{Message, ReplyRef};
use parley_shared::types::{ChannelId, MessageId, UserId};

/// A materialized message as the view shows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageEntry {
    pub id: MessageId,
    pub author_id: UserId,
    pub author_name: String,
    pub author_prefix: String,
    pub avatar: Option<String>,
    pub name_color: Option<String>,
    pub accessory_image: Option<String>,
    pub created_at: String,
    pub reply_to: Option<ReplyRef>,
    /// Displayed body: rendered markup, raw text, or the tombstone.
    pub content: String,
    /// Whether the "edited" marker is shown. Set at most once.
    pub edited: bool,
    /// Whether a delete was applied. An update after that re-renders the
    /// content but leaves this set.
    pub deleted: bool,
}

impl MessageEntry {
    fn from_message(message: &Message) -> Self {
        Self {
            id: message.id,
            author_id: message.user_id,
            author_name: message.user_name.clone(),
            author_prefix: message.user_prefix.clone(),
            avatar: message.avatar.clone(),
            name_color: message.name_color.clone(),
            accessory_image: message.accessory_image.clone(),
            created_at: message.created_at.clone(),
            reply_to: message.reply_to.clone(),
            content: message.display_content().to_string(),
            edited: message.was_edited(),
            deleted: message.is_deleted,
        }
    }
}

/// Result of applying one server event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// New entry at the end of the list.
    Appended(MessageId),
    /// Creation for another channel; nothing materialized.
    Foreign(ChannelId),
    /// Creation for an id that is already materialized.
    Duplicate(MessageId),
    /// Content replaced in place.
    Edited(MessageId),
    /// Content replaced with the tombstone.
    Tombstoned(MessageId),
    /// The event referenced an id the view does not hold.
    Missing(MessageId),
}

#[derive(Debug)]
pub struct MessageLog {
    channel_id: ChannelId,
    entries: Vec<MessageEntry>,
    positions: HashMap<MessageId, usize>,
}

impl MessageLog {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Seed the log with the history rendered at load time.
    pub fn with_history(channel_id: ChannelId, history: &[Message]) -> Self {
        let mut log = Self::new(channel_id);
        for message in history {
            log.apply_created(message);
        }
        log
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    pub fn get(&self, id: MessageId) -> Option<&MessageEntry> {
        self.positions.get(&id).map(|&i| &self.entries[i])
    }

    pub fn position(&self, id: MessageId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn last_id(&self) -> Option<MessageId> {
        self.entries.last().map(|e| e.id)
    }

    pub fn apply_created(&mut self, message: &Message) -> Reconciled {
        if message.channel_id != self.channel_id {
            return Reconciled::Foreign(message.channel_id);
        }
        if self.positions.contains_key(&message.id) {
            debug!(message_id = %message.id, "Duplicate creation ignored");
            return Reconciled::Duplicate(message.id);
        }
        self.positions.insert(message.id, self.entries.len());
        self.entries.push(MessageEntry::from_message(message));
        Reconciled::Appended(message.id)
    }

    pub fn apply_updated(&mut self, message: &Message) -> Reconciled {
        let Some(entry) = self.entry_mut(message.id) else {
            debug!(message_id = %message.id, "Update for unknown message ignored");
            return Reconciled::Missing(message.id);
        };
        if entry.deleted {
            // Out-of-order delivery can revive a deleted message's text.
            debug!(message_id = %message.id, "Update applied after delete");
        }
        entry.content = message.display_content().to_string();
        entry.edited = true;
        Reconciled::Edited(message.id)
    }

    pub fn apply_deleted(&mut self, id: MessageId) -> Reconciled {
        let Some(entry) = self.entry_mut(id) else {
            debug!(message_id = %id, "Delete for unknown message ignored");
            return Reconciled::Missing(id);
        };
        entry.content = TOMBSTONE_TEXT.to_string();
        entry.deleted = true;
        Reconciled::Tombstoned(id)
    }

    fn entry_mut(&mut self, id: MessageId) -> Option<&mut MessageEntry> {
        let index = *self.positions.get(&id)?;
        self.entries.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64, channel: u64, content: &str) -> Message {
        Message {
            id: MessageId(id),
            channel_id: ChannelId(channel),
            user_id: UserId(7),
            user_name: "mina".into(),
            user_prefix: "mina".into(),
            avatar: None,
            content: content.into(),
            rendered_content: None,
            reply_to: None,
            is_deleted: false,
            name_color: None,
            accessory_image: None,
            created_at: "2024-05-01 12:00".into(),
            updated_at: None,
        }
    }

    fn ids(log: &MessageLog) -> Vec<u64> {
        log.entries().iter().map(|e| e.id.0).collect()
    }

    #[test]
    fn test_creations_append_in_arrival_order() {
        let mut log = MessageLog::new(ChannelId(1));
        assert_eq!(log.apply_created(&message(12, 1, "b")), Reconciled::Appended(MessageId(12)));
        // Arrival order wins even when ids are out of order.
        log.apply_created(&message(11, 1, "a"));
        assert_eq!(ids(&log), [12, 11]);
        assert_eq!(log.last_id(), Some(MessageId(11)));
    }

    #[test]
    fn test_foreign_and_duplicate_creations() {
        let mut log = MessageLog::new(ChannelId(1));
        assert_eq!(
            log.apply_created(&message(3, 2, "elsewhere")),
            Reconciled::Foreign(ChannelId(2))
        );
        assert!(log.entries().is_empty());

        log.apply_created(&message(4, 1, "hi"));
        assert_eq!(
            log.apply_created(&message(4, 1, "hi")),
            Reconciled::Duplicate(MessageId(4))
        );
        assert_eq!(ids(&log), [4]);
    }

    #[test]
    fn test_update_marks_edited_once() {
        let mut log = MessageLog::new(ChannelId(1));
        log.apply_created(&message(4, 1, "hi"));

        let mut edited = message(4, 1, "hello");
        edited.rendered_content = Some("<b>hello</b>".into());
        assert_eq!(log.apply_updated(&edited), Reconciled::Edited(MessageId(4)));
        assert_eq!(log.apply_updated(&edited), Reconciled::Edited(MessageId(4)));

        let entry = log.get(MessageId(4)).unwrap();
        assert!(entry.edited);
        assert_eq!(entry.content, "<b>hello</b>");
    }

    #[test]
    fn test_delete_keeps_position() {
        let mut log = MessageLog::new(ChannelId(1));
        for id in [1, 2, 3] {
            log.apply_created(&message(id, 1, "x"));
        }
        assert_eq!(log.apply_deleted(MessageId(2)), Reconciled::Tombstoned(MessageId(2)));

        assert_eq!(ids(&log), [1, 2, 3]);
        assert_eq!(log.position(MessageId(2)), Some(1));
        let entry = log.get(MessageId(2)).unwrap();
        assert_eq!(entry.content, TOMBSTONE_TEXT);
        assert!(entry.deleted);
    }

    #[test]
    fn test_missing_targets_are_noops() {
        let mut log = MessageLog::new(ChannelId(1));
        assert_eq!(log.apply_deleted(MessageId(9)), Reconciled::Missing(MessageId(9)));
        assert_eq!(
            log.apply_updated(&message(9, 1, "ghost")),
            Reconciled::Missing(MessageId(9))
        );
        assert!(log.get(MessageId(9)).is_none());
    }

    #[test]
    fn test_update_after_delete_rerenders() {
        let mut log = MessageLog::new(ChannelId(1));
        log.apply_created(&message(5, 1, "hi"));
        log.apply_deleted(MessageId(5));
        log.apply_updated(&message(5, 1, "stray"));

        let entry = log.get(MessageId(5)).unwrap();
        assert_eq!(entry.content, "stray");
        assert!(entry.deleted);
    }

    #[test]
    fn test_history_seeds_edited_marker() {
        let mut edited = message(1, 1, "fixed");
        edited.updated_at = Some("2024-05-01 12:03".into());
        let log = MessageLog::with_history(ChannelId(1), &[edited, message(2, 1, "plain")]);
        assert!(log.get(MessageId(1)).unwrap().edited);
        assert!(!log.get(MessageId(2)).unwrap().edited);
    }
}
