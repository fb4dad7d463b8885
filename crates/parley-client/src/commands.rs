//! Context actions on a selected message.
//!
//! Capability checks here only decide which affordances the UI offers and
//! which requests are worth sending. The server enforces authorization on
//! its own.

use serde::Serialize;
use tracing::debug;

use parley_shared::protocol::{DeleteMessage, EditMessage, OutboundEvent};
use parley_shared::types::{MessageId, UserId};

use crate::error::CommandError;
use crate::reconciler::MessageEntry;

/// The local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub can_edit: bool,
    pub can_delete: bool,
}

impl Capabilities {
    pub fn for_author(actor: &Actor, author: UserId) -> Self {
        let is_owner = actor.user_id == author;
        Self {
            can_edit: is_owner,
            can_delete: is_owner || actor.is_admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageAction {
    Reply,
    Edit { content: String },
    /// `confirmed` carries the answer of the confirmation prompt.
    Delete { confirmed: bool },
}

/// Effect of a routed action.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Local only: show the reply banner with this text.
    ReplyBanner(String),
    /// Send this event to the server.
    Emit(OutboundEvent),
}

#[derive(Debug, Default)]
pub struct CommandRouter {
    reply_to: Option<MessageId>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_target(&self) -> Option<MessageId> {
        self.reply_to
    }

    /// Consume the reply target when a message is sent.
    pub fn take_reply(&mut self) -> Option<MessageId> {
        self.reply_to.take()
    }

    /// Returns whether a reply target was set.
    pub fn dismiss_reply(&mut self) -> bool {
        self.reply_to.take().is_some()
    }

    pub fn route(
        &mut self,
        actor: &Actor,
        target: Option<&MessageEntry>,
        message_id: MessageId,
        action: MessageAction,
    ) -> Result<Routed, CommandError> {
        let target = target.ok_or(CommandError::UnknownMessage(message_id))?;
        let capabilities = Capabilities::for_author(actor, target.author_id);

        match action {
            MessageAction::Reply => {
                self.reply_to = Some(target.id);
                debug!(message_id = %target.id, "Reply target set");
                Ok(Routed::ReplyBanner(format!("답장: {}", target.content)))
            }
            MessageAction::Edit { content } => {
                if !capabilities.can_edit {
                    return Err(CommandError::NotAuthor(target.id));
                }
                let content = content.trim();
                if content.is_empty() {
                    return Err(CommandError::EmptyContent);
                }
                Ok(Routed::Emit(OutboundEvent::EditMessage(EditMessage {
                    message_id: target.id,
                    content: content.to_string(),
                })))
            }
            MessageAction::Delete { confirmed } => {
                if !capabilities.can_delete {
                    return Err(CommandError::NotPermitted(target.id));
                }
                if !confirmed {
                    return Err(CommandError::NotConfirmed(target.id));
                }
                Ok(Routed::Emit(OutboundEvent::DeleteMessage(DeleteMessage {
                    message_id: target.id,
                })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Actor = Actor {
        user_id: UserId(1),
        is_admin: false,
    };
    const STRANGER: Actor = Actor {
        user_id: UserId(2),
        is_admin: false,
    };
    const ADMIN: Actor = Actor {
        user_id: UserId(3),
        is_admin: true,
    };

    fn entry() -> MessageEntry {
        MessageEntry {
            id: MessageId(40),
            author_id: UserId(1),
            author_name: "mina".into(),
            author_prefix: "mina".into(),
            avatar: None,
            name_color: None,
            accessory_image: None,
            created_at: "2024-05-01 12:00".into(),
            reply_to: None,
            content: "lunch?".into(),
            edited: false,
            deleted: false,
        }
    }

    #[test]
    fn test_capabilities() {
        assert_eq!(
            Capabilities::for_author(&OWNER, UserId(1)),
            Capabilities { can_edit: true, can_delete: true }
        );
        assert_eq!(
            Capabilities::for_author(&STRANGER, UserId(1)),
            Capabilities { can_edit: false, can_delete: false }
        );
        assert_eq!(
            Capabilities::for_author(&ADMIN, UserId(1)),
            Capabilities { can_edit: false, can_delete: true }
        );
    }

    #[test]
    fn test_reply_is_local() {
        let mut router = CommandRouter::new();
        let target = entry();
        let routed = router
            .route(&STRANGER, Some(&target), target.id, MessageAction::Reply)
            .unwrap();
        assert_eq!(routed, Routed::ReplyBanner("답장: lunch?".into()));
        assert_eq!(router.reply_target(), Some(MessageId(40)));
        assert_eq!(router.take_reply(), Some(MessageId(40)));
        assert!(!router.dismiss_reply());
    }

    #[test]
    fn test_edit_requires_author() {
        let mut router = CommandRouter::new();
        let target = entry();
        let edit = || MessageAction::Edit { content: " soon ".into() };

        assert_eq!(
            router.route(&ADMIN, Some(&target), target.id, edit()),
            Err(CommandError::NotAuthor(MessageId(40)))
        );
        assert_eq!(
            router.route(&OWNER, Some(&target), target.id, edit()),
            Ok(Routed::Emit(OutboundEvent::EditMessage(EditMessage {
                message_id: MessageId(40),
                content: "soon".into(),
            })))
        );
        assert_eq!(
            router.route(&OWNER, Some(&target), target.id, MessageAction::Edit { content: "  ".into() }),
            Err(CommandError::EmptyContent)
        );
    }

    #[test]
    fn test_delete_requires_permission_and_confirmation() {
        let mut router = CommandRouter::new();
        let target = entry();

        assert_eq!(
            router.route(&STRANGER, Some(&target), target.id, MessageAction::Delete { confirmed: true }),
            Err(CommandError::NotPermitted(MessageId(40)))
        );
        assert_eq!(
            router.route(&ADMIN, Some(&target), target.id, MessageAction::Delete { confirmed: false }),
            Err(CommandError::NotConfirmed(MessageId(40)))
        );
        assert_eq!(
            router.route(&ADMIN, Some(&target), target.id, MessageAction::Delete { confirmed: true }),
            Ok(Routed::Emit(OutboundEvent::DeleteMessage(DeleteMessage {
                message_id: MessageId(40),
            })))
        );
    }

    #[test]
    fn test_unknown_message() {
        let mut router = CommandRouter::new();
        assert_eq!(
            router.route(&OWNER, None, MessageId(99), MessageAction::Reply),
            Err(CommandError::UnknownMessage(MessageId(99)))
        );
        assert_eq!(router.reply_target(), None);
    }
}
