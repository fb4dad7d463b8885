use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::types::{ChannelId, MessageId, UserId};

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A chat message as pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    #[serde(default)]
    pub user_name: String,
    /// Profile handle used to link to the author's profile.
    #[serde(default)]
    pub user_prefix: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub content: String,
    /// Server-rendered markup for `content`, if any.
    #[serde(default)]
    pub rendered_content: Option<String>,
    #[serde(default)]
    pub reply_to: Option<ReplyRef>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub name_color: Option<String>,
    #[serde(default)]
    pub accessory_image: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Message {
    /// Body to display: the pre-rendered markup when the server sent a
    /// non-empty one, the raw content otherwise.
    pub fn display_content(&self) -> &str {
        match self.rendered_content.as_deref() {
            Some(rendered) if !rendered.is_empty() => rendered,
            _ => &self.content,
        }
    }

    /// Whether the server reports a last-update time distinct from creation.
    pub fn was_edited(&self) -> bool {
        matches!(&self.updated_at, Some(updated) if *updated != self.created_at)
    }
}

/// What a message replies to. The server sends either the target id or a
/// short preview of the target's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyRef {
    Id(MessageId),
    Preview(String),
}

/// An entry of the online roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email_prefix: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub name_color: Option<String>,
    #[serde(default)]
    pub accessory_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingUser {
    pub id: UserId,
    pub name: String,
}

/// Everyone currently typing in a channel. Replaces the previous snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingSnapshot {
    pub channel: String,
    #[serde(default)]
    pub users: Vec<TypingUser>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeleted {
    pub message_id: MessageId,
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    pub channel: String,
    pub is_typing: bool,
}

/// `reply_to` is always present on the wire, `null` when not replying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    pub channel: String,
    pub content: String,
    pub reply_to: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditMessage {
    pub message_id: MessageId,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMessage {
    pub message_id: MessageId,
}

/// Acknowledgment of a `send_message` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendAck {
    pub ok: bool,
    #[serde(default)]
    pub message: Option<Message>,
}

impl SendAck {
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(value).map_err(|source| ProtocolError::Malformed {
            event: EVENT_SEND_MESSAGE.to_string(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events the client emits. Serialized adjacently tagged so a framed
/// transport can carry them as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    Join(ChannelRef),
    Leave(ChannelRef),
    Typing(TypingSignal),
    SendMessage(SendMessage),
    EditMessage(EditMessage),
    DeleteMessage(DeleteMessage),
}

impl OutboundEvent {
    pub fn join(channel: &str) -> Self {
        Self::Join(ChannelRef {
            channel: channel.to_string(),
        })
    }

    pub fn leave(channel: &str) -> Self {
        Self::Leave(ChannelRef {
            channel: channel.to_string(),
        })
    }

    pub fn typing(channel: &str, is_typing: bool) -> Self {
        Self::Typing(TypingSignal {
            channel: channel.to_string(),
            is_typing,
        })
    }

    /// Event name as the transport sees it.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => EVENT_JOIN,
            Self::Leave(_) => EVENT_LEAVE,
            Self::Typing(_) => EVENT_TYPING,
            Self::SendMessage(_) => EVENT_SEND_MESSAGE,
            Self::EditMessage(_) => EVENT_EDIT_MESSAGE,
            Self::DeleteMessage(_) => EVENT_DELETE_MESSAGE,
        }
    }

    /// Event payload without the name tag.
    pub fn payload(&self) -> Result<Value, ProtocolError> {
        let value = match self {
            Self::Join(p) | Self::Leave(p) => serde_json::to_value(p)?,
            Self::Typing(p) => serde_json::to_value(p)?,
            Self::SendMessage(p) => serde_json::to_value(p)?,
            Self::EditMessage(p) => serde_json::to_value(p)?,
            Self::DeleteMessage(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }
}

/// Events the server pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    OnlineUpdate(Vec<OnlineUser>),
    TypingUpdate(TypingSnapshot),
    NewMessage(Message),
    MessageUpdated(Message),
    MessageDeleted(MessageDeleted),
}

impl InboundEvent {
    /// Decode an event from the name/payload pair a transport callback
    /// delivers.
    pub fn from_parts(name: &str, data: Value) -> Result<Self, ProtocolError> {
        fn decode<T: serde::de::DeserializeOwned>(
            name: &str,
            data: Value,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(data).map_err(|source| ProtocolError::Malformed {
                event: name.to_string(),
                source,
            })
        }

        let event = match name {
            EVENT_ONLINE_UPDATE => Self::OnlineUpdate(decode(name, data)?),
            EVENT_TYPING_UPDATE => Self::TypingUpdate(decode(name, data)?),
            EVENT_NEW_MESSAGE => Self::NewMessage(decode(name, data)?),
            EVENT_MESSAGE_UPDATED => Self::MessageUpdated(decode(name, data)?),
            EVENT_MESSAGE_DELETED => Self::MessageDeleted(decode(name, data)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OnlineUpdate(_) => EVENT_ONLINE_UPDATE,
            Self::TypingUpdate(_) => EVENT_TYPING_UPDATE,
            Self::NewMessage(_) => EVENT_NEW_MESSAGE,
            Self::MessageUpdated(_) => EVENT_MESSAGE_UPDATED,
            Self::MessageDeleted(_) => EVENT_MESSAGE_DELETED,
        }
    }
}
