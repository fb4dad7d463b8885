use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use parley_shared::protocol::OnlineUser;
use parley_shared::types::{ChannelId, MessageId};

use crate::commands::Capabilities;
use crate::reconciler::MessageEntry;
use crate::typing::TypingIndicator;

/// Input from the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UiCommand {
    Input { text: String },
    Blur,
    Send { content: String },
    OpenContextMenu { message_id: MessageId },
    Reply { message_id: MessageId },
    DismissReply,
    Edit { message_id: MessageId, content: String },
    Delete { message_id: MessageId, confirmed: bool },
    Unload,
}

/// Instructions for the UI layer to re-render part of the view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "update", rename_all = "snake_case")]
pub enum ViewUpdate {
    MessageAppended { entry: MessageEntry },
    MessageChanged { position: usize, entry: MessageEntry },
    RosterReplaced { users: Vec<OnlineUser> },
    Typing { indicator: TypingIndicator },
    Unread { channel_id: ChannelId, unread: bool },
    SendEnabled { enabled: bool },
    InputCleared,
    ReplyBanner { text: Option<String> },
    ContextMenu { message_id: MessageId, capabilities: Capabilities },
    /// The server refused a message; the draft was dropped.
    SendRejected { content: String },
}

pub fn emit_view(views: &mpsc::UnboundedSender<ViewUpdate>, update: ViewUpdate) {
    if views.send(update).is_err() {
        tracing::debug!("View receiver dropped, update discarded");
    }
}
