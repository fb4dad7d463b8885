/// How long a `send_message` request waits for its acknowledgment.
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;

/// Quiet period after the last keystroke before typing is retracted.
pub const DEFAULT_TYPING_QUIET_MS: u64 = 1_500;

/// Debounce window for the read-position write.
pub const DEFAULT_READ_DEBOUNCE_MS: u64 = 400;

/// Upper bound on one read-receipt HTTP request, teardown flush included.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

/// HTTP path of the read-receipt endpoint, relative to the server URL.
pub const READ_RECEIPT_PATH: &str = "/chat/read";

/// Placeholder shown in place of a deleted message body.
pub const TOMBSTONE_TEXT: &str = "[삭제됨]";

/// Marker appended to the metadata of an edited message.
pub const EDITED_MARKER: &str = "수정됨";

/// Outbound event names
pub const EVENT_JOIN: &str = "join";
pub const EVENT_LEAVE: &str = "leave";
pub const EVENT_TYPING: &str = "typing";
pub const EVENT_SEND_MESSAGE: &str = "send_message";
pub const EVENT_EDIT_MESSAGE: &str = "edit_message";
pub const EVENT_DELETE_MESSAGE: &str = "delete_message";

/// Inbound event names
pub const EVENT_ONLINE_UPDATE: &str = "online_update";
pub const EVENT_TYPING_UPDATE: &str = "typing_update";
pub const EVENT_NEW_MESSAGE: &str = "new_message";
pub const EVENT_MESSAGE_UPDATED: &str = "message_updated";
pub const EVENT_MESSAGE_DELETED: &str = "message_deleted";
