use thiserror::Error;

use parley_shared::types::MessageId;

/// The transport's command channel is gone; nothing can be emitted until
/// the connection is re-established.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Transport command channel closed")]
    Closed,
}

/// Why a timed request did not produce a usable acknowledgment.
#[derive(Error, Debug)]
pub enum AckError {
    #[error("No acknowledgment within {0} ms")]
    Timeout(u128),

    #[error("Transport dropped the request before acknowledging")]
    Dropped,

    #[error("Acknowledgment carried no payload")]
    Empty,
}

/// Read-receipt write failures. Logged and otherwise ignored.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {0}")]
    Status(u16),
}

/// A UI command on a message that the client refuses to route.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Message {0} is not in the view")]
    UnknownMessage(MessageId),

    #[error("Only the author may edit message {0}")]
    NotAuthor(MessageId),

    #[error("Not permitted to delete message {0}")]
    NotPermitted(MessageId),

    #[error("Content is empty")]
    EmptyContent,

    #[error("Deletion of message {0} was not confirmed")]
    NotConfirmed(MessageId),
}
