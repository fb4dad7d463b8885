//! Connection adapter over the external transport.
//!
//! The transport (socket library, reconnection logic) runs elsewhere and
//! talks to the session through typed command and notification channels.
//! This module owns the client side of those channels: fire-and-forget
//! emits, timed request/acknowledge, and the re-subscription performed on
//! every (re)connection.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, info, warn};

use parley_shared::protocol::OutboundEvent;
use parley_shared::types::Channel;
use parley_shared::InboundEvent;

use crate::error::{AckError, ConnectionError};

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the transport.
#[derive(Debug)]
pub enum TransportCommand {
    /// Emit an event without waiting for an answer.
    Emit(OutboundEvent),
    /// Emit an event and deliver the server's acknowledgment on `reply`.
    /// Dropping `reply` signals a transport failure.
    Request {
        event: OutboundEvent,
        reply: oneshot::Sender<Value>,
    },
}

/// Notifications sent *from* the transport to the session.
#[derive(Debug, Clone)]
pub enum TransportNotification {
    /// The connection was established. Sent again after every reconnect.
    Connected,
    /// The connection dropped; the transport is reconnecting on its own.
    Disconnected { reason: String },
    /// A server push.
    Event(InboundEvent),
}

/// Session-side ends of the transport channels.
pub struct TransportHandle {
    pub commands: mpsc::Sender<TransportCommand>,
    pub notifications: mpsc::Receiver<TransportNotification>,
}

/// Transport-side ends of the transport channels.
pub struct TransportEndpoint {
    pub commands: mpsc::Receiver<TransportCommand>,
    pub notifications: mpsc::Sender<TransportNotification>,
}

/// Create a connected pair of channel ends.
pub fn transport_channel(capacity: usize) -> (TransportHandle, TransportEndpoint) {
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity);
    let (notif_tx, notif_rx) = mpsc::channel(capacity);
    (
        TransportHandle {
            commands: cmd_tx,
            notifications: notif_rx,
        },
        TransportEndpoint {
            commands: cmd_rx,
            notifications: notif_tx,
        },
    )
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

pub struct Connection {
    commands: mpsc::Sender<TransportCommand>,
    ack_timeout: Duration,
    connected: bool,
}

impl Connection {
    pub fn new(commands: mpsc::Sender<TransportCommand>, ack_timeout: Duration) -> Self {
        Self {
            commands,
            ack_timeout,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Emit an event without acknowledgment.
    pub async fn emit(&self, event: OutboundEvent) -> Result<(), ConnectionError> {
        debug!(event = event.name(), "Emitting");
        self.commands
            .send(TransportCommand::Emit(event))
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    /// Hand a request to the transport. The returned waiter resolves with
    /// the acknowledgment or fails after the configured timeout.
    pub async fn request(&self, event: OutboundEvent) -> Result<AckWaiter, ConnectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        debug!(event = event.name(), "Requesting");
        self.commands
            .send(TransportCommand::Request {
                event,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConnectionError::Closed)?;

        Ok(AckWaiter {
            reply: reply_rx,
            timeout: self.ack_timeout,
        })
    }

    /// Re-issue a join for every member channel. The transport does not
    /// keep subscriptions across reconnects, so this runs on every
    /// `Connected` notification.
    pub async fn resubscribe(&self, channels: &[Channel]) -> Result<(), ConnectionError> {
        for channel in channels {
            self.emit(OutboundEvent::join(&channel.slug)).await?;
        }
        info!(count = channels.len(), "Joined member channels");
        Ok(())
    }
}

/// A request in flight, waiting on its acknowledgment.
#[derive(Debug)]
pub struct AckWaiter {
    reply: oneshot::Receiver<Value>,
    timeout: Duration,
}

impl AckWaiter {
    pub async fn wait(self) -> Result<Value, AckError> {
        match time::timeout(self.timeout, self.reply).await {
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Acknowledgment timed out");
                Err(AckError::Timeout(self.timeout.as_millis()))
            }
            Ok(Err(_)) => Err(AckError::Dropped),
            Ok(Ok(Value::Null)) => Err(AckError::Empty),
            Ok(Ok(value)) => Ok(value),
        }
    }
}
