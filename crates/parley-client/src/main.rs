//! # parley-replay
//!
//! Runs a chat session against a scripted transport. The bootstrap (who
//! the user is, which channel is open, the rendered history) comes from a
//! JSON file; the script is read line by line from stdin. Every outbound
//! event and view update is printed to stdout as one JSON line, which makes
//! reconciliation bugs reproducible without a live server.
//!
//! ```text
//! parley-replay bootstrap.json < session.jsonl
//! ```
//!
//! Script lines:
//! - `{"type":"connect"}` / `{"type":"disconnect","reason":"..."}`
//! - `{"type":"inbound","event":"new_message","data":{...}}`
//! - `{"type":"command","command":"send","content":"hi"}`
//! - `{"type":"ack","reply":{"ok":true}}` answers the oldest request still waiting
//! - `{"type":"drop"}` fails the oldest pending request
//! - `{"type":"wait","ms":500}`

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use parley_client::commands::Actor;
use parley_client::connection::TransportEndpoint;
use parley_client::error::SyncError;
use parley_client::{
    init_tracing, transport_channel, ChatSession, ClientConfig, HttpReadReceipts, ReadReceiptSink,
    SessionBootstrap, SessionHandle, TransportCommand, TransportNotification, UiCommand,
};
use parley_shared::types::{Channel, ChannelId, MessageId, UserId};
use parley_shared::{InboundEvent, Message};

#[derive(Debug, Deserialize)]
struct BootstrapFile {
    user_id: UserId,
    #[serde(default)]
    is_admin: bool,
    active: Channel,
    #[serde(default)]
    joined: Vec<Channel>,
    #[serde(default = "default_can_send")]
    can_send: bool,
    #[serde(default)]
    history: Vec<Message>,
    #[serde(default)]
    unread_channels: Vec<ChannelId>,
}

fn default_can_send() -> bool {
    true
}

impl From<BootstrapFile> for SessionBootstrap {
    fn from(file: BootstrapFile) -> Self {
        let mut joined = file.joined;
        if !joined.contains(&file.active) {
            joined.insert(0, file.active.clone());
        }
        Self {
            actor: Actor {
                user_id: file.user_id,
                is_admin: file.is_admin,
            },
            active: file.active,
            joined,
            can_send: file.can_send,
            history: file.history,
            unread_channels: file.unread_channels,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplayStep {
    Connect,
    Disconnect {
        #[serde(default)]
        reason: String,
    },
    Inbound {
        event: String,
        data: Value,
    },
    Command(UiCommand),
    Ack {
        reply: Value,
    },
    #[serde(rename = "drop")]
    DropRequest,
    Wait {
        ms: u64,
    },
}

/// Reply slots of requests the script has not answered yet, oldest first.
///
/// A request the session already gave up on (ack timeout) has a closed
/// slot; the script's next `ack` goes to the oldest request still waiting.
#[derive(Clone, Default)]
struct PendingAcks {
    slots: Arc<Mutex<VecDeque<oneshot::Sender<Value>>>>,
}

impl PendingAcks {
    async fn push(&self, reply: oneshot::Sender<Value>) {
        self.slots.lock().await.push_back(reply);
    }

    /// Answer the oldest live request. Returns whether one was answered.
    async fn answer(&self, mut reply: Value) -> bool {
        let mut slots = self.slots.lock().await;
        while let Some(slot) = slots.pop_front() {
            if slot.is_closed() {
                debug!("Skipping request that already timed out");
                continue;
            }
            match slot.send(reply) {
                Ok(()) => return true,
                Err(returned) => {
                    warn!("Request closed while answering, trying the next one");
                    reply = returned;
                }
            }
        }
        false
    }

    /// Fail the oldest live request by dropping its reply slot.
    async fn fail(&self) -> bool {
        let mut slots = self.slots.lock().await;
        while let Some(slot) = slots.pop_front() {
            if !slot.is_closed() {
                return true;
            }
        }
        false
    }
}

/// Read receipts printed instead of posted, for offline replays.
struct PrintedReceipts;

impl ReadReceiptSink for PrintedReceipts {
    fn post_read(
        &self,
        channel: &str,
        message_id: MessageId,
    ) -> BoxFuture<'static, Result<(), SyncError>> {
        print_line(json!({"read_receipt": {"channel": channel, "message_id": message_id}}));
        Box::pin(async { Ok(()) })
    }
}

fn print_line(value: Value) {
    println!("{value}");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let path: PathBuf = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: parley-replay <bootstrap.json> < script.jsonl")?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let bootstrap: BootstrapFile =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    let config = ClientConfig::from_env();
    let receipts: Arc<dyn ReadReceiptSink> = if std::env::var_os("PARLEY_SERVER_URL").is_some() {
        info!(url = %config.read_url(), "Posting read receipts over HTTP");
        Arc::new(HttpReadReceipts::new(&config).context("building read-receipt client")?)
    } else {
        Arc::new(PrintedReceipts)
    };

    let (transport, endpoint) = transport_channel(64);
    let TransportEndpoint {
        commands: mut outbound_rx,
        notifications,
    } = endpoint;
    let (session, handle) = ChatSession::new(&config, bootstrap.into(), transport, receipts);
    let SessionHandle {
        commands,
        views: mut view_rx,
    } = handle;

    // Outbound side of the scripted transport.
    let pending = PendingAcks::default();
    let pending_outbound = pending.clone();
    let outbound = tokio::spawn(async move {
        while let Some(command) = outbound_rx.recv().await {
            match command {
                TransportCommand::Emit(event) => print_line(json!({"outbound": event})),
                TransportCommand::Request { event, reply } => {
                    print_line(json!({"request": event}));
                    pending_outbound.push(reply).await;
                }
            }
        }
    });

    let views = tokio::spawn(async move {
        while let Some(update) = view_rx.recv().await {
            print_line(json!({"view": update}));
        }
    });

    let session_task = tokio::spawn(session.run());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let step: ReplayStep = match serde_json::from_str(&line) {
            Ok(step) => step,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping unreadable script line");
                continue;
            }
        };

        match step {
            ReplayStep::Connect => {
                notifications.send(TransportNotification::Connected).await?
            }
            ReplayStep::Disconnect { reason } => {
                notifications
                    .send(TransportNotification::Disconnected { reason })
                    .await?
            }
            ReplayStep::Inbound { event, data } => match InboundEvent::from_parts(&event, data) {
                Ok(event) => notifications.send(TransportNotification::Event(event)).await?,
                Err(e) => warn!(line = line_no, error = %e, "Skipping inbound event"),
            },
            ReplayStep::Command(command) => commands.send(command).await?,
            ReplayStep::Ack { reply } => {
                if !pending.answer(reply).await {
                    warn!(line = line_no, "No pending request to acknowledge");
                }
            }
            ReplayStep::DropRequest => {
                if !pending.fail().await {
                    warn!(line = line_no, "No pending request to drop");
                }
            }
            ReplayStep::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
    }

    commands.send(UiCommand::Unload).await?;
    session_task.await?;
    drop(notifications);
    outbound.await?;
    views.await?;
    Ok(())
}
