//! The session controller.
//!
//! One [`ChatSession`] owns all synchronization state for one chat view and
//! processes one wake-up at a time: a transport notification, a UI command,
//! a settled background operation, or a timer deadline. Each handler runs
//! to completion before the next wake-up is taken, so the state needs no
//! locking. The only work that leaves the loop is waiting on an
//! acknowledgment or an HTTP read receipt; both come back as [`Settled`]
//! messages.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use parley_shared::protocol::{InboundEvent, Message, OnlineUser, OutboundEvent, SendAck};
use parley_shared::types::{Channel, ChannelId, MessageId};

use crate::commands::{Actor, Capabilities, CommandRouter, MessageAction, Routed};
use crate::config::ClientConfig;
use crate::connection::{Connection, TransportHandle, TransportNotification};
use crate::error::{AckError, SyncError};
use crate::events::{emit_view, UiCommand, ViewUpdate};
use crate::presence::PresenceRoster;
use crate::read_sync::{ReadReceiptSink, ReadTracker, UnreadTracker};
use crate::reconciler::{MessageLog, Reconciled};
use crate::send_queue::{Draft, SendQueue, Settlement};
use crate::typing::{render_typing, TypingTracker};

/// What the page knows at load time.
#[derive(Debug, Clone)]
pub struct SessionBootstrap {
    pub actor: Actor,
    /// The channel this view shows.
    pub active: Channel,
    /// Every channel the user is a member of, the active one included.
    pub joined: Vec<Channel>,
    /// Whether the user may post in the active channel.
    pub can_send: bool,
    /// Messages already rendered, oldest first.
    pub history: Vec<Message>,
    /// Channels whose selector was rendered as unread.
    pub unread_channels: Vec<ChannelId>,
}

/// UI-side ends of the session's channels.
pub struct SessionHandle {
    pub commands: mpsc::Sender<UiCommand>,
    pub views: mpsc::UnboundedReceiver<ViewUpdate>,
}

/// Whether the loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Closed,
}

/// Background operations re-entering the loop.
#[derive(Debug)]
enum Settled {
    Send {
        draft: Draft,
        outcome: Result<Value, AckError>,
    },
    ReadReceipt {
        message_id: MessageId,
        result: Result<(), SyncError>,
    },
}

enum Wake {
    Transport(Option<TransportNotification>),
    Settled(Settled),
    Ui(Option<UiCommand>),
    TypingQuiet,
    ReadDue,
}

pub struct ChatSession {
    actor: Actor,
    active: Channel,
    joined: Vec<Channel>,
    can_send: bool,
    closed: bool,

    connection: Connection,
    notifications: mpsc::Receiver<TransportNotification>,
    transport_open: bool,
    commands: mpsc::Receiver<UiCommand>,
    settled_tx: mpsc::UnboundedSender<Settled>,
    settled_rx: mpsc::UnboundedReceiver<Settled>,
    views: mpsc::UnboundedSender<ViewUpdate>,
    receipts: Arc<dyn ReadReceiptSink>,
    read_timeout: Duration,

    queue: SendQueue,
    typing: TypingTracker,
    roster: PresenceRoster,
    read: ReadTracker,
    unread: UnreadTracker,
    log: MessageLog,
    router: CommandRouter,
}

impl ChatSession {
    pub fn new(
        config: &ClientConfig,
        bootstrap: SessionBootstrap,
        transport: TransportHandle,
        receipts: Arc<dyn ReadReceiptSink>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (view_tx, view_rx) = mpsc::unbounded_channel();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();

        let mut unread = UnreadTracker::new();
        for channel in &bootstrap.unread_channels {
            unread.set(*channel, true);
        }

        let session = Self {
            log: MessageLog::with_history(bootstrap.active.id, &bootstrap.history),
            actor: bootstrap.actor,
            active: bootstrap.active,
            joined: bootstrap.joined,
            can_send: bootstrap.can_send,
            closed: false,
            connection: Connection::new(transport.commands, config.ack_timeout),
            notifications: transport.notifications,
            transport_open: true,
            commands: command_rx,
            settled_tx,
            settled_rx,
            views: view_tx,
            receipts,
            read_timeout: config.read_timeout,
            queue: SendQueue::new(),
            typing: TypingTracker::new(config.typing_quiet),
            roster: PresenceRoster::new(),
            read: ReadTracker::new(config.read_debounce),
            unread,
            router: CommandRouter::new(),
        };

        let handle = SessionHandle {
            commands: command_tx,
            views: view_rx,
        };
        (session, handle)
    }

    // -- Accessors ----------------------------------------------------------

    pub fn active_channel(&self) -> &Channel {
        &self.active
    }

    pub fn messages(&self) -> &MessageLog {
        &self.log
    }

    pub fn queue(&self) -> &SendQueue {
        &self.queue
    }

    pub fn read_position(&self) -> MessageId {
        self.read.position()
    }

    pub fn is_unread(&self, channel: ChannelId) -> bool {
        self.unread.is_unread(channel)
    }

    pub fn roster(&self) -> &[OnlineUser] {
        self.roster.users()
    }

    pub fn is_typing(&self) -> bool {
        self.typing.is_typing()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn reply_target(&self) -> Option<MessageId> {
        self.router.reply_target()
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Drive the session until the UI unloads, then tear down.
    pub async fn run(mut self) {
        self.start().await;
        while self.step().await == Step::Continue {}
        self.shutdown().await;
    }

    /// Load-time work: join member channels, mark the rendered history as
    /// read, and clear the active channel's unread marker.
    pub async fn start(&mut self) {
        info!(
            channel = %self.active.slug,
            joined = self.joined.len(),
            history = self.log.entries().len(),
            "Starting chat session"
        );
        if let Err(e) = self.connection.resubscribe(&self.joined).await {
            warn!(error = %e, "Initial join failed");
        }
        if let Some(last) = self.log.last_id() {
            self.read.mark_read(last, Instant::now());
        }
        self.unread.set(self.active.id, false);
        self.emit(ViewUpdate::Unread {
            channel_id: self.active.id,
            unread: false,
        });
        self.emit(ViewUpdate::SendEnabled {
            enabled: self.can_send,
        });
    }

    /// Wait for the next wake-up and handle it.
    ///
    /// Local work is polled before the transport so a burst of server
    /// pushes cannot hold back commands or due timers.
    pub async fn step(&mut self) -> Step {
        let typing_deadline = self.typing.deadline();
        let read_deadline = self.read.deadline();

        let wake = tokio::select! {
            biased;
            Some(settled) = self.settled_rx.recv() => Wake::Settled(settled),
            _ = sleep_until(typing_deadline) => Wake::TypingQuiet,
            _ = sleep_until(read_deadline) => Wake::ReadDue,
            command = self.commands.recv() => Wake::Ui(command),
            notification = self.notifications.recv(), if self.transport_open => {
                Wake::Transport(notification)
            }
        };

        match wake {
            Wake::Transport(Some(notification)) => self.handle_notification(notification).await,
            Wake::Transport(None) => {
                warn!("Transport notification channel closed");
                self.transport_open = false;
                self.connection.set_connected(false);
            }
            Wake::Settled(settled) => self.handle_settled(settled).await,
            Wake::Ui(Some(UiCommand::Unload)) | Wake::Ui(None) => return Step::Closed,
            Wake::Ui(Some(command)) => self.handle_command(command).await,
            Wake::TypingQuiet => {
                if let Some(is_typing) = self.typing.quiet_elapsed() {
                    self.emit_typing(is_typing).await;
                }
            }
            Wake::ReadDue => {
                if let Some(message_id) = self.read.take_due(Instant::now()) {
                    self.spawn_read_receipt(message_id);
                }
            }
        }
        Step::Continue
    }

    /// Page teardown: retract typing, leave the active channel, and flush
    /// any pending read receipt before returning. The flush waits at most
    /// `read_timeout`.
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.typing.stop();
        self.emit_outbound(OutboundEvent::typing(&self.active.slug, false))
            .await;
        self.emit_outbound(OutboundEvent::leave(&self.active.slug))
            .await;

        if let Some(message_id) = self.read.take_pending() {
            let request = self.receipts.post_read(&self.active.slug, message_id);
            match time::timeout(self.read_timeout, request).await {
                Ok(result) => self.handle_read_receipt(message_id, result),
                Err(_) => warn!(
                    message_id = %message_id,
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "Final read receipt abandoned"
                ),
            }
        }

        if self.queue.is_sending() || self.queue.backlog_len() > 0 {
            warn!(
                backlog = self.queue.backlog_len(),
                in_flight = self.queue.is_sending(),
                "Session closed with unsent messages"
            );
        }
        info!(channel = %self.active.slug, "Chat session closed");
    }

    // -- Transport ----------------------------------------------------------

    async fn handle_notification(&mut self, notification: TransportNotification) {
        match notification {
            TransportNotification::Connected => {
                info!("Connection established");
                self.connection.set_connected(true);
                if let Err(e) = self.connection.resubscribe(&self.joined).await {
                    warn!(error = %e, "Re-join after connect failed");
                }
                if let Some(draft) = self.queue.take_next() {
                    self.issue(draft).await;
                }
            }
            TransportNotification::Disconnected { reason } => {
                warn!(reason = %reason, "Connection lost");
                self.connection.set_connected(false);
            }
            TransportNotification::Event(event) => self.handle_inbound(event),
        }
    }

    /// Apply one server push to the local state.
    pub fn handle_inbound(&mut self, event: InboundEvent) {
        debug!(event = event.name(), "Inbound event");
        match event {
            InboundEvent::OnlineUpdate(users) => {
                self.roster.replace(users);
                self.emit(ViewUpdate::RosterReplaced {
                    users: self.roster.users().to_vec(),
                });
            }
            InboundEvent::TypingUpdate(snapshot) => {
                if let Some(indicator) =
                    render_typing(&snapshot, &self.active.slug, self.actor.user_id)
                {
                    self.emit(ViewUpdate::Typing { indicator });
                }
            }
            InboundEvent::NewMessage(message) => match self.log.apply_created(&message) {
                Reconciled::Appended(id) => {
                    if let Some(entry) = self.log.get(id) {
                        self.emit(ViewUpdate::MessageAppended {
                            entry: entry.clone(),
                        });
                    }
                    self.set_unread(self.active.id, false);
                    self.read.mark_read(id, Instant::now());
                }
                Reconciled::Foreign(channel_id) => self.set_unread(channel_id, true),
                _ => {}
            },
            InboundEvent::MessageUpdated(message) => {
                let outcome = self.log.apply_updated(&message);
                self.emit_changed(outcome);
            }
            InboundEvent::MessageDeleted(deleted) => {
                let outcome = self.log.apply_deleted(deleted.message_id);
                self.emit_changed(outcome);
            }
        }
    }

    // -- UI -----------------------------------------------------------------

    async fn handle_command(&mut self, command: UiCommand) {
        match command {
            UiCommand::Input { text } => {
                if !self.can_send {
                    return;
                }
                if let Some(is_typing) = self.typing.input_changed(&text, Instant::now()) {
                    self.emit_typing(is_typing).await;
                }
            }
            UiCommand::Blur => {
                if let Some(is_typing) = self.typing.stop() {
                    self.emit_typing(is_typing).await;
                }
            }
            UiCommand::Send { content } => self.send(content).await,
            UiCommand::OpenContextMenu { message_id } => match self.log.get(message_id) {
                Some(entry) => {
                    let capabilities = Capabilities::for_author(&self.actor, entry.author_id);
                    self.emit(ViewUpdate::ContextMenu {
                        message_id,
                        capabilities,
                    });
                }
                None => debug!(message_id = %message_id, "Context menu on unknown message"),
            },
            UiCommand::Reply { message_id } => {
                self.route(message_id, MessageAction::Reply).await
            }
            UiCommand::Edit {
                message_id,
                content,
            } => self.route(message_id, MessageAction::Edit { content }).await,
            UiCommand::Delete {
                message_id,
                confirmed,
            } => {
                self.route(message_id, MessageAction::Delete { confirmed })
                    .await
            }
            UiCommand::DismissReply => {
                if self.router.dismiss_reply() {
                    self.emit(ViewUpdate::ReplyBanner { text: None });
                }
            }
            // Handled by `step`.
            UiCommand::Unload => {}
        }
    }

    async fn send(&mut self, content: String) {
        if !self.can_send {
            debug!("Send ignored, user may not post here");
            return;
        }
        let content = content.trim();
        if content.is_empty() {
            return;
        }

        let reply_to = self.router.take_reply();
        let draft = Draft::new(self.active.slug.clone(), content, reply_to);
        if let Some(draft) = self.queue.submit(draft) {
            self.issue(draft).await;
        }

        self.emit(ViewUpdate::InputCleared);
        self.emit(ViewUpdate::ReplyBanner { text: None });
        if let Some(is_typing) = self.typing.stop() {
            self.emit_typing(is_typing).await;
        }
    }

    async fn route(&mut self, message_id: MessageId, action: MessageAction) {
        let routed = self
            .router
            .route(&self.actor, self.log.get(message_id), message_id, action);
        match routed {
            Ok(Routed::ReplyBanner(text)) => {
                self.emit(ViewUpdate::ReplyBanner { text: Some(text) })
            }
            Ok(Routed::Emit(event)) => self.emit_outbound(event).await,
            Err(e) => debug!(error = %e, "Command not routed"),
        }
    }

    // -- Send queue ---------------------------------------------------------

    /// Hand the in-flight draft to the transport and wait for its
    /// acknowledgment off the loop.
    async fn issue(&mut self, draft: Draft) {
        self.emit(ViewUpdate::SendEnabled { enabled: false });

        let event = OutboundEvent::SendMessage(draft.payload());
        match self.connection.request(event).await {
            Ok(waiter) => {
                debug!(draft = %draft.local_id, "Send issued");
                let settled = self.settled_tx.clone();
                tokio::spawn(async move {
                    let outcome = waiter.wait().await;
                    let _ = settled.send(Settled::Send { draft, outcome });
                });
            }
            Err(e) => {
                // Nothing reached the transport; wait for the next connect
                // instead of retrying in a tight loop.
                warn!(draft = %draft.local_id, error = %e, "Send could not be issued");
                self.queue.requeue(draft);
                self.emit(ViewUpdate::SendEnabled {
                    enabled: self.can_send,
                });
            }
        }
    }

    async fn handle_settled(&mut self, settled: Settled) {
        match settled {
            Settled::Send { draft, outcome } => {
                let outcome = outcome.map(|value| {
                    SendAck::from_value(value).unwrap_or_else(|e| {
                        warn!(draft = %draft.local_id, error = %e, "Unreadable acknowledgment");
                        SendAck {
                            ok: false,
                            message: None,
                        }
                    })
                });

                match self.queue.settle(draft, outcome) {
                    Settlement::Delivered(Some(message)) => {
                        if message.channel_id == self.active.id {
                            self.read.mark_read(message.id, Instant::now());
                        }
                    }
                    Settlement::Delivered(None) | Settlement::Requeued => {}
                    Settlement::Rejected(draft) => {
                        self.emit(ViewUpdate::SendRejected {
                            content: draft.content,
                        });
                    }
                }
                self.emit(ViewUpdate::SendEnabled {
                    enabled: self.can_send,
                });

                if let Some(next) = self.queue.take_next() {
                    self.issue(next).await;
                }
            }
            Settled::ReadReceipt { message_id, result } => {
                self.handle_read_receipt(message_id, result)
            }
        }
    }

    // -- Read receipts ------------------------------------------------------

    fn spawn_read_receipt(&self, message_id: MessageId) {
        let request = self.receipts.post_read(&self.active.slug, message_id);
        let settled = self.settled_tx.clone();
        tokio::spawn(async move {
            let result = request.await;
            let _ = settled.send(Settled::ReadReceipt { message_id, result });
        });
    }

    fn handle_read_receipt(&mut self, message_id: MessageId, result: Result<(), SyncError>) {
        match result {
            Ok(()) => {
                debug!(message_id = %message_id, "Read receipt stored");
                self.set_unread(self.active.id, false);
            }
            Err(e) => debug!(message_id = %message_id, error = %e, "Read receipt failed"),
        }
    }

    // -- Helpers ------------------------------------------------------------

    fn set_unread(&mut self, channel_id: ChannelId, unread: bool) {
        if self.unread.set(channel_id, unread) {
            self.emit(ViewUpdate::Unread { channel_id, unread });
        }
    }

    fn emit_changed(&self, outcome: Reconciled) {
        let id = match outcome {
            Reconciled::Edited(id) | Reconciled::Tombstoned(id) => id,
            _ => return,
        };
        if let (Some(position), Some(entry)) = (self.log.position(id), self.log.get(id)) {
            self.emit(ViewUpdate::MessageChanged {
                position,
                entry: entry.clone(),
            });
        }
    }

    async fn emit_typing(&self, is_typing: bool) {
        self.emit_outbound(OutboundEvent::typing(&self.active.slug, is_typing))
            .await;
    }

    async fn emit_outbound(&self, event: OutboundEvent) {
        let name = event.name();
        if let Err(e) = self.connection.emit(event).await {
            warn!(event = name, error = %e, "Emit failed");
        }
    }

    fn emit(&self, update: ViewUpdate) {
        emit_view(&self.views, update);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
