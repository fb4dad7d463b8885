// Wire types shared by the chat synchronization client and its tooling.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{InboundEvent, Message, OutboundEvent, SendAck};
pub use types::{Channel, ChannelId, MessageId, UserId};
