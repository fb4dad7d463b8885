pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod presence;
pub mod read_sync;
pub mod reconciler;
pub mod send_queue;
pub mod session;
pub mod typing;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use connection::{transport_channel, TransportCommand, TransportNotification};
pub use events::{UiCommand, ViewUpdate};
pub use read_sync::{HttpReadReceipts, ReadReceiptSink};
pub use session::{ChatSession, SessionBootstrap, SessionHandle, Step};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Logs go to stderr so stdout stays free for tooling output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley_client=debug,parley_shared=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
