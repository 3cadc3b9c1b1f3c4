//! HTTP surface of the chat service plus the shared bits of its binaries.

pub mod error;
pub mod handlers;
pub mod router;

pub use router::build_router;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `KBCHAT_LOG` wins over `RUST_LOG`; default `info`.
pub fn init_tracing() {
    let filter = std::env::var("KBCHAT_LOG")
        .ok()
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
