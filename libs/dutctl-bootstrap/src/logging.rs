//! Process-wide `tracing` setup: an `EnvFilter` driven by `RUST_LOG` (or a
//! `-v` count from the CLI) plus a single fmt layer to stderr. The agent
//! has one log stream and no per-subsystem routing requirement, so there's
//! no rotation or multi-sink machinery here.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialises the global `tracing` subscriber.
///
/// `verbosity` is a `-v` repeat count from the CLI (0 = info, 1 = debug,
/// 2+ = trace); `RUST_LOG`, when set, always wins over it.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = fmt::layer().with_target(true).with_timer(fmt::time::UtcTime::rfc_3339());

    let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();
}
