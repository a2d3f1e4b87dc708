//! Log setup for the `observers` binary.
//!
//! Tool output owns stdout, so every log line goes to stderr. `RUST_LOG`
//! wins when set; otherwise only the observers crates log, at the level the
//! caller picked, and dependencies stay at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Crates whose events follow the requested level.
pub const LOG_TARGETS: [&str; 3] = ["observers_core", "observers_state", "observers"];

/// Filter used when `RUST_LOG` is unset, e.g. `warn,observers_core=debug,...`.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for target in LOG_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Install the global subscriber. Later calls leave the first one in place.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let output = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let output = if json {
        output.json().with_current_span(true).boxed()
    } else {
        output.with_ansi(false).compact().boxed()
    };

    if tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing already initialised");
    }
}
