use crate::prelude::*;

/// The tracing target health-relevant classification outcomes are emitted on.
/// Lines on this target carry a `host` field so they can be aggregated
/// fleet-wide by an observability pipeline.
pub const HEALTH_TARGET: &str = "redguard::health";

/// Install a global stderr fmt subscriber covering everything up to
/// `max_level`, including the health channel.
///
/// Note this should only be done once at startup, and only when the embedding
/// application doesn't install its own subscriber.
pub fn install_fmt_logger(max_level: tracing::Level) -> RResult<(), AnyErr> {
    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyerr!("Failed to install the global tracing subscriber: {}", e))
}
