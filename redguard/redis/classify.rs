use redis::{ErrorKind, RedisError};

use crate::log::HEALTH_TARGET;

/// Lowercased message fragments that mark the current node as
/// gone/unusable, i.e. retry-worthy after a reconnect.
///
/// Substring matching against upstream wording is inherently fragile, so these
/// live here as data: when the client library or server changes its phrasing,
/// only these lists need editing, never the control flow around them.
pub(crate) const UNAVAILABILITY_PHRASES: &[&str] = &[
    "connection closed",
    "connection refused",
    "connection lost",
    "failed while reconnecting",
    "is loading the dataset in memory",
    "read error on connection",
    "socket",
    "went away",
    "loading",
    "readonly",
    "can't write against a read only replica",
    "connection timed out",
    "broken pipe",
    "connection reset",
];

/// Lowercased fragments of name-resolution failures. These permit a retry
/// regardless of the error's category, and are additionally suppressed during
/// the reconnect sequence itself so DNS flakiness never aborts it.
pub(crate) const NAME_RESOLUTION_PHRASES: &[&str] = &[
    "getaddrinfo",
    "name or service not known",
    "failed to lookup address",
];

/// The retry decision derived from a single failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A protocol-layer unavailability, worth another attempt after reconnecting.
    Retryable,
    /// A name-resolution failure, retry-worthy whatever the error's category.
    NameResolution,
    /// Anything else, surfaced to the caller on first occurrence.
    Fatal,
}

impl FailureKind {
    /// Both transient classifications permit another attempt. They only
    /// diverge inside the reconnect sequence's error suppression.
    pub fn permits_retry(self) -> bool {
        !matches!(self, FailureKind::Fatal)
    }
}

/// Classify a single failure. Matching is substring, case-insensitive,
/// first-match-wins over the ordered phrase lists.
pub fn classify(err: &RedisError) -> FailureKind {
    let msg = err.to_string().to_lowercase();
    if is_protocol_layer(err) && first_match(&msg, UNAVAILABILITY_PHRASES).is_some() {
        return FailureKind::Retryable;
    }
    if first_match(&msg, NAME_RESOLUTION_PHRASES).is_some() {
        return FailureKind::NameResolution;
    }
    FailureKind::Fatal
}

/// The retry engine's decision point: should this failure be attempted again?
///
/// True when the error is a protocol-layer error whose message contains an
/// unavailability phrase, or when the message contains a name-resolution
/// phrase (any category). Classification outcomes for protocol-layer errors
/// are logged on the health channel; name-resolution-only matches are not.
pub fn should_retry(err: &RedisError, host: &str) -> bool {
    let msg = err.to_string().to_lowercase();
    if is_protocol_layer(err) {
        if let Some(matched) = first_match(&msg, UNAVAILABILITY_PHRASES) {
            tracing::info!(
                target: HEALTH_TARGET,
                host,
                matched,
                error = %msg,
                "Redis unavailable, retrying."
            );
            return true;
        }
    }
    if first_match(&msg, NAME_RESOLUTION_PHRASES).is_some() {
        return true;
    }
    if is_protocol_layer(err) {
        tracing::info!(target: HEALTH_TARGET, host, error = %msg, "Redis error not retryable.");
    }
    false
}

pub(crate) fn is_name_resolution(err: &RedisError) -> bool {
    first_match(&err.to_string().to_lowercase(), NAME_RESOLUTION_PHRASES).is_some()
}

/// Connection/protocol-layer error kinds, as opposed to application-level ones
/// like [`ErrorKind::TypeError`] which no amount of reconnecting will fix.
pub(crate) fn is_protocol_layer(err: &RedisError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::IoError
            | ErrorKind::ResponseError
            | ErrorKind::BusyLoadingError
            | ErrorKind::TryAgain
            | ErrorKind::MasterDown
            | ErrorKind::ClusterDown
            | ErrorKind::ReadOnly
    )
}

fn first_match<'a>(msg: &str, phrases: &'a [&'a str]) -> Option<&'a str> {
    phrases.iter().copied().find(|&phrase| msg.contains(phrase))
}
