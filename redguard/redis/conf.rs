use redis::Connection;
use serde::{Deserialize, Serialize};

use super::{RedisGuard, RetryPolicy, SentinelConnector};
use super::retry::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
use crate::prelude::*;

/// Construction config for a guarded client, shaped for deserialization from
/// whatever external config source the embedding application uses.
///
/// The retry fields become the process-wide defaults of the built guard;
/// individual calls can still override via
/// [`RedisGuard::run_with`](super::RedisGuard::run_with).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisGuardConf {
    /// Sentinel urls, tried in order during each discovery pass.
    pub sentinels: Vec<String>,
    /// The sentinel-monitored service name to resolve the primary of.
    pub service_name: String,
    /// Retries after the initial attempt. 0 disables retrying.
    #[serde(default = "defaults::retry_attempts")]
    pub retry_attempts: usize,
    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "defaults::retry_delay_ms")]
    pub retry_delay_ms: i64,
    /// Password for the resolved primary, when required.
    #[serde(default)]
    pub password: Option<String>,
    /// Database index to select on the resolved primary.
    #[serde(default)]
    pub db: i64,
}

mod defaults {
    pub(super) fn retry_attempts() -> usize {
        super::DEFAULT_RETRY_ATTEMPTS
    }

    pub(super) fn retry_delay_ms() -> i64 {
        super::DEFAULT_RETRY_DELAY_MS
    }
}

impl RedisGuardConf {
    /// Parse from a json document.
    pub fn from_json(json: &str) -> RResult<Self, AnyErr> {
        serde_json::from_str(json)
            .change_context(AnyErr)
            .attach_printable("Invalid redis guard config.")
    }

    /// The retry policy these values describe.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            chrono::Duration::milliseconds(self.retry_delay_ms),
        )
    }

    /// Build the sentinel connector these values describe.
    pub fn connector(&self) -> RResult<SentinelConnector, AnyErr> {
        let mut connector =
            SentinelConnector::new(self.sentinels.iter().cloned(), self.service_name.clone())?;
        if let Some(pw) = &self.password {
            connector = connector.password(pw.clone());
        }
        Ok(connector.db(self.db))
    }

    /// Discover the primary and build a connected guard.
    pub fn build(&self) -> RResult<RedisGuard<Connection>, AnyErr> {
        let connector = self.connector()?.into_connector();
        RedisGuard::from_connector(connector, self.policy())
            .change_context(AnyErr)
            .attach_printable("Initial connection through sentinel discovery failed.")
    }
}
