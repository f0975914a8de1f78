use redis::{Client, Connection, ErrorKind, RedisError, RedisResult};

use crate::prelude::*;

/// Resolves the current primary of a Sentinel-monitored service and opens a
/// direct connection to it.
///
/// One discovery pass asks each configured sentinel in order for
/// `SENTINEL get-master-addr-by-name <service>` and connects to the first
/// resolved address. No pub/sub monitoring of failover events happens here;
/// staleness is handled by the retry loop calling back in.
///
/// Safe to call repeatedly: each call performs a fresh lookup, which is
/// exactly what the reconnect sequence needs mid-failover.
pub struct SentinelConnector {
    sentinels: Vec<Client>,
    service_name: String,
    password: Option<String>,
    db: i64,
}

impl SentinelConnector {
    /// Create a connector from sentinel urls (like `redis://10.0.0.1:26379`)
    /// and the monitored service name.
    pub fn new<S: Into<String>>(
        sentinel_urls: impl IntoIterator<Item = S>,
        service_name: impl Into<String>,
    ) -> RResult<Self, AnyErr> {
        let mut sentinels = Vec::new();
        for url in sentinel_urls {
            let url = url.into();
            sentinels.push(
                Client::open(url.as_str())
                    .change_context(AnyErr)
                    .attach_printable_lazy(|| format!("Invalid sentinel url: '{}'.", url))?,
            );
        }
        if sentinels.is_empty() {
            return Err(anyerr!("At least one sentinel url must be provided."));
        }
        Ok(Self {
            sentinels,
            service_name: service_name.into(),
            password: None,
            db: 0,
        })
    }

    /// Authenticate against the resolved primary with this password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Select this database on the resolved primary.
    pub fn db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// One full discovery pass. Errors come back as plain client errors so the
    /// retry engine can classify (and the reconnect sequence suppress) them.
    pub fn connect(&self) -> RedisResult<Connection> {
        let mut last_err: Option<RedisError> = None;
        for sentinel in &self.sentinels {
            match self.try_sentinel(sentinel) {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    debug!(
                        "Sentinel lookup failed for service '{}': {}",
                        self.service_name, e
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            RedisError::from((ErrorKind::MasterDown, "no sentinel could resolve a primary"))
        }))
    }

    fn try_sentinel(&self, sentinel: &Client) -> RedisResult<Connection> {
        let mut conn = sentinel.get_connection()?;
        let addr: Option<(String, u16)> = redis::cmd("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(&self.service_name)
            .query(&mut conn)?;
        let (host, port) = addr.ok_or_else(|| {
            RedisError::from((
                ErrorKind::MasterDown,
                "sentinel does not know the requested service",
                self.service_name.clone(),
            ))
        })?;
        let url = match &self.password {
            Some(pw) => format!("redis://:{}@{}:{}/{}", pw, host, port, self.db),
            None => format!("redis://{}:{}/{}", host, port, self.db),
        };
        Client::open(url.as_str())?.get_connection()
    }

    /// Box it up as the guarded client's pluggable connector.
    pub fn into_connector(self) -> Box<dyn FnMut() -> RedisResult<Connection> + Send> {
        Box::new(move || self.connect())
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;
    use crate::redis::should_retry;

    #[rstest]
    fn test_rejects_empty_sentinel_list() {
        assert!(SentinelConnector::new(Vec::<String>::new(), "mymaster").is_err());
    }

    #[rstest]
    fn test_rejects_invalid_url() {
        assert!(SentinelConnector::new(["not a url"], "mymaster").is_err());
    }

    #[rstest]
    fn test_unreachable_sentinel_yields_retryable_error() {
        let port = portpicker::pick_unused_port().expect("no free port");
        let connector =
            SentinelConnector::new([format!("redis://127.0.0.1:{port}")], "mymaster").unwrap();
        let err = connector.connect().err().expect("connect should fail");
        // A refused connection is exactly the retry-worthy kind, so discovery
        // failures feed straight back into the retry loop.
        assert!(should_retry(&err, "testhost"));
    }
}
