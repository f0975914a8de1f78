use std::fmt;

use redis::{Cmd, ConnectionLike, FromRedisValue, Pipeline, RedisResult, ToRedisArgs, Value};

use super::{reconnect, RedisGuardErr, RetryPolicy};

/// A guarded redis client: owns the underlying connection handle and forwards
/// every command through the retry engine, reconnecting via the pluggable
/// connector between attempts.
///
/// Composition rather than inheritance over the underlying client: the handle
/// is exclusively owned and swapped wholesale on reconnect, never mutated in
/// place. There is no internal locking; a caller wanting concurrency holds one
/// guard per thread, as is standard for redis connections.
pub struct RedisGuard<C: ConnectionLike = redis::Connection> {
    conn: C,
    connector: Option<Box<dyn FnMut() -> RedisResult<C> + Send>>,
    policy: RetryPolicy,
    host: String,
}

impl<C: ConnectionLike> fmt::Debug for RedisGuard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisGuard")
            .field("host", &self.host)
            .field("policy", &self.policy)
            .field("has_connector", &self.connector.is_some())
            .finish_non_exhaustive()
    }
}

impl<C: ConnectionLike> RedisGuard<C> {
    /// Guard an existing handle without a connector: failures still retry, but
    /// reconnection keeps the existing handle as-is.
    pub fn new(conn: C, policy: RetryPolicy) -> Self {
        Self {
            conn,
            connector: None,
            policy,
            host: local_hostname(),
        }
    }

    /// Guard an existing handle, replacing it through `connector` whenever a
    /// retry-worthy failure occurs.
    pub fn with_connector(
        conn: C,
        connector: impl FnMut() -> RedisResult<C> + Send + 'static,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            conn,
            connector: Some(Box::new(connector)),
            policy,
            host: local_hostname(),
        }
    }

    /// Obtain the initial handle through the connector itself, under the same
    /// retry policy guarded calls will use.
    pub fn from_connector(
        mut connector: impl FnMut() -> RedisResult<C> + Send + 'static,
        policy: RetryPolicy,
    ) -> Result<Self, RedisGuardErr> {
        let host = local_hostname();
        let conn = policy.call(&host, &mut connector)?;
        Ok(Self {
            conn,
            connector: Some(Box::new(connector)),
            policy,
            host,
        })
    }

    /// The host identifier tagged onto health-channel log lines.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The default policy applied when no per-call override is given.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Escape hatch: the underlying connection handle.
    pub fn inner(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Escape hatch: unwrap into the underlying connection handle.
    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Dispose of the current handle and acquire a fresh one via the
    /// connector. Called automatically between retry attempts; exposed for
    /// callers that detect staleness out-of-band.
    pub fn force_reconnect(&mut self) -> Result<(), RedisGuardErr> {
        reconnect::force_reconnect(&mut self.conn, self.connector.as_deref_mut(), &self.host)
    }

    /// Run an arbitrary prepared command under the default policy.
    pub fn run<RV: FromRedisValue>(&mut self, cmd: &Cmd) -> Result<RV, RedisGuardErr> {
        let policy = self.policy;
        self.run_with(cmd, policy)
    }

    /// Run an arbitrary prepared command under a per-call policy override.
    pub fn run_with<RV: FromRedisValue>(
        &mut self,
        cmd: &Cmd,
        policy: RetryPolicy,
    ) -> Result<RV, RedisGuardErr> {
        crate::redis_retry!(policy, &self.host, { cmd.query::<RV>(&mut self.conn) }, {
            reconnect::force_reconnect(&mut self.conn, self.connector.as_deref_mut(), &self.host)
        })
    }

    /// Run a prepared pipeline (or transaction, via [`Pipeline::atomic`])
    /// under the default policy. The whole pipeline is retried as a unit.
    pub fn pipeline<RV: FromRedisValue>(&mut self, pipe: &Pipeline) -> Result<RV, RedisGuardErr> {
        let policy = self.policy;
        self.pipeline_with(pipe, policy)
    }

    /// Run a prepared pipeline under a per-call policy override.
    pub fn pipeline_with<RV: FromRedisValue>(
        &mut self,
        pipe: &Pipeline,
        policy: RetryPolicy,
    ) -> Result<RV, RedisGuardErr> {
        crate::redis_retry!(policy, &self.host, { pipe.query::<RV>(&mut self.conn) }, {
            reconnect::force_reconnect(&mut self.conn, self.connector.as_deref_mut(), &self.host)
        })
    }

    /// Dispatch a command the typed surface doesn't cover.
    ///
    /// The name is lowercased before forwarding, callers may pass mixed case.
    /// Args can be a single value, a tuple or a slice; pass
    /// `Option::<String>::None` when there are none. The reply comes back as
    /// the generic [`Value`].
    pub fn command<A: ToRedisArgs>(&mut self, name: &str, args: A) -> Result<Value, RedisGuardErr> {
        let mut cmd = redis::cmd(&name.to_lowercase());
        cmd.arg(args);
        self.run(&cmd)
    }

    // <--- The typed command surface. Mechanical: each forwards through the
    // retry engine via run().

    /// PING, returning the server's reply ("PONG" when healthy).
    pub fn ping(&mut self) -> Result<String, RedisGuardErr> {
        self.run(&redis::cmd("PING"))
    }

    /// GET a key. Use an `Option` return type to distinguish missing keys.
    pub fn get<K: ToRedisArgs, RV: FromRedisValue>(&mut self, key: K) -> Result<RV, RedisGuardErr> {
        self.run(redis::cmd("GET").arg(key))
    }

    /// SET a key, with an optional expiry (millisecond accuracy).
    pub fn set<K: ToRedisArgs, V: ToRedisArgs>(
        &mut self,
        key: K,
        value: V,
        expiry: Option<chrono::Duration>,
    ) -> Result<(), RedisGuardErr> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(expiry) = expiry {
            cmd.arg("PX").arg(expiry.num_milliseconds().max(1));
        }
        self.run(&cmd)
    }

    /// MGET a batch of keys.
    pub fn mget<K: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        keys: K,
    ) -> Result<RV, RedisGuardErr> {
        self.run(redis::cmd("MGET").arg(keys))
    }

    /// DEL one or more keys, returning how many existed.
    pub fn del<K: ToRedisArgs>(&mut self, keys: K) -> Result<usize, RedisGuardErr> {
        self.run(redis::cmd("DEL").arg(keys))
    }

    /// EXISTS for a single key.
    pub fn exists<K: ToRedisArgs>(&mut self, key: K) -> Result<bool, RedisGuardErr> {
        self.run(redis::cmd("EXISTS").arg(key))
    }

    /// EXPIRE a key (second accuracy), true when the key existed.
    pub fn expire<K: ToRedisArgs>(
        &mut self,
        key: K,
        expiry: chrono::Duration,
    ) -> Result<bool, RedisGuardErr> {
        self.run(redis::cmd("EXPIRE").arg(key).arg(expiry.num_seconds().max(1)))
    }

    /// TTL of a key in seconds (-1 no expiry, -2 missing).
    pub fn ttl<K: ToRedisArgs>(&mut self, key: K) -> Result<i64, RedisGuardErr> {
        self.run(redis::cmd("TTL").arg(key))
    }

    /// INCRBY, returning the new value.
    pub fn incr_by<K: ToRedisArgs>(&mut self, key: K, delta: i64) -> Result<i64, RedisGuardErr> {
        self.run(redis::cmd("INCRBY").arg(key).arg(delta))
    }

    /// HGET a single hash field.
    pub fn hget<K: ToRedisArgs, F: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        field: F,
    ) -> Result<RV, RedisGuardErr> {
        self.run(redis::cmd("HGET").arg(key).arg(field))
    }

    /// HSET a single hash field, returning how many fields were newly created.
    pub fn hset<K: ToRedisArgs, F: ToRedisArgs, V: ToRedisArgs>(
        &mut self,
        key: K,
        field: F,
        value: V,
    ) -> Result<usize, RedisGuardErr> {
        self.run(redis::cmd("HSET").arg(key).arg(field).arg(value))
    }

    /// HDEL hash fields, returning how many were removed.
    pub fn hdel<K: ToRedisArgs, F: ToRedisArgs>(
        &mut self,
        key: K,
        fields: F,
    ) -> Result<usize, RedisGuardErr> {
        self.run(redis::cmd("HDEL").arg(key).arg(fields))
    }

    /// HGETALL, e.g. into a `HashMap<String, String>`.
    pub fn hgetall<K: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
    ) -> Result<RV, RedisGuardErr> {
        self.run(redis::cmd("HGETALL").arg(key))
    }

    /// LPUSH, returning the list's new length.
    pub fn lpush<K: ToRedisArgs, V: ToRedisArgs>(
        &mut self,
        key: K,
        values: V,
    ) -> Result<usize, RedisGuardErr> {
        self.run(redis::cmd("LPUSH").arg(key).arg(values))
    }

    /// RPUSH, returning the list's new length.
    pub fn rpush<K: ToRedisArgs, V: ToRedisArgs>(
        &mut self,
        key: K,
        values: V,
    ) -> Result<usize, RedisGuardErr> {
        self.run(redis::cmd("RPUSH").arg(key).arg(values))
    }

    /// LPOP a single element.
    pub fn lpop<K: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
    ) -> Result<RV, RedisGuardErr> {
        self.run(redis::cmd("LPOP").arg(key))
    }

    /// LRANGE over the inclusive index range.
    pub fn lrange<K: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        start: isize,
        stop: isize,
    ) -> Result<RV, RedisGuardErr> {
        self.run(redis::cmd("LRANGE").arg(key).arg(start).arg(stop))
    }

    /// LLEN of a list.
    pub fn llen<K: ToRedisArgs>(&mut self, key: K) -> Result<usize, RedisGuardErr> {
        self.run(redis::cmd("LLEN").arg(key))
    }

    /// SADD members, returning how many were newly added.
    pub fn sadd<K: ToRedisArgs, V: ToRedisArgs>(
        &mut self,
        key: K,
        members: V,
    ) -> Result<usize, RedisGuardErr> {
        self.run(redis::cmd("SADD").arg(key).arg(members))
    }

    /// SREM members, returning how many were removed.
    pub fn srem<K: ToRedisArgs, V: ToRedisArgs>(
        &mut self,
        key: K,
        members: V,
    ) -> Result<usize, RedisGuardErr> {
        self.run(redis::cmd("SREM").arg(key).arg(members))
    }

    /// SMEMBERS of a set.
    pub fn smembers<K: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
    ) -> Result<RV, RedisGuardErr> {
        self.run(redis::cmd("SMEMBERS").arg(key))
    }

    /// SISMEMBER membership check.
    pub fn sismember<K: ToRedisArgs, V: ToRedisArgs>(
        &mut self,
        key: K,
        member: V,
    ) -> Result<bool, RedisGuardErr> {
        self.run(redis::cmd("SISMEMBER").arg(key).arg(member))
    }

    /// ZADD a single scored member, returning how many were newly added.
    pub fn zadd<K: ToRedisArgs, S: ToRedisArgs, V: ToRedisArgs>(
        &mut self,
        key: K,
        score: S,
        member: V,
    ) -> Result<usize, RedisGuardErr> {
        self.run(redis::cmd("ZADD").arg(key).arg(score).arg(member))
    }

    /// ZRANGE over the inclusive index range.
    pub fn zrange<K: ToRedisArgs, RV: FromRedisValue>(
        &mut self,
        key: K,
        start: isize,
        stop: isize,
    ) -> Result<RV, RedisGuardErr> {
        self.run(redis::cmd("ZRANGE").arg(key).arg(start).arg(stop))
    }

    /// PUBLISH a message, returning the receiver count.
    pub fn publish<V: ToRedisArgs>(
        &mut self,
        channel: &str,
        message: V,
    ) -> Result<usize, RedisGuardErr> {
        self.run(redis::cmd("PUBLISH").arg(channel).arg(message))
    }

    /// EVAL a lua script with explicit keys and args.
    pub fn eval<RV: FromRedisValue>(
        &mut self,
        script: &str,
        keys: &[&str],
        args: &[&str],
    ) -> Result<RV, RedisGuardErr> {
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(script).arg(keys.len()).arg(keys).arg(args);
        self.run(&cmd)
    }

    /// Collect all keys matching `pattern` via cursored SCAN. Each page is an
    /// individually retried operation.
    pub fn scan_match(&mut self, pattern: &str) -> Result<Vec<String>, RedisGuardErr> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, mut page): (u64, Vec<String>) =
                self.run(redis::cmd("SCAN").arg(cursor).arg("MATCH").arg(pattern))?;
            keys.append(&mut page);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

pub(crate) fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_owned())
}

#[cfg(test)]
mod tests {
    use redis::ErrorKind;
    use rstest::*;

    use super::*;
    use crate::redis::test_support::{io_err, type_err, MockConn};

    #[rstest]
    fn test_facade_retries_through_reconnect() {
        // GET fails with a retryable error, QUIT succeeds on the broken
        // handle, the connector hands over a working replacement.
        let conn = MockConn::new(
            1,
            [Err(io_err("read error on connection")), Ok(Value::Okay)],
        );
        let mut guard = RedisGuard::with_connector(
            conn,
            || Ok(MockConn::new(2, [Ok(Value::BulkString(b"bar".to_vec()))])),
            RetryPolicy::new(3, chrono::Duration::zero()),
        );
        let out: Option<String> = guard.get("foo").unwrap();
        assert_eq!(out, Some("bar".to_string()));
        assert_eq!(guard.inner().id, 2);
    }

    #[rstest]
    fn test_fatal_error_passes_through() {
        let conn = MockConn::new(1, [Err(type_err("WRONGTYPE Operation against a key"))]);
        let mut guard = RedisGuard::new(conn, RetryPolicy::new(3, chrono::Duration::zero()));
        match guard.get::<_, Option<String>>("foo") {
            Err(RedisGuardErr::Fatal(e)) => assert_eq!(e.kind(), ErrorKind::TypeError),
            other => panic!("expected fatal, got {:?}", other),
        }
        // Exactly one request, no QUIT/reconnect traffic.
        assert_eq!(guard.inner().requests.len(), 1);
    }

    #[rstest]
    fn test_exhaustion_without_connector() {
        // GET fails, QUIT succeeds, retried GET fails again: budget of 1 gone.
        let conn = MockConn::new(
            1,
            [
                Err(io_err("connection refused")),
                Ok(Value::Okay),
                Err(io_err("connection refused")),
            ],
        );
        let mut guard = RedisGuard::new(conn, RetryPolicy::new(1, chrono::Duration::zero()));
        match guard.get::<_, Option<String>>("foo") {
            Err(RedisGuardErr::RetryExhausted { attempts, .. }) => assert_eq!(attempts, 1),
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[rstest]
    fn test_dynamic_dispatch_lowercases_command_name() {
        let conn = MockConn::new(1, [Ok(Value::Okay)]);
        let mut guard = RedisGuard::new(conn, RetryPolicy::no_retry());
        guard.command("FLUSHDB", Option::<String>::None).unwrap();
        let requests = guard.inner().requests_utf8();
        assert!(requests[0].contains("flushdb"), "sent: {:?}", requests);
        assert!(!requests[0].contains("FLUSHDB"), "sent: {:?}", requests);
    }

    #[rstest]
    fn test_per_call_policy_override() {
        let conn = MockConn::new(1, [Err(io_err("connection lost"))]);
        let mut guard = RedisGuard::new(conn, RetryPolicy::new(5, chrono::Duration::zero()));
        // Override to no_retry: a single attempt, immediate exhaustion.
        let out: Result<Option<String>, _> =
            guard.run_with(redis::cmd("GET").arg("foo"), RetryPolicy::no_retry());
        match out {
            Err(RedisGuardErr::RetryExhausted { attempts, .. }) => assert_eq!(attempts, 0),
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(guard.inner().requests.len(), 1);
    }

    #[rstest]
    fn test_pipeline_retries_as_a_unit() {
        let conn = MockConn::new(1, [Err(io_err("connection lost")), Ok(Value::Okay)]);
        let mut guard = RedisGuard::with_connector(
            conn,
            || Ok(MockConn::new(2, [Ok(Value::Okay)])),
            RetryPolicy::new(2, chrono::Duration::zero()),
        );
        let mut pipe = redis::pipe();
        pipe.cmd("SET").arg("a").arg("1").cmd("SET").arg("b").arg("2");
        let _: ((), ()) = guard.pipeline(&pipe).unwrap();
        assert_eq!(guard.inner().id, 2);
    }
}
