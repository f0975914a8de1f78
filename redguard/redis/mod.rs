mod classify;
mod client;
mod conf;
mod reconnect;
mod retry;
mod sentinel;

#[cfg(test)]
pub(crate) mod test_support;

pub use classify::{classify, should_retry, FailureKind};
pub use client::RedisGuard;
pub use conf::RedisGuardConf;
#[doc(hidden)]
pub use retry::sleep_between_attempts;
pub use retry::{RedisGuardErr, RetryPolicy, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
pub use sentinel::SentinelConnector;

#[cfg(test)]
mod tests {
    use std::process::{Child, Command};

    use portpicker::is_free;
    use rstest::*;

    use super::*;
    use crate::{errors::prelude::*, misc::in_ci};

    struct ChildGuard(Child);

    impl Drop for ChildGuard {
        fn drop(&mut self) {
            match self.0.kill() {
                Err(e) => println!("Could not kill child process: {}", e),
                Ok(_) => println!("Successfully killed child process"),
            }
        }
    }

    /// End-to-end against a real server: the guarded surface and a forced
    /// reconnect mid-session.
    #[rstest]
    fn test_guard_against_live_redis() -> RResult<(), AnyErr> {
        // Don't want to install redis in ci, just run this test locally:
        if in_ci() {
            return Ok(());
        }

        // Make sure redis is running on port 6379, starting it otherwise. (this
        // means you must have redis installed)
        let mut _redis_guard: Option<ChildGuard> = None;
        if is_free(6379) {
            _redis_guard = Some(ChildGuard(
                Command::new("redis-server")
                    .arg("--port")
                    .arg("6379")
                    .spawn()
                    .change_context(AnyErr)?,
            ));
            // Give redis time to start:
            std::thread::sleep(std::time::Duration::from_millis(50));
        }

        let client = redis::Client::open("redis://127.0.0.1:6379").change_context(AnyErr)?;
        let mut guard = RedisGuard::from_connector(
            move || client.get_connection(),
            RetryPolicy::new(3, chrono::Duration::milliseconds(10)),
        )
        .change_context(AnyErr)?;

        assert_eq!(guard.ping().change_context(AnyErr)?, "PONG");

        guard
            .set("redguard_test:foo", "bar", None)
            .change_context(AnyErr)?;
        assert_eq!(
            guard
                .get::<_, Option<String>>("redguard_test:foo")
                .change_context(AnyErr)?,
            Some("bar".to_string())
        );
        assert!(guard.exists("redguard_test:foo").change_context(AnyErr)?);

        // Dynamic dispatch with a mixed case name:
        let echoed = guard.command("ECHO", "hello").change_context(AnyErr)?;
        assert_eq!(echoed, redis::Value::BulkString(b"hello".to_vec()));

        // Survives a forced reconnect mid-session:
        guard.force_reconnect().change_context(AnyErr)?;
        assert_eq!(
            guard
                .get::<_, Option<String>>("redguard_test:foo")
                .change_context(AnyErr)?,
            Some("bar".to_string())
        );

        // Pipelines go through the same engine:
        let mut pipe = redis::pipe();
        pipe.cmd("SET")
            .arg("redguard_test:counter")
            .arg("1")
            .ignore()
            .cmd("INCR")
            .arg("redguard_test:counter");
        let (counter,): (i64,) = guard.pipeline(&pipe).change_context(AnyErr)?;
        assert_eq!(counter, 2);

        // Scripted evals too:
        let sum: i64 = guard
            .eval("return tonumber(ARGV[1]) + tonumber(ARGV[2])", &[], &["2", "3"])
            .change_context(AnyErr)?;
        assert_eq!(sum, 5);

        // Scans page through under the guard:
        let keys = guard.scan_match("redguard_test:*").change_context(AnyErr)?;
        assert!(keys.contains(&"redguard_test:foo".to_string()));

        guard
            .del(&["redguard_test:foo", "redguard_test:counter"][..])
            .change_context(AnyErr)?;
        Ok(())
    }
}
