use redis::{ConnectionLike, RedisError, RedisResult, Value};

use super::classify::{is_name_resolution, is_protocol_layer};
use super::retry::RedisGuardErr;
use crate::prelude::*;

/// Tear down the current handle and swap in a fresh one from the connector.
///
/// Sentinel failover is asynchronous from this client's perspective: right
/// after a failure is detected there may be no promoted primary yet, so the
/// connector may legitimately fail. Benign teardown/acquisition errors (link
/// already dead, DNS flakiness) are swallowed and the old handle is kept; the
/// outer retry loop will land back here on the next failed attempt.
pub(crate) fn force_reconnect<C: ConnectionLike>(
    conn: &mut C,
    connector: Option<&mut (dyn FnMut() -> RedisResult<C> + Send + 'static)>,
    host: &str,
) -> Result<(), RedisGuardErr> {
    // Dispose of the current handle. QUIT tells the server to flush and close
    // the link; it failing because the link is already gone is expected.
    if let Err(e) = redis::cmd("QUIT").query::<Value>(conn) {
        if !suppressible(&e) {
            return Err(RedisGuardErr::Fatal(e));
        }
        debug!("Ignoring error while disconnecting from redis ({}): {}", host, e);
    }

    // Acquire a replacement. Without a connector the existing handle is kept
    // as-is.
    if let Some(connector) = connector {
        match connector() {
            Ok(fresh) => {
                *conn = fresh;
                debug!("Reconnected to redis ({}).", host);
            }
            Err(e) if suppressible(&e) => {
                debug!("Reconnect attempt failed, keeping current handle: {}", e);
            }
            Err(e) => return Err(RedisGuardErr::Fatal(e)),
        }
    }
    Ok(())
}

fn suppressible(err: &RedisError) -> bool {
    is_protocol_layer(err) || is_name_resolution(err)
}
