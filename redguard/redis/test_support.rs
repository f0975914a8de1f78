use std::collections::VecDeque;

use redis::{ConnectionLike, ErrorKind, RedisError, RedisResult, Value};

/// A scripted stand-in for a real connection: pops one canned reply per
/// request and records the raw bytes it was sent.
pub(crate) struct MockConn {
    pub(crate) id: u8,
    pub(crate) replies: VecDeque<RedisResult<Value>>,
    pub(crate) requests: Vec<Vec<u8>>,
}

impl MockConn {
    pub(crate) fn new(id: u8, replies: impl IntoIterator<Item = RedisResult<Value>>) -> Self {
        Self {
            id,
            replies: replies.into_iter().collect(),
            requests: Vec::new(),
        }
    }

    pub(crate) fn requests_utf8(&self) -> Vec<String> {
        self.requests
            .iter()
            .map(|r| String::from_utf8_lossy(r).into_owned())
            .collect()
    }
}

impl ConnectionLike for MockConn {
    fn req_packed_command(&mut self, cmd: &[u8]) -> RedisResult<Value> {
        self.requests.push(cmd.to_vec());
        self.replies.pop_front().unwrap_or(Ok(Value::Nil))
    }

    fn req_packed_commands(
        &mut self,
        cmd: &[u8],
        _offset: usize,
        count: usize,
    ) -> RedisResult<Vec<Value>> {
        self.requests.push(cmd.to_vec());
        match self.replies.pop_front() {
            Some(Ok(v)) => Ok((0..count).map(|_| v.clone()).collect()),
            Some(Err(e)) => Err(e),
            None => Ok(vec![Value::Nil; count]),
        }
    }

    fn get_db(&self) -> i64 {
        0
    }

    fn check_connection(&mut self) -> bool {
        true
    }

    fn is_open(&self) -> bool {
        true
    }
}

pub(crate) fn io_err(detail: &str) -> RedisError {
    RedisError::from((ErrorKind::IoError, "test io error", detail.to_string()))
}

pub(crate) fn type_err(detail: &str) -> RedisError {
    RedisError::from((ErrorKind::TypeError, "test type error", detail.to_string()))
}

pub(crate) fn dns_err(detail: &str) -> RedisError {
    RedisError::from((ErrorKind::ClientError, "test client error", detail.to_string()))
}
