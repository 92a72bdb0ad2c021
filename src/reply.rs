//! Reply values produced by command execution.
//!
//! This is deliberately not a wire-level RESP frame: encoding replies to
//! bytes is the job of the (out-of-scope) protocol layer. `Reply` only
//! needs to distinguish the reply kinds §6 requires: simple string, error,
//! integer, bulk (nullable), and multi-bulk (nullable/empty).

use crate::error::Error;
use bytes::Bytes;

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    SimpleString(&'static str),
    Integer(i64),
    Bulk(Bytes),
    NullBulk,
    Array(Vec<Reply>),
    /// The null multi-bulk reply: signals a WATCH-aborted EXEC (P4).
    NullArray,
    Error(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::SimpleString("OK")
    }

    pub fn queued() -> Self {
        Reply::SimpleString("QUEUED")
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    pub fn bulk(bytes: impl Into<Bytes>) -> Self {
        Reply::Bulk(bytes.into())
    }
}

impl From<Error> for Reply {
    fn from(err: Error) -> Self {
        Reply::Error(err.to_string())
    }
}

impl From<&Error> for Reply {
    fn from(err: &Error) -> Self {
        Reply::Error(err.to_string())
    }
}
