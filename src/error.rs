//! The primary error type for the engine.

use std::num::{ParseFloatError, ParseIntError};
use std::sync::Arc;
use thiserror::Error;

/// One variant per entry in the error taxonomy. `thiserror` gives us a
/// `Display` impl that doubles as the RESP error message text.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongNumArgs(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR syntax error")]
    Syntax,

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("NOAUTH Authentication required")]
    NoAuth,

    #[error("WRONGPASS invalid username-password pair or user is disabled")]
    InvalidPassword,

    #[error("ERR value is not an integer or out of range")]
    OutOfRange,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR key already exists")]
    KeyExists,

    /// Signalled internally by `ExecMulti`; the dispatcher translates this
    /// into the null multi-bulk reply rather than a RESP error line.
    #[error("WATCH changed")]
    WatchChanged,

    #[error("EXECABORT Transaction discarded because of previous errors.")]
    ExecAbort,

    #[error("ERR MULTI commands transaction must within one slot in cluster mode")]
    ClusterSlot,

    #[error("ERR {0}")]
    Internal(String),

    #[error("ERR command '{0}' can not be used in MULTI")]
    NotAllowedInMulti(String),

    #[error("ERR MULTI calls can not be nested")]
    NestedMulti,

    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    #[error("Pool closed")]
    PoolClosed,

    #[error("Pool limit reached")]
    PoolLimit,

    #[error("Cluster peer error: {0}")]
    ClusterPeer(String),

    /// Not part of spec.md's RESP error taxonomy — configuration loading
    /// is the one ambient concern that can fail before any connection
    /// exists to report a RESP reply to.
    #[error("config error: {0}")]
    Config(String),
}

// `std::io::Error` isn't `Clone`; undo-log replay and multi-relay paths need
// to hand errors around by value, so wrap it the way the teacher does.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Io(e) => Error::Io(Arc::clone(e)),
            Error::WrongNumArgs(s) => Error::WrongNumArgs(s.clone()),
            Error::UnknownCommand(s) => Error::UnknownCommand(s.clone()),
            Error::Syntax => Error::Syntax,
            Error::WrongType => Error::WrongType,
            Error::NoAuth => Error::NoAuth,
            Error::InvalidPassword => Error::InvalidPassword,
            Error::OutOfRange => Error::OutOfRange,
            Error::NoSuchKey => Error::NoSuchKey,
            Error::KeyExists => Error::KeyExists,
            Error::WatchChanged => Error::WatchChanged,
            Error::ExecAbort => Error::ExecAbort,
            Error::ClusterSlot => Error::ClusterSlot,
            Error::Internal(s) => Error::Internal(s.clone()),
            Error::NotAllowedInMulti(s) => Error::NotAllowedInMulti(s.clone()),
            Error::NestedMulti => Error::NestedMulti,
            Error::ExecWithoutMulti => Error::ExecWithoutMulti,
            Error::DiscardWithoutMulti => Error::DiscardWithoutMulti,
            Error::PoolClosed => Error::PoolClosed,
            Error::PoolLimit => Error::PoolLimit,
            Error::ClusterPeer(s) => Error::ClusterPeer(s.clone()),
            Error::Config(s) => Error::Config(s.clone()),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::Io(a), Error::Io(b)) => a.to_string() == b.to_string(),
            (Error::WrongNumArgs(a), Error::WrongNumArgs(b)) => a == b,
            (Error::UnknownCommand(a), Error::UnknownCommand(b)) => a == b,
            (Error::Internal(a), Error::Internal(b)) => a == b,
            (Error::NotAllowedInMulti(a), Error::NotAllowedInMulti(b)) => a == b,
            (Error::ClusterPeer(a), Error::ClusterPeer(b)) => a == b,
            (Error::Config(a), Error::Config(b)) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<ParseIntError> for Error {
    fn from(_: ParseIntError) -> Self {
        Error::OutOfRange
    }
}

impl From<ParseFloatError> for Error {
    fn from(_: ParseFloatError) -> Self {
        Error::OutOfRange
    }
}

pub type Result<T> = std::result::Result<T, Error>;
