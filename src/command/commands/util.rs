//! Small argument-parsing helpers shared across command families.

use bytes::Bytes;

use crate::error::{Error, Result};

pub fn parse_i64(b: &[u8]) -> Result<i64> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(Error::OutOfRange)
}

pub fn parse_f64(b: &[u8]) -> Result<f64> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|f| !f.is_nan())
        .ok_or(Error::OutOfRange)
}

pub fn eq_ignore_case(a: &[u8], b: &str) -> bool {
    a.eq_ignore_ascii_case(b.as_bytes())
}

pub fn bulk_or_null(value: Option<Bytes>) -> crate::reply::Reply {
    match value {
        Some(b) => crate::reply::Reply::Bulk(b),
        None => crate::reply::Reply::NullBulk,
    }
}
