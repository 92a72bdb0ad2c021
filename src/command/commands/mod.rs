//! Per-family command implementations. Each module exports a `SPECS`
//! array of [`crate::command::registry::CommandSpec`] consumed by the
//! registry at first lookup.

pub mod hashes;
pub mod keys;
pub mod lists;
pub mod strings;
mod util;
pub mod zsets;
