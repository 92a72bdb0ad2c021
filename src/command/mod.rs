//! C5: the command table and the wire-level types (`CommandLine`,
//! `CommandFlags`) commands are described and dispatched through.

pub mod commands;
pub mod flags;
pub mod line;
pub mod registry;
