pub mod aof;
pub mod database;
pub mod rdb;
pub mod undo;

pub use aof::{AofSink, NullAofSink};
pub use database::Database;
pub use rdb::RdbLoadEvent;
