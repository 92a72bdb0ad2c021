pub mod bitmap;
pub mod decimal;
pub mod dict;
pub mod entry;
pub mod hash;
pub mod list;
pub mod lock;
pub mod time_wheel;
pub mod zset;

pub use dict::ShardedDict;
pub use entry::{DataValue, Entry};
pub use lock::StripedLock;
