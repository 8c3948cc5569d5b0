//! Command implementations for canopend-cli

pub mod emcy;
pub mod entries;
pub mod file;
pub mod monitor;
pub mod nmt;
pub mod nodes;
pub mod read;
pub mod write;

pub use emcy::{emcy, tpdo};
pub use entries::entries;
pub use file::{fread, fwrite};
pub use monitor::monitor;
pub use nmt::{nmt, state};
pub use nodes::nodes;
pub use read::{read, read_all};
pub use write::write;
