pub mod fs;
pub mod snapshot;
pub mod wal;
