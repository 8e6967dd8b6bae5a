//! # Kivio
//!
//! A durable, sharded, in-memory key-value store served over TCP.
//!
//! ## Features
//!
//! - **Crash durability**: every write is fsynced to a write-ahead log
//!   before it becomes visible
//! - **Parallel sharding**: 32 reader-writer-locked partitions keyed by a
//!   stable FNV-1a router
//! - **Checkpointing**: periodic snapshots truncate the WAL via atomic
//!   rename and rotation
//! - **Streaming prefix scans**: one worker per shard fans results into a
//!   bounded channel
//!
//! ## Quick Start
//!
//! ```ignore
//! use kivio::{ShardedStore, StoreConfig, Value};
//!
//! let store = ShardedStore::open(StoreConfig::new("./data"))?;
//!
//! store.set("greeting", Value::from("hello"))?;
//! assert_eq!(store.get("greeting"), Some(Value::from("hello")));
//!
//! for (key, value) in store.scan_prefix("gree") {
//!     println!("{key}: {} bytes", value.len());
//! }
//!
//! store.close();
//! # Ok::<(), kivio::StoreError>(())
//! ```
//!
//! Networking lives in [`net`]: construct a [`RemoteStoreServer`] around a
//! store to expose Set/Get/GetPrefix/Stat on a TCP port (50051 by
//! default), and use [`RemoteStoreClient`] to talk to it.

pub mod api;
pub mod client;
pub mod net;
pub mod runtime;
pub mod state;
pub mod storage;

pub use crate::api::{error, facade, types};
pub use crate::runtime::{metrics, scheduler};
pub use crate::state::{router, shard};
pub use crate::storage::{snapshot, wal};

pub use api::error::{StoreError, StoreResult};
pub use api::facade::{PrefixScan, ShardedStore, StoreConfig, DEFAULT_WAL_SIZE_THRESHOLD};
pub use api::types::{TimestampNs, Value, MAX_KEY_BYTES, SHARD_COUNT};
pub use client::{ClientError, RemoteStoreClient};
pub use net::{
    RemoteServerConfig, RemoteStoreServer, ServerError, DEFAULT_PORT, MAX_MESSAGE_BYTES,
};
pub use runtime::metrics::{Statistics, StatsSnapshot};
pub use storage::snapshot::SnapshotData;
pub use storage::wal::{Wal, WalRecord, WalReplay};
