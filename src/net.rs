//! Wire protocol shared by the server and the client.
//!
//! Requests are a one-byte opcode followed by length-prefixed fields;
//! responses lead with a one-byte status. Multi-byte integers are
//! network byte order. `GetPrefix` responses are a tagged stream of
//! pairs terminated by an end marker.

pub mod server;

pub use server::{RemoteServerConfig, RemoteStoreServer, ServerError};

/// Port the server listens on by default.
pub const DEFAULT_PORT: u16 = 50051;

/// Hard cap on a single message in either direction.
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

// Request opcodes.
pub(crate) const OP_SET: u8 = 1;
pub(crate) const OP_GET: u8 = 2;
pub(crate) const OP_GET_PREFIX: u8 = 3;
pub(crate) const OP_STAT: u8 = 4;

// Response status codes.
pub(crate) const STATUS_OK: u8 = 0;
pub(crate) const STATUS_INVALID_ARGUMENT: u8 = 1;
pub(crate) const STATUS_INTERNAL: u8 = 2;
pub(crate) const STATUS_BAD_FRAME: u8 = 3;

// Prefix stream item tags.
pub(crate) const STREAM_END: u8 = 0;
pub(crate) const STREAM_PAIR: u8 = 1;
