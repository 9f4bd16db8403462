//! TCP messaging endpoints: symmetric client/server pairs with either
//! length-delimited framing (plus a lightweight handshake) or raw
//! byte-stream passthrough for third-party interop.
//!
//! Each endpoint owns one background executor thread driving a single
//! `mio::Poll` loop for every connection it manages; application code only
//! blocks inside `update`/`run`, draining a shared inbound queue.

mod callbacks;
mod error;
mod executor;
mod handshake;
mod incoming;
mod msg;
mod raw_header;
mod sockopt;

pub mod framed;
pub mod raw;

pub use callbacks::{ClientCallbacks, NoopCallbacks, ServerCallbacks};
pub use error::ConnectorError;
pub use incoming::{ConnId, Incoming};
pub use msg::{FramedMsg, RawMsg, FRAMED_HEADER_SIZE, RAW_RECEIVE_BUFFER_SIZE};
pub use raw_header::{RawHeaderDescriptor, RawHeaderError};
