//! Raw byte-stream mode for third-party interop: no handshake, and framing
//! (if any) is described by the caller via [`crate::raw_header::RawHeaderDescriptor`]
//! rather than imposed by this library.

mod client;
mod conn;
mod server;

pub use client::Client;
pub use server::{ConnHandle, Server};
