//! Length-delimited framing with a lightweight handshake. Kept as two
//! concrete endpoint types sharing only the low-level
//! [`crate::executor::Executor`] plumbing with [`crate::raw`] — the wire
//! protocols themselves are not merged.

mod client;
mod conn;
mod server;

pub use client::Client;
pub use conn::Role;
pub use server::{ConnHandle, Server};
