use std::sync::Arc;

/// Server-assigned connection identifier; unused on the client side, which
/// only ever has one peer.
pub type ConnId = u32;

/// One record drained from the shared inbound queue by application code.
///
/// `conn` is a strong reference on the server — it keeps the originating
/// connection alive while the message sits in the queue so reply
/// addressing stays valid — and `None` on the client, where there is
/// nothing to address a reply to beyond the one connection.
pub struct Incoming<T, C> {
    pub conn: Option<Arc<C>>,
    pub msg: T,
}

impl<T, C> Incoming<T, C> {
    pub fn new(conn: Option<Arc<C>>, msg: T) -> Self {
        Self { conn, msg }
    }
}
