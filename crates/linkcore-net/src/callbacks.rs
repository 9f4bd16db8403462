use std::sync::Arc;

/// Extension points for a client endpoint. Every method has a no-op
/// default so callers implement only what they need.
///
/// A panic inside any of these propagates and terminates the consumer
/// thread — the core does not catch callback panics.
pub trait ClientCallbacks<T>: Send + Sync {
    fn on_connected(&self) {}
    fn on_disconnected(&self) {}
    fn on_message(&self, _msg: T) {}
}

/// Extension points for a server endpoint.
pub trait ServerCallbacks<T, C>: Send + Sync {
    /// Called on accept, before the connection is registered. Returning
    /// `false` rejects the connection: it is closed and never reaches the
    /// active set or `on_client_connected`.
    fn on_client_connection_request(&self, _conn: &C) -> bool {
        true
    }

    fn on_client_connected(&self, _conn: &Arc<C>) {}

    fn on_client_disconnected(&self, _conn: &Arc<C>) {}

    fn on_message(&self, _conn: &Arc<C>, _msg: T) {}
}

/// A `ClientCallbacks`/`ServerCallbacks` implementation that does nothing;
/// useful for endpoints that only poll via `update` and never registers
/// their own callbacks.
#[derive(Default)]
pub struct NoopCallbacks;

impl<T> ClientCallbacks<T> for NoopCallbacks {}
impl<T, C> ServerCallbacks<T, C> for NoopCallbacks {}
