use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::{Events, Poll, Token};

use linkcore_queue::BlockingQueue;

use super::conn::{ConnOutcome, FramedConn};
use crate::callbacks::ClientCallbacks;
use crate::error::ConnectorError;
use crate::executor::{Executor, ExecutorContext};
use crate::msg::FramedMsg;

const CONN_TOKEN: Token = Token(1);
const DEFAULT_HANDSHAKE_TIMEOUT: linkcore_time::Duration = linkcore_time::Duration::from_secs(10);

struct FramedClientCtx {
    conn: Option<FramedConn>,
    inbound: Arc<BlockingQueue<FramedMsg>>,
    callbacks: Arc<dyn ClientCallbacks<FramedMsg>>,
    connected: Arc<AtomicBool>,
    handshake_timeout: linkcore_time::Duration,
    stop: bool,
}

impl ExecutorContext for FramedClientCtx {
    fn should_stop(&self) -> bool {
        self.stop
    }

    fn request_stop(&mut self) {
        self.stop = true;
        if let Some(conn) = self.conn.as_mut() {
            conn.force_close();
        }
    }
}

fn on_events(ctx: &mut FramedClientCtx, poll: &mut Poll, events: &Events) {
    let mut outcomes = Vec::new();
    if let Some(conn) = ctx.conn.as_mut() {
        for event in events.iter() {
            if conn.token != event.token() {
                continue;
            }
            if event.is_readable() {
                outcomes.push(conn.on_readable());
            }
            if event.is_writable() {
                outcomes.push(conn.on_writable());
            }
        }
    }
    for outcome in outcomes {
        handle_outcome(ctx, outcome);
    }

    let stale = match ctx.conn.as_ref() {
        Some(conn) if conn.is_closed() => true,
        Some(conn) if conn.is_handshaking() && conn.handshake_age() > ctx.handshake_timeout => {
            tracing::warn!("client handshake timed out");
            true
        }
        _ => false,
    };
    if stale {
        if let Some(mut conn) = ctx.conn.take() {
            conn.force_close();
            conn.deregister(poll.registry());
        }
        if ctx.connected.swap(false, Ordering::Relaxed) {
            ctx.callbacks.on_disconnected();
        }
    }
}

fn handle_outcome(ctx: &mut FramedClientCtx, outcome: ConnOutcome) {
    match outcome {
        ConnOutcome::Idle => {}
        ConnOutcome::Connected => {
            ctx.connected.store(true, Ordering::Relaxed);
            ctx.callbacks.on_connected();
        }
        ConnOutcome::Messages(msgs) => {
            for msg in msgs {
                ctx.inbound.push_back(msg);
            }
        }
    }
}

/// Owns one connection and its executor thread. `update` drains the
/// inbound queue on whatever thread calls it; everything else runs on the
/// executor thread.
pub struct Client {
    executor: Executor<FramedClientCtx>,
    inbound: Arc<BlockingQueue<FramedMsg>>,
    callbacks: Arc<dyn ClientCallbacks<FramedMsg>>,
    connected: Arc<AtomicBool>,
    socket_buf_size: Option<usize>,
    shutdown: AtomicBool,
}

impl Client {
    pub fn new(callbacks: Arc<dyn ClientCallbacks<FramedMsg>>) -> io::Result<Self> {
        Self::with_handshake_timeout(callbacks, DEFAULT_HANDSHAKE_TIMEOUT)
    }

    /// Bounds how long a connection may sit in the handshake before it's
    /// force-closed, so a peer that never completes the handshake can't
    /// pin a connection slot forever.
    pub fn with_handshake_timeout(
        callbacks: Arc<dyn ClientCallbacks<FramedMsg>>,
        handshake_timeout: linkcore_time::Duration,
    ) -> io::Result<Self> {
        let inbound = Arc::new(BlockingQueue::new());
        let connected = Arc::new(AtomicBool::new(false));
        let ctx = FramedClientCtx {
            conn: None,
            inbound: inbound.clone(),
            callbacks: callbacks.clone(),
            connected: connected.clone(),
            handshake_timeout,
            stop: false,
        };
        let executor = Executor::spawn("linkcore-net-client", ctx, |_ctx, _poll| Ok(()), on_events)?;
        Ok(Self { executor, inbound, callbacks, connected, socket_buf_size: None, shutdown: AtomicBool::new(false) })
    }

    /// Sets `SO_SNDBUF`/`SO_RCVBUF` on the socket at the next successful
    /// [`Self::connect`]. Must be called before connecting; has no effect
    /// on a connection already established.
    pub fn with_socket_buf_size(mut self, size: usize) -> Self {
        self.socket_buf_size = Some(size);
        self
    }

    /// Resolves `host:port` and initiates an async connect on the executor
    /// thread. Returns `true` if the request was submitted; the connect
    /// itself, and the handshake that follows, complete asynchronously and
    /// are observed via `on_connected`.
    pub fn connect(&self, host: &str, port: u16) -> Result<bool, ConnectorError> {
        use std::net::ToSocketAddrs;
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|source| ConnectorError::Resolve { host: host.to_string(), port, source })?
            .next()
            .ok_or_else(|| ConnectorError::Resolve {
                host: host.to_string(),
                port,
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses resolved"),
            })?;

        let socket_buf_size = self.socket_buf_size;
        let ok = self.executor.post(Box::new(move |ctx, poll| {
            match mio::net::TcpStream::connect(addr) {
                Ok(stream) => {
                    if let Some(size) = socket_buf_size {
                        crate::sockopt::set_socket_buf_size(&stream, size);
                    }
                    let mut conn = FramedConn::new_client(stream);
                    if let Err(e) = conn.register(poll.registry(), CONN_TOKEN) {
                        tracing::warn!(error = %e, "failed to register client stream");
                        return;
                    }
                    ctx.conn = Some(conn);
                }
                Err(e) => tracing::warn!(error = %e, %addr, "connect failed"),
            }
        }));
        Ok(ok)
    }

    /// Closes the connection, if any, and latches the inbound queue's
    /// `exit_wait`. A `Client` is not reused after this — construct a new
    /// one to connect again.
    pub fn disconnect(&self) {
        self.executor.post(Box::new(|ctx, poll| {
            if let Some(mut conn) = ctx.conn.take() {
                conn.force_close();
                conn.deregister(poll.registry());
            }
            if ctx.connected.swap(false, Ordering::Relaxed) {
                ctx.callbacks.on_disconnected();
            }
        }));
        self.inbound.exit_wait();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn send(&self, msg: FramedMsg) {
        self.executor.post(Box::new(move |ctx, _poll| {
            if let Some(conn) = ctx.conn.as_mut() {
                conn.enqueue(msg);
            }
        }));
    }

    /// Drains up to `max` inbound messages (default unbounded), optionally
    /// blocking first until one arrives or shutdown is signalled.
    pub fn update(&self, max: Option<usize>, wait: bool) {
        if wait {
            self.inbound.wait();
        }
        let limit = max.unwrap_or(usize::MAX);
        let mut drained = 0;
        while drained < limit {
            let Some(msg) = self.inbound.pop_front() else { break };
            drained += 1;
            self.callbacks.on_message(msg);
        }
    }

    /// Installs no signal handling itself — loops `update` until
    /// [`Self::request_shutdown`] is called.
    pub fn run(&self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.update(None, true);
        }
    }

    /// The cancel-watcher wiring point: call this from a signal handler or
    /// any external shutdown source. Unblocks `run`/`update(wait=true)` and
    /// disconnects.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.disconnect();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.inbound.exit_wait();
    }
}
