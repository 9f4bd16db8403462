use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::{Events, Poll, Token};

use linkcore_queue::BlockingQueue;

use super::conn::{ConnOutcome, RawConn};
use crate::callbacks::ClientCallbacks;
use crate::error::ConnectorError;
use crate::executor::{Executor, ExecutorContext};
use crate::msg::RawMsg;
use crate::raw_header::RawHeaderDescriptor;

const CONN_TOKEN: Token = Token(1);

struct RawClientCtx {
    conn: Option<RawConn>,
    inbound: Arc<BlockingQueue<RawMsg>>,
    callbacks: Arc<dyn ClientCallbacks<RawMsg>>,
    connected: Arc<AtomicBool>,
    stop: bool,
}

impl ExecutorContext for RawClientCtx {
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

fn on_events(ctx: &mut RawClientCtx, poll: &mut Poll, events: &Events) {
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
        if let ConnOutcome::Messages(msgs) = outcome {
            for msg in msgs {
                ctx.inbound.push_back(msg);
            }
        }
    }

    let closed = matches!(&ctx.conn, Some(conn) if conn.is_closed());
    if closed {
        if let Some(mut conn) = ctx.conn.take() {
            conn.force_close();
            conn.deregister(poll.registry());
        }
        if ctx.connected.swap(false, Ordering::Relaxed) {
            ctx.callbacks.on_disconnected();
        }
    }
}

/// Raw-mode client endpoint: no handshake, `on_connected` fires as soon as
/// the TCP connect completes.
pub struct Client {
    executor: Executor<RawClientCtx>,
    inbound: Arc<BlockingQueue<RawMsg>>,
    callbacks: Arc<dyn ClientCallbacks<RawMsg>>,
    connected: Arc<AtomicBool>,
    descriptor: Option<RawHeaderDescriptor>,
    socket_buf_size: Option<usize>,
    shutdown: AtomicBool,
}

impl Client {
    pub fn new(callbacks: Arc<dyn ClientCallbacks<RawMsg>>) -> io::Result<Self> {
        Self::with_header_descriptor(callbacks, None)
    }

    pub fn with_header_descriptor(
        callbacks: Arc<dyn ClientCallbacks<RawMsg>>,
        descriptor: Option<RawHeaderDescriptor>,
    ) -> io::Result<Self> {
        let inbound = Arc::new(BlockingQueue::new());
        let connected = Arc::new(AtomicBool::new(false));
        let ctx = RawClientCtx {
            conn: None,
            inbound: inbound.clone(),
            callbacks: callbacks.clone(),
            connected: connected.clone(),
            stop: false,
        };
        let executor = Executor::spawn("linkcore-net-raw-client", ctx, |_ctx, _poll| Ok(()), on_events)?;
        Ok(Self { executor, inbound, callbacks, connected, descriptor, socket_buf_size: None, shutdown: AtomicBool::new(false) })
    }

    /// Sets `SO_SNDBUF`/`SO_RCVBUF` on the socket at the next successful
    /// [`Self::connect`]. Must be called before connecting.
    pub fn with_socket_buf_size(mut self, size: usize) -> Self {
        self.socket_buf_size = Some(size);
        self
    }

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

        let descriptor = self.descriptor;
        let socket_buf_size = self.socket_buf_size;
        let connected = self.connected.clone();
        let callbacks = self.callbacks.clone();
        let ok = self.executor.post(Box::new(move |ctx, poll| match mio::net::TcpStream::connect(addr) {
            Ok(stream) => {
                if let Some(size) = socket_buf_size {
                    crate::sockopt::set_socket_buf_size(&stream, size);
                }
                let mut conn = RawConn::new(stream, Some(addr), descriptor);
                if let Err(e) = conn.register(poll.registry(), CONN_TOKEN) {
                    tracing::warn!(error = %e, "failed to register raw client stream");
                    return;
                }
                ctx.conn = Some(conn);
                connected.store(true, Ordering::Relaxed);
                callbacks.on_connected();
            }
            Err(e) => tracing::warn!(error = %e, %addr, "raw connect failed"),
        }));
        Ok(ok)
    }

    pub fn disconnect(&self) {
        let callbacks = self.callbacks.clone();
        let connected = self.connected.clone();
        self.executor.post(Box::new(move |ctx, poll| {
            if let Some(mut conn) = ctx.conn.take() {
                conn.force_close();
                conn.deregister(poll.registry());
            }
            if connected.swap(false, Ordering::Relaxed) {
                callbacks.on_disconnected();
            }
        }));
        self.inbound.exit_wait();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn send(&self, msg: RawMsg) {
        self.executor.post(Box::new(move |ctx, _poll| {
            if let Some(conn) = ctx.conn.as_mut() {
                conn.enqueue(msg);
            }
        }));
    }

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

    pub fn run(&self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.update(None, true);
        }
    }

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
