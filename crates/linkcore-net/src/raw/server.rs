use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};

use linkcore_queue::BlockingQueue;

use super::conn::{ConnOutcome, RawConn};
use crate::callbacks::ServerCallbacks;
use crate::error::ConnectorError;
use crate::executor::{Executor, ExecutorContext};
use crate::incoming::{ConnId, Incoming};
use crate::msg::RawMsg;
use crate::raw_header::RawHeaderDescriptor;

const LISTENER_TOKEN: Token = Token(0);
const FIRST_CONN_TOKEN: usize = 1;

/// A lightweight, `Send + Sync` reference to a registered raw connection.
pub struct ConnHandle {
    id: ConnId,
    token: Token,
    peer_addr: Option<SocketAddr>,
    alive: AtomicBool,
}

impl ConnHandle {
    fn preview(peer_addr: SocketAddr) -> Self {
        Self { id: 0, token: Token(0), peer_addr: Some(peer_addr), alive: AtomicBool::new(false) }
    }

    fn accepted(id: ConnId, token: Token, peer_addr: SocketAddr) -> Self {
        Self { id, token, peer_addr: Some(peer_addr), alive: AtomicBool::new(true) }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn is_connected(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }
}

struct ServerConn {
    inner: RawConn,
    handle: Arc<ConnHandle>,
}

struct RawServerCtx {
    listener: TcpListener,
    conns: HashMap<Token, ServerConn>,
    next_token: usize,
    id_counter: u32,
    descriptor: Option<RawHeaderDescriptor>,
    callbacks: Arc<dyn ServerCallbacks<RawMsg, ConnHandle>>,
    inbound: Arc<BlockingQueue<Incoming<RawMsg, ConnHandle>>>,
    socket_buf_size: Option<usize>,
    stop: bool,
}

impl ExecutorContext for RawServerCtx {
    fn should_stop(&self) -> bool {
        self.stop
    }

    fn request_stop(&mut self) {
        self.stop = true;
        for sc in self.conns.values_mut() {
            sc.inner.force_close();
        }
    }
}

fn next_id(ctx: &mut RawServerCtx) -> ConnId {
    let id = (ctx.id_counter % 10000) + 10000;
    ctx.id_counter = ctx.id_counter.wrapping_add(1);
    id
}

fn accept_loop(ctx: &mut RawServerCtx, poll: &mut Poll) {
    loop {
        match ctx.listener.accept() {
            Ok((stream, peer_addr)) => {
                let preview = Arc::new(ConnHandle::preview(peer_addr));
                if !ctx.callbacks.on_client_connection_request(&preview) {
                    tracing::debug!(%peer_addr, "raw connection request rejected");
                    continue;
                }
                let id = next_id(ctx);
                let token = Token(ctx.next_token);
                ctx.next_token += 1;

                if let Some(size) = ctx.socket_buf_size {
                    crate::sockopt::set_socket_buf_size(&stream, size);
                }
                let mut inner = RawConn::new(stream, Some(peer_addr), ctx.descriptor);
                inner.id = id;
                if let Err(e) = inner.register(poll.registry(), token) {
                    tracing::warn!(error = %e, "failed to register accepted raw stream");
                    continue;
                }

                let handle = Arc::new(ConnHandle::accepted(id, token, peer_addr));
                ctx.callbacks.on_client_connected(&handle);
                ctx.conns.insert(token, ServerConn { inner, handle });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                tracing::warn!(error = %e, "raw accept failed");
                break;
            }
        }
    }
}

fn prune_stale(ctx: &mut RawServerCtx, poll: &mut Poll) {
    let mut stale = Vec::new();
    for (token, sc) in ctx.conns.iter_mut() {
        if sc.inner.is_closed() {
            stale.push(*token);
        }
    }
    for token in stale {
        match ctx.conns.remove(&token) {
            Some(mut sc) => {
                sc.inner.deregister(poll.registry());
                sc.handle.alive.store(false, Ordering::Relaxed);
                ctx.callbacks.on_client_disconnected(&sc.handle);
            }
            None => linkcore_util::safe_panic!("stale token {:?} vanished between scan and prune", token),
        }
    }
}

fn on_events(ctx: &mut RawServerCtx, poll: &mut Poll, events: &Events) {
    for event in events.iter() {
        if event.token() == LISTENER_TOKEN {
            accept_loop(ctx, poll);
            continue;
        }
        let token = event.token();
        let mut outcomes = Vec::new();
        if let Some(sc) = ctx.conns.get_mut(&token) {
            if event.is_readable() {
                outcomes.push(sc.inner.on_readable());
            }
            if event.is_writable() {
                outcomes.push(sc.inner.on_writable());
            }
        }
        if let Some(sc) = ctx.conns.get(&token) {
            let handle = sc.handle.clone();
            for outcome in outcomes {
                if let ConnOutcome::Messages(msgs) = outcome {
                    for msg in msgs {
                        ctx.inbound.push_back(Incoming::new(Some(handle.clone()), msg));
                    }
                }
            }
        }
    }
    prune_stale(ctx, poll);
}

/// Raw-mode server endpoint: accepts connections, assigns IDs the same
/// way the framed server does, but skips the handshake entirely.
pub struct Server {
    addr: SocketAddr,
    callbacks: Arc<dyn ServerCallbacks<RawMsg, ConnHandle>>,
    inbound: Arc<BlockingQueue<Incoming<RawMsg, ConnHandle>>>,
    descriptor: Option<RawHeaderDescriptor>,
    socket_buf_size: Option<usize>,
    executor: Mutex<Option<Executor<RawServerCtx>>>,
    bound_addr: Mutex<Option<SocketAddr>>,
    running: AtomicBool,
    shutdown: AtomicBool,
}

impl Server {
    pub fn new(addr: SocketAddr, callbacks: Arc<dyn ServerCallbacks<RawMsg, ConnHandle>>) -> Self {
        Self::with_header_descriptor(addr, callbacks, None)
    }

    pub fn with_header_descriptor(
        addr: SocketAddr,
        callbacks: Arc<dyn ServerCallbacks<RawMsg, ConnHandle>>,
        descriptor: Option<RawHeaderDescriptor>,
    ) -> Self {
        Self {
            addr,
            callbacks,
            inbound: Arc::new(BlockingQueue::new()),
            descriptor,
            socket_buf_size: None,
            executor: Mutex::new(None),
            bound_addr: Mutex::new(None),
            running: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Sets `SO_SNDBUF`/`SO_RCVBUF` on every connection accepted from the
    /// next [`Self::start`] onward. Must be called before `start`.
    pub fn with_socket_buf_size(mut self, size: usize) -> Self {
        self.socket_buf_size = Some(size);
        self
    }

    /// The address actually bound by the last successful [`Self::start`].
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.lock().unwrap()
    }

    pub fn start(&self) -> Result<bool, ConnectorError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let listener = TcpListener::bind(self.addr).map_err(|source| {
            self.running.store(false, Ordering::Release);
            ConnectorError::Bind { addr: self.addr, source }
        })?;
        *self.bound_addr.lock().unwrap() = listener.local_addr().ok();

        let ctx = RawServerCtx {
            listener,
            conns: HashMap::new(),
            next_token: FIRST_CONN_TOKEN,
            id_counter: 0,
            descriptor: self.descriptor,
            callbacks: self.callbacks.clone(),
            inbound: self.inbound.clone(),
            socket_buf_size: self.socket_buf_size,
            stop: false,
        };

        let setup = |ctx: &mut RawServerCtx, poll: &Poll| {
            poll.registry().register(&mut ctx.listener, LISTENER_TOKEN, Interest::READABLE)
        };

        let executor = Executor::spawn("linkcore-net-raw-server", ctx, setup, on_events)
            .inspect_err(|_| self.running.store(false, Ordering::Release))?;
        *self.executor.lock().unwrap() = Some(executor);
        Ok(true)
    }

    pub fn stop(&self) {
        if let Some(mut executor) = self.executor.lock().unwrap().take() {
            executor.stop_and_join();
        }
        self.inbound.exit_wait();
        self.running.store(false, Ordering::Release);
    }

    pub fn message_client(&self, conn: &Arc<ConnHandle>, msg: RawMsg) {
        let token = conn.token;
        let handle = conn.clone();
        let callbacks = self.callbacks.clone();
        self.post(Box::new(move |ctx, _poll| {
            let closed = match ctx.conns.get(&token) {
                Some(sc) => sc.inner.is_closed(),
                None => true,
            };
            if !closed {
                if let Some(sc) = ctx.conns.get_mut(&token) {
                    sc.inner.enqueue(msg);
                }
                return;
            }
            ctx.conns.remove(&token);
            if handle.alive.swap(false, Ordering::Relaxed) {
                callbacks.on_client_disconnected(&handle);
            }
        }));
    }

    pub fn message_all(&self, msg: RawMsg, ignore: Option<Arc<ConnHandle>>) {
        let callbacks = self.callbacks.clone();
        self.post(Box::new(move |ctx, _poll| {
            let ignore_token = ignore.as_ref().map(|c| c.token);
            let mut stale = Vec::new();
            for (token, sc) in ctx.conns.iter_mut() {
                if Some(*token) == ignore_token {
                    continue;
                }
                if sc.inner.is_closed() {
                    stale.push(*token);
                    continue;
                }
                sc.inner.enqueue(msg.clone());
            }
            for token in stale {
                if let Some(sc) = ctx.conns.remove(&token) {
                    sc.handle.alive.store(false, Ordering::Relaxed);
                    callbacks.on_client_disconnected(&sc.handle);
                }
            }
        }));
    }

    fn post(&self, task: Box<dyn FnOnce(&mut RawServerCtx, &mut Poll) + Send>) {
        if let Some(executor) = self.executor.lock().unwrap().as_ref() {
            executor.post(task);
        }
    }

    pub fn update(&self, max: Option<usize>, wait: bool) {
        if wait {
            self.inbound.wait();
        }
        let limit = max.unwrap_or(usize::MAX);
        let mut drained = 0;
        while drained < limit {
            let Some(incoming) = self.inbound.pop_front() else { break };
            drained += 1;
            if let Some(conn) = &incoming.conn {
                self.callbacks.on_message(conn, incoming.msg);
            }
        }
    }

    pub fn run(&self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.update(None, true);
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.stop();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
