use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};

use linkcore_queue::BlockingQueue;

use super::conn::{ConnOutcome, FramedConn};
use crate::callbacks::ServerCallbacks;
use crate::error::ConnectorError;
use crate::executor::{Executor, ExecutorContext};
use crate::incoming::{ConnId, Incoming};
use crate::msg::FramedMsg;

const LISTENER_TOKEN: Token = Token(0);
const FIRST_CONN_TOKEN: usize = 1;
const DEFAULT_HANDSHAKE_TIMEOUT: linkcore_time::Duration = linkcore_time::Duration::from_secs(10);

/// A lightweight, `Send + Sync` reference to a registered connection.
/// Everything that actually touches the socket happens on the executor
/// thread via [`Server::message_client`]/[`Server::message_all`]; this
/// type only carries identity and liveness, and never reaches back into
/// the executor.
pub struct ConnHandle {
    id: ConnId,
    token: Token,
    peer_addr: Option<SocketAddr>,
    alive: AtomicBool,
    ever_connected: AtomicBool,
}

impl ConnHandle {
    fn preview(peer_addr: SocketAddr) -> Self {
        Self {
            id: 0,
            token: Token(0),
            peer_addr: Some(peer_addr),
            alive: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
        }
    }

    fn accepted(id: ConnId, token: Token, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            token,
            peer_addr: Some(peer_addr),
            alive: AtomicBool::new(true),
            ever_connected: AtomicBool::new(false),
        }
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
    inner: FramedConn,
    handle: Arc<ConnHandle>,
}

struct FramedServerCtx {
    listener: TcpListener,
    conns: HashMap<Token, ServerConn>,
    next_token: usize,
    id_counter: u32,
    callbacks: Arc<dyn ServerCallbacks<FramedMsg, ConnHandle>>,
    inbound: Arc<BlockingQueue<Incoming<FramedMsg, ConnHandle>>>,
    handshake_timeout: linkcore_time::Duration,
    socket_buf_size: Option<usize>,
    stop: bool,
}

impl ExecutorContext for FramedServerCtx {
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

fn next_id(ctx: &mut FramedServerCtx) -> ConnId {
    let id = (ctx.id_counter % 10000) + 10000;
    ctx.id_counter = ctx.id_counter.wrapping_add(1);
    id
}

fn accept_loop(ctx: &mut FramedServerCtx, poll: &mut Poll) {
    loop {
        match ctx.listener.accept() {
            Ok((stream, peer_addr)) => {
                let preview = Arc::new(ConnHandle::preview(peer_addr));
                if !ctx.callbacks.on_client_connection_request(&preview) {
                    tracing::debug!(%peer_addr, "connection request rejected");
                    continue;
                }
                let id = next_id(ctx);
                let token = Token(ctx.next_token);
                ctx.next_token += 1;

                if let Some(size) = ctx.socket_buf_size {
                    crate::sockopt::set_socket_buf_size(&stream, size);
                }
                let mut inner = FramedConn::new_server(stream, peer_addr);
                inner.id = id;
                if let Err(e) = inner.register(poll.registry(), token) {
                    tracing::warn!(error = %e, "failed to register accepted stream");
                    continue;
                }

                let handle = Arc::new(ConnHandle::accepted(id, token, peer_addr));
                ctx.conns.insert(token, ServerConn { inner, handle });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                break;
            }
        }
    }
}

fn handle_conn_outcome(ctx: &mut FramedServerCtx, token: Token, outcome: ConnOutcome) {
    match outcome {
        ConnOutcome::Idle => {}
        ConnOutcome::Connected => {
            if let Some(sc) = ctx.conns.get(&token) {
                sc.handle.ever_connected.store(true, Ordering::Relaxed);
                ctx.callbacks.on_client_connected(&sc.handle);
            }
        }
        ConnOutcome::Messages(msgs) => {
            if let Some(sc) = ctx.conns.get(&token) {
                let handle = sc.handle.clone();
                for msg in msgs {
                    ctx.inbound.push_back(Incoming::new(Some(handle.clone()), msg));
                }
            }
        }
    }
}

fn prune_stale(ctx: &mut FramedServerCtx, poll: &mut Poll) {
    let timeout = ctx.handshake_timeout;
    let mut stale = Vec::new();
    for (token, sc) in ctx.conns.iter_mut() {
        if sc.inner.is_closed() {
            stale.push(*token);
        } else if sc.inner.is_handshaking() && sc.inner.handshake_age() > timeout {
            tracing::warn!(?token, "server-side handshake timed out");
            sc.inner.force_close();
            stale.push(*token);
        }
    }
    for token in stale {
        match ctx.conns.remove(&token) {
            Some(mut sc) => {
                sc.inner.deregister(poll.registry());
                sc.handle.alive.store(false, Ordering::Relaxed);
                if sc.handle.ever_connected.load(Ordering::Relaxed) {
                    ctx.callbacks.on_client_disconnected(&sc.handle);
                }
            }
            None => linkcore_util::safe_panic!("stale token {:?} vanished between scan and prune", token),
        }
    }
}

fn on_events(ctx: &mut FramedServerCtx, poll: &mut Poll, events: &Events) {
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
        for outcome in outcomes {
            handle_conn_outcome(ctx, token, outcome);
        }
    }
    prune_stale(ctx, poll);
}

/// Accepts framed connections, assigns each an ID in `[10000, 20000)`,
/// and maintains the active set.
pub struct Server {
    addr: SocketAddr,
    callbacks: Arc<dyn ServerCallbacks<FramedMsg, ConnHandle>>,
    inbound: Arc<BlockingQueue<Incoming<FramedMsg, ConnHandle>>>,
    handshake_timeout: linkcore_time::Duration,
    socket_buf_size: Option<usize>,
    executor: Mutex<Option<Executor<FramedServerCtx>>>,
    bound_addr: Mutex<Option<SocketAddr>>,
    running: AtomicBool,
    shutdown: AtomicBool,
}

impl Server {
    pub fn new(addr: SocketAddr, callbacks: Arc<dyn ServerCallbacks<FramedMsg, ConnHandle>>) -> Self {
        Self::with_handshake_timeout(addr, callbacks, DEFAULT_HANDSHAKE_TIMEOUT)
    }

    pub fn with_handshake_timeout(
        addr: SocketAddr,
        callbacks: Arc<dyn ServerCallbacks<FramedMsg, ConnHandle>>,
        handshake_timeout: linkcore_time::Duration,
    ) -> Self {
        Self {
            addr,
            callbacks,
            inbound: Arc::new(BlockingQueue::new()),
            handshake_timeout,
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
    /// Differs from the address passed to [`Self::new`] when that address
    /// used an ephemeral port (`:0`).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.lock().unwrap()
    }

    /// Binds and starts listening, then spawns the worker thread. Idempotent
    /// per instance: calling `start` twice without an intervening `stop`
    /// returns `Ok(false)` rather than rebinding.
    pub fn start(&self) -> Result<bool, ConnectorError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let listener = TcpListener::bind(self.addr).map_err(|source| {
            self.running.store(false, Ordering::Release);
            ConnectorError::Bind { addr: self.addr, source }
        })?;
        *self.bound_addr.lock().unwrap() = listener.local_addr().ok();

        let ctx = FramedServerCtx {
            listener,
            conns: HashMap::new(),
            next_token: FIRST_CONN_TOKEN,
            id_counter: 0,
            callbacks: self.callbacks.clone(),
            inbound: self.inbound.clone(),
            handshake_timeout: self.handshake_timeout,
            socket_buf_size: self.socket_buf_size,
            stop: false,
        };

        let setup = |ctx: &mut FramedServerCtx, poll: &Poll| {
            poll.registry().register(&mut ctx.listener, LISTENER_TOKEN, Interest::READABLE)
        };

        let executor = Executor::spawn("linkcore-net-server", ctx, setup, on_events)
            .inspect_err(|_| self.running.store(false, Ordering::Release))?;
        *self.executor.lock().unwrap() = Some(executor);
        Ok(true)
    }

    /// Latches the inbound queue exit, stops the executor and joins the
    /// worker. Safe to call more than once.
    pub fn stop(&self) {
        if let Some(mut executor) = self.executor.lock().unwrap().take() {
            executor.stop_and_join();
        }
        self.inbound.exit_wait();
        self.running.store(false, Ordering::Release);
    }

    /// Forwards `msg` to `conn` if it's still connected; otherwise fires
    /// `on_client_disconnected`, drops the reference, and prunes it from
    /// the active set.
    pub fn message_client(&self, conn: &Arc<ConnHandle>, msg: FramedMsg) {
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
            if handle.alive.swap(false, Ordering::Relaxed) && handle.ever_connected.load(Ordering::Relaxed) {
                callbacks.on_client_disconnected(&handle);
            }
        }));
    }

    /// Sends `msg` to every connected peer except `ignore`, pruning any
    /// stale entries encountered along the way.
    pub fn message_all(&self, msg: FramedMsg, ignore: Option<Arc<ConnHandle>>) {
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
                    if sc.handle.ever_connected.load(Ordering::Relaxed) {
                        callbacks.on_client_disconnected(&sc.handle);
                    }
                }
            }
        }));
    }

    fn post(&self, task: Box<dyn FnOnce(&mut FramedServerCtx, &mut Poll) + Send>) {
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
