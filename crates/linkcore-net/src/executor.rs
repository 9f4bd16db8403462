use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::{Events, Poll, Token, Waker};

use linkcore_util::{thread_boot, ThreadPriority};

/// Reserved token for the cross-thread wakeup registered alongside whatever
/// sockets a given endpoint's context manages.
pub(crate) const WAKER_TOKEN: Token = Token(usize::MAX - 1);

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// A unit of work marshaled onto the executor thread. `Ctx` owns the
/// sockets and connection registry for one endpoint; tasks get mutable
/// access to it and to the `Poll` so they can register/deregister
/// interest.
pub(crate) type Task<Ctx> = Box<dyn FnOnce(&mut Ctx, &mut Poll) + Send>;

/// Implemented by the per-endpoint context so the run loop knows when to
/// unwind.
pub(crate) trait ExecutorContext {
    fn should_stop(&self) -> bool;
    fn request_stop(&mut self);
}

/// Drives a single `mio::Poll` loop on a dedicated background thread: each
/// endpoint owns exactly one background executor thread that runs all
/// socket operations for all its connections single-threadedly. `post`
/// marshals work onto that thread from any caller.
pub(crate) struct Executor<Ctx> {
    tx: Sender<Task<Ctx>>,
    waker: Arc<Waker>,
    handle: Option<JoinHandle<()>>,
}

impl<Ctx> Executor<Ctx>
where
    Ctx: ExecutorContext + Send + 'static,
{
    /// Spawns the worker thread. `setup` runs synchronously, before the
    /// thread starts, to register anything that must exist from the first
    /// poll (e.g. a server's listener). `on_events` is invoked once per
    /// poll iteration after pending tasks have been drained, with the
    /// events observed on non-waker tokens.
    pub(crate) fn spawn<F, S>(name: &'static str, mut ctx: Ctx, setup: S, on_events: F) -> io::Result<Self>
    where
        F: FnMut(&mut Ctx, &mut Poll, &Events) + Send + 'static,
        S: FnOnce(&mut Ctx, &Poll) -> io::Result<()>,
    {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let (tx, rx) = mpsc::channel::<Task<Ctx>>();

        setup(&mut ctx, &poll)?;

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            thread_boot(None, ThreadPriority::OSDefault);
            run_loop(ctx, poll, rx, on_events);
        })?;

        Ok(Self { tx, waker, handle: Some(handle) })
    }

    /// Marshals `task` onto the executor thread. Returns `false` if the
    /// thread is no longer running.
    pub(crate) fn post(&self, task: Task<Ctx>) -> bool {
        if self.tx.send(task).is_err() {
            return false;
        }
        self.waker.wake().is_ok()
    }

    /// Posts a stop request and joins the worker thread. Idempotent.
    pub(crate) fn stop_and_join(&mut self) {
        self.post(Box::new(|ctx, _poll| ctx.request_stop()));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<Ctx: ExecutorContext> Drop for Executor<Ctx> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(Box::new(|ctx, _poll| ctx.request_stop()));
            let _ = self.waker.wake();
            let _ = handle.join();
        }
    }
}

fn run_loop<Ctx, F>(mut ctx: Ctx, mut poll: Poll, rx: Receiver<Task<Ctx>>, mut on_events: F)
where
    Ctx: ExecutorContext,
    F: FnMut(&mut Ctx, &mut Poll, &Events),
{
    let mut events = Events::with_capacity(256);
    loop {
        match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::error!(error = %e, "executor poll failed, shutting down");
                break;
            }
        }

        while let Ok(task) = rx.try_recv() {
            task(&mut ctx, &mut poll);
        }

        on_events(&mut ctx, &mut poll, &events);

        if ctx.should_stop() {
            break;
        }
    }
}
