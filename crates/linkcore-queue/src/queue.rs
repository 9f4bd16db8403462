use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

struct Inner<T> {
    queue: VecDeque<T>,
    exiting: bool,
}

/// A thread-safe FIFO (also usable as a LIFO via the `_back` variants) with
/// a blocking, cancellable `wait`.
///
/// Used as the server/client inbound queue: the executor thread(s) push
/// [`Self::push_back`], application code blocks in [`Self::wait`] until
/// there's something to drain.
///
/// `exit_wait` is a one-way latch: once set, the queue can never usefully
/// block again. This is intentional — an endpoint's inbound
/// queue becomes unusable for further blocking once shutdown begins, and
/// callers must reconstruct the endpoint to get a fresh queue.
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    cv: Condvar,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { queue: VecDeque::new(), exiting: false }), cv: Condvar::new() }
    }

    #[inline]
    pub fn push_back(&self, item: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push_back(item);
        self.cv.notify_one();
    }

    #[inline]
    pub fn push_front(&self, item: T) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push_front(item);
        self.cv.notify_one();
    }

    /// Removes and returns the front element, or `None` if the queue is
    /// empty. Callers that need to block until something is available
    /// should call [`Self::wait`] first.
    #[inline]
    pub fn pop_front(&self) -> Option<T> {
        self.inner.lock().unwrap().queue.pop_front()
    }

    #[inline]
    pub fn pop_back(&self) -> Option<T> {
        self.inner.lock().unwrap().queue.pop_back()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().queue.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().queue.clear();
    }

    /// Blocks the calling thread until the queue is non-empty, or until
    /// [`Self::exit_wait`] has been called (by this or any other thread).
    ///
    /// Returns immediately if either condition already holds.
    pub fn wait(&self) {
        let mut inner = self.inner.lock().unwrap();
        while inner.queue.is_empty() && !inner.exiting {
            inner = self.cv.wait(inner).unwrap();
        }
    }

    /// Latches the queue into a permanently non-blocking state and wakes
    /// one waiter. Idempotent; cannot be undone.
    pub fn exit_wait(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.exiting = true;
        self.cv.notify_one();
    }

    /// Whether `exit_wait` has been called.
    #[inline]
    pub fn is_exiting(&self) -> bool {
        self.inner.lock().unwrap().exiting
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    #[test]
    fn push_then_pop_fifo_order() {
        let q: BlockingQueue<i32> = BlockingQueue::new();
        q.push_back(1);
        q.push_back(2);
        q.push_back(3);
        assert_eq!(q.pop_front(), Some(1));
        assert_eq!(q.pop_front(), Some(2));
        assert_eq!(q.pop_front(), Some(3));
        assert_eq!(q.pop_front(), None);
    }

    #[test]
    fn wait_returns_once_an_item_is_pushed() {
        let q = Arc::new(BlockingQueue::<i32>::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            q2.push_back(42);
        });
        q.wait();
        assert_eq!(q.pop_front(), Some(42));
        handle.join().unwrap();
    }

    #[test]
    fn exit_wait_unblocks_waiter_even_when_empty() {
        let q = Arc::new(BlockingQueue::<i32>::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            q2.exit_wait();
        });
        q.wait();
        assert!(q.is_empty());
        handle.join().unwrap();
    }

    #[test]
    fn wait_after_exit_wait_returns_immediately() {
        let q: BlockingQueue<i32> = BlockingQueue::new();
        q.exit_wait();
        let start = std::time::Instant::now();
        q.wait();
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
