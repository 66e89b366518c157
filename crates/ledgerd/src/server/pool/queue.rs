use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// FIFO of accepted connections waiting for one worker.
///
/// The acceptor only enqueues and the owning worker only dequeues. The size
/// the acceptor reads for load balancing is the length of the deque itself,
/// read under the same lock as every insert and remove, so it can never
/// disagree with the contents.
///
/// Workers do not poll: [`PendingQueue::next`] parks on a [`Notify`] until an
/// entry arrives or shutdown is signalled.
#[derive(Debug)]
pub struct PendingQueue<C> {
    entries: Mutex<VecDeque<C>>,
    ready: Notify,
}

impl<C> Default for PendingQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> PendingQueue<C> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
        }
    }

    /// Appends `conn` at the tail and wakes the worker.
    pub fn enqueue(&self, conn: C) {
        self.entries.lock().push_back(conn);
        self.ready.notify_one();
    }

    /// Removes the head entry. An empty queue is a normal condition and
    /// yields `None`.
    pub fn dequeue(&self) -> Option<C> {
        self.entries.lock().pop_front()
    }

    /// Number of connections waiting.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Waits for the next connection.
    ///
    /// Returns `None` once `shutdown` is cancelled, even if entries remain;
    /// the shutdown check happens before every dequeue.
    pub async fn next(&self, shutdown: &CancellationToken) -> Option<C> {
        loop {
            if shutdown.is_cancelled() {
                return None;
            }
            if let Some(conn) = self.dequeue() {
                return Some(conn);
            }

            // `notify_one` stores a permit when no one is waiting, so an
            // enqueue racing with this check is not lost.
            tokio::select! {
                () = self.ready.notified() => {}
                () = shutdown.cancelled() => return None,
            }
        }
    }

    /// Removes every waiting entry.
    pub fn drain(&self) -> Vec<C> {
        self.entries.lock().drain(..).collect()
    }
}
