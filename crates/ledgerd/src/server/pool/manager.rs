//! Worker pool with greedy shortest-queue dispatch.
//!
//! This module defines [`WorkerPool`], which owns `N` [`PendingQueue`]s and the
//! `N` worker tasks bound to them (worker `i` drains queue `i` and nothing
//! else). New connections go to the queue with the fewest waiting entries,
//! ties broken by the lowest index. Shutdown is coordinated through a shared
//! [`CancellationToken`].

use crate::server::{
    pool::{queue::PendingQueue, worker::worker_loop},
    service::handler::SessionHandler,
};
use ledgerd_core::Error;
use std::sync::Arc;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// A fixed set of workers, each fed by its own pending-connection queue.
pub struct WorkerPool<C> {
    queues: Vec<Arc<PendingQueue<C>>>,
    workers: Vec<JoinHandle<()>>,
    shutdown_token: CancellationToken,
}

impl<C> WorkerPool<C>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Creates `num_workers` queues and spawns one worker task per queue.
    pub fn spawn(
        num_workers: usize,
        handler: SessionHandler,
        shutdown_token: CancellationToken,
    ) -> Self {
        let mut queues = Vec::with_capacity(num_workers);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let queue = Arc::new(PendingQueue::new());
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&queue),
                handler.clone(),
                shutdown_token.clone(),
            )));
            queues.push(queue);
        }

        Self::new(queues, workers, shutdown_token)
    }
}

impl<C> WorkerPool<C> {
    /// Constructs a pool from already-created queues and the worker tasks
    /// draining them.
    pub const fn new(
        queues: Vec<Arc<PendingQueue<C>>>,
        workers: Vec<JoinHandle<()>>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            queues,
            workers,
            shutdown_token,
        }
    }

    /// Number of queues (and workers).
    pub fn size(&self) -> usize {
        self.queues.len()
    }

    /// Current length of every queue, by index.
    pub fn queue_lens(&self) -> Vec<usize> {
        self.queues.iter().map(|queue| queue.len()).collect()
    }

    /// Index of the queue with the fewest waiting connections; the lowest
    /// index wins ties.
    pub fn shortest_queue_index(&self) -> usize {
        self.queues
            .iter()
            .enumerate()
            .min_by_key(|(_, queue)| queue.len())
            .map_or(0, |(i, _)| i)
    }

    /// Places `conn` in the shortest queue and returns that queue's index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has started; the
    /// connection is dropped (closed).
    pub fn dispatch(&self, conn: C) -> Result<usize, Error> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let idx = self.shortest_queue_index();
        self.queues[idx].enqueue(conn);
        Ok(idx)
    }

    /// Stops the pool and waits for every worker.
    ///
    /// - Cancels the shared [`CancellationToken`] so no worker starts a new
    ///   connection.
    /// - Joins every worker. A worker in the middle of a session finishes its
    ///   current request/response cycle first, so this waits as long as that
    ///   takes.
    /// - Closes connections that were queued but never started.
    pub async fn shutdown(self) {
        tracing::info!("Stopping worker pool");
        self.shutdown_token.cancel();

        tracing::debug!("Waiting for {} workers", self.workers.len());
        for (i, result) in futures::future::join_all(self.workers)
            .await
            .into_iter()
            .enumerate()
        {
            if let Err(e) = result {
                tracing::error!("Worker {i} terminated abnormally: {e}");
            }
        }

        let abandoned: usize = self.queues.iter().map(|queue| queue.drain().len()).sum();
        if abandoned > 0 {
            tracing::warn!("Closed {abandoned} queued connections that were never served");
        }

        tracing::info!("Worker pool shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_pool(n: usize) -> WorkerPool<u32> {
        let queues = (0..n).map(|_| Arc::new(PendingQueue::new())).collect();
        WorkerPool::new(queues, Vec::new(), CancellationToken::new())
    }

    #[test]
    fn equal_queues_fill_in_index_order() {
        let pool = idle_pool(3);
        let placed: Vec<usize> = (0..7).map(|conn| pool.dispatch(conn).unwrap()).collect();
        assert_eq!(placed, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(pool.queue_lens(), vec![3, 2, 2]);
    }

    #[test]
    fn picks_minimum_with_lowest_index_on_ties() {
        let pool = idle_pool(4);
        pool.queues[0].enqueue(100);
        pool.queues[0].enqueue(101);
        pool.queues[1].enqueue(102);
        pool.queues[3].enqueue(103);
        // Sizes [2, 1, 0, 1].
        assert_eq!(pool.dispatch(1).unwrap(), 2);
        // Sizes [2, 1, 1, 1].
        assert_eq!(pool.dispatch(2).unwrap(), 1);
        // Sizes [2, 2, 1, 1].
        assert_eq!(pool.dispatch(3).unwrap(), 2);
        assert_eq!(pool.dispatch(4).unwrap(), 3);
        assert_eq!(pool.queue_lens(), vec![2, 2, 2, 2]);
    }

    #[test]
    fn draining_a_queue_makes_it_preferred_again() {
        let pool = idle_pool(2);
        for conn in 0..4 {
            pool.dispatch(conn).unwrap();
        }
        assert_eq!(pool.queues[1].dequeue(), Some(1));
        assert_eq!(pool.dispatch(9).unwrap(), 1);
    }

    #[tokio::test]
    async fn refuses_work_after_shutdown_and_closes_queued_connections() {
        let pool = idle_pool(2);
        pool.dispatch(1).unwrap();
        pool.shutdown_token.cancel();

        assert!(matches!(pool.dispatch(2), Err(Error::ServiceShutdown)));

        let queues: Vec<_> = pool.queues.iter().map(Arc::clone).collect();
        pool.shutdown().await;
        assert!(queues.iter().all(|queue| queue.is_empty()));
    }

    #[tokio::test]
    async fn shutdown_waits_for_the_session_in_flight() {
        use futures::{SinkExt, StreamExt};
        use ledgerd_core::LedgerStore;
        use std::time::Duration;
        use tokio::io::{AsyncWriteExt, duplex};
        use tokio_util::codec::{Framed, LinesCodec};

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LedgerStore::open(dir.path().join("accounts.csv")).unwrap());
        let token = CancellationToken::new();
        let handler = SessionHandler::new(Arc::clone(&store), token.clone(), 64);
        let pool = WorkerPool::spawn(1, handler, token);

        let (client, server) = duplex(256);
        assert_eq!(pool.dispatch(server).unwrap(), 0);
        let mut client = Framed::new(client, LinesCodec::new());
        assert_eq!(client.next().await.unwrap().unwrap(), "ready");

        client.get_mut().write_all(b"d 1 ").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stopping = tokio::spawn(pool.shutdown());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stopping.is_finished());

        client.send("7").await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), "ok: deposited: 7");
        assert!(client.next().await.is_none());
        stopping.await.unwrap();
        assert_eq!(store.lookup_balance(1).unwrap(), 7);
    }
}
