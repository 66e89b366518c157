//! Client-facing side of the server.
//!
//! - [`acceptor`] - accepts connections and dispatches them to the pool.
//! - [`handler`] - drives one client session over the line protocol.
//!
//! [`LedgerService`] ties the two to a [`WorkerPool`] and owns the order of
//! shutdown: stop accepting, then stop the pool and wait for its workers.

pub mod acceptor;
pub mod handler;

use crate::server::{config::ServerConfig, pool::manager::WorkerPool};
use acceptor::accept_loop;
use futures::Stream;
use handler::SessionHandler;
use ledgerd_core::LedgerStore;
use std::{fmt::Display, sync::Arc};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

pub struct LedgerService<C> {
    pool: WorkerPool<C>,
    shutdown: CancellationToken,
}

impl<C> LedgerService<C>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Spawns the worker pool described by `config`. Cancelling `shutdown`
    /// stops the service.
    pub fn new(config: &ServerConfig, store: Arc<LedgerStore>, shutdown: CancellationToken) -> Self {
        let handler = SessionHandler::new(store, shutdown.clone(), config.max_request_length);
        let pool = WorkerPool::spawn(config.num_workers, handler, shutdown.clone());
        tracing::debug!("Spawned {} workers", pool.size());
        Self { pool, shutdown }
    }

    /// Serves connections from `incoming` until shutdown, then waits for the
    /// worker pool to stop. Returns the number of connections accepted.
    pub async fn serve<I, E>(self, incoming: I) -> usize
    where
        I: Stream<Item = Result<C, E>>,
        E: Display,
    {
        let accepted = accept_loop(incoming, &self.pool, &self.shutdown).await;
        tracing::info!("Accepted {accepted} connections, shutting down");
        self.pool.shutdown().await;
        accepted
    }
}
