use crate::server::{pool::queue::PendingQueue, service::handler::SessionHandler};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// Worker task bound to one [`PendingQueue`] for the life of the process.
///
/// The worker suspends until its queue yields a connection, then drives that
/// connection to completion with the [`SessionHandler`] before looking at the
/// queue again. Once `shutdown` is cancelled it takes no new connections; the
/// session in progress still finishes its current request.
///
/// # Arguments
///
/// - `worker_id`: Index of the worker and of its queue (used for logs).
/// - `queue`: The queue this worker drains. No other worker reads it.
/// - `handler`: Session handler shared by all workers.
/// - `shutdown`: Process-wide shutdown flag.
pub async fn worker_loop<C>(
    worker_id: usize,
    queue: Arc<PendingQueue<C>>,
    handler: SessionHandler,
    shutdown: CancellationToken,
) where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tracing::trace!("Worker {worker_id} started");

    while let Some(conn) = queue.next(&shutdown).await {
        tracing::debug!("Worker {worker_id} picked up a connection");

        match handler.run(worker_id, conn).await {
            Ok(served) => {
                tracing::debug!("Worker {worker_id} closed connection after {served} requests");
            }
            Err(e) => {
                tracing::warn!("Worker {worker_id} session ended with error: {e}");
            }
        }
    }

    tracing::debug!("Worker {worker_id} stopped");
}
