use crate::server::{pool::manager::WorkerPool, telemetry::AUDIT_TARGET};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use tokio_util::sync::CancellationToken;

/// Accepts connections from `incoming` and hands each one to the pool.
///
/// Runs until `shutdown` is cancelled or the stream ends. A failed accept is
/// logged and skipped. Returns the number of connections dispatched.
pub async fn accept_loop<I, C, E>(
    incoming: I,
    pool: &WorkerPool<C>,
    shutdown: &CancellationToken,
) -> usize
where
    I: Stream<Item = Result<C, E>>,
    E: Display,
{
    let mut incoming = std::pin::pin!(incoming);
    let mut accepted = 0;

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::debug!("Accept loop observed shutdown");
                break;
            }
            next = incoming.next() => match next {
                Some(Ok(conn)) => match pool.dispatch(conn) {
                    Ok(idx) => {
                        accepted += 1;
                        tracing::info!(target: AUDIT_TARGET, "New connection placed in queue #{idx}");
                    }
                    Err(e) => {
                        tracing::debug!("Dropped connection: {e}");
                        break;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!("Failed to accept connection: {e}");
                }
                None => {
                    tracing::warn!("Listener closed");
                    break;
                }
            }
        }
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::pool::queue::PendingQueue;
    use futures::stream;
    use std::{io, sync::Arc};

    fn idle_pool(n: usize, shutdown: &CancellationToken) -> WorkerPool<u32> {
        let queues = (0..n).map(|_| Arc::new(PendingQueue::new())).collect();
        WorkerPool::new(queues, Vec::new(), shutdown.clone())
    }

    #[tokio::test]
    async fn dispatches_until_stream_ends_and_skips_accept_errors() {
        let shutdown = CancellationToken::new();
        let pool = idle_pool(2, &shutdown);
        let incoming = stream::iter(vec![
            Ok(1),
            Err(io::Error::other("too many open files")),
            Ok(2),
            Ok(3),
        ]);

        assert_eq!(accept_loop(incoming, &pool, &shutdown).await, 3);
        assert_eq!(pool.queue_lens(), vec![2, 1]);
    }

    #[tokio::test]
    async fn stops_on_shutdown_while_waiting() {
        let shutdown = CancellationToken::new();
        let pool = idle_pool(1, &shutdown);
        let incoming = stream::pending::<io::Result<u32>>();

        let canceller = shutdown.clone();
        tokio::spawn(async move { canceller.cancel() });

        assert_eq!(accept_loop(incoming, &pool, &shutdown).await, 0);
    }

    #[tokio::test]
    async fn accepts_nothing_once_cancelled() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let pool = idle_pool(1, &shutdown);

        let incoming = stream::iter(vec![io::Result::Ok(7)]);
        assert_eq!(accept_loop(incoming, &pool, &shutdown).await, 0);
        assert_eq!(pool.queue_lens(), vec![0]);
    }
}
