//! Per-connection session handling.
//!
//! A session drives one client connection from greeting to close:
//!
//! ```text
//! Greeting -> AwaitRequest -> Processing -> Responding -> Responded
//!                  ^                                          |
//!                  +------------------------------------------+--> Closed
//! ```
//!
//! Requests on a connection are handled strictly one at a time, in arrival
//! order. Each store operation runs on the blocking pool and is awaited to
//! completion, so shutdown never leaves a ledger update half applied.
//!
//! Shutdown is cooperative: a session waiting for a request closes as soon as
//! the flag is set, while a request that has already been received, or has
//! partly arrived, is processed and answered before the session closes.
//!
//! Lines are framed as raw bytes and decoded here, so a request that is not
//! valid UTF-8 is answered like any other malformed request.

use futures::{SinkExt, StreamExt};
use ledgerd_core::{Error, LedgerStore, Reply, Request, Result, protocol::GREETING};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::{
    codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Framed},
    sync::CancellationToken,
};

/// Serves the line protocol on client connections.
///
/// Cheap to clone; every worker holds its own copy.
#[derive(Clone, Debug)]
pub struct SessionHandler {
    store: Arc<LedgerStore>,
    shutdown: CancellationToken,
    max_request_length: usize,
}

enum SessionState {
    Greeting,
    AwaitRequest,
    Processing(String),
    Responding { reply: Reply, close: bool },
    Responded,
    Closed,
}

impl SessionHandler {
    pub const fn new(
        store: Arc<LedgerStore>,
        shutdown: CancellationToken,
        max_request_length: usize,
    ) -> Self {
        Self {
            store,
            shutdown,
            max_request_length,
        }
    }

    /// Runs a session on `conn` until the client disconnects, an I/O error
    /// occurs, or shutdown is observed between requests. The connection is
    /// closed when this returns.
    ///
    /// Returns the number of responses sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionIo`] if reading from or writing to the
    /// connection fails. Other sessions are unaffected.
    #[tracing::instrument(name = "session", skip_all, fields(worker_id = worker_id))]
    pub async fn run<C>(&self, worker_id: usize, conn: C) -> Result<usize>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let codec = AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            self.max_request_length,
        );
        let mut framed = Framed::new(conn, codec);
        let mut state = SessionState::Greeting;
        let mut served = 0;

        loop {
            state = match state {
                SessionState::Greeting => {
                    send_line(&mut framed, GREETING).await?;
                    SessionState::AwaitRequest
                }
                SessionState::AwaitRequest => {
                    // Shutdown waits for a line that has started to arrive.
                    let partial = !framed.read_buffer().is_empty();
                    tokio::select! {
                        // A request that has already arrived is served even if
                        // shutdown was signalled in the meantime.
                        biased;
                        frame = framed.next() => match frame {
                            Some(Ok(frame)) => match std::str::from_utf8(&frame) {
                                Ok(line) => SessionState::Processing(
                                    line.strip_suffix('\r').unwrap_or(line).to_owned(),
                                ),
                                Err(e) => {
                                    tracing::debug!("Request is not valid UTF-8: {e}");
                                    SessionState::Responding {
                                        reply: Error::MalformedRequest.into(),
                                        close: false,
                                    }
                                }
                            },
                            Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                                tracing::debug!("Request exceeds {} bytes", self.max_request_length);
                                SessionState::Responding {
                                    reply: Error::MalformedRequest.into(),
                                    close: true,
                                }
                            }
                            Some(Err(AnyDelimiterCodecError::Io(e))) => {
                                return Err(Error::ConnectionIo {
                                    context: format!("read failed: {e}"),
                                });
                            }
                            None => {
                                tracing::debug!("Client disconnected");
                                SessionState::Closed
                            }
                        },
                        () = self.shutdown.cancelled(), if !partial => {
                            if framed.read_buffer().is_empty() {
                                tracing::debug!("Closing idle session for shutdown");
                                SessionState::Closed
                            } else {
                                tracing::debug!("Finishing partial request before shutdown");
                                SessionState::AwaitRequest
                            }
                        }
                    }
                }
                SessionState::Processing(line) => SessionState::Responding {
                    reply: self.process(&line).await,
                    close: false,
                },
                SessionState::Responding { reply, close } => {
                    send_line(&mut framed, &reply.to_string()).await?;
                    served += 1;
                    if close {
                        SessionState::Closed
                    } else {
                        SessionState::Responded
                    }
                }
                SessionState::Responded => {
                    if self.shutdown.is_cancelled() {
                        tracing::debug!("Closing session after in-flight request for shutdown");
                        SessionState::Closed
                    } else {
                        SessionState::AwaitRequest
                    }
                }
                SessionState::Closed => break,
            };
        }

        Ok(served)
    }

    /// Parses one request line and runs it against the store.
    async fn process(&self, line: &str) -> Reply {
        let request = match line.parse::<Request>() {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(request = line, "Rejected request: {e}");
                return e.into();
            }
        };

        let store = Arc::clone(&self.store);
        let reply = match tokio::task::spawn_blocking(move || store.execute(request)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Ledger operation failed to complete: {e}");
                Error::StoreUnavailable(std::io::Error::other(e)).into()
            }
        };

        if let Reply(Err(Error::StoreUnavailable(e))) = &reply {
            tracing::error!("Ledger file unavailable: {e}");
        }
        tracing::debug!(request = line, reply = %reply, "Handled request");
        reply
    }
}

async fn send_line<C>(framed: &mut Framed<C, AnyDelimiterCodec>, line: &str) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(line).await.map_err(|e| Error::ConnectionIo {
        context: format!("write failed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::{
        io::{AsyncWriteExt, DuplexStream, duplex},
        task::JoinHandle,
    };
    use tokio_util::codec::LinesCodec;

    type Client = Framed<DuplexStream, LinesCodec>;

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<LedgerStore>,
        shutdown: CancellationToken,
        handler: SessionHandler,
    }

    fn harness(max_request_length: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LedgerStore::open(dir.path().join("accounts.csv")).unwrap());
        let shutdown = CancellationToken::new();
        let handler = SessionHandler::new(Arc::clone(&store), shutdown.clone(), max_request_length);
        Harness {
            _dir: dir,
            store,
            shutdown,
            handler,
        }
    }

    async fn connect(handler: &SessionHandler) -> (Client, JoinHandle<Result<usize>>) {
        let (client, server) = duplex(1024);
        let handler = handler.clone();
        let session = tokio::spawn(async move { handler.run(0, server).await });
        let mut client = Framed::new(client, LinesCodec::new());
        assert_eq!(client.next().await.unwrap().unwrap(), "ready");
        (client, session)
    }

    async fn exchange(client: &mut Client, line: &str) -> String {
        client.send(line).await.unwrap();
        client.next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn serves_requests_in_order() {
        let h = harness(64);
        let (mut client, session) = connect(&h.handler).await;

        assert_eq!(exchange(&mut client, "d 5 100").await, "ok: deposited: 100");
        assert_eq!(exchange(&mut client, "d 5 100").await, "ok: deposited: 100");
        assert_eq!(exchange(&mut client, "l 5").await, "ok: balance: 200");
        assert_eq!(exchange(&mut client, "w 5 150").await, "ok: withdrew 150");
        assert_eq!(exchange(&mut client, "d 6 1").await, "ok: deposited: 1");
        assert_eq!(
            exchange(&mut client, "t 5 6 50").await,
            "ok: transferred 50 from 5 to 6"
        );
        assert_eq!(exchange(&mut client, "l 5").await, "ok: balance: 0");
        assert_eq!(exchange(&mut client, "l 6").await, "ok: balance: 51");

        drop(client);
        assert_eq!(session.await.unwrap().unwrap(), 8);
    }

    #[tokio::test]
    async fn bad_requests_get_fixed_failures_and_leave_store_untouched() {
        let h = harness(64);
        let (mut client, session) = connect(&h.handler).await;

        for line in ["x 1", "", "d 5", "d 5 abc", "t 1 2", "l 1 2"] {
            assert_eq!(exchange(&mut client, line).await, "fail: incorrect command");
        }
        assert_eq!(exchange(&mut client, "d 5 -1").await, "fail: amount cannot be negative");
        assert_eq!(exchange(&mut client, "w 5 1").await, "fail: account not found");
        assert_eq!(
            exchange(&mut client, "t 5 5 1").await,
            "fail: transfer only between different accounts"
        );

        drop(client);
        session.await.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(h.store.path()).unwrap(), "");
    }

    #[tokio::test]
    async fn overlong_request_is_rejected_and_closes_session() {
        let h = harness(16);
        let (mut client, session) = connect(&h.handler).await;

        let long = format!("d 1 {}", "1".repeat(40));
        assert_eq!(exchange(&mut client, &long).await, "fail: incorrect command");
        assert!(client.next().await.is_none());
        assert_eq!(session.await.unwrap().unwrap(), 1);
        assert_eq!(h.store.lookup_balance(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn accepts_crlf_terminated_requests() {
        let h = harness(64);
        let (mut client, _session) = connect(&h.handler).await;

        client.get_mut().write_all(b"d 2 30\r\n").await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), "ok: deposited: 30");
    }

    #[tokio::test]
    async fn non_utf8_request_is_malformed_and_session_continues() {
        let h = harness(64);
        let (mut client, session) = connect(&h.handler).await;

        client.get_mut().write_all(b"\xff 1\n").await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), "fail: incorrect command");
        assert_eq!(exchange(&mut client, "l 1").await, "ok: balance: 0");

        drop(client);
        assert_eq!(session.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn partly_received_request_is_finished_after_shutdown() {
        let h = harness(64);
        let (mut client, session) = connect(&h.handler).await;

        client.get_mut().write_all(b"d 1 ").await.unwrap();
        // Let the session read the fragment before shutdown starts.
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!session.is_finished());

        client.get_mut().write_all(b"5\n").await.unwrap();
        assert_eq!(client.next().await.unwrap().unwrap(), "ok: deposited: 5");
        assert!(client.next().await.is_none());
        assert_eq!(session.await.unwrap().unwrap(), 1);
        assert_eq!(h.store.lookup_balance(1).unwrap(), 5);
    }

    #[tokio::test]
    async fn request_received_before_shutdown_is_answered() {
        let h = harness(64);
        let (mut client, session) = connect(&h.handler).await;

        client.send("d 1 5").await.unwrap();
        h.shutdown.cancel();

        assert_eq!(client.next().await.unwrap().unwrap(), "ok: deposited: 5");
        assert!(client.next().await.is_none());
        assert_eq!(session.await.unwrap().unwrap(), 1);
        assert_eq!(h.store.lookup_balance(1).unwrap(), 5);
    }

    #[tokio::test]
    async fn idle_session_closes_on_shutdown() {
        let h = harness(64);
        let (mut client, session) = connect(&h.handler).await;

        h.shutdown.cancel();
        assert!(client.next().await.is_none());
        assert_eq!(session.await.unwrap().unwrap(), 0);
    }

    #[tokio::test]
    async fn unavailable_store_is_reported_per_request() {
        let h = harness(64);
        let (mut client, _session) = connect(&h.handler).await;

        std::fs::remove_file(h.store.path()).unwrap();
        assert_eq!(exchange(&mut client, "l 1").await, "fail: error with database file");

        std::fs::write(h.store.path(), "").unwrap();
        assert_eq!(exchange(&mut client, "d 1 1").await, "ok: deposited: 1");
    }
}
