//! Single-slot holder for the Active Connection.
//!
//! The acceptor replaces the slot, the notifier writes through it. The slot
//! lock is only held to swap or read the current entry; writes run against a
//! per-connection lock and race a close signal, so replacing or clearing the
//! slot never waits on a client that stopped reading.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

/// How long one line may take to reach the socket before the client is detached.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of forwarding one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The line was written and flushed.
    Delivered { peer: SocketAddr, bytes: usize },
    /// No client attached; the line was dropped.
    NoClient,
    /// The write failed or timed out; the connection was closed and the slot emptied.
    Dropped { peer: SocketAddr, error: String },
}

struct ActiveConnection<W> {
    id: u64,
    peer: SocketAddr,
    stream: Arc<Mutex<W>>,
    closed: watch::Sender<bool>,
}

/// What a writer needs, taken out of the slot so the slot lock can be released.
struct Writer<W> {
    id: u64,
    peer: SocketAddr,
    stream: Arc<Mutex<W>>,
    closed: watch::Receiver<bool>,
}

enum WriteOutcome {
    Written,
    Superseded,
    Failed(String),
}

struct SlotState<W> {
    current: Option<ActiveConnection<W>>,
    next_id: u64,
}

/// Shared, mutex-guarded `Option<connection>`.
pub struct ConnectionSlot<W = TcpStream> {
    inner: Arc<Mutex<SlotState<W>>>,
    write_timeout: Duration,
}

impl<W> Clone for ConnectionSlot<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            write_timeout: self.write_timeout,
        }
    }
}

impl<W> Default for ConnectionSlot<W> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotState {
                current: None,
                next_id: 1,
            })),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl<W> ConnectionSlot<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Install `stream` as the Active Connection and close the previous one.
    ///
    /// A write in flight to the previous connection is abandoned.
    /// Returns the peer address of the superseded connection, if any.
    pub async fn replace(&self, stream: W, peer: SocketAddr) -> Option<SocketAddr> {
        let (closed, _) = watch::channel(false);
        let mut state = self.inner.lock().await;
        let id = state.next_id;
        state.next_id += 1;

        let previous = state.current.replace(ActiveConnection {
            id,
            peer,
            stream: Arc::new(Mutex::new(stream)),
            closed,
        });
        drop(state);

        let previous = previous?;
        let previous_peer = previous.peer;
        close(previous).await;
        tracing::info!(
            connection = id,
            peer = %peer,
            superseded = %previous_peer,
            "client superseded previous connection",
        );
        Some(previous_peer)
    }

    /// Write `<path>\n` to the Active Connection.
    ///
    /// If the connection is superseded mid-write the line goes to the new one.
    pub async fn send_line(&self, path: &Path) -> Delivery {
        let mut line = path.to_string_lossy().into_owned();
        line.push('\n');

        loop {
            let Some(mut writer) = self.writer().await else {
                return Delivery::NoClient;
            };

            match self.write_line(&mut writer, line.as_bytes()).await {
                WriteOutcome::Written => {
                    return Delivery::Delivered {
                        peer: writer.peer,
                        bytes: line.len(),
                    };
                }
                WriteOutcome::Superseded => continue,
                WriteOutcome::Failed(error) => {
                    tracing::warn!(
                        connection = writer.id,
                        peer = %writer.peer,
                        error = %error,
                        "client write failed; detaching connection",
                    );
                    self.detach(writer.id).await;
                    return Delivery::Dropped {
                        peer: writer.peer,
                        error,
                    };
                }
            }
        }
    }

    /// Close and drop the Active Connection, if any.
    pub async fn clear(&self) -> Option<SocketAddr> {
        let previous = self.inner.lock().await.current.take()?;
        let peer = previous.peer;
        close(previous).await;
        Some(peer)
    }

    pub async fn peer(&self) -> Option<SocketAddr> {
        self.inner.lock().await.current.as_ref().map(|c| c.peer)
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.current.is_some()
    }

    async fn writer(&self) -> Option<Writer<W>> {
        let state = self.inner.lock().await;
        state.current.as_ref().map(|active| Writer {
            id: active.id,
            peer: active.peer,
            stream: active.stream.clone(),
            closed: active.closed.subscribe(),
        })
    }

    async fn write_line(&self, writer: &mut Writer<W>, bytes: &[u8]) -> WriteOutcome {
        let stream = writer.stream.clone();
        let write = async move {
            let mut stream = stream.lock().await;
            stream.write_all(bytes).await?;
            stream.flush().await
        };

        tokio::select! {
            biased;
            _ = writer.closed.wait_for(|closed| *closed) => WriteOutcome::Superseded,
            written = tokio::time::timeout(self.write_timeout, write) => match written {
                Ok(Ok(())) => WriteOutcome::Written,
                Ok(Err(err)) => WriteOutcome::Failed(err.to_string()),
                Err(_) => WriteOutcome::Failed(format!(
                    "write timed out after {}ms",
                    self.write_timeout.as_millis()
                )),
            },
        }
    }

    /// Empty the slot if it still holds connection `id`.
    async fn detach(&self, id: u64) {
        let mut state = self.inner.lock().await;
        if state.current.as_ref().map(|c| c.id) != Some(id) {
            return;
        }
        let dead = state.current.take();
        drop(state);
        if let Some(dead) = dead {
            close(dead).await;
        }
    }
}

async fn close<W: AsyncWrite + Unpin>(connection: ActiveConnection<W>) {
    // Wakes any writer first so it releases the stream lock.
    connection.closed.send_replace(true);
    let mut stream = connection.stream.lock().await;
    if let Err(err) = stream.shutdown().await {
        tracing::debug!(
            connection = connection.id,
            peer = %connection.peer,
            error = %err,
            "ignoring error while closing connection",
        );
    }
}
