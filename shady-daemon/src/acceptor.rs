//! Connection manager: accept clients into the [`ConnectionSlot`].

use std::io;
use std::net::SocketAddr;

use shady_core::AcceptMode;
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::error::{io_err, DaemonError};
use crate::slot::ConnectionSlot;

/// What the accept loop did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptSummary {
    pub accepted: usize,
    pub superseded: usize,
    pub accept_errors: usize,
}

/// Bind the listening endpoint.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, DaemonError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| DaemonError::Bind { addr, source })?;
    let local = listener
        .local_addr()
        .map_err(|e| io_err("listener local address", e))?;
    tracing::info!(addr = %local, "listening for clients");
    Ok(listener)
}

/// Accept clients until shutdown (persistent) or until one client is attached (one-shot).
///
/// A failed accept leaves the current connection untouched.
pub async fn accept_loop(
    listener: TcpListener,
    mode: AcceptMode,
    slot: ConnectionSlot,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> AcceptSummary {
    let mut summary = AcceptSummary::default();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                if let Ok((stream, peer)) = &accepted {
                    if let Err(err) = stream.set_nodelay(true) {
                        tracing::debug!(peer = %peer, error = %err, "could not set TCP_NODELAY");
                    }
                }
                if admit(accepted, mode, &slot, &mut summary).await {
                    break;
                }
            }
        }
    }

    summary
}

/// Install one accept result. Returns `true` when the loop should stop.
async fn admit<W>(
    accepted: io::Result<(W, SocketAddr)>,
    mode: AcceptMode,
    slot: &ConnectionSlot<W>,
    summary: &mut AcceptSummary,
) -> bool
where
    W: AsyncWrite + Unpin + Send,
{
    let (stream, peer) = match accepted {
        Ok(accepted) => accepted,
        Err(err) => {
            summary.accept_errors += 1;
            tracing::warn!(error = %err, "accept failed");
            return false;
        }
    };

    summary.accepted += 1;
    tracing::info!(peer = %peer, mode = %mode, "client connected");
    if slot.replace(stream, peer).await.is_some() {
        summary.superseded += 1;
    }

    if mode == AcceptMode::OneShot {
        tracing::info!("one-shot client attached; no longer accepting");
        return true;
    }
    false
}
