//! Startup and shutdown wiring: bind the listener, subscribe the watcher,
//! forward events until shutdown, then join the accept task.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shady_core::ServerConfig;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use crate::acceptor::{self, AcceptSummary};
use crate::error::{io_err, DaemonError};
use crate::notifier::{self, ForwardSummary};
use crate::slot::ConnectionSlot;

/// Broadcast shutdown signal. Cloning shares the same signal.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
    requested: Arc<AtomicBool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request shutdown. Safe to call any number of times, before or during `run`.
    pub fn shutdown(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            tracing::info!("shutdown requested");
        }
        let _ = self.tx.send(());
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub accept: AcceptSummary,
    pub forward: ForwardSummary,
}

/// A bound server, ready to [`run`](Server::run).
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Server {
    /// Bind the listening endpoint. Nothing is watched yet.
    pub async fn bind(config: ServerConfig) -> Result<Self, DaemonError> {
        Self::bind_with(config, ShutdownHandle::new()).await
    }

    /// Bind, sharing an existing shutdown signal.
    pub async fn bind_with(
        config: ServerConfig,
        shutdown: ShutdownHandle,
    ) -> Result<Self, DaemonError> {
        // Subscribe before anything can fail so a concurrent shutdown is never lost.
        let shutdown_rx = shutdown.subscribe();
        let listener = acceptor::bind(config.listen).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| io_err("listener local address", e))?;
        Ok(Self {
            config,
            listener,
            local_addr,
            shutdown,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept clients in the background and forward write events until
    /// shutdown or until the watcher goes away.
    pub async fn run(self) -> Result<RunSummary, DaemonError> {
        let Server {
            config,
            listener,
            local_addr,
            shutdown,
            shutdown_rx,
        } = self;

        let slot = ConnectionSlot::new();

        let accept_handle = {
            let slot = slot.clone();
            let shutdown_rx = shutdown.subscribe();
            tokio::spawn(acceptor::accept_loop(
                listener,
                config.accept,
                slot,
                shutdown_rx,
            ))
        };

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watch_dir = absolute_watch_dir(&config.watch_dir);
        let subscription = match notifier::subscribe(&watch_dir, config.recursive, event_tx) {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::error!(error = %err, "failed to create filesystem watcher");
                shutdown.shutdown();
                let _ = accept_handle.await;
                slot.clear().await;
                return Err(err);
            }
        };

        tracing::info!(
            addr = %local_addr,
            watch = %subscription.dir().display(),
            accept = %config.accept,
            "shady server running",
        );

        let forward = if shutdown.is_requested() {
            ForwardSummary {
                state: notifier::NotifierState::Stopped(notifier::StopReason::Shutdown),
                ..ForwardSummary::default()
            }
        } else {
            notifier::forward_events(event_rx, slot.clone(), shutdown_rx).await
        };
        drop(subscription);

        shutdown.shutdown();
        let accept = handle_join("accept_loop", accept_handle.await)?;
        slot.clear().await;

        Ok(RunSummary { accept, forward })
    }
}

/// Start the server and block the current thread until it exits.
///
/// Ctrl-C triggers a graceful shutdown.
pub fn start_blocking(config: ServerConfig, json_logs: bool) -> Result<RunSummary, DaemonError> {
    init_tracing(json_logs);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    runtime.block_on(async move {
        let server = Server::bind(config).await?;
        let shutdown = server.shutdown_handle();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("received ctrl-c, shutting down");
                    shutdown.shutdown();
                }
                Err(err) => tracing::warn!(error = %err, "ctrl-c handler failed"),
            }
        });
        server.run().await
    })
}

/// Canonicalize so forwarded paths are absolute. A path that cannot be
/// canonicalized is kept as-is; the watch-add failure is reported later.
fn absolute_watch_dir(dir: &Path) -> PathBuf {
    match std::fs::canonicalize(dir) {
        Ok(path) => path,
        Err(_) => std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf()),
    }
}

fn handle_join<T>(
    task: &str,
    result: Result<T, tokio::task::JoinError>,
) -> Result<T, DaemonError> {
    result.map_err(|err| DaemonError::Task(format!("{task} task join failure: {err}")))
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
