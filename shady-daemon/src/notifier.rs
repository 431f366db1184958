//! Filesystem notifier: forwards write-event paths to the Active Connection.
//!
//! The platform watcher pushes every `notify::Result<Event>` into an
//! unbounded channel; [`forward_events`] drains it on a single task, so
//! lines reach the client in the order the watcher delivered them.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::AsyncWrite;
use tokio::sync::{broadcast, mpsc};

use crate::error::DaemonError;
use crate::slot::{ConnectionSlot, Delivery};

pub type EventSender = mpsc::UnboundedSender<notify::Result<Event>>;
pub type EventReceiver = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Live registration with the platform watcher. Dropping it releases the watch.
pub struct WatchSubscription {
    _watcher: RecommendedWatcher,
    dir: PathBuf,
    active: bool,
}

impl WatchSubscription {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `false` when the directory could not be added; no events will arrive.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("dir", &self.dir)
            .field("active", &self.active)
            .finish()
    }
}

/// Subscribe to change notifications for `dir`.
///
/// Failing to create the watcher is fatal. Failing to add `dir` is logged and
/// yields an inactive subscription.
pub fn subscribe(
    dir: &Path,
    recursive: bool,
    sink: EventSender,
) -> Result<WatchSubscription, DaemonError> {
    let mut watcher = recommended_watcher(move |event| {
        let _ = sink.send(event);
    })?;

    let mode = if recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    let active = match watcher.watch(dir, mode) {
        Ok(()) => {
            tracing::info!(path = %dir.display(), recursive, "watching directory");
            true
        }
        Err(err) => {
            tracing::error!(
                path = %dir.display(),
                error = %err,
                "failed to watch directory; no change events will be forwarded",
            );
            false
        }
    };

    Ok(WatchSubscription {
        _watcher: watcher,
        dir: dir.to_path_buf(),
        active,
    })
}

/// Whether `kind` means a file's contents were written.
///
/// Renames (`Modify(Name)`) and permission changes (`Modify(Metadata)`) are
/// not writes.
pub fn is_write_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}

/// Why the event loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The watcher dropped its end of the event channel.
    SourceClosed,
    /// A shutdown was requested.
    Shutdown,
}

/// Event-loop states. `Running` → `Stopped` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierState {
    Running,
    Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSummary {
    pub forwarded: usize,
    pub no_client: usize,
    pub write_failures: usize,
    pub ignored: usize,
    pub watch_errors: usize,
    pub state: NotifierState,
}

impl Default for ForwardSummary {
    fn default() -> Self {
        Self {
            forwarded: 0,
            no_client: 0,
            write_failures: 0,
            ignored: 0,
            watch_errors: 0,
            state: NotifierState::Running,
        }
    }
}

impl ForwardSummary {
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.state {
            NotifierState::Running => None,
            NotifierState::Stopped(reason) => Some(reason),
        }
    }

    fn record(&mut self, delivery: &Delivery) {
        match delivery {
            Delivery::Delivered { .. } => self.forwarded += 1,
            Delivery::NoClient => self.no_client += 1,
            Delivery::Dropped { .. } => self.write_failures += 1,
        }
    }
}

/// Run the event loop until the source closes or shutdown is signalled.
pub async fn forward_events<W>(
    mut events: EventReceiver,
    slot: ConnectionSlot<W>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> ForwardSummary
where
    W: AsyncWrite + Unpin + Send,
{
    let mut summary = ForwardSummary::default();

    'events: while summary.state == NotifierState::Running {
        let next = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => None,
            event = events.recv() => Some(event),
        };
        let event = match next {
            None => {
                summary.state = NotifierState::Stopped(StopReason::Shutdown);
                continue;
            }
            Some(None) => {
                summary.state = NotifierState::Stopped(StopReason::SourceClosed);
                continue;
            }
            Some(Some(Err(err))) => {
                summary.watch_errors += 1;
                tracing::warn!(error = %err, "watcher event error");
                continue;
            }
            Some(Some(Ok(event))) => event,
        };

        tracing::debug!(kind = ?event.kind, paths = ?event.paths, "event");
        if !is_write_event(&event.kind) {
            summary.ignored += 1;
            continue;
        }

        for path in &event.paths {
            // A client that stopped reading must not hold up shutdown.
            let delivery = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    summary.state = NotifierState::Stopped(StopReason::Shutdown);
                    break 'events;
                }
                delivery = slot.send_line(path) => delivery,
            };
            match &delivery {
                Delivery::Delivered { peer, .. } => {
                    tracing::info!(path = %path.display(), peer = %peer, "modified file forwarded");
                }
                Delivery::NoClient => {
                    tracing::debug!(path = %path.display(), "modified file, no client attached");
                }
                Delivery::Dropped { .. } => {}
            }
            summary.record(&delivery);
        }
    }

    tracing::info!(
        forwarded = summary.forwarded,
        no_client = summary.no_client,
        write_failures = summary.write_failures,
        stop = ?summary.stop_reason(),
        "filesystem notifier stopped",
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use notify::event::{
        AccessKind, AccessMode, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode,
    };
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn write_event(path: &str) -> notify::Result<Event> {
        Ok(Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from(path)))
    }

    fn event(kind: EventKind, path: &str) -> notify::Result<Event> {
        Ok(Event::new(kind).add_path(PathBuf::from(path)))
    }

    async fn attached_slot() -> (ConnectionSlot<DuplexStream>, DuplexStream) {
        let slot = ConnectionSlot::new();
        let (server, client) = duplex(4096);
        slot.replace(server, SocketAddr::from(([127, 0, 0, 1], 43957)))
            .await;
        (slot, client)
    }

    async fn drain(client: &mut DuplexStream) -> String {
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.expect("read to end");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn write_kinds_are_recognised() {
        assert!(is_write_event(&EventKind::Modify(ModifyKind::Data(
            DataChange::Any
        ))));
        assert!(is_write_event(&EventKind::Modify(ModifyKind::Any)));

        for kind in [
            EventKind::Create(CreateKind::File),
            EventKind::Remove(RemoveKind::File),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            EventKind::Any,
            EventKind::Other,
        ] {
            assert!(!is_write_event(&kind), "{kind:?} is not a write");
        }
    }

    #[tokio::test]
    async fn write_events_forwarded_in_arrival_order() {
        let (slot, mut client) = attached_slot().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        for name in ["a.glsl", "b.glsl", "a.glsl", "c.wgsl"] {
            tx.send(write_event(&format!("/tmp/watched/{name}")))
                .expect("send");
        }
        drop(tx);

        let summary = forward_events(rx, slot.clone(), shutdown_rx).await;
        assert_eq!(summary.forwarded, 4);
        assert_eq!(summary.stop_reason(), Some(StopReason::SourceClosed));

        slot.clear().await;
        assert_eq!(
            drain(&mut client).await,
            "/tmp/watched/a.glsl\n/tmp/watched/b.glsl\n/tmp/watched/a.glsl\n/tmp/watched/c.wgsl\n"
        );
    }

    #[tokio::test]
    async fn non_write_events_produce_no_bytes() {
        let (slot, mut client) = attached_slot().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(event(EventKind::Create(CreateKind::File), "/w/new.glsl"))
            .expect("send");
        tx.send(event(EventKind::Remove(RemoveKind::File), "/w/old.glsl"))
            .expect("send");
        tx.send(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::From)),
            "/w/moved.glsl",
        ))
        .expect("send");
        tx.send(event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            "/w/chmod.glsl",
        ))
        .expect("send");
        drop(tx);

        let summary = forward_events(rx, slot.clone(), shutdown_rx).await;
        assert_eq!(summary.ignored, 4);
        assert_eq!(summary.forwarded, 0);

        slot.clear().await;
        assert_eq!(drain(&mut client).await, "");
    }

    #[tokio::test]
    async fn events_without_client_are_dropped_silently() {
        let slot = ConnectionSlot::<DuplexStream>::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        for n in 0..25 {
            tx.send(write_event(&format!("/w/{n}.glsl"))).expect("send");
        }
        drop(tx);

        let summary = forward_events(rx, slot, shutdown_rx).await;
        assert_eq!(summary.no_client, 25);
        assert_eq!(summary.forwarded, 0);
        assert_eq!(summary.write_failures, 0);
    }

    #[tokio::test]
    async fn watch_errors_do_not_stop_the_loop() {
        let (slot, mut client) = attached_slot().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(Err(notify::Error::generic("queue overflow")))
            .expect("send");
        tx.send(write_event("/w/after.glsl")).expect("send");
        drop(tx);

        let summary = forward_events(rx, slot.clone(), shutdown_rx).await;
        assert_eq!(summary.watch_errors, 1);
        assert_eq!(summary.forwarded, 1);

        slot.clear().await;
        assert_eq!(drain(&mut client).await, "/w/after.glsl\n");
    }

    #[tokio::test]
    async fn dead_client_is_detached_after_first_failed_write() {
        let (slot, client) = attached_slot().await;
        drop(client);
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(write_event("/w/a.glsl")).expect("send");
        tx.send(write_event("/w/b.glsl")).expect("send");
        drop(tx);

        let summary = forward_events(rx, slot.clone(), shutdown_rx).await;
        assert_eq!(summary.write_failures, 1);
        assert_eq!(summary.no_client, 1);
        assert!(!slot.is_connected().await);
    }

    #[tokio::test]
    async fn shutdown_terminates_a_waiting_loop() {
        let slot = ConnectionSlot::<DuplexStream>::new();
        let (_tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(forward_events(rx, slot, shutdown_rx));
        shutdown_tx.send(()).expect("send shutdown");

        let summary = task.await.expect("join");
        assert_eq!(summary.state, NotifierState::Stopped(StopReason::Shutdown));
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_stalled_write() {
        let slot = ConnectionSlot::new();
        // The reader never drains an 8-byte pipe, so the write parks.
        let (stalled, _stalled_client) = duplex(8);
        slot.replace(stalled, SocketAddr::from(([127, 0, 0, 1], 43957)))
            .await;
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(write_event("/tmp/watched/a-long-shader-name.glsl"))
            .expect("send");
        let task = tokio::spawn(forward_events(rx, slot.clone(), shutdown_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).expect("send shutdown");

        let summary = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop must stop while a write is parked")
            .expect("join");
        assert_eq!(summary.state, NotifierState::Stopped(StopReason::Shutdown));
        assert_eq!(summary.forwarded, 0);
        drop(tx);
    }

    #[test]
    fn subscribe_to_missing_directory_is_inactive() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let missing = dir.path().join("does-not-exist");
        let (tx, _rx) = mpsc::unbounded_channel();

        let subscription = subscribe(&missing, false, tx).expect("watcher created");
        assert!(!subscription.is_active());
        assert_eq!(subscription.dir(), missing.as_path());
    }

    #[test]
    fn subscribe_to_existing_directory_is_active() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let (tx, _rx) = mpsc::unbounded_channel();

        let subscription = subscribe(dir.path(), false, tx).expect("watcher created");
        assert!(subscription.is_active());
    }
}
