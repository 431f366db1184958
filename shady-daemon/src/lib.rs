//! shady runtime: TCP connection slot + filesystem notifier + lifecycle.

pub mod acceptor;
pub mod app;
mod error;
pub mod notifier;
mod runtime;
pub mod slot;

pub use app::{greet, App};
pub use error::DaemonError;
pub use notifier::{ForwardSummary, NotifierState, StopReason, WatchSubscription};
pub use runtime::{start_blocking, RunSummary, Server, ShutdownHandle};
pub use slot::{ConnectionSlot, Delivery, DEFAULT_WRITE_TIMEOUT};
