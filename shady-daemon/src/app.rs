//! Host-facing lifecycle hooks: `startup`, `shutdown`, `greet`.

use shady_core::ServerConfig;

use crate::error::DaemonError;
use crate::runtime::{RunSummary, Server, ShutdownHandle};

/// Diagnostic greeting, unrelated to change forwarding.
pub fn greet(name: &str) -> String {
    format!("Hello {name}, It's showww time!")
}

/// Lifecycle wrapper a host shell drives.
///
/// `startup` blocks the calling task for the life of the server;
/// `shutdown` may be called from anywhere, before or during `startup`.
#[derive(Debug)]
pub struct App {
    config: ServerConfig,
    shutdown: ShutdownHandle,
}

impl App {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind, watch, and forward until [`shutdown`](App::shutdown).
    pub async fn startup(&self) -> Result<RunSummary, DaemonError> {
        let server = Server::bind_with(self.config.clone(), self.shutdown.clone()).await?;
        server.run().await
    }

    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    pub fn greet(&self, name: &str) -> String {
        greet(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use shady_core::Preset;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    #[test]
    fn greet_formats_name() {
        assert_eq!(greet("Ada"), "Hello Ada, It's showww time!");
        assert_eq!(
            App::new(Preset::HotReload.config()).greet(""),
            "Hello , It's showww time!"
        );
    }

    #[tokio::test]
    async fn shutdown_hook_stops_running_startup() {
        let watch = TempDir::new().expect("watch dir");
        let mut config = Preset::HotReload.config();
        config.listen = SocketAddr::from(([127, 0, 0, 1], 0));
        config.watch_dir = watch.path().to_path_buf();

        let app = Arc::new(App::new(config));
        let running = {
            let app = app.clone();
            tokio::spawn(async move { app.startup().await })
        };

        sleep(Duration::from_millis(50)).await;
        app.shutdown();

        let summary = timeout(Duration::from_secs(5), running)
            .await
            .expect("startup should return after shutdown")
            .expect("join")
            .expect("startup");
        assert_eq!(
            summary.forward.stop_reason(),
            Some(crate::notifier::StopReason::Shutdown)
        );
    }
}
