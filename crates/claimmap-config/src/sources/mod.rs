//! Configuration sources
//!
//! This module watches provider configuration for changes:
//! - File: Watch the provider file and reload the registry when it changes

mod file;

pub use file::{FileWatcherConfig, ProviderFileWatcher};

/// Outcome of a reload triggered by a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    /// The new provider set is active.
    Reloaded {
        /// Number of providers in the new set.
        providers: usize,
    },
    /// The file was rejected; the previous set stays active.
    Failed {
        /// Why the file was rejected.
        error: String,
    },
}

impl ReloadEvent {
    /// Returns `true` if the new configuration is active.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Reloaded { .. })
    }
}

/// Handle for a running watcher
pub struct WatchHandle {
    /// Task handle for the watcher
    handle: tokio::task::JoinHandle<()>,
    /// Shutdown signal
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl WatchHandle {
    /// Create a new watch handle
    pub fn new(
        handle: tokio::task::JoinHandle<()>,
        shutdown: tokio::sync::oneshot::Sender<()>,
    ) -> Self {
        Self { handle, shutdown }
    }

    /// Returns `true` if the watcher task has stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the watcher
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}
