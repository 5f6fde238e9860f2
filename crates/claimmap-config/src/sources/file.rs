//! File-based provider source
//!
//! Watches the provider file for changes and reloads the registry when it is
//! modified.

use crate::ConfigError;
use crate::registry::ProviderRegistry;
use crate::sources::{ReloadEvent, WatchHandle};

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Configuration for file watcher
#[derive(Debug, Clone)]
pub struct FileWatcherConfig {
    /// Path to the provider file
    pub path: PathBuf,
    /// Debounce duration for rapid changes
    pub debounce: Duration,
    /// How often the watcher task checks for debounced events
    pub poll_interval: Duration,
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("providers.toml"),
            debounce: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl FileWatcherConfig {
    /// Create config for a specific path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set debounce duration
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Reloads a [`ProviderRegistry`] whenever its file changes.
pub struct ProviderFileWatcher {
    config: FileWatcherConfig,
}

impl ProviderFileWatcher {
    /// Create a new file watcher
    pub fn new(config: FileWatcherConfig) -> Self {
        Self { config }
    }

    /// Create a watcher for the file backing `registry`.
    pub fn for_registry(registry: &ProviderRegistry) -> Result<Self, ConfigError> {
        let path = registry
            .path()
            .ok_or_else(|| ConfigError::watcher("registry has no provider file to watch"))?;
        Ok(Self::new(FileWatcherConfig::new(path)))
    }

    /// Start watching.
    ///
    /// Every change reloads `registry`; the outcome is sent to `events` if
    /// given. The watcher runs until the returned handle is stopped or the
    /// event receiver is dropped.
    pub fn watch(
        &self,
        registry: ProviderRegistry,
        events: Option<mpsc::Sender<ReloadEvent>>,
    ) -> Result<WatchHandle, ConfigError> {
        let path = self.config.path.clone();
        let poll_interval = self.config.poll_interval;

        // Watch the parent directory so editors that replace the file are seen
        let watch_path = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(self.config.debounce, notify_tx)
            .map_err(|e| ConfigError::watcher(format!("failed to create file watcher: {e}")))?;
        debouncer
            .watcher()
            .watch(&watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                ConfigError::watcher(format!("failed to watch {}: {e}", watch_path.display()))
            })?;

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            // Dropping the debouncer stops the notify thread
            let _debouncer = debouncer;
            info!(path = %path.display(), "Started watching provider file");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Provider file watcher shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        let mut changed = false;
                        while let Ok(result) = notify_rx.try_recv() {
                            match result {
                                Ok(batch) => {
                                    changed |= batch
                                        .iter()
                                        .any(|event| event.path.file_name() == path.file_name());
                                }
                                Err(e) => error!(error = %e, "File watcher error"),
                            }
                        }

                        if !changed {
                            continue;
                        }

                        debug!(path = %path.display(), "Provider file changed");
                        let event = match registry.reload() {
                            Ok(providers) => ReloadEvent::Reloaded {
                                providers: providers.len(),
                            },
                            Err(e) => ReloadEvent::Failed {
                                error: e.to_string(),
                            },
                        };

                        if let Some(tx) = &events {
                            if tx.send(event).await.is_err() {
                                warn!("Reload event receiver dropped");
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(WatchHandle::new(handle, shutdown_tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderSet;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const ONE: &str = r#"
[[oidc_providers]]
idp_id = "one"
"#;

    const TWO: &str = r#"
[[oidc_providers]]
idp_id = "one"

[[oidc_providers]]
idp_id = "two"
"#;

    fn fast_config(path: PathBuf) -> FileWatcherConfig {
        FileWatcherConfig {
            path,
            debounce: Duration::from_millis(100),
            poll_interval: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_watcher_config_defaults() {
        let config = FileWatcherConfig::new("/etc/claimmap/providers.toml")
            .with_debounce(Duration::from_secs(1));
        assert_eq!(config.path, PathBuf::from("/etc/claimmap/providers.toml"));
        assert_eq!(config.debounce, Duration::from_secs(1));
    }

    #[test]
    fn test_watcher_requires_backing_file() {
        let registry = ProviderRegistry::new(ProviderSet::new());
        assert!(matches!(
            ProviderFileWatcher::for_registry(&registry),
            Err(ConfigError::Watcher(_))
        ));
    }

    #[tokio::test]
    async fn test_file_watcher_reloads_registry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("providers.toml");
        std::fs::write(&path, ONE).unwrap();

        let registry = ProviderRegistry::load(&path).unwrap();
        let watcher = ProviderFileWatcher::new(fast_config(path.clone()));
        let (tx, mut rx) = mpsc::channel(10);
        let handle = watcher.watch(registry.clone(), Some(tx)).unwrap();

        // Give watcher time to start
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, TWO).unwrap();

        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(event)) => assert_eq!(event, ReloadEvent::Reloaded { providers: 2 }),
            Ok(None) => panic!("Channel closed unexpectedly"),
            Err(_) => panic!("Timeout waiting for reload event"),
        }
        assert!(registry.get("two").is_some());

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_file_watcher_keeps_previous_on_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("providers.toml");
        std::fs::write(&path, ONE).unwrap();

        let registry = ProviderRegistry::load(&path).unwrap();
        let watcher = ProviderFileWatcher::for_registry(&registry).unwrap();
        let watcher = ProviderFileWatcher::new(fast_config(watcher.config.path.clone()));
        let (tx, mut rx) = mpsc::channel(10);
        let handle = watcher.watch(registry.clone(), Some(tx)).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, "[[oidc_providers]]\nidp_id = \"\"\n").unwrap();

        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for reload event")
            .expect("channel closed");
        assert!(!event.is_success());
        assert!(registry.get("one").is_some());

        handle.stop().await;
    }
}
