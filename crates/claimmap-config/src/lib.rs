//! Provider configuration for claimmap.
//!
//! This crate loads identity provider definitions from a TOML file and keeps
//! them available to the login pipeline:
//! - Parses `[[oidc_providers]]` entries and builds every mapping provider at
//!   load time
//! - Holds the resulting provider set behind an atomic pointer for lock-free
//!   reads
//! - Watches the file and swaps in a new provider set when it changes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  change   ┌────────────────────┐  reload   ┌─────────────┐
//! │ FileWatcher  ├──────────►│  ProviderRegistry  ├──────────►│ ProviderSet │
//! └──────────────┘           │ (ArcSwap snapshot) │           └─────────────┘
//!                            └─────────┬──────────┘
//!                                      │ snapshot()
//!                                      ▼
//!                               Login pipeline
//! ```

pub mod providers;
pub mod registry;
pub mod sources;

pub use providers::{LoadedProvider, ProviderSet, TEMPLATE_MODULE};
pub use registry::ProviderRegistry;
pub use sources::{FileWatcherConfig, ProviderFileWatcher, ReloadEvent, WatchHandle};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Mapping(#[from] claimmap_auth::ConfigError),

    #[error("Watcher error: {0}")]
    Watcher(String),
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    /// Returns `true` if the file was read but its content was rejected.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Parse(_) | Self::Validation(_) | Self::Mapping(_)
        )
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
