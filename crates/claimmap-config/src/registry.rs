//! Hot-reloadable provider registry.
//!
//! Holds the current [`ProviderSet`] behind an `ArcSwap` so logins read it
//! without locking while a reload swaps in a new set.
//!
//! # Usage
//!
//! ```ignore
//! use claimmap_config::ProviderRegistry;
//!
//! let registry = ProviderRegistry::load("providers.toml")?;
//!
//! // In the login pipeline
//! let providers = registry.snapshot();
//! let midata = providers.get("midata");
//!
//! // After the file changed
//! registry.reload()?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{error, info};

use crate::ConfigError;
use crate::providers::{LoadedProvider, ProviderSet};

/// A provider set that can be replaced at runtime.
///
/// Clones share the same underlying set.
#[derive(Clone)]
pub struct ProviderRegistry {
    /// Current provider set (lock-free reads)
    inner: Arc<ArcSwap<ProviderSet>>,
    /// File the set is reloaded from
    path: Option<PathBuf>,
}

impl ProviderRegistry {
    /// Creates a registry holding `providers`, with no backing file.
    pub fn new(providers: ProviderSet) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(providers)),
            path: None,
        }
    }

    /// Loads the provider file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial load fails; there is no previous set
    /// to fall back to.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let providers = ProviderSet::load(&path)?;
        info!(
            path = %path.display(),
            providers = providers.len(),
            "Loaded identity provider configuration"
        );
        Ok(Self {
            inner: Arc::new(ArcSwap::from_pointee(providers)),
            path: Some(path),
        })
    }

    /// The file backing this registry, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the current provider set.
    ///
    /// The snapshot stays valid and unchanged even if a reload happens while
    /// it is in use.
    pub fn snapshot(&self) -> Arc<ProviderSet> {
        self.inner.load_full()
    }

    /// Returns the enabled provider with the given `idp_id` from the current
    /// set.
    pub fn get(&self, idp_id: &str) -> Option<LoadedProvider> {
        self.inner.load().get(idp_id).cloned()
    }

    /// Replaces the provider set.
    pub fn replace(&self, providers: ProviderSet) {
        let count = providers.len();
        self.inner.store(Arc::new(providers));
        info!(providers = count, "Identity provider configuration replaced");
    }

    /// Re-reads the backing file and swaps in the new set.
    ///
    /// If the file cannot be loaded the current set stays in place.
    ///
    /// # Errors
    ///
    /// Returns the load error, or a validation error if the registry has no
    /// backing file.
    pub fn reload(&self) -> Result<Arc<ProviderSet>, ConfigError> {
        let Some(path) = &self.path else {
            return Err(ConfigError::validation(
                "registry has no provider file to reload from",
            ));
        };

        match ProviderSet::load(path) {
            Ok(providers) => {
                let providers = Arc::new(providers);
                self.inner.store(Arc::clone(&providers));
                info!(
                    path = %path.display(),
                    providers = providers.len(),
                    "Reloaded identity provider configuration"
                );
                Ok(providers)
            }
            Err(e) => {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to reload identity provider configuration, keeping previous"
                );
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("path", &self.path)
            .field("providers", &self.inner.load().len())
            .finish()
    }
}
