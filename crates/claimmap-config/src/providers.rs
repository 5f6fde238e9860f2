//! Provider file parsing.
//!
//! A provider file lists identity providers and the mapping provider each of
//! them uses:
//!
//! ```toml
//! [[oidc_providers]]
//! idp_id = "midata"
//! idp_name = "MIDATA"
//!
//! [oidc_providers.user_mapping_provider]
//! module = "template"
//!
//! [oidc_providers.user_mapping_provider.config]
//! subject_claim = "entry[0].resource.identifier[0].value"
//! localpart_template = "{{ user.preferred_username }}"
//! ```
//!
//! Every mapping provider is built while the file is loaded; a file with a
//! single bad provider is rejected as a whole.

use std::path::Path;
use std::sync::Arc;

use claimmap_auth::{AttributeMappingConfig, TemplateMappingProvider};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::ConfigError;

/// Name of the template mapping module, the only module available.
pub const TEMPLATE_MODULE: &str = TemplateMappingProvider::MODULE_NAME;

/// Raw provider file as written on disk. Keys other than the ones read here
/// (client credentials, endpoints) belong to the login flow and are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
struct ProviderFile {
    #[serde(default)]
    oidc_providers: Vec<ProviderEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProviderEntry {
    idp_id: String,
    #[serde(default)]
    idp_name: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    user_mapping_provider: MappingProviderEntry,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingProviderEntry {
    #[serde(default = "default_module")]
    module: String,
    #[serde(default)]
    config: Value,
}

impl Default for MappingProviderEntry {
    fn default() -> Self {
        Self {
            module: default_module(),
            config: Value::Null,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_module() -> String {
    TEMPLATE_MODULE.to_string()
}

/// An identity provider with its mapping provider built.
#[derive(Debug, Clone)]
pub struct LoadedProvider {
    /// Unique identifier of the identity provider.
    pub idp_id: String,

    /// Human readable name, defaults to `idp_id`.
    pub idp_name: String,

    /// Disabled providers are validated but not offered for login.
    pub enabled: bool,

    /// The mapping provider for this identity provider.
    pub mapping: Arc<TemplateMappingProvider>,
}

impl LoadedProvider {
    /// Returns the validated mapping configuration.
    #[must_use]
    pub fn mapping_config(&self) -> &AttributeMappingConfig {
        self.mapping.config()
    }
}

/// All providers of one provider file, keyed by `idp_id` in file order.
#[derive(Debug, Clone, Default)]
pub struct ProviderSet {
    providers: IndexMap<String, LoadedProvider>,
}

impl ProviderSet {
    /// Creates an empty provider set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and parses the provider file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Read provider file");
        Self::from_toml(&content)
    }

    /// Parses a provider file from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let file: ProviderFile = toml::from_str(toml_str)
            .map_err(|e| ConfigError::parse(format!("TOML parse error: {e}")))?;

        let mut providers = IndexMap::with_capacity(file.oidc_providers.len());
        for (index, entry) in file.oidc_providers.into_iter().enumerate() {
            let provider = build_provider(index, entry)?;
            if providers.contains_key(&provider.idp_id) {
                return Err(ConfigError::validation(format!(
                    "oidc_providers[{index}].idp_id: duplicate idp_id `{}`",
                    provider.idp_id
                )));
            }
            providers.insert(provider.idp_id.clone(), provider);
        }

        Ok(Self { providers })
    }

    /// Returns the enabled provider with the given `idp_id`.
    pub fn get(&self, idp_id: &str) -> Option<&LoadedProvider> {
        self.providers.get(idp_id).filter(|p| p.enabled)
    }

    /// Returns the provider with the given `idp_id`, enabled or not.
    pub fn get_any(&self, idp_id: &str) -> Option<&LoadedProvider> {
        self.providers.get(idp_id)
    }

    /// Iterates over all providers in file order.
    pub fn iter(&self) -> impl Iterator<Item = &LoadedProvider> {
        self.providers.values()
    }

    /// Iterates over enabled providers in file order.
    pub fn enabled(&self) -> impl Iterator<Item = &LoadedProvider> {
        self.providers.values().filter(|p| p.enabled)
    }

    /// Number of providers, including disabled ones.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

fn build_provider(index: usize, entry: ProviderEntry) -> Result<LoadedProvider, ConfigError> {
    let at = format!("oidc_providers[{index}]");

    validate_idp_id(&entry.idp_id)
        .map_err(|reason| ConfigError::validation(format!("{at}.idp_id: {reason}")))?;

    let module = entry.user_mapping_provider.module;
    if module != TEMPLATE_MODULE {
        return Err(ConfigError::validation(format!(
            "{at}.user_mapping_provider.module: unknown module `{module}`, expected `{TEMPLATE_MODULE}`"
        )));
    }

    let config = AttributeMappingConfig::parse_config(&entry.user_mapping_provider.config)
        .map_err(|e| e.with_prefix([at.as_str(), "user_mapping_provider", "config"]))?;

    Ok(LoadedProvider {
        idp_name: entry.idp_name.unwrap_or_else(|| entry.idp_id.clone()),
        idp_id: entry.idp_id,
        enabled: entry.enabled,
        mapping: Arc::new(TemplateMappingProvider::new(Arc::new(config))),
    })
}

fn validate_idp_id(idp_id: &str) -> Result<(), &'static str> {
    if idp_id.is_empty() {
        return Err("must not be empty");
    }
    if !idp_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '~' | '-'))
    {
        return Err("may only contain A-Z, a-z, 0-9, '.', '_', '~' and '-'");
    }
    Ok(())
}
