//! Mapping providers: turning verified claims into account attributes.
//!
//! A [`MappingProvider`] is what the login pipeline calls once the token
//! exchange with an identity provider has succeeded. It derives:
//!
//! 1. **Remote user ID** - the stable subject used to recognise returning users
//! 2. **Account attributes** - localpart, display name and emails for new users
//! 3. **Extra attributes** - auxiliary profile data that never blocks a login
//!
//! [`TemplateMappingProvider`] is the template driven implementation.
//!
//! # Localpart collisions
//!
//! When the host reports that a mapped localpart is already taken, it calls
//! [`MappingProvider::map_user_attributes`] again with `failures` incremented.
//! The template provider appends `failures` to the normalized localpart, so
//! every retry yields a new candidate.
//!
//! # Example
//!
//! ```ignore
//! use claimmap_auth::federation::provider::{MappingProvider, TemplateMappingProvider};
//! use claimmap_core::ClaimStore;
//!
//! let provider = TemplateMappingProvider::from_raw_config(&serde_json::json!({
//!     "localpart_template": "{{ user.preferred_username }}",
//! }))?;
//!
//! let claims = ClaimStore::from_value(userinfo)?;
//! let subject = provider.get_remote_user_id(&claims)?;
//! let attributes = provider.map_user_attributes(&claims, 0).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use claimmap_core::{ClaimStore, MAX_LOCALPART_LENGTH, normalize_localpart_with_limit, value_kind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::{AttributeMappingConfig, MappedField};
use super::error::{ConfigError, MappingError};

/// Account attributes derived from one set of claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingResult {
    /// Candidate localpart, at most [`MAX_LOCALPART_LENGTH`] bytes. `None`
    /// means the user has to pick one.
    pub localpart: Option<String>,

    /// Display name, never empty.
    pub display_name: Option<String>,

    /// Email addresses, at most one with the template provider.
    #[serde(default)]
    pub emails: Vec<String>,

    /// Extra attributes that rendered successfully.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extra: IndexMap<String, String>,
}

impl MappingResult {
    /// Returns `true` if `field` was mapped to a value.
    #[must_use]
    pub fn has_field(&self, field: MappedField) -> bool {
        match field {
            MappedField::Localpart => self.localpart.is_some(),
            MappedField::DisplayName => self.display_name.is_some(),
            MappedField::Email => !self.emails.is_empty(),
        }
    }
}

/// A pluggable claim mapping strategy.
///
/// Methods are `async` so the login pipeline can await them; implementations
/// must not block for unbounded time.
#[async_trait]
pub trait MappingProvider: Send + Sync {
    /// Name used to select this provider in configuration.
    fn module_name(&self) -> &'static str;

    /// Returns the provider-assigned identifier of the user.
    ///
    /// Must be deterministic for a given set of claims.
    fn get_remote_user_id(&self, claims: &ClaimStore) -> Result<String, MappingError>;

    /// Maps claims to account attributes for the `failures`-th attempt.
    async fn map_user_attributes(
        &self,
        claims: &ClaimStore,
        failures: u32,
    ) -> Result<MappingResult, MappingError>;

    /// Returns extra attributes; entries that fail to map are left out.
    async fn get_extra_attributes(&self, claims: &ClaimStore) -> IndexMap<String, String>;
}

/// Mapping provider driven by [`AttributeMappingConfig`] templates.
#[derive(Debug, Clone)]
pub struct TemplateMappingProvider {
    config: Arc<AttributeMappingConfig>,
}

impl TemplateMappingProvider {
    /// Module name of this provider.
    pub const MODULE_NAME: &'static str = "template";

    /// Creates a provider from a validated configuration.
    #[must_use]
    pub fn new(config: Arc<AttributeMappingConfig>) -> Self {
        tracing::info!(
            subject_claim = %config.subject_claim,
            localpart = config.localpart_template.is_some(),
            display_name = config.display_name_template.is_some(),
            email = config.email_template.is_some(),
            extra_attributes = config.extra_attributes.len(),
            "Template mapping provider loaded"
        );
        Self { config }
    }

    /// Parses `raw` and creates a provider from it.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] of [`AttributeMappingConfig::parse_config`].
    pub fn from_raw_config(raw: &Value) -> Result<Self, ConfigError> {
        Ok(Self::new(Arc::new(AttributeMappingConfig::parse_config(raw)?)))
    }

    /// Returns the provider configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<AttributeMappingConfig> {
        &self.config
    }
}

#[async_trait]
impl MappingProvider for TemplateMappingProvider {
    fn module_name(&self) -> &'static str {
        Self::MODULE_NAME
    }

    fn get_remote_user_id(&self, claims: &ClaimStore) -> Result<String, MappingError> {
        extract_subject_id(claims, &self.config)
    }

    async fn map_user_attributes(
        &self,
        claims: &ClaimStore,
        failures: u32,
    ) -> Result<MappingResult, MappingError> {
        map_user_attributes(claims, &self.config, failures)
    }

    async fn get_extra_attributes(&self, claims: &ClaimStore) -> IndexMap<String, String> {
        get_extra_attributes(claims, &self.config)
    }
}

/// Resolves the configured subject claim to a non-empty identifier.
///
/// Strings are used verbatim and numbers in decimal form.
///
/// # Errors
///
/// Returns [`MappingError::SubjectUnavailable`] if the claim is missing, null,
/// empty, or not a string or number.
pub fn extract_subject_id(
    claims: &ClaimStore,
    config: &AttributeMappingConfig,
) -> Result<String, MappingError> {
    let claim = &config.subject_claim;
    let value = claims
        .lookup(claim)
        .map_err(|e| MappingError::subject_unavailable(claim, e.to_string()))?;

    let subject = match value {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::String(_) => return Err(MappingError::subject_unavailable(claim, "empty string")),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(MappingError::subject_unavailable(
                claim,
                format!("expected a string, found {}", value_kind(other)),
            ));
        }
    };

    tracing::debug!(subject_claim = %claim, subject = %subject, "Computed remote user id");
    Ok(subject)
}

/// Maps claims to account attributes.
///
/// The localpart is normalized and, when `failures > 0`, suffixed with
/// `failures`. Empty display names and emails are treated as absent.
///
/// # Errors
///
/// Returns [`MappingError`] if the subject claim is unavailable, a field
/// listed in `required_fields` is absent, or the retry suffix pushes the
/// localpart past [`MAX_LOCALPART_LENGTH`].
pub fn map_user_attributes(
    claims: &ClaimStore,
    config: &AttributeMappingConfig,
    failures: u32,
) -> Result<MappingResult, MappingError> {
    extract_subject_id(claims, config)?;

    let localpart = config
        .localpart_template
        .as_ref()
        .and_then(|template| template.evaluate(claims))
        .map(|raw| normalize_localpart_with_limit(&raw, config.max_localpart_length))
        .filter(|localpart| !localpart.is_empty())
        .map(|mut localpart| {
            // Retry suffix for localparts that were already taken.
            if failures > 0 {
                localpart.push_str(&failures.to_string());
            }
            localpart
        });

    if let Some(localpart) = &localpart
        && localpart.len() > MAX_LOCALPART_LENGTH
    {
        tracing::warn!(
            length = localpart.len(),
            failures,
            "Suffixed localpart exceeds the maximum length"
        );
        return Err(MappingError::LocalpartTooLong {
            length: localpart.len(),
            max: MAX_LOCALPART_LENGTH,
        });
    }

    let display_name = config
        .display_name_template
        .as_ref()
        .and_then(|template| template.evaluate(claims))
        .filter(|name| !name.is_empty());
    tracing::debug!(display_name = ?display_name, "Computed display name");

    let emails: Vec<String> = config
        .email_template
        .as_ref()
        .and_then(|template| template.evaluate(claims))
        .filter(|email| !email.is_empty())
        .into_iter()
        .collect();
    tracing::debug!(email = ?emails.first(), "Computed email");

    let result = MappingResult {
        localpart,
        display_name,
        emails,
        extra: get_extra_attributes(claims, config),
    };

    if let Some(field) = config
        .required_fields
        .iter()
        .copied()
        .find(|field| !result.has_field(*field))
    {
        tracing::warn!(field = %field, "Required field missing from identity provider claims");
        return Err(MappingError::MissingRequiredField(field));
    }

    Ok(result)
}

/// Renders every extra attribute template independently.
///
/// A template that fails to render is logged and left out; the remaining
/// attributes are still returned.
pub fn get_extra_attributes(
    claims: &ClaimStore,
    config: &AttributeMappingConfig,
) -> IndexMap<String, String> {
    let mut extras = IndexMap::with_capacity(config.extra_attributes.len());
    for (name, template) in &config.extra_attributes {
        match template.render(claims) {
            Ok(value) => {
                extras.insert(name.clone(), value);
            }
            Err(e) => {
                tracing::warn!(attribute = %name, error = %e, "Failed to render extra attribute");
            }
        }
    }
    extras
}
