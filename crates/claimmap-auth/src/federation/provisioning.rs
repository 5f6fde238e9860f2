//! SSO login completion and account provisioning.
//!
//! This module provides the [`SsoLoginService`] that turns verified claims
//! into a local account once the identity provider callback succeeded.
//!
//! # Overview
//!
//! 1. **Resolve subject** - Ask the mapping provider for the remote user ID
//! 2. **Find by external identity** - Returning users log straight in
//! 3. **Register** - Map attributes and try to register the localpart
//! 4. **Retry** - On "localpart taken", map again with `failures + 1`
//!
//! Storage is reached through the [`AccountProvisioner`] trait; the service
//! itself holds no state besides its configuration.
//!
//! # Example
//!
//! ```ignore
//! use claimmap_auth::federation::provisioning::{ProvisioningConfig, SsoLoginService};
//!
//! let service = SsoLoginService::new(account_store, ProvisioningConfig::default());
//! let outcome = service.complete_login("midata", &provider, &claims).await?;
//! println!("login finished: {outcome}");
//! ```

use async_trait::async_trait;
use claimmap_core::ClaimStore;

use super::error::MappingError;
use super::provider::{MappingProvider, MappingResult};

/// Default number of localpart candidates tried before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Configuration for the provisioning retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Maximum number of registration attempts per login.
    /// Default: `1000`
    pub max_attempts: u32,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ProvisioningConfig {
    /// Creates a new provisioning configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of registration attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// A registration attempt handed to the [`AccountProvisioner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    /// Identity provider the user logged in with.
    pub provider_id: String,

    /// Remote user ID at that provider.
    pub subject: String,

    /// Localpart candidate for this attempt.
    pub localpart: String,

    /// Mapped attributes of this attempt.
    pub attributes: MappingResult,
}

/// Result of [`AccountProvisioner::try_register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The account was created and linked to the external identity.
    Registered {
        /// ID of the new account.
        user_id: String,
    },

    /// The localpart belongs to another account.
    LocalpartTaken,
}

/// Account storage used while completing a login.
#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    /// Returns the account linked to `subject` at `provider_id`, if any.
    async fn find_by_external_id(
        &self,
        provider_id: &str,
        subject: &str,
    ) -> Result<Option<String>, ProvisioningError>;

    /// Registers a new account and links the external identity to it.
    async fn try_register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationOutcome, ProvisioningError>;
}

/// How a login was completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The external identity was already linked to an account.
    ExistingUser {
        /// ID of the linked account.
        user_id: String,
    },

    /// A new account was registered.
    Registered {
        /// ID of the new account.
        user_id: String,
        /// Localpart the account was registered with.
        localpart: String,
        /// Number of candidates that were taken before this one.
        failures: u32,
    },

    /// No localpart could be derived; the user has to choose one.
    LocalpartRequired {
        /// Remote user ID to link once the user picked a localpart.
        subject: String,
        /// Attributes mapped so far.
        attributes: MappingResult,
    },
}

impl LoginOutcome {
    /// Returns `true` if a new account was created.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }

    /// Returns `true` if an already linked account was found.
    #[must_use]
    pub fn is_existing(&self) -> bool {
        matches!(self, Self::ExistingUser { .. })
    }

    /// Returns `true` if the user must pick a localpart interactively.
    #[must_use]
    pub fn needs_localpart(&self) -> bool {
        matches!(self, Self::LocalpartRequired { .. })
    }

    /// The account ID, unless the login is still pending.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::ExistingUser { user_id } | Self::Registered { user_id, .. } => Some(user_id),
            Self::LocalpartRequired { .. } => None,
        }
    }
}

impl std::fmt::Display for LoginOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExistingUser { .. } => write!(f, "existing_user"),
            Self::Registered { .. } => write!(f, "registered"),
            Self::LocalpartRequired { .. } => write!(f, "localpart_required"),
        }
    }
}

/// Errors that can occur while completing an SSO login.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    /// The claims could not be mapped.
    #[error("Mapping failed: {0}")]
    MappingFailed(#[from] MappingError),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A retry produced the same localpart as the attempt before it.
    #[error("Mapping provider produced the same localpart `{localpart}` on retry {failures}")]
    NoProgress {
        /// The repeated localpart.
        localpart: String,
        /// Retry counter of the repeating attempt.
        failures: u32,
    },

    /// Every localpart candidate was taken.
    #[error("No free localpart found after {0} attempts")]
    AttemptsExhausted(u32),
}

impl ProvisioningError {
    /// Returns `true` if the claims themselves were unusable.
    #[must_use]
    pub fn is_mapping_error(&self) -> bool {
        matches!(self, Self::MappingFailed(_))
    }

    /// Returns `true` if the retry loop gave up.
    #[must_use]
    pub fn is_retry_error(&self) -> bool {
        matches!(self, Self::NoProgress { .. } | Self::AttemptsExhausted(_))
    }

    /// Generic message safe to show to the end user.
    #[must_use]
    pub fn to_user_message(&self) -> &'static str {
        "Login failed"
    }
}

/// Completes SSO logins against an [`AccountProvisioner`].
#[derive(Debug, Clone)]
pub struct SsoLoginService<P> {
    accounts: P,
    config: ProvisioningConfig,
}

impl<P: AccountProvisioner> SsoLoginService<P> {
    /// Creates a new login service.
    pub fn new(accounts: P, config: ProvisioningConfig) -> Self {
        Self { accounts, config }
    }

    /// Returns the account provisioner.
    pub fn accounts(&self) -> &P {
        &self.accounts
    }

    /// Returns the provisioning configuration.
    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Completes a login for verified `claims` from `provider_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError`] if mapping fails, storage fails, or no
    /// free localpart can be found.
    pub async fn complete_login(
        &self,
        provider_id: &str,
        provider: &dyn MappingProvider,
        claims: &ClaimStore,
    ) -> Result<LoginOutcome, ProvisioningError> {
        let subject = provider.get_remote_user_id(claims)?;

        if let Some(user_id) = self
            .accounts
            .find_by_external_id(provider_id, &subject)
            .await?
        {
            tracing::debug!(provider_id, user_id = %user_id, "External identity already linked");
            return Ok(LoginOutcome::ExistingUser { user_id });
        }

        let mut previous: Option<String> = None;
        for failures in 0..self.config.max_attempts {
            let attributes = provider.map_user_attributes(claims, failures).await?;

            let Some(localpart) = attributes.localpart.clone() else {
                tracing::info!(provider_id, "No localpart mapped, asking user to choose one");
                return Ok(LoginOutcome::LocalpartRequired {
                    subject,
                    attributes,
                });
            };

            if previous.as_deref() == Some(localpart.as_str()) {
                tracing::error!(
                    provider_id,
                    module = provider.module_name(),
                    failures,
                    "Mapping provider did not change the localpart on retry"
                );
                return Err(ProvisioningError::NoProgress {
                    localpart,
                    failures,
                });
            }

            let request = RegistrationRequest {
                provider_id: provider_id.to_string(),
                subject: subject.clone(),
                localpart: localpart.clone(),
                attributes,
            };

            match self.accounts.try_register(&request).await? {
                RegistrationOutcome::Registered { user_id } => {
                    tracing::info!(
                        provider_id,
                        user_id = %user_id,
                        failures,
                        "Registered new account from SSO login"
                    );
                    return Ok(LoginOutcome::Registered {
                        user_id,
                        localpart,
                        failures,
                    });
                }
                RegistrationOutcome::LocalpartTaken => {
                    tracing::debug!(provider_id, failures, "Localpart taken, retrying");
                    previous = Some(localpart);
                }
            }
        }

        tracing::warn!(
            provider_id,
            max_attempts = self.config.max_attempts,
            "Giving up on localpart registration"
        );
        Err(ProvisioningError::AttemptsExhausted(self.config.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::provider::TemplateMappingProvider;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryAccounts {
        localparts: Mutex<HashSet<String>>,
        links: Mutex<HashMap<(String, String), String>>,
        register_calls: Mutex<u32>,
    }

    impl InMemoryAccounts {
        fn with_taken(localparts: &[&str]) -> Self {
            let accounts = Self::default();
            accounts
                .localparts
                .lock()
                .unwrap()
                .extend(localparts.iter().map(|l| l.to_string()));
            accounts
        }

        fn register_calls(&self) -> u32 {
            *self.register_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl AccountProvisioner for InMemoryAccounts {
        async fn find_by_external_id(
            &self,
            provider_id: &str,
            subject: &str,
        ) -> Result<Option<String>, ProvisioningError> {
            let links = self.links.lock().unwrap();
            Ok(links
                .get(&(provider_id.to_string(), subject.to_string()))
                .cloned())
        }

        async fn try_register(
            &self,
            request: &RegistrationRequest,
        ) -> Result<RegistrationOutcome, ProvisioningError> {
            *self.register_calls.lock().unwrap() += 1;
            let mut localparts = self.localparts.lock().unwrap();
            if !localparts.insert(request.localpart.clone()) {
                return Ok(RegistrationOutcome::LocalpartTaken);
            }
            let user_id = format!("@{}:example.org", request.localpart);
            self.links.lock().unwrap().insert(
                (request.provider_id.clone(), request.subject.clone()),
                user_id.clone(),
            );
            Ok(RegistrationOutcome::Registered { user_id })
        }
    }

    struct FailingAccounts;

    #[async_trait]
    impl AccountProvisioner for FailingAccounts {
        async fn find_by_external_id(
            &self,
            _provider_id: &str,
            _subject: &str,
        ) -> Result<Option<String>, ProvisioningError> {
            Err(ProvisioningError::StorageError("connection refused".into()))
        }

        async fn try_register(
            &self,
            _request: &RegistrationRequest,
        ) -> Result<RegistrationOutcome, ProvisioningError> {
            unreachable!("lookup fails first")
        }
    }

    /// Ignores `failures` and always maps the same localpart.
    struct StuckProvider;

    #[async_trait]
    impl MappingProvider for StuckProvider {
        fn module_name(&self) -> &'static str {
            "stuck"
        }

        fn get_remote_user_id(&self, _claims: &ClaimStore) -> Result<String, MappingError> {
            Ok("stuck-1".into())
        }

        async fn map_user_attributes(
            &self,
            _claims: &ClaimStore,
            _failures: u32,
        ) -> Result<MappingResult, MappingError> {
            Ok(MappingResult {
                localpart: Some("jane".into()),
                ..MappingResult::default()
            })
        }

        async fn get_extra_attributes(&self, _claims: &ClaimStore) -> IndexMap<String, String> {
            IndexMap::new()
        }
    }

    fn provider() -> TemplateMappingProvider {
        TemplateMappingProvider::from_raw_config(&json!({
            "localpart_template": "{{ user.preferred_username }}",
            "display_name_template": "{{ user.name }}"
        }))
        .unwrap()
    }

    fn claims(sub: &str) -> ClaimStore {
        ClaimStore::from_value(json!({
            "sub": sub,
            "preferred_username": "Jane.Doe",
            "name": "Jane Doe"
        }))
        .unwrap()
    }

    #[test]
    fn test_provisioning_config_builder() {
        assert_eq!(ProvisioningConfig::default().max_attempts, 1000);
        let config = ProvisioningConfig::new().with_max_attempts(3);
        assert_eq!(config.max_attempts, 3);
    }

    #[tokio::test]
    async fn test_registers_free_localpart() {
        let service = SsoLoginService::new(InMemoryAccounts::default(), ProvisioningConfig::new());
        let outcome = service
            .complete_login("midata", &provider(), &claims("abc123"))
            .await
            .unwrap();

        assert!(outcome.is_registered());
        assert_eq!(outcome.user_id(), Some("@jane.doe:example.org"));
        assert_eq!(outcome.to_string(), "registered");
    }

    #[tokio::test]
    async fn test_retries_until_free_localpart() {
        let accounts = InMemoryAccounts::with_taken(&["jane.doe", "jane.doe1", "jane.doe2"]);
        let service = SsoLoginService::new(accounts, ProvisioningConfig::new());
        let outcome = service
            .complete_login("midata", &provider(), &claims("abc123"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            LoginOutcome::Registered {
                user_id: "@jane.doe3:example.org".into(),
                localpart: "jane.doe3".into(),
                failures: 3,
            }
        );
        assert_eq!(service.accounts().register_calls(), 4);
    }

    #[tokio::test]
    async fn test_returning_user_is_found() {
        let service = SsoLoginService::new(InMemoryAccounts::default(), ProvisioningConfig::new());
        let provider = provider();
        let first = service
            .complete_login("midata", &provider, &claims("abc123"))
            .await
            .unwrap();
        let second = service
            .complete_login("midata", &provider, &claims("abc123"))
            .await
            .unwrap();

        assert!(second.is_existing());
        assert_eq!(first.user_id(), second.user_id());
        assert_eq!(service.accounts().register_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_localpart_asks_user() {
        let service = SsoLoginService::new(InMemoryAccounts::default(), ProvisioningConfig::new());
        let claims = ClaimStore::from_value(json!({ "sub": "abc123", "name": "Jane" })).unwrap();
        let outcome = service
            .complete_login("midata", &provider(), &claims)
            .await
            .unwrap();

        match outcome {
            LoginOutcome::LocalpartRequired {
                subject,
                attributes,
            } => {
                assert_eq!(subject, "abc123");
                assert_eq!(attributes.display_name.as_deref(), Some("Jane"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(service.accounts().register_calls(), 0);
    }

    #[tokio::test]
    async fn test_attempts_exhausted() {
        let accounts = InMemoryAccounts::with_taken(&["jane.doe", "jane.doe1"]);
        let service = SsoLoginService::new(accounts, ProvisioningConfig::new().with_max_attempts(2));
        let err = service
            .complete_login("midata", &provider(), &claims("abc123"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisioningError::AttemptsExhausted(2)));
        assert!(err.is_retry_error());
        assert_eq!(err.to_user_message(), "Login failed");
    }

    #[tokio::test]
    async fn test_no_progress_detected() {
        let accounts = InMemoryAccounts::with_taken(&["jane"]);
        let service = SsoLoginService::new(accounts, ProvisioningConfig::new());
        let err = service
            .complete_login("midata", &StuckProvider, &claims("abc123"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisioningError::NoProgress { ref localpart, failures: 1 } if localpart == "jane"
        ));
        assert_eq!(service.accounts().register_calls(), 1);
    }

    #[tokio::test]
    async fn test_mapping_error_propagates() {
        let service = SsoLoginService::new(InMemoryAccounts::default(), ProvisioningConfig::new());
        let claims = ClaimStore::from_value(json!({ "preferred_username": "jane" })).unwrap();
        let err = service
            .complete_login("midata", &provider(), &claims)
            .await
            .unwrap_err();

        assert!(err.is_mapping_error());
        assert!(err.to_string().contains("sub"));
    }

    #[tokio::test]
    async fn test_storage_error_propagates() {
        let service = SsoLoginService::new(FailingAccounts, ProvisioningConfig::new());
        let err = service
            .complete_login("midata", &provider(), &claims("abc123"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisioningError::StorageError(_)));
        assert!(!err.is_retry_error());
    }
}
