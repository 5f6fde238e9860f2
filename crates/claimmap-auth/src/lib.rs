//! # claimmap-auth
//!
//! Identity provider claim mapping for single sign-on logins.
//!
//! This crate provides:
//! - Validated mapping provider configuration built from a raw mapping
//! - The template driven mapping provider
//! - The provisioning loop that registers accounts and retries taken localparts
//!
//! ## Modules
//!
//! - [`federation`] - Mapping providers, their configuration and provisioning

pub mod federation;

pub use federation::{
    AttributeMappingConfig, ConfigError, ConfigErrorKind, MappedField, MappingError,
    MappingProvider, MappingResult, ProvisioningError, TemplateMappingProvider,
};

/// Type alias for mapping results.
pub type MappingOutcome<T> = Result<T, MappingError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use claimmap_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::MappingOutcome;
    pub use crate::federation::{
        AccountProvisioner, AttributeMappingConfig, ConfigError, LoginOutcome, MappedField,
        MappingError, MappingProvider, MappingResult, ProvisioningConfig, ProvisioningError,
        RegistrationOutcome, RegistrationRequest, SsoLoginService, TemplateMappingProvider,
    };
    pub use claimmap_core::{ClaimPath, ClaimStore, Template};
}
