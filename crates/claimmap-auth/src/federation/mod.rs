//! External identity provider federation.
//!
//! This module maps verified identity provider claims onto local accounts:
//!
//! - Mapping provider configuration and validation
//! - Remote user ID extraction
//! - Account attribute and extra attribute mapping
//! - Account provisioning with localpart retry

pub mod config;
pub mod error;
pub mod provider;
pub mod provisioning;

pub use config::{AttributeMappingConfig, DEFAULT_SUBJECT_CLAIM, MappedField};
pub use error::{ConfigError, ConfigErrorKind, MappingError};
pub use provider::{
    MappingProvider, MappingResult, TemplateMappingProvider, extract_subject_id,
    get_extra_attributes, map_user_attributes,
};
pub use provisioning::{
    AccountProvisioner, LoginOutcome, ProvisioningConfig, ProvisioningError, RegistrationOutcome,
    RegistrationRequest, SsoLoginService,
};
