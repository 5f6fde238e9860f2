//! Error types for claim mapping providers.
//!
//! Configuration errors are raised while a provider is being registered and
//! stop the provider from loading. Mapping errors are raised per login and
//! abort only that login attempt.

use claimmap_core::{PathSyntaxError, TemplateError};

use super::config::MappedField;

/// A mapping provider configuration was rejected.
///
/// `path` names the offending option, e.g. `["extra_attributes", "org"]`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid mapping configuration at `{}`: {kind}", join_path(.path))]
pub struct ConfigError {
    /// Path of keys leading to the rejected option.
    pub path: Vec<String>,

    /// What was wrong with it.
    pub kind: ConfigErrorKind,
}

/// The reason a configuration option was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigErrorKind {
    /// The option holds a template that does not compile.
    #[error("invalid template: {0}")]
    InvalidTemplate(#[source] TemplateError),

    /// The option holds a claim path that does not parse.
    #[error("invalid claim path: {0}")]
    InvalidClaimPath(#[source] PathSyntaxError),

    /// A mapping was expected.
    #[error("must be a mapping, got {found}")]
    NotAMapping {
        /// Type of the value that was found instead.
        found: &'static str,
    },

    /// A string was expected.
    #[error("must be a string, got {found}")]
    NotAString {
        /// Type of the value that was found instead.
        found: &'static str,
    },

    /// Any other invalid value.
    #[error("{0}")]
    InvalidValue(String),
}

impl ConfigError {
    /// Creates an error for the option at `path`.
    #[must_use]
    pub fn new<I, S>(path: I, kind: ConfigErrorKind) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            kind,
        }
    }

    /// Creates an `InvalidValue` error.
    #[must_use]
    pub fn invalid_value<I, S>(path: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(path, ConfigErrorKind::InvalidValue(message.into()))
    }

    /// Prepends `prefix` to the error path, for errors nested inside a larger
    /// configuration document.
    #[must_use]
    pub fn with_prefix<I, S>(mut self, prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path: Vec<String> = prefix.into_iter().map(Into::into).collect();
        path.append(&mut self.path);
        self.path = path;
        self
    }

    /// The path joined with dots; `<root>` for the configuration itself.
    #[must_use]
    pub fn path_string(&self) -> String {
        join_path(&self.path)
    }

    /// Returns `true` if a template failed to compile.
    #[must_use]
    pub fn is_template_error(&self) -> bool {
        matches!(self.kind, ConfigErrorKind::InvalidTemplate(_))
    }
}

fn join_path(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join(".")
    }
}

/// Errors raised while mapping the claims of one login.
///
/// Messages name claims but never include claim values; they are meant for
/// server logs. Use [`MappingError::user_message`] for the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// The configured subject claim could not produce an identifier.
    #[error("Subject claim `{claim}` is unavailable: {reason}")]
    SubjectUnavailable {
        /// The configured subject claim path.
        claim: String,
        /// Why it could not be used.
        reason: String,
    },

    /// A field configured as required mapped to nothing.
    #[error("Required field `{0}` could not be mapped from the claims")]
    MissingRequiredField(MappedField),

    /// The retry suffix made the localpart longer than a user ID allows.
    #[error("Localpart of {length} bytes exceeds the maximum of {max}")]
    LocalpartTooLong {
        /// Length of the suffixed localpart.
        length: usize,
        /// Maximum localpart length.
        max: usize,
    },
}

impl MappingError {
    /// Creates a `SubjectUnavailable` error.
    #[must_use]
    pub fn subject_unavailable(claim: impl ToString, reason: impl Into<String>) -> Self {
        Self::SubjectUnavailable {
            claim: claim.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the subject identifier could not be derived.
    #[must_use]
    pub fn is_subject_error(&self) -> bool {
        matches!(self, Self::SubjectUnavailable { .. })
    }

    /// Generic message safe to show to the end user.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        "Login failed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimmap_core::Template;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::new(
            ["extra_attributes", "org"],
            ConfigErrorKind::NotAString { found: "number" },
        );
        assert_eq!(
            err.to_string(),
            "Invalid mapping configuration at `extra_attributes.org`: must be a string, got number"
        );

        let err = ConfigError::invalid_value(Vec::<String>::new(), "boom");
        assert_eq!(err.path_string(), "<root>");
    }

    #[test]
    fn test_config_error_prefix() {
        let err = ConfigError::invalid_value(["max_localpart_length"], "must be positive")
            .with_prefix(["oidc_providers[0]", "user_mapping_provider", "config"]);
        assert_eq!(
            err.path_string(),
            "oidc_providers[0].user_mapping_provider.config.max_localpart_length"
        );
    }

    #[test]
    fn test_config_error_predicates() {
        let template_err = Template::compile("{{ user.sub").unwrap_err();
        let err = ConfigError::new(["localpart_template"], ConfigErrorKind::InvalidTemplate(template_err));
        assert!(err.is_template_error());
        assert!(err.to_string().contains("unterminated"));

        let err = ConfigError::invalid_value(["required_fields"], "must be a list");
        assert!(!err.is_template_error());
    }

    #[test]
    fn test_mapping_error_display() {
        let err = MappingError::subject_unavailable("sub", "no such key");
        assert_eq!(err.to_string(), "Subject claim `sub` is unavailable: no such key");
        assert!(err.is_subject_error());
        assert_eq!(err.user_message(), "Login failed");

        let err = MappingError::MissingRequiredField(MappedField::DisplayName);
        assert!(err.to_string().contains("display_name"));
        assert!(!err.is_subject_error());

        let err = MappingError::LocalpartTooLong { length: 256, max: 255 };
        assert_eq!(err.to_string(), "Localpart of 256 bytes exceeds the maximum of 255");
    }
}
