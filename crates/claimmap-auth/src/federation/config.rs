//! Attribute mapping configuration.
//!
//! This module parses the `config` block of a template mapping provider into
//! an [`AttributeMappingConfig`]. Every template is compiled here, once, when
//! the provider is registered, so a misconfigured provider is refused at
//! startup instead of failing every login.
//!
//! # Example (TOML)
//!
//! ```toml
//! [oidc_providers.user_mapping_provider.config]
//! subject_claim = "sub"
//! localpart_template = "{{ user.preferred_username }}"
//! display_name_template = "{{ user.given_name }} {{ user.family_name }}"
//! email_template = "{{ user.email }}"
//!
//! [oidc_providers.user_mapping_provider.config.extra_attributes]
//! org = "{{ user.organization.name }}"
//! ```

use std::fmt;

use claimmap_core::{ClaimPath, MAX_LOCALPART_LENGTH, Template, value_kind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ConfigError, ConfigErrorKind};

/// Claim used as the subject identifier when none is configured.
pub const DEFAULT_SUBJECT_CLAIM: &str = "sub";

const KNOWN_OPTIONS: &[&str] = &[
    "subject_claim",
    "localpart_template",
    "display_name_template",
    "email_template",
    "extra_attributes",
    "required_fields",
    "max_localpart_length",
];

/// A mapped attribute that can be made mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappedField {
    /// The local part of the user ID.
    Localpart,
    /// The display name.
    DisplayName,
    /// The email address.
    Email,
}

impl MappedField {
    /// Returns the configuration name of the field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Localpart => "localpart",
            Self::DisplayName => "display_name",
            Self::Email => "email",
        }
    }

    /// Parses a configuration name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "localpart" => Some(Self::Localpart),
            "display_name" => Some(Self::DisplayName),
            "email" => Some(Self::Email),
            _ => None,
        }
    }
}

impl fmt::Display for MappedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated configuration of a template mapping provider.
///
/// Immutable once built; share it behind an `Arc` between concurrent logins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeMappingConfig {
    /// Path of the claim holding the stable subject identifier.
    pub subject_claim: ClaimPath,

    /// Template for the localpart of new accounts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localpart_template: Option<Template>,

    /// Template for the display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name_template: Option<Template>,

    /// Template for the email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_template: Option<Template>,

    /// Extra attributes handed to the host, in configuration order.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub extra_attributes: IndexMap<String, Template>,

    /// Fields whose absence fails the login instead of degrading.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_fields: Vec<MappedField>,

    /// Length cap applied when normalizing the localpart.
    pub max_localpart_length: usize,
}

impl Default for AttributeMappingConfig {
    fn default() -> Self {
        Self {
            subject_claim: ClaimPath::key(DEFAULT_SUBJECT_CLAIM),
            localpart_template: None,
            display_name_template: None,
            email_template: None,
            extra_attributes: IndexMap::new(),
            required_fields: Vec::new(),
            max_localpart_length: MAX_LOCALPART_LENGTH,
        }
    }
}

impl AttributeMappingConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a raw configuration mapping.
    ///
    /// `null` is accepted as an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the offending option if:
    /// - `raw` is not a mapping
    /// - `subject_claim` is not a valid claim path
    /// - any template fails to compile or is not a string
    /// - `extra_attributes` is not a mapping
    /// - `required_fields` or `max_localpart_length` hold invalid values
    pub fn parse_config(raw: &Value) -> Result<Self, ConfigError> {
        let empty = Map::new();
        let options = match raw {
            Value::Object(options) => options,
            Value::Null => &empty,
            other => {
                return Err(ConfigError::new(
                    Vec::<String>::new(),
                    ConfigErrorKind::NotAMapping {
                        found: value_kind(other),
                    },
                ));
            }
        };

        for key in options.keys() {
            if !KNOWN_OPTIONS.contains(&key.as_str()) {
                tracing::warn!(option = %key, "Ignoring unknown mapping provider option");
            }
        }

        let subject_claim = match options.get("subject_claim") {
            None | Some(Value::Null) => ClaimPath::key(DEFAULT_SUBJECT_CLAIM),
            Some(Value::String(source)) => ClaimPath::parse(source).map_err(|e| {
                ConfigError::new(["subject_claim"], ConfigErrorKind::InvalidClaimPath(e))
            })?,
            Some(other) => {
                return Err(ConfigError::new(
                    ["subject_claim"],
                    ConfigErrorKind::NotAString {
                        found: value_kind(other),
                    },
                ));
            }
        };

        Ok(Self {
            subject_claim,
            localpart_template: parse_template_option(options, "localpart_template")?,
            display_name_template: parse_template_option(options, "display_name_template")?,
            email_template: parse_template_option(options, "email_template")?,
            extra_attributes: parse_extra_attributes(options)?,
            required_fields: parse_required_fields(options)?,
            max_localpart_length: parse_max_localpart_length(options)?,
        })
    }

    /// Sets the subject claim path.
    #[must_use]
    pub fn with_subject_claim(mut self, claim: ClaimPath) -> Self {
        self.subject_claim = claim;
        self
    }

    /// Sets the localpart template.
    #[must_use]
    pub fn with_localpart_template(mut self, template: Template) -> Self {
        self.localpart_template = Some(template);
        self
    }

    /// Sets the display name template.
    #[must_use]
    pub fn with_display_name_template(mut self, template: Template) -> Self {
        self.display_name_template = Some(template);
        self
    }

    /// Sets the email template.
    #[must_use]
    pub fn with_email_template(mut self, template: Template) -> Self {
        self.email_template = Some(template);
        self
    }

    /// Adds an extra attribute template.
    #[must_use]
    pub fn with_extra_attribute(mut self, name: impl Into<String>, template: Template) -> Self {
        self.extra_attributes.insert(name.into(), template);
        self
    }

    /// Marks a field as required.
    #[must_use]
    pub fn with_required_field(mut self, field: MappedField) -> Self {
        if !self.required_fields.contains(&field) {
            self.required_fields.push(field);
        }
        self
    }

    /// Returns `true` if `field` must be present for a login to succeed.
    #[must_use]
    pub fn is_required(&self, field: MappedField) -> bool {
        self.required_fields.contains(&field)
    }
}

impl TryFrom<&Value> for AttributeMappingConfig {
    type Error = ConfigError;

    fn try_from(raw: &Value) -> Result<Self, Self::Error> {
        Self::parse_config(raw)
    }
}

fn compile_template(value: &Value, path: &[&str]) -> Result<Template, ConfigError> {
    let Value::String(source) = value else {
        return Err(ConfigError::new(
            path.iter().copied(),
            ConfigErrorKind::NotAString {
                found: value_kind(value),
            },
        ));
    };
    Template::compile(source)
        .map_err(|e| ConfigError::new(path.iter().copied(), ConfigErrorKind::InvalidTemplate(e)))
}

fn parse_template_option(
    options: &Map<String, Value>,
    name: &str,
) -> Result<Option<Template>, ConfigError> {
    match options.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => compile_template(value, &[name]).map(Some),
    }
}

fn parse_extra_attributes(
    options: &Map<String, Value>,
) -> Result<IndexMap<String, Template>, ConfigError> {
    let mut extra_attributes = IndexMap::new();
    match options.get("extra_attributes") {
        None | Some(Value::Null) => {}
        Some(Value::Object(entries)) => {
            for (name, value) in entries {
                let template = compile_template(value, &["extra_attributes", name.as_str()])?;
                extra_attributes.insert(name.clone(), template);
            }
        }
        Some(other) => {
            return Err(ConfigError::new(
                ["extra_attributes"],
                ConfigErrorKind::NotAMapping {
                    found: value_kind(other),
                },
            ));
        }
    }
    Ok(extra_attributes)
}

fn parse_required_fields(options: &Map<String, Value>) -> Result<Vec<MappedField>, ConfigError> {
    let entries = match options.get("required_fields") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ConfigError::invalid_value(
                ["required_fields"],
                format!("must be a list, got {}", value_kind(other)),
            ));
        }
    };

    let mut fields = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let field = entry
            .as_str()
            .and_then(MappedField::from_name)
            .ok_or_else(|| {
                ConfigError::invalid_value(
                    ["required_fields".to_string(), index.to_string()],
                    "must be one of `localpart`, `display_name`, `email`",
                )
            })?;
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    Ok(fields)
}

fn parse_max_localpart_length(options: &Map<String, Value>) -> Result<usize, ConfigError> {
    match options.get("max_localpart_length") {
        None | Some(Value::Null) => Ok(MAX_LOCALPART_LENGTH),
        Some(value) => value
            .as_u64()
            .filter(|len| *len > 0)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| {
                ConfigError::invalid_value(["max_localpart_length"], "must be a positive integer")
            }),
    }
}
