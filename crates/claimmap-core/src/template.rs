//! Field expressions used to derive account attributes from claims.
//!
//! A template is literal text with `{{ ... }}` expressions embedded in it:
//!
//! ```text
//! {{ user.given_name }} {{ user.family_name }}
//! {{ user.email | localpart_from_email | lower }}
//! {{ user.entry[0].resource.identifier[0].value }}
//! ```
//!
//! The only binding available inside an expression is `user`, the claim store
//! of the current login. Templates are compiled once when a provider is
//! configured and then rendered any number of times, concurrently, against
//! different claim stores.
//!
//! Rendering comes in two flavours:
//!
//! - [`Template::render`] fails with a [`RenderError`] naming the path that
//!   could not be resolved to a scalar.
//! - [`Template::evaluate`] folds every such failure into `None`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::claims::{ClaimPath, ClaimStore, Cursor, scalar_to_string, value_kind};
use crate::error::{PathError, PathSyntaxError, PathSyntaxErrorKind};

/// Name of the binding that refers to the claim store.
pub const ROOT_BINDING: &str = "user";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// String filters that can be chained after a claim path with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Lower,
    Upper,
    Trim,
    /// Text before the first `@`, or the whole value when there is none.
    LocalpartFromEmail,
}

impl Filter {
    pub const ALL: [Filter; 4] = [
        Filter::Lower,
        Filter::Upper,
        Filter::Trim,
        Filter::LocalpartFromEmail,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Trim => "trim",
            Self::LocalpartFromEmail => "localpart_from_email",
        }
    }

    fn apply(&self, value: String) -> String {
        match self {
            Self::Lower => value.to_lowercase(),
            Self::Upper => value.to_uppercase(),
            Self::Trim => value.trim().to_string(),
            Self::LocalpartFromEmail => match value.split_once('@') {
                Some((local, _)) => local.to_string(),
                None => value,
            },
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Expression { path: ClaimPath, filters: Vec<Filter> },
}

/// A compiled template.
///
/// Two templates are equal when they were compiled from the same source.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

/// A template failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct TemplateError {
    /// Byte offset into the template source.
    pub offset: usize,
    pub kind: TemplateErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateErrorKind {
    #[error("unterminated `{{{{`")]
    Unterminated,

    #[error("empty expression")]
    EmptyExpression,

    #[error("undefined variable `{0}` (only `user` is available)")]
    UndefinedBinding(String),

    #[error("expression must access a claim, e.g. `user.sub`")]
    MissingPath,

    #[error("invalid claim path: {0}")]
    InvalidPath(PathSyntaxErrorKind),

    #[error("unknown filter `{0}`")]
    UnknownFilter(String),

    #[error("expected `|` or `}}}}`")]
    UnexpectedInput,
}

impl TemplateError {
    fn new(offset: usize, kind: TemplateErrorKind) -> Self {
        Self { offset, kind }
    }
}

impl From<PathSyntaxError> for TemplateError {
    fn from(err: PathSyntaxError) -> Self {
        Self::new(err.offset, TemplateErrorKind::InvalidPath(err.kind))
    }
}

/// A template expression did not resolve to a scalar claim value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error(transparent)]
    Missing(#[from] PathError),

    #[error("claim `{path}` is null")]
    Null { path: String },

    #[error("claim `{path}` is a {found}, not a scalar")]
    NotScalar { path: String, found: &'static str },
}

impl Template {
    /// Compiles `source`; either the whole string compiles or nothing does.
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut pos = 0;

        while let Some(found) = source[pos..].find(OPEN) {
            let open = pos + found;
            if open > pos {
                segments.push(Segment::Literal(source[pos..open].to_string()));
            }

            let body_start = open + OPEN.len();
            let close = source[body_start..]
                .find(CLOSE)
                .map(|found| body_start + found)
                .ok_or_else(|| TemplateError::new(open, TemplateErrorKind::Unterminated))?;

            segments.push(parse_expression(&source[body_start..close], body_start, open)?);
            pos = close + CLOSE.len();
        }

        if pos < source.len() {
            segments.push(Segment::Literal(source[pos..].to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Claim paths referenced by this template, in order of appearance.
    pub fn claim_paths(&self) -> impl Iterator<Item = &ClaimPath> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Expression { path, .. } => Some(path),
            Segment::Literal(_) => None,
        })
    }

    /// Renders the template, failing on the first expression that does not
    /// resolve to a scalar. The result is trimmed.
    pub fn render(&self, claims: &ClaimStore) -> Result<String, RenderError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expression { path, filters } => {
                    let value = claims.lookup(path)?;
                    let text = match scalar_to_string(value) {
                        Some(text) => text,
                        None if value.is_null() => {
                            return Err(RenderError::Null {
                                path: path.to_string(),
                            });
                        }
                        None => {
                            return Err(RenderError::NotScalar {
                                path: path.to_string(),
                                found: value_kind(value),
                            });
                        }
                    };
                    let text = filters.iter().fold(text, |text, filter| filter.apply(text));
                    out.push_str(&text);
                }
            }
        }
        Ok(out.trim().to_string())
    }

    /// Renders the template, treating any unresolved expression as absent.
    pub fn evaluate(&self, claims: &ClaimStore) -> Option<String> {
        self.render(claims).ok()
    }
}

fn parse_expression(body: &str, base: usize, open: usize) -> Result<Segment, TemplateError> {
    let mut cursor = Cursor::new(body, base);
    cursor.skip_whitespace();
    if cursor.at_end() {
        return Err(TemplateError::new(open, TemplateErrorKind::EmptyExpression));
    }

    let root_offset = cursor.offset();
    let root = cursor.identifier().ok_or_else(|| {
        TemplateError::new(
            root_offset,
            TemplateErrorKind::InvalidPath(PathSyntaxErrorKind::ExpectedIdentifier),
        )
    })?;
    if root != ROOT_BINDING {
        return Err(TemplateError::new(
            root_offset,
            TemplateErrorKind::UndefinedBinding(root.to_string()),
        ));
    }

    let mut segments = Vec::new();
    cursor.path_tail(&mut segments)?;
    if segments.is_empty() {
        return Err(TemplateError::new(root_offset, TemplateErrorKind::MissingPath));
    }

    let mut filters = Vec::new();
    loop {
        cursor.skip_whitespace();
        if !cursor.eat('|') {
            break;
        }
        cursor.skip_whitespace();
        let filter_offset = cursor.offset();
        let name = cursor.identifier().ok_or_else(|| {
            TemplateError::new(
                filter_offset,
                TemplateErrorKind::InvalidPath(PathSyntaxErrorKind::ExpectedIdentifier),
            )
        })?;
        let filter = Filter::from_name(name).ok_or_else(|| {
            TemplateError::new(
                filter_offset,
                TemplateErrorKind::UnknownFilter(name.to_string()),
            )
        })?;
        filters.push(filter);
    }

    if !cursor.at_end() {
        return Err(TemplateError::new(
            cursor.offset(),
            TemplateErrorKind::UnexpectedInput,
        ));
    }

    Ok(Segment::Expression {
        path: ClaimPath::from_segments(segments),
        filters,
    })
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Template {}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::compile(&source).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims() -> ClaimStore {
        ClaimStore::from_value(json!({
            "sub": "abc123",
            "preferred_username": "Jane.Doe",
            "given_name": "Jane",
            "family_name": "Doe",
            "email": "Jane.Doe@Example.org",
            "age": 42,
            "nickname": null,
            "groups": ["staff", "admins"],
            "address": { "locality": "Zürich", "street-address": "Main St 1" },
            "padded": "  spaced  "
        }))
        .unwrap()
    }

    #[test]
    fn test_literal_only_template() {
        let template = Template::compile("static value").unwrap();
        assert_eq!(template.claim_paths().count(), 0);
        assert_eq!(template.evaluate(&claims()).as_deref(), Some("static value"));
    }

    #[test]
    fn test_concatenation_and_trimming() {
        let template =
            Template::compile("  {{ user.given_name }} {{user.family_name}}  ").unwrap();
        assert_eq!(template.render(&claims()).unwrap(), "Jane Doe");
        assert_eq!(template.claim_paths().count(), 2);
    }

    #[test]
    fn test_nested_and_indexed_access() {
        let store = claims();
        let t = Template::compile("{{ user.groups[1] }}").unwrap();
        assert_eq!(t.render(&store).unwrap(), "admins");

        let t = Template::compile(r#"{{ user.address["street-address"] }}, {{ user.address.locality }}"#)
            .unwrap();
        assert_eq!(t.render(&store).unwrap(), "Main St 1, Zürich");
    }

    #[test]
    fn test_scalars_render_as_text() {
        let t = Template::compile("age={{ user.age }}").unwrap();
        assert_eq!(t.render(&claims()).unwrap(), "age=42");
    }

    #[test]
    fn test_filters() {
        let store = claims();
        let t = Template::compile("{{ user.email | localpart_from_email | lower }}").unwrap();
        assert_eq!(t.render(&store).unwrap(), "jane.doe");

        let t = Template::compile("{{ user.family_name|upper }}").unwrap();
        assert_eq!(t.render(&store).unwrap(), "DOE");

        let t = Template::compile("[{{ user.padded | trim }}]").unwrap();
        assert_eq!(t.render(&store).unwrap(), "[spaced]");

        let t = Template::compile("{{ user.sub | localpart_from_email }}").unwrap();
        assert_eq!(t.render(&store).unwrap(), "abc123");
    }

    #[test]
    fn test_missing_claim_is_absent() {
        let store = claims();
        for source in [
            "{{ user.organization.name }}",
            "{{ user.groups[5] }}",
            "prefix {{ user.missing }}",
        ] {
            let t = Template::compile(source).unwrap();
            assert_eq!(t.evaluate(&store), None, "{source}");
        }

        let err = Template::compile("{{ user.organization.name }}")
            .unwrap()
            .render(&store)
            .unwrap_err();
        assert!(matches!(err, RenderError::Missing(ref e) if e.path == "organization"));
    }

    #[test]
    fn test_null_and_non_scalar_claims() {
        let store = claims();
        let err = Template::compile("{{ user.nickname }}")
            .unwrap()
            .render(&store)
            .unwrap_err();
        assert_eq!(err, RenderError::Null { path: "nickname".into() });

        let err = Template::compile("{{ user.address }}")
            .unwrap()
            .render(&store)
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::NotScalar {
                path: "address".into(),
                found: "mapping"
            }
        );
    }

    #[test]
    fn test_lone_braces_are_literal() {
        let t = Template::compile("{a} }} {{ user.sub }}").unwrap();
        assert_eq!(t.render(&claims()).unwrap(), "{a} }} abc123");
    }

    #[test]
    fn test_compile_errors() {
        let kind = |source: &str| Template::compile(source).unwrap_err().kind;

        assert_eq!(kind("{{ user.sub"), TemplateErrorKind::Unterminated);
        assert_eq!(kind("a {{   }}"), TemplateErrorKind::EmptyExpression);
        assert_eq!(
            kind("{{ claims.sub }}"),
            TemplateErrorKind::UndefinedBinding("claims".into())
        );
        assert_eq!(kind("{{ user }}"), TemplateErrorKind::MissingPath);
        assert_eq!(
            kind("{{ user.sub | shout }}"),
            TemplateErrorKind::UnknownFilter("shout".into())
        );
        assert_eq!(kind("{{ user.sub + 1 }}"), TemplateErrorKind::UnexpectedInput);
        assert_eq!(
            kind("{{ user.[0] }}"),
            TemplateErrorKind::InvalidPath(PathSyntaxErrorKind::ExpectedIdentifier)
        );
        assert_eq!(
            kind("{{ user.groups[ }}"),
            TemplateErrorKind::InvalidPath(PathSyntaxErrorKind::InvalidIndex)
        );
    }

    #[test]
    fn test_error_offsets_point_into_source() {
        let err = Template::compile("abc {{ nobody.sub }}").unwrap_err();
        assert_eq!(err.offset, 7);

        let err = Template::compile("abc {{ user.sub").unwrap_err();
        assert_eq!(err.offset, 4);
    }

    #[test]
    fn test_equality_follows_source() {
        let a = Template::compile("{{ user.sub }}").unwrap();
        let b: Template = "{{ user.sub }}".parse().unwrap();
        let c = Template::compile("{{user.sub}}").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "{{ user.sub }}");
    }

    #[test]
    fn test_shared_template_renders_concurrently() {
        let template = std::sync::Arc::new(Template::compile("{{ user.sub }}").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let template = template.clone();
                std::thread::spawn(move || {
                    let store = ClaimStore::from_value(json!({ "sub": format!("user-{i}") })).unwrap();
                    template.render(&store).unwrap()
                })
            })
            .collect();

        let rendered: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(rendered, vec!["user-0", "user-1", "user-2", "user-3"]);
    }
}
