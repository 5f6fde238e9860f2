//! Read-only view over the verified claims of one login attempt.
//!
//! Claims arrive as an untyped JSON tree. [`ClaimPath`] describes a walk into
//! that tree (`entry[0].resource.identifier[0].value`) and
//! [`ClaimStore::lookup`] performs it, reporting exactly where a walk stopped
//! instead of silently yielding `null`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{ClaimsError, PathError, PathErrorReason, PathSyntaxError, PathSyntaxErrorKind};

/// One step of a [`ClaimPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Mapping key, written `.name` or `["any key"]`.
    Key(String),
    /// List index, written `[3]`.
    Index(usize),
}

/// A parsed attribute/index access chain into a claim tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimPath {
    segments: Vec<PathSegment>,
}

impl ClaimPath {
    /// Parses a standalone path such as `sub` or `address["street-address"]`.
    pub fn parse(source: &str) -> Result<Self, PathSyntaxError> {
        let mut cursor = Cursor::new(source, 0);
        cursor.skip_whitespace();
        if cursor.at_end() {
            return Err(PathSyntaxError::new(0, PathSyntaxErrorKind::Empty));
        }

        let mut segments = Vec::new();
        if cursor.peek() == Some('[') {
            let offset = cursor.offset();
            match cursor.bracket()? {
                key @ PathSegment::Key(_) => segments.push(key),
                PathSegment::Index(_) => {
                    return Err(PathSyntaxError::new(
                        offset,
                        PathSyntaxErrorKind::ExpectedIdentifier,
                    ));
                }
            }
        } else {
            let name = cursor.identifier().ok_or_else(|| {
                PathSyntaxError::new(cursor.offset(), PathSyntaxErrorKind::ExpectedIdentifier)
            })?;
            segments.push(PathSegment::Key(name.to_string()));
        }

        cursor.path_tail(&mut segments)?;
        cursor.skip_whitespace();
        if !cursor.at_end() {
            return Err(PathSyntaxError::new(
                cursor.offset(),
                PathSyntaxErrorKind::TrailingInput,
            ));
        }

        Ok(Self { segments })
    }

    /// A single-key path, for claims whose name is not a valid identifier.
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Key(name.into())],
        }
    }

    pub(crate) fn from_segments(segments: Vec<PathSegment>) -> Self {
        debug_assert!(!segments.is_empty());
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Renders the first `count` segments, used for error reporting.
    fn prefix(&self, count: usize) -> String {
        let mut out = String::new();
        for (i, segment) in self.segments.iter().take(count).enumerate() {
            write_segment(&mut out, segment, i == 0);
        }
        out
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_segment(out: &mut String, segment: &PathSegment, first: bool) {
    match segment {
        PathSegment::Key(name) if is_identifier(name) => {
            if !first {
                out.push('.');
            }
            out.push_str(name);
        }
        PathSegment::Key(name) => {
            out.push_str("[\"");
            for c in name.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push_str("\"]");
        }
        PathSegment::Index(index) => {
            out.push('[');
            out.push_str(&index.to_string());
            out.push(']');
        }
    }
}

impl fmt::Display for ClaimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix(self.segments.len()))
    }
}

impl FromStr for ClaimPath {
    type Err = PathSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ClaimPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClaimPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::parse(&source).map_err(serde::de::Error::custom)
    }
}

/// Character cursor shared by the claim path and template parsers.
///
/// Offsets reported in errors are relative to the start of the outermost
/// source string (`base` + local position).
pub(crate) struct Cursor<'a> {
    src: &'a str,
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(src: &'a str, base: usize) -> Self {
        Self { src, pos: 0, base }
    }

    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    pub(crate) fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    pub(crate) fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    pub(crate) fn identifier(&mut self) -> Option<&'a str> {
        let rest = &self.src[self.pos..];
        let mut end = 0;
        for (i, c) in rest.char_indices() {
            let valid = if i == 0 {
                c.is_ascii_alphabetic() || c == '_'
            } else {
                c.is_ascii_alphanumeric() || c == '_'
            };
            if !valid {
                break;
            }
            end = i + c.len_utf8();
        }
        if end == 0 {
            return None;
        }
        self.pos += end;
        Some(&rest[..end])
    }

    /// Consumes `.name` and `[...]` segments until neither follows.
    pub(crate) fn path_tail(
        &mut self,
        segments: &mut Vec<PathSegment>,
    ) -> Result<(), PathSyntaxError> {
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    let name = self.identifier().ok_or_else(|| {
                        PathSyntaxError::new(self.offset(), PathSyntaxErrorKind::ExpectedIdentifier)
                    })?;
                    segments.push(PathSegment::Key(name.to_string()));
                }
                Some('[') => segments.push(self.bracket()?),
                _ => return Ok(()),
            }
        }
    }

    fn bracket(&mut self) -> Result<PathSegment, PathSyntaxError> {
        let open = self.offset();
        self.pos += 1;

        let segment = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                PathSegment::Key(self.quoted(quote, open)?)
            }
            Some(c) if c.is_ascii_digit() => {
                let rest = &self.src[self.pos..];
                let len = rest
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(rest.len());
                let index = rest[..len].parse::<usize>().map_err(|_| {
                    PathSyntaxError::new(self.offset(), PathSyntaxErrorKind::InvalidIndex)
                })?;
                self.pos += len;
                PathSegment::Index(index)
            }
            None => {
                return Err(PathSyntaxError::new(
                    open,
                    PathSyntaxErrorKind::UnterminatedBracket,
                ));
            }
            Some(_) => {
                return Err(PathSyntaxError::new(
                    self.offset(),
                    PathSyntaxErrorKind::InvalidIndex,
                ));
            }
        };

        if !self.eat(']') {
            return Err(PathSyntaxError::new(
                open,
                PathSyntaxErrorKind::UnterminatedBracket,
            ));
        }
        Ok(segment)
    }

    fn quoted(&mut self, quote: char, open: usize) -> Result<String, PathSyntaxError> {
        let mut out = String::new();
        let mut escaped = false;
        while let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            if escaped {
                out.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                return Ok(out);
            } else {
                out.push(c);
            }
        }
        Err(PathSyntaxError::new(
            open,
            PathSyntaxErrorKind::UnterminatedQuote,
        ))
    }
}

/// Short name of a JSON value's type, safe to log.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Renders a scalar claim value as text.
///
/// Returns `None` for `null`, lists and mappings.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Immutable claims returned by an identity provider for one login attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimStore {
    claims: Map<String, Value>,
}

impl ClaimStore {
    pub fn new(claims: Map<String, Value>) -> Self {
        let store = Self { claims };
        store.log_shape();
        store
    }

    /// Builds a store from a JSON document, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, ClaimsError> {
        match value {
            Value::Object(claims) => Ok(Self::new(claims)),
            other => Err(ClaimsError::NotAnObject {
                found: value_kind(&other),
            }),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ClaimsError> {
        Self::from_value(serde_json::from_str(json)?)
    }

    fn log_shape(&self) {
        tracing::debug!(
            claim_count = self.claims.len(),
            keys = ?self.claims.keys().collect::<Vec<_>>(),
            "Parsed identity provider claims"
        );
    }

    /// Top-level claim by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.claims.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Walks `path` through the claim tree.
    ///
    /// An explicit JSON `null` is returned as a value; deciding whether it
    /// counts as absent is left to the caller.
    pub fn lookup(&self, path: &ClaimPath) -> Result<&Value, PathError> {
        let fail = |depth: usize, reason| PathError {
            path: path.prefix(depth + 1),
            reason,
        };

        let mut segments = path.segments.iter().enumerate();
        let mut current = match segments.next() {
            Some((_, PathSegment::Key(name))) => self
                .claims
                .get(name)
                .ok_or_else(|| fail(0, PathErrorReason::MissingKey))?,
            Some((_, PathSegment::Index(_))) => {
                return Err(fail(0, PathErrorReason::NotAList { found: "mapping" }));
            }
            None => return Err(fail(0, PathErrorReason::MissingKey)),
        };

        for (depth, segment) in segments {
            current = match (segment, current) {
                (PathSegment::Key(name), Value::Object(map)) => map
                    .get(name)
                    .ok_or_else(|| fail(depth, PathErrorReason::MissingKey))?,
                (PathSegment::Key(_), other) => {
                    return Err(fail(
                        depth,
                        PathErrorReason::NotAMapping {
                            found: value_kind(other),
                        },
                    ));
                }
                (PathSegment::Index(index), Value::Array(items)) => {
                    items.get(*index).ok_or_else(|| {
                        fail(depth, PathErrorReason::IndexOutOfRange { len: items.len() })
                    })?
                }
                (PathSegment::Index(_), other) => {
                    return Err(fail(
                        depth,
                        PathErrorReason::NotAList {
                            found: value_kind(other),
                        },
                    ));
                }
            };
        }

        Ok(current)
    }
}

impl From<Map<String, Value>> for ClaimStore {
    fn from(claims: Map<String, Value>) -> Self {
        Self::new(claims)
    }
}

impl TryFrom<Value> for ClaimStore {
    type Error = ClaimsError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}
