use thiserror::Error;

/// Errors raised while building a [`ClaimStore`](crate::ClaimStore).
#[derive(Debug, Error)]
pub enum ClaimsError {
    #[error("Claims document must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    #[error("Claims document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Syntax error in a claim path such as `entry[0].resource.identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct PathSyntaxError {
    /// Byte offset into the source string.
    pub offset: usize,
    pub kind: PathSyntaxErrorKind,
}

impl PathSyntaxError {
    pub fn new(offset: usize, kind: PathSyntaxErrorKind) -> Self {
        Self { offset, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathSyntaxErrorKind {
    #[error("empty claim path")]
    Empty,

    #[error("expected an identifier")]
    ExpectedIdentifier,

    #[error("unterminated `[`")]
    UnterminatedBracket,

    #[error("unterminated quoted key")]
    UnterminatedQuote,

    #[error("invalid list index")]
    InvalidIndex,

    #[error("unexpected input after claim path")]
    TrailingInput,
}

/// A claim path could not be resolved against a claim store.
///
/// Only the path is reported, never the claim values it walked through.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("claim `{path}`: {reason}")]
pub struct PathError {
    /// The path up to and including the segment that failed.
    pub path: String,
    pub reason: PathErrorReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathErrorReason {
    #[error("no such key")]
    MissingKey,

    #[error("index out of range (length {len})")]
    IndexOutOfRange { len: usize },

    #[error("expected a mapping, found {found}")]
    NotAMapping { found: &'static str },

    #[error("expected a list, found {found}")]
    NotAList { found: &'static str },
}

impl PathErrorReason {
    /// Returns `true` if the path simply does not exist in the claims.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingKey | Self::IndexOutOfRange { .. })
    }
}
