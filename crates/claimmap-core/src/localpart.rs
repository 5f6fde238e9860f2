//! Localpart normalization.
//!
//! Turns arbitrary text (a display name, an email, an upstream username) into
//! something the homeserver accepts as the local part of a user ID.

use std::fmt::Write;

/// Maximum length, in bytes, of a normalized localpart.
pub const MAX_LOCALPART_LENGTH: usize = 255;

/// Punctuation allowed in a localpart besides `a-z` and `0-9`.
pub const ALLOWED_PUNCTUATION: &[u8] = b"._-/=";

fn is_allowed(byte: u8) -> bool {
    byte.is_ascii_lowercase() || byte.is_ascii_digit() || ALLOWED_PUNCTUATION.contains(&byte)
}

/// Normalizes `raw` with the default length cap.
pub fn normalize_localpart(raw: &str) -> String {
    normalize_localpart_with_limit(raw, MAX_LOCALPART_LENGTH)
}

/// Normalizes `raw` into a valid localpart of at most `max_len` bytes.
///
/// The input is lowercased (Unicode aware), allowed bytes are kept, every
/// other byte of the UTF-8 encoding becomes `=xx` (lowercase hex) and a
/// leading `_` becomes `=5f`. Output is cut before the first piece that would exceed `max_len`,
/// so an escape is never split. Already normalized input is returned
/// unchanged.
pub fn normalize_localpart_with_limit(raw: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(raw.len().min(max_len));
    let mut piece = String::with_capacity(3);

    for (i, byte) in raw.to_lowercase().bytes().enumerate() {
        piece.clear();
        if i == 0 && byte == b'_' {
            piece.push_str("=5f");
        } else if is_allowed(byte) {
            piece.push(char::from(byte));
        } else {
            let _ = write!(piece, "={byte:02x}");
        }

        if out.len() + piece.len() > max_len {
            break;
        }
        out.push_str(&piece);
    }

    out
}

/// Returns `true` if `localpart` is non-empty and a fixed point of
/// [`normalize_localpart`].
pub fn is_valid_localpart(localpart: &str) -> bool {
    !localpart.is_empty()
        && localpart.len() <= MAX_LOCALPART_LENGTH
        && !localpart.starts_with('_')
        && localpart.bytes().all(is_allowed)
}
