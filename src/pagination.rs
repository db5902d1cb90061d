//! Opaque pagination tokens.
//!
//! A token encodes the ordered-key cursor immediately after the last emitted
//! row, plus a short checksum of the request shape (`parent`, `filter`,
//! `page_size`) that produced it. Replaying a token against a different
//! shape is rejected rather than silently reinterpreted.

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RegistryError;

const DEFAULT_PAGE_SIZE: i32 = 50;
const MAX_PAGE_SIZE: i32 = 1000;

/// Clamps a caller-supplied `page_size` to the documented default/maximum.
pub fn normalize_page_size(requested: i32) -> usize {
    if requested <= 0 {
        DEFAULT_PAGE_SIZE as usize
    } else {
        requested.min(MAX_PAGE_SIZE) as usize
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    cursor: String,
    shape: String,
}

fn shape_checksum(parent: &str, filter: &str, page_size: i32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent.as_bytes());
    hasher.update([0u8]);
    hasher.update(filter.as_bytes());
    hasher.update([0u8]);
    hasher.update(page_size.to_le_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Encodes a page token for the row immediately after `cursor` under the
/// given request shape. An empty `cursor` means "no more pages" and should
/// be surfaced to the caller as an empty `next_page_token`, not encoded.
pub fn encode(cursor: &str, parent: &str, filter: &str, page_size: i32) -> String {
    let payload = TokenPayload {
        cursor: cursor.to_string(),
        shape: shape_checksum(parent, filter, page_size),
    };
    let json = serde_json::to_vec(&payload).expect("TokenPayload always serializes");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
}

/// Decodes a page token and validates it against the current request shape.
/// An empty `token` means "first page" and decodes to no cursor.
pub fn decode(
    token: &str,
    parent: &str,
    filter: &str,
    page_size: i32,
) -> Result<Option<String>, RegistryError> {
    if token.is_empty() {
        return Ok(None);
    }
    let bad_token = || RegistryError::invalid_argument("malformed or stale page token");
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| bad_token())?;
    let payload: TokenPayload = serde_json::from_slice(&bytes).map_err(|_| bad_token())?;
    if payload.shape != shape_checksum(parent, filter, page_size) {
        return Err(bad_token());
    }
    Ok(Some(payload.cursor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_token() {
        let token = encode("projects/p/locations/global/apis/a", "p", "", 25);
        let cursor = decode(&token, "p", "", 25).unwrap();
        assert_eq!(cursor.as_deref(), Some("projects/p/locations/global/apis/a"));
    }

    #[test]
    fn empty_token_means_first_page() {
        assert_eq!(decode("", "p", "", 25).unwrap(), None);
    }

    #[test]
    fn rejects_token_reused_with_different_shape() {
        let token = encode("cursor", "p", "", 25);
        assert!(decode(&token, "other-parent", "", 25).is_err());
        assert!(decode(&token, "p", "display_name=x", 25).is_err());
        assert!(decode(&token, "p", "", 10).is_err());
    }

    #[test]
    fn rejects_tampered_token() {
        assert!(decode("not-valid-base64-or-json", "p", "", 25).is_err());
    }

    #[test]
    fn normalizes_page_size() {
        assert_eq!(normalize_page_size(0), DEFAULT_PAGE_SIZE as usize);
        assert_eq!(normalize_page_size(-5), DEFAULT_PAGE_SIZE as usize);
        assert_eq!(normalize_page_size(5000), MAX_PAGE_SIZE as usize);
        assert_eq!(normalize_page_size(10), 10);
    }
}
