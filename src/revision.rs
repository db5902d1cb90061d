//! Revision addressing: parsing the optional `@<revref>` suffix on a Spec or
//! Deployment name into a typed reference, and minting fresh revision ids.

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

use crate::error::RegistryError;

/// `[0-9a-z]{8}`, lowercase base-36.
static REVISION_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-z]{8}$").unwrap());

/// Tags follow the same "leading letter" convention as resource segments,
/// with a shorter maximum length.
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9\-_.]{0,39}$").unwrap());

const REVISION_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const REVISION_ID_LEN: usize = 8;

/// How a caller addresses a particular revision of a Spec or Deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionRef {
    /// No `@` suffix: the current revision.
    Current,
    ById(String),
    ByTag(String),
}

impl RevisionRef {
    pub fn as_suffix(&self) -> Option<String> {
        match self {
            RevisionRef::Current => None,
            RevisionRef::ById(id) => Some(format!("@{id}")),
            RevisionRef::ByTag(tag) => Some(format!("@{tag}")),
        }
    }
}

/// Splits a resource name into its base name and revision reference.
///
/// A suffix that looks like a revision id (`[0-9a-z]{8}`) is `ById`;
/// anything else matching the tag grammar is `ByTag`. No suffix at all is
/// `Current`. A present-but-malformed suffix is rejected.
pub fn split_revision_ref(name: &str) -> Result<(&str, RevisionRef), RegistryError> {
    match name.rfind('@') {
        None => Ok((name, RevisionRef::Current)),
        Some(at) => {
            let base = &name[..at];
            let suffix = &name[at + 1..];
            if is_revision_id(suffix) {
                Ok((base, RevisionRef::ById(suffix.to_string())))
            } else if TAG_RE.is_match(suffix) {
                Ok((base, RevisionRef::ByTag(suffix.to_string())))
            } else {
                Err(RegistryError::invalid_argument(format!(
                    "invalid revision reference: '@{suffix}'"
                )))
            }
        }
    }
}

pub fn is_revision_id(s: &str) -> bool {
    REVISION_ID_RE.is_match(s)
}

pub fn validate_tag(tag: &str) -> Result<(), RegistryError> {
    if TAG_RE.is_match(tag) {
        Ok(())
    } else {
        Err(RegistryError::invalid_argument(format!(
            "invalid revision tag: '{tag}'"
        )))
    }
}

/// Mints a fresh, CSPRNG-backed revision id. Collisions against existing ids
/// are the caller's responsibility to detect and retry.
pub fn mint_revision_id() -> String {
    let mut rng = rand::rng();
    (0..REVISION_ID_LEN)
        .map(|_| {
            let idx = rng.random_range(0..REVISION_ID_ALPHABET.len());
            REVISION_ID_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_current_by_id_and_by_tag() {
        assert_eq!(
            split_revision_ref("projects/p/.../specs/s").unwrap(),
            ("projects/p/.../specs/s", RevisionRef::Current)
        );
        assert_eq!(
            split_revision_ref("projects/p/.../specs/s@1a2b3c4d").unwrap(),
            (
                "projects/p/.../specs/s",
                RevisionRef::ById("1a2b3c4d".to_string())
            )
        );
        assert_eq!(
            split_revision_ref("projects/p/.../specs/s@stable").unwrap(),
            (
                "projects/p/.../specs/s",
                RevisionRef::ByTag("stable".to_string())
            )
        );
    }

    #[test]
    fn rejects_malformed_suffix() {
        assert!(split_revision_ref("projects/p/specs/s@Not_Valid!").is_err());
    }

    #[test]
    fn minted_ids_are_well_formed() {
        for _ in 0..100 {
            let id = mint_revision_id();
            assert_eq!(id.len(), REVISION_ID_LEN);
            assert!(is_revision_id(&id), "{id} is not a valid revision id");
        }
    }
}
