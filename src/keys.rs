//! Typed storage keys.
//!
//! Keys are order-preserving byte strings built from canonical resource
//! names, so a prefix scan on a resource's canonical name enumerates
//! exactly its descendants (names are slash-delimited hierarchical paths).
//! Three row kinds share the key space: live resource rows, revision
//! snapshot rows, and tag rows.

const RESOURCE_PREFIX: &str = "res/";
const REVISION_PREFIX: &str = "rev/";
const TAG_PREFIX: &str = "tag/";

/// Key for the live, current-state row of any resource (Project, Api,
/// Version, Spec, Deployment, Artifact).
pub fn resource_key(canonical_name: &str) -> Vec<u8> {
    format!("{RESOURCE_PREFIX}{canonical_name}").into_bytes()
}

/// Prefix matching the resource row itself and every descendant's resource,
/// revision, and tag rows. Used for cascading delete and subtree listing.
pub fn descendant_prefix(canonical_name: &str) -> Vec<u8> {
    format!("{canonical_name}/").into_bytes()
}

pub fn resource_scan_prefix(parent_canonical_name: &str) -> Vec<u8> {
    format!("{RESOURCE_PREFIX}{parent_canonical_name}/").into_bytes()
}

pub fn revision_scan_prefix(base_name: &str) -> Vec<u8> {
    format!("{REVISION_PREFIX}{base_name}@").into_bytes()
}

pub fn revision_key(base_name: &str, revision_id: &str) -> Vec<u8> {
    format!("{REVISION_PREFIX}{base_name}@{revision_id}").into_bytes()
}

pub fn tag_scan_prefix(base_name: &str) -> Vec<u8> {
    format!("{TAG_PREFIX}{base_name}#").into_bytes()
}

pub fn tag_key(base_name: &str, tag: &str) -> Vec<u8> {
    format!("{TAG_PREFIX}{base_name}#{tag}").into_bytes()
}

/// Revision rows belonging to descendants of `name` (not `name` itself):
/// bounded by an explicit `/` so a sibling whose name merely shares a
/// string prefix (`projects/p` vs `projects/p2`) is never matched.
pub fn revision_scan_prefix_for_descendants(name: &str) -> Vec<u8> {
    format!("{REVISION_PREFIX}{name}/").into_bytes()
}

pub fn tag_scan_prefix_for_descendants(name: &str) -> Vec<u8> {
    format!("{TAG_PREFIX}{name}/").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_scan_prefix_excludes_siblings() {
        let prefix = resource_scan_prefix("projects/p");
        assert!(resource_key("projects/p/locations/global/apis/a").starts_with(&prefix[..]));
        assert!(!resource_key("projects/p2/locations/global/apis/a").starts_with(&prefix[..]));
    }

    #[test]
    fn revision_key_round_trips_under_its_scan_prefix() {
        let base = "projects/p/locations/global/apis/a/versions/v/specs/s";
        let key = revision_key(base, "1a2b3c4d");
        assert!(key.starts_with(&revision_scan_prefix(base)[..]));
    }
}
