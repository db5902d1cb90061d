//! Name Algebra: compiled patterns and parsers for every resource-name shape
//! in the four-level resource tree. Parsing is total and deterministic — no
//! partial match is ever accepted, every pattern is anchored at both ends.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RegistryError;

/// `[a-z0-9-.]{1,63}`, leading letter.
const SEG: &str = r"[a-z][a-z0-9\-.]{0,62}";

fn anchored(pattern: &str) -> Regex {
    Regex::new(&format!("^{pattern}$")).expect("static pattern is valid regex")
}

static PROJECT_RE: Lazy<Regex> = Lazy::new(|| anchored(&format!("projects/({SEG})")));
static API_RE: Lazy<Regex> =
    Lazy::new(|| anchored(&format!("projects/({SEG})/locations/global/apis/({SEG})")));
static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    anchored(&format!(
        "projects/({SEG})/locations/global/apis/({SEG})/versions/({SEG})"
    ))
});
static SPEC_RE: Lazy<Regex> = Lazy::new(|| {
    anchored(&format!(
        "projects/({SEG})/locations/global/apis/({SEG})/versions/({SEG})/specs/({SEG})"
    ))
});
static DEPLOYMENT_RE: Lazy<Regex> = Lazy::new(|| {
    anchored(&format!(
        "projects/({SEG})/locations/global/apis/({SEG})/deployments/({SEG})"
    ))
});

static ARTIFACT_RE: Lazy<Regex> = Lazy::new(|| anchored(&format!("(.+)/artifacts/({SEG})")));

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectKey {
    pub project: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiKey {
    pub project: String,
    pub api: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionKey {
    pub project: String,
    pub api: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecKey {
    pub project: String,
    pub api: String,
    pub version: String,
    pub spec: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeploymentKey {
    pub project: String,
    pub api: String,
    pub deployment: String,
}

/// An artifact's parent may be any resource in the tree, addressed by its
/// already-canonical name. The Name Algebra does not need to know the
/// parent's kind to validate or store an artifact under it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKey {
    pub parent: String,
    pub artifact: String,
}

impl ProjectKey {
    pub fn canonical(&self) -> String {
        format!("projects/{}", self.project)
    }
}

impl ApiKey {
    pub fn canonical(&self) -> String {
        format!(
            "projects/{}/locations/global/apis/{}",
            self.project, self.api
        )
    }

    pub fn parent(&self) -> ProjectKey {
        ProjectKey {
            project: self.project.clone(),
        }
    }
}

impl VersionKey {
    pub fn canonical(&self) -> String {
        format!(
            "projects/{}/locations/global/apis/{}/versions/{}",
            self.project, self.api, self.version
        )
    }

    pub fn parent(&self) -> ApiKey {
        ApiKey {
            project: self.project.clone(),
            api: self.api.clone(),
        }
    }
}

impl SpecKey {
    pub fn canonical(&self) -> String {
        format!(
            "projects/{}/locations/global/apis/{}/versions/{}/specs/{}",
            self.project, self.api, self.version, self.spec
        )
    }

    pub fn parent(&self) -> VersionKey {
        VersionKey {
            project: self.project.clone(),
            api: self.api.clone(),
            version: self.version.clone(),
        }
    }
}

impl DeploymentKey {
    pub fn canonical(&self) -> String {
        format!(
            "projects/{}/locations/global/apis/{}/deployments/{}",
            self.project, self.api, self.deployment
        )
    }

    pub fn parent(&self) -> ApiKey {
        ApiKey {
            project: self.project.clone(),
            api: self.api.clone(),
        }
    }
}

impl ArtifactKey {
    pub fn canonical(&self) -> String {
        format!("{}/artifacts/{}", self.parent, self.artifact)
    }
}

/// A parsed, typed resource name. Dispatch on this by kind, never by
/// reflection over the string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKey {
    Project(ProjectKey),
    Api(ApiKey),
    Version(VersionKey),
    Spec(SpecKey),
    Deployment(DeploymentKey),
    Artifact(ArtifactKey),
}

impl ResourceKey {
    pub fn canonical(&self) -> String {
        match self {
            ResourceKey::Project(k) => k.canonical(),
            ResourceKey::Api(k) => k.canonical(),
            ResourceKey::Version(k) => k.canonical(),
            ResourceKey::Spec(k) => k.canonical(),
            ResourceKey::Deployment(k) => k.canonical(),
            ResourceKey::Artifact(k) => k.canonical(),
        }
    }
}

fn invalid(name: &str) -> RegistryError {
    RegistryError::invalid_argument(format!("invalid resource name: '{name}'"))
}

/// Parses an artifact-less resource name against one shape. Artifacts are
/// handled separately by [`parse`] since their parent can be any kind.
fn parse_non_artifact(name: &str) -> Option<ResourceKey> {
    if let Some(c) = DEPLOYMENT_RE.captures(name) {
        return Some(ResourceKey::Deployment(DeploymentKey {
            project: c[1].to_string(),
            api: c[2].to_string(),
            deployment: c[3].to_string(),
        }));
    }
    if let Some(c) = SPEC_RE.captures(name) {
        return Some(ResourceKey::Spec(SpecKey {
            project: c[1].to_string(),
            api: c[2].to_string(),
            version: c[3].to_string(),
            spec: c[4].to_string(),
        }));
    }
    if let Some(c) = VERSION_RE.captures(name) {
        return Some(ResourceKey::Version(VersionKey {
            project: c[1].to_string(),
            api: c[2].to_string(),
            version: c[3].to_string(),
        }));
    }
    if let Some(c) = API_RE.captures(name) {
        return Some(ResourceKey::Api(ApiKey {
            project: c[1].to_string(),
            api: c[2].to_string(),
        }));
    }
    if let Some(c) = PROJECT_RE.captures(name) {
        return Some(ResourceKey::Project(ProjectKey {
            project: c[1].to_string(),
        }));
    }
    None
}

/// Parses any resource name, including artifacts, into a typed key.
pub fn parse(name: &str) -> Result<ResourceKey, RegistryError> {
    if let Some(key) = parse_non_artifact(name) {
        return Ok(key);
    }
    if let Some(c) = ARTIFACT_RE.captures(name) {
        let parent = c[1].to_string();
        let artifact = c[2].to_string();
        if parse_non_artifact(&parent).is_none() {
            return Err(invalid(name));
        }
        return Ok(ResourceKey::Artifact(ArtifactKey { parent, artifact }));
    }
    Err(invalid(name))
}

pub fn parse_project(name: &str) -> Result<ProjectKey, RegistryError> {
    match parse(name)? {
        ResourceKey::Project(k) => Ok(k),
        _ => Err(invalid(name)),
    }
}

pub fn parse_api(name: &str) -> Result<ApiKey, RegistryError> {
    match parse(name)? {
        ResourceKey::Api(k) => Ok(k),
        _ => Err(invalid(name)),
    }
}

pub fn parse_version(name: &str) -> Result<VersionKey, RegistryError> {
    match parse(name)? {
        ResourceKey::Version(k) => Ok(k),
        _ => Err(invalid(name)),
    }
}

pub fn parse_spec(name: &str) -> Result<SpecKey, RegistryError> {
    match parse(name)? {
        ResourceKey::Spec(k) => Ok(k),
        _ => Err(invalid(name)),
    }
}

pub fn parse_deployment(name: &str) -> Result<DeploymentKey, RegistryError> {
    match parse(name)? {
        ResourceKey::Deployment(k) => Ok(k),
        _ => Err(invalid(name)),
    }
}

pub fn parse_artifact(name: &str) -> Result<ArtifactKey, RegistryError> {
    match parse(name)? {
        ResourceKey::Artifact(k) => Ok(k),
        _ => Err(invalid(name)),
    }
}

/// Validates a bare ID segment (used for the `*_id` field on Create
/// requests, which is not yet part of a full resource name).
pub fn validate_id(id: &str) -> Result<(), RegistryError> {
    static ID_RE: Lazy<Regex> = Lazy::new(|| anchored(SEG));
    if ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(RegistryError::invalid_argument(format!(
            "invalid id segment: '{id}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_shape() {
        assert_eq!(
            parse("projects/p").unwrap(),
            ResourceKey::Project(ProjectKey {
                project: "p".into()
            })
        );
        assert_eq!(
            parse("projects/p/locations/global/apis/a").unwrap(),
            ResourceKey::Api(ApiKey {
                project: "p".into(),
                api: "a".into()
            })
        );
        assert_eq!(
            parse("projects/p/locations/global/apis/a/versions/v").unwrap(),
            ResourceKey::Version(VersionKey {
                project: "p".into(),
                api: "a".into(),
                version: "v".into()
            })
        );
        assert_eq!(
            parse("projects/p/locations/global/apis/a/versions/v/specs/s").unwrap(),
            ResourceKey::Spec(SpecKey {
                project: "p".into(),
                api: "a".into(),
                version: "v".into(),
                spec: "s".into()
            })
        );
        assert_eq!(
            parse("projects/p/locations/global/apis/a/deployments/d").unwrap(),
            ResourceKey::Deployment(DeploymentKey {
                project: "p".into(),
                api: "a".into(),
                deployment: "d".into()
            })
        );
    }

    #[test]
    fn parses_artifact_under_any_parent() {
        let k = parse("projects/p/artifacts/x").unwrap();
        assert_eq!(
            k,
            ResourceKey::Artifact(ArtifactKey {
                parent: "projects/p".into(),
                artifact: "x".into()
            })
        );

        let k = parse(
            "projects/p/locations/global/apis/a/versions/v/specs/s/artifacts/x",
        )
        .unwrap();
        assert_eq!(
            k,
            ResourceKey::Artifact(ArtifactKey {
                parent: "projects/p/locations/global/apis/a/versions/v/specs/s".into(),
                artifact: "x".into()
            })
        );
    }

    #[test]
    fn rejects_non_canonical_names() {
        assert!(parse("Projects/p").is_err());
        assert!(parse("projects/p/apis/a").is_err()); // missing locations/global
        assert!(parse("projects/p/locations/global/apis/a/").is_err());
        assert!(parse("projects/-p").is_err()); // leading letter required
    }

    #[test]
    fn name_round_trip() {
        // P1: canonicalizing a parsed key always reproduces the input.
        let names = [
            "projects/p",
            "projects/p/locations/global/apis/a",
            "projects/p/locations/global/apis/a/versions/v",
            "projects/p/locations/global/apis/a/versions/v/specs/s",
            "projects/p/locations/global/apis/a/deployments/d",
            "projects/p/artifacts/x",
        ];
        for n in names {
            assert_eq!(parse(n).unwrap().canonical(), n);
        }
    }
}
