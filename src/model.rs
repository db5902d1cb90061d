//! In-memory entity records and their mapping to/from wire messages.
//!
//! Resource rows and revision snapshot rows share the same record shape for
//! Spec and Deployment (see `Revisioned`): the "current" row is simply the
//! most recent snapshot, denormalized for fast reads (SPEC_FULL.md §9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::proto;

fn to_proto_timestamp(t: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: t.timestamp(),
        nanos: t.timestamp_subsec_nanos() as i32,
    }
}

fn from_proto_timestamp(ts: Option<prost_types::Timestamp>) -> DateTime<Utc> {
    match ts {
        Some(ts) => DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32).unwrap_or_default(),
        None => DateTime::default(),
    }
}

/// Common shape for Project, Api, and Version: plain, non-revisioned
/// resources with only a display name and description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainRecord {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl PlainRecord {
    pub fn new(name: String, display_name: String, description: String, now: DateTime<Utc>) -> Self {
        PlainRecord {
            name,
            display_name,
            description,
            create_time: now,
            update_time: now,
        }
    }
}

macro_rules! plain_proto_conversions {
    ($proto_ty:path) => {
        impl From<PlainRecord> for $proto_ty {
            fn from(r: PlainRecord) -> Self {
                Self {
                    name: r.name,
                    display_name: r.display_name,
                    description: r.description,
                    create_time: Some(to_proto_timestamp(r.create_time)),
                    update_time: Some(to_proto_timestamp(r.update_time)),
                }
            }
        }
    };
}

plain_proto_conversions!(proto::Project);
plain_proto_conversions!(proto::Api);
plain_proto_conversions!(proto::ApiVersion);

/// A single immutable content state of a Spec: either the denormalized
/// current row, or one entry in its revision chain (same shape either way).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecRecord {
    pub name: String,
    pub filename: String,
    pub description: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub hash: String,
    pub source_uri: String,
    pub contents: Vec<u8>,
    pub create_time: DateTime<Utc>,
    pub revision_create_time: DateTime<Utc>,
    pub revision_update_time: DateTime<Utc>,
    pub revision_id: String,
}

impl From<SpecRecord> for proto::ApiSpec {
    fn from(r: SpecRecord) -> Self {
        Self {
            name: r.name,
            filename: r.filename,
            description: r.description,
            mime_type: r.mime_type,
            size_bytes: r.size_bytes,
            hash: r.hash,
            source_uri: r.source_uri,
            contents: r.contents,
            create_time: Some(to_proto_timestamp(r.create_time)),
            revision_create_time: Some(to_proto_timestamp(r.revision_create_time)),
            revision_update_time: Some(to_proto_timestamp(r.revision_update_time)),
            revision_id: r.revision_id,
        }
    }
}

/// A single immutable content state of a Deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub api_spec_revision: String,
    pub endpoint_uri: String,
    pub external_channel_uri: String,
    pub intended_audience: String,
    pub access_guidance: String,
    pub create_time: DateTime<Utc>,
    pub revision_create_time: DateTime<Utc>,
    pub revision_update_time: DateTime<Utc>,
    pub revision_id: String,
}

impl From<DeploymentRecord> for proto::ApiDeployment {
    fn from(r: DeploymentRecord) -> Self {
        Self {
            name: r.name,
            display_name: r.display_name,
            description: r.description,
            api_spec_revision: r.api_spec_revision,
            endpoint_uri: r.endpoint_uri,
            external_channel_uri: r.external_channel_uri,
            intended_audience: r.intended_audience,
            access_guidance: r.access_guidance,
            create_time: Some(to_proto_timestamp(r.create_time)),
            revision_create_time: Some(to_proto_timestamp(r.revision_create_time)),
            revision_update_time: Some(to_proto_timestamp(r.revision_update_time)),
            revision_id: r.revision_id,
        }
    }
}

/// `(parent resource key, tag)` -> `revision_id`. Many tags may point at one
/// revision; a tag points at exactly one revision (I5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionTag {
    pub parent: String,
    pub tag: String,
    pub revision_id: String,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// Typed, non-revisioned metadata leaf attached to any resource in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub hash: String,
    pub contents: Vec<u8>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl From<ArtifactRecord> for proto::Artifact {
    fn from(r: ArtifactRecord) -> Self {
        Self {
            name: r.name,
            mime_type: r.mime_type,
            size_bytes: r.size_bytes,
            hash: r.hash,
            contents: r.contents,
            create_time: Some(to_proto_timestamp(r.create_time)),
            update_time: Some(to_proto_timestamp(r.update_time)),
        }
    }
}

/// The subset of a revisioned record's fields the engine needs to generically
/// drive forking, touching, tagging, and rollback for both Spec and
/// Deployment, without knowing their full shape.
pub trait Revisioned: Clone + Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
    fn revision_id(&self) -> &str;
    fn set_revision_id(&mut self, id: String);
    fn create_time(&self) -> DateTime<Utc>;
    fn revision_create_time(&self) -> DateTime<Utc>;
    fn set_revision_create_time(&mut self, t: DateTime<Utc>);
    fn set_revision_update_time(&mut self, t: DateTime<Utc>);

    /// Whether the fields that define a distinct revision differ from
    /// `other`'s (SPEC_FULL.md §4.2 step 4).
    fn revisioned_fields_differ(&self, other: &Self) -> bool;
}

impl Revisioned for SpecRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn revision_id(&self) -> &str {
        &self.revision_id
    }

    fn set_revision_id(&mut self, id: String) {
        self.revision_id = id;
    }

    fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }

    fn revision_create_time(&self) -> DateTime<Utc> {
        self.revision_create_time
    }

    fn set_revision_create_time(&mut self, t: DateTime<Utc>) {
        self.revision_create_time = t;
    }

    fn set_revision_update_time(&mut self, t: DateTime<Utc>) {
        self.revision_update_time = t;
    }

    fn revisioned_fields_differ(&self, other: &Self) -> bool {
        self.contents != other.contents
            || self.mime_type != other.mime_type
            || self.source_uri != other.source_uri
    }
}

impl Revisioned for DeploymentRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn revision_id(&self) -> &str {
        &self.revision_id
    }

    fn set_revision_id(&mut self, id: String) {
        self.revision_id = id;
    }

    fn create_time(&self) -> DateTime<Utc> {
        self.create_time
    }

    fn revision_create_time(&self) -> DateTime<Utc> {
        self.revision_create_time
    }

    fn set_revision_create_time(&mut self, t: DateTime<Utc>) {
        self.revision_create_time = t;
    }

    fn set_revision_update_time(&mut self, t: DateTime<Utc>) {
        self.revision_update_time = t;
    }

    fn revisioned_fields_differ(&self, other: &Self) -> bool {
        self.api_spec_revision != other.api_spec_revision
            || self.endpoint_uri != other.endpoint_uri
            || self.external_channel_uri != other.external_channel_uri
            || self.intended_audience != other.intended_audience
            || self.access_guidance != other.access_guidance
    }
}
