//! Channel identity and descriptors
//!
//! A channel is a registered, typed log source. Channels form a hierarchy
//! through parent ids: a pipeline owns its stages, a job owns its steps, and
//! a step may launch a nested pipeline. Parents are referenced by id only;
//! the directory resolves them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::level::LogLevel;

/// Unique identifier of a registered channel
///
/// Ids are random v4 UUIDs, so they are never reused within or across
/// process images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(Uuid);

impl ChannelId {
    /// Allocate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Short display form (for logging)
    pub fn short_id(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of unit a channel logs for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// A running pipeline (transformation)
    Pipeline,
    /// One stage (step) of a running pipeline
    Stage,
    /// A running job
    Job,
    /// One step (entry) of a running job
    JobStep,
    /// A database or service connection
    Connection,
    /// A remote execution server
    Remote,
    /// A definition repository
    Repository,
    /// A pipeline definition being edited or loaded
    PipelineDefinition,
    /// A job definition being edited or loaded
    JobDefinition,
    /// Unscoped, process-wide logging
    General,
}

impl ChannelKind {
    /// Whether channels of this kind are unscoped (general) channels
    pub fn is_unscoped(self) -> bool {
        self == ChannelKind::General
    }

    /// Lower-case code (for logging)
    pub fn code(self) -> &'static str {
        match self {
            ChannelKind::Pipeline => "pipeline",
            ChannelKind::Stage => "stage",
            ChannelKind::Job => "job",
            ChannelKind::JobStep => "job_step",
            ChannelKind::Connection => "connection",
            ChannelKind::Remote => "remote",
            ChannelKind::Repository => "repository",
            ChannelKind::PipelineDefinition => "pipeline_definition",
            ChannelKind::JobDefinition => "job_definition",
            ChannelKind::General => "general",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// What a producer declares about itself when registering
///
/// Two descriptors with the same container, kind, name, copy index,
/// location and (recursively) the same parent describe the same logical
/// source and are merged into one channel by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// Kind of unit
    pub kind: ChannelKind,
    /// Display name
    pub name: String,
    /// Distinguishes parallel copies of one logical unit
    pub copy_index: Option<u32>,
    /// Parent channel, if any
    pub parent: Option<ChannelId>,
    /// Execution instance this channel belongs to
    pub container_id: Option<String>,
    /// File or definition locator
    pub location: Option<String>,
    /// Requested level; `None` inherits from the parent
    pub level: Option<LogLevel>,
    /// An id the producer already holds from an earlier registration
    pub carried_id: Option<ChannelId>,
}

impl ChannelDescriptor {
    /// Create a descriptor for a root channel of the given kind
    pub fn new(kind: ChannelKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            copy_index: None,
            parent: None,
            container_id: None,
            location: None,
            level: None,
            carried_id: None,
        }
    }

    /// Descriptor for the unscoped general channel
    pub fn general() -> Self {
        Self::new(ChannelKind::General, "General")
    }

    /// Set the parent channel
    pub fn with_parent(mut self, parent: ChannelId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the copy index
    pub fn with_copy_index(mut self, copy_index: u32) -> Self {
        self.copy_index = Some(copy_index);
        self
    }

    /// Set the execution container
    pub fn with_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    /// Set the file or definition locator
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Request an explicit level instead of inheriting
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Carry an id from an earlier registration
    pub fn with_carried_id(mut self, id: ChannelId) -> Self {
        self.carried_id = Some(id);
        self
    }

    /// Whether the local identity fields (everything except the parent) match
    pub fn same_local_identity(&self, other: &ChannelDescriptor) -> bool {
        self.container_id == other.container_id
            && self.kind == other.kind
            && self.name == other.name
            && self.copy_index == other.copy_index
            && self.location == other.location
    }
}

/// A registered channel as stored by the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Assigned id
    pub id: ChannelId,
    /// Descriptor as registered
    pub descriptor: ChannelDescriptor,
    /// Effective level (explicit, inherited, or default)
    pub level: LogLevel,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Position in the directory's registration order
    pub registration: u64,
    /// Whether a long-lived consumer is attached
    pub protected: bool,
}

impl ChannelRecord {
    /// Display name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Kind of unit
    pub fn kind(&self) -> ChannelKind {
        self.descriptor.kind
    }

    /// Parent id, if any
    pub fn parent(&self) -> Option<ChannelId> {
        self.descriptor.parent
    }

    /// Whether this is an unscoped channel
    pub fn is_unscoped(&self) -> bool {
        self.descriptor.kind.is_unscoped()
    }
}
