//! Typed object model for `imsmanifest.xml`.
//!
//! These types are produced by [`crate::parser`] and are immutable once a
//! package has been ingested. Serialization is deterministic: vectors keep
//! document order and optional fields are omitted when absent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::prerequisite::PrerequisiteExpr;

/// Which SCORM edition a manifest was authored for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaVersion {
    /// SCORM 1.2 (the default when nothing indicates 2004).
    #[default]
    #[serde(rename = "SCORM_1_2")]
    Scorm12,
    /// SCORM 2004 (any edition).
    #[serde(rename = "SCORM_2004")]
    Scorm2004,
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scorm12 => write!(f, "SCORM 1.2"),
            Self::Scorm2004 => write!(f, "SCORM 2004"),
        }
    }
}

/// Runtime classification of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScormType {
    /// A Sharable Content Object that talks to the runtime API.
    Sco,
    /// Static content that never reports progress.
    #[default]
    Asset,
}

impl ScormType {
    /// Reads an `adlcp:scormtype` attribute value. Anything but `sco` is an asset.
    #[must_use]
    pub fn from_attribute(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("sco") {
            Self::Sco
        } else {
            Self::Asset
        }
    }
}

impl fmt::Display for ScormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sco => write!(f, "sco"),
            Self::Asset => write!(f, "asset"),
        }
    }
}

/// Root of a parsed manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Package-unique identifier of the manifest.
    pub identifier: String,

    /// Value of the manifest `version` attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Detected SCORM edition.
    pub schema_version: SchemaVersion,

    /// Free-form edition label from `<schemaversion>`, e.g. `2004 4th Edition`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,

    /// Display title of the package.
    pub title: String,

    /// Organization the learner experiences by default.
    pub default_organization_id: String,

    /// Organizations in document order.
    pub organizations: Vec<Organization>,

    /// Resources in document order.
    pub resources: Vec<Resource>,
}

impl Manifest {
    /// Looks up an organization by identifier.
    #[must_use]
    pub fn organization(&self, identifier: &str) -> Option<&Organization> {
        self.organizations
            .iter()
            .find(|org| org.identifier == identifier)
    }

    /// The default organization, if `default_organization_id` resolves.
    #[must_use]
    pub fn default_organization(&self) -> Option<&Organization> {
        self.organization(&self.default_organization_id)
    }

    /// Looks up a resource by identifier.
    #[must_use]
    pub fn resource(&self, identifier: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|res| res.identifier == identifier)
    }

    /// Every item of every organization, depth-first in document order.
    #[must_use]
    pub fn all_items(&self) -> Vec<&Item> {
        let mut items = Vec::new();
        for org in &self.organizations {
            for item in &org.items {
                item.collect_into(&mut items);
            }
        }
        items
    }
}

/// A named grouping of items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Identifier, unique within the manifest.
    pub identifier: String,
    /// Display title (falls back to the identifier).
    pub title: String,
    /// Set when `title` is the identifier fallback.
    #[serde(default, skip_serializing_if = "is_false")]
    pub untitled: bool,
    /// Top-level items in sibling order.
    pub items: Vec<Item>,
}

/// A navigable node of an organization tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Identifier, unique within the manifest.
    pub identifier: String,

    /// Display title (falls back to the identifier).
    pub title: String,

    /// Set when `title` is the identifier fallback.
    #[serde(default, skip_serializing_if = "is_false")]
    pub untitled: bool,

    /// Resource launched by this item; `None` for containers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<String>,

    /// Position among siblings, ascending.
    pub sequence_order: u32,

    /// Condition that must hold before the item may be launched.
    #[serde(default, skip_serializing_if = "PrerequisiteExpr::is_always")]
    pub prerequisites: PrerequisiteExpr,

    /// Minimum raw score counted as passed, as declared (not clamped).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mastery_score: Option<f64>,

    /// Whether the item is shown in navigation menus.
    #[serde(default = "default_true")]
    pub is_visible: bool,

    /// Query string appended to the resource href at launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,

    /// Initialization data handed to the SCO (`cmi.launch_data`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_data: Option<String>,

    /// Maximum time allowed for an attempt, as written in the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_allowed: Option<String>,

    /// What the SCO should do when time runs out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_action: Option<String>,

    /// SCORM 2004 completion threshold (0.0 - 1.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_threshold: Option<f64>,

    /// Nested items in sibling order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Item>,
}

impl Item {
    /// Creates an item with only an identifier and title set.
    #[must_use]
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            untitled: false,
            resource_ref: None,
            sequence_order: 0,
            prerequisites: PrerequisiteExpr::Always,
            mastery_score: None,
            is_visible: true,
            parameters: None,
            launch_data: None,
            max_time_allowed: None,
            time_limit_action: None,
            completion_threshold: None,
            children: Vec::new(),
        }
    }

    /// Returns `true` if the item groups children and launches nothing.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.resource_ref.is_none() && !self.children.is_empty()
    }

    /// Copies every field except `children`.
    #[must_use]
    pub fn without_children(&self) -> Self {
        Self {
            identifier: self.identifier.clone(),
            title: self.title.clone(),
            untitled: self.untitled,
            resource_ref: self.resource_ref.clone(),
            sequence_order: self.sequence_order,
            prerequisites: self.prerequisites.clone(),
            mastery_score: self.mastery_score,
            is_visible: self.is_visible,
            parameters: self.parameters.clone(),
            launch_data: self.launch_data.clone(),
            max_time_allowed: self.max_time_allowed.clone(),
            time_limit_action: self.time_limit_action.clone(),
            completion_threshold: self.completion_threshold,
            children: Vec::new(),
        }
    }

    fn collect_into<'a>(&'a self, out: &mut Vec<&'a Self>) {
        out.push(self);
        for child in &self.children {
            child.collect_into(out);
        }
    }
}

/// A launchable unit declared under `<resources>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Identifier, unique within the manifest.
    pub identifier: String,

    /// Value of the `type` attribute, usually `webcontent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    /// Path into the package, without any query string.
    pub href: String,

    /// Effective `xml:base` prefix inherited from manifest, resources and resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// Runtime classification.
    pub scorm_type: ScormType,

    /// Query string split off the declared href.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,

    /// Files listed for the resource.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Identifiers of resources this one depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Resource {
    /// Creates a resource with an href and classification.
    #[must_use]
    pub fn new(identifier: impl Into<String>, href: impl Into<String>, scorm_type: ScormType) -> Self {
        Self {
            identifier: identifier.into(),
            resource_type: Some("webcontent".to_string()),
            href: href.into(),
            base: None,
            scorm_type,
            parameters: None,
            files: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

const fn default_true() -> bool {
    true
}
