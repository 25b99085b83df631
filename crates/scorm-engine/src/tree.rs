//! Flattened course structure.
//!
//! The builder walks the default organization depth-first, orders
//! siblings by `sequence_order` and emits one [`Sco`] per item that
//! launches something. The result is immutable and shared by every
//! learner of the package.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::manifest::{Manifest, ScormType};
use crate::prerequisite::PrerequisiteExpr;
use crate::resolver::{ResolvedItem, ResolvedOrganization};

/// A launchable leaf of the course, in delivery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sco {
    /// Item identifier.
    pub identifier: String,
    /// Display title.
    pub title: String,
    /// Set when the title fell back to the identifier.
    #[serde(default)]
    pub untitled: bool,
    /// Organization the SCO belongs to.
    pub organization_id: String,
    /// Enclosing item, `None` at the top level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Nesting depth, 0 at the top level.
    pub depth: u32,
    /// Resource launched by the SCO.
    pub resource_id: String,
    /// Launch URL relative to the package root.
    pub launch_href: String,
    /// Classification of the launched resource.
    pub scorm_type: ScormType,
    /// `true` only for `sco` resources; assets are never tracked.
    pub is_launchable: bool,
    /// Whether the item appears in navigation menus.
    pub is_visible: bool,
    /// Mastery score clamped to 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mastery_score: Option<f64>,
    /// Progress measure at which the SCO counts as completed, clamped to 0-1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_threshold: Option<f64>,
    /// Position in delivery order, starting at 1.
    pub seq_order: u32,
    /// Condition gating launch.
    #[serde(default, skip_serializing_if = "PrerequisiteExpr::is_always")]
    pub prerequisites: PrerequisiteExpr,
    /// `cmi.launch_data` for the SCO.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_data: Option<String>,
    /// Maximum time allowed, as declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_allowed: Option<String>,
    /// Action on time limit, as declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_action: Option<String>,
}

/// Navigation tree node of the delivered organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineNode {
    /// Item identifier.
    pub identifier: String,
    /// Display title.
    pub title: String,
    /// Whether the item appears in navigation menus.
    pub is_visible: bool,
    /// Set when the item launches a trackable SCO.
    pub launchable: bool,
    /// Child nodes in delivery order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineNode>,
}

/// Everything a runtime needs to deliver a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseStructure {
    /// The parsed manifest.
    pub manifest: Manifest,
    /// Organization the SCO list was built from.
    pub organization_id: String,
    /// Navigation tree of that organization.
    pub outline: Vec<OutlineNode>,
    /// SCOs and assets in delivery order.
    pub scos: Vec<Sco>,
}

impl CourseStructure {
    /// Looks up a SCO by identifier.
    #[must_use]
    pub fn sco(&self, identifier: &str) -> Option<&Sco> {
        self.scos.iter().find(|sco| sco.identifier == identifier)
    }

    /// Index of a SCO in delivery order.
    #[must_use]
    pub fn position(&self, identifier: &str) -> Option<usize> {
        self.scos.iter().position(|sco| sco.identifier == identifier)
    }

    /// Number of SCOs learners can launch.
    #[must_use]
    pub fn launchable_count(&self) -> usize {
        self.scos.iter().filter(|sco| sco.is_launchable).count()
    }
}

/// Flattens the default organization of a resolved manifest.
///
/// Falls back to the first organization when the default does not exist.
#[must_use]
pub fn build(manifest: Manifest, organizations: Vec<ResolvedOrganization>) -> CourseStructure {
    let default_id = manifest.default_organization_id.clone();
    let mut first = None;
    let mut chosen = None;
    for organization in organizations {
        if organization.identifier == default_id {
            chosen = Some(organization);
            break;
        }
        if first.is_none() {
            first = Some(organization);
        }
    }
    let chosen = chosen.or(first);

    let Some(organization) = chosen else {
        debug!(manifest = %manifest.identifier, "Manifest has no organizations");
        return CourseStructure {
            manifest,
            organization_id: String::new(),
            outline: Vec::new(),
            scos: Vec::new(),
        };
    };
    if organization.identifier != default_id {
        warn!(
            default = %default_id,
            using = %organization.identifier,
            "Default organization not found; delivering first organization"
        );
    }

    let ResolvedOrganization {
        identifier, items, ..
    } = organization;
    let mut flattener = Flattener {
        organization_id: &identifier,
        scos: Vec::new(),
    };
    let outline = flattener.walk(items, None, 0);
    let scos = flattener.scos;

    debug!(organization = %identifier, scos = scos.len(), "Built course structure");

    CourseStructure {
        manifest,
        organization_id: identifier,
        outline,
        scos,
    }
}

struct Flattener<'a> {
    organization_id: &'a str,
    scos: Vec<Sco>,
}

impl Flattener<'_> {
    fn walk(&mut self, mut items: Vec<ResolvedItem>, parent: Option<&str>, depth: u32) -> Vec<OutlineNode> {
        items.sort_by_key(|resolved| resolved.item.sequence_order);

        let mut outline = Vec::with_capacity(items.len());
        for resolved in items {
            let ResolvedItem {
                item,
                launch,
                children,
            } = resolved;

            let launchable = launch
                .as_ref()
                .is_some_and(|target| target.scorm_type == ScormType::Sco);

            if let Some(target) = launch {
                let seq_order = u32::try_from(self.scos.len() + 1).unwrap_or(u32::MAX);
                self.scos.push(Sco {
                    identifier: item.identifier.clone(),
                    title: item.title.clone(),
                    untitled: item.untitled,
                    organization_id: self.organization_id.to_string(),
                    parent_id: parent.map(str::to_string),
                    depth,
                    resource_id: target.resource_id,
                    launch_href: target.href,
                    scorm_type: target.scorm_type,
                    is_launchable: launchable,
                    is_visible: item.is_visible,
                    mastery_score: item.mastery_score.map(|m| m.clamp(0.0, 100.0)),
                    completion_threshold: item.completion_threshold.map(|t| t.clamp(0.0, 1.0)),
                    seq_order,
                    prerequisites: item.prerequisites.clone(),
                    launch_data: item.launch_data.clone(),
                    max_time_allowed: item.max_time_allowed.clone(),
                    time_limit_action: item.time_limit_action.clone(),
                });
            }

            let children = self.walk(children, Some(&item.identifier), depth + 1);
            outline.push(OutlineNode {
                identifier: item.identifier,
                title: item.title,
                is_visible: item.is_visible,
                launchable,
                children,
            });
        }
        outline
    }
}
