//! Structural validation of an ingested package.
//!
//! Errors block activation of the package; warnings are informational.
//! Validation never mutates the structure and always yields the same report
//! for the same input.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::tarjan_scc;
use petgraph::prelude::DiGraphMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::manifest::{Item, ScormType};
use crate::resolver::join_base;
use crate::tree::CourseStructure;

/// Outcome of [`validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// `true` when `errors` is empty.
    pub is_valid: bool,
    /// Problems that prevent delivery.
    pub errors: Vec<String>,
    /// Problems that are tolerated.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn finish(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Checks a course structure for errors and warnings.
#[must_use]
pub fn validate(course: &CourseStructure) -> ValidationReport {
    let manifest = &course.manifest;
    let items = manifest.all_items();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Identity

    if course.launchable_count() == 0 {
        errors.push("package contains no launchable SCOs".to_string());
    }

    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let identifiers = manifest
        .organizations
        .iter()
        .map(|org| org.identifier.as_str())
        .chain(items.iter().map(|item| item.identifier.as_str()))
        .chain(manifest.resources.iter().map(|res| res.identifier.as_str()));
    for identifier in identifiers {
        *seen.entry(identifier).or_default() += 1;
    }
    for (identifier, count) in &seen {
        if *count > 1 {
            errors.push(format!("duplicate identifier '{identifier}' ({count} occurrences)"));
        }
    }

    if !manifest.organizations.is_empty() && manifest.default_organization().is_none() {
        errors.push(format!(
            "default organization '{}' does not exist",
            manifest.default_organization_id
        ));
    }

    // Prerequisites

    let item_ids: BTreeSet<&str> = items.iter().map(|item| item.identifier.as_str()).collect();
    let launchable_items: BTreeSet<&str> = items
        .iter()
        .filter(|item| {
            item.resource_ref
                .as_deref()
                .and_then(|r| manifest.resource(r))
                .is_some_and(|res| res.scorm_type == ScormType::Sco)
        })
        .map(|item| item.identifier.as_str())
        .collect();

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for item in &items {
        for reference in item.prerequisites.referenced_ids() {
            if !item_ids.contains(reference) {
                errors.push(format!(
                    "item '{}' has a prerequisite on unknown identifier '{reference}'",
                    item.identifier
                ));
                continue;
            }
            if !launchable_items.contains(reference) {
                warnings.push(format!(
                    "item '{}' has a prerequisite on '{reference}', which is not a launchable SCO",
                    item.identifier
                ));
            }
            graph.add_edge(item.identifier.as_str(), reference, ());
        }
    }
    for cycle in prerequisite_cycles(&graph) {
        errors.push(format!("prerequisite cycle between {}", cycle.join(", ")));
    }

    // Presentation

    for sco in course.scos.iter().filter(|sco| sco.untitled) {
        warnings.push(format!("SCO '{}' has no title", sco.identifier));
    }

    for item in &items {
        if let Some(mastery) = item.mastery_score {
            if !(0.0..=100.0).contains(&mastery) {
                warnings.push(format!(
                    "item '{}' mastery score {mastery} is outside 0-100 and was clamped",
                    item.identifier
                ));
            }
        }
        if is_empty_leaf(item) {
            warnings.push(format!(
                "item '{}' has neither a resource nor child items",
                item.identifier
            ));
        }
    }

    for org in manifest.organizations.iter().filter(|org| org.items.is_empty()) {
        warnings.push(format!("organization '{}' has no items", org.identifier));
    }

    // Resources

    let resource_ids: BTreeSet<&str> = manifest
        .resources
        .iter()
        .map(|res| res.identifier.as_str())
        .collect();
    let mut used: BTreeSet<&str> = items
        .iter()
        .filter_map(|item| item.resource_ref.as_deref())
        .collect();

    for resource in &manifest.resources {
        for dependency in &resource.dependencies {
            if resource_ids.contains(dependency.as_str()) {
                used.insert(dependency.as_str());
            } else {
                warnings.push(format!(
                    "resource '{}' depends on unknown resource '{dependency}'",
                    resource.identifier
                ));
            }
        }

        let location = join_base(resource.base.as_deref(), &resource.href);
        if escapes_package(&location) {
            warnings.push(format!(
                "resource '{}' launch path '{location}' points outside the package",
                resource.identifier
            ));
        }
    }

    for resource in manifest
        .resources
        .iter()
        .filter(|res| !used.contains(res.identifier.as_str()))
    {
        warnings.push(format!(
            "resource '{}' is not referenced by any item",
            resource.identifier
        ));
    }

    debug!(
        manifest = %manifest.identifier,
        errors = errors.len(),
        warnings = warnings.len(),
        "Validated course structure"
    );

    ValidationReport::finish(errors, warnings)
}

/// Strongly connected components that form prerequisite cycles, members sorted.
fn prerequisite_cycles<'a>(graph: &DiGraphMap<&'a str, ()>) -> Vec<Vec<&'a str>> {
    let mut cycles: Vec<Vec<&str>> = tarjan_scc(graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || component.first().is_some_and(|node| graph.contains_edge(*node, *node))
        })
        .map(|mut component| {
            component.sort_unstable();
            component
        })
        .collect();
    cycles.sort();
    cycles
}

fn is_empty_leaf(item: &Item) -> bool {
    item.resource_ref.is_none() && item.children.is_empty()
}

fn escapes_package(path: &str) -> bool {
    if path.contains("://") {
        return false;
    }
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let bytes = path.as_bytes();
    let drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    path.starts_with('/')
        || path.starts_with('\\')
        || drive
        || path.split(['/', '\\']).any(|segment| segment == "..")
}
