//! Binds items to the resources they launch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::manifest::{Item, Manifest, Resource, ScormType};

/// Where an item's content starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchTarget {
    /// Identifier of the launched resource.
    pub resource_id: String,
    /// Full launch URL relative to the package root.
    pub href: String,
    /// Classification of the resource.
    pub scorm_type: ScormType,
}

/// An item with its launch target attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedItem {
    /// The item itself; its `children` are moved into [`ResolvedItem::children`].
    pub item: Item,
    /// Launch target, `None` for containers.
    pub launch: Option<LaunchTarget>,
    /// Resolved children in document order.
    pub children: Vec<ResolvedItem>,
}

/// An organization whose items are resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOrganization {
    /// Organization identifier.
    pub identifier: String,
    /// Display title.
    pub title: String,
    /// Resolved top-level items.
    pub items: Vec<ResolvedItem>,
}

/// Resolves an item tree against a resource list.
///
/// Fails on the first item, in document order, whose `identifierref` has
/// no matching resource, or whose SCO resource has an empty href.
pub fn resolve(items: &[Item], resources: &[Resource]) -> Result<Vec<ResolvedItem>, ResolveError> {
    let mut index = BTreeMap::new();
    for resource in resources {
        index.entry(resource.identifier.as_str()).or_insert(resource);
    }
    items.iter().map(|item| resolve_item(item, &index)).collect()
}

/// Resolves every organization of a manifest.
pub fn resolve_manifest(manifest: &Manifest) -> Result<Vec<ResolvedOrganization>, ResolveError> {
    manifest
        .organizations
        .iter()
        .map(|org| {
            Ok(ResolvedOrganization {
                identifier: org.identifier.clone(),
                title: org.title.clone(),
                items: resolve(&org.items, &manifest.resources)?,
            })
        })
        .collect()
}

fn resolve_item(item: &Item, resources: &BTreeMap<&str, &Resource>) -> Result<ResolvedItem, ResolveError> {
    let launch = match item.resource_ref.as_deref() {
        None => None,
        Some(resource_ref) => {
            let resource = resources
                .get(resource_ref)
                .ok_or_else(|| ResolveError::DanglingReference {
                    item_id: item.identifier.clone(),
                    resource_ref: resource_ref.to_string(),
                })?;
            if resource.scorm_type == ScormType::Sco && resource.href.trim().is_empty() {
                return Err(ResolveError::EmptyLaunchTarget(resource.identifier.clone()));
            }
            Some(LaunchTarget {
                resource_id: resource.identifier.clone(),
                href: launch_href(resource, item.parameters.as_deref()),
                scorm_type: resource.scorm_type,
            })
        }
    };

    let children = item
        .children
        .iter()
        .map(|child| resolve_item(child, resources))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResolvedItem {
        item: item.without_children(),
        launch,
        children,
    })
}

/// Prefixes `path` with the resource base, adding a `/` when the base lacks one.
/// Absolute URLs are returned unchanged.
pub(crate) fn join_base(base: Option<&str>, path: &str) -> String {
    match base {
        Some(base) if !base.is_empty() && !path.contains("://") => {
            if base.ends_with('/') || path.starts_with('/') {
                format!("{base}{path}")
            } else {
                format!("{base}/{path}")
            }
        }
        _ => path.to_string(),
    }
}

/// Builds the launch URL of a resource for one item.
///
/// The resource's own query comes first, then the item `parameters`.
/// Leading `?` or `&` are dropped and a `#fragment` is kept at the end.
///
/// ```
/// use scorm_engine::{launch_href, Resource, ScormType};
///
/// let mut resource = Resource::new("r1", "lesson.html", ScormType::Sco);
/// resource.base = Some("content/".to_string());
/// resource.parameters = Some("v=2".to_string());
///
/// assert_eq!(
///     launch_href(&resource, Some("?page=3#intro")),
///     "content/lesson.html?v=2&page=3#intro"
/// );
/// ```
#[must_use]
pub fn launch_href(resource: &Resource, item_parameters: Option<&str>) -> String {
    let (path, mut fragment) = match resource.href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (resource.href.as_str(), None),
    };

    let mut url = join_base(resource.base.as_deref(), path);

    for parameters in [resource.parameters.as_deref(), item_parameters].into_iter().flatten() {
        let query = match parameters.split_once('#') {
            Some((query, frag)) => {
                fragment = Some(frag);
                query
            }
            None => parameters,
        };
        let query = query.trim_start_matches(|c| c == '?' || c == '&');
        if query.is_empty() {
            continue;
        }
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(query);
    }

    if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
        url.push('#');
        url.push_str(fragment);
    }
    url
}
