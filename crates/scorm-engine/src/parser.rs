//! Manifest parser.
//!
//! Walks an `imsmanifest.xml` document tree and produces a typed
//! [`Manifest`]. Elements and attributes are matched on their local name,
//! ignoring prefixes and namespace URIs, so `adlcp:scormtype`,
//! `adlcp:scormType` and an unprefixed `scormtype` are all the same thing.
//!
//! Malformed XML aborts the parse; nothing partial is ever returned.
//! Missing titles, missing identifiers and unreadable mastery scores are
//! tolerated and logged.

use std::collections::BTreeSet;

use roxmltree::{Document, Node, ParsingOptions};
use tracing::{debug, warn};

use crate::config::SchemaDetection;
use crate::error::{ParseError, TextPosition};
use crate::manifest::{Item, Manifest, Organization, Resource, SchemaVersion, ScormType};
use crate::prerequisite::PrerequisiteExpr;
use crate::simple_sequencing::{self, SequencingDefinition};

/// Deepest `<item>` nesting a manifest may use.
pub const MAX_ITEM_DEPTH: usize = 64;

/// Options controlling [`parse_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// How the SCORM edition is determined.
    pub schema: SchemaDetection,
}

/// Parses manifest bytes with automatic schema detection.
///
/// # Example
///
/// ```
/// use scorm_engine::{parse, SchemaVersion};
///
/// let xml = br#"<manifest identifier="m1">
///   <organizations default="org1">
///     <organization identifier="org1"><title>Course</title>
///       <item identifier="i1" identifierref="r1"><title>Lesson</title></item>
///     </organization>
///   </organizations>
///   <resources>
///     <resource identifier="r1" type="webcontent" adlcp:scormtype="sco" href="index.html"
///       xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_rootv1p2"/>
///   </resources>
/// </manifest>"#;
///
/// let manifest = parse(xml).unwrap();
/// assert_eq!(manifest.schema_version, SchemaVersion::Scorm12);
/// assert_eq!(manifest.organizations[0].items[0].title, "Lesson");
/// ```
pub fn parse(xml: &[u8]) -> Result<Manifest, ParseError> {
    parse_with(xml, ParseOptions::default())
}

/// Parses manifest bytes with explicit options.
pub fn parse_with(xml: &[u8], options: ParseOptions) -> Result<Manifest, ParseError> {
    let text = decode(xml)?;

    let parsing = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, parsing).map_err(|e| {
        let pos = e.pos();
        ParseError::Malformed(TextPosition::new(pos.row, pos.col), e.to_string())
    })?;

    let root = doc.root_element();
    if !is_named(root, "manifest") {
        return Err(ParseError::MissingSection("manifest".to_string()));
    }
    let organizations_node = child(root, "organizations")
        .ok_or_else(|| ParseError::MissingSection("organizations".to_string()))?;
    let resources_node =
        child(root, "resources").ok_or_else(|| ParseError::MissingSection("resources".to_string()))?;

    let metadata = child(root, "metadata");
    let edition = metadata
        .and_then(|m| child(m, "schemaversion"))
        .map(display_text)
        .filter(|s| !s.is_empty());
    let schema_version = match options.schema {
        SchemaDetection::Auto => detect_schema(root, edition.as_deref()),
        SchemaDetection::Scorm12 => SchemaVersion::Scorm12,
        SchemaDetection::Scorm2004 => SchemaVersion::Scorm2004,
    };
    debug!(%schema_version, edition = ?edition, "Detected manifest schema");

    let identifier = attr(root, "identifier")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(
            || {
                warn!("Manifest has no identifier; using 'MANIFEST'");
                "MANIFEST".to_string()
            },
            str::to_string,
        );

    let mut reader = ItemReader::default();
    let mut organizations = Vec::new();
    for (index, node) in elements_named(organizations_node, "organization").enumerate() {
        organizations.push(reader.read_organization(node, index)?);
    }

    if !reader.sequencing.is_empty() {
        let known: BTreeSet<String> = organizations
            .iter()
            .flat_map(|org| org.items.iter())
            .flat_map(collect_ids)
            .collect();
        simple_sequencing::apply(&mut organizations, &reader.sequencing, &known);
    }

    let default_organization_id = attr(organizations_node, "default")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| organizations.first().map(|org| org.identifier.clone()))
        .unwrap_or_default();

    let base = attr(root, "base").map(str::to_string);
    let resources = read_resources(resources_node, base.as_deref());

    let title = metadata
        .and_then(metadata_title)
        .or_else(|| {
            organizations
                .iter()
                .find(|org| org.identifier == default_organization_id)
                .filter(|org| !org.untitled)
                .map(|org| org.title.clone())
        })
        .unwrap_or_else(|| identifier.clone());

    Ok(Manifest {
        identifier,
        version: attr(root, "version").map(str::to_string),
        schema_version,
        edition,
        title,
        default_organization_id,
        organizations,
        resources,
    })
}

// ============================================================================
// Organizations and items
// ============================================================================

#[derive(Default)]
struct ItemReader {
    /// SCORM 2004 sequencing per item, in document order.
    sequencing: Vec<(String, SequencingDefinition)>,
}

impl ItemReader {
    fn read_organization(&mut self, node: Node<'_, '_>, index: usize) -> Result<Organization, ParseError> {
        let identifier = attr(node, "identifier")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(
                || {
                    let synthesized = format!("ORG-{}", index + 1);
                    warn!(identifier = %synthesized, "Organization has no identifier");
                    synthesized
                },
                str::to_string,
            );
        let (title, untitled) = read_title(node, &identifier);

        let mut items = Vec::new();
        for (position, item) in elements_named(node, "item").enumerate() {
            let path = (position + 1).to_string();
            items.push(self.read_item(item, position, &path, 0)?);
        }

        Ok(Organization {
            identifier,
            title,
            untitled,
            items,
        })
    }

    fn read_item(
        &mut self,
        node: Node<'_, '_>,
        position: usize,
        path: &str,
        depth: usize,
    ) -> Result<Item, ParseError> {
        if depth >= MAX_ITEM_DEPTH {
            let pos = node.document().text_pos_at(node.range().start);
            return Err(ParseError::Malformed(
                TextPosition::new(pos.row, pos.col),
                format!("items nest deeper than {MAX_ITEM_DEPTH} levels"),
            ));
        }
        let identifier = attr(node, "identifier")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(
                || {
                    let synthesized = format!("ITEM-{path}");
                    warn!(identifier = %synthesized, "Item has no identifier");
                    synthesized
                },
                str::to_string,
            );
        let (title, untitled) = read_title(node, &identifier);

        let mut item = Item::new(identifier, title);
        item.untitled = untitled;
        item.sequence_order = u32::try_from(position).unwrap_or(u32::MAX);
        item.resource_ref = non_empty(attr(node, "identifierref"));
        item.parameters = non_empty(attr(node, "parameters"));
        item.is_visible = !attr(node, "isvisible").is_some_and(|v| v.trim().eq_ignore_ascii_case("false"));

        let mut child_position = 0;
        for element in node.children().filter(Node::is_element) {
            let name = element.tag_name().name().to_ascii_lowercase();
            match name.as_str() {
                "item" => {
                    let child_path = format!("{path}.{}", child_position + 1);
                    item.children
                        .push(self.read_item(element, child_position, &child_path, depth + 1)?);
                    child_position += 1;
                }
                "masteryscore" => item.mastery_score = read_number(element, &item.identifier),
                "prerequisites" => {
                    item.prerequisites = read_prerequisites(element, &item.identifier)?;
                }
                "maxtimeallowed" => item.max_time_allowed = non_empty(Some(&display_text(element))),
                "timelimitaction" => item.time_limit_action = non_empty(Some(&display_text(element))),
                "datafromlms" => item.launch_data = non_empty(Some(&display_text(element))),
                "completionthreshold" => {
                    item.completion_threshold = attr(element, "minProgressMeasure")
                        .and_then(|v| v.trim().parse().ok())
                        .or_else(|| read_number(element, &item.identifier));
                }
                "sequencing" => {
                    let definition = simple_sequencing::read(element);
                    if item.mastery_score.is_none() {
                        item.mastery_score = definition.mastery_measure.map(|m| m * 100.0);
                    }
                    self.sequencing.push((item.identifier.clone(), definition));
                }
                _ => {}
            }
        }

        Ok(item)
    }
}

fn read_prerequisites(node: Node<'_, '_>, item_id: &str) -> Result<PrerequisiteExpr, ParseError> {
    if let Some(kind) = attr(node, "type") {
        if !kind.eq_ignore_ascii_case("aicc_script") {
            warn!(item = %item_id, kind, "Unknown prerequisite type; parsing as aicc_script");
        }
    }
    PrerequisiteExpr::parse_script(&display_text(node)).map_err(|e| ParseError::InvalidPrerequisite {
        item: item_id.to_string(),
        reason: e.to_string(),
    })
}

fn read_number(node: Node<'_, '_>, item_id: &str) -> Option<f64> {
    let text = display_text(node);
    if text.is_empty() {
        return None;
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!(item = %item_id, value = %text, element = node.tag_name().name(), "Ignoring unreadable number");
            None
        }
    }
}

fn collect_ids(item: &Item) -> Vec<String> {
    let mut ids = vec![item.identifier.clone()];
    for child in &item.children {
        ids.extend(collect_ids(child));
    }
    ids
}

// ============================================================================
// Resources
// ============================================================================

fn read_resources(node: Node<'_, '_>, manifest_base: Option<&str>) -> Vec<Resource> {
    let section_base = join_base(manifest_base, attr(node, "base"));

    elements_named(node, "resource")
        .enumerate()
        .map(|(index, element)| {
            let identifier = attr(element, "identifier")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map_or_else(
                    || {
                        let synthesized = format!("RES-{}", index + 1);
                        warn!(identifier = %synthesized, "Resource has no identifier");
                        synthesized
                    },
                    str::to_string,
                );

            let declared = attr(element, "href").map(str::trim).unwrap_or_default();
            let (href, parameters) = match declared.split_once('?') {
                Some((path, query)) => (path.to_string(), non_empty(Some(query))),
                None => (declared.to_string(), None),
            };

            Resource {
                identifier,
                resource_type: non_empty(attr(element, "type")),
                href,
                base: join_base(section_base.as_deref(), attr(element, "base")),
                scorm_type: attr(element, "scormtype")
                    .map(ScormType::from_attribute)
                    .unwrap_or_default(),
                parameters,
                files: elements_named(element, "file")
                    .filter_map(|file| non_empty(attr(file, "href")))
                    .collect(),
                dependencies: elements_named(element, "dependency")
                    .filter_map(|dep| non_empty(attr(dep, "identifierref")))
                    .collect(),
            }
        })
        .collect()
}

/// Appends a relative `xml:base` to its parent; an absolute one replaces it.
fn join_base(parent: Option<&str>, own: Option<&str>) -> Option<String> {
    let own = own.map(str::trim).filter(|s| !s.is_empty());
    match (parent, own) {
        (None, None) => None,
        (Some(parent), None) => Some(parent.to_string()),
        (_, Some(own)) if own.starts_with('/') || own.contains("://") => Some(own.to_string()),
        (None, Some(own)) => Some(own.to_string()),
        (Some(parent), Some(own)) => {
            if parent.ends_with('/') {
                Some(format!("{parent}{own}"))
            } else {
                Some(format!("{parent}/{own}"))
            }
        }
    }
}

// ============================================================================
// Schema detection and metadata
// ============================================================================

fn detect_schema(root: Node<'_, '_>, edition: Option<&str>) -> SchemaVersion {
    let by_edition = edition.is_some_and(|e| {
        let lower = e.to_ascii_lowercase();
        lower.contains("2004") || lower.contains("cam 1.3")
    });

    let by_location = root.attributes().any(|a| {
        a.name().eq_ignore_ascii_case("schemaLocation")
            && (a.value().contains("imsss") || a.value().contains("adlcp_v1p3"))
    });

    let by_sequencing = root.descendants().filter(Node::is_element).any(|node| {
        node.tag_name()
            .namespace()
            .is_some_and(|ns| ns.contains("imsss"))
            || is_named(node, "sequencing")
            || is_named(node, "sequencingCollection")
    });

    if by_edition || by_location || by_sequencing {
        SchemaVersion::Scorm2004
    } else {
        SchemaVersion::Scorm12
    }
}

/// Title from LOM `general/title` inside the manifest metadata.
fn metadata_title(metadata: Node<'_, '_>) -> Option<String> {
    metadata
        .descendants()
        .find(|node| is_named(*node, "general"))
        .and_then(|general| child(general, "title"))
        .map(display_text)
        .filter(|title| !title.is_empty())
}

fn read_title(node: Node<'_, '_>, identifier: &str) -> (String, bool) {
    match child(node, "title").map(display_text) {
        Some(title) if !title.is_empty() => (title, false),
        _ => {
            debug!(identifier, "Title missing or blank; using identifier");
            (identifier.to_string(), true)
        }
    }
}

// ============================================================================
// Tree helpers
// ============================================================================

fn decode(bytes: &[u8]) -> Result<&str, ParseError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|e| {
        let valid = &bytes[..e.valid_up_to()];
        let line = valid.iter().filter(|&&b| b == b'\n').count() + 1;
        let column = valid.iter().rev().take_while(|&&b| b != b'\n').count() + 1;
        ParseError::Malformed(
            TextPosition::new(
                u32::try_from(line).unwrap_or(u32::MAX),
                u32::try_from(column).unwrap_or(u32::MAX),
            ),
            "invalid UTF-8 encoding".to_string(),
        )
    })
}

pub(crate) fn is_named(node: Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name().eq_ignore_ascii_case(name)
}

pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| is_named(*c, name))
}

pub(crate) fn elements_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |c| is_named(*c, name))
}

pub(crate) fn attr<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name().eq_ignore_ascii_case(name))
        .map(|a| a.value())
}

/// Whitespace-normalized text. Wrapper elements such as LOM `langstring`
/// are unwrapped to their first element child.
pub(crate) fn display_text(node: Node<'_, '_>) -> String {
    let mut node = node;
    while let Some(inner) = node.children().find(Node::is_element) {
        node = inner;
    }
    let raw: String = node
        .children()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SCORM12: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest identifier="course_12" version="1.1"
    xmlns="http://www.imsproject.org/xsd/imscp_rootv1p1p2"
    xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_rootv1p2">
  <metadata>
    <schema>ADL SCORM</schema>
    <schemaversion>1.2</schemaversion>
  </metadata>
  <organizations default="org_main">
    <organization identifier="org_main">
      <title>Safety Basics</title>
      <item identifier="module_1">
        <title>Module 1</title>
        <item identifier="item_1" identifierref="res_1" parameters="?lang=en">
          <title>Welcome</title>
          <adlcp:masteryscore>80</adlcp:masteryscore>
          <adlcp:datafromlms>mode=intro</adlcp:datafromlms>
        </item>
        <item identifier="item_2" identifierref="res_2" isvisible="false">
          <title>   </title>
          <adlcp:prerequisites type="aicc_script">item_1</adlcp:prerequisites>
          <adlcp:maxtimeallowed>00:30:00</adlcp:maxtimeallowed>
          <adlcp:timelimitaction>exit,message</adlcp:timelimitaction>
        </item>
      </item>
    </organization>
  </organizations>
  <resources xml:base="content/">
    <resource identifier="res_1" type="webcontent" adlcp:scormtype="sco" href="welcome.html?v=2">
      <file href="welcome.html"/>
      <dependency identifierref="shared"/>
    </resource>
    <resource identifier="res_2" type="webcontent" adlcp:scormType="SCO" href="quiz.html" xml:base="quiz/"/>
    <resource identifier="shared" type="webcontent" adlcp:scormtype="asset">
      <file href="shared/player.js"/>
    </resource>
  </resources>
</manifest>"#;

    #[test]
    fn test_parse_scorm12_structure() {
        let manifest = parse(SCORM12.as_bytes()).unwrap();

        assert_eq!(manifest.identifier, "course_12");
        assert_eq!(manifest.version.as_deref(), Some("1.1"));
        assert_eq!(manifest.schema_version, SchemaVersion::Scorm12);
        assert_eq!(manifest.edition.as_deref(), Some("1.2"));
        assert_eq!(manifest.title, "Safety Basics");
        assert_eq!(manifest.default_organization_id, "org_main");

        let module = &manifest.organizations[0].items[0];
        assert!(module.is_container());
        assert_eq!(module.children.len(), 2);

        let welcome = &module.children[0];
        assert_eq!(welcome.resource_ref.as_deref(), Some("res_1"));
        assert_eq!(welcome.mastery_score, Some(80.0));
        assert_eq!(welcome.parameters.as_deref(), Some("?lang=en"));
        assert_eq!(welcome.launch_data.as_deref(), Some("mode=intro"));
        assert_eq!(welcome.sequence_order, 0);

        let quiz = &module.children[1];
        assert_eq!(quiz.sequence_order, 1);
        assert!(!quiz.is_visible);
        assert_eq!(quiz.prerequisites, PrerequisiteExpr::completed("item_1"));
        assert_eq!(quiz.max_time_allowed.as_deref(), Some("00:30:00"));
        assert_eq!(quiz.time_limit_action.as_deref(), Some("exit,message"));
    }

    #[test]
    fn test_blank_title_falls_back_to_identifier() {
        let manifest = parse(SCORM12.as_bytes()).unwrap();
        let quiz = &manifest.organizations[0].items[0].children[1];
        assert_eq!(quiz.title, "item_2");
        assert!(quiz.untitled);
    }

    #[test]
    fn test_resources_parsed_with_base_and_query() {
        let manifest = parse(SCORM12.as_bytes()).unwrap();

        let welcome = manifest.resource("res_1").unwrap();
        assert_eq!(welcome.href, "welcome.html");
        assert_eq!(welcome.parameters.as_deref(), Some("v=2"));
        assert_eq!(welcome.base.as_deref(), Some("content/"));
        assert_eq!(welcome.scorm_type, ScormType::Sco);
        assert_eq!(welcome.files, vec!["welcome.html".to_string()]);
        assert_eq!(welcome.dependencies, vec!["shared".to_string()]);

        let quiz = manifest.resource("res_2").unwrap();
        assert_eq!(quiz.scorm_type, ScormType::Sco);
        assert_eq!(quiz.base.as_deref(), Some("content/quiz/"));

        let shared = manifest.resource("shared").unwrap();
        assert_eq!(shared.scorm_type, ScormType::Asset);
        assert_eq!(shared.href, "");
    }

    #[test]
    fn test_unprefixed_and_bom_tolerated() {
        let xml = "\u{FEFF}<manifest identifier=\"m\"><organizations><organization identifier=\"o\">\
                   <item identifier=\"i\" identifierref=\"r\"/></organization></organizations>\
                   <resources><resource identifier=\"r\" scormtype=\"sco\" href=\"a.html\"/></resources></manifest>";
        let manifest = parse(xml.as_bytes()).unwrap();
        assert_eq!(manifest.default_organization_id, "o");
        assert_eq!(manifest.resources[0].scorm_type, ScormType::Sco);
        assert_eq!(manifest.organizations[0].items[0].title, "i");
        assert_eq!(manifest.title, "m");
    }

    #[test]
    fn test_missing_sections() {
        let err = parse(b"<package/>").unwrap_err();
        assert_eq!(err, ParseError::MissingSection("manifest".to_string()));

        let err = parse(b"<manifest><resources/></manifest>").unwrap_err();
        assert_eq!(err, ParseError::MissingSection("organizations".to_string()));

        let err = parse(b"<manifest><organizations/></manifest>").unwrap_err();
        assert_eq!(err, ParseError::MissingSection("resources".to_string()));
    }

    #[test]
    fn test_malformed_xml_reports_position() {
        let err = parse(b"<manifest>\n  <organizations>\n</manifest>").unwrap_err();
        assert!(matches!(err, ParseError::Malformed(position, _) if position.line == 3));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let err = parse(b"<manifest>\n\xFF</manifest>").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Malformed(position, ref reason)
                if position == TextPosition::new(2, 1) && reason.contains("UTF-8")
        ));
    }

    #[test]
    fn test_invalid_prerequisite_is_fatal() {
        let xml = r#"<manifest identifier="m"><organizations><organization identifier="o">
            <item identifier="i" identifierref="r"><prerequisites>a &amp;&amp; b</prerequisites></item>
            </organization></organizations>
            <resources><resource identifier="r" scormtype="sco" href="a.html"/></resources></manifest>"#;
        let err = parse(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidPrerequisite { ref item, .. } if item == "i"));
    }

    #[test]
    fn test_deep_prerequisite_is_rejected_not_fatal_to_process() {
        let script = format!("{}a", "~".repeat(100_000));
        let xml = format!(
            r#"<manifest identifier="m"><organizations><organization identifier="o">
            <item identifier="i" identifierref="r"><prerequisites>{script}</prerequisites></item>
            </organization></organizations>
            <resources><resource identifier="r" scormtype="sco" href="a.html"/></resources></manifest>"#
        );
        let err = parse(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::InvalidPrerequisite { ref item, .. } if item == "i"));
    }

    #[test]
    fn test_deeply_nested_items_are_malformed() {
        let depth = 1_000;
        let xml = format!(
            r#"<manifest identifier="m"><organizations><organization identifier="o">
            {}{}
            </organization></organizations>
            <resources><resource identifier="r" scormtype="sco" href="a.html"/></resources></manifest>"#,
            "<item>".repeat(depth),
            "</item>".repeat(depth)
        );
        let err = parse(xml.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Malformed(_, ref reason) if reason.contains("deeper than 64")
        ));
    }

    #[test]
    fn test_items_nested_within_limit_parse() {
        let depth = MAX_ITEM_DEPTH;
        let xml = format!(
            r#"<manifest identifier="m"><organizations><organization identifier="o">{}<item identifier="leaf" identifierref="r"/>{}</organization></organizations>
            <resources><resource identifier="r" scormtype="sco" href="a.html"/></resources></manifest>"#,
            "<item>".repeat(depth - 1),
            "</item>".repeat(depth - 1)
        );
        let manifest = parse(xml.as_bytes()).unwrap();
        let mut item = &manifest.organizations[0].items[0];
        let mut levels = 1;
        while let Some(child) = item.children.first() {
            item = child;
            levels += 1;
        }
        assert_eq!(levels, MAX_ITEM_DEPTH);
        assert_eq!(item.identifier, "leaf");
    }

    #[test]
    fn test_missing_item_identifier_synthesized() {
        let xml = r#"<manifest identifier="m"><organizations><organization identifier="o">
            <item><title>Folder</title><item identifierref="r"><title>Leaf</title></item></item>
            </organization></organizations>
            <resources><resource identifier="r" scormtype="sco" href="a.html"/></resources></manifest>"#;
        let manifest = parse(xml.as_bytes()).unwrap();
        let folder = &manifest.organizations[0].items[0];
        assert_eq!(folder.identifier, "ITEM-1");
        assert_eq!(folder.children[0].identifier, "ITEM-1.1");
    }

    #[test]
    fn test_unreadable_mastery_ignored() {
        let xml = r#"<manifest identifier="m"><organizations><organization identifier="o">
            <item identifier="i" identifierref="r"><masteryscore>high</masteryscore></item>
            </organization></organizations>
            <resources><resource identifier="r" scormtype="sco" href="a.html"/></resources></manifest>"#;
        let manifest = parse(xml.as_bytes()).unwrap();
        assert_eq!(manifest.organizations[0].items[0].mastery_score, None);
    }

    #[test]
    fn test_schema_detection_by_version_text() {
        let xml = r#"<manifest identifier="m"><metadata><schemaversion>2004 4th Edition</schemaversion></metadata>
            <organizations/><resources/></manifest>"#;
        let manifest = parse(xml.as_bytes()).unwrap();
        assert_eq!(manifest.schema_version, SchemaVersion::Scorm2004);
        assert_eq!(manifest.edition.as_deref(), Some("2004 4th Edition"));

        let xml = r#"<manifest identifier="m"><metadata><schemaversion>CAM 1.3</schemaversion></metadata>
            <organizations/><resources/></manifest>"#;
        assert_eq!(parse(xml.as_bytes()).unwrap().schema_version, SchemaVersion::Scorm2004);
    }

    #[test]
    fn test_schema_detection_by_sequencing_namespace() {
        let xml = r#"<manifest identifier="m" xmlns:imsss="http://www.imsglobal.org/xsd/imsss">
            <organizations><organization identifier="o">
              <item identifier="i" identifierref="r"><imsss:sequencing/></item>
            </organization></organizations>
            <resources><resource identifier="r" scormType="sco" href="a.html"/></resources></manifest>"#;
        assert_eq!(parse(xml.as_bytes()).unwrap().schema_version, SchemaVersion::Scorm2004);
    }

    #[test]
    fn test_schema_override() {
        let options = ParseOptions {
            schema: SchemaDetection::Scorm2004,
        };
        let manifest = parse_with(SCORM12.as_bytes(), options).unwrap();
        assert_eq!(manifest.schema_version, SchemaVersion::Scorm2004);
    }

    #[test]
    fn test_metadata_lom_title() {
        let xml = r#"<manifest identifier="m"><metadata><lom><general><title>
              <langstring xml:lang="en">  Fire   Safety </langstring></title></general></lom></metadata>
            <organizations default="o"><organization identifier="o"><title>Org</title></organization></organizations>
            <resources/></manifest>"#;
        assert_eq!(parse(xml.as_bytes()).unwrap().title, "Fire Safety");
    }

    #[test]
    fn test_join_base() {
        assert_eq!(join_base(None, None), None);
        assert_eq!(join_base(Some("a/"), Some("b/")).as_deref(), Some("a/b/"));
        assert_eq!(join_base(Some("a"), Some("b/")).as_deref(), Some("a/b/"));
        assert_eq!(join_base(Some("a/"), Some("http://cdn/x/")).as_deref(), Some("http://cdn/x/"));
        assert_eq!(join_base(Some("a/"), None).as_deref(), Some("a/"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let first = serde_json::to_string(&parse(SCORM12.as_bytes()).unwrap()).unwrap();
        let second = serde_json::to_string(&parse(SCORM12.as_bytes()).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
