//! SCORM 2004 Simple Sequencing normalization.
//!
//! Only the subset expressible as launch prerequisites is honored:
//! `preConditionRule`s whose action is `disabled` or `skip`, with
//! `satisfied`, `completed`, `attempted`, `objectiveStatusKnown` and
//! `always` conditions. Referenced objectives are followed through their
//! `mapInfo` to the item that writes the shared global objective. A rule
//! that fires locks the item, so each rule contributes `NOT(conditions)`.

use std::collections::{BTreeMap, BTreeSet};

use roxmltree::Node;
use tracing::{debug, warn};

use crate::manifest::{Item, Organization};
use crate::parser::{attr, child, display_text, elements_named};
use crate::prerequisite::PrerequisiteExpr;

/// `<sequencing>` content of one item, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct SequencingDefinition {
    pub rules: Vec<PreconditionRule>,
    pub objectives: Vec<Objective>,
    /// `minNormalizedMeasure` of a primary objective satisfied by measure.
    pub mastery_measure: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Combination {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PreconditionRule {
    pub combination: Combination,
    pub conditions: Vec<RuleCondition>,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RuleCondition {
    pub referenced_objective: Option<String>,
    pub negated: bool,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Objective {
    pub id: Option<String>,
    pub primary: bool,
    pub maps: Vec<ObjectiveMap>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ObjectiveMap {
    pub target: String,
    pub read_satisfied: bool,
    pub write_satisfied: bool,
}

// ============================================================================
// Reading
// ============================================================================

pub(crate) fn read(node: Node<'_, '_>) -> SequencingDefinition {
    let mut definition = SequencingDefinition::default();

    if let Some(rules) = child(node, "sequencingRules") {
        definition.rules = elements_named(rules, "preConditionRule")
            .map(read_rule)
            .collect();
    }

    if let Some(objectives) = child(node, "objectives") {
        for element in objectives.children().filter(Node::is_element) {
            let primary = element.tag_name().name().eq_ignore_ascii_case("primaryObjective");
            if !primary && !element.tag_name().name().eq_ignore_ascii_case("objective") {
                continue;
            }
            if primary && flag(element, "satisfiedByMeasure", false) {
                definition.mastery_measure = Some(
                    child(element, "minNormalizedMeasure")
                        .and_then(|m| display_text(m).parse::<f64>().ok())
                        .filter(|m| m.is_finite())
                        .unwrap_or(1.0),
                );
            }
            definition.objectives.push(Objective {
                id: attr(element, "objectiveID").map(str::to_string),
                primary,
                maps: elements_named(element, "mapInfo")
                    .filter_map(|map| {
                        Some(ObjectiveMap {
                            target: attr(map, "targetObjectiveID")?.to_string(),
                            read_satisfied: flag(map, "readSatisfiedStatus", true),
                            write_satisfied: flag(map, "writeSatisfiedStatus", false),
                        })
                    })
                    .collect(),
            });
        }
    }

    definition
}

fn read_rule(node: Node<'_, '_>) -> PreconditionRule {
    let conditions_node = child(node, "ruleConditions");
    let combination = match conditions_node.and_then(|c| attr(c, "conditionCombination")) {
        Some(value) if value.trim().eq_ignore_ascii_case("any") => Combination::Any,
        _ => Combination::All,
    };
    let conditions = conditions_node
        .map(|c| {
            elements_named(c, "ruleCondition")
                .map(|condition| RuleCondition {
                    referenced_objective: attr(condition, "referencedObjective")
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                    negated: attr(condition, "operator").is_some_and(|op| op.trim().eq_ignore_ascii_case("not")),
                    condition: attr(condition, "condition").unwrap_or_default().trim().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    let action = child(node, "ruleAction")
        .and_then(|a| attr(a, "action"))
        .unwrap_or_default()
        .trim()
        .to_string();

    PreconditionRule {
        combination,
        conditions,
        action,
    }
}

fn flag(node: Node<'_, '_>, name: &str, default: bool) -> bool {
    attr(node, name).map_or(default, |v| v.trim().eq_ignore_ascii_case("true"))
}

// ============================================================================
// Normalization
// ============================================================================

/// Rewrites sequencing rules into item prerequisites.
///
/// `definitions` must be in document order: the first item writing a
/// global objective owns it.
pub(crate) fn apply(
    organizations: &mut [Organization],
    definitions: &[(String, SequencingDefinition)],
    known_items: &BTreeSet<String>,
) {
    let mut writers: BTreeMap<&str, &str> = BTreeMap::new();
    for (item_id, definition) in definitions {
        for objective in &definition.objectives {
            for map in objective.maps.iter().filter(|m| m.write_satisfied) {
                writers.entry(map.target.as_str()).or_insert(item_id.as_str());
            }
        }
    }

    let derived: BTreeMap<&str, PrerequisiteExpr> = definitions
        .iter()
        .map(|(item_id, definition)| {
            (
                item_id.as_str(),
                prerequisites_for(item_id, definition, &writers, known_items),
            )
        })
        .filter(|(_, expr)| !expr.is_always())
        .collect();

    for organization in organizations {
        assign(&mut organization.items, &derived);
    }
}

fn assign(items: &mut [Item], derived: &BTreeMap<&str, PrerequisiteExpr>) {
    for item in items {
        if let Some(expr) = derived.get(item.identifier.as_str()) {
            let existing = std::mem::take(&mut item.prerequisites);
            item.prerequisites = PrerequisiteExpr::conjunction([existing, expr.clone()]);
        }
        assign(&mut item.children, derived);
    }
}

fn prerequisites_for(
    item_id: &str,
    definition: &SequencingDefinition,
    writers: &BTreeMap<&str, &str>,
    known_items: &BTreeSet<String>,
) -> PrerequisiteExpr {
    let mut locks = Vec::new();

    'rules: for rule in &definition.rules {
        if !(rule.action.eq_ignore_ascii_case("disabled") || rule.action.eq_ignore_ascii_case("skip")) {
            debug!(item = %item_id, action = %rule.action, "Precondition action has no launch effect");
            continue;
        }

        let mut terms = Vec::with_capacity(rule.conditions.len());
        for condition in &rule.conditions {
            match translate(item_id, condition, definition, writers, known_items) {
                Some(term) => terms.push(term),
                None => continue 'rules,
            }
        }
        if terms.is_empty() {
            continue;
        }

        let fires = match rule.combination {
            Combination::All => PrerequisiteExpr::conjunction(terms),
            Combination::Any => PrerequisiteExpr::disjunction(terms),
        };
        locks.push(PrerequisiteExpr::negate(fires));
    }

    PrerequisiteExpr::conjunction(locks).simplify()
}

fn translate(
    item_id: &str,
    condition: &RuleCondition,
    definition: &SequencingDefinition,
    writers: &BTreeMap<&str, &str>,
    known_items: &BTreeSet<String>,
) -> Option<PrerequisiteExpr> {
    let kind = condition.condition.to_ascii_lowercase();

    let term = if kind == "always" {
        PrerequisiteExpr::Always
    } else {
        let Some(target) = resolve_target(
            item_id,
            condition.referenced_objective.as_deref(),
            definition,
            writers,
            known_items,
        ) else {
            debug!(item = %item_id, condition = %condition.condition, "Rule refers to the item's own objective; ignored");
            return None;
        };
        match kind.as_str() {
            "satisfied" => PrerequisiteExpr::Passed(target),
            "completed" => PrerequisiteExpr::Completed(target),
            "attempted" | "activityprogressknown" => PrerequisiteExpr::Attempted(target),
            "objectivestatusknown" => PrerequisiteExpr::Or(vec![
                PrerequisiteExpr::Passed(target.clone()),
                PrerequisiteExpr::Failed(target),
            ]),
            _ => {
                warn!(
                    item = %item_id,
                    condition = %condition.condition,
                    "Unsupported sequencing condition; rule ignored"
                );
                return None;
            }
        }
    };

    Some(if condition.negated {
        PrerequisiteExpr::negate(term)
    } else {
        term
    })
}

/// Item whose status a condition observes. `None` means the item itself.
fn resolve_target(
    item_id: &str,
    referenced: Option<&str>,
    definition: &SequencingDefinition,
    writers: &BTreeMap<&str, &str>,
    known_items: &BTreeSet<String>,
) -> Option<String> {
    let referenced = referenced?;

    let Some(objective) = definition
        .objectives
        .iter()
        .find(|o| o.id.as_deref() == Some(referenced))
    else {
        // Undeclared objective: accept a direct item reference, otherwise
        // keep the name so validation reports it as unknown.
        return (referenced != item_id).then(|| referenced.to_string());
    };

    let readable: Vec<&ObjectiveMap> = objective.maps.iter().filter(|m| m.read_satisfied).collect();
    if let Some(writer) = readable
        .iter()
        .find_map(|map| writers.get(map.target.as_str()).copied())
        .filter(|writer| *writer != item_id)
    {
        return Some(writer.to_string());
    }
    if let Some(map) = readable.first() {
        if writers.get(map.target.as_str()).is_some_and(|w| *w == item_id) {
            return None;
        }
        return Some(map.target.clone());
    }

    if known_items.contains(referenced) && referenced != item_id {
        return Some(referenced.to_string());
    }
    None
}
