//! Brings saved logic trees up to the current node class versions.

pub mod replacement;
pub mod report;
pub mod tree;

use std::cmp::Ordering;

use crate::schema::Registry;
use replacement::{Replacement, RuleError, adopt_nodes};
use report::ReplacementError;
use tree::{LogicDoc, LogicNode, LogicTree};

#[derive(Debug, Default)]
pub struct MigrationOutcome {
    /// `(old id, new id)` per replaced node; contract-built groups list their first node.
    pub replaced: Vec<(String, String)>,
    pub errors: Vec<ReplacementError>,
}

impl MigrationOutcome {
    fn merge(&mut self, other: MigrationOutcome) {
        self.replaced.extend(other.replaced);
        self.errors.extend(other.errors);
    }
}

/// Updates every outdated node in `tree`. A failing node is recorded and
/// left as it was; the rest of the tree still migrates.
pub fn migrate_tree(tree: &mut LogicTree, registry: &Registry) -> MigrationOutcome {
    let mut outcome = MigrationOutcome::default();
    let ids: Vec<String> = tree.nodes.keys().cloned().collect();

    for id in ids {
        let Some(node) = tree.node(&id).cloned() else {
            continue;
        };
        let tree_name = tree.name.clone();
        let Some(class) = registry.class(&node.node_type) else {
            outcome.errors.push(ReplacementError::Unregistered {
                node_id: id,
                node_type: node.node_type,
                tree: tree_name,
            });
            continue;
        };
        let Some(current) = class.current_version() else {
            outcome.errors.push(ReplacementError::BadVersion {
                node_id: id,
                node_type: node.node_type,
                tree: tree_name,
            });
            continue;
        };

        match node.version.cmp(&current) {
            Ordering::Equal => {}
            Ordering::Greater => outcome.errors.push(ReplacementError::FutureVersion {
                node_id: id,
                node_type: node.node_type,
                tree: tree_name,
            }),
            Ordering::Less => {
                let before = tree.clone();
                match replace_node(tree, registry, &node) {
                    Ok(new_id) => {
                        log::debug!("[migrate] {} v{} -> {new_id} in '{tree_name}'", node.id, node.version);
                        outcome.replaced.push((id, new_id));
                    }
                    Err(e) => {
                        *tree = before;
                        log::warn!("[migrate] failed to update {} ({}): {e}", id, node.node_type);
                        outcome.errors.push(match e {
                            RuleError::Mismatch(detail) => ReplacementError::UpdateFailed {
                                node_id: id,
                                node_type: node.node_type,
                                tree: tree_name,
                                detail,
                            },
                            other => ReplacementError::Misc {
                                node_id: id,
                                node_type: node.node_type,
                                tree: tree_name,
                                detail: other.to_string(),
                            },
                        });
                    }
                }
            }
        }
    }
    outcome
}

fn replace_node(tree: &mut LogicTree, registry: &Registry, node: &LogicNode) -> Result<String, RuleError> {
    match registry.replacement_for(tree, node)? {
        Replacement::Rule(rule) => {
            let new_node = registry
                .instantiate(&rule.to_node)
                .ok_or_else(|| RuleError::Mismatch(format!("target class {} is not registered", rule.to_node)))?;
            rule.apply(tree, &node.id, new_node)
        }
        Replacement::Nodes(ids) => {
            adopt_nodes(tree, &node.id, &ids)?;
            ids.into_iter()
                .next()
                .ok_or_else(|| RuleError::Failed("update contract produced no nodes".into()))
        }
    }
}

pub fn migrate_doc(doc: &mut LogicDoc, registry: &Registry) -> MigrationOutcome {
    let mut outcome = MigrationOutcome::default();
    for tree in &mut doc.trees {
        outcome.merge(migrate_tree(tree, registry));
    }
    log::info!(
        "[migrate] updated {} node(s) in {} tree(s), {} failure(s)",
        outcome.replaced.len(),
        doc.trees.len(),
        outcome.errors.len()
    );
    outcome
}
