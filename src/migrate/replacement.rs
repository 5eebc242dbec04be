//! Declarative replacement rules and their application to a tree.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tree::{Link, LogicNode, LogicTree};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The rule (or its target class) does not fit the node.
    #[error("the provided replacement doesn't correspond to the node needing replacement: {0}")]
    Mismatch(String),
    #[error("replacement rules could not be chained: {0}")]
    Chain(String),
    #[error("{0}")]
    Failed(String),
}

/// Maps an outdated node onto the current shape of (possibly another) class.
///
/// Socket maps go old index to new index; property maps go old name to new
/// name. Defaults apply first and are overridden by mapped values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeReplacement {
    pub from_node: String,
    pub from_version: i64,
    pub to_node: String,
    pub to_version: i64,
    pub in_sockets: IndexMap<usize, usize>,
    pub out_sockets: IndexMap<usize, usize>,
    pub properties: IndexMap<String, String>,
    pub input_defaults: IndexMap<usize, serde_json::Value>,
    pub property_defaults: IndexMap<String, serde_json::Value>,
}

/// What a node's update contract hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    Rule(NodeReplacement),
    /// Nodes already inserted and wired by the contract; only cosmetics are
    /// copied onto them before the old node goes.
    Nodes(Vec<String>),
}

impl NodeReplacement {
    /// Same class, current version, every socket and property kept in place.
    pub fn identity(node: &LogicNode, class_version: i64) -> Self {
        Self {
            from_node: node.node_type.clone(),
            from_version: node.version,
            to_node: node.node_type.clone(),
            to_version: class_version,
            in_sockets: (0..node.inputs.len()).map(|i| (i, i)).collect(),
            out_sockets: (0..node.outputs.len()).map(|i| (i, i)).collect(),
            properties: node.properties.keys().map(|k| (k.clone(), k.clone())).collect(),
            ..Self::default()
        }
    }

    /// Appends `next` so one rule migrates straight to `next`'s target.
    /// Sockets and properties that `next` drops are dropped.
    pub fn chain_with(&mut self, next: &NodeReplacement) -> Result<(), RuleError> {
        if self.to_node != next.from_node || self.to_version != next.from_version {
            return Err(RuleError::Chain(format!(
                "{} v{} does not continue into {} v{}",
                self.to_node, self.to_version, next.from_node, next.from_version
            )));
        }
        self.to_node = next.to_node.clone();
        self.to_version = next.to_version;

        self.in_sockets = compose(&self.in_sockets, &next.in_sockets);
        self.out_sockets = compose(&self.out_sockets, &next.out_sockets);
        self.properties = compose(&self.properties, &next.properties);

        let mut input_defaults = next.input_defaults.clone();
        for (i, v) in &self.input_defaults {
            if let Some(j) = next.in_sockets.get(i) {
                input_defaults.insert(*j, v.clone());
            }
        }
        self.input_defaults = input_defaults;

        let mut property_defaults = next.property_defaults.clone();
        for (p, v) in &self.property_defaults {
            if let Some(q) = next.properties.get(p) {
                property_defaults.insert(q.clone(), v.clone());
            }
        }
        self.property_defaults = property_defaults;
        Ok(())
    }

    /// Replaces `old_id` in `tree` with `new_node`, an instance of the target
    /// class. The tree is untouched on error.
    pub fn apply(&self, tree: &mut LogicTree, old_id: &str, mut new_node: LogicNode) -> Result<String, RuleError> {
        let old = tree
            .node(old_id)
            .ok_or_else(|| RuleError::Failed(format!("node '{old_id}' is not in tree '{}'", tree.name)))?
            .clone();
        if old.node_type != self.from_node || old.version != self.from_version {
            return Err(RuleError::Mismatch(format!(
                "rule migrates {} v{}, node is {} v{}",
                self.from_node, self.from_version, old.node_type, old.version
            )));
        }
        if new_node.node_type != self.to_node || new_node.version != self.to_version {
            return Err(RuleError::Mismatch(format!(
                "rule targets {} v{}, class is {} v{}",
                self.to_node, self.to_version, new_node.node_type, new_node.version
            )));
        }

        new_node.id = tree.fresh_id(&old.id);
        new_node.copy_cosmetics_from(&old);

        for (prop, value) in &self.property_defaults {
            new_node.properties.insert(prop.clone(), value.clone());
        }
        for (i, value) in &self.input_defaults {
            let socket = new_node
                .inputs
                .get_mut(*i)
                .ok_or_else(|| RuleError::Failed(format!("input default for socket {i} out of range")))?;
            if socket.has_default() {
                socket.default = value.clone();
            }
        }
        for (src, dst) in &self.properties {
            let value = old
                .properties
                .get(src)
                .ok_or_else(|| RuleError::Failed(format!("node has no property '{src}'")))?;
            new_node.properties.insert(dst.clone(), value.clone());
        }

        let mut links = Vec::new();
        for (src, dst) in &self.in_sockets {
            let old_socket = old
                .inputs
                .get(*src)
                .ok_or_else(|| RuleError::Failed(format!("input socket {src} out of range on the old node")))?;
            let new_socket = new_node
                .inputs
                .get_mut(*dst)
                .ok_or_else(|| RuleError::Failed(format!("input socket {dst} out of range on the new node")))?;
            match tree.input_link(&old.id, *src) {
                Some(l) => links.push(Link {
                    from_node: l.from_node.clone(),
                    from_socket: l.from_socket,
                    to_node: new_node.id.clone(),
                    to_socket: *dst,
                }),
                None if new_socket.has_default() => new_socket.default = old_socket.default.clone(),
                None => {}
            }
        }
        for (src, dst) in &self.out_sockets {
            if *src >= old.outputs.len() || *dst >= new_node.outputs.len() {
                return Err(RuleError::Failed(format!("output socket mapping {src} -> {dst} out of range")));
            }
            links.extend(tree.output_links(&old.id, *src).map(|l| Link {
                from_node: new_node.id.clone(),
                from_socket: *dst,
                to_node: l.to_node.clone(),
                to_socket: l.to_socket,
            }));
        }

        let new_id = new_node.id.clone();
        tree.insert_after(Some(&old.id), new_node);
        for l in links {
            tree.connect(l);
        }
        tree.remove_node(&old.id);
        Ok(new_id)
    }
}

fn compose<K, V>(first: &IndexMap<K, V>, second: &IndexMap<V, V>) -> IndexMap<K, V>
where
    K: Clone + std::hash::Hash + Eq,
    V: Clone + std::hash::Hash + Eq,
{
    first
        .iter()
        .filter_map(|(k, mid)| second.get(mid).map(|v| (k.clone(), v.clone())))
        .collect()
}

/// Moves cosmetics from `old_id` onto contract-built nodes and removes it.
pub fn adopt_nodes(tree: &mut LogicTree, old_id: &str, new_ids: &[String]) -> Result<(), RuleError> {
    let old = tree
        .node(old_id)
        .ok_or_else(|| RuleError::Failed(format!("node '{old_id}' is not in tree '{}'", tree.name)))?
        .clone();
    for id in new_ids {
        let node = tree
            .nodes
            .get_mut(id)
            .ok_or_else(|| RuleError::Failed(format!("replacement node '{id}' was never added")))?;
        node.parent = old.parent.clone();
        node.location = old.location;
        node.select = old.select;
    }
    tree.remove_node(old_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::tree::test_utils::*;
    use serde_json::json;

    fn gamepad_rule() -> NodeReplacement {
        NodeReplacement {
            from_node: "LNOnGamepadNode".into(),
            from_version: 1,
            to_node: "LNMergedGamepadNode".into(),
            to_version: 1,
            in_sockets: [(0, 0)].into_iter().collect(),
            out_sockets: [(0, 0)].into_iter().collect(),
            properties: [("property0".to_string(), "property0".to_string())].into_iter().collect(),
            ..NodeReplacement::default()
        }
    }

    fn old_gamepad() -> LogicNode {
        let mut n = logic_node("pad", "LNOnGamepadNode", 1);
        n.location = [10.0, 20.0];
        n.label = Some("Jump pad".into());
        n.properties.insert("property0".into(), json!("Down"));
        n.inputs = vec![socket("Gamepad", json!(0))];
        n.outputs = vec![socket("Out", json!(null))];
        n
    }

    fn merged_gamepad() -> LogicNode {
        let mut n = logic_node("", "LNMergedGamepadNode", 1);
        n.properties.insert("property0".into(), json!("Started"));
        n.properties.insert("property1".into(), json!("cross"));
        n.inputs = vec![socket("Gamepad", json!(0))];
        n.outputs = vec![socket("Out", json!(null)), socket("Pressed", json!(false))];
        n
    }

    #[test]
    fn identity_keeps_everything_in_place() {
        let r = NodeReplacement::identity(&old_gamepad(), 2);
        assert_eq!(r.from_version, 1);
        assert_eq!(r.to_version, 2);
        assert_eq!(r.in_sockets.get(&0), Some(&0));
        assert_eq!(r.properties.get("property0").map(String::as_str), Some("property0"));
    }

    #[test]
    fn apply_relinks_and_copies_cosmetics() {
        let mut t = tree(
            "Main",
            vec![logic_node("src", "LNGamepadCoords", 1), old_gamepad(), logic_node("dst", "LNPrintNode", 1)],
            vec![link("src", 0, "pad", 0), link("pad", 0, "dst", 0)],
        );
        let new_id = gamepad_rule().apply(&mut t, "pad", merged_gamepad()).unwrap();
        assert_eq!(new_id, "pad.001");
        let n = t.node(&new_id).unwrap();
        assert_eq!(n.location, [10.0, 20.0]);
        assert_eq!(n.label.as_deref(), Some("Jump pad"));
        assert_eq!(n.properties["property0"], json!("Down"));
        assert_eq!(n.properties["property1"], json!("cross"));
        assert!(t.node("pad").is_none());
        assert_eq!(t.links, [link("src", 0, "pad.001", 0), link("pad.001", 0, "dst", 0)]);
        assert_eq!(t.nodes.keys().collect::<Vec<_>>(), ["src", "pad.001", "dst"]);
    }

    #[test]
    fn unlinked_inputs_carry_their_value() {
        let mut old = old_gamepad();
        old.inputs[0].default = json!(3);
        let mut t = tree("Main", vec![old], vec![]);
        let id = gamepad_rule().apply(&mut t, "pad", merged_gamepad()).unwrap();
        assert_eq!(t.node(&id).unwrap().inputs[0].default, json!(3));
    }

    #[test]
    fn mismatched_node_fails_without_touching_the_tree() {
        let mut t = tree("Main", vec![old_gamepad()], vec![]);
        let mut r = gamepad_rule();
        r.from_version = 0;
        let before = t.clone();
        assert!(matches!(r.apply(&mut t, "pad", merged_gamepad()), Err(RuleError::Mismatch(_))));
        r.from_version = 1;
        r.in_sockets.insert(4, 0);
        assert!(matches!(r.apply(&mut t, "pad", merged_gamepad()), Err(RuleError::Failed(_))));
        assert_eq!(t, before);
    }

    #[test]
    fn chaining_composes_maps() {
        let mut first = gamepad_rule();
        first.input_defaults.insert(0, json!(1));
        let second = NodeReplacement {
            from_node: "LNMergedGamepadNode".into(),
            from_version: 1,
            to_node: "LNMergedGamepadNode".into(),
            to_version: 2,
            in_sockets: [(0, 1)].into_iter().collect(),
            out_sockets: [(0, 0)].into_iter().collect(),
            properties: [("property0".to_string(), "property2".to_string())].into_iter().collect(),
            ..NodeReplacement::default()
        };
        first.chain_with(&second).unwrap();
        assert_eq!(first.to_version, 2);
        assert_eq!(first.in_sockets.get(&0), Some(&1));
        assert_eq!(first.properties.get("property0").map(String::as_str), Some("property2"));
        assert_eq!(first.input_defaults.get(&1), Some(&json!(1)));

        let err = first.chain_with(&second).unwrap_err();
        assert!(matches!(err, RuleError::Chain(_)));
    }
}
