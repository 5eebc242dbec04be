use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};
use serde::Deserialize;

use crate::migrate::replacement::{NodeReplacement, Replacement, RuleError};
use crate::migrate::tree::{Link, LogicNode, LogicTree, Socket};

const DEFAULT_REGISTRY_JSON: &str = include_str!("../assets/logic-node-registry.json");

/// Longest chain of rules followed for one node.
const MAX_CHAIN: usize = 16;

/// Node-specific update contract that needs more than a declarative rule.
/// Returning `Ok(None)` falls back to the class's rules.
pub type UpdateHook = fn(&Registry, &mut LogicTree, &LogicNode) -> Result<Option<Replacement>, RuleError>;

#[derive(Debug, Clone, Deserialize)]
struct RawRegistry {
    #[serde(rename = "schemaVersion")]
    #[allow(dead_code)]
    pub schema_version: u32,
    #[serde(rename = "socketTypeCompatibility", default)]
    pub socket_type_compatibility: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub classes: Vec<NodeClass>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeClass {
    #[serde(rename = "type")]
    pub node_type: String,
    /// Kept raw: a class without an integer version is reported, not rejected.
    #[serde(default)]
    pub version: serde_json::Value,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub properties: indexmap::IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub inputs: Vec<Socket>,
    #[serde(default)]
    pub outputs: Vec<Socket>,
    #[serde(default)]
    pub replacements: Vec<ReplacementDef>,
}

/// Update routine for a set of saved versions: either identity or a rule
/// whose source is filled in from the node.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplacementDef {
    pub from_versions: Vec<i64>,
    #[serde(default)]
    pub identity: bool,
    #[serde(default)]
    pub rule: Option<NodeReplacement>,
}

impl NodeClass {
    pub fn current_version(&self) -> Option<i64> {
        self.version.as_i64()
    }

    /// A fresh instance with the class's default sockets and properties.
    pub fn instantiate(&self) -> Option<LogicNode> {
        Some(LogicNode {
            node_type: self.node_type.clone(),
            version: self.current_version()?,
            properties: self.properties.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            ..LogicNode::default()
        })
    }

    fn rule_for(&self, node_type: &str, version: i64, node: Option<&LogicNode>) -> Result<NodeReplacement, RuleError> {
        let def = self
            .replacements
            .iter()
            .find(|d| d.from_versions.contains(&version))
            .ok_or_else(|| RuleError::Mismatch(format!("no update routine for {node_type} v{version}")))?;
        let current = self
            .current_version()
            .ok_or_else(|| RuleError::Mismatch(format!("{node_type} has no integer version")))?;
        if def.identity {
            return Ok(match node {
                Some(n) => NodeReplacement::identity(n, current),
                None => NodeReplacement {
                    from_node: node_type.to_string(),
                    from_version: version,
                    to_node: node_type.to_string(),
                    to_version: current,
                    in_sockets: (0..self.inputs.len()).map(|i| (i, i)).collect(),
                    out_sockets: (0..self.outputs.len()).map(|i| (i, i)).collect(),
                    properties: self.properties.keys().map(|k| (k.clone(), k.clone())).collect(),
                    ..NodeReplacement::default()
                },
            });
        }
        let mut rule = def
            .rule
            .clone()
            .ok_or_else(|| RuleError::Failed(format!("update routine for {node_type} v{version} is empty")))?;
        rule.from_node = node_type.to_string();
        rule.from_version = version;
        Ok(rule)
    }
}

pub struct Registry {
    pub classes: HashMap<String, NodeClass>,
    pub socket_type_compatibility: HashMap<String, Vec<String>>,
    hooks: HashMap<String, UpdateHook>,
}

pub fn load_default_registry() -> Result<Registry> {
    let mut registry = Registry::from_json_str(DEFAULT_REGISTRY_JSON)
        .map_err(|e| anyhow!("failed to parse assets/logic-node-registry.json: {e}"))?;
    registry.register_hook("LNShowMouseNode", show_mouse_update);
    Ok(registry)
}

impl Registry {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawRegistry = serde_json::from_str(text)?;
        Ok(Self {
            classes: raw.classes.into_iter().map(|c| (c.node_type.clone(), c)).collect(),
            socket_type_compatibility: raw.socket_type_compatibility,
            hooks: HashMap::new(),
        })
    }

    pub fn register_hook(&mut self, node_type: &str, hook: UpdateHook) {
        self.hooks.insert(node_type.to_string(), hook);
    }

    pub fn class(&self, node_type: &str) -> Option<&NodeClass> {
        self.classes.get(node_type)
    }

    pub fn instantiate(&self, node_type: &str) -> Option<LogicNode> {
        self.class(node_type)?.instantiate()
    }

    /// Runs the node's update contract: its hook if one is registered,
    /// otherwise its class rules, chained until the target class is current.
    pub fn replacement_for(&self, tree: &mut LogicTree, node: &LogicNode) -> Result<Replacement, RuleError> {
        if let Some(hook) = self.hooks.get(&node.node_type) {
            match hook(self, tree, node)? {
                Some(Replacement::Rule(rule)) => return Ok(Replacement::Rule(self.chain_to_current(rule)?)),
                Some(nodes) => return Ok(nodes),
                None => {}
            }
        }
        let class = self
            .class(&node.node_type)
            .ok_or_else(|| RuleError::Mismatch(format!("class {} is not registered", node.node_type)))?;
        let rule = class.rule_for(&node.node_type, node.version, Some(node))?;
        Ok(Replacement::Rule(self.chain_to_current(rule)?))
    }

    /// Chains follow-up rules while the rule's target class has moved on.
    fn chain_to_current(&self, mut rule: NodeReplacement) -> Result<NodeReplacement, RuleError> {
        for _ in 0..MAX_CHAIN {
            let Some(target) = self.class(&rule.to_node) else {
                return Ok(rule);
            };
            match target.current_version() {
                Some(v) if v > rule.to_version => {
                    let next = target.rule_for(&rule.to_node, rule.to_version, None)?;
                    rule.chain_with(&next)?;
                }
                _ => return Ok(rule),
            }
        }
        Err(RuleError::Chain(format!("{} keeps migrating past {MAX_CHAIN} steps", rule.from_node)))
    }
}

/// Show Mouse became Set Cursor State with the flag inverted. A constant
/// flag fits a rule; a linked one needs a Not node in between.
fn show_mouse_update(registry: &Registry, tree: &mut LogicTree, node: &LogicNode) -> Result<Option<Replacement>, RuleError> {
    if !matches!(node.version, 0 | 1) {
        return Err(RuleError::Mismatch(format!("no update routine for LNShowMouseNode v{}", node.version)));
    }
    let instantiate = |ty: &str| {
        registry
            .instantiate(ty)
            .ok_or_else(|| RuleError::Mismatch(format!("class {ty} is not registered")))
    };

    let Some(show_link) = tree.input_link(&node.id, 1).cloned() else {
        let show = node.inputs.get(1).and_then(|s| s.default.as_bool()).unwrap_or(false);
        return Ok(Some(Replacement::Rule(NodeReplacement {
            from_node: node.node_type.clone(),
            from_version: node.version,
            to_node: "LNSetCursorStateNode".into(),
            to_version: 1,
            // Input 1 is covered by the inverted default
            in_sockets: [(0, 0)].into_iter().collect(),
            out_sockets: [(0, 0)].into_iter().collect(),
            input_defaults: [(1, serde_json::Value::Bool(!show))].into_iter().collect(),
            property_defaults: [("property0".to_string(), "Hide".into())].into_iter().collect(),
            ..NodeReplacement::default()
        })));
    };

    let mut main = instantiate("LNSetCursorStateNode")?;
    main.id = tree.fresh_id(&node.id);
    main.properties.insert("property0".into(), "Hide".into());
    let main_id = main.id.clone();
    tree.insert_after(Some(&node.id), main);

    let mut not = instantiate("LNNotNode")?;
    not.id = tree.fresh_id(&node.id);
    let not_id = not.id.clone();
    tree.insert_after(Some(&main_id), not);

    let mut links = Vec::new();
    if let Some(action) = tree.input_link(&node.id, 0) {
        links.push(Link { to_node: main_id.clone(), to_socket: 0, ..action.clone() });
    }
    links.push(Link { to_node: not_id.clone(), to_socket: 0, ..show_link });
    links.push(Link { from_node: not_id.clone(), from_socket: 0, to_node: main_id.clone(), to_socket: 1 });
    links.extend(tree.output_links(&node.id, 0).map(|l| Link { from_node: main_id.clone(), from_socket: 0, ..l.clone() }));
    for l in links {
        tree.connect(l);
    }
    Ok(Some(Replacement::Nodes(vec![main_id, not_id])))
}

fn socket_types_compatible(from: &str, to: &str, table: &HashMap<String, Vec<String>>) -> bool {
    // Untyped sockets and `any` match everything
    if from.is_empty() || to.is_empty() || from == "any" || to == "any" || from == to {
        return true;
    }
    table.get(to).is_some_and(|allowed| allowed.iter().any(|s| s == from))
}

pub fn validate_tree(tree: &LogicTree) -> Result<()> {
    let registry = load_default_registry()?;
    validate_tree_against(tree, &registry)
}

/// Checks that every link joins existing sockets of compatible types.
/// Unknown node types are left to migration, which reports them.
pub fn validate_tree_against(tree: &LogicTree, registry: &Registry) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    for l in &tree.links {
        let Some(from) = tree.node(&l.from_node) else {
            errors.push(format!("link references missing node '{}'", l.from_node));
            continue;
        };
        let Some(to) = tree.node(&l.to_node) else {
            errors.push(format!("link references missing node '{}'", l.to_node));
            continue;
        };
        let Some(out) = from.outputs.get(l.from_socket) else {
            errors.push(format!("link uses unknown output {}.{} (type {})", from.id, l.from_socket, from.node_type));
            continue;
        };
        let Some(inp) = to.inputs.get(l.to_socket) else {
            errors.push(format!("link uses unknown input {}.{} (type {})", to.id, l.to_socket, to.node_type));
            continue;
        };
        if !socket_types_compatible(&out.socket_type, &inp.socket_type, &registry.socket_type_compatibility) {
            errors.push(format!(
                "link type mismatch: '{}.{}' ({}) -> '{}.{}' ({})",
                from.id, l.from_socket, out.socket_type, to.id, l.to_socket, inp.socket_type
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!(
            "tree '{}' failed validation ({} error(s)):\n- {}",
            tree.name,
            errors.len(),
            errors.join("\n- ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::tree::test_utils::*;
    use serde_json::json;

    #[test]
    fn bundled_registry_loads() {
        let r = load_default_registry().unwrap();
        assert_eq!(r.class("LNMergedKeyboardNode").and_then(NodeClass::current_version), Some(2));
        assert!(r.class("LNShowMouseNode").unwrap().deprecated);
        let n = r.instantiate("LNAddRigidBodyNode").unwrap();
        assert_eq!(n.inputs.len(), 9);
        assert_eq!(n.properties["property0"], json!("Box"));
    }

    #[test]
    fn gamepad_rule_targets_merged_node() {
        let r = load_default_registry().unwrap();
        let mut t = tree("T", vec![], vec![]);
        let node = logic_node("pad", "LNOnGamepadNode", 1);
        match r.replacement_for(&mut t, &node).unwrap() {
            Replacement::Rule(rule) => {
                assert_eq!(rule.to_node, "LNMergedGamepadNode");
                assert_eq!(rule.from_version, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        let future = logic_node("pad", "LNOnGamepadNode", 5);
        assert!(matches!(r.replacement_for(&mut t, &future), Err(RuleError::Mismatch(_))));
    }

    #[test]
    fn rules_chain_to_the_current_version() {
        let r = Registry::from_json_str(
            r#"{"schemaVersion": 1, "classes": [
                {"type": "Old", "version": 1, "replacements": [{"from_versions": [0],
                    "rule": {"to_node": "New", "to_version": 1, "in_sockets": {"0": 0}}}]},
                {"type": "New", "version": 2, "replacements": [{"from_versions": [1],
                    "rule": {"to_node": "New", "to_version": 2, "in_sockets": {"0": 1}}}]}
            ]}"#,
        )
        .unwrap();
        let mut t = tree("T", vec![], vec![]);
        let Replacement::Rule(rule) = r.replacement_for(&mut t, &logic_node("a", "Old", 0)).unwrap() else {
            panic!("expected a rule");
        };
        assert_eq!((rule.to_node.as_str(), rule.to_version), ("New", 2));
        assert_eq!(rule.in_sockets.get(&0), Some(&1));
    }

    #[test]
    fn show_mouse_with_constant_flag_inverts_it() {
        let r = load_default_registry().unwrap();
        let mut node = logic_node("m", "LNShowMouseNode", 1);
        node.inputs = vec![socket("In", json!(null)), socket("Show", json!(true))];
        let mut t = tree("T", vec![node.clone()], vec![]);
        let Replacement::Rule(rule) = r.replacement_for(&mut t, &node).unwrap() else {
            panic!("expected a rule");
        };
        assert_eq!(rule.input_defaults.get(&1), Some(&json!(false)));
        assert_eq!(rule.property_defaults["property0"], json!("Hide"));
    }

    #[test]
    fn show_mouse_with_linked_flag_builds_not_node() {
        let r = load_default_registry().unwrap();
        let mut node = logic_node("m", "LNShowMouseNode", 1);
        node.inputs = vec![socket("In", json!(null)), socket("Show", json!(true))];
        node.outputs = vec![socket("Out", json!(null))];
        let mut t = tree(
            "T",
            vec![logic_node("ev", "LNOnUpdateNode", 1), logic_node("flag", "LNNotNode", 1), node.clone()],
            vec![link("ev", 0, "m", 0), link("flag", 0, "m", 1)],
        );
        let Replacement::Nodes(ids) = r.replacement_for(&mut t, &node).unwrap() else {
            panic!("expected new nodes");
        };
        assert_eq!(ids, ["m.001", "m.002"]);
        assert!(t.links.contains(&link("ev", 0, "m.001", 0)));
        assert!(t.links.contains(&link("flag", 0, "m.002", 0)));
        assert!(t.links.contains(&link("m.002", 0, "m.001", 1)));
    }

    #[test]
    fn validation_reports_bad_links() {
        let r = load_default_registry().unwrap();
        let mut a = logic_node("a", "LNNotNode", 1);
        a.outputs = vec![Socket { name: "Bool Out".into(), socket_type: "BOOLEAN".into(), default: json!(false) }];
        let mut b = logic_node("b", "X", 1);
        b.inputs = vec![Socket { name: "Obj".into(), socket_type: "OBJECT".into(), default: json!(null) }];
        let t = tree("T", vec![a, b], vec![link("a", 0, "b", 0), link("a", 3, "b", 0), link("zz", 0, "b", 0)]);
        let err = validate_tree_against(&t, &r).unwrap_err().to_string();
        assert!(err.contains("3 error(s)"));
        assert!(err.contains("type mismatch"));
        assert!(err.contains("missing node 'zz'"));
    }
}
