//! Logic-tree document: node arena keyed by node id, links by socket index.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Socket types without a default value.
const VALUELESS_SOCKETS: [&str; 2] = ["SHADER", "NONE"];

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Socket {
    pub name: String,
    pub socket_type: String,
    pub default: serde_json::Value,
}

impl Socket {
    pub fn has_default(&self) -> bool {
        !VALUELESS_SOCKETS.contains(&self.socket_type.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LogicNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Version the node was saved with.
    pub version: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub location: [f32; 2],
    /// Enclosing frame node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<[f32; 3]>,
    pub select: bool,
    pub properties: IndexMap<String, serde_json::Value>,
    pub inputs: Vec<Socket>,
    pub outputs: Vec<Socket>,
}

impl LogicNode {
    /// Copies what the user sees but the node class does not define.
    pub fn copy_cosmetics_from(&mut self, other: &LogicNode) {
        self.name = other.name.clone();
        self.label = other.label.clone();
        self.location = other.location;
        self.parent = other.parent.clone();
        self.color = other.color;
        self.select = other.select;
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Link {
    pub from_node: String,
    pub from_socket: usize,
    pub to_node: String,
    pub to_socket: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct LogicTree {
    pub name: String,
    #[serde(with = "node_list")]
    pub nodes: IndexMap<String, LogicNode>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Nodes are a list on disk and an id-keyed map in memory.
mod node_list {
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::LogicNode;

    pub fn serialize<S: Serializer>(nodes: &IndexMap<String, LogicNode>, s: S) -> Result<S::Ok, S::Error> {
        nodes.values().collect::<Vec<_>>().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<IndexMap<String, LogicNode>, D::Error> {
        let list = Vec::<LogicNode>::deserialize(d)?;
        Ok(list.into_iter().map(|n| (n.id.clone(), n)).collect())
    }
}

impl LogicTree {
    pub fn node(&self, id: &str) -> Option<&LogicNode> {
        self.nodes.get(id)
    }

    /// The link feeding input `socket` of `node`. Inputs take one link.
    pub fn input_link(&self, node: &str, socket: usize) -> Option<&Link> {
        self.links.iter().find(|l| l.to_node == node && l.to_socket == socket)
    }

    pub fn output_links(&self, node: &str, socket: usize) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(move |l| l.from_node == node && l.from_socket == socket)
    }

    /// A node id not used in this tree, derived from `base`.
    pub fn fresh_id(&self, base: &str) -> String {
        (1..)
            .map(|i| format!("{base}.{i:03}"))
            .find(|id| !self.nodes.contains_key(id))
            .unwrap_or_else(|| base.to_string())
    }

    /// Adds a node right after `anchor` (or at the end), keeping file order stable.
    pub fn insert_after(&mut self, anchor: Option<&str>, node: LogicNode) {
        let at = anchor.and_then(|a| self.nodes.get_index_of(a)).map_or(self.nodes.len(), |i| i + 1);
        self.nodes.shift_insert(at, node.id.clone(), node);
    }

    /// Links `from` to input `to`, replacing whatever fed that input before.
    pub fn connect(&mut self, link: Link) {
        self.links.retain(|l| !(l.to_node == link.to_node && l.to_socket == link.to_socket));
        self.links.push(link);
    }

    /// Removes a node together with every link touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<LogicNode> {
        self.links.retain(|l| l.from_node != id && l.to_node != id);
        self.nodes.shift_remove(id)
    }
}

/// A saved file's worth of logic trees.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct LogicDoc {
    #[serde(default)]
    pub trees: Vec<LogicTree>,
}

pub fn load_logic_doc_from_str(text: &str) -> Result<LogicDoc> {
    serde_json::from_str(text).context("failed to parse logic tree json")
}

pub fn load_logic_doc_from_path(path: impl AsRef<Path>) -> Result<LogicDoc> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read logic tree json at {}", path.display()))?;
    load_logic_doc_from_str(&text).with_context(|| format!("invalid logic tree in {}", path.display()))
}
