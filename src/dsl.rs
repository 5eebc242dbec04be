//! Material document model.
//!
//! A document is an arena of node trees: `trees[0]` is the material tree and
//! every following entry is a group tree referenced by name from `GROUP`
//! nodes. Links are stored as index tuples, so nothing in the graph owns or
//! points at anything else.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MaterialDoc {
    pub name: String,
    #[serde(default)]
    pub settings: MaterialSettings,
    pub trees: Vec<NodeTree>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct NodeTree {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Node {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub inputs: Vec<Socket>,
    #[serde(default)]
    pub outputs: Vec<Socket>,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    /// Group tree name for `GROUP` nodes.
    #[serde(default, rename = "nodeTree")]
    pub node_tree: Option<String>,
    /// Exposed as a runtime material parameter (uniform) instead of a constant.
    #[serde(default, rename = "materialParam")]
    pub material_param: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Socket {
    pub name: String,
    #[serde(rename = "type")]
    pub socket_type: SocketType,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SocketType {
    Value,
    Int,
    Rgb,
    Rgba,
    Vector,
    Shader,
    String,
    Boolean,
}

impl SocketType {
    pub fn is_vector_like(self) -> bool {
        matches!(self, SocketType::Rgb | SocketType::Rgba | SocketType::Vector)
    }

    pub fn is_value_like(self) -> bool {
        matches!(self, SocketType::Value | SocketType::Int)
    }

    /// Shader-language type the resolver produces for this socket.
    pub fn glsl_type(self) -> &'static str {
        if self.is_vector_like() { "vec3" } else { "float" }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub from_node: usize,
    pub from_socket: usize,
    pub to_node: usize,
    pub to_socket: usize,
}

/// Handle to a node inside the document arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub tree: usize,
    pub node: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Billboard {
    #[default]
    Off,
    Spherical,
    Cylindrical,
}

/// Per-material settings that gate code paths in the pass scripts.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MaterialSettings {
    pub blending: bool,
    pub blend_source: String,
    pub blend_destination: String,
    pub blend_operation: String,
    pub blend_source_alpha: String,
    pub blend_destination_alpha: String,
    pub blend_operation_alpha: String,
    pub depth_write: bool,
    pub compare_mode: String,
    pub cull_mode: String,
    pub depth_read: bool,
    pub discard: bool,
    pub discard_opacity: f32,
    pub discard_opacity_shadows: f32,
    pub two_sided: bool,
    pub billboard: Billboard,
    pub particle: bool,
    pub tilesheet: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    pub material_id: i32,
    pub ignore_irradiance: bool,
    pub decal: bool,
    pub overlay: bool,
    pub skip_context: String,
    /// Names of the mesh UV layers, first entry is `tex`, second `tex1`.
    pub uv_layers: Vec<String>,
}

impl Default for MaterialSettings {
    fn default() -> Self {
        Self {
            blending: false,
            blend_source: "blend_one".to_string(),
            blend_destination: "blend_one".to_string(),
            blend_operation: "add".to_string(),
            blend_source_alpha: "blend_one".to_string(),
            blend_destination_alpha: "blend_one".to_string(),
            blend_operation_alpha: "add".to_string(),
            depth_write: true,
            compare_mode: "less".to_string(),
            cull_mode: "clockwise".to_string(),
            depth_read: false,
            discard: false,
            discard_opacity: 0.2,
            discard_opacity_shadows: 0.1,
            two_sided: false,
            billboard: Billboard::Off,
            particle: false,
            tilesheet: false,
            cast_shadow: true,
            receive_shadow: true,
            material_id: 0,
            ignore_irradiance: false,
            decal: false,
            overlay: false,
            skip_context: String::new(),
            uv_layers: Vec::new(),
        }
    }
}

macro_rules! node_kinds {
    ($($variant:ident => $tag:literal,)*) => {
        /// Closed set of node type tags the material backend understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NodeKind {
            $($variant,)*
        }

        impl NodeKind {
            pub fn parse(tag: &str) -> Option<Self> {
                match tag {
                    $($tag => Some(NodeKind::$variant),)*
                    _ => None,
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(NodeKind::$variant => $tag,)*
                }
            }
        }
    };
}

node_kinds! {
    OutputMaterial => "OUTPUT_MATERIAL",
    Group => "GROUP",
    GroupInput => "GROUP_INPUT",
    GroupOutput => "GROUP_OUTPUT",
    Reroute => "REROUTE",
    Frame => "FRAME",
    // Shader
    MixShader => "MIX_SHADER",
    AddShader => "ADD_SHADER",
    BsdfPrincipled => "BSDF_PRINCIPLED",
    BsdfDiffuse => "BSDF_DIFFUSE",
    BsdfGlossy => "BSDF_GLOSSY",
    BsdfAnisotropic => "BSDF_ANISOTROPIC",
    AmbientOcclusion => "AMBIENT_OCCLUSION",
    Emission => "EMISSION",
    BsdfGlass => "BSDF_GLASS",
    BsdfRefraction => "BSDF_REFRACTION",
    BsdfHair => "BSDF_HAIR",
    BsdfToon => "BSDF_TOON",
    Holdout => "HOLDOUT",
    SubsurfaceScattering => "SUBSURFACE_SCATTERING",
    BsdfTranslucent => "BSDF_TRANSLUCENT",
    BsdfTransparent => "BSDF_TRANSPARENT",
    BsdfVelvet => "BSDF_VELVET",
    // Input
    Attribute => "ATTRIBUTE",
    Rgb => "RGB",
    Value => "VALUE",
    VertexColor => "VERTEX_COLOR",
    Camera => "CAMERA",
    NewGeometry => "NEW_GEOMETRY",
    HairInfo => "HAIR_INFO",
    ObjectInfo => "OBJECT_INFO",
    Tangent => "TANGENT",
    TexCoord => "TEX_COORD",
    UvMap => "UVMAP",
    Fresnel => "FRESNEL",
    LayerWeight => "LAYER_WEIGHT",
    LightPath => "LIGHT_PATH",
    Wireframe => "WIREFRAME",
    // Color
    BrightContrast => "BRIGHTCONTRAST",
    Gamma => "GAMMA",
    HueSat => "HUE_SAT",
    Invert => "INVERT",
    MixRgb => "MIX_RGB",
    LightFalloff => "LIGHT_FALLOFF",
    // Converter
    Math => "MATH",
    VectMath => "VECT_MATH",
    ValToRgb => "VALTORGB",
    CombXyz => "COMBXYZ",
    CombRgb => "COMBRGB",
    CombHsv => "COMBHSV",
    SepXyz => "SEPXYZ",
    SepRgb => "SEPRGB",
    SepHsv => "SEPHSV",
    RgbToBw => "RGBTOBW",
    Clamp => "CLAMP",
    MapRange => "MAP_RANGE",
    Blackbody => "BLACKBODY",
    Wavelength => "WAVELENGTH",
    // Vector
    Mapping => "MAPPING",
    Normal => "NORMAL",
    NormalMap => "NORMAL_MAP",
    Bump => "BUMP",
    VectTransform => "VECT_TRANSFORM",
    Displacement => "DISPLACEMENT",
    // Texture
    TexImage => "TEX_IMAGE",
    TexChecker => "TEX_CHECKER",
    TexGradient => "TEX_GRADIENT",
    TexEnvironment => "TEX_ENVIRONMENT",
}

impl Node {
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::parse(&self.node_type)
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s.name == name)
    }
}

impl Socket {
    /// Scalar default; vectors collapse to their first component.
    pub fn default_f32(&self) -> f32 {
        match &self.default {
            Some(serde_json::Value::Array(items)) => items.first().and_then(value_as_f32).unwrap_or(0.0),
            Some(v) => value_as_f32(v).unwrap_or(0.0),
            None => 0.0,
        }
    }

    /// Vector default padded with zeros to `n` components.
    pub fn default_vec(&self, n: usize) -> Vec<f32> {
        let mut out: Vec<f32> = match &self.default {
            Some(serde_json::Value::Array(items)) => {
                items.iter().map(|v| value_as_f32(v).unwrap_or(0.0)).collect()
            }
            Some(v) => vec![value_as_f32(v).unwrap_or(0.0); n],
            None => Vec::new(),
        };
        out.resize(n, 0.0);
        out
    }

    pub fn default_str(&self) -> Option<&str> {
        self.default.as_ref().and_then(|v| v.as_str())
    }
}

fn value_as_f32(v: &serde_json::Value) -> Option<f32> {
    v.as_f64()
        .map(|x| x as f32)
        .or_else(|| v.as_bool().map(|b| if b { 1.0 } else { 0.0 }))
}

impl NodeTree {
    pub fn node(&self, idx: usize) -> Option<&Node> {
        self.nodes.get(idx)
    }

    /// The single link feeding `to_node.inputs[to_socket]`, if any.
    pub fn incoming(&self, to_node: usize, to_socket: usize) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| l.to_node == to_node && l.to_socket == to_socket)
    }

    pub fn is_linked(&self, to_node: usize, to_socket: usize) -> bool {
        self.incoming(to_node, to_socket).is_some()
    }

    pub fn node_by_type(&self, kind: NodeKind) -> Option<usize> {
        self.nodes.iter().position(|n| n.kind() == Some(kind))
    }
}

impl MaterialDoc {
    pub fn root(&self) -> Option<&NodeTree> {
        self.trees.first()
    }

    pub fn tree(&self, idx: usize) -> Option<&NodeTree> {
        self.trees.get(idx)
    }

    pub fn tree_index(&self, name: &str) -> Option<usize> {
        self.trees.iter().position(|t| t.name == name)
    }

    pub fn node(&self, r: NodeRef) -> Option<&Node> {
        self.trees.get(r.tree).and_then(|t| t.nodes.get(r.node))
    }

    /// Checks every link endpoint and group reference against the arena.
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            bail!("material '{}' has no node trees", self.name);
        }
        for tree in &self.trees {
            for (i, link) in tree.links.iter().enumerate() {
                let Some(from) = tree.nodes.get(link.from_node) else {
                    bail!("tree '{}': link {i} references missing node {}", tree.name, link.from_node);
                };
                let Some(to) = tree.nodes.get(link.to_node) else {
                    bail!("tree '{}': link {i} references missing node {}", tree.name, link.to_node);
                };
                if link.from_socket >= from.outputs.len() {
                    bail!(
                        "tree '{}': link {i} uses output {} of '{}' which has {} outputs",
                        tree.name,
                        link.from_socket,
                        from.name,
                        from.outputs.len()
                    );
                }
                if link.to_socket >= to.inputs.len() {
                    bail!(
                        "tree '{}': link {i} uses input {} of '{}' which has {} inputs",
                        tree.name,
                        link.to_socket,
                        to.name,
                        to.inputs.len()
                    );
                }
            }
            let mut seen: HashMap<(usize, usize), usize> = HashMap::new();
            for (i, link) in tree.links.iter().enumerate() {
                if let Some(prev) = seen.insert((link.to_node, link.to_socket), i) {
                    bail!(
                        "tree '{}': input {} of '{}' is fed by links {prev} and {i}",
                        tree.name,
                        link.to_socket,
                        tree.nodes[link.to_node].name
                    );
                }
            }
            for node in &tree.nodes {
                if node.kind() == Some(NodeKind::Group) {
                    let name = node.node_tree.as_deref().unwrap_or("");
                    if self.tree_index(name).is_none() {
                        log::warn!("[material] group node '{}' references unknown tree '{name}'", node.name);
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn load_material_from_str(text: &str) -> Result<MaterialDoc> {
    let doc: MaterialDoc = serde_json::from_str(text).context("failed to parse material json")?;
    doc.validate()?;
    Ok(doc)
}

pub fn load_material_from_path(path: impl AsRef<Path>) -> Result<MaterialDoc> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read material json at {}", path.display()))?;
    load_material_from_str(&text).with_context(|| format!("invalid material {}", path.display()))
}

pub fn parse_f32(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<f32> {
    params.get(key).and_then(value_as_f32)
}

pub fn parse_str<'a>(params: &'a HashMap<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

pub fn parse_bool(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}

pub fn parse_f32_list(params: &HashMap<String, serde_json::Value>, key: &str) -> Vec<f32> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().map(|v| value_as_f32(v).unwrap_or(0.0)).collect())
        .unwrap_or_default()
}
