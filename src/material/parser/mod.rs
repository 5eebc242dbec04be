//! Material node-graph parser.
//!
//! Walks a material tree backwards from its output node, turning every
//! reachable node into shader expressions written to the current stage of a
//! [`ShaderContext`]. A linked output is evaluated once and stored in a
//! `<node>_<socket>_res` variable; unlinked inputs become literals. The
//! per-node rules live in one module per node family and are dispatched from
//! here by node kind.

pub mod color_nodes;
pub mod converter_nodes;
pub mod input_nodes;
pub mod shader_nodes;
pub mod texture_nodes;
pub mod vector_nodes;

use std::collections::HashSet;

use crate::dsl::{MaterialDoc, Node, NodeKind, NodeRef, Socket, SocketType, parse_bool, parse_f32, parse_str};

use super::context::{ShaderContext, StageMut, UniformDefault, UniformOpts};
use super::render_path::settings::Displacement;
use super::shader::Stage;
use super::shader_data::BindTexture;
use super::types::{BuildEnv, EmissionType, SurfaceOuts};
use super::utils::{fmt_float, rgb_to_bw, safesrc, to_vec1, to_vec3};

/// Which parts of the output node a pass needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub parse_surface: bool,
    pub parse_opacity: bool,
    pub parse_displacement: bool,
    /// Skip normal mapping, only the base colour matters.
    pub basecol_only: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            parse_surface: true,
            parse_opacity: false,
            parse_displacement: true,
            basecol_only: false,
        }
    }
}

/// An input or output socket of a node in the document arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketRef {
    pub node: NodeRef,
    pub index: usize,
}

/// A node being evaluated for one of its outputs.
#[derive(Debug, Clone, Copy)]
pub struct NodeAt<'n> {
    pub r: NodeRef,
    pub node: &'n Node,
    pub out: usize,
}

impl<'n> NodeAt<'n> {
    pub fn input(&self, index: usize) -> SocketRef {
        SocketRef { node: self.r, index }
    }

    /// Input by socket name. A missing name yields a socket that is never
    /// linked and has no default.
    pub fn input_named(&self, name: &str) -> SocketRef {
        self.input(self.node.input_index(name).unwrap_or(usize::MAX))
    }

    pub fn out_socket(&self) -> Option<&'n Socket> {
        self.node.outputs.get(self.out)
    }

    pub fn out_name(&self) -> &'n str {
        self.out_socket().map(|s| s.name.as_str()).unwrap_or("")
    }

    /// Shader type of the requested output.
    pub fn out_glsl_type(&self) -> &'static str {
        self.out_socket().map(|s| s.socket_type.glsl_type()).unwrap_or("float")
    }

    pub fn param_str(&self, key: &str) -> Option<&'n str> {
        parse_str(&self.node.params, key)
    }

    pub fn param_bool(&self, key: &str) -> bool {
        parse_bool(&self.node.params, key).unwrap_or(false)
    }

    pub fn param_f32(&self, key: &str) -> Option<f32> {
        parse_f32(&self.node.params, key)
    }
}

/// Result of following a group boundary, typed by the socket crossed.
enum Parsed {
    Shader(SurfaceOuts),
    Expr(String),
    Nothing,
}

impl Parsed {
    fn into_expr(self) -> Option<String> {
        match self {
            Parsed::Expr(s) => Some(s),
            _ => None,
        }
    }
}

/// `GROUP` nodes referencing the built-in PBR group are evaluated natively.
pub fn is_armory_pbr(node: &Node) -> bool {
    node.kind() == Some(NodeKind::Group)
        && node
            .node_tree
            .as_deref()
            .is_some_and(|t| t.starts_with("Armory PBR"))
}

pub struct ParserState<'a> {
    doc: &'a MaterialDoc,
    pub(crate) con: &'a mut ShaderContext,
    pub(crate) env: &'a mut BuildEnv,
    textures: &'a mut Vec<BindTexture>,
    pub(crate) opts: ParseOptions,
    /// Stage receiving plain writes.
    pub(crate) cur: Stage,
    /// Enclosing group nodes, innermost last.
    parents: Vec<NodeRef>,
    parsed: HashSet<String>,
    pub(crate) normal_parsed: bool,
    pub(crate) sample_bump: bool,
    pub(crate) sample_bump_res: String,
    pub(crate) outs: SurfaceOuts,
    pub(crate) emission: EmissionType,
}

/// Parses the material output node of `doc` into `con`.
///
/// Surface and opacity go to the fragment stage, displacement to the vertex
/// or tessellation-evaluation stage. Textures referenced by image nodes are
/// appended to `textures`. Returns how the material emits light.
pub fn parse(
    doc: &MaterialDoc,
    con: &mut ShaderContext,
    env: &mut BuildEnv,
    textures: &mut Vec<BindTexture>,
    opts: ParseOptions,
) -> EmissionType {
    let mut state = ParserState {
        doc,
        con,
        env,
        textures,
        opts,
        cur: Stage::Frag,
        parents: Vec::new(),
        parsed: HashSet::new(),
        normal_parsed: false,
        sample_bump: false,
        sample_bump_res: String::new(),
        outs: SurfaceOuts::default(),
        emission: EmissionType::None,
    };
    match doc.root().and_then(|t| t.node_by_type(NodeKind::OutputMaterial)) {
        Some(out) => state.parse_material_output(NodeRef { tree: 0, node: out }),
        None => {
            log::warn!("[material] {}: no material output node, using default surface", doc.name);
            state.write_outputs(&SurfaceOuts::default());
        }
    }
    state.emission
}

impl<'a> ParserState<'a> {
    pub(crate) fn doc(&self) -> &'a MaterialDoc {
        self.doc
    }

    pub(crate) fn node(&self, r: NodeRef) -> Option<&'a Node> {
        let doc: &'a MaterialDoc = self.doc;
        doc.node(r)
    }

    pub(crate) fn in_socket(&self, inp: SocketRef) -> Option<&'a Socket> {
        self.node(inp.node).and_then(|n| n.inputs.get(inp.index))
    }

    fn out_socket(&self, out: SocketRef) -> Option<&'a Socket> {
        self.node(out.node).and_then(|n| n.outputs.get(out.index))
    }

    /// The output socket feeding `inp`, if linked.
    pub(crate) fn link_from(&self, inp: SocketRef) -> Option<SocketRef> {
        let tree = self.doc.tree(inp.node.tree)?;
        let link = tree.incoming(inp.node.node, inp.index)?;
        Some(SocketRef {
            node: NodeRef {
                tree: inp.node.tree,
                node: link.from_node,
            },
            index: link.from_socket,
        })
    }

    pub fn is_linked(&self, inp: SocketRef) -> bool {
        self.link_from(inp).is_some()
    }

    /// Kind of the node feeding `inp`.
    pub(crate) fn linked_kind(&self, inp: SocketRef) -> Option<NodeKind> {
        self.link_from(inp)
            .and_then(|from| self.node(from.node))
            .and_then(Node::kind)
    }

    fn reroute_input(&self, from: SocketRef) -> Option<SocketRef> {
        (self.node(from.node)?.kind()? == NodeKind::Reroute).then_some(SocketRef {
            node: from.node,
            index: 0,
        })
    }

    /// Walks back through reroutes from `inp`. Yields the last input socket
    /// reached and the non-reroute output feeding it, or `None` when the
    /// reroutes form a loop.
    fn follow_reroutes(&self, mut inp: SocketRef) -> Option<(SocketRef, Option<SocketRef>)> {
        let mut seen = HashSet::new();
        loop {
            let Some(from) = self.link_from(inp) else {
                return Some((inp, None));
            };
            let Some(next) = self.reroute_input(from) else {
                return Some((inp, Some(from)));
            };
            if !seen.insert(next.node) {
                let name = self.node(next.node).map(|n| n.name.as_str()).unwrap_or("");
                self.warn(&format!("reroute \"{name}\" is part of a loop, using a neutral value"));
                return None;
            }
            inp = next;
        }
    }

    pub(crate) fn cur_stage(&mut self) -> StageMut<'_> {
        self.con.stage(self.cur)
    }

    pub(crate) fn write(&mut self, s: &str) {
        self.cur_stage().write(s);
    }

    pub(crate) fn add_function(&mut self, f: &str) {
        self.cur_stage().add_function(f);
    }

    pub(crate) fn add_uniform(&mut self, decl: &str, link: Option<&str>) {
        self.cur_stage().add_uniform(decl, link);
    }

    pub(crate) fn add_include(&mut self, inc: &str) {
        self.cur_stage().add_include(inc);
    }

    pub(crate) fn warn(&self, msg: &str) {
        log::warn!("[material] Node tree \"{}\": {msg}", self.doc.name);
    }

    fn reset_walk(&mut self) {
        self.parents.clear();
        self.parsed.clear();
        self.normal_parsed = false;
    }

    fn parse_material_output(&mut self, out: NodeRef) {
        self.sample_bump = false;
        self.sample_bump_res.clear();
        self.emission = EmissionType::None;

        if self.opts.parse_surface || self.opts.parse_opacity {
            self.reset_walk();
            self.cur = Stage::Frag;
            let outs = self.parse_shader_input(SocketRef { node: out, index: 0 });
            self.write_outputs(&outs);
        }

        let disp = SocketRef { node: out, index: 2 };
        if self.opts.parse_displacement && self.env.rp.displacement != Displacement::Off && self.is_linked(disp) {
            self.reset_walk();
            self.cur = if self.env.rp.displacement == Displacement::Tessellation && self.con.has(Stage::Tese) {
                Stage::Tese
            } else {
                Stage::Vert
            };
            if let Some(d) = self.parse_displacement_input(disp) {
                self.write(&format!("vec3 disp = {d};"));
            }
        }
    }

    fn write_outputs(&mut self, outs: &SurfaceOuts) {
        let mut frag = self.con.frag();
        if self.opts.parse_surface {
            frag.write(&format!("basecol = {};", outs.basecol));
            frag.write(&format!("roughness = {};", outs.roughness));
            frag.write(&format!("metallic = {};", outs.metallic));
            frag.write(&format!("occlusion = {};", outs.occlusion));
            frag.write(&format!("specular = {};", outs.specular));
            frag.write(&format!("emissionCol = {};", outs.emission_col));
        }
        if self.opts.parse_opacity {
            frag.write(&format!("opacity = {};", outs.opacity));
            frag.write(&format!("ior = {};", outs.ior));
        }
        if self.opts.parse_surface {
            match self.emission {
                EmissionType::Shadeless => self.env.world_defs.add("_EmissionShadeless"),
                EmissionType::Shaded => self.env.world_defs.add("_EmissionShaded"),
                EmissionType::None => {}
            }
        }
    }

    fn parse_displacement_input(&mut self, inp: SocketRef) -> Option<String> {
        let (_, from) = self.follow_reroutes(inp)?;
        from?;
        Some(self.parse_vector_input(inp))
    }

    fn parse_input(&mut self, inp: SocketRef) -> Parsed {
        match self.in_socket(inp).map(|s| s.socket_type) {
            Some(SocketType::Shader) => Parsed::Shader(self.parse_shader_input(inp)),
            Some(t) if t.is_vector_like() => Parsed::Expr(self.parse_vector_input(inp)),
            Some(t) if t.is_value_like() => Parsed::Expr(self.parse_value_input(inp)),
            _ => Parsed::Nothing,
        }
    }

    /// Entering a group: evaluates the inner output socket matching the
    /// requested group output.
    fn parse_group(&mut self, at: NodeAt<'a>) -> Parsed {
        let Some(tree) = at.node.node_tree.as_deref().and_then(|n| self.doc.tree_index(n)) else {
            self.warn(&format!("group node \"{}\" has no node tree", at.node.name));
            return Parsed::Nothing;
        };
        let enclosing = std::iter::once(Some(at.r.tree)).chain(self.parents.iter().map(|p| {
            self.node(*p)
                .and_then(|n| n.node_tree.as_deref())
                .and_then(|n| self.doc.tree_index(n))
        }));
        if enclosing.flatten().any(|t| t == tree) {
            self.warn(&format!(
                "group node \"{}\" re-enters node tree \"{}\", skipping it",
                at.node.name, self.doc.trees[tree].name
            ));
            return Parsed::Nothing;
        }
        let Some(out) = self.doc.trees[tree].node_by_type(NodeKind::GroupOutput) else {
            return Parsed::Nothing;
        };
        self.parents.push(at.r);
        let res = self.parse_input(SocketRef {
            node: NodeRef { tree, node: out },
            index: at.out,
        });
        self.parents.pop();
        res
    }

    /// Leaving a group: a group input resolves to the matching input of the
    /// enclosing group node, one level out.
    fn parse_group_input(&mut self, at: NodeAt<'a>) -> Parsed {
        let Some(parent) = self.parents.pop() else {
            self.warn(&format!("group input \"{}\" reached outside of a group", at.node.name));
            return Parsed::Nothing;
        };
        let res = self.parse_input(SocketRef {
            node: parent,
            index: at.out,
        });
        self.parents.push(parent);
        res
    }

    pub fn parse_shader_input(&mut self, inp: SocketRef) -> SurfaceOuts {
        let Some((_, Some(from))) = self.follow_reroutes(inp) else {
            self.outs = SurfaceOuts::default();
            return self.outs.clone();
        };
        if self.out_socket(from).map(|s| s.socket_type) != Some(SocketType::Shader) {
            let name = self.out_socket(from).map(|s| s.name.as_str()).unwrap_or("");
            let node = self.node(from.node).map(|n| n.name.as_str()).unwrap_or("");
            self.warn(&format!(
                "socket \"{name}\" of node \"{node}\" cannot be connected to a shader socket"
            ));
            self.outs = SurfaceOuts::default();
            return self.outs.clone();
        }
        self.parse_shader(from)
    }

    fn parse_shader(&mut self, from: SocketRef) -> SurfaceOuts {
        self.outs = SurfaceOuts::default();
        let Some(node) = self.node(from.node) else {
            return self.outs.clone();
        };
        let at = NodeAt {
            r: from.node,
            node,
            out: from.index,
        };
        match node.kind() {
            Some(NodeKind::MixShader) => shader_nodes::parse_mixshader(self, at),
            Some(NodeKind::AddShader) => shader_nodes::parse_addshader(self, at),
            Some(NodeKind::BsdfPrincipled) => shader_nodes::parse_bsdfprincipled(self, at),
            Some(NodeKind::BsdfDiffuse) => shader_nodes::parse_bsdfdiffuse(self, at),
            Some(NodeKind::BsdfGlossy) => shader_nodes::parse_bsdfglossy(self, at),
            Some(NodeKind::AmbientOcclusion) => shader_nodes::parse_ambientocclusion(self, at),
            Some(NodeKind::BsdfAnisotropic) => shader_nodes::parse_bsdfanisotropic(self, at),
            Some(NodeKind::Emission) => shader_nodes::parse_emission(self, at),
            Some(NodeKind::BsdfGlass) => shader_nodes::parse_bsdfglass(self, at),
            Some(NodeKind::Holdout) => shader_nodes::parse_holdout(self, at),
            Some(NodeKind::SubsurfaceScattering) => shader_nodes::parse_subsurfacescattering(self, at),
            Some(NodeKind::BsdfTranslucent) => shader_nodes::parse_bsdftranslucent(self, at),
            Some(NodeKind::BsdfTransparent) => shader_nodes::parse_bsdftransparent(self, at),
            Some(NodeKind::BsdfVelvet) => shader_nodes::parse_bsdfvelvet(self, at),
            Some(NodeKind::BsdfHair | NodeKind::BsdfRefraction | NodeKind::BsdfToon) => {}
            Some(NodeKind::Group) if is_armory_pbr(node) => shader_nodes::parse_armory_pbr(self, at),
            Some(NodeKind::Group) => {
                return match self.parse_group(at) {
                    Parsed::Shader(outs) => outs,
                    _ => SurfaceOuts::default(),
                };
            }
            Some(NodeKind::GroupInput) => {
                return match self.parse_group_input(at) {
                    Parsed::Shader(outs) => outs,
                    _ => SurfaceOuts::default(),
                };
            }
            _ => self.warn(&format!("material node type {} not supported", node.node_type)),
        }
        self.outs.clone()
    }

    /// Vector expression for an input, `None` only when the source is a
    /// normal map that already rewrote `n`.
    fn vector_input(&mut self, inp: SocketRef) -> Option<String> {
        let Some((inp, from)) = self.follow_reroutes(inp) else {
            return Some(to_vec3(&[0.0; 3]));
        };
        let Some(from) = from else {
            return Some(match self.in_socket(inp) {
                // Unlinked scalar reroute
                Some(s) if s.socket_type == SocketType::Value => to_vec3(&[0.0; 3]),
                Some(s) => to_vec3(&s.default_vec(3)),
                None => to_vec3(&[0.0; 3]),
            });
        };
        let res_var = self.write_result(from)?;
        Some(match self.out_socket(from).map(|s| s.socket_type) {
            Some(t) if t.is_vector_like() => res_var,
            Some(t) if t.is_value_like() => format!("vec3({res_var})"),
            _ => {
                self.warn_incompatible(from, "a vector-like");
                to_vec3(&[0.0; 3])
            }
        })
    }

    pub fn parse_vector_input(&mut self, inp: SocketRef) -> String {
        self.vector_input(inp).unwrap_or_else(|| "n".to_string())
    }

    pub fn parse_value_input(&mut self, inp: SocketRef) -> String {
        let Some((inp, from)) = self.follow_reroutes(inp) else {
            return "0.0".to_string();
        };
        let Some(from) = from else {
            return match self.in_socket(inp) {
                Some(s) => to_vec1(s.default_f32()),
                None => "0.0".to_string(),
            };
        };
        let Some(res_var) = self.write_result(from) else {
            return "0.0".to_string();
        };
        match self.out_socket(from).map(|s| s.socket_type) {
            Some(t) if t.is_vector_like() => rgb_to_bw(&res_var),
            Some(t) if t.is_value_like() => res_var,
            _ => {
                self.warn_incompatible(from, "a scalar value");
                "0.0".to_string()
            }
        }
    }

    fn warn_incompatible(&self, from: SocketRef, target: &str) {
        let name = self.out_socket(from).map(|s| s.name.as_str()).unwrap_or("");
        let node = self.node(from.node).map(|n| n.name.as_str()).unwrap_or("");
        self.warn(&format!("socket \"{name}\" of node \"{node}\" cannot be connected to {target} socket"));
    }

    fn parse_vector(&mut self, from: SocketRef) -> Option<String> {
        let node = self.node(from.node)?;
        let at = NodeAt {
            r: from.node,
            node,
            out: from.index,
        };
        let res = match node.kind() {
            Some(NodeKind::Attribute) => input_nodes::parse_attribute(self, at),
            Some(NodeKind::Rgb) => input_nodes::parse_rgb(self, at),
            Some(NodeKind::VertexColor) => input_nodes::parse_vertex_color(self, at),
            Some(NodeKind::Camera) => input_nodes::parse_camera(self, at),
            Some(NodeKind::NewGeometry) => input_nodes::parse_geometry(self, at),
            Some(NodeKind::HairInfo) => input_nodes::parse_hairinfo(self, at),
            Some(NodeKind::ObjectInfo) => input_nodes::parse_objectinfo(self, at),
            Some(NodeKind::Tangent) => input_nodes::parse_tangent(self, at),
            Some(NodeKind::TexCoord) => input_nodes::parse_texcoord(self, at),
            Some(NodeKind::UvMap) => input_nodes::parse_uvmap(self, at),
            Some(NodeKind::TexChecker) => texture_nodes::parse_tex_checker(self, at),
            Some(NodeKind::TexEnvironment) => texture_nodes::parse_tex_environment(self, at),
            Some(NodeKind::TexGradient) => texture_nodes::parse_tex_gradient(self, at),
            Some(NodeKind::TexImage) => texture_nodes::parse_tex_image(self, at),
            Some(NodeKind::BrightContrast) => color_nodes::parse_brightcontrast(self, at),
            Some(NodeKind::Gamma) => color_nodes::parse_gamma(self, at),
            Some(NodeKind::HueSat) => color_nodes::parse_huesat(self, at),
            Some(NodeKind::Invert) => color_nodes::parse_invert(self, at),
            Some(NodeKind::MixRgb) => color_nodes::parse_mixrgb(self, at),
            Some(NodeKind::Blackbody) => converter_nodes::parse_blackbody(self, at),
            Some(NodeKind::ValToRgb) => converter_nodes::parse_valtorgb(self, at),
            Some(NodeKind::CombHsv) => converter_nodes::parse_combhsv(self, at),
            Some(NodeKind::CombRgb) => converter_nodes::parse_combrgb(self, at),
            Some(NodeKind::CombXyz) => converter_nodes::parse_combxyz(self, at),
            Some(NodeKind::Wavelength) => converter_nodes::parse_wavelength(self, at),
            Some(NodeKind::VectMath) => converter_nodes::parse_vectormath(self, at),
            Some(NodeKind::Bump) => vector_nodes::parse_bump(self, at),
            Some(NodeKind::Mapping) => vector_nodes::parse_mapping(self, at),
            Some(NodeKind::Normal) => vector_nodes::parse_normal(self, at),
            Some(NodeKind::NormalMap) => vector_nodes::parse_normalmap(self, at),
            Some(NodeKind::VectTransform) => vector_nodes::parse_vectortransform(self, at),
            Some(NodeKind::Displacement) => vector_nodes::parse_displacement(self, at),
            Some(NodeKind::Group) => return self.parse_group(at).into_expr(),
            Some(NodeKind::GroupInput) => return self.parse_group_input(at).into_expr(),
            _ => {
                self.warn(&format!("material node type {} not supported", node.node_type));
                to_vec3(&[0.0; 3])
            }
        };
        Some(res)
    }

    fn parse_value(&mut self, from: SocketRef) -> Option<String> {
        let node = self.node(from.node)?;
        let at = NodeAt {
            r: from.node,
            node,
            out: from.index,
        };
        let res = match node.kind() {
            Some(NodeKind::Attribute) => input_nodes::parse_attribute(self, at),
            Some(NodeKind::Camera) => input_nodes::parse_camera(self, at),
            Some(NodeKind::Fresnel) => input_nodes::parse_fresnel(self, at),
            Some(NodeKind::NewGeometry) => input_nodes::parse_geometry(self, at),
            Some(NodeKind::HairInfo) => input_nodes::parse_hairinfo(self, at),
            Some(NodeKind::LayerWeight) => input_nodes::parse_layerweight(self, at),
            Some(NodeKind::LightPath) => input_nodes::parse_lightpath(self, at),
            Some(NodeKind::ObjectInfo) => input_nodes::parse_objectinfo(self, at),
            Some(NodeKind::Value) => input_nodes::parse_value(self, at),
            Some(NodeKind::Wireframe) => input_nodes::parse_wireframe(self, at),
            Some(NodeKind::TexChecker) => texture_nodes::parse_tex_checker(self, at),
            Some(NodeKind::TexGradient) => texture_nodes::parse_tex_gradient(self, at),
            Some(NodeKind::TexImage) => texture_nodes::parse_tex_image(self, at),
            Some(NodeKind::LightFalloff) => color_nodes::parse_lightfalloff(self, at),
            Some(NodeKind::Normal) => vector_nodes::parse_normal(self, at),
            Some(NodeKind::Clamp) => converter_nodes::parse_clamp(self, at),
            Some(NodeKind::ValToRgb) => converter_nodes::parse_valtorgb(self, at),
            Some(NodeKind::Math) => converter_nodes::parse_math(self, at),
            Some(NodeKind::RgbToBw) => converter_nodes::parse_rgbtobw(self, at),
            Some(NodeKind::SepHsv) => converter_nodes::parse_sephsv(self, at),
            Some(NodeKind::SepRgb) => converter_nodes::parse_seprgb(self, at),
            Some(NodeKind::SepXyz) => converter_nodes::parse_sepxyz(self, at),
            Some(NodeKind::VectMath) => converter_nodes::parse_vectormath(self, at),
            Some(NodeKind::MapRange) => converter_nodes::parse_maprange(self, at),
            // Height output of the PBR group
            Some(NodeKind::Group) if is_armory_pbr(node) => {
                return (at.out == 1).then(|| self.parse_value_input(at.input(7)));
            }
            Some(NodeKind::Group) => return self.parse_group(at).into_expr(),
            Some(NodeKind::GroupInput) => return self.parse_group_input(at).into_expr(),
            _ => {
                self.warn(&format!("material node type {} not supported", node.node_type));
                "0.0".to_string()
            }
        };
        Some(res)
    }

    /// Evaluates a linked output once and returns the variable holding it.
    fn write_result(&mut self, from: SocketRef) -> Option<String> {
        let node = self.node(from.node)?;
        let socket = node.outputs.get(from.index)?;
        let res_var = self.res_var_name(node, socket);

        if !self.parsed.contains(&res_var) {
            self.parsed.insert(res_var.clone());
            let st = socket.socket_type;
            if st.is_vector_like() {
                let res = self.parse_vector(from).unwrap_or_else(|| {
                    log::error!("[material] {} produced no result while parsing", node.name);
                    to_vec3(&[0.0; 3])
                });
                self.write(&format!("vec3 {res_var} = {res};"));
            } else if st.is_value_like() {
                let res = self.parse_value(from).unwrap_or_else(|| {
                    log::error!("[material] {} produced no result while parsing", node.name);
                    "0.0".to_string()
                });
                if node.kind() == Some(NodeKind::Value) && !node.material_param {
                    self.cur_stage().add_const("float", &res_var, &res, 0);
                } else {
                    self.write(&format!("float {res_var} = {res};"));
                }
            }
        } else if node.kind() == Some(NodeKind::NormalMap) {
            return None;
        }
        Some(res_var)
    }

    /// Shader-safe, unique name for a node: enclosing group names are
    /// prefixed and reads inside the texture section get a `_texread` suffix.
    pub(crate) fn node_name(&self, name: &str) -> String {
        let mut s = name.to_string();
        for p in &self.parents {
            if let Some(parent) = self.node(*p) {
                s = format!("{}_{s}", parent.name);
            }
        }
        if self.con.shader(self.cur).is_some_and(|sh| sh.write_textures > 0) {
            s.push_str("_texread");
        }
        let s = safesrc(&s);
        // Consecutive underscores are reserved
        if s.contains("__") { s.replace('_', "_x") } else { s }
    }

    fn res_var_name(&self, node: &Node, socket: &Socket) -> String {
        format!("{}_{}_res", self.node_name(&node.name), safesrc(&socket.name))
    }

    pub(crate) fn store_var_name(&self, node: &Node) -> String {
        format!("{}_store", self.node_name(&node.name))
    }

    pub(crate) fn is_parsed(&self, var: &str) -> bool {
        self.parsed.contains(var)
    }

    pub(crate) fn mark_parsed(&mut self, var: &str) {
        self.parsed.insert(var.to_string());
    }

    /// Overrides the surface normal with a linked normal input.
    pub(crate) fn write_normal(&mut self, inp: SocketRef) {
        if !self.is_linked(inp) || self.linked_kind(inp) == Some(NodeKind::GroupInput) {
            return;
        }
        if let Some(res) = self.vector_input(inp) {
            self.write(&format!("n = {res};"));
        }
    }

    /// Perturbs `n` by a tangent-space normal map colour. Runs once per
    /// parse; lines land in the fragment normal section.
    pub(crate) fn parse_normal_map_color_input(&mut self, inp: SocketRef, strength: Option<SocketRef>) {
        if self.opts.basecol_only || !self.is_linked(inp) || self.normal_parsed {
            return;
        }
        self.normal_parsed = true;
        self.con.frag().write_normal += 1;
        if !self.env.rp.export_tangents || self.doc.settings.decal {
            let col = self.parse_vector_input(inp);
            let mut frag = self.con.frag();
            frag.write(&format!("vec3 texn = ({col}) * 2.0 - 1.0;"));
            frag.write("texn.y = -texn.y;");
            frag.add_include("std/normals.glsl");
            frag.write("mat3 TBN = cotangentFrame(n, -vVec, texCoord);");
            frag.write("n = TBN * normalize(texn);");
        } else {
            let col = self.parse_vector_input(inp);
            self.con.frag().write(&format!("n = ({col}) * 2.0 - 1.0;"));
            if let Some(s) = strength {
                let strength = self.parse_value_input(s);
                if strength != "1.0" {
                    self.con.frag().write(&format!("n.xy *= {strength};"));
                }
            }
            self.con.frag().write("n = normalize(TBN * n);");
            self.con.add_elem("tang", "short4norm");
        }
        self.con.frag().write_normal -= 1;
    }

    /// Declares the sampler for an image node and samples it once into
    /// `<node>_store`.
    pub(crate) fn texture_store(&mut self, at: NodeAt<'_>, tex: BindTexture, tex_name: &str, to_linear: bool) -> String {
        let store = self.store_var_name(at.node);
        if self.is_parsed(&store) {
            return store;
        }
        self.mark_parsed(&store);

        let is_param = at.node.material_param;
        let default_file = tex.file.clone();
        if !is_param {
            self.textures.push(tex);
        }
        self.con.add_elem("tex", "short2norm");
        self.cur_stage().add_uniform_with(
            &format!("sampler2D {tex_name}"),
            UniformOpts {
                link: is_param.then_some(at.node.name.as_str()),
                default_value: is_param.then_some(UniformDefault::Image(default_file)),
                is_material_param: is_param,
                ..UniformOpts::default()
            },
        );

        let triplanar = at.param_str("projection") == Some("BOX");
        let uv_in = at.input(0);
        let uv = if self.is_linked(uv_in) {
            let uv = self.parse_vector_input(uv_in);
            if triplanar {
                format!("vec3({uv}.x, 1.0 - {uv}.y, {uv}.z)")
            } else {
                format!("vec2({uv}.x, 1.0 - {uv}.y)")
            }
        } else if triplanar {
            "vec3(texCoord.xy, 0.0)".to_string()
        } else {
            "texCoord".to_string()
        };

        if triplanar {
            self.add_include("std/mapping.glsl");
            let nor = if self.normal_parsed { "TBN[2]" } else { "n" };
            self.write(&format!(
                "vec4 {store} = vec4(triplanarMapping({tex_name}, {nor}, {uv}), 0.0);"
            ));
        } else {
            self.write(&format!("vec4 {store} = texture({tex_name}, {uv}.xy);"));
        }

        if self.sample_bump {
            self.sample_bump_res = store.clone();
            for (i, off) in ["-2, 0", "2, 0", "0, -2", "0, 2"].iter().enumerate() {
                self.write(&format!(
                    "float {store}_{} = textureOffset({tex_name}, {uv}.xy, ivec2({off})).r;",
                    i + 1
                ));
            }
            self.sample_bump = false;
        }
        if to_linear {
            self.write(&format!("{store}.rgb = pow({store}.rgb, vec3(2.2));"));
        }
        store
    }

    /// Evaluates a procedural texture expression at four offset coordinates
    /// into `<node>_store_bump_1..4` for the bump node.
    pub(crate) fn write_bump(&mut self, at: NodeAt<'_>, res: &str, scl: f32) {
        let base = format!("{}_bump", self.store_var_name(at.node));
        self.sample_bump_res = base.clone();

        let (pre, rest) = match res.split_once('(') {
            Some((head, rest)) => (format!("{head}("), rest),
            None => (String::new(), res),
        };
        let (co, post) = match rest.split_once(',') {
            Some((co, tail)) => (co, format!(",{tail}")),
            None => (rest.strip_suffix(')').unwrap_or(rest), ")".to_string()),
        };

        let s = fmt_float(scl);
        let offsets = [
            format!("vec3(-{s}, 0.0, 0.0)"),
            format!("vec3({s}, 0.0, {s})"),
            format!("vec3(0.0, -{s}, 0.0)"),
            format!("vec3(0.0, {s}, -{s})"),
        ];
        let needs_bw = at.out_glsl_type() == "vec3";
        for (i, off) in offsets.iter().enumerate() {
            let i = i + 1;
            if needs_bw {
                let vec_var = format!("{base}_vec{i}");
                self.write(&format!("vec3 {vec_var} = {pre}{co} + {off}{post};"));
                self.write(&format!("float {base}_{i} = {};", rgb_to_bw(&vec_var)));
            } else {
                self.write(&format!("float {base}_{i} = {pre}{co} + {off}{post};"));
            }
        }
        self.sample_bump = false;
    }
}
