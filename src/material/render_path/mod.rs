//! Render-path engine.
//!
//! Turns a material document into the shader contexts of its render passes.
//! A mesh pass dispatches on the render-path settings to one of the forward
//! scripts (mobile, solid, full), the deferred script or the raytracer stub;
//! shadow and depth passes share one depth script. The long flag-driven parts
//! of those scripts are pipelines of [`stages::FeatureStage`]s.

mod attrib;
mod cluster;
mod deferred;
mod depth;
mod finalize;
mod forward;
mod mesh;
pub mod settings;
pub mod stages;
pub mod tess;
pub mod world_defs;

use crate::dsl::{MaterialDoc, MaterialSettings, Node, NodeKind, NodeTree};
use crate::session::BuildSession;

use super::context::ShaderContext;
use super::parser::{self, ParseOptions, is_armory_pbr};
use super::shader_data::BindTexture;
use super::types::{BuildEnv, EmissionType};
use settings::{Displacement, RenderPathSettings};

/// Render passes that produce a shader context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Mesh,
    Shadowmap,
    Depth,
}

impl PassKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mesh" => Some(PassKind::Mesh),
            "shadowmap" => Some(PassKind::Shadowmap),
            "depth" => Some(PassKind::Depth),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PassKind::Mesh => "mesh",
            PassKind::Shadowmap => "shadowmap",
            PassKind::Depth => "depth",
        }
    }
}

/// A finished pass: the context plus the textures its image nodes bind.
#[derive(Debug)]
pub struct PassOutput {
    pub con: ShaderContext,
    pub textures: Vec<BindTexture>,
    pub emission: EmissionType,
}

/// Mutable state threaded through one pass script.
pub struct PassState<'a> {
    pub doc: &'a MaterialDoc,
    pub env: &'a mut BuildEnv,
    /// Every pass name of the material, including marker passes.
    pub rpasses: &'a [String],
    pub textures: Vec<BindTexture>,
    pub emission: EmissionType,
    pub is_disp: bool,
    pub parse_opacity: bool,
    pub shadowmap: bool,
}

impl<'a> PassState<'a> {
    pub fn new(doc: &'a MaterialDoc, env: &'a mut BuildEnv, rpasses: &'a [String]) -> Self {
        let is_disp = disp_linked(doc, &env.rp);
        Self {
            doc,
            env,
            rpasses,
            textures: Vec::new(),
            emission: EmissionType::None,
            is_disp,
            parse_opacity: false,
            shadowmap: false,
        }
    }

    /// Whether a world def is set.
    pub fn has(&self, def: &str) -> bool {
        self.env.world_defs.has(def)
    }

    pub fn mat(&self) -> &'a MaterialSettings {
        &self.doc.settings
    }

    pub fn rp(&self) -> &RenderPathSettings {
        &self.env.rp
    }

    pub fn has_rpass(&self, name: &str) -> bool {
        self.rpasses.iter().any(|p| p == name)
    }

    /// Runs the node parser into `con`, remembering the emission type of
    /// surface parses.
    pub fn parse(&mut self, con: &mut ShaderContext, opts: ParseOptions) {
        let emission = parser::parse(self.doc, con, self.env, &mut self.textures, opts);
        if opts.parse_surface {
            self.emission = emission;
        }
    }

    fn finish(self, con: ShaderContext) -> PassOutput {
        PassOutput {
            con,
            textures: self.textures,
            emission: self.emission,
        }
    }
}

/// Builds one pass of `doc` with the session's settings and world defs.
pub fn build_pass(session: &mut BuildSession, doc: &MaterialDoc, kind: PassKind) -> ShaderContext {
    let rpasses = material_passes(doc, &session.env().rp);
    let out = compile_pass(session.env_mut(), doc, kind, &rpasses);
    session.stash_textures(out.textures);
    out.con
}

/// Builds one pass against an explicit build environment.
pub fn compile_pass(env: &mut BuildEnv, doc: &MaterialDoc, kind: PassKind, rpasses: &[String]) -> PassOutput {
    log::debug!("[material] {}: building {} pass", doc.name, kind.as_str());
    let mut st = PassState::new(doc, env, rpasses);
    let con = match kind {
        PassKind::Mesh => mesh::make(&mut st),
        PassKind::Shadowmap => depth::make(&mut st, kind.as_str(), true),
        PassKind::Depth => depth::make(&mut st, kind.as_str(), false),
    };
    st.finish(con)
}

/// Pass names of a material in build order. Only `mesh`, `shadowmap` and
/// `depth` are built; the others are listed in the material data.
pub fn material_passes(doc: &MaterialDoc, rp: &RenderPathSettings) -> Vec<String> {
    let mat = &doc.settings;
    let mut passes = Vec::new();
    if mat.decal {
        passes.push("decal");
    } else if mat.overlay {
        passes.push("overlay");
    } else {
        passes.push("mesh");
        let transluc = is_transluc(doc) && !mat.discard && !mat.blending;
        if transluc && rp.translucency && !rp.ss_refraction {
            passes.push("translucent");
        } else if transluc && rp.ss_refraction {
            passes.push("refraction");
        }
        if rp.is_forward() && rp.depth_prepass && !mat.blending && !mat.particle {
            passes.push("depth");
        }
    }
    if mat.cast_shadow && rp.shadows && passes.contains(&"mesh") {
        passes.push("shadowmap");
    }
    passes
        .into_iter()
        .filter(|p| *p != mat.skip_context)
        .map(str::to_string)
        .collect()
}

/// Whether the displacement socket of the output node carries a height.
pub fn disp_linked(doc: &MaterialDoc, rp: &RenderPathSettings) -> bool {
    if rp.displacement == Displacement::Off {
        return false;
    }
    let Some(tree) = doc.root() else {
        return false;
    };
    let Some(out) = tree.node_by_type(NodeKind::OutputMaterial) else {
        return false;
    };
    let Some(link) = tree.incoming(out, 2) else {
        return false;
    };
    match tree.node(link.from_node) {
        // Armory PBR with an unlinked height socket
        Some(from) if is_armory_pbr(from) => tree.is_linked(link.from_node, 7),
        _ => true,
    }
}

/// Whether the surface subtree contains a see-through shader.
pub fn is_transluc(doc: &MaterialDoc) -> bool {
    let Some(tree) = doc.root() else {
        return false;
    };
    let Some(out) = tree.node_by_type(NodeKind::OutputMaterial) else {
        return false;
    };
    let Some(link) = tree.incoming(out, 0) else {
        return false;
    };
    let mut seen = vec![false; tree.nodes.len()];
    transluc_traverse(tree, link.from_node, &mut seen)
}

fn transluc_traverse(tree: &NodeTree, idx: usize, seen: &mut [bool]) -> bool {
    let Some(node) = tree.node(idx) else {
        return false;
    };
    if seen.get(idx).copied().unwrap_or(true) {
        return false;
    }
    seen[idx] = true;
    if is_transluc_type(tree, idx, node) {
        return true;
    }
    (0..node.inputs.len()).any(|i| {
        tree.incoming(idx, i)
            .is_some_and(|l| transluc_traverse(tree, l.from_node, seen))
    })
}

fn is_transluc_type(tree: &NodeTree, idx: usize, node: &Node) -> bool {
    let alpha_changed = |name: &str| {
        node.input_index(name)
            .is_some_and(|i| tree.is_linked(idx, i) || node.inputs[i].default_f32() != 1.0)
    };
    match node.kind() {
        Some(
            NodeKind::BsdfGlass | NodeKind::BsdfTransparent | NodeKind::BsdfTranslucent | NodeKind::BsdfRefraction,
        ) => true,
        Some(NodeKind::BsdfPrincipled) => alpha_changed("Alpha"),
        _ if is_armory_pbr(node) => alpha_changed("Opacity"),
        _ => false,
    }
}

/// Whether the material uses subsurface scattering anywhere in its root tree.
pub fn needs_sss(doc: &MaterialDoc) -> bool {
    let Some(tree) = doc.root() else {
        return false;
    };
    let out_linked = |i: usize| tree.links.iter().any(|l| l.from_node == i && l.from_socket == 0);
    let input_set = |i: usize, node: &Node, socket: usize| {
        tree.is_linked(i, socket) || node.inputs.get(socket).is_some_and(|s| s.default_f32() != 0.0)
    };
    tree.nodes.iter().enumerate().any(|(i, node)| {
        if !out_linked(i) {
            return false;
        }
        match node.kind() {
            Some(NodeKind::SubsurfaceScattering) => true,
            Some(NodeKind::BsdfPrincipled) => input_set(i, node, 1),
            _ if is_armory_pbr(node) => input_set(i, node, 8),
            _ => false,
        }
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::parser::test_utils::*;

    fn diffuse_doc() -> MaterialDoc {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(d, 0, o, 0);
        test_material(vec![b.build()])
    }

    fn glass_doc() -> MaterialDoc {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let g = b.node(
            "Glass",
            "BSDF_GLASS",
            vec![color("Color", [1.0; 4]), value("Roughness", 0.0), value("IOR", 1.45)],
            vec![shader("BSDF")],
        );
        let mix = b.node(
            "Mix",
            "MIX_SHADER",
            vec![value("Fac", 0.5), shader("Shader"), shader("Shader")],
            vec![shader("Shader")],
        );
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(d, 0, mix, 1).link(g, 0, mix, 2).link(mix, 0, o, 0);
        test_material(vec![b.build()])
    }

    #[test]
    fn default_passes_are_mesh_and_shadowmap() {
        let passes = material_passes(&diffuse_doc(), &RenderPathSettings::default());
        assert_eq!(passes, ["mesh", "shadowmap"]);
    }

    #[test]
    fn forward_prepass_adds_depth() {
        let rp = RenderPathSettings {
            renderer: settings::Renderer::Forward,
            depth_prepass: true,
            shadows: false,
            ..RenderPathSettings::default()
        };
        assert_eq!(material_passes(&diffuse_doc(), &rp), ["mesh", "depth"]);
    }

    #[test]
    fn decals_skip_mesh_and_shadows() {
        let mut doc = diffuse_doc();
        doc.settings.decal = true;
        assert_eq!(material_passes(&doc, &RenderPathSettings::default()), ["decal"]);
    }

    #[test]
    fn glass_is_translucent_through_a_mix() {
        let doc = glass_doc();
        assert!(is_transluc(&doc));
        assert!(!is_transluc(&diffuse_doc()));
        let passes = material_passes(&doc, &RenderPathSettings::default());
        assert_eq!(passes, ["mesh", "translucent", "shadowmap"]);
        let rp = RenderPathSettings {
            ss_refraction: true,
            ..RenderPathSettings::default()
        };
        assert_eq!(material_passes(&doc, &rp), ["mesh", "refraction", "shadowmap"]);
    }

    #[test]
    fn principled_alpha_counts_as_translucent() {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let p = b.node(
            "Principled",
            "BSDF_PRINCIPLED",
            vec![color("Base Color", [1.0; 4]), value("Subsurface", 0.0), value("Alpha", 0.5)],
            vec![shader("BSDF")],
        );
        b.link(p, 0, o, 0);
        let doc = test_material(vec![b.build()]);
        assert!(is_transluc(&doc));
        assert!(!needs_sss(&doc));
    }

    #[test]
    fn subsurface_weight_needs_sss() {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let p = b.node(
            "Principled",
            "BSDF_PRINCIPLED",
            vec![color("Base Color", [1.0; 4]), value("Subsurface", 0.3), value("Alpha", 1.0)],
            vec![shader("BSDF")],
        );
        b.link(p, 0, o, 0);
        assert!(needs_sss(&test_material(vec![b.build()])));
    }

    #[test]
    fn displacement_needs_a_linked_height() {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let v = b.node("Height", "VALUE", vec![], vec![value("Value", 0.1)]);
        b.link(v, 0, o, 2);
        let doc = test_material(vec![b.build()]);
        assert!(disp_linked(&doc, &RenderPathSettings::default()));
        let off = RenderPathSettings {
            displacement: Displacement::Off,
            ..RenderPathSettings::default()
        };
        assert!(!disp_linked(&doc, &off));
        assert!(!disp_linked(&diffuse_doc(), &RenderPathSettings::default()));
    }

    #[test]
    fn skip_context_removes_a_pass() {
        let mut doc = diffuse_doc();
        doc.settings.skip_context = "shadowmap".to_string();
        assert_eq!(material_passes(&doc, &RenderPathSettings::default()), ["mesh"]);
    }

    #[test]
    fn pass_kinds_round_trip_names() {
        for kind in [PassKind::Mesh, PassKind::Shadowmap, PassKind::Depth] {
            assert_eq!(PassKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(PassKind::from_name("translucent"), None);
    }
}
