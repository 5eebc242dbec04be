//! Finalize stages: declare the built-in values node code referenced but no
//! earlier step provided (`dotNV`, `vVec`, `wposition`, ...).

use crate::material::context::ShaderContext;
use crate::material::shader::Stage;

use super::PassState;
use super::stages::{FeatureStage, Pipeline, run};
use super::tess;

pub const FINALIZE: &Pipeline = &[
    &DotNv,
    &ViewVector,
    &WorldPosition,
    &ModelPosition,
    &BoundsPosition,
    &WorldTangent,
    &CameraViewVector,
    &NormalAttribute,
    &LegacySamplers,
];

pub fn make(st: &mut PassState<'_>, con: &mut ShaderContext) {
    run(FINALIZE, st, con);
}

fn frag_uses(con: &ShaderContext, var: &str) -> bool {
    con.contains(Stage::Frag, var) && !con.contains(Stage::Frag, &format!("vec3 {var}"))
}

fn tese_uses(con: &ShaderContext, var: &str) -> bool {
    con.has(Stage::Tese) && con.contains(Stage::Tese, var) && !con.contains(Stage::Tese, &format!("vec3 {var}"))
}

struct DotNv;

impl FeatureStage for DotNv {
    fn name(&self) -> &'static str {
        "dotNV"
    }

    fn active(&self, _st: &PassState<'_>, con: &ShaderContext) -> bool {
        con.contains(Stage::Frag, "dotNV") && !con.contains(Stage::Frag, "float dotNV")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        con.frag().write_init("float dotNV = max(dot(n, vVec), 0.0);");
        // n is missing in passes that never set up shading normals
        if !con.contains(Stage::Frag, "vec3 n") {
            let mut vert = con.vert();
            vert.add_out("vec3 wnormal");
            vert.add_uniform("mat3 N", Some("_normalMatrix"));
            vert.write_attrib("wnormal = normalize(N * vec3(nor.xy, pos.w));");
            con.frag().write_attrib("vec3 n = normalize(wnormal);");
            con.add_elem("nor", "short2norm");
        }
    }
}

struct ViewVector;

impl FeatureStage for ViewVector {
    fn name(&self) -> &'static str {
        "vVec"
    }

    fn active(&self, _st: &PassState<'_>, con: &ShaderContext) -> bool {
        frag_uses(con, "vVec")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut sh = con.tese_or_vert();
        sh.add_out("vec3 eyeDir");
        sh.add_uniform("vec3 eye", Some("_cameraPosition"));
        sh.write("eyeDir = eye - wposition;");
        con.frag().write_attrib("vec3 vVec = normalize(eyeDir);");
    }
}

/// World position, exported to later stages when they read it.
struct WorldPosition;

impl FeatureStage for WorldPosition {
    fn name(&self) -> &'static str {
        "wposition"
    }

    fn active(&self, _st: &PassState<'_>, con: &ShaderContext) -> bool {
        frag_uses(con, "wposition") || con.has(Stage::Tese) || con.contains(Stage::Vert, "wposition")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let export = frag_uses(con, "wposition") || con.has(Stage::Tese);
        let mut vert = con.vert();
        vert.add_uniform("mat4 W", Some("_worldMatrix"));
        if export {
            vert.add_out("vec3 wposition");
            vert.write_attrib("wposition = vec4(W * spos).xyz;");
        } else {
            vert.write_attrib("vec3 wposition = vec4(W * spos).xyz;");
        }
    }
}

struct ModelPosition;

impl FeatureStage for ModelPosition {
    fn name(&self) -> &'static str {
        "mposition"
    }

    fn active(&self, _st: &PassState<'_>, con: &ShaderContext) -> bool {
        frag_uses(con, "mposition") || con.contains(Stage::Vert, "mposition") || tese_uses(con, "mposition")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let frag_mpos = frag_uses(con, "mposition") || con.contains(Stage::Vert, "mposition");
        let mut vert = con.vert();
        vert.add_out("vec3 mposition");
        vert.add_uniform("float posUnpack", Some("_posUnpack"));
        if frag_mpos {
            vert.write_attrib("mposition = spos.xyz * posUnpack;");
        } else {
            vert.write_pre = true;
            vert.write("mposition = spos.xyz * posUnpack;");
            vert.write_pre = false;
        }
        if con.has(Stage::Tese) {
            tess::interpolate(con, "mposition", 3, false, frag_mpos);
        }
    }
}

/// Position normalized to the object bounds.
struct BoundsPosition;

impl FeatureStage for BoundsPosition {
    fn name(&self) -> &'static str {
        "bposition"
    }

    fn active(&self, _st: &PassState<'_>, con: &ShaderContext) -> bool {
        frag_uses(con, "bposition") || con.contains(Stage::Vert, "bposition") || tese_uses(con, "bposition")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let frag_bpos = frag_uses(con, "bposition") || con.contains(Stage::Vert, "bposition");
        let mut vert = con.vert();
        vert.add_out("vec3 bposition");
        vert.add_uniform("vec3 dim", Some("_dim"));
        vert.add_uniform("vec3 hdim", Some("_halfDim"));
        vert.add_uniform("float posUnpack", Some("_posUnpack"));
        vert.write_attrib("bposition = (spos.xyz * posUnpack + hdim) / dim;");
        if frag_bpos {
            vert.write_attrib("if (dim.z == 0) bposition.z = 0;");
            vert.write_attrib("if (dim.y == 0) bposition.y = 0;");
            vert.write_attrib("if (dim.x == 0) bposition.x = 0;");
        }
        if con.has(Stage::Tese) {
            tess::interpolate(con, "bposition", 3, false, frag_bpos);
        }
    }
}

struct WorldTangent;

impl FeatureStage for WorldTangent {
    fn name(&self) -> &'static str {
        "wtangent"
    }

    fn active(&self, _st: &PassState<'_>, con: &ShaderContext) -> bool {
        frag_uses(con, "wtangent") || con.contains(Stage::Vert, "wtangent") || tese_uses(con, "wtangent")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let frag_wtan = frag_uses(con, "wtangent") || con.contains(Stage::Vert, "wtangent");
        if frag_wtan {
            con.add_elem("tex", "short2norm");
            con.add_elem("tang", "short4norm");
        }
        let mut vert = con.vert();
        vert.add_out("vec3 wtangent");
        vert.write_pre = true;
        vert.write("wtangent = normalize(N * tang.xyz);");
        vert.write_pre = false;
        if con.has(Stage::Tese) {
            tess::interpolate(con, "wtangent", 3, false, frag_wtan);
        }
    }
}

struct CameraViewVector;

impl FeatureStage for CameraViewVector {
    fn name(&self) -> &'static str {
        "vVecCam"
    }

    fn active(&self, _st: &PassState<'_>, con: &ShaderContext) -> bool {
        con.contains(Stage::Frag, "vVecCam")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut vert = con.vert();
        vert.add_out("vec3 eyeDirCam");
        vert.add_uniform("mat4 WV", Some("_worldViewMatrix"));
        vert.write("eyeDirCam = vec4(WV * spos).xyz; eyeDirCam.z *= -1;");
        con.frag().write_attrib("vec3 vVecCam = normalize(eyeDirCam);");
    }
}

struct NormalAttribute;

impl FeatureStage for NormalAttribute {
    fn name(&self) -> &'static str {
        "nAttr"
    }

    fn active(&self, _st: &PassState<'_>, con: &ShaderContext) -> bool {
        con.contains(Stage::Frag, "nAttr")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut vert = con.vert();
        vert.add_out("vec3 nAttr");
        vert.write_attrib("nAttr = vec3(nor.xy, pos.w);");
    }
}

/// Targets without shadow samplers compare manually.
struct LegacySamplers;

impl FeatureStage for LegacySamplers {
    fn name(&self) -> &'static str {
        "legacy samplers"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        st.has("_Legacy")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.replace("sampler2DShadow", "sampler2D");
        frag.replace("samplerCubeShadow", "samplerCube");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::context::ContextRecord;
    use crate::material::parser::test_utils::*;
    use crate::material::render_path::settings::RenderPathSettings;
    use crate::material::render_path::test_utils::env_with;

    fn linked() -> ShaderContext {
        let mut con = ShaderContext::new("Mat", ContextRecord::new("mesh"));
        con.make(Stage::Vert);
        con.make(Stage::Frag);
        con.link_stages(Stage::Vert, Stage::Frag);
        con
    }

    fn finalize(con: &mut ShaderContext, defs: &[&str]) {
        let doc = test_material(vec![]);
        let mut env = env_with(RenderPathSettings::default(), defs);
        let rpasses = Vec::new();
        let mut st = PassState::new(&doc, &mut env, &rpasses);
        make(&mut st, con);
    }

    #[test]
    fn view_vector_exports_world_position() {
        let mut con = linked();
        con.frag().write("float f = dot(n, vVec);");
        finalize(&mut con, &[]);
        con.resolve_stage_io();
        let vert = con.shader(Stage::Vert).unwrap().get();
        assert!(vert.contains("eyeDir = eye - wposition;"));
        assert!(vert.contains("vec3 wposition = vec4(W * spos).xyz;"));
        let frag = con.shader(Stage::Frag).unwrap().get();
        assert!(frag.contains("in vec3 eyeDir;"));
        assert!(frag.contains("vec3 vVec = normalize(eyeDir);"));
    }

    #[test]
    fn fragment_world_position_is_a_varying() {
        let mut con = linked();
        con.frag().write("vec3 p = wposition;");
        finalize(&mut con, &[]);
        let vert = con.shader(Stage::Vert).unwrap();
        assert!(vert.outs().iter().any(|o| o == "vec3 wposition"));
        assert!(vert.get().contains("\twposition = vec4(W * spos).xyz;"));
    }

    #[test]
    fn dot_nv_falls_back_to_vertex_normals() {
        let mut con = linked();
        con.remove_elem("nor");
        con.frag().write("float f = dotNV;");
        finalize(&mut con, &[]);
        assert!(con.is_elem("nor"));
        let frag = con.shader(Stage::Frag).unwrap().get();
        assert!(frag.contains("float dotNV = max(dot(n, vVec), 0.0);"));
        assert!(frag.contains("vec3 n = normalize(wnormal);"));
    }

    #[test]
    fn bounds_position_guards_flat_axes() {
        let mut con = linked();
        con.frag().write("vec3 b = bposition;");
        finalize(&mut con, &[]);
        let vert = con.shader(Stage::Vert).unwrap().get();
        assert!(vert.contains("bposition = (spos.xyz * posUnpack + hdim) / dim;"));
        assert!(vert.contains("if (dim.x == 0) bposition.x = 0;"));
    }

    #[test]
    fn legacy_swaps_shadow_samplers() {
        let mut con = linked();
        con.frag().add_uniform("sampler2DShadow shadowMap", None);
        finalize(&mut con, &["_Legacy"]);
        assert_eq!(con.shader(Stage::Frag).unwrap().uniforms(), ["sampler2D shadowMap"]);
    }

    #[test]
    fn tangent_requests_vertex_elements() {
        let mut con = linked();
        con.frag().write("vec3 t = wtangent;");
        finalize(&mut con, &[]);
        assert!(con.is_elem("tang") && con.is_elem("tex"));
        let vert = con.shader(Stage::Vert).unwrap().get();
        assert!(vert.contains("wtangent = normalize(N * tang.xyz);"));
    }
}
