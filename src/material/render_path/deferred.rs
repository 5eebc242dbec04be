//! Deferred mesh script: surface parse plus G-buffer packing.
//!
//! Target layout, as read by the lighting passes:
//! - `GBUF_IDX_0`: octahedron normal `xy`, roughness, `packFloatInt16(metallic, matid)`
//! - `GBUF_IDX_1`: base colour, `packFloat2(occlusion, specular)`
//! - `GBUF_IDX_2` (`_gbuffer2`): velocity `rg`, irradiance mask `b`
//! - `GBUF_IDX_EMISSION`, `GBUF_IDX_REFRACTION` when those buffers exist

use crate::material::context::ShaderContext;
use crate::material::shader::Stage;
use crate::material::types::EmissionType;
use crate::material::utils::fmt_float;

use super::stages::{FeatureStage, Pipeline, run};
use super::{PassState, mesh, tess};

pub const DEFERRED: &Pipeline = &[
    &DeferredOpacity,
    &VelocityVaryings,
    &GbufferPack,
    &MaterialId,
    &GbufferWrite,
    &VelocityWrite,
    &EmissionBuffer,
    &RefractionBuffer,
];

pub fn make(st: &mut PassState<'_>, con: &mut ShaderContext) {
    let parse_opacity =
        st.mat().discard || st.rp().voxelgi_refract || st.has_rpass("translucent") || st.has_rpass("refraction");
    st.parse_opacity = parse_opacity;
    mesh::make_base(st, con, parse_opacity);
    run(DEFERRED, st, con);
}

fn velocity(st: &PassState<'_>) -> bool {
    st.has("_gbuffer2") && st.has("_Veloc")
}

struct DeferredOpacity;

impl FeatureStage for DeferredOpacity {
    fn name(&self) -> &'static str {
        "opacity discard"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        st.parse_opacity
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mat = st.mat();
        let opac = if mat.discard {
            fmt_float(mat.discard_opacity)
        } else {
            // 1.0 - eps
            "0.9999".to_string()
        };
        con.frag().write(&format!("if (opacity < {opac}) discard;"));
    }
}

/// Current and previous clip positions for the velocity buffer.
struct VelocityVaryings;

impl FeatureStage for VelocityVaryings {
    fn name(&self) -> &'static str {
        "velocity varyings"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        velocity(st)
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        if !con.has(Stage::Tese) {
            let mut vert = con.vert();
            vert.add_uniform("mat4 prevWVP", Some("_prevWorldViewProjectionMatrix"));
            vert.add_out("vec4 wvpposition");
            vert.add_out("vec4 prevwvpposition");
            vert.write("wvpposition = gl_Position;");
            if st.is_disp {
                vert.add_uniform("mat4 invW", Some("_inverseWorldMatrix"));
                vert.write("prevwvpposition = prevWVP * (invW * vec4(wposition, 1.0));");
            } else {
                vert.write("prevwvpposition = prevWVP * spos;");
            }
            return;
        }

        let mut tese = con.stage(Stage::Tese);
        tese.add_out("vec4 wvpposition");
        tese.add_out("vec4 prevwvpposition");
        tese.write("wvpposition = gl_Position;");
        if st.is_disp {
            tese.add_uniform("mat4 invW", Some("_inverseWorldMatrix"));
            tese.add_uniform("mat4 prevWVP", Some("_prevWorldViewProjectionMatrix"));
            tese.write("prevwvpposition = prevWVP * (invW * vec4(wposition, 1.0));");
        } else {
            let mut vert = con.vert();
            vert.add_uniform("mat4 prevW", Some("_prevWorldMatrix"));
            vert.add_out("vec3 prevwposition");
            vert.write("prevwposition = vec4(prevW * spos).xyz;");
            con.stage(Stage::Tese)
                .add_uniform("mat4 prevVP", Some("_prevViewProjectionMatrix"));
            tess::interpolate(con, "prevwposition", 3, false, false);
            con.stage(Stage::Tese)
                .write("prevwvpposition = prevVP * vec4(prevwposition, 1.0);");
        }
    }
}

/// Octahedron-encodes the shading normal into two channels.
struct GbufferPack;

impl FeatureStage for GbufferPack {
    fn name(&self) -> &'static str {
        "gbuffer pack"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.add_out("vec4 fragColor[GBUF_SIZE]");
        frag.add_include("std/gbuffer.glsl");
        frag.write("n /= (abs(n.x) + abs(n.y) + abs(n.z));");
        frag.write("n.xy = n.z >= 0.0 ? n.xy : octahedronWrap(n.xy);");
    }
}

/// Shading model id: 0 lit, 1 shadeless, 2 subsurface or hair.
struct MaterialId;

impl FeatureStage for MaterialId {
    fn name(&self) -> &'static str {
        "material id"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let is_shadeless = st.emission == EmissionType::Shadeless;
        let per_object = st.has("_SSS") || st.has("_Hair");
        let mut frag = con.frag();
        if !is_shadeless && !per_object {
            frag.write("const uint matid = 0;");
            return;
        }
        frag.write("uint matid = 0;");
        if is_shadeless {
            frag.write("matid = 1;");
            frag.write("basecol = emissionCol;");
        }
        if per_object {
            frag.add_uniform("int materialID", None);
            frag.write("if (materialID == 2) matid = 2;");
        }
    }
}

struct GbufferWrite;

impl FeatureStage for GbufferWrite {
    fn name(&self) -> &'static str {
        "gbuffer write"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.write("fragColor[GBUF_IDX_0] = vec4(n.xy, roughness, packFloatInt16(metallic, matid));");
        frag.write("fragColor[GBUF_IDX_1] = vec4(basecol, packFloat2(occlusion, specular));");
    }
}

struct VelocityWrite;

impl FeatureStage for VelocityWrite {
    fn name(&self) -> &'static str {
        "velocity"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        st.has("_gbuffer2")
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        if velocity(st) {
            frag.write("vec2 posa = (wvpposition.xy / wvpposition.w) * 0.5 + 0.5;");
            frag.write("vec2 posb = (prevwvpposition.xy / prevwvpposition.w) * 0.5 + 0.5;");
            frag.write("fragColor[GBUF_IDX_2].rg = vec2(posa - posb);");
            frag.write("fragColor[GBUF_IDX_2].b = 0.0;");
        }
        if st.mat().ignore_irradiance {
            frag.write("fragColor[GBUF_IDX_2].b = 1.0;");
        }
    }
}

/// Always written when the buffer exists, even without emission.
struct EmissionBuffer;

impl FeatureStage for EmissionBuffer {
    fn name(&self) -> &'static str {
        "emission buffer"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.write("#ifdef _EmissionShaded");
        frag.write("fragColor[GBUF_IDX_EMISSION] = vec4(emissionCol, 0.0);");
        frag.write("#endif");
    }
}

struct RefractionBuffer;

impl FeatureStage for RefractionBuffer {
    fn name(&self) -> &'static str {
        "refraction buffer"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        st.has("_SSRefraction") || st.has("_VoxelRefract")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        con.frag()
            .write("fragColor[GBUF_IDX_REFRACTION] = vec4(1.0, 1.0, 0.0, 0.0);");
    }
}

#[cfg(test)]
mod tests {
    use crate::dsl::MaterialDoc;
    use crate::material::parser::test_utils::*;
    use crate::material::render_path::PassKind;
    use crate::material::render_path::settings::RenderPathSettings;
    use crate::material::render_path::test_utils::{build, env_with};

    fn diffuse_doc() -> MaterialDoc {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(d, 0, o, 0);
        test_material(vec![b.build()])
    }

    #[test]
    fn diffuse_material_packs_the_gbuffer() {
        let mut p = build(&diffuse_doc(), PassKind::Mesh, env_with(RenderPathSettings::default(), &[]));
        let frag = p.frag();
        assert!(frag.contains("metallic = 0.0;"));
        assert!(frag.contains("const uint matid = 0;"));
        assert!(frag.contains("n.xy = n.z >= 0.0 ? n.xy : octahedronWrap(n.xy);"));
        assert!(frag.contains("fragColor[GBUF_IDX_0] = vec4(n.xy, roughness, packFloatInt16(metallic, matid));"));
        assert!(frag.contains("out vec4 fragColor[GBUF_SIZE];"));
        assert!(!frag.contains("shirr"));
        assert!(!frag.contains("envmapIrradiance"));
        assert!(!frag.contains("discard"));
    }

    #[test]
    fn subsurface_defs_read_material_id() {
        let mut p = build(&diffuse_doc(), PassKind::Mesh, env_with(RenderPathSettings::default(), &["_SSS"]));
        let frag = p.frag();
        assert!(frag.contains("uint matid = 0;"));
        assert!(frag.contains("if (materialID == 2) matid = 2;"));
        assert!(!frag.contains("const uint matid"));
    }

    #[test]
    fn velocity_needs_both_defs() {
        let rp = RenderPathSettings::default;
        let mut p = build(&diffuse_doc(), PassKind::Mesh, env_with(rp(), &["_gbuffer2", "_Veloc"]));
        assert!(p.vert().contains("prevwvpposition = prevWVP * spos;"));
        assert!(p.frag().contains("fragColor[GBUF_IDX_2].rg = vec2(posa - posb);"));

        let mut p = build(&diffuse_doc(), PassKind::Mesh, env_with(rp(), &["_Veloc"]));
        assert!(!p.vert().contains("prevwvpposition"));
    }

    #[test]
    fn ignored_irradiance_marks_the_third_target() {
        let mut doc = diffuse_doc();
        doc.settings.ignore_irradiance = true;
        let mut p = build(&doc, PassKind::Mesh, env_with(RenderPathSettings::default(), &["_gbuffer2"]));
        assert!(p.frag().contains("fragColor[GBUF_IDX_2].b = 1.0;"));
    }

    #[test]
    fn discard_uses_material_threshold() {
        let mut doc = diffuse_doc();
        doc.settings.discard = true;
        let mut p = build(&doc, PassKind::Mesh, env_with(RenderPathSettings::default(), &["_VoxelRefract"]));
        let frag = p.frag();
        assert!(frag.contains("float opacity;"));
        assert!(frag.contains("if (opacity < 0.2) discard;"));
        assert!(frag.contains("fragColor[GBUF_IDX_REFRACTION] = vec4(1.0, 1.0, 0.0, 0.0);"));
    }

    #[test]
    fn voxel_refraction_parses_opacity() {
        let rp = RenderPathSettings {
            voxelgi_refract: true,
            ..RenderPathSettings::default()
        };
        let mut p = build(&diffuse_doc(), PassKind::Mesh, env_with(rp, &["_VoxelRefract"]));
        let frag = p.frag();
        assert!(frag.contains("float opacity;"));
        assert!(frag.contains("opacity = 1.0;"));
        assert!(frag.contains("if (opacity < 0.9999) discard;"));
        assert!(frag.contains("fragColor[GBUF_IDX_REFRACTION] = vec4(1.0, 1.0, 0.0, 0.0);"));
    }
}
