//! The mesh pass: context setup, the shared surface base and the raytracer
//! stub. Lighting lives in `forward` and `deferred`.

use crate::material::context::{ContextRecord, ShaderContext, VertexElement};
use crate::material::parser::ParseOptions;
use crate::material::shader::{Shader, Stage};

use super::settings::{MaterialModel, Renderer};
use super::{PassState, attrib, deferred, finalize, forward, tess};

pub fn make(st: &mut PassState<'_>) -> ShaderContext {
    let mat = st.mat();
    let rp = st.rp().clone();
    let mut record = ContextRecord::new("mesh");

    let dprepass = rp.is_forward() && rp.depth_prepass;
    if mat.blending {
        record.name = "blend".to_string();
        record.blend_source = Some(mat.blend_source.clone());
        record.blend_destination = Some(mat.blend_destination.clone());
        record.blend_operation = Some(mat.blend_operation.clone());
        record.alpha_blend_source = Some(mat.blend_source_alpha.clone());
        record.alpha_blend_destination = Some(mat.blend_destination_alpha.clone());
        record.alpha_blend_operation = Some(mat.blend_operation_alpha.clone());
        record.depth_write = false;
        record.compare_mode = "less".to_string();
    } else if !mat.particle {
        if dprepass && !(rp.depth_texture && mat.depth_read) {
            // Depth was laid down by the prepass
            record.depth_write = false;
            record.compare_mode = "equal".to_string();
        } else {
            record.depth_write = mat.depth_write;
            record.compare_mode = mat.compare_mode.clone();
        }
    }
    record.cull_mode = mat.cull_mode.clone();
    if mat.two_sided {
        record.cull_mode = "none".to_string();
    }

    let format = if st.has("_LDR") { "RGBA32" } else { "RGBA64" };
    let mut attachments = vec![format.to_string(), format.to_string()];
    if st.has("_gbuffer2") {
        attachments.push(format.to_string());
    }
    record.color_attachments = Some(attachments);

    let mut con = ShaderContext::new(&st.doc.name, record);
    if rp.renderer == Renderer::Forward || mat.blending {
        match rp.material_model {
            MaterialModel::Mobile => forward::make_mobile(st, &mut con),
            MaterialModel::Solid => forward::make_solid(st, &mut con),
            MaterialModel::Full => forward::make_full(st, &mut con),
        }
    } else if rp.renderer == Renderer::Deferred {
        deferred::make(st, &mut con);
    } else {
        make_raytracer(&mut con);
    }

    finalize::make(st, &mut con);
    con
}

/// Stage setup, surface parse and geometry varyings shared by the lit
/// forward and deferred scripts.
pub fn make_base(st: &mut PassState<'_>, con: &mut ShaderContext, parse_opacity: bool) {
    let mat = st.mat();
    con.make(Stage::Vert);
    con.make(Stage::Frag);

    let mut vert = con.vert();
    vert.add_uniform("mat3 N", Some(attrib::normal_matrix_link(mat)));
    vert.write_attrib("vec4 spos = vec4(pos.xyz, 1.0);");

    let tessellated = st.is_disp && st.rp().tessellation();
    if tessellated {
        con.make(Stage::Tesc);
        con.make(Stage::Tese);
        con.link_stages(Stage::Vert, Stage::Tesc);
        con.link_stages(Stage::Tesc, Stage::Tese);
        con.link_stages(Stage::Tese, Stage::Frag);
        let (inner, outer) = (st.rp().tess_inner, st.rp().tess_outer);
        tess::tesc_levels(&mut con.stage(Stage::Tesc), inner, outer);
        tess::interpolate(con, "wposition", 3, false, true);
        tess::interpolate(con, "wnormal", 3, true, true);
    } else {
        con.link_stages(Stage::Vert, Stage::Frag);
    }

    con.vert().add_include("compiled.inc");
    con.frag().add_include("compiled.inc");

    write_material_attribs_default(&mut con.frag(), parse_opacity);
    st.parse(
        con,
        ParseOptions {
            parse_opacity,
            parse_displacement: st.is_disp,
            ..ParseOptions::default()
        },
    );

    con.vert().add_out("vec3 wnormal");
    attrib::write_norpos(con, false);
    con.frag().write_attrib("vec3 n = normalize(wnormal);");

    if mat.two_sided {
        // Flip normal on back faces
        con.frag().write("if (!gl_FrontFacing) n *= -1;");
    }

    if !st.is_disp {
        attrib::write_vertpos(con, mat);
    }

    attrib::write_tex_coords(con, mat);
    attrib::write_vcolor(con, true);

    if con.is_elem("tang") {
        if tessellated {
            let mut tese = con.stage(Stage::Tese);
            tese.add_out("mat3 TBN");
            tese.write_attrib("vec3 wbitangent = normalize(cross(wnormal, wtangent));");
            tese.write_attrib("TBN = mat3(wtangent, wbitangent, wnormal);");
        } else {
            let mut vert = con.vert();
            vert.add_out("mat3 TBN");
            vert.write_attrib("vec3 tangent = normalize(N * tang.xyz);");
            vert.write_attrib("vec3 bitangent = normalize(cross(wnormal, tangent));");
            vert.write_attrib("TBN = mat3(tangent, bitangent, wnormal);");
        }
    }

    if st.is_disp {
        let mut sh = con.tese_or_vert();
        sh.add_uniform("mat4 VP", Some("_viewProjectionMatrix"));
        sh.write("wposition += wnormal * disp;");
        sh.write("gl_Position = VP * vec4(wposition, 1.0);");
    }
}

/// Declares the surface attributes the parser assigns.
pub fn write_material_attribs_default(frag: &mut Shader, parse_opacity: bool) {
    frag.write("vec3 basecol;");
    frag.write("float roughness;");
    frag.write("float metallic;");
    frag.write("float occlusion;");
    frag.write("float specular;");
    frag.write("vec3 emissionCol;");
    if parse_opacity {
        frag.write("float opacity;");
        frag.write("float ior;");
    }
}

fn make_raytracer(con: &mut ShaderContext) {
    con.data.vertex_elements = vec![
        VertexElement::new("pos", "float3"),
        VertexElement::new("nor", "float3"),
        VertexElement::new("tex", "float2"),
    ];
    con.make(Stage::Frag);
    let mut vert = con.make(Stage::Vert);
    vert.add_out("vec3 n");
    vert.add_out("vec2 uv");
    vert.write("n = nor;");
    vert.write("uv = tex;");
    vert.write("gl_Position = vec4(pos.xyz, 1.0);");
}

#[cfg(test)]
mod tests {
    use crate::material::parser::test_utils::*;
    use crate::material::render_path::PassKind;
    use crate::material::render_path::settings::{Displacement, RenderPathSettings, Renderer};
    use crate::material::render_path::test_utils::{build, env_with};
    use crate::material::shader::Stage;

    fn diffuse_doc() -> crate::dsl::MaterialDoc {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(d, 0, o, 0);
        test_material(vec![b.build()])
    }

    fn displaced_doc() -> crate::dsl::MaterialDoc {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        let h = b.node("Height", "VALUE", vec![], vec![value("Value", 0.1)]);
        b.link(d, 0, o, 0).link(h, 0, o, 2);
        test_material(vec![b.build()])
    }

    #[test]
    fn blend_context_disables_depth_writes() {
        let mut doc = diffuse_doc();
        doc.settings.blending = true;
        let p = build(&doc, PassKind::Mesh, env_with(RenderPathSettings::default(), &[]));
        let rec = &p.out.con.data;
        assert_eq!(rec.name, "blend");
        assert!(!rec.depth_write);
        assert_eq!(rec.blend_source.as_deref(), Some("blend_one"));
        assert_eq!(rec.vertex_shader.as_deref(), Some("Mat_blend.vert"));
    }

    #[test]
    fn forward_prepass_compares_equal() {
        let rp = RenderPathSettings {
            renderer: Renderer::Forward,
            depth_prepass: true,
            ..RenderPathSettings::default()
        };
        let p = build(&diffuse_doc(), PassKind::Mesh, env_with(rp, &[]));
        assert!(!p.out.con.data.depth_write);
        assert_eq!(p.out.con.data.compare_mode, "equal");
    }

    #[test]
    fn attachments_follow_ldr_and_gbuffer2() {
        let p = build(&diffuse_doc(), PassKind::Mesh, env_with(RenderPathSettings::default(), &["_LDR"]));
        assert_eq!(p.out.con.data.color_attachments.as_deref(), Some(&["RGBA32".to_string(), "RGBA32".to_string()][..]));
        let p = build(&diffuse_doc(), PassKind::Mesh, env_with(RenderPathSettings::default(), &["_gbuffer2"]));
        assert_eq!(p.out.con.data.color_attachments.as_ref().map(Vec::len), Some(3));
    }

    #[test]
    fn vertex_displacement_stays_single_stage() {
        let mut p = build(&displaced_doc(), PassKind::Mesh, env_with(RenderPathSettings::default(), &[]));
        assert!(!p.out.con.has(Stage::Tese));
        let vert = p.vert();
        assert!(vert.contains("vec3 disp = vec3(Height_Value_res);"));
        assert!(vert.contains("wposition += wnormal * disp;"));
        assert!(vert.contains("gl_Position = VP * vec4(wposition, 1.0);"));
        assert!(!vert.contains("WVP"));
    }

    #[test]
    fn tessellation_wires_control_outs_into_evaluation_ins() {
        let rp = RenderPathSettings {
            displacement: Displacement::Tessellation,
            ..RenderPathSettings::default()
        };
        let mut p = build(&displaced_doc(), PassKind::Mesh, env_with(rp, &[]));
        p.out.con.resolve_stage_io();
        let con = &p.out.con;
        let tesc = con.shader(Stage::Tesc).unwrap();
        let tese = con.shader(Stage::Tese).unwrap();
        assert!(!tesc.outs().is_empty());
        assert_eq!(tese.ins(), tesc.outs());
        assert_eq!(con.shader(Stage::Frag).unwrap().ins(), tese.outs());
        assert!(tesc.outs().iter().any(|o| o == "vec3 tc_wposition"));
        let tese_src = tese.get();
        assert!(tese_src.contains("vec3 disp = vec3(Height_Value_res);"));
        assert!(tese_src.contains("gl_Position = VP * vec4(wposition, 1.0);"));
        assert!(tesc.get().contains("gl_TessLevelInner[0] = 14.0;"));
    }

    #[test]
    fn raytracer_is_a_stub() {
        let rp = RenderPathSettings {
            renderer: Renderer::Raytracer,
            ..RenderPathSettings::default()
        };
        let mut p = build(&diffuse_doc(), PassKind::Mesh, env_with(rp, &[]));
        let names: Vec<&str> = p.out.con.data.vertex_elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["pos", "nor", "tex"]);
        let vert = p.vert();
        assert!(vert.contains("in vec3 pos;"));
        assert!(vert.contains("uv = tex;"));
    }

    #[test]
    fn two_sided_flips_back_faces() {
        let mut doc = diffuse_doc();
        doc.settings.two_sided = true;
        let mut p = build(&doc, PassKind::Mesh, env_with(RenderPathSettings::default(), &[]));
        assert_eq!(p.out.con.data.cull_mode, "none");
        assert!(p.frag().contains("if (!gl_FrontFacing) n *= -1;"));
    }
}
