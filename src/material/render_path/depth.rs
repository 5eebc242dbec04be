//! Depth-only script shared by the `depth` prepass and `shadowmap` passes.

use crate::dsl::Billboard;
use crate::material::context::{ContextRecord, ShaderContext, VertexElement};
use crate::material::parser::ParseOptions;
use crate::material::shader::Stage;
use crate::material::utils::fmt_float;

use super::settings::Displacement;
use super::{PassState, finalize, tess};

pub fn make(st: &mut PassState<'_>, name: &str, shadowmap: bool) -> ShaderContext {
    let mat = st.mat();
    let mut record = ContextRecord::new(name);
    record.vertex_elements = vec![VertexElement::new("pos", "short4norm")];
    if st.is_disp {
        record.vertex_elements.push(VertexElement::new("nor", "short2norm"));
    }
    record.color_writes_red = Some(vec![false]);
    record.color_writes_green = Some(vec![false]);
    record.color_writes_blue = Some(vec![false]);
    record.color_writes_alpha = Some(vec![false]);

    let mut con = ShaderContext::new(&st.doc.name, record);
    con.make(Stage::Frag);
    let mut vert = con.make(Stage::Vert);
    vert.write_attrib("vec4 spos = vec4(pos.xyz, 1.0);");
    vert.add_include("compiled.inc");
    con.frag().add_include("compiled.inc");

    let parse_opacity = st.has_rpass("translucent") || st.has_rpass("refraction") || mat.discard;
    st.parse_opacity = parse_opacity;
    if parse_opacity {
        let mut frag = con.frag();
        frag.write("float opacity;");
        frag.write("float ior;");
    }
    let opts = ParseOptions {
        parse_surface: false,
        parse_opacity,
        ..ParseOptions::default()
    };

    if st.is_disp {
        if st.rp().displacement == Displacement::Tessellation {
            write_tessellated(st, &mut con, opts, shadowmap);
        } else {
            write_displaced(st, &mut con, opts, shadowmap);
        }
    } else {
        con.link_stages(Stage::Vert, Stage::Frag);
        let mut vert = con.vert();
        if shadowmap {
            let link = match mat.billboard {
                Billboard::Spherical => "_lightWorldViewProjectionMatrixSphere",
                Billboard::Cylindrical => "_lightWorldViewProjectionMatrixCylinder",
                Billboard::Off => "_lightWorldViewProjectionMatrix",
            };
            vert.add_uniform("mat4 LWVP", Some(link));
            vert.write("gl_Position = LWVP * spos;");
        } else {
            let link = match mat.billboard {
                Billboard::Spherical => "_worldViewProjectionMatrixSphere",
                Billboard::Cylindrical => "_worldViewProjectionMatrixCylinder",
                Billboard::Off => "_worldViewProjectionMatrix",
            };
            vert.add_uniform("mat4 WVP", Some(link));
            vert.write("gl_Position = WVP * spos;");
        }

        if parse_opacity {
            st.parse(&mut con, opts);
            write_uv_colour(&mut con, mat.tilesheet);
        }
    }

    if parse_opacity {
        let opac = if mat.discard {
            fmt_float(mat.discard_opacity_shadows)
        } else {
            "1.0".to_string()
        };
        con.frag().write(&format!("if (opacity < {opac}) discard;"));
    }

    finalize::make(st, &mut con);
    con
}

/// Varyings the opacity parse may read, written in the vertex body.
fn write_uv_colour(con: &mut ShaderContext, tilesheet: bool) {
    let mut vert = con.vert();
    if vert.is_elem("tex") {
        vert.add_out("vec2 texCoord");
        vert.add_uniform("float texUnpack", Some("_texUnpack"));
        if tilesheet {
            vert.add_uniform("vec2 tilesheetOffset", Some("_tilesheetOffset"));
            vert.write("texCoord = tex * texUnpack + tilesheetOffset;");
        } else {
            vert.write("texCoord = tex * texUnpack;");
        }
    }
    if vert.is_elem("tex1") {
        vert.add_out("vec2 texCoord1");
        vert.write("texCoord1 = tex1;");
    }
    if vert.is_elem("col") {
        vert.add_out("vec3 vcolor");
        vert.write("vcolor = col.rgb;");
    }
}

fn write_displaced(st: &mut PassState<'_>, con: &mut ShaderContext, opts: ParseOptions, shadowmap: bool) {
    con.link_stages(Stage::Vert, Stage::Frag);
    let mut vert = con.vert();
    vert.add_uniform("mat3 N", Some("_normalMatrix"));
    vert.write("vec3 wnormal = normalize(N * vec3(nor.xy, pos.w));");
    st.parse(con, opts);

    let mut vert = con.vert();
    if vert.is_elem("tex") {
        vert.add_out("vec2 texCoord");
        vert.add_uniform("float texUnpack", Some("_texUnpack"));
        vert.write_attrib("texCoord = tex * texUnpack;");
    }
    if vert.is_elem("tex1") {
        vert.add_out("vec2 texCoord1");
        vert.add_uniform("float texUnpack", Some("_texUnpack"));
        vert.write_attrib("texCoord1 = tex1 * texUnpack;");
    }
    if vert.is_elem("col") {
        vert.add_out("vec3 vcolor");
        vert.write_attrib("vcolor = col.rgb;");
    }
    vert.write("wposition += wnormal * disp;");
    if shadowmap {
        vert.add_uniform("mat4 LVP", Some("_lightViewProjectionMatrix"));
        vert.write("gl_Position = LVP * vec4(wposition, 1.0);");
    } else {
        vert.add_uniform("mat4 VP", Some("_viewProjectionMatrix"));
        vert.write("gl_Position = VP * vec4(wposition, 1.0);");
    }
}

fn write_tessellated(st: &mut PassState<'_>, con: &mut ShaderContext, opts: ParseOptions, shadowmap: bool) {
    con.make(Stage::Tesc);
    con.make(Stage::Tese);
    con.link_stages(Stage::Vert, Stage::Tesc);
    con.link_stages(Stage::Tesc, Stage::Tese);
    con.link_stages(Stage::Tese, Stage::Frag);

    let mut vert = con.vert();
    vert.add_out("vec3 wnormal");
    vert.add_uniform("mat3 N", Some("_normalMatrix"));
    vert.write("wnormal = normalize(N * vec3(nor.xy, pos.w));");

    let (inner, outer) = (st.rp().tess_shadows_inner, st.rp().tess_shadows_outer);
    tess::tesc_levels(&mut con.stage(Stage::Tesc), inner, outer);
    tess::interpolate(con, "wposition", 3, false, false);
    tess::interpolate(con, "wnormal", 3, true, false);

    st.parse(con, opts);

    for (elem, var, size, src) in [
        ("tex", "texCoord", 2, "texCoord = tex * texUnpack;"),
        ("tex1", "texCoord1", 2, "texCoord1 = tex1;"),
        ("col", "vcolor", 3, "vcolor = col.rgb;"),
    ] {
        if !con.is_elem(elem) {
            continue;
        }
        let mut vert = con.vert();
        vert.add_out(&format!("vec{size} {var}"));
        if elem == "tex" {
            vert.add_uniform("float texUnpack", Some("_texUnpack"));
        }
        vert.write(src);
        let declare = con.contains(Stage::Frag, var);
        tess::interpolate(con, var, size, false, declare);
    }

    let mut tese = con.stage(Stage::Tese);
    let (decl, link, mvp) = if shadowmap {
        ("mat4 LVP", "_lightViewProjectionMatrix", "LVP")
    } else {
        ("mat4 VP", "_viewProjectionMatrix", "VP")
    };
    tese.add_uniform(decl, Some(link));
    tese.write("wposition += wnormal * disp;");
    tese.write(&format!("gl_Position = {mvp} * vec4(wposition, 1.0);"));
}

#[cfg(test)]
mod tests {
    use crate::dsl::MaterialDoc;
    use crate::material::parser::test_utils::*;
    use crate::material::render_path::PassKind;
    use crate::material::render_path::settings::{Displacement, RenderPathSettings};
    use crate::material::render_path::test_utils::{build, env_with};
    use crate::material::shader::Stage;

    fn diffuse_doc() -> MaterialDoc {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(d, 0, o, 0);
        test_material(vec![b.build()])
    }

    fn displaced_doc() -> MaterialDoc {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        let h = b.node("Height", "VALUE", vec![], vec![value("Value", 0.1)]);
        b.link(d, 0, o, 0).link(h, 0, o, 2);
        test_material(vec![b.build()])
    }

    #[test]
    fn shadowmap_writes_depth_only() {
        let mut p = build(&diffuse_doc(), PassKind::Shadowmap, env_with(RenderPathSettings::default(), &[]));
        let rec = &p.out.con.data;
        assert_eq!(rec.name, "shadowmap");
        assert!(rec.depth_write);
        assert_eq!(rec.color_writes_red, Some(vec![false]));
        assert_eq!(rec.vertex_elements.len(), 1);
        assert_eq!(rec.vertex_shader.as_deref(), Some("Mat_shadowmap.vert"));
        assert!(p.vert().contains("gl_Position = LWVP * spos;"));
        assert!(!p.frag().contains("discard"));
    }

    #[test]
    fn depth_prepass_uses_camera_matrix() {
        let mut p = build(&diffuse_doc(), PassKind::Depth, env_with(RenderPathSettings::default(), &[]));
        assert_eq!(p.out.con.data.name, "depth");
        assert!(p.vert().contains("gl_Position = WVP * spos;"));
    }

    #[test]
    fn discard_uses_shadow_threshold() {
        let mut doc = diffuse_doc();
        doc.settings.discard = true;
        let mut p = build(&doc, PassKind::Shadowmap, env_with(RenderPathSettings::default(), &[]));
        let frag = p.frag();
        assert!(frag.contains("float opacity;"));
        assert!(frag.contains("opacity = 1.0;"));
        assert!(frag.contains("if (opacity < 0.1) discard;"));
        assert!(!frag.contains("basecol ="));
    }

    #[test]
    fn vertex_displacement_moves_the_light_space_position() {
        let mut p = build(&displaced_doc(), PassKind::Shadowmap, env_with(RenderPathSettings::default(), &[]));
        assert!(p.out.con.is_elem("nor"));
        let vert = p.vert();
        assert!(vert.contains("vec3 wnormal = normalize(N * vec3(nor.xy, pos.w));"));
        assert!(vert.contains("vec3 disp = vec3(Height_Value_res);"));
        assert!(vert.contains("gl_Position = LVP * vec4(wposition, 1.0);"));
        assert!(vert.contains("vec3 wposition = vec4(W * spos).xyz;"));
    }

    #[test]
    fn tessellated_shadows_use_shadow_levels() {
        let rp = RenderPathSettings {
            displacement: Displacement::Tessellation,
            tess_shadows_inner: 5,
            tess_shadows_outer: 3,
            ..RenderPathSettings::default()
        };
        let mut p = build(&displaced_doc(), PassKind::Shadowmap, env_with(rp, &[]));
        let tesc = p.stage(Stage::Tesc);
        assert!(tesc.contains("gl_TessLevelInner[0] = 5.0;"));
        assert!(tesc.contains("gl_TessLevelOuter[0] = 3.0;"));
        let tese = p.stage(Stage::Tese);
        assert!(tese.contains("vec3 wposition = wposition_0 + wposition_1 + wposition_2;"));
        assert!(tese.contains("gl_Position = LVP * vec4(wposition, 1.0);"));
    }
}
