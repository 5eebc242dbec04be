use super::{NodeAt, ParserState};
use crate::material::context::{UniformDefault, UniformOpts};
use crate::material::functions;
use crate::material::shader::Stage;
use crate::material::utils::{cast_value, to_vec1, to_vec3};

fn out_type(at: &NodeAt<'_>) -> &'static str {
    match at.out_socket() {
        Some(s) if s.socket_type.is_value_like() => "float",
        _ => "vec3",
    }
}

fn cast(val: &str, from: &str, to: &str) -> String {
    cast_value(val, from, to).unwrap_or_else(|| val.to_string())
}

/// Compile an ATTRIBUTE node.
///
/// `time` maps to the engine clock, geometry attributes naming one of the
/// first two UV layers read texture coordinates, anything else reads the
/// vertex colour.
pub fn parse_attribute(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let ty = out_type(&at);
    let name = at.param_str("attribute_name").unwrap_or("");

    if name == "time" {
        state.add_uniform("float time", Some("_time"));
        if at.out == 3 {
            return "1.0".to_string();
        }
        return cast("time", "float", ty);
    }

    if at.param_str("attribute_type").unwrap_or("GEOMETRY") == "GEOMETRY" {
        // Alpha output
        if at.out == 3 {
            return "1.0".to_string();
        }
        let uv_layers = &state.doc().settings.uv_layers;
        if uv_layers.first().is_some_and(|l| l == name) {
            state.con.add_elem("tex", "short2norm");
            return cast("vec3(texCoord.x, 1.0 - texCoord.y, 0.0)", "vec3", ty);
        }
        if uv_layers.get(1).is_some_and(|l| l == name) {
            state.con.add_elem("tex1", "short2norm");
            return cast("vec3(texCoord1.x, 1.0 - texCoord1.y, 0.0)", "vec3", ty);
        }
        state.con.add_elem("col", "short4norm");
        return cast("vcolor", "vec3", ty);
    }

    if at.out == 3 {
        return "1.0".to_string();
    }
    cast("0.0", "float", ty)
}

/// Compile an RGB node.
pub fn parse_rgb(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let col = at.out_socket().map(|s| s.default_vec(3)).unwrap_or_else(|| vec![0.0; 3]);
    if at.node.material_param {
        let nn = format!("param_{}", state.node_name(&at.node.name));
        state.cur_stage().add_uniform_with(
            &format!("vec3 {nn}"),
            UniformOpts {
                link: Some(at.node.name.as_str()),
                default_value: Some(UniformDefault::Vec3([col[0], col[1], col[2]])),
                is_material_param: true,
                ..UniformOpts::default()
            },
        );
        return nn;
    }
    to_vec3(&col)
}

/// Compile a VALUE node.
pub fn parse_value(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let v = at.out_socket().map(|s| s.default_f32()).unwrap_or(0.0);
    if at.node.material_param {
        let nn = format!("param_{}", state.node_name(&at.node.name));
        state.cur_stage().add_uniform_with(
            &format!("float {nn}"),
            UniformOpts {
                link: Some(at.node.name.as_str()),
                default_value: Some(UniformDefault::Float(v)),
                is_material_param: true,
                ..UniformOpts::default()
            },
        );
        return nn;
    }
    to_vec1(v)
}

/// Compile a VERTEX_COLOR node.
pub fn parse_vertex_color(state: &mut ParserState<'_>, _at: NodeAt<'_>) -> String {
    state.con.add_elem("col", "short4norm");
    "vcolor".to_string()
}

/// Compile a CAMERA node.
pub fn parse_camera(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    match at.out {
        // View vector
        0 => "vVecCam".to_string(),
        // View Z depth
        1 => {
            state.add_include("std/math.glsl");
            state.add_uniform("vec2 cameraProj", Some("_cameraPlaneProj"));
            "linearize(gl_FragCoord.z, cameraProj)".to_string()
        }
        // View distance
        _ => {
            state.add_uniform("vec3 eye", Some("_cameraPosition"));
            "distance(eye, wposition)".to_string()
        }
    }
}

/// Compile a NEW_GEOMETRY node.
pub fn parse_geometry(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    match at.out {
        0 => "wposition".to_string(),
        1 | 3 => if state.cur == Stage::Frag { "n" } else { "wnormal" }.to_string(),
        2 => "wtangent".to_string(),
        4 => "vVec".to_string(),
        5 => "mposition".to_string(),
        6 => "(1.0 - float(gl_FrontFacing))".to_string(),
        // Pointiness and random per island
        _ => "0.0".to_string(),
    }
}

/// Compile a HAIR_INFO node.
pub fn parse_hairinfo(_state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    if at.out == 3 {
        "vec3(0.0)".to_string()
    } else {
        "0.5".to_string()
    }
}

/// Compile an OBJECT_INFO node.
pub fn parse_objectinfo(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    match at.out {
        0 => "wposition".to_string(),
        1 => "vec3(1.0, 1.0, 1.0)".to_string(),
        2 => "0.0".to_string(),
        3 => {
            state.add_uniform("float objectInfoIndex", Some("_objectInfoIndex"));
            "objectInfoIndex".to_string()
        }
        4 => {
            state.add_uniform("float objectInfoMaterialIndex", Some("_objectInfoMaterialIndex"));
            "objectInfoMaterialIndex".to_string()
        }
        _ => {
            state.add_uniform("float objectInfoRandom", Some("_objectInfoRandom"));
            "objectInfoRandom".to_string()
        }
    }
}

/// Compile a TANGENT node.
pub fn parse_tangent(_state: &mut ParserState<'_>, _at: NodeAt<'_>) -> String {
    "wtangent".to_string()
}

/// Compile a TEX_COORD node.
pub fn parse_texcoord(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    match at.out {
        0 => "bposition".to_string(),
        1 => "n".to_string(),
        2 => {
            state.con.add_elem("tex", "short2norm");
            "vec3(texCoord.x, 1.0 - texCoord.y, 0.0)".to_string()
        }
        3 => "mposition".to_string(),
        5 => {
            state.con.frag().add_uniform("vec2 screenSize", Some("_screenSize"));
            "vec3(gl_FragCoord.xy / screenSize, 0.0)".to_string()
        }
        // Camera and reflection coordinates
        _ => "vec3(0.0)".to_string(),
    }
}

/// Compile a UVMAP node.
pub fn parse_uvmap(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    state.con.add_elem("tex", "short2norm");
    let uv_map = at.param_str("uv_map").unwrap_or("");
    if state.doc().settings.uv_layers.get(1).is_some_and(|l| l == uv_map) {
        state.con.add_elem("tex1", "short2norm");
        return "vec3(texCoord1.x, 1.0 - texCoord1.y, 0.0)".to_string();
    }
    "vec3(texCoord.x, 1.0 - texCoord.y, 0.0)".to_string()
}

fn dot_nv(state: &mut ParserState<'_>, at: &NodeAt<'_>) -> String {
    let nor = at.input(1);
    if state.is_linked(nor) {
        format!("dot({}, vVec)", state.parse_vector_input(nor))
    } else {
        "dotNV".to_string()
    }
}

/// Compile a FRESNEL node.
pub fn parse_fresnel(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    state.add_function(functions::FRESNEL);
    let ior = state.parse_value_input(at.input(0));
    let dotnv = dot_nv(state, &at);
    format!("fresnel({ior}, {dotnv})")
}

/// Compile a LAYER_WEIGHT node.
pub fn parse_layerweight(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let blend = state.parse_value_input(at.input(0));
    let dotnv = dot_nv(state, &at);
    if at.out == 0 {
        state.add_function(functions::FRESNEL);
        format!("fresnel(1.0 / (1.0 - {blend}), {dotnv})")
    } else {
        format!("(1.0 - pow({dotnv}, ({blend} < 0.5) ? 2.0 * {blend} : 0.5 / (1.0 - {blend})))")
    }
}

/// Compile a LIGHT_PATH node. Outputs are matched by name.
pub fn parse_lightpath(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    match at.out_name() {
        "Is Camera Ray" | "Is Diffuse Ray" | "Is Glossy Ray" | "Ray Length" => "1.0".to_string(),
        "Is Shadow Ray" | "Is Singular Ray" | "Is Reflection Ray" | "Is Transmission Ray" | "Ray Depth"
        | "Diffuse Depth" | "Glossy Depth" | "Transparent Depth" | "Transmission Depth" => "0.0".to_string(),
        other => {
            state.warn(&format!("Light Path node: unsupported output {other}."));
            "0.0".to_string()
        }
    }
}

/// Compile a WIREFRAME node.
pub fn parse_wireframe(_state: &mut ParserState<'_>, _at: NodeAt<'_>) -> String {
    "0.0".to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::dsl::SocketType;
    use crate::material::parser::test_utils::*;

    /// Feeds output `out` of `node` into the colour of a diffuse shader.
    fn into_basecol(b: &mut TreeBuilder, node: usize, out: usize) {
        let o = b.output();
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(node, out, d, 0).link(d, 0, o, 0);
    }

    fn into_roughness(b: &mut TreeBuilder, node: usize, out: usize) {
        let o = b.output();
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(node, out, d, 1).link(d, 0, o, 0);
    }

    #[test]
    fn time_attribute_links_engine_clock() {
        let mut b = TreeBuilder::new("Mat");
        let a = b.node(
            "Attr",
            "ATTRIBUTE",
            vec![],
            vec![color("Color", [0.0; 4]), vector("Vector", [0.0; 3]), value("Fac", 0.0), value("Alpha", 0.0)],
        );
        b.param(a, "attribute_name", json!("time"));
        into_roughness(&mut b, a, 2);
        let doc = test_material(vec![b.build()]);
        let mut p = parse_surface(&doc);
        let frag = p.frag();
        assert!(frag.contains("uniform float time;"));
        assert!(frag.contains("float Attr_Fac_res = time;"));
        let c = &p.con.data.constants;
        assert!(c.iter().any(|c| c.name == "time" && c.link.as_deref() == Some("_time")));
    }

    #[test]
    fn attribute_selects_uv_layer_or_vertex_colour() {
        let mut b = TreeBuilder::new("Mat");
        let a = b.node("UV", "ATTRIBUTE", vec![], vec![color("Color", [0.0; 4])]);
        b.param(a, "attribute_name", json!("UVMap"));
        into_basecol(&mut b, a, 0);
        let mut doc = test_material(vec![b.build()]);
        doc.settings.uv_layers = vec!["UVMap".to_string()];
        let mut p = parse_surface(&doc);
        assert!(p.frag().contains("vec3 UV_Color_res = vec3(texCoord.x, 1.0 - texCoord.y, 0.0);"));
        assert!(p.con.is_elem("tex"));

        doc.settings.uv_layers.clear();
        let mut p = parse_surface(&doc);
        assert!(p.frag().contains("vec3 UV_Color_res = vcolor;"));
        assert!(p.con.is_elem("col"));
    }

    #[test]
    fn material_param_rgb_becomes_uniform() {
        let mut b = TreeBuilder::new("Mat");
        let rgb = b.node("Tint", "RGB", vec![], vec![color("Color", [0.5, 0.5, 0.5, 1.0])]);
        b.tree.nodes[rgb].material_param = true;
        into_basecol(&mut b, rgb, 0);
        let doc = test_material(vec![b.build()]);
        let mut p = parse_surface(&doc);
        let frag = p.frag();
        assert!(frag.contains("uniform vec3 param_Tint;"));
        assert!(frag.contains("vec3 Tint_Color_res = param_Tint;"));
        let c = p.con.data.constants.iter().find(|c| c.name == "param_Tint").cloned();
        let c = c.expect("constant registered");
        assert_eq!(c.link.as_deref(), Some("Tint"));
        assert_eq!(c.vec3_value, Some([0.5, 0.5, 0.5]));
        assert_eq!(c.is_arm_parameter, Some(true));
    }

    #[test]
    fn geometry_normal_depends_on_stage() {
        let mut b = TreeBuilder::new("Mat");
        let g = b.node(
            "Geo",
            "NEW_GEOMETRY",
            vec![],
            vec![vector("Position", [0.0; 3]), vector("Normal", [0.0; 3])],
        );
        into_basecol(&mut b, g, 1);
        let doc = test_material(vec![b.build()]);
        assert!(parse_surface(&doc).frag().contains("vec3 Geo_Normal_res = n;"));
    }

    #[test]
    fn window_coordinates_need_screen_size() {
        let mut b = TreeBuilder::new("Mat");
        let outs = ["Generated", "Normal", "UV", "Object", "Camera", "Window", "Reflection"]
            .iter()
            .map(|n| vector(n, [0.0; 3]))
            .collect();
        let t = b.node("Coords", "TEX_COORD", vec![], outs);
        into_basecol(&mut b, t, 5);
        let doc = test_material(vec![b.build()]);
        let frag = parse_surface(&doc).frag();
        assert!(frag.contains("uniform vec2 screenSize;"));
        assert!(frag.contains("vec3(gl_FragCoord.xy / screenSize, 0.0)"));
    }

    #[test]
    fn fresnel_uses_precomputed_dot_when_unlinked() {
        let mut b = TreeBuilder::new("Mat");
        let f = b.node(
            "Fresnel",
            "FRESNEL",
            vec![value("IOR", 1.45), vector("Normal", [0.0; 3])],
            vec![value("Fac", 0.0)],
        );
        into_roughness(&mut b, f, 0);
        let doc = test_material(vec![b.build()]);
        let frag = parse_surface(&doc).frag();
        assert!(frag.contains("float fresnel(float eta, float c)"));
        assert!(frag.contains("float Fresnel_Fac_res = fresnel(1.45, dotNV);"));
    }

    #[test]
    fn layer_weight_facing() {
        let mut b = TreeBuilder::new("Mat");
        let l = b.node(
            "Layer",
            "LAYER_WEIGHT",
            vec![value("Blend", 0.5), vector("Normal", [0.0; 3])],
            vec![value("Fresnel", 0.0), value("Facing", 0.0)],
        );
        into_roughness(&mut b, l, 1);
        let doc = test_material(vec![b.build()]);
        let frag = parse_surface(&doc).frag();
        assert!(frag.contains("float Layer_Facing_res = (1.0 - pow(dotNV, (0.5 < 0.5) ? 2.0 * 0.5 : 0.5 / (1.0 - 0.5)));"));
    }

    #[test]
    fn light_path_outputs_by_name() {
        let mut b = TreeBuilder::new("Mat");
        let l = b.node(
            "Path",
            "LIGHT_PATH",
            vec![],
            vec![
                value("Is Camera Ray", 0.0),
                value("Is Shadow Ray", 0.0),
                sock("Mystery", SocketType::Value, json!(0.0)),
            ],
        );
        into_roughness(&mut b, l, 0);
        let doc = test_material(vec![b.build()]);
        assert!(parse_surface(&doc).frag().contains("float Path_IsCameraRay_res = 1.0;"));
    }
}
