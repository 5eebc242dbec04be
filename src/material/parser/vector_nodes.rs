use super::{NodeAt, ParserState, SocketRef};
use crate::material::shader::Stage;
use crate::material::utils::to_vec3;

fn vector_or_literal(state: &mut ParserState<'_>, inp: SocketRef) -> (String, Option<Vec<f32>>) {
    if state.is_linked(inp) {
        (state.parse_vector_input(inp), None)
    } else {
        let v = state.in_socket(inp).map(|s| s.default_vec(3)).unwrap_or_else(|| vec![0.0; 3]);
        (to_vec3(&v), Some(v))
    }
}

/// Compile a BUMP node from the four offset height samples collected by
/// the texture feeding its height input.
pub fn parse_bump(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    if state.cur != Stage::Frag {
        state.warn("Bump node not supported outside of fragment shaders");
        return "vec3(0.0)".to_string();
    }

    let strength = state.parse_value_input(at.input(0));
    state.sample_bump = true;
    let _height = state.parse_value_input(at.input(2));
    state.sample_bump = false;
    let _nor = state.parse_vector_input(at.input(3));

    if state.sample_bump_res.is_empty() {
        return "n".to_string();
    }
    let r = std::mem::take(&mut state.sample_bump_res);
    let ext = if at.param_bool("invert") { [1, 2, 3, 4] } else { [2, 1, 4, 3] };
    state.write(&format!("float {r}_fh1 = {r}_{} - {r}_{};", ext[0], ext[1]));
    state.write(&format!("float {r}_fh2 = {r}_{} - {r}_{};", ext[2], ext[3]));
    state.write(&format!("{r}_fh1 *= ({strength}) * 3.0;"));
    state.write(&format!("{r}_fh2 *= ({strength}) * 3.0;"));
    state.write(&format!("vec3 {r}_a = normalize(vec3(2.0, 0.0, {r}_fh1));"));
    state.write(&format!("vec3 {r}_b = normalize(vec3(0.0, 2.0, {r}_fh2));"));
    format!("normalize(mat3({r}_a, {r}_b, normalize(vec3({r}_fh1, {r}_fh2, 2.0))) * n)")
}

/// Compile a MAPPING node.
///
/// `TEXTURE` scales, rotates and then translates inversely; `POINT` and
/// `VECTOR` translate, rotate and then scale.
pub fn parse_mapping(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let texture = at.param_str("vector_type") == Some("TEXTURE");

    let (mut out, _) = vector_or_literal(state, at.input(0));
    let (location, loc_lit) = vector_or_literal(state, at.input_named("Location"));
    let (rotation, rot_lit) = vector_or_literal(state, at.input_named("Rotation"));
    let (scale, scale_lit) = vector_or_literal(state, at.input_named("Scale"));

    let has_location = loc_lit.as_ref().is_none_or(|v| v.iter().any(|c| *c != 0.0));
    let has_rotation = rot_lit.as_ref().is_none_or(|v| v.iter().any(|c| *c != 0.0));
    let has_scale = scale_lit.as_ref().is_none_or(|v| v.iter().any(|c| *c != 1.0));

    let apply_scale = |out: String| -> String {
        if !has_scale {
            out
        } else if texture {
            format!("({out} / {scale})")
        } else {
            format!("({out} * {scale})")
        }
    };
    let apply_location = |out: String| -> String {
        if !has_location {
            out
        } else if texture {
            format!("({out} - {location})")
        } else {
            format!("({out} + {location})")
        }
    };

    out = if texture { apply_scale(out) } else { apply_location(out) };

    if has_rotation {
        let v = format!("{}_rotation", state.node_name(&at.node.name));
        let r = if texture { rotation.clone() } else { format!("-{rotation}") };
        state.write(&format!(
            "mat3 {v}X = mat3(1.0, 0.0, 0.0, 0.0, cos({r}.x), sin({r}.x), 0.0, -sin({r}.x), cos({r}.x));"
        ));
        state.write(&format!(
            "mat3 {v}Y = mat3(cos({r}.y), 0.0, -sin({r}.y), 0.0, 1.0, 0.0, sin({r}.y), 0.0, cos({r}.y));"
        ));
        state.write(&format!(
            "mat3 {v}Z = mat3(cos({r}.z), sin({r}.z), 0.0, -sin({r}.z), cos({r}.z), 0.0, 0.0, 0.0, 1.0);"
        ));
        // XYZ euler order
        out = format!("{out} * {v}X * {v}Y * {v}Z");
    }

    if texture { apply_location(out) } else { apply_scale(out) }
}

/// Compile a NORMAL node.
pub fn parse_normal(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let nor1 = at
        .node
        .output_index("Normal")
        .and_then(|i| at.node.outputs.get(i))
        .map(|s| to_vec3(&s.default_vec(3)))
        .unwrap_or_else(|| to_vec3(&[0.0; 3]));
    if at.out_name() == "Dot" {
        let nor2 = state.parse_vector_input(at.input_named("Normal"));
        return format!("dot({nor1}, {nor2})");
    }
    nor1
}

/// Compile a NORMAL_MAP node. In the fragment stage the map rewrites `n`
/// directly.
pub fn parse_normalmap(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    if state.cur == Stage::Tese {
        return state.parse_vector_input(at.input(1));
    }
    state.parse_normal_map_color_input(at.input(1), Some(at.input(0)));
    "n".to_string()
}

/// Compile a VECT_TRANSFORM node.
pub fn parse_vectortransform(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    // Spaces are not converted
    state.parse_vector_input(at.input(0))
}

/// Compile a DISPLACEMENT node.
pub fn parse_displacement(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let height = state.parse_value_input(at.input(0));
    let _midlevel = state.parse_value_input(at.input(1));
    let scale = state.parse_value_input(at.input(2));
    let _nor = state.parse_vector_input(at.input(3));
    format!("(vec3({height}) * {scale})")
}
