use super::{NodeAt, ParserState};
use crate::material::functions;

/// Compile a BRIGHTCONTRAST node.
pub fn parse_brightcontrast(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let col = state.parse_vector_input(at.input(0));
    let bright = state.parse_value_input(at.input(1));
    let contr = state.parse_value_input(at.input(2));
    state.add_function(functions::BRIGHTCONTRAST);
    format!("brightcontrast({col}, {bright}, {contr})")
}

/// Compile a GAMMA node.
pub fn parse_gamma(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let col = state.parse_vector_input(at.input(0));
    let gamma = state.parse_value_input(at.input(1));
    format!("pow({col}, vec3({gamma}))")
}

/// Compile a HUE_SAT node.
pub fn parse_huesat(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    state.add_function(functions::HUE_SAT);
    let hue = state.parse_value_input(at.input(0));
    let sat = state.parse_value_input(at.input(1));
    let val = state.parse_value_input(at.input(2));
    let fac = state.parse_value_input(at.input(3));
    let col = state.parse_vector_input(at.input(4));
    format!("hue_sat({col}, vec4({hue}-0.5, {sat}, {val}, 1.0-{fac}))")
}

/// Compile an INVERT node.
pub fn parse_invert(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let fac = state.parse_value_input(at.input(0));
    let col = state.parse_vector_input(at.input(1));
    format!("mix({col}, vec3(1.0) - ({col}), {fac})")
}

/// Compile a MIX_RGB node.
pub fn parse_mixrgb(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let fac_in = at.input(0);
    let fac = state.parse_value_input(fac_in);
    let f = if state.is_linked(fac_in) {
        let fac_var = format!("{}_fac", state.node_name(&at.node.name));
        state.write(&format!("float {fac_var} = {fac};"));
        fac_var
    } else {
        fac
    };
    let a = state.parse_vector_input(at.input(1));
    let b = state.parse_vector_input(at.input(2));

    let blend = at.param_str("blend_type").unwrap_or("MIX");
    let out = match blend {
        "MIX" => format!("mix({a}, {b}, {f})"),
        "ADD" => format!("mix({a}, {a} + {b}, {f})"),
        "MULTIPLY" => format!("mix({a}, {a} * {b}, {f})"),
        "SUBTRACT" => format!("mix({a}, {a} - {b}, {f})"),
        "SCREEN" => format!("(vec3(1.0) - (vec3(1.0 - {f}) + {f} * (vec3(1.0) - {b})) * (vec3(1.0) - {a}))"),
        "DIVIDE" => format!("(vec3((1.0 - {f}) * {a} + {f} * {a} / {b}))"),
        "DIFFERENCE" => format!("mix({a}, abs({a} - {b}), {f})"),
        "DARKEN" => format!("min({a}, {b} * {f})"),
        "LIGHTEN" => format!("max({a}, {b} * {f})"),
        // Approximated by a plain mix
        "OVERLAY" | "DODGE" | "BURN" | "HUE" | "SATURATION" | "VALUE" | "COLOR" | "LINEAR_LIGHT" => {
            format!("mix({a}, {b}, {f})")
        }
        "SOFT_LIGHT" => format!(
            "((1.0 - {f}) * {a} + {f} * ((vec3(1.0) - {a}) * {b} * {a} + {a} * (vec3(1.0) - (vec3(1.0) - {b}) * (vec3(1.0) - {a}))))"
        ),
        other => {
            state.warn(&format!("MixRGB node: unsupported blend type {other}."));
            return a;
        }
    };
    if at.param_bool("use_clamp") {
        format!("clamp({out}, vec3(0.0), vec3(1.0))")
    } else {
        out
    }
}

/// Compile a LIGHT_FALLOFF node.
pub fn parse_lightfalloff(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    state.parse_value_input(at.input_named("Strength"))
}
