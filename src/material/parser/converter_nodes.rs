use serde::Deserialize;

use super::{NodeAt, ParserState};
use crate::dsl::SocketType;
use crate::material::functions;
use crate::material::utils::{fmt_float, rgb_to_bw, to_vec1, to_vec3};

/// Literal default for unlinked inputs, parsed expression otherwise.
fn value_or_literal(state: &mut ParserState<'_>, at: &NodeAt<'_>, index: usize) -> String {
    let inp = at.input(index);
    if state.is_linked(inp) {
        state.parse_value_input(inp)
    } else {
        to_vec1(state.in_socket(inp).map(|s| s.default_f32()).unwrap_or(0.0))
    }
}

/// Compile a MAP_RANGE node.
pub fn parse_maprange(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let value = value_or_literal(state, &at, 0);
    let from_min = state.parse_value_input(at.input(1));
    let from_max = state.parse_value_input(at.input(2));
    let to_min = state.parse_value_input(at.input(3));
    let to_max = state.parse_value_input(at.input(4));

    let interp = at.param_str("interpolation_type").unwrap_or("LINEAR");
    let out = match interp {
        "LINEAR" => {
            state.add_function(functions::MAP_RANGE_LINEAR);
            format!("map_range_linear({value}, {from_min}, {from_max}, {to_min}, {to_max})")
        }
        "STEPPED" => {
            let steps = state.parse_value_input(at.input(5));
            state.add_function(functions::MAP_RANGE_STEPPED);
            format!("map_range_stepped({value}, {from_min}, {from_max}, {to_min}, {to_max}, {steps})")
        }
        "SMOOTHSTEP" => {
            state.add_function(functions::MAP_RANGE_SMOOTHSTEP);
            format!("map_range_smoothstep({value}, {from_min}, {from_max}, {to_min}, {to_max})")
        }
        "SMOOTHERSTEP" => {
            state.add_function(functions::MAP_RANGE_SMOOTHERSTEP);
            format!("map_range_smootherstep({value}, {from_min}, {from_max}, {to_min}, {to_max})")
        }
        other => {
            state.warn(&format!("Interpolation mode {other} not supported for Map Range node"));
            return "0.0".to_string();
        }
    };

    if at.param_bool("clamp") {
        format!("clamp({out}, {to_min}, {to_max})")
    } else {
        out
    }
}

/// Compile a BLACKBODY node.
pub fn parse_blackbody(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let t = state.parse_value_input(at.input(0));
    state.add_function(functions::BLACKBODY);
    format!("blackbody({t})")
}

/// Compile a CLAMP node.
pub fn parse_clamp(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let value = state.parse_value_input(at.input_named("Value"));
    let min = state.parse_value_input(at.input_named("Min"));
    let max = state.parse_value_input(at.input_named("Max"));

    match at.param_str("clamp_type").unwrap_or("MINMAX") {
        "MINMAX" => format!("clamp({value}, {min}, {max})"),
        "RANGE" => format!("{min} < {max} ? clamp({value}, {min}, {max}) : clamp({value}, {max}, {min})"),
        other => {
            state.warn(&format!("Clamp node: unsupported clamp type {other}."));
            value
        }
    }
}

#[derive(Debug, Deserialize)]
struct RampElement {
    position: f32,
    color: Vec<f32>,
}

impl RampElement {
    fn rgb(&self) -> String {
        let c = |i: usize| fmt_float(self.color.get(i).copied().unwrap_or(0.0));
        format!("vec3({}, {}, {})", c(0), c(1), c(2))
    }
}

/// Compile a VALTORGB (colour ramp) node.
///
/// Stops become constant arrays with the last entry repeated, so the
/// `[i + 1]` lookup stays in bounds.
pub fn parse_valtorgb(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    // Alpha
    if at.out == 1 {
        return "1.0".to_string();
    }

    let fac = value_or_literal(state, &at, 0);
    let elems: Vec<RampElement> = at
        .node
        .params
        .get("elements")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let (Some(first), Some(last)) = (elems.first(), elems.last()) else {
        state.warn(&format!("Color ramp \"{}\" has no elements", at.node.name));
        return to_vec3(&[0.0; 3]);
    };
    if elems.len() == 1 {
        return to_vec3(&first.color);
    }

    let name = state.node_name(&at.node.name);
    let cols_var = format!("{}_COLS", name.to_uppercase());
    let mut cols: Vec<String> = elems.iter().map(RampElement::rgb).collect();
    cols.push(last.rgb());
    state.cur_stage().add_const("vec3", &cols_var, &cols.join(", "), elems.len() + 1);

    let fac_var = format!("{name}_fac");
    state.write(&format!("float {fac_var} = {fac};"));

    let steps: Vec<String> = elems[1..]
        .iter()
        .map(|e| format!("(({fac_var} > {}) ? 1 : 0)", fmt_float(e.position)))
        .collect();
    let index_var = format!("{name}_i");
    state.write(&format!("int {index_var} = 0 + {};", steps.join(" + ")));

    if at.param_str("interpolation") == Some("CONSTANT") {
        return format!("{cols_var}[{index_var}]");
    }

    let facs_var = format!("{}_FACS", name.to_uppercase());
    let mut facs: Vec<String> = elems.iter().map(|e| fmt_float(e.position)).collect();
    facs.push("1.0".to_string());
    state.cur_stage().add_const("float", &facs_var, &facs.join(", "), elems.len() + 1);

    let prev_fac = format!("{facs_var}[{index_var}]");
    let next_fac = format!("{facs_var}[{index_var} + 1]");
    let rel_pos = format!("({fac_var} - {prev_fac}) * (1.0 / ({next_fac} - {prev_fac}))");
    format!("mix({cols_var}[{index_var}], {cols_var}[{index_var} + 1], max({rel_pos}, 0.0))")
}

/// Compile a COMBHSV node.
pub fn parse_combhsv(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    state.add_function(functions::HUE_SAT);
    let h = state.parse_value_input(at.input(0));
    let s = state.parse_value_input(at.input(1));
    let v = state.parse_value_input(at.input(2));
    format!("hsv_to_rgb(vec3({h}, {s}, {v}))")
}

/// Compile a COMBRGB node.
pub fn parse_combrgb(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let r = state.parse_value_input(at.input(0));
    let g = state.parse_value_input(at.input(1));
    let b = state.parse_value_input(at.input(2));
    format!("vec3({r}, {g}, {b})")
}

/// Compile a COMBXYZ node.
pub fn parse_combxyz(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let x = state.parse_value_input(at.input(0));
    let y = state.parse_value_input(at.input(1));
    let z = state.parse_value_input(at.input(2));
    format!("vec3({x}, {y}, {z})")
}

/// Compile a WAVELENGTH node.
pub fn parse_wavelength(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    state.add_function(functions::WAVELENGTH_TO_RGB);
    let wl = state.parse_value_input(at.input(0));
    // 450 to 600 nanometers
    format!("wavelength_to_rgb(({wl} - 450.0) / 150.0)")
}

/// Compile a VECT_MATH node. The output socket type picks the vector or
/// scalar operation table.
pub fn parse_vectormath(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let op = at.param_str("operation").unwrap_or("ADD");
    let a = state.parse_vector_input(at.input(0));
    let b = state.parse_vector_input(at.input(1));

    if at.out_socket().map(|s| s.socket_type) == Some(SocketType::Vector) {
        return match op {
            "ADD" => format!("({a} + {b})"),
            "SUBTRACT" => format!("({a} - {b})"),
            "MULTIPLY" => format!("({a} * {b})"),
            "DIVIDE" => {
                state.add_function(functions::SAFE_DIVIDE);
                format!("safe_divide({a}, {b})")
            }
            "NORMALIZE" => format!("normalize({a})"),
            "SCALE" => {
                // Scale lives on input 3
                let scale = state.parse_value_input(at.input(3));
                format!("{a} * {scale}")
            }
            "REFLECT" => format!("reflect({a}, normalize({b}))"),
            "PROJECT" => {
                state.add_function(functions::PROJECT);
                format!("project({a}, {b})")
            }
            "CROSS_PRODUCT" => format!("cross({a}, {b})"),
            "SINE" => format!("sin({a})"),
            "COSINE" => format!("cos({a})"),
            "TANGENT" => format!("tan({a})"),
            "MODULO" => format!("mod({a}, {b})"),
            "FRACTION" => format!("fract({a})"),
            "SNAP" => {
                state.add_function(functions::SAFE_DIVIDE);
                format!("floor(safe_divide({a}, {b})) * {b}")
            }
            "WRAP" => {
                let c = state.parse_vector_input(at.input(2));
                state.add_function(functions::WRAP);
                format!("wrap({a}, {b}, {c})")
            }
            "CEIL" => format!("ceil({a})"),
            "FLOOR" => format!("floor({a})"),
            "MAXIMUM" => format!("max({a}, {b})"),
            "MINIMUM" => format!("min({a}, {b})"),
            "ABSOLUTE" => format!("abs({a})"),
            other => {
                state.warn(&format!("Vectormath node: unsupported operation {other}."));
                a
            }
        };
    }

    match op {
        "DOT_PRODUCT" => format!("dot({a}, {b})"),
        "DISTANCE" => format!("distance({a}, {b})"),
        "LENGTH" => format!("length({a})"),
        other => {
            state.warn(&format!("Vectormath node: unsupported operation {other}."));
            "0.0".to_string()
        }
    }
}

/// Compile a MATH node.
pub fn parse_math(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let a = state.parse_value_input(at.input(0));
    let b = state.parse_value_input(at.input(1));
    let op = at.param_str("operation").unwrap_or("ADD");

    let out = match op {
        "ADD" => format!("({a} + {b})"),
        "SUBTRACT" => format!("({a} - {b})"),
        "MULTIPLY" => format!("({a} * {b})"),
        "DIVIDE" => format!("({a} / {b})"),
        "MULTIPLY_ADD" => {
            let c = state.parse_value_input(at.input(2));
            format!("({a} * {b} + {c})")
        }
        "POWER" => format!("pow({a}, {b})"),
        "LOGARITHM" => format!("log({a})"),
        "SQRT" => format!("sqrt({a})"),
        "INVERSE_SQRT" => format!("inversesqrt({a})"),
        "ABSOLUTE" => format!("abs({a})"),
        "EXPONENT" => format!("exp({a})"),
        "MINIMUM" => format!("min({a}, {b})"),
        "MAXIMUM" => format!("max({a}, {b})"),
        "LESS_THAN" => format!("float({a} < {b})"),
        "GREATER_THAN" => format!("float({a} > {b})"),
        "SIGN" => format!("sign({a})"),
        "COMPARE" => {
            let c = state.parse_value_input(at.input(2));
            format!("float((abs({a} - {b}) <= max({c}, 1e-5)) ? 1.0 : 0.0)")
        }
        "SMOOTH_MIN" => {
            let c = state.parse_value_input(at.input(2));
            let h = format!("(max({c} - abs({a} - {b}), 0.0) / {c})");
            format!("float(float({c} != 0.0 ? min({a},{b}) - {h} * {h} * {h} * {c} * (1.0 / 6.0) : min({a}, {b})))")
        }
        "SMOOTH_MAX" => {
            let c = state.parse_value_input(at.input(2));
            let h = format!("(max({c} - abs(-{a} - (-{b})), 0.0) / {c})");
            format!(
                "float(0-(float({c} != 0.0 ? min(-{a},-{b}) - {h} * {h} * {h} * {c} * (1.0 / 6.0) : min(-{a}, (-{b})))))"
            )
        }
        "ROUND" => format!("floor({a} + 0.5)"),
        "FLOOR" => format!("floor({a})"),
        "CEIL" => format!("ceil({a})"),
        "TRUNC" => format!("trunc({a})"),
        "FRACT" => format!("fract({a})"),
        "MODULO" => format!("mod({a}, {b})"),
        "WRAP" => {
            let c = state.parse_value_input(at.input(2));
            format!("float((({b}-{c}) != 0.0) ? {a} - (({b}-{c}) * floor(({a} - {c}) / ({b}-{c}))) : {c})")
        }
        "SNAP" => format!("floor(({b} != 0.0) ? {a} / {b} : 0.0) * {b}"),
        "PINGPONG" => format!("float(({b} != 0.0) ? abs(fract(({a} - {b}) / ({b} * 2.0)) * {b} * 2.0 - {b}) : 0.0)"),
        "SINE" => format!("sin({a})"),
        "COSINE" => format!("cos({a})"),
        "TANGENT" => format!("tan({a})"),
        "ARCSINE" => format!("asin({a})"),
        "ARCCOSINE" => format!("acos({a})"),
        "ARCTANGENT" => format!("atan({a})"),
        "ARCTAN2" => format!("atan({a}, {b})"),
        "SINH" => format!("sinh({a})"),
        "COSH" => format!("cosh({a})"),
        "TANH" => format!("tanh({a})"),
        "RADIANS" => format!("radians({a})"),
        "DEGREES" => format!("degrees({a})"),
        other => {
            state.warn(&format!("Math node: unsupported operation {other}."));
            "0.0".to_string()
        }
    };

    if at.param_bool("use_clamp") {
        format!("clamp({out}, 0.0, 1.0)")
    } else {
        out
    }
}

/// Compile an RGBTOBW node.
pub fn parse_rgbtobw(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    rgb_to_bw(&state.parse_vector_input(at.input(0)))
}

/// Compile a SEPHSV node. The conversion is shared by all three outputs.
pub fn parse_sephsv(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    state.add_function(functions::HUE_SAT);
    let hsv_var = format!("{}_hsv", state.node_name(&at.node.name));
    if !state.cur_stage().contains(&hsv_var) {
        let col = state.parse_vector_input(at.input_named("Color"));
        state.write(&format!("vec3 {hsv_var} = rgb_to_hsv({col}.rgb);"));
    }
    match at.out {
        0 => format!("{hsv_var}.x"),
        1 => format!("{hsv_var}.y"),
        _ => format!("{hsv_var}.z"),
    }
}

/// Compile a SEPRGB node.
pub fn parse_seprgb(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let col = state.parse_vector_input(at.input(0));
    match at.out {
        0 => format!("{col}.r"),
        1 => format!("{col}.g"),
        _ => format!("{col}.b"),
    }
}

/// Compile a SEPXYZ node.
pub fn parse_sepxyz(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let vec = state.parse_vector_input(at.input(0));
    match at.out {
        0 => format!("{vec}.x"),
        1 => format!("{vec}.y"),
        _ => format!("{vec}.z"),
    }
}
