//! Literal formatting and identifier helpers shared by the material backend.

/// Formats a float as a shader literal. The result always carries a decimal
/// point, so `1.0` stays `1.0` and never collapses to the integer `1`.
pub fn fmt_float(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = format!("{v}");
    if s.contains('.') { s } else { format!("{s}.0") }
}

pub fn to_vec1(v: f32) -> String {
    fmt_float(v)
}

pub fn to_vec2(v: &[f32]) -> String {
    format!("vec2({}, {})", comp(v, 0), comp(v, 1))
}

pub fn to_vec3(v: &[f32]) -> String {
    format!("vec3({}, {}, {})", comp(v, 0), comp(v, 1), comp(v, 2))
}

pub fn to_vec4(v: &[f32]) -> String {
    format!(
        "vec4({}, {}, {}, {})",
        comp(v, 0),
        comp(v, 1),
        comp(v, 2),
        comp(v, 3)
    )
}

fn comp(v: &[f32], i: usize) -> String {
    fmt_float(v.get(i).copied().unwrap_or(0.0))
}

/// Rec. 709 luma of a `vec3` expression.
pub fn rgb_to_bw(res_var: &str) -> String {
    format!("dot({res_var}, vec3(0.2126, 0.7152, 0.0722))")
}

/// Casts an already generated expression between shader types.
///
/// Returns `None` for casts the node editor never produces (towards `int`,
/// or anything involving `vec2`).
pub fn cast_value(val: &str, from_type: &str, to_type: &str) -> Option<String> {
    if from_type == to_type {
        return Some(val.to_string());
    }
    match (from_type, to_type) {
        ("int" | "float", "int" | "float") => Some(val.to_string()),
        ("int" | "float", "vec2" | "vec3" | "vec4") => Some(format!("{to_type}({val})")),
        ("vec3" | "vec4", "float") => Some(rgb_to_bw(val)),
        ("vec3", "vec4") => Some(format!("vec4({val}, 1.0)")),
        ("vec4", "vec3") => Some(format!("{val}.xyz")),
        _ => None,
    }
}

/// Replaces characters that are unsafe in file and asset names.
pub fn safestr(s: &str) -> String {
    const UNSAFE: &str = r"[]/\;,><&*:%=+@!#^()|?^";
    s.chars()
        .map(|c| if UNSAFE.contains(c) || !c.is_ascii() { '_' } else { c })
        .collect()
}

/// Turns an arbitrary name into a valid shader / C identifier.
pub fn safesrc(s: &str) -> String {
    let mut out: String = safestr(s)
        .chars()
        .filter(|c| *c != ' ')
        .map(|c| if c == '.' || c == '-' { '_' } else { c })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Number of components for a vertex element data format.
pub fn data_size(data: &str) -> usize {
    match data {
        "float1" => 1,
        "float2" | "short2norm" => 2,
        "float3" => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_literals_keep_a_decimal_point() {
        assert_eq!(fmt_float(1.0), "1.0");
        assert_eq!(fmt_float(0.0), "0.0");
        assert_eq!(fmt_float(0.8), "0.8");
        assert_eq!(fmt_float(-2.0), "-2.0");
        assert_eq!(fmt_float(f32::NAN), "0.0");
    }

    #[test]
    fn vectors_use_constructor_form() {
        assert_eq!(to_vec3(&[1.0, 0.5, 0.0]), "vec3(1.0, 0.5, 0.0)");
        assert_eq!(to_vec2(&[1.0]), "vec2(1.0, 0.0)");
        assert_eq!(to_vec4(&[0.0, 0.0, 0.0, 1.0]), "vec4(0.0, 0.0, 0.0, 1.0)");
    }

    #[test]
    fn safesrc_produces_identifiers() {
        assert_eq!(safesrc("Principled BSDF"), "PrincipledBSDF");
        assert_eq!(safesrc("Mix.001"), "Mix_001");
        assert_eq!(safesrc("2nd-pass"), "_2nd_pass");
        assert_eq!(safesrc("a(b)é"), "a_b__");
    }

    #[test]
    fn casts_between_shader_types() {
        assert_eq!(cast_value("x", "float", "vec3").as_deref(), Some("vec3(x)"));
        assert_eq!(cast_value("c", "vec4", "vec3").as_deref(), Some("c.xyz"));
        assert_eq!(cast_value("c", "vec3", "vec4").as_deref(), Some("vec4(c, 1.0)"));
        assert_eq!(cast_value("v", "vec2", "vec3"), None);
    }
}
