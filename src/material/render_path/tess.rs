//! Tessellation helpers.

use crate::material::context::ShaderContext;
use crate::material::shader::{Shader, Stage};
use crate::material::utils::fmt_float;

/// Writes the patch tessellation levels into the control stage.
pub fn tesc_levels(tesc: &mut Shader, inner: u32, outer: u32) {
    let inner = fmt_float(inner as f32);
    let outer = fmt_float(outer as f32);
    tesc.write("if (gl_InvocationID == 0) {");
    tesc.write(&format!("\tgl_TessLevelInner[0] = {inner};"));
    tesc.write(&format!("\tgl_TessLevelOuter[0] = {outer};"));
    tesc.write(&format!("\tgl_TessLevelOuter[1] = {outer};"));
    tesc.write(&format!("\tgl_TessLevelOuter[2] = {outer};"));
    tesc.write("}");
}

/// Barycentric interpolation of the control-stage copy `tc_<var>` in the
/// evaluation stage. With `declare_out` the result is also passed on to the
/// next stage, otherwise it is a local.
pub fn interpolate(con: &mut ShaderContext, var: &str, size: usize, normalize: bool, declare_out: bool) {
    let mut tese = con.stage(Stage::Tese);
    tese.add_include("compiled.inc");
    let vec = format!("vec{size}");
    if declare_out {
        tese.add_out(&format!("{vec} {var}"));
    }
    tese.write_attrib(&format!("{vec} {var}_0 = gl_TessCoord.x * tc_{var}[0];"));
    tese.write_attrib(&format!("{vec} {var}_1 = gl_TessCoord.y * tc_{var}[1];"));
    tese.write_attrib(&format!("{vec} {var}_2 = gl_TessCoord.z * tc_{var}[2];"));
    let prep = if declare_out { String::new() } else { format!("{vec} ") };
    let sum = format!("{var}_0 + {var}_1 + {var}_2");
    if normalize {
        tese.write_attrib(&format!("{prep}{var} = normalize({sum});"));
    } else {
        tese.write_attrib(&format!("{prep}{var} = {sum};"));
    }
}
