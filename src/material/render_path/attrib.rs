//! Vertex attribute boilerplate shared by the pass scripts.

use crate::dsl::{Billboard, MaterialSettings};
use crate::material::context::ShaderContext;
use crate::material::shader::Stage;

use super::tess;

/// Object-space normal to world space. `declare` makes `wnormal` a local.
pub fn write_norpos(con: &mut ShaderContext, declare: bool) {
    let prep = if declare { "vec3 " } else { "" };
    con.vert()
        .write_attrib(&format!("{prep}wnormal = normalize(N * vec3(nor.xy, pos.w));"));
}

/// Clip-space position, honouring billboarding.
pub fn write_vertpos(con: &mut ShaderContext, mat: &MaterialSettings) {
    let mut vert = con.vert();
    if mat.particle && mat.billboard == Billboard::Spherical {
        vert.add_uniform("mat4 WV", Some("_worldViewMatrix"));
        vert.add_uniform("mat4 P", Some("_projectionMatrix"));
        vert.write("gl_Position = P * (WV * vec4(0.0, 0.0, spos.z, 1.0) + vec4(spos.x, spos.y, 0.0, 0.0));");
        return;
    }
    let link = match (mat.particle, mat.billboard) {
        (true, _) | (false, Billboard::Off) => "_worldViewProjectionMatrix",
        (false, Billboard::Spherical) => "_worldViewProjectionMatrixSphere",
        (false, Billboard::Cylindrical) => "_worldViewProjectionMatrixCylinder",
    };
    vert.add_uniform("mat4 WVP", Some(link));
    vert.write("gl_Position = WVP * spos;");
}

/// Normal matrix uniform, switched by billboarding.
pub fn normal_matrix_link(mat: &MaterialSettings) -> &'static str {
    match mat.billboard {
        Billboard::Off => "_normalMatrix",
        Billboard::Spherical => "_normalMatrixSphere",
        Billboard::Cylindrical => "_normalMatrixCylinder",
    }
}

/// UV varyings for the `tex`/`tex1` elements, interpolated through the
/// evaluation stage when tessellating.
pub fn write_tex_coords(con: &mut ShaderContext, mat: &MaterialSettings) {
    let tessellated = con.has(Stage::Tese);
    if con.is_elem("tex") {
        let mut vert = con.vert();
        vert.add_out("vec2 texCoord");
        vert.add_uniform("float texUnpack", Some("_texUnpack"));
        if mat.tilesheet {
            vert.add_uniform("vec2 tilesheetOffset", Some("_tilesheetOffset"));
            vert.write_attrib("texCoord = tex * texUnpack + tilesheetOffset;");
        } else {
            vert.write_attrib("texCoord = tex * texUnpack;");
        }
        if tessellated {
            let declare = con.contains(Stage::Frag, "texCoord");
            tess::interpolate(con, "texCoord", 2, false, declare);
        }
    }
    if con.is_elem("tex1") {
        let mut vert = con.vert();
        vert.add_out("vec2 texCoord1");
        vert.add_uniform("float texUnpack", Some("_texUnpack"));
        vert.write_attrib("texCoord1 = tex1 * texUnpack;");
        if tessellated {
            let declare = con.contains(Stage::Frag, "texCoord1");
            tess::interpolate(con, "texCoord1", 2, false, declare);
        }
    }
}

/// Vertex colour varying.
pub fn write_vcolor(con: &mut ShaderContext, as_attrib: bool) {
    if !con.is_elem("col") {
        return;
    }
    let mut vert = con.vert();
    vert.add_out("vec3 vcolor");
    if as_attrib {
        vert.write_attrib("vcolor = col.rgb;");
    } else {
        vert.write("vcolor = col.rgb;");
    }
    if con.has(Stage::Tese) {
        let declare = con.contains(Stage::Frag, "vcolor");
        tess::interpolate(con, "vcolor", 3, false, declare);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::context::ContextRecord;

    fn con() -> ShaderContext {
        let mut con = ShaderContext::new("Mat", ContextRecord::new("mesh"));
        con.make(Stage::Vert);
        con.make(Stage::Frag);
        con.link_stages(Stage::Vert, Stage::Frag);
        con
    }

    #[test]
    fn billboards_pick_their_matrices() {
        let mut c = con();
        let mat = MaterialSettings {
            billboard: Billboard::Cylindrical,
            ..MaterialSettings::default()
        };
        write_vertpos(&mut c, &mat);
        assert_eq!(c.data.constants[0].link.as_deref(), Some("_worldViewProjectionMatrixCylinder"));
        assert_eq!(normal_matrix_link(&mat), "_normalMatrixCylinder");
    }

    #[test]
    fn tilesheets_offset_uvs() {
        let mut c = con();
        c.add_elem("tex", "short2norm");
        let mat = MaterialSettings {
            tilesheet: true,
            ..MaterialSettings::default()
        };
        write_tex_coords(&mut c, &mat);
        let vert = c.shader(Stage::Vert).unwrap().get();
        assert!(vert.contains("texCoord = tex * texUnpack + tilesheetOffset;"));
        assert!(vert.contains("out vec2 texCoord;"));
    }

    #[test]
    fn no_uv_element_means_no_varying() {
        let mut c = con();
        write_tex_coords(&mut c, &MaterialSettings::default());
        assert!(c.shader(Stage::Vert).unwrap().outs().is_empty());
    }
}
