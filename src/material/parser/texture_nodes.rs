use std::path::Path;

use serde::Deserialize;

use super::{NodeAt, ParserState};
use crate::material::functions;
use crate::material::render_path::settings::TextureFilter;
use crate::material::shader_data::BindTexture;
use crate::material::utils::safestr;

/// Image referenced by a `TEX_IMAGE` node's `image` param.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ImageRef {
    pub name: String,
    pub filepath: String,
    pub colorspace: String,
    /// `FILE` or `MOVIE`.
    pub source: String,
    /// Image data is embedded in the host document.
    pub packed: bool,
}

const UNPACKED_DIR: &str = "build/compiled/Assets/unpacked";

fn texture_coord(state: &mut ParserState<'_>, at: &NodeAt<'_>) -> String {
    let co = at.input(0);
    if state.is_linked(co) {
        state.parse_vector_input(co)
    } else {
        "bposition".to_string()
    }
}

/// Resolves the image of a node into a texture binding, recording the file
/// in the asset list. `None` when the file cannot be used.
pub fn make_texture(state: &mut ParserState<'_>, at: &NodeAt<'_>, image: &ImageRef, tex_name: &str) -> Option<BindTexture> {
    let matname = state.doc().name.clone();

    let mut filepath = image.filepath.clone();
    if filepath.is_empty() {
        if !image.packed {
            log::warn!("[material] {matname}/{} - invalid file path", image.name);
            return None;
        }
        filepath = format!("./{}", image.name);
        if !has_known_ext(&filepath) {
            // Raw bytes, converted on unpack
            filepath.push_str(".raw");
        }
    }

    let texfile = filepath.rsplit(['/', '\\']).next().unwrap_or(&filepath).to_string();
    let mut file = safestr(&texfile);
    let Some((stem, ext)) = file.rsplit_once('.').map(|(s, e)| (s.to_string(), e.to_lowercase())) else {
        log::warn!("[material] {matname}/{} - file extension required for image name", image.name);
        return None;
    };
    let do_convert = !matches!(ext.as_str(), "jpg" | "png" | "hdr" | "mp4");
    if do_convert {
        file = format!("{stem}.jpg");
    }

    if image.packed || !texfile.is_ascii() {
        state.env.add_asset(&format!("{UNPACKED_DIR}/{file}"));
    } else {
        let rel = filepath.trim_start_matches("//");
        let path = state.env.asset_root.join(rel);
        if !Path::new(&path).is_file() {
            log::warn!("[material] Material {matname}/{} - file not found({filepath})", image.name);
            return None;
        }
        if do_convert {
            state.env.add_asset(&format!("{UNPACKED_DIR}/{file}"));
        } else {
            state.env.add_asset(&path.to_string_lossy());
        }
    }

    let mut tex = BindTexture {
        name: tex_name.to_string(),
        file,
        ..BindTexture::default()
    };

    let interpolation = match state.env.rp.texture_filter {
        TextureFilter::Anisotropic => "Smart",
        TextureFilter::Linear => "Linear",
        TextureFilter::Point => "Closest",
        TextureFilter::Manual => at.param_str("interpolation").unwrap_or("Linear"),
    };
    match interpolation {
        "Cubic" => {
            tex.mipmap_filter = Some("linear".to_string());
            tex.generate_mipmaps = Some(true);
        }
        "Smart" => {
            tex.min_filter = Some("anisotropic".to_string());
            tex.mipmap_filter = Some("linear".to_string());
            tex.generate_mipmaps = Some(true);
        }
        "Closest" => {
            tex.min_filter = Some("point".to_string());
            tex.mag_filter = Some("point".to_string());
        }
        _ => {}
    }

    // Extend or clip
    if at.param_str("extension").unwrap_or("REPEAT") != "REPEAT" {
        tex.u_addressing = Some("clamp".to_string());
        tex.v_addressing = Some("clamp".to_string());
    }

    if image.source == "MOVIE" {
        tex.source = Some("movie".to_string());
        tex.file.clear();
    }
    Some(tex)
}

fn has_known_ext(path: &str) -> bool {
    path.ends_with(".jpg") || path.ends_with(".png") || path.ends_with(".hdr")
}

/// Compile a TEX_CHECKER node.
pub fn parse_tex_checker(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    state.add_function(functions::TEX_CHECKER);
    let co = texture_coord(state, &at);
    let res = if at.out_glsl_type() == "float" {
        let scale = state.parse_value_input(at.input(3));
        format!("tex_checker_f({co}, {scale})")
    } else {
        let col1 = state.parse_vector_input(at.input(1));
        let col2 = state.parse_vector_input(at.input(2));
        let scale = state.parse_value_input(at.input(3));
        format!("tex_checker({co}, {col1}, {col2}, {scale})")
    };
    if state.sample_bump {
        state.write_bump(at, &res, 0.001);
    }
    res
}

/// Compile a TEX_ENVIRONMENT node.
pub fn parse_tex_environment(_state: &mut ParserState<'_>, _at: NodeAt<'_>) -> String {
    "vec3(0.0, 0.0, 0.0)".to_string()
}

/// Compile a TEX_GRADIENT node.
pub fn parse_tex_gradient(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let co = texture_coord(state, &at);
    let f = match at.param_str("gradient_type").unwrap_or("LINEAR") {
        "LINEAR" => format!("{co}.x"),
        "DIAGONAL" => format!("({co}.x + {co}.y) * 0.5"),
        "RADIAL" => {
            state.add_include("std/math.glsl");
            format!("atan({co}.y, {co}.x) / PI2 + 0.5")
        }
        "SPHERICAL" => format!("max(1.0 - sqrt({co}.x * {co}.x + {co}.y * {co}.y + {co}.z * {co}.z), 0.0)"),
        // QUADRATIC, EASING, QUADRATIC_SPHERE
        _ => "0.0".to_string(),
    };
    let res = if at.out_glsl_type() == "float" {
        format!("clamp({f}, 0.0, 1.0)")
    } else {
        format!("vec3(clamp({f}, 0.0, 1.0))")
    };
    if state.sample_bump {
        state.write_bump(at, &res, 0.001);
    }
    res
}

/// Compile a TEX_IMAGE node.
///
/// The image is sampled once into `<node>_store` inside the texture section;
/// the colour output reads `.rgb`, the alpha output `.a`. A file that cannot
/// be resolved samples as opaque pink.
pub fn parse_tex_image(state: &mut ParserState<'_>, at: NodeAt<'_>) -> String {
    let swizzle = if at.out_glsl_type() == "float" { "a" } else { "rgb" };
    let tex_name = state.node_name(&at.node.name);

    state.con.stage(state.cur).write_textures += 1;
    let store = sample_image(state, at, &tex_name);
    state.con.stage(state.cur).write_textures -= 1;
    format!("{store}.{swizzle}")
}

fn sample_image(state: &mut ParserState<'_>, at: NodeAt<'_>, tex_name: &str) -> String {
    let store = state.store_var_name(at.node);
    if state.is_parsed(&store) {
        return store;
    }

    let image = at
        .node
        .params
        .get("image")
        .filter(|v| !v.is_null())
        .and_then(|v| ImageRef::deserialize(v).ok());
    let Some(image) = image else {
        // Empty texture slot
        let tex = BindTexture {
            name: tex_name.to_string(),
            ..BindTexture::default()
        };
        return state.texture_store(at, tex, tex_name, false);
    };

    match make_texture(state, &at, &image, tex_name) {
        Some(tex) => {
            let to_linear = image.colorspace.is_empty() || image.colorspace == "sRGB";
            state.texture_store(at, tex, tex_name, to_linear)
        }
        None => {
            state.mark_parsed(&store);
            state.write(&format!("vec4 {store} = vec4(1.0, 0.0, 1.0, 1.0);"));
            store
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::material::parser::ParseOptions;
    use crate::material::parser::test_utils::*;
    use crate::material::types::BuildEnv;

    fn image_doc(image: serde_json::Value, out: usize) -> crate::dsl::MaterialDoc {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let img = b.node(
            "Image Texture",
            "TEX_IMAGE",
            vec![vector("Vector", [0.0; 3])],
            vec![color("Color", [0.0; 4]), value("Alpha", 0.0)],
        );
        b.param(img, "image", image).param(img, "interpolation", json!("Closest"));
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(img, out, d, if out == 0 { 0 } else { 1 }).link(d, 0, o, 0);
        test_material(vec![b.build()])
    }

    fn asset_dir(tag: &str, files: &[&str]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("nfc_tex_{tag}_{}", std::process::id()));
        for f in files {
            let path = dir.join(f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"img").unwrap();
        }
        dir
    }

    #[test]
    fn missing_image_file_samples_pink() {
        let doc = image_doc(json!({"name": "wood", "filepath": "//textures/missing.png"}), 0);
        let mut p = parse_surface(&doc);
        let frag = p.frag();
        assert!(frag.contains("vec4 ImageTexture_texread_store = vec4(1.0, 0.0, 1.0, 1.0);"));
        assert!(frag.contains("vec3 ImageTexture_Color_res = ImageTexture_texread_store.rgb;"));
        assert!(p.textures.is_empty());
    }

    #[test]
    fn existing_image_binds_sampler_and_linearizes() {
        let dir = asset_dir("png", &["textures/wood.png"]);
        let doc = image_doc(json!({"name": "wood", "filepath": "//textures/wood.png"}), 0);
        let env = BuildEnv {
            asset_root: dir.clone(),
            ..BuildEnv::default()
        };
        let mut p = parse_with(&doc, env, ParseOptions::default());
        let frag = p.frag();
        assert!(frag.contains("uniform sampler2D ImageTexture;"));
        assert!(frag.contains("vec4 ImageTexture_texread_store = texture(ImageTexture, texCoord.xy);"));
        assert!(frag.contains(
            "ImageTexture_texread_store.rgb = pow(ImageTexture_texread_store.rgb, vec3(2.2));"
        ));
        assert_eq!(p.textures.len(), 1);
        assert_eq!(p.textures[0].file, "wood.png");
        assert_eq!(p.textures[0].min_filter.as_deref(), Some("point"));
        assert!(p.con.is_elem("tex"));
        assert_eq!(p.env.assets.len(), 1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_image_slot_binds_empty_texture() {
        let doc = image_doc(json!(null), 1);
        let mut p = parse_surface(&doc);
        let frag = p.frag();
        assert!(frag.contains("float ImageTexture_Alpha_res = ImageTexture_texread_store.a;"));
        assert_eq!(p.textures.len(), 1);
        assert_eq!(p.textures[0].file, "");
    }

    #[test]
    fn unconvertible_formats_are_renamed_to_jpg() {
        let dir = asset_dir("tga", &["sky.tga"]);
        let doc = image_doc(json!({"name": "sky", "filepath": "//sky.tga", "colorspace": "Non-Color"}), 0);
        let env = BuildEnv {
            asset_root: dir.clone(),
            ..BuildEnv::default()
        };
        let mut p = parse_with(&doc, env, ParseOptions::default());
        assert!(!p.frag().contains("vec3(2.2)"));
        assert_eq!(p.textures[0].file, "sky.jpg");
        assert!(p.env.assets.contains("build/compiled/Assets/unpacked/sky.jpg"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn render_path_filter_overrides_node_interpolation() {
        let dir = asset_dir("filter", &["a.png"]);
        let doc = image_doc(json!({"name": "a", "filepath": "a.png"}), 0);
        let mut env = BuildEnv {
            asset_root: dir.clone(),
            ..BuildEnv::default()
        };
        env.rp.texture_filter = TextureFilter::Anisotropic;
        let p = parse_with(&doc, env, ParseOptions::default());
        let tex = &p.textures[0];
        assert_eq!(tex.min_filter.as_deref(), Some("anisotropic"));
        assert_eq!(tex.mipmap_filter.as_deref(), Some("linear"));
        assert_eq!(tex.generate_mipmaps, Some(true));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn checker_defaults_to_object_space() {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let c = b.node(
            "Checker",
            "TEX_CHECKER",
            vec![
                vector("Vector", [0.0; 3]),
                color("Color1", [1.0; 4]),
                color("Color2", [0.0, 0.0, 0.0, 1.0]),
                value("Scale", 5.0),
            ],
            vec![color("Color", [0.0; 4]), value("Fac", 0.0)],
        );
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(c, 0, d, 0).link(d, 0, o, 0);
        let frag = parse_surface(&test_material(vec![b.build()])).frag();
        assert!(frag.contains("vec3 tex_checker(const vec3 co"));
        assert!(frag.contains(
            "vec3 Checker_Color_res = tex_checker(bposition, vec3(1.0, 1.0, 1.0), vec3(0.0, 0.0, 0.0), 5.0);"
        ));
    }

    #[test]
    fn radial_gradient_needs_math_include() {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let g = b.node(
            "Gradient",
            "TEX_GRADIENT",
            vec![vector("Vector", [0.0; 3])],
            vec![color("Color", [0.0; 4]), value("Fac", 0.0)],
        );
        b.param(g, "gradient_type", json!("RADIAL"));
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(g, 0, d, 0).link(d, 0, o, 0);
        let frag = parse_surface(&test_material(vec![b.build()])).frag();
        assert!(frag.contains("#include \"std/math.glsl\""));
        assert!(frag.contains("vec3(clamp(atan(bposition.y, bposition.x) / PI2 + 0.5, 0.0, 1.0))"));
    }
}
