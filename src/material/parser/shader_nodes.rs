use super::{NodeAt, ParserState};
use crate::dsl::NodeKind;
use crate::material::types::{EmissionType, SurfaceOuts};

/// Parse a child shader with a clean emission slate, returning both.
fn child_shader(state: &mut ParserState<'_>, at: NodeAt<'_>, index: usize) -> (SurfaceOuts, EmissionType) {
    state.emission = EmissionType::None;
    let outs = state.parse_shader_input(at.input(index));
    (outs, state.emission)
}

/// Compile a MIX_SHADER node.
pub fn parse_mixshader(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let fac_in = at.input(0);
    let prefix = if state.is_linked(fac_in) { "" } else { "const " };
    let fac = state.parse_value_input(fac_in);
    let fac_var = format!("{}_fac", state.node_name(&at.node.name));
    let fac_inv_var = format!("{fac_var}_inv");
    state.write(&format!("{prefix}float {fac_var} = {fac};"));
    state.write(&format!("{prefix}float {fac_inv_var} = 1.0 - {fac_var};"));

    let (a, ea) = child_shader(state, at, 1);
    let (b, eb) = child_shader(state, at, 2);
    let mix = |x: &str, y: &str| format!("({x} * {fac_inv_var} + {y} * {fac_var})");

    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        outs.basecol = mix(&a.basecol, &b.basecol);
        outs.roughness = mix(&a.roughness, &b.roughness);
        outs.metallic = mix(&a.metallic, &b.metallic);
        outs.occlusion = mix(&a.occlusion, &b.occlusion);
        outs.specular = mix(&a.specular, &b.specular);
        outs.emission_col = mix(&a.emission_col, &b.emission_col);
    }
    if state.opts.parse_opacity {
        outs.opacity = mix(&a.opacity, &b.opacity);
        outs.ior = mix(&a.ior, &b.ior);
    }
    state.outs = outs;
    state.emission = EmissionType::combine(ea, eb);
}

/// Compile an ADD_SHADER node.
pub fn parse_addshader(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let (a, ea) = child_shader(state, at, 0);
    let (b, eb) = child_shader(state, at, 1);
    let half = |x: &str, y: &str| format!("({x} * 0.5 + {y} * 0.5)");

    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        outs.basecol = format!("({} + {})", a.basecol, b.basecol);
        outs.roughness = half(&a.roughness, &b.roughness);
        outs.metallic = half(&a.metallic, &b.metallic);
        outs.occlusion = half(&a.occlusion, &b.occlusion);
        outs.specular = half(&a.specular, &b.specular);
        outs.emission_col = half(&a.emission_col, &b.emission_col);
    }
    if state.opts.parse_opacity {
        outs.opacity = half(&a.opacity, &b.opacity);
        outs.ior = half(&a.ior, &b.ior);
    }
    state.outs = outs;
    state.emission = EmissionType::combine(ea, eb);
}

/// Compile a BSDF_PRINCIPLED node. Inputs are looked up by name.
pub fn parse_bsdfprincipled(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        state.write_normal(at.input_named("Normal"));
        outs.basecol = state.parse_vector_input(at.input_named("Base Color"));
        outs.metallic = state.parse_value_input(at.input_named("Metallic"));
        outs.specular = state.parse_value_input(at.input_named("Specular"));
        outs.roughness = state.parse_value_input(at.input_named("Roughness"));

        let strength_in = at.input_named("Emission Strength");
        let col_in = at.input_named("Emission");
        let has_strength = state.is_linked(strength_in)
            || state.in_socket(strength_in).is_some_and(|s| s.default_f32() != 0.0);
        let has_color = state.is_linked(col_in)
            || state.in_socket(col_in).is_some_and(|s| s.default_vec(3).iter().any(|c| *c != 0.0));
        if has_strength && has_color {
            let col = state.parse_vector_input(col_in);
            let strength = state.parse_value_input(strength_in);
            outs.emission_col = format!("({col} * {strength})");
            state.emission = EmissionType::Shaded;
        }
    }
    if state.opts.parse_opacity {
        outs.ior = state.parse_value_input(at.input_named("IOR"));
        outs.opacity = state.parse_value_input(at.input_named("Alpha"));
    }
    state.outs = outs;
}

/// Compile the built-in `Armory PBR` group natively.
pub fn parse_armory_pbr(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        let normal_in = at.input(5);
        if state.linked_kind(normal_in) == Some(NodeKind::NormalMap) {
            state.warn("Do not use Normal Map node with Armory PBR, connect Image Texture directly");
        }
        state.parse_normal_map_color_input(normal_in, None);

        let emission_in = at.input(6);
        let emission_factor = format!("clamp({}, 0.0, 1.0)", state.parse_value_input(emission_in));
        let basecol = state.parse_vector_input(at.input(0));
        outs.basecol = format!("({basecol} * (1 - {emission_factor}))");
        outs.occlusion = state.parse_value_input(at.input(2));
        outs.roughness = state.parse_value_input(at.input(3));
        outs.metallic = state.parse_value_input(at.input(4));

        if state.is_linked(emission_in) || state.in_socket(emission_in).is_some_and(|s| s.default_f32() != 0.0) {
            outs.emission_col = format!("({basecol} * {emission_factor})");
            state.emission = EmissionType::Shaded;
        }
    }
    if state.opts.parse_opacity {
        outs.opacity = state.parse_value_input(at.input(1));
    }
    state.outs = outs;
}

/// Compile a BSDF_DIFFUSE node.
pub fn parse_bsdfdiffuse(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        state.write_normal(at.input(2));
        outs.basecol = state.parse_vector_input(at.input(0));
        outs.roughness = state.parse_value_input(at.input(1));
        outs.specular = "0.0".to_string();
    }
    state.outs = outs;
}

/// Compile a BSDF_GLOSSY node.
pub fn parse_bsdfglossy(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        state.write_normal(at.input(2));
        outs.basecol = state.parse_vector_input(at.input(0));
        outs.roughness = state.parse_value_input(at.input(1));
        outs.metallic = "1.0".to_string();
    }
    state.outs = outs;
}

/// Compile an AMBIENT_OCCLUSION node.
pub fn parse_ambientocclusion(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        outs.occlusion = format!("{}.r", state.parse_vector_input(at.input(0)));
    }
    state.outs = outs;
}

/// Compile a BSDF_ANISOTROPIC node.
pub fn parse_bsdfanisotropic(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        state.write_normal(at.input(4));
        outs.basecol = state.parse_vector_input(at.input(0));
        outs.roughness = state.parse_value_input(at.input(1));
        outs.metallic = "1.0".to_string();
    }
    state.outs = outs;
}

/// Compile an EMISSION node. Emission alone is unlit.
pub fn parse_emission(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        let col = state.parse_vector_input(at.input(0));
        let strength = state.parse_value_input(at.input(1));
        outs.emission_col = format!("({col} * {strength})");
        outs.basecol = "vec3(0.0)".to_string();
        outs.specular = "0.0".to_string();
        outs.metallic = "0.0".to_string();
        state.emission = EmissionType::Shadeless;
    }
    state.outs = outs;
}

/// Compile a BSDF_GLASS node.
pub fn parse_bsdfglass(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        state.write_normal(at.input(3));
        outs.roughness = state.parse_value_input(at.input(1));
    }
    if state.opts.parse_opacity {
        outs.opacity = format!("(1.0 - {}.r)", state.parse_vector_input(at.input(0)));
    }
    state.outs = outs;
}

/// Compile a HOLDOUT node.
pub fn parse_holdout(state: &mut ParserState<'_>, _at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        outs.occlusion = "0.0".to_string();
    }
    state.outs = outs;
}

/// Compile a SUBSURFACE_SCATTERING node.
pub fn parse_subsurfacescattering(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        state.write_normal(at.input(4));
        outs.basecol = state.parse_vector_input(at.input(0));
    }
    state.outs = outs;
}

/// Compile a BSDF_TRANSLUCENT node.
pub fn parse_bsdftranslucent(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        state.write_normal(at.input(1));
    }
    if state.opts.parse_opacity {
        outs.opacity = format!("(1.0 - {}.r)", state.parse_vector_input(at.input(0)));
    }
    state.outs = outs;
}

/// Compile a BSDF_TRANSPARENT node.
pub fn parse_bsdftransparent(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_opacity {
        outs.opacity = format!("(1.0 - {}.r)", state.parse_vector_input(at.input(0)));
    }
    state.outs = outs;
}

/// Compile a BSDF_VELVET node.
pub fn parse_bsdfvelvet(state: &mut ParserState<'_>, at: NodeAt<'_>) {
    let mut outs = SurfaceOuts::default();
    if state.opts.parse_surface {
        state.write_normal(at.input(2));
        outs.basecol = state.parse_vector_input(at.input(0));
        outs.roughness = "1.0".to_string();
        outs.metallic = "1.0".to_string();
    }
    state.outs = outs;
}

#[cfg(test)]
mod tests {
    use crate::material::parser::ParseOptions;
    use crate::material::parser::test_utils::*;
    use crate::material::types::{BuildEnv, EmissionType};

    fn emission_node(b: &mut TreeBuilder, col: [f32; 4], strength: f32) -> usize {
        b.node(
            "Emission",
            "EMISSION",
            vec![color("Color", col), value("Strength", strength)],
            vec![shader("Emission")],
        )
    }

    fn mix_shader(b: &mut TreeBuilder, fac: f32) -> usize {
        b.node(
            "Mix Shader",
            "MIX_SHADER",
            vec![value("Fac", fac), shader("Shader"), shader("Shader")],
            vec![shader("Shader")],
        )
    }

    #[test]
    fn mix_shader_blends_every_output() {
        let mut b = TreeBuilder::new("Mat");
        let out = b.output();
        let red = b.diffuse("Red", [1.0, 0.0, 0.0, 1.0], 0.0);
        let blue = b.diffuse("Blue", [0.0, 0.0, 1.0, 1.0], 1.0);
        let mix = mix_shader(&mut b, 0.25);
        b.link(red, 0, mix, 1).link(blue, 0, mix, 2).link(mix, 0, out, 0);
        let doc = test_material(vec![b.build()]);
        let mut p = parse_surface(&doc);
        let frag = p.frag();
        assert!(frag.contains("const float MixShader_fac = 0.25;"));
        assert!(frag.contains("const float MixShader_fac_inv = 1.0 - MixShader_fac;"));
        assert!(frag.contains(
            "basecol = (vec3(1.0, 0.0, 0.0) * MixShader_fac_inv + vec3(0.0, 0.0, 1.0) * MixShader_fac);"
        ));
        assert!(frag.contains("roughness = (0.0 * MixShader_fac_inv + 1.0 * MixShader_fac);"));
        assert_eq!(p.emission, EmissionType::None);
    }

    #[test]
    fn linked_mix_factor_is_not_const() {
        let mut b = TreeBuilder::new("Mat");
        let out = b.output();
        let v = b.node("Fac", "VALUE", vec![], vec![value("Value", 0.5)]);
        b.tree.nodes[v].material_param = true;
        let red = b.diffuse("Red", [1.0, 0.0, 0.0, 1.0], 0.0);
        let mix = mix_shader(&mut b, 0.0);
        b.link(v, 0, mix, 0).link(red, 0, mix, 1).link(mix, 0, out, 0);
        let doc = test_material(vec![b.build()]);
        let frag = parse_surface(&doc).frag();
        assert!(frag.contains("\tfloat MixShader_fac = Fac_Value_res;"));
    }

    #[test]
    fn emission_alone_is_shadeless() {
        let mut b = TreeBuilder::new("Mat");
        let out = b.output();
        let e = emission_node(&mut b, [1.0, 0.5, 0.0, 1.0], 2.0);
        b.link(e, 0, out, 0);
        let doc = test_material(vec![b.build()]);
        let mut p = parse_surface(&doc);
        let frag = p.frag();
        assert!(frag.contains("emissionCol = (vec3(1.0, 0.5, 0.0) * 2.0);"));
        assert!(frag.contains("basecol = vec3(0.0);"));
        assert_eq!(p.emission, EmissionType::Shadeless);
        assert!(p.env.world_defs.has("_EmissionShadeless"));
    }

    #[test]
    fn emission_mixed_with_lit_shader_is_shaded() {
        let mut b = TreeBuilder::new("Mat");
        let out = b.output();
        let e = emission_node(&mut b, [1.0; 4], 1.0);
        let d = b.diffuse("Diffuse", [0.5, 0.5, 0.5, 1.0], 0.5);
        let add = b.node(
            "Add",
            "ADD_SHADER",
            vec![shader("Shader"), shader("Shader")],
            vec![shader("Shader")],
        );
        b.link(e, 0, add, 0).link(d, 0, add, 1).link(add, 0, out, 0);
        let doc = test_material(vec![b.build()]);
        let mut p = parse_surface(&doc);
        let frag = p.frag();
        assert!(frag.contains("basecol = (vec3(0.0) + vec3(0.5, 0.5, 0.5));"));
        assert!(frag.contains("roughness = (0.0 * 0.5 + 0.5 * 0.5);"));
        assert_eq!(p.emission, EmissionType::Shaded);
        assert!(p.env.world_defs.has("_EmissionShaded"));
    }

    #[test]
    fn principled_reads_inputs_by_name() {
        let mut b = TreeBuilder::new("Mat");
        let out = b.output();
        let p = b.node(
            "Principled BSDF",
            "BSDF_PRINCIPLED",
            vec![
                color("Base Color", [0.1, 0.2, 0.3, 1.0]),
                value("Metallic", 1.0),
                value("Specular", 0.5),
                value("Roughness", 0.25),
                value("IOR", 1.45),
                color("Emission", [0.0, 0.0, 0.0, 1.0]),
                value("Emission Strength", 1.0),
                value("Alpha", 0.75),
                vector("Normal", [0.0; 3]),
            ],
            vec![shader("BSDF")],
        );
        b.link(p, 0, out, 0);
        let doc = test_material(vec![b.build()]);
        let opts = ParseOptions {
            parse_opacity: true,
            ..ParseOptions::default()
        };
        let mut parsed = parse_with(&doc, BuildEnv::default(), opts);
        let frag = parsed.frag();
        assert!(frag.contains("basecol = vec3(0.1, 0.2, 0.3);"));
        assert!(frag.contains("metallic = 1.0;"));
        assert!(frag.contains("specular = 0.5;"));
        assert!(frag.contains("roughness = 0.25;"));
        assert!(frag.contains("opacity = 0.75;"));
        // Black emission colour means no emission at all
        assert!(frag.contains("emissionCol = vec3(0.0);"));
        assert_eq!(parsed.emission, EmissionType::None);
    }

    #[test]
    fn armory_pbr_group_is_native() {
        let mut b = TreeBuilder::new("Mat");
        let out = b.output();
        let g = b.node(
            "PBR",
            "GROUP",
            vec![
                color("Base Color", [1.0, 1.0, 1.0, 1.0]),
                value("Opacity", 1.0),
                value("Occlusion", 0.5),
                value("Roughness", 0.3),
                value("Metallic", 0.0),
                vector("Normal", [0.0; 3]),
                value("Emission", 0.0),
                value("Height", 0.0),
                value("Subsurface", 0.0),
            ],
            vec![shader("BSDF"), value("Height", 0.0)],
        );
        b.tree.nodes[g].node_tree = Some("Armory PBR".to_string());
        b.link(g, 0, out, 0);
        let doc = test_material(vec![b.build()]);
        let mut p = parse_surface(&doc);
        let frag = p.frag();
        assert!(frag.contains("basecol = (vec3(1.0, 1.0, 1.0) * (1 - clamp(0.0, 0.0, 1.0)));"));
        assert!(frag.contains("occlusion = 0.5;"));
        assert!(frag.contains("roughness = 0.3;"));
        assert_eq!(p.emission, EmissionType::None);
    }

    #[test]
    fn transparent_only_affects_opacity() {
        let mut b = TreeBuilder::new("Mat");
        let out = b.output();
        let t = b.node(
            "Transparent",
            "BSDF_TRANSPARENT",
            vec![color("Color", [0.25, 0.0, 0.0, 1.0])],
            vec![shader("BSDF")],
        );
        b.link(t, 0, out, 0);
        let doc = test_material(vec![b.build()]);
        let opts = ParseOptions {
            parse_surface: false,
            parse_opacity: true,
            ..ParseOptions::default()
        };
        let frag = parse_with(&doc, BuildEnv::default(), opts).frag();
        assert!(frag.contains("opacity = (1.0 - vec3(0.25, 0.0, 0.0).r);"));
        assert!(!frag.contains("basecol ="));
    }
}
