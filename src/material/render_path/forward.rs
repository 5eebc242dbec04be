//! Forward mesh scripts: mobile, solid and full.
//!
//! The full script is `make_base`, the [`FORWARD_BASE`] lighting pipeline and
//! the [`FORWARD_OUTPUT`] target writes. Mobile and solid are short enough to
//! stay straight-line.

use crate::material::context::ShaderContext;
use crate::material::parser::ParseOptions;
use crate::material::shader::Stage;
use crate::material::types::EmissionType;

use super::stages::{FeatureStage, Pipeline, included, run, top};
use super::{PassState, attrib, cluster, is_transluc, mesh};

/// Forward lighting after the surface parse, in emission order.
pub const FORWARD_BASE: &Pipeline = &[
    &ViewSetup,
    &ShadowAtlas,
    &SurfaceAlbedo,
    &BrdfLut,
    &EnvIrradiance,
    &EnvFallback,
    &Radiance,
    &EnvLdr,
    &EnvAlbedo,
    &BackgroundColour,
    &EnvStrength,
    &VoxelSetup,
    &VoxelAo,
    &IndirectInit,
    &VoxelGi,
    &DirectInit,
    &Sun,
    &SinglePoint,
    &Clusters,
    &Emission,
    &VoxelRefraction,
];

/// Render-target writes of the full forward script.
pub const FORWARD_OUTPUT: &Pipeline = &[&LtcUniforms, &ForwardOutput, &Tonemap];

fn mobile_opacity(st: &PassState<'_>) -> bool {
    let mat = st.mat();
    (mat.blending && is_transluc(st.doc)) || mat.discard
}

fn write_discard(con: &mut ShaderContext, opac: &str) {
    con.frag().write(&format!("if (opacity < {opac}) discard;"));
}

fn sun_shadowmap(st: &PassState<'_>) -> &'static str {
    if !st.has("_ShadowMapAtlas") {
        "shadowMap"
    } else if st.has("_SingleAtlas") {
        "shadowMapAtlas"
    } else {
        "shadowMapAtlasSun"
    }
}

fn write_ldr_gamma(st: &PassState<'_>, con: &mut ShaderContext) {
    if st.has("_LDR") {
        con.frag().write("fragColor.rgb = pow(fragColor.rgb, vec3(1.0 / 2.2));");
    }
}

pub fn make_mobile(st: &mut PassState<'_>, con: &mut ShaderContext) {
    let mat = st.mat();
    con.make(Stage::Vert);
    con.make(Stage::Frag);
    con.link_stages(Stage::Vert, Stage::Frag);

    let mut vert = con.vert();
    vert.add_uniform("mat3 N", Some("_normalMatrix"));
    vert.write_attrib("vec4 spos = vec4(pos.xyz, 1.0);");
    vert.add_include("compiled.inc");
    con.frag().add_include("compiled.inc");

    let parse_opacity = mobile_opacity(st);
    st.parse_opacity = parse_opacity;
    mesh::write_material_attribs_default(&mut con.frag(), parse_opacity);
    st.parse(
        con,
        ParseOptions {
            parse_opacity,
            parse_displacement: false,
            ..ParseOptions::default()
        },
    );

    if mat.discard {
        write_discard(con, &crate::material::utils::fmt_float(mat.discard_opacity));
    }

    attrib::write_tex_coords(con, mat);
    attrib::write_vcolor(con, false);

    con.vert().add_out("vec3 wnormal");
    attrib::write_norpos(con, false);
    con.frag().write_attrib("vec3 n = normalize(wnormal);");
    if con.is_elem("tang") {
        let mut vert = con.vert();
        vert.add_out("mat3 TBN");
        vert.write("vec3 tangent = normalize(N * tang.xyz);");
        vert.write("vec3 bitangent = normalize(cross(wnormal, tangent));");
        vert.write("TBN = mat3(tangent, bitangent, wnormal);");
    }

    if mat.two_sided {
        con.frag().write("if (!gl_FrontFacing) n *= -1;");
    }

    attrib::write_vertpos(con, mat);

    let mut frag = con.frag();
    frag.add_include("std/math.glsl");
    frag.add_include("std/brdf.glsl");
    frag.add_out("vec4 fragColor");
    if mat.blending {
        let alpha = if parse_opacity { "opacity" } else { "1.0" };
        frag.write(&format!("fragColor = vec4(basecol, {alpha});"));
        return;
    }

    let is_shadows = st.has("_ShadowMap");
    let shadowmap_sun = sun_shadowmap(st);
    if st.has("_ShadowMapAtlas") {
        frag.add_uniform_with("vec2 smSizeUniform", included(Some("_shadowMapSize")));
    }
    frag.write("vec3 direct = vec3(0.0);");

    if st.has("_Sun") {
        mobile_sun(st, con, is_shadows, shadowmap_sun);
    }
    if st.has("_SinglePoint") {
        mobile_point(st, con, is_shadows);
    }
    if st.has("_Clusters") {
        let mut frag = con.frag();
        frag.add_include("std/light_mobile.glsl");
        frag.write("vec3 albedo = basecol;");
        frag.write("vec3 f0 = surfaceF0(basecol, metallic);");
        cluster::write(st, con);
    }

    let mut frag = con.frag();
    let env_str = if st.has("_Irr") {
        frag.add_include("std/shirr.glsl");
        frag.add_uniform("vec4 shirr[7]", Some("_envmapIrradiance"));
        "shIrradiance(n, shirr)"
    } else {
        "0.5"
    };
    frag.add_uniform("float envmapStrength", Some("_envmapStrength"));
    frag.write(&format!("fragColor = vec4(direct + basecol * {env_str} * envmapStrength, 1.0);"));
    write_ldr_gamma(st, con);
}

fn mobile_sun(st: &PassState<'_>, con: &mut ShaderContext, is_shadows: bool, shadowmap_sun: &str) {
    let mut frag = con.frag();
    frag.add_uniform("vec3 sunCol", Some("_sunColor"));
    frag.add_uniform("vec3 sunDir", Some("_sunDirection"));
    frag.write("float svisibility = 1.0;");
    frag.write("float sdotNL = max(dot(n, sunDir), 0.0);");
    if is_shadows {
        let mut vert = con.vert();
        vert.add_out("vec4 lightPosition");
        vert.add_uniform("mat4 LWVP", Some("_biasLightWorldViewProjectionMatrixSun"));
        vert.write("lightPosition = LWVP * spos;");

        let mut frag = con.frag();
        frag.add_uniform("bool receiveShadow", None);
        frag.add_uniform(&format!("sampler2DShadow {shadowmap_sun}"), None);
        frag.add_uniform("float shadowsBias", Some("_sunShadowsBias"));
        frag.write("if (receiveShadow) {");
        if st.has("_CSM") {
            frag.add_include("std/shadows.glsl");
            frag.add_uniform_with("vec4 casData[shadowmapCascades * 4 + 4]", included(Some("_cascadeData")));
            frag.add_uniform("vec3 eye", Some("_cameraPosition"));
            frag.write(&format!(
                "svisibility = shadowTestCascade({shadowmap_sun}, eye, wposition + n * shadowsBias * 10, shadowsBias);"
            ));
        } else {
            frag.write("if (lightPosition.w > 0.0) {");
            frag.write("    vec3 lPos = lightPosition.xyz / lightPosition.w;");
            if st.has("_Legacy") {
                frag.write(&format!(
                    "    svisibility = float(texture({shadowmap_sun}, vec2(lPos.xy)).r > lPos.z - shadowsBias);"
                ));
            } else {
                frag.write(&format!(
                    "    svisibility = texture({shadowmap_sun}, vec3(lPos.xy, lPos.z - shadowsBias)).r;"
                ));
            }
            frag.write("}");
        }
        frag.write("}");
    }
    con.frag().write("direct += basecol * sdotNL * sunCol * svisibility;");
}

fn mobile_point(st: &PassState<'_>, con: &mut ShaderContext, is_shadows: bool) {
    let is_spot = st.has("_Spot");
    let mut frag = con.frag();
    frag.add_uniform("vec3 pointPos", Some("_pointPosition"));
    frag.add_uniform("vec3 pointCol", Some("_pointColor"));
    if is_spot {
        frag.add_uniform("vec3 spotDir", Some("_spotDirection"));
        frag.add_uniform("vec3 spotRight", Some("_spotRight"));
        frag.add_uniform("vec4 spotData", Some("_spotData"));
    }
    frag.write("float visibility = 1.0;");
    frag.write("vec3 ld = pointPos - wposition;");
    frag.write("vec3 l = normalize(ld);");
    frag.write("float dotNL = max(dot(n, l), 0.0);");
    if is_shadows {
        frag.add_uniform("bool receiveShadow", None);
        frag.add_uniform("float pointBias", Some("_pointShadowsBias"));
        frag.add_include("std/shadows.glsl");
        frag.write("if (receiveShadow) {");
        if is_spot {
            let mut vert = con.vert();
            vert.add_out("vec4 spotPosition");
            vert.add_uniform("mat4 LWVPSpotArray[1]", Some("_biasLightWorldViewProjectionMatrixSpotArray"));
            vert.write("spotPosition = LWVPSpotArray[0] * spos;");

            let mut frag = con.frag();
            frag.add_uniform("sampler2DShadow shadowMapSpot[1]", None);
            frag.write("if (spotPosition.w > 0.0) {");
            frag.write("    vec3 lPos = spotPosition.xyz / spotPosition.w;");
            if st.has("_Legacy") {
                frag.write("    visibility = float(texture(shadowMapSpot[0], vec2(lPos.xy)).r > lPos.z - pointBias);");
            } else {
                frag.write("    visibility = texture(shadowMapSpot[0], vec3(lPos.xy, lPos.z - pointBias)).r;");
            }
            frag.write("}");
        } else {
            frag.add_uniform("vec2 lightProj", Some("_lightPlaneProj"));
            frag.add_uniform("samplerCubeShadow shadowMapPoint[1]", None);
            frag.write("const float s = shadowmapCubePcfSize;");
            frag.write("float compare = lpToDepth(ld, lightProj) - pointBias * 1.5;");
            frag.write("#ifdef _InvY");
            frag.write("l.y = -l.y;");
            frag.write("#endif");
            if st.has("_Legacy") {
                frag.write("visibility = float(texture(shadowMapPoint[0], vec3(-l + n * pointBias * 20)).r > compare);");
            } else {
                frag.write("visibility = texture(shadowMapPoint[0], vec4(-l + n * pointBias * 20, compare)).r;");
            }
        }
        con.frag().write("}");
    }
    con.frag()
        .write("direct += basecol * dotNL * pointCol * attenuate(distance(wposition, pointPos)) * visibility;");
}

/// Unlit base colour; normals are dropped from the vertex layout.
pub fn make_solid(st: &mut PassState<'_>, con: &mut ShaderContext) {
    let mat = st.mat();
    con.remove_elem("nor");
    con.make(Stage::Vert);
    con.make(Stage::Frag);
    con.link_stages(Stage::Vert, Stage::Frag);

    let mut vert = con.vert();
    vert.write_attrib("vec4 spos = vec4(pos.xyz, 1.0);");
    vert.add_include("compiled.inc");
    con.frag().add_include("compiled.inc");

    let parse_opacity = mobile_opacity(st);
    st.parse_opacity = parse_opacity;
    mesh::write_material_attribs_default(&mut con.frag(), parse_opacity);
    st.parse(
        con,
        ParseOptions {
            parse_opacity,
            parse_displacement: false,
            basecol_only: true,
            ..ParseOptions::default()
        },
    );

    if mat.discard {
        write_discard(con, &crate::material::utils::fmt_float(mat.discard_opacity));
    }

    attrib::write_tex_coords(con, mat);
    attrib::write_vcolor(con, false);
    attrib::write_vertpos(con, mat);

    let mut frag = con.frag();
    frag.add_out("vec4 fragColor");
    let alpha = if mat.blending && parse_opacity { "opacity" } else { "1.0" };
    frag.write(&format!("fragColor = vec4(basecol, {alpha});"));
    write_ldr_gamma(st, con);
}

/// Full PBR forward shading.
pub fn make_full(st: &mut PassState<'_>, con: &mut ShaderContext) {
    let parse_opacity = st.mat().blending || is_transluc(st.doc);
    if make_forward_base(st, con, parse_opacity) {
        run(FORWARD_OUTPUT, st, con);
    }
}

/// Returns false for blended materials, which are finished after the
/// surface write.
pub fn make_forward_base(st: &mut PassState<'_>, con: &mut ShaderContext, parse_opacity: bool) -> bool {
    let mat = st.mat();
    st.parse_opacity = parse_opacity;
    mesh::make_base(st, con, parse_opacity || mat.discard);

    if parse_opacity || mat.discard {
        let opac = if mat.discard || mat.blending {
            crate::material::utils::fmt_float(mat.discard_opacity)
        } else {
            // 1.0 - eps
            "0.9999".to_string()
        };
        write_discard(con, &opac);
    }

    if mat.blending {
        let mut frag = con.frag();
        frag.add_out("vec4 fragColor[1]");
        let alpha = if parse_opacity { "opacity" } else { "1.0" };
        frag.write(&format!("fragColor[0] = vec4(basecol, {alpha});"));
        return false;
    }

    run(FORWARD_BASE, st, con);
    true
}

macro_rules! on_def {
    ($stage:ident, $name:literal, $def:literal) => {
        struct $stage;

        impl $stage {
            const NAME: &'static str = $name;
            fn when(st: &PassState<'_>) -> bool {
                st.has($def)
            }
        }
    };
}

struct ViewSetup;

impl FeatureStage for ViewSetup {
    fn name(&self) -> &'static str {
        "view"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.write_attrib("vec3 vVec = normalize(eyeDir);");
        frag.write_attrib("float dotNV = max(dot(n, vVec), 0.0);");
        let mut sh = con.tese_or_vert();
        sh.add_out("vec3 eyeDir");
        sh.add_uniform("vec3 eye", Some("_cameraPosition"));
        sh.write("eyeDir = eye - wposition;");
        con.frag().add_include("std/light.glsl");
    }
}

struct ShadowAtlas;

impl FeatureStage for ShadowAtlas {
    fn name(&self) -> &'static str {
        "shadow atlas"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        st.has("_ShadowMapAtlas")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        con.frag()
            .add_uniform_with("vec2 smSizeUniform", included(Some("_shadowMapSize")));
    }
}

struct SurfaceAlbedo;

impl FeatureStage for SurfaceAlbedo {
    fn name(&self) -> &'static str {
        "surface albedo"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.write("vec3 albedo = surfaceAlbedo(basecol, metallic);");
        frag.write("vec3 f0 = surfaceF0(basecol, metallic);");
    }
}

on_def!(BrdfLut, "brdf lut", "_Brdf");

impl FeatureStage for BrdfLut {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.add_uniform("sampler2D senvmapBrdf", Some("$brdf.png"));
        frag.write("vec2 envBRDF = texelFetch(senvmapBrdf, ivec2(vec2(dotNV, 1.0 - roughness) * 256.0), 0).xy;");
    }
}

on_def!(EnvIrradiance, "irradiance", "_Irr");

impl FeatureStage for EnvIrradiance {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.add_include("std/shirr.glsl");
        frag.add_uniform("vec4 shirr[7]", Some("_envmapIrradiance"));
        frag.write("vec3 envl = shIrradiance(n, shirr);");
        if st.has("_EnvTex") {
            frag.write("envl /= PI;");
        }
    }
}

struct EnvFallback;

impl FeatureStage for EnvFallback {
    fn name(&self) -> &'static str {
        "no irradiance"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        !st.has("_Irr")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        con.frag().write("vec3 envl = vec3(0.0);");
    }
}

on_def!(Radiance, "radiance", "_Rad");

impl FeatureStage for Radiance {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.add_uniform("sampler2D senvmapRadiance", Some("_envmapRadiance"));
        frag.add_uniform("int envmapNumMipmaps", Some("_envmapNumMipmaps"));
        frag.write("vec3 reflectionWorld = reflect(-vVec, n);");
        frag.write("float lod = getMipFromRoughness(roughness, envmapNumMipmaps);");
        frag.write("vec3 prefilteredColor = textureLod(senvmapRadiance, envMapEquirect(reflectionWorld), lod).rgb;");
    }
}

on_def!(EnvLdr, "ldr environment", "_EnvLDR");

impl FeatureStage for EnvLdr {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.write("envl = pow(envl, vec3(2.2));");
        if st.has("_Rad") {
            frag.write("prefilteredColor = pow(prefilteredColor, vec3(2.2));");
        }
    }
}

/// Tints the environment by albedo and splits it by the BRDF terms.
struct EnvAlbedo;

impl FeatureStage for EnvAlbedo {
    fn name(&self) -> &'static str {
        "environment albedo"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.write("envl *= albedo;");
        if st.has("_Brdf") {
            frag.write("envl.rgb *= 1.0 - (f0 * envBRDF.x + envBRDF.y);");
        }
        if st.has("_Rad") {
            frag.write("envl += prefilteredColor * (f0 * envBRDF.x + envBRDF.y);");
        }
    }
}

struct BackgroundColour;

impl FeatureStage for BackgroundColour {
    fn name(&self) -> &'static str {
        "background colour"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        st.has("_EnvCol") && !st.has("_Rad")
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.add_uniform("vec3 backgroundCol", Some("_backgroundCol"));
        frag.write("envl += backgroundCol * (f0 * envBRDF.x + envBRDF.y);");
    }
}

struct EnvStrength;

impl FeatureStage for EnvStrength {
    fn name(&self) -> &'static str {
        "environment strength"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.add_uniform("float envmapStrength", Some("_envmapStrength"));
        frag.write("envl *= envmapStrength * occlusion;");
    }
}

fn add_voxel_tracing(con: &mut ShaderContext) {
    let mut frag = con.frag();
    frag.add_include("std/conetrace.glsl");
    frag.add_uniform("float clipmaps[10 * voxelgiClipmapCount]", Some("_clipmaps"));
    frag.add_uniform("sampler3D voxels", None);
    frag.add_uniform("sampler3D voxelsSDF", None);
}

/// Screen-space coordinates for sampling the voxel buffers.
struct VoxelSetup;

impl FeatureStage for VoxelSetup {
    fn name(&self) -> &'static str {
        "voxel setup"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        st.has("_VoxelAOvar") || st.has("_VoxelGI")
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        if st.parse_opacity {
            add_voxel_tracing(con);
        }
        if st.has("_VoxelShadow") {
            con.frag().add_uniform_with("sampler2D voxels_shadows", top());
        }
        let mut vert = con.vert();
        vert.add_out("vec4 wvpposition");
        vert.write("wvpposition = gl_Position;");
        con.frag()
            .write("vec2 texCoord = (wvpposition.xy / wvpposition.w) * 0.5 + 0.5;");
    }
}

on_def!(VoxelAo, "voxel ao", "_VoxelAOvar");

impl FeatureStage for VoxelAo {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        if st.parse_opacity {
            frag.write("envl *= traceAO(wposition, wnormal, voxels, clipmaps);");
        } else {
            frag.add_uniform("sampler2D voxels_ao", None);
            frag.write("envl *= textureLod(voxels_ao, texCoord, 0.0).rrr;");
        }
    }
}

struct IndirectInit;

impl FeatureStage for IndirectInit {
    fn name(&self) -> &'static str {
        "indirect"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        if st.has("_VoxelGI") {
            con.frag().write("vec3 indirect = vec3(0.0);");
        } else {
            con.frag().write("vec3 indirect = envl;");
        }
    }
}

on_def!(VoxelGi, "voxel gi", "_VoxelGI");

impl FeatureStage for VoxelGi {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        if st.parse_opacity {
            frag.write("indirect = traceDiffuse(wposition, n, voxels, clipmaps).rgb * albedo * voxelgiDiff;");
            frag.write("if (roughness < 1.0 && specular > 0.0)");
            frag.write("    indirect += traceSpecular(wposition, n, voxels, voxelsSDF, vVec, roughness, clipmaps, gl_FragCoord.xy).rgb * specular * voxelgiRefl;");
        } else {
            frag.add_uniform("sampler2D voxels_diffuse", None);
            frag.add_uniform("sampler2D voxels_specular", None);
            frag.write("indirect = textureLod(voxels_diffuse, texCoord, 0.0).rgb * albedo * voxelgiDiff;");
            frag.write("if (roughness < 1.0 && specular > 0.0)");
            frag.write("    indirect += textureLod(voxels_specular, texCoord, 0.0).rgb * specular * voxelgiRefl;");
        }
    }
}

struct DirectInit;

impl FeatureStage for DirectInit {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        con.frag().write("vec3 direct = vec3(0.0);");
    }
}

on_def!(Sun, "sun", "_Sun");

impl FeatureStage for Sun {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let shadowmap_sun = sun_shadowmap(st);
        let mut frag = con.frag();
        frag.add_uniform("vec3 sunCol", Some("_sunColor"));
        frag.add_uniform("vec3 sunDir", Some("_sunDirection"));
        frag.write("float svisibility = 0.0;");
        frag.write("vec3 sh = normalize(vVec + sunDir);");
        frag.write("float sdotNL = max(dot(n, sunDir), 0);");
        frag.write("float sdotNH = max(dot(n, sh), 0);");
        frag.write("float sdotVH = max(dot(vVec, sh), 0);");
        if st.has("_ShadowMap") {
            frag.add_uniform("bool receiveShadow", None);
            frag.add_uniform_with(&format!("sampler2DShadow {shadowmap_sun}"), top());
            frag.add_uniform("float shadowsBias", Some("_sunShadowsBias"));
            frag.write("if (receiveShadow) {");
            if st.has("_CSM") {
                frag.add_include("std/shadows.glsl");
                frag.add_uniform_with("vec4 casData[shadowmapCascades * 4 + 4]", included(Some("_cascadeData")));
                frag.add_uniform("vec3 eye", Some("_cameraPosition"));
                frag.write(&format!(
                    "svisibility = shadowTestCascade({shadowmap_sun}, eye, wposition + n * shadowsBias * 10, shadowsBias);"
                ));
            } else {
                let mut sh = con.tese_or_vert();
                sh.add_out("vec4 lightPosition");
                if st.is_disp {
                    sh.add_uniform("mat4 LVP", Some("_biasLightViewProjectionMatrix"));
                    sh.write("lightPosition = LVP * vec4(wposition, 1.0);");
                } else {
                    sh.add_uniform("mat4 LWVP", Some("_biasLightWorldViewProjectionMatrixSun"));
                    sh.write("lightPosition = LWVP * spos;");
                }
                let mut frag = con.frag();
                frag.write("vec3 lPos = lightPosition.xyz / lightPosition.w;");
                frag.write("const vec2 smSize = shadowmapSize;");
                frag.write(&format!(
                    "svisibility = PCF({shadowmap_sun}, lPos.xy, lPos.z - shadowsBias, smSize);"
                ));
            }
            con.frag().write("}");
        }
        let mut frag = con.frag();
        if st.has("_VoxelShadow") {
            if st.parse_opacity {
                frag.write("svisibility *= traceShadow(wposition, n, voxels, voxelsSDF, sunDir, clipmaps, texCoord);");
            } else {
                frag.write("svisibility *= textureLod(voxels_shadows, texCoord, 0.0).r * voxelgiShad;");
            }
        }
        frag.write("direct += (lambertDiffuseBRDF(albedo, sdotNL) + specularBRDF(f0, roughness, sdotNL, sdotNH, dotNV, sdotVH) * specular) * sunCol * svisibility;");
    }
}

on_def!(SinglePoint, "single point", "_SinglePoint");

impl FeatureStage for SinglePoint {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let is_spot = st.has("_Spot");
        let is_shadows = st.has("_ShadowMap");
        let mut frag = con.frag();
        frag.add_uniform("vec3 pointPos", Some("_pointPosition"));
        frag.add_uniform("vec3 pointCol", Some("_pointColor"));
        if is_spot {
            frag.add_uniform("vec3 spotDir", Some("_spotDirection"));
            frag.add_uniform("vec3 spotRight", Some("_spotRight"));
            frag.add_uniform("vec4 spotData", Some("_spotData"));
        }
        if is_shadows {
            frag.add_uniform("bool receiveShadow", None);
            frag.add_uniform("float pointBias", Some("_pointShadowsBias"));
            if is_spot {
                // Already in world space
                frag.add_uniform_with(
                    "mat4 LWVPSpot[1]",
                    included(Some("_biasLightViewProjectionMatrixSpotArray")),
                );
                frag.add_uniform_with("sampler2DShadow shadowMapSpot[1]", included(None));
                frag.add_uniform_with("sampler2D shadowMapSpotTransparent[1]", included(None));
            } else {
                frag.add_uniform_with("vec2 lightProj", included(Some("_lightPlaneProj")));
                frag.add_uniform_with("samplerCubeShadow shadowMapPoint[1]", included(None));
                frag.add_uniform_with("samplerCube shadowMapPointTransparent[1]", included(None));
            }
        }
        frag.write("direct += sampleLight(");
        frag.write("  wposition, n, vVec, dotNV, pointPos, pointCol, albedo, roughness, specular, f0");
        if is_shadows {
            frag.write(", 0, pointBias, receiveShadow");
        }
        if is_spot {
            frag.write(", true, spotData.x, spotData.y, spotDir, spotData.zw, spotRight");
        }
        if st.has("_VoxelShadow") {
            frag.write(", texCoord");
        }
        if st.has("_MicroShadowing") {
            frag.write(", occlusion");
        }
        if st.has("_SSRS") {
            frag.add_uniform_with("sampler2D gbufferD", top());
            frag.add_uniform("mat4 invVP", Some("_inverseViewProjectionMatrix"));
            frag.add_uniform("vec3 eye", Some("_cameraPosition"));
            frag.write(", gbufferD, invVP, eye");
        }
        frag.write(");");
    }
}

on_def!(Clusters, "clusters", "_Clusters");

impl FeatureStage for Clusters {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        cluster::write(st, con);
    }
}

struct Emission;

impl FeatureStage for Emission {
    fn name(&self) -> &'static str {
        "emission"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        st.emission != EmissionType::None
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        if st.emission == EmissionType::Shadeless {
            frag.write("direct = vec3(0.0);");
        }
        frag.write("indirect += emissionCol;");
    }
}

struct VoxelRefraction;

impl FeatureStage for VoxelRefraction {
    fn name(&self) -> &'static str {
        "voxel refraction"
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        st.has("_VoxelRefract") && st.parse_opacity
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        add_voxel_tracing(con);
        let mut frag = con.frag();
        frag.write("if (opacity < 1.0) {");
        frag.write("    vec3 refraction = traceRefraction(wposition, n, voxels, voxelsSDF, vVec, ior, roughness, clipmaps, texCoord).rgb * voxelgiRefr;");
        frag.write("    indirect = mix(refraction, indirect, opacity);");
        frag.write("    direct = mix(refraction, direct, opacity);");
        frag.write("}");
    }
}

on_def!(LtcUniforms, "ltc", "_LTC");

impl FeatureStage for LtcUniforms {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        for i in 0..4 {
            let link = format!("_lightArea{i}");
            frag.add_uniform_with(&format!("vec3 lightArea{i}"), included(Some(&link)));
        }
        frag.add_uniform_with("sampler2D sltcMat", included(Some("_ltcMat")));
        frag.add_uniform_with("sampler2D sltcMag", included(Some("_ltcMag")));
        if st.has("_ShadowMap") {
            if st.has("_SinglePoint") {
                frag.add_uniform_with("mat4 LWVPSpot[0]", included(Some("_biasLightViewProjectionMatrixSpot0")));
                frag.add_uniform_with("sampler2DShadow shadowMapSpot[1]", included(None));
            }
            if st.has("_Clusters") {
                frag.add_uniform_with(
                    "mat4 LWVPSpotArray[4]",
                    included(Some("_biasLightWorldViewProjectionMatrixSpotArray")),
                );
                frag.add_uniform_with("sampler2DShadow shadowMapSpot[4]", included(None));
            }
        }
    }
}

/// Light buffer plus, for SSR and refraction, the normal/material targets
/// the post passes read.
struct ForwardOutput;

impl ForwardOutput {
    fn targets(st: &PassState<'_>) -> usize {
        let rp = st.rp();
        if rp.ss_refraction || rp.voxelgi_refract {
            2
        } else if rp.ssr {
            1
        } else {
            0
        }
    }
}

impl FeatureStage for ForwardOutput {
    fn name(&self) -> &'static str {
        "forward output"
    }

    fn active(&self, _st: &PassState<'_>, _con: &ShaderContext) -> bool {
        true
    }

    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mrt = Self::targets(st);
        let mut frag = con.frag();
        if mrt == 0 {
            frag.add_out("vec4 fragColor[1]");
            frag.write("fragColor[0] = vec4(direct + indirect, 1.0);");
            return;
        }
        frag.add_out(&format!("vec4 fragColor[{mrt}+1]"));
        frag.add_include("std/gbuffer.glsl");
        frag.write("n /= (abs(n.x) + abs(n.y) + abs(n.z));");
        frag.write("n.xy = n.z >= 0.0 ? n.xy : octahedronWrap(n.xy);");
        frag.write("fragColor[0] = vec4(direct + indirect, packFloat2(occlusion, specular));");
        frag.write("fragColor[1] = vec4(n.xy, roughness, metallic);");
        if mrt == 2 {
            frag.write("fragColor[2] = vec4(1.0, 1.0, 0.0, 0.0);");
        }
    }
}

on_def!(Tonemap, "tonemap", "_LDR");

impl FeatureStage for Tonemap {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn active(&self, st: &PassState<'_>, _con: &ShaderContext) -> bool {
        Self::when(st)
    }

    fn apply(&self, _st: &mut PassState<'_>, con: &mut ShaderContext) {
        let mut frag = con.frag();
        frag.add_include("std/tonemap.glsl");
        frag.write("fragColor[0].rgb = tonemapFilmic(fragColor[0].rgb);");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::MaterialDoc;
    use crate::material::context::ContextRecord;
    use crate::material::parser::test_utils::*;
    use crate::material::render_path::PassKind;
    use crate::material::render_path::settings::{MaterialModel, RenderPathSettings, Renderer};
    use crate::material::render_path::stages::active_names;
    use crate::material::render_path::test_utils::{build, env_with};

    fn diffuse_doc() -> MaterialDoc {
        let mut b = TreeBuilder::new("Mat");
        let o = b.output();
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(d, 0, o, 0);
        test_material(vec![b.build()])
    }

    fn forward(model: MaterialModel) -> RenderPathSettings {
        RenderPathSettings {
            renderer: Renderer::Forward,
            material_model: model,
            ..RenderPathSettings::default()
        }
    }

    #[test]
    fn base_stages_follow_world_defs() {
        let doc = diffuse_doc();
        let mut env = env_with(forward(MaterialModel::Full), &["_Irr", "_Sun"]);
        let rpasses = Vec::new();
        let st = PassState::new(&doc, &mut env, &rpasses);
        let con = ShaderContext::new("Mat", ContextRecord::new("mesh"));
        let names = active_names(FORWARD_BASE, &st, &con);
        assert!(names.contains(&"irradiance"));
        assert!(names.contains(&"sun"));
        assert!(!names.contains(&"no irradiance"));
        assert!(!names.contains(&"radiance"));
        assert!(!names.contains(&"clusters"));
    }

    #[test]
    fn background_colour_yields_to_radiance() {
        let doc = diffuse_doc();
        let mut env = env_with(forward(MaterialModel::Full), &["_EnvCol", "_Rad"]);
        let rpasses = Vec::new();
        let st = PassState::new(&doc, &mut env, &rpasses);
        let con = ShaderContext::new("Mat", ContextRecord::new("mesh"));
        assert!(!BackgroundColour.active(&st, &con));
        assert!(Radiance.active(&st, &con));
    }

    #[test]
    fn full_forward_shades_sun_with_pcf() {
        let mut p = build(
            &diffuse_doc(),
            PassKind::Mesh,
            env_with(forward(MaterialModel::Full), &["_Sun", "_ShadowMap", "_Irr"]),
        );
        let frag = p.frag();
        assert!(frag.contains("vec3 envl = shIrradiance(n, shirr);"));
        assert!(frag.contains("svisibility = PCF(shadowMap, lPos.xy, lPos.z - shadowsBias, smSize);"));
        assert!(frag.contains("uniform sampler2DShadow shadowMap;"));
        assert!(frag.contains("fragColor[0] = vec4(direct + indirect, 1.0);"));
        assert!(p.vert().contains("lightPosition = LWVP * spos;"));
    }

    #[test]
    fn csm_uses_cascades_instead_of_light_position() {
        let mut p = build(
            &diffuse_doc(),
            PassKind::Mesh,
            env_with(forward(MaterialModel::Full), &["_Sun", "_ShadowMap", "_CSM"]),
        );
        let frag = p.frag();
        assert!(frag.contains("shadowTestCascade(shadowMap, eye,"));
        assert!(!p.vert().contains("lightPosition"));
    }

    #[test]
    fn ssr_writes_two_targets_and_ldr_tonemaps() {
        let rp = RenderPathSettings {
            ssr: true,
            ..forward(MaterialModel::Full)
        };
        let mut p = build(&diffuse_doc(), PassKind::Mesh, env_with(rp, &["_LDR"]));
        let frag = p.frag();
        assert!(frag.contains("out vec4 fragColor[1+1];"));
        assert!(frag.contains("fragColor[1] = vec4(n.xy, roughness, metallic);"));
        assert!(frag.contains("fragColor[0].rgb = tonemapFilmic(fragColor[0].rgb);"));
    }

    #[test]
    fn blended_materials_stop_after_the_surface() {
        let mut doc = diffuse_doc();
        doc.settings.blending = true;
        let mut p = build(&doc, PassKind::Mesh, env_with(forward(MaterialModel::Full), &["_Sun"]));
        let frag = p.frag();
        assert!(frag.contains("if (opacity < 0.2) discard;"));
        assert!(frag.contains("fragColor[0] = vec4(basecol, opacity);"));
        assert!(!frag.contains("sunCol"));
    }

    #[test]
    fn mobile_without_irradiance_uses_constant_ambient() {
        let mut p = build(&diffuse_doc(), PassKind::Mesh, env_with(forward(MaterialModel::Mobile), &[]));
        let frag = p.frag();
        assert!(frag.contains("fragColor = vec4(direct + basecol * 0.5 * envmapStrength, 1.0);"));
        assert!(frag.contains("vec3 n = normalize(wnormal);"));
    }

    #[test]
    fn mobile_point_light_samples_cube_shadows() {
        let mut p = build(
            &diffuse_doc(),
            PassKind::Mesh,
            env_with(forward(MaterialModel::Mobile), &["_SinglePoint", "_ShadowMap"]),
        );
        let frag = p.frag();
        assert!(frag.contains("visibility = texture(shadowMapPoint[0], vec4(-l + n * pointBias * 20, compare)).r;"));
        assert!(frag.contains("attenuate(distance(wposition, pointPos))"));
    }

    #[test]
    fn solid_drops_normals() {
        let mut p = build(&diffuse_doc(), PassKind::Mesh, env_with(forward(MaterialModel::Solid), &["_LDR"]));
        assert!(!p.out.con.is_elem("nor"));
        let frag = p.frag();
        assert!(frag.contains("fragColor = vec4(basecol, 1.0);"));
        assert!(frag.contains("fragColor.rgb = pow(fragColor.rgb, vec3(1.0 / 2.2));"));
    }

    #[test]
    fn clusters_loop_over_lights() {
        let mut p = build(
            &diffuse_doc(),
            PassKind::Mesh,
            env_with(forward(MaterialModel::Full), &["_Clusters", "_Spot"]),
        );
        let frag = p.frag();
        assert!(frag.contains("for (int i = 0; i < min(numLights, maxLightsCluster); i++) {"));
        assert!(frag.contains("int numSpots ="));
        assert!(p.vert().contains("wvpposition = gl_Position;"));
    }
}
