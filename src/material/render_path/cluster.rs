//! Clustered light loop shared by the forward scripts.

use crate::material::context::ShaderContext;
use crate::material::render_path::settings::MaterialModel;

use super::PassState;
use super::stages::{included, top};

pub fn write(st: &PassState<'_>, con: &mut ShaderContext) {
    let is_mobile = st.rp().material_model == MaterialModel::Mobile;
    let is_shadows = st.has("_ShadowMap");
    let is_spot = st.has("_Spot");

    let mut frag = con.frag();
    frag.add_include_front("std/clusters.glsl");
    frag.add_uniform("vec2 cameraProj", Some("_cameraPlaneProj"));
    frag.add_uniform("vec2 cameraPlane", Some("_cameraPlane"));
    frag.add_uniform("vec4 lightsArray[maxLights * 3]", Some("_lightsArray"));
    frag.add_uniform("sampler2D clustersData", Some("_clustersData"));
    if is_shadows {
        frag.add_uniform("bool receiveShadow", None);
        frag.add_uniform_with("vec2 lightProj", included(Some("_lightPlaneProj")));
        frag.add_uniform_with("samplerCubeShadow shadowMapPoint[4]", included(None));
    }

    let mut vert = con.vert();
    vert.add_out("vec4 wvpposition");
    vert.write("wvpposition = gl_Position;");

    let mut frag = con.frag();
    frag.write("float viewz = linearize(gl_FragCoord.z, cameraProj);");
    frag.write("int clusterI = getClusterI((wvpposition.xy / wvpposition.w) * 0.5 + 0.5, viewz, cameraPlane);");
    frag.write("int numLights = int(texelFetch(clustersData, ivec2(clusterI, 0), 0).r * 255);");
    frag.write("#ifdef HLSL");
    frag.write("viewz += texture(clustersData, vec2(0.0)).r * 1e-9;");
    frag.write("#endif");

    if is_spot {
        frag.add_uniform("vec4 lightsArraySpot[maxLights * 2]", Some("_lightsArraySpot"));
        frag.write("int numSpots = int(texelFetch(clustersData, ivec2(clusterI, 1 + maxLightsCluster), 0).r * 255);");
        frag.write("int numPoints = numLights - numSpots;");
        if is_shadows {
            frag.add_uniform_with("sampler2DShadow shadowMapSpot[4]", included(None));
            frag.add_uniform_with(
                "mat4 LWVPSpotArray[maxLightsCluster]",
                included(Some("_biasLightWorldViewProjectionMatrixSpotArray")),
            );
        }
    }

    frag.write("for (int i = 0; i < min(numLights, maxLightsCluster); i++) {");
    frag.write("int li = int(texelFetch(clustersData, ivec2(clusterI, i + 1), 0).r * 255);");
    frag.write("direct += sampleLight(");
    for arg in [
        "wposition,",
        "n,",
        "vVec,",
        "dotNV,",
        "lightsArray[li * 3].xyz,",
        "lightsArray[li * 3 + 1].xyz,",
        "albedo,",
        "roughness,",
        "specular,",
        "f0",
    ] {
        frag.write(&format!("    {arg}"));
    }
    if is_shadows {
        frag.write("\t, li, lightsArray[li * 3 + 2].x, lightsArray[li * 3 + 2].z != 0.0");
    }
    if is_spot {
        frag.write("\t, lightsArray[li * 3 + 2].y != 0.0");
        frag.write("\t, lightsArray[li * 3 + 2].y");
        frag.write("\t, lightsArraySpot[li * 2].w");
        frag.write("\t, lightsArraySpot[li * 2].xyz");
        frag.write("\t, vec2(lightsArray[li * 3].w, lightsArray[li * 3 + 1].w)");
        frag.write("\t, lightsArraySpot[li * 2 + 1].xyz");
    }
    if st.has("_VoxelShadow") {
        frag.write(", voxels, voxelsSDF, clipmaps");
    }
    if st.has("_MicroShadowing") && !is_mobile {
        frag.write("\t, occlusion");
    }
    if st.has("_SSRS") {
        frag.add_uniform_with("sampler2D gbufferD", top());
        frag.add_uniform("mat4 invVP", Some("_inverseViewProjectionMatrix"));
        frag.add_uniform("vec3 eye", Some("_cameraPosition"));
        frag.write(", gbufferD, invVP, eye");
    }
    frag.write(");");
    frag.write("}");
}
