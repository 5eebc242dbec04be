//! Render-path settings read from the build configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Renderer {
    Forward,
    #[default]
    Deferred,
    Raytracer,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaterialModel {
    #[default]
    Full,
    Mobile,
    Solid,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Displacement {
    Off,
    #[default]
    Vertex,
    Tessellation,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Particles {
    #[default]
    Off,
    On,
}

/// Global override of per-node texture interpolation.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFilter {
    /// Keep each image node's own interpolation.
    #[default]
    Manual,
    Anisotropic,
    Linear,
    Point,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RenderPathSettings {
    pub renderer: Renderer,
    pub material_model: MaterialModel,
    pub displacement: Displacement,
    pub tess_inner: u32,
    pub tess_outer: u32,
    /// Tessellation levels of depth and shadow passes.
    pub tess_shadows_inner: u32,
    pub tess_shadows_outer: u32,
    pub depth_prepass: bool,
    pub depth_texture: bool,
    pub ssr: bool,
    pub ss_refraction: bool,
    pub voxelgi_refract: bool,
    pub shadows: bool,
    pub translucency: bool,
    pub sss: bool,
    pub export_tangents: bool,
    pub particles: Particles,
    pub texture_filter: TextureFilter,
}

impl Default for RenderPathSettings {
    fn default() -> Self {
        Self {
            renderer: Renderer::Deferred,
            material_model: MaterialModel::Full,
            displacement: Displacement::Vertex,
            tess_inner: 14,
            tess_outer: 14,
            tess_shadows_inner: 7,
            tess_shadows_outer: 7,
            depth_prepass: false,
            depth_texture: false,
            ssr: false,
            ss_refraction: false,
            voxelgi_refract: false,
            shadows: true,
            translucency: true,
            sss: false,
            export_tangents: false,
            particles: Particles::Off,
            texture_filter: TextureFilter::Manual,
        }
    }
}

impl RenderPathSettings {
    pub fn is_forward(&self) -> bool {
        self.renderer == Renderer::Forward
    }

    pub fn tessellation(&self) -> bool {
        self.displacement == Displacement::Tessellation
    }
}
