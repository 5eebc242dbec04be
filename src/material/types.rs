//! Values shared between the node parser and the pass scripts.

use std::path::PathBuf;

use indexmap::IndexSet;

use super::render_path::settings::RenderPathSettings;
use super::render_path::world_defs::WorldDefs;

/// Build-wide state a material pass reads and extends: the render-path
/// settings, the world defs and the set of assets to bundle.
#[derive(Debug, Clone, Default)]
pub struct BuildEnv {
    pub rp: RenderPathSettings,
    pub world_defs: WorldDefs,
    /// Base directory image paths are resolved against.
    pub asset_root: PathBuf,
    pub assets: IndexSet<String>,
}

impl BuildEnv {
    pub fn new(rp: RenderPathSettings, world_defs: WorldDefs, asset_root: PathBuf) -> Self {
        Self {
            rp,
            world_defs,
            asset_root,
            assets: IndexSet::new(),
        }
    }

    pub fn add_asset(&mut self, path: &str) {
        if !self.assets.contains(path) {
            self.assets.insert(path.to_string());
        }
    }
}

/// How a material emits light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmissionType {
    #[default]
    None,
    /// Emission added on top of lit shading.
    Shaded,
    /// Emission replaces shading entirely.
    Shadeless,
}

impl EmissionType {
    /// Emission type of a mix of two shaders.
    pub fn combine(a: Self, b: Self) -> Self {
        use EmissionType::*;
        match (a, b) {
            (Shadeless, Shadeless) => Shadeless,
            (None, None) => None,
            _ => Shaded,
        }
    }
}

/// The surface attribute expressions a shader node produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceOuts {
    pub basecol: String,
    pub roughness: String,
    pub metallic: String,
    pub occlusion: String,
    pub specular: String,
    pub opacity: String,
    pub ior: String,
    pub emission_col: String,
}

impl Default for SurfaceOuts {
    fn default() -> Self {
        Self {
            basecol: "vec3(0.8)".to_string(),
            roughness: "0.0".to_string(),
            metallic: "0.0".to_string(),
            occlusion: "1.0".to_string(),
            specular: "1.0".to_string(),
            opacity: "1.0".to_string(),
            ior: "1.450".to_string(),
            emission_col: "vec3(0.0)".to_string(),
        }
    }
}
