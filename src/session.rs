//! Build session: owns every piece of build-wide state (world defs, assets
//! to bundle, compiled contexts and descriptors) between `new` and `finish`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::dsl::MaterialDoc;
use crate::material::render_path::settings::RenderPathSettings;
use crate::material::render_path::world_defs::WorldDefs;
use crate::material::render_path::{self, PassKind, material_passes, needs_sss};
use crate::material::shader::Stage;
use crate::material::shader_data::{BindConstant, BindTexture, MaterialContext, MaterialData, ShaderData};
use crate::material::types::BuildEnv;
use crate::material::{validation, writer};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildConfig {
    pub render_path: RenderPathSettings,
    pub world_defs: Vec<String>,
    pub output_dir: PathBuf,
    pub validate_glsl: bool,
    /// Relative paths are resolved against `output_dir`.
    pub shader_raws_dir: PathBuf,
    /// Base directory for texture existence checks.
    pub asset_root: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            render_path: RenderPathSettings::default(),
            world_defs: Vec::new(),
            output_dir: PathBuf::from("."),
            validate_glsl: false,
            shader_raws_dir: PathBuf::from("build/compiled/ShaderRaws"),
            asset_root: PathBuf::from("."),
        }
    }
}

impl BuildConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse build config json")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read build config at {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("invalid build config in {}", path.display()))
    }

    pub fn raws_dir(&self) -> PathBuf {
        if self.shader_raws_dir.is_absolute() {
            self.shader_raws_dir.clone()
        } else {
            self.output_dir.join(&self.shader_raws_dir)
        }
    }
}

/// Stage sources of one compiled context.
#[derive(Debug, Clone)]
pub struct CompiledContext {
    pub name: String,
    pub sources: Vec<(Stage, String)>,
}

#[derive(Debug, Clone)]
pub struct CompiledMaterial {
    pub name: String,
    pub passes: Vec<String>,
    pub contexts: Vec<CompiledContext>,
    pub shader_data: ShaderData,
    pub material_data: MaterialData,
}

#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub files: Vec<PathBuf>,
    pub world_defs: Vec<String>,
    pub assets: Vec<String>,
    /// `<matname>/<context>` for every compiled context.
    pub shader_passes: Vec<String>,
    pub warnings: usize,
}

pub struct BuildSession {
    config: BuildConfig,
    env: BuildEnv,
    stashed_textures: Vec<BindTexture>,
    materials: Vec<CompiledMaterial>,
    shader_passes: IndexSet<String>,
    warnings: usize,
}

impl BuildSession {
    pub fn new(config: BuildConfig) -> Self {
        let world_defs = WorldDefs::from_config(&config.world_defs, &config.render_path);
        let env = BuildEnv::new(config.render_path.clone(), world_defs, config.asset_root.clone());
        log::info!("[build] session started, world defs: {}", env.world_defs.joined());
        Self {
            config,
            env,
            stashed_textures: Vec::new(),
            materials: Vec::new(),
            shader_passes: IndexSet::new(),
            warnings: 0,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn env(&self) -> &BuildEnv {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut BuildEnv {
        &mut self.env
    }

    pub fn world_defs(&self) -> &WorldDefs {
        &self.env.world_defs
    }

    pub fn materials(&self) -> &[CompiledMaterial] {
        &self.materials
    }

    /// Keeps the textures of the pass just built until the material data
    /// picks them up.
    pub fn stash_textures(&mut self, textures: Vec<BindTexture>) {
        self.stashed_textures.extend(textures);
    }

    fn take_textures(&mut self) -> Vec<BindTexture> {
        std::mem::take(&mut self.stashed_textures)
    }

    /// Compiles every pass of `doc` and records its descriptors.
    pub fn build_material(&mut self, doc: &MaterialDoc) -> Result<&CompiledMaterial> {
        doc.validate()
            .with_context(|| format!("material '{}' is malformed", doc.name))?;
        log::info!("[build] material {}", doc.name);

        let mat = &doc.settings;
        let sss = self.env.rp.sss && needs_sss(doc);
        if sss {
            self.env.world_defs.add("_SSS");
        }
        if mat.material_id == 2 {
            self.env.world_defs.add("_Hair");
        }

        let passes = material_passes(doc, &self.env.rp);
        let mut shader_data = ShaderData::new(&doc.name);
        let mut material_data = MaterialData::new(&doc.name, &shader_data.name().to_string());
        let mut contexts = Vec::new();

        for pass in &passes {
            let mut bind_textures = Vec::new();
            if let Some(kind) = PassKind::from_name(pass) {
                let mut con = render_path::build_pass(self, doc, kind);
                bind_textures = self.take_textures();
                let sources = con.sources();

                for stage in Stage::ALL {
                    if let Some(sh) = con.shader(stage) {
                        self.warnings += sh.uniform_conflicts().len();
                    }
                }
                if self.config.validate_glsl {
                    let label = format!("{} {}", doc.name, con.name());
                    self.warnings += validation::check_stages(&label, &sources);
                }

                self.shader_passes.insert(format!("{}/{}", doc.name, con.name()));
                contexts.push(CompiledContext {
                    name: con.name().to_string(),
                    sources,
                });
                shader_data.add_context(con.data);
            }

            let mut bind_constants = Vec::new();
            if pass == "mesh" {
                bind_constants.push(BindConstant::bool("receiveShadow", mat.receive_shadow));
                if mat.material_id != 0 {
                    bind_constants.push(BindConstant::int("materialID", mat.material_id));
                } else if self.env.rp.sss {
                    bind_constants.push(BindConstant::int("materialID", if sss { 2 } else { 0 }));
                }
            } else if pass == "translucent" {
                bind_constants.push(BindConstant::bool("receiveShadow", mat.receive_shadow));
            }

            material_data.contexts.push(MaterialContext {
                name: pass.clone(),
                bind_constants,
                bind_textures,
                depth_read: pass == "mesh" && mat.depth_read,
            });
        }

        self.materials.push(CompiledMaterial {
            name: doc.name.clone(),
            passes,
            contexts,
            shader_data,
            material_data,
        });
        self.materials
            .last()
            .context("material list is empty after push")
    }

    /// Writes every compiled material below the shader raws directory.
    pub fn finish(self) -> Result<BuildSummary> {
        let raws = self.config.raws_dir();
        let mut files = Vec::new();
        for mat in &self.materials {
            let dir = raws.join(&mat.name);
            for con in &mat.contexts {
                files.extend(writer::write_stages(&dir, &mat.name, &con.name, &con.sources)?);
            }
            let data_path = dir.join(format!("{}.json", mat.shader_data.name()));
            writer::write_json(&data_path, &mat.shader_data)?;
            files.push(data_path);
            let material_path = dir.join(format!("{}.material.json", mat.name));
            writer::write_json(&material_path, &mat.material_data)?;
            files.push(material_path);
        }

        let summary = BuildSummary {
            files,
            world_defs: self.env.world_defs.iter().map(str::to_string).collect(),
            assets: self.env.assets.iter().cloned().collect(),
            shader_passes: self.shader_passes.into_iter().collect(),
            warnings: self.warnings,
        };
        log::info!(
            "[build] wrote {} files for {} materials ({} warnings)",
            summary.files.len(),
            self.materials.len(),
            summary.warnings
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::parser::test_utils::*;

    fn diffuse_doc(name: &str) -> MaterialDoc {
        let mut b = TreeBuilder::new(name);
        let o = b.output();
        let d = b.diffuse("Diffuse", [1.0; 4], 0.0);
        b.link(d, 0, o, 0);
        let mut doc = test_material(vec![b.build()]);
        doc.name = name.to_string();
        doc
    }

    #[test]
    fn config_defaults_fill_missing_keys() {
        let cfg = BuildConfig::from_json_str(r#"{"world_defs": ["_Irr"], "render_path": {"renderer": "Forward"}}"#).unwrap();
        assert_eq!(cfg.world_defs, ["_Irr"]);
        assert!(cfg.render_path.is_forward());
        assert_eq!(cfg.render_path.tess_inner, 14);
        assert_eq!(cfg.shader_raws_dir, PathBuf::from("build/compiled/ShaderRaws"));
        assert!(!cfg.validate_glsl);
    }

    #[test]
    fn material_data_lists_every_pass() {
        let mut session = BuildSession::new(BuildConfig::default());
        let mat = session.build_material(&diffuse_doc("Mat")).unwrap();
        assert_eq!(mat.passes, ["mesh", "shadowmap"]);
        assert_eq!(mat.shader_data.contexts().len(), 2);
        let v = serde_json::to_value(&mat.material_data).unwrap();
        assert_eq!(v["shader"], "Mat_data.json/Mat_data");
        assert_eq!(v["contexts"][0]["name"], "mesh");
        assert_eq!(v["contexts"][0]["bind_constants"][0]["name"], "receiveShadow");
        assert_eq!(v["contexts"][1]["bind_constants"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn material_id_binds_and_hair_def() {
        let mut doc = diffuse_doc("Hair");
        doc.settings.material_id = 2;
        let mut session = BuildSession::new(BuildConfig::default());
        let mat = session.build_material(&doc).unwrap();
        let consts = &mat.material_data.contexts[0].bind_constants;
        assert_eq!(consts[1], BindConstant::int("materialID", 2));
        assert!(session.world_defs().has("_Hair"));
    }

    #[test]
    fn building_twice_is_byte_identical() {
        let build = || {
            let mut session = BuildSession::new(BuildConfig::default());
            let mat = session.build_material(&diffuse_doc("Mat")).unwrap();
            mat.contexts.iter().flat_map(|c| c.sources.clone()).collect::<Vec<_>>()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn finish_writes_stages_and_descriptors() {
        let out = std::env::temp_dir().join(format!("node-forge-codegen-session-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&out);
        let config = BuildConfig {
            output_dir: out.clone(),
            ..BuildConfig::default()
        };
        let mut session = BuildSession::new(config);
        session.build_material(&diffuse_doc("Mat")).unwrap();
        let summary = session.finish().unwrap();
        let dir = out.join("build/compiled/ShaderRaws/Mat");
        assert!(dir.join("Mat_mesh.vert.glsl").is_file());
        assert!(dir.join("Mat_mesh.frag.glsl").is_file());
        assert!(dir.join("Mat_shadowmap.vert.glsl").is_file());
        assert!(dir.join("Mat_data.json").is_file());
        assert!(dir.join("Mat.material.json").is_file());
        assert_eq!(summary.files.len(), 6);
        assert_eq!(summary.shader_passes, ["Mat/mesh", "Mat/shadowmap"]);
        let _ = std::fs::remove_dir_all(&out);
    }
}
