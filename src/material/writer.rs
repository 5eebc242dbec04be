//! File emission for compiled materials.
//!
//! Layout under the shader raws directory:
//! - `<mat>/<mat>_<context>.<stage>.glsl` per stage
//! - `<mat>/<mat>_data.json` (shader data)
//! - `<mat>/<mat>.material.json` (material data)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::shader::Stage;

pub fn stage_file_name(matname: &str, context: &str, stage: Stage) -> String {
    format!("{matname}_{context}.{}.glsl", stage.ext())
}

/// Writes the stage sources of one context into `dir`.
pub fn write_stages(dir: &Path, matname: &str, context: &str, sources: &[(Stage, String)]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut written = Vec::with_capacity(sources.len());
    for (stage, text) in sources {
        let path = dir.join(stage_file_name(matname, context, *stage));
        std::fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
        log::debug!("[writer] wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

/// Pretty-printed JSON with a trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut text = serde_json::to_string_pretty(value).context("failed to serialize descriptor")?;
    text.push('\n');
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    log::debug!("[writer] wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("node-forge-codegen-writer-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn stage_files_are_named_by_context_and_stage() {
        assert_eq!(stage_file_name("Mat", "mesh", Stage::Frag), "Mat_mesh.frag.glsl");
        assert_eq!(stage_file_name("Mat", "shadowmap", Stage::Tese), "Mat_shadowmap.tese.glsl");
    }

    #[test]
    fn writes_every_stage() {
        let dir = scratch_dir("stages");
        let sources = vec![
            (Stage::Vert, "#version 450\n".to_string()),
            (Stage::Frag, "#version 450\n".to_string()),
        ];
        let written = write_stages(&dir, "Mat", "mesh", &sources).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.join("Mat_mesh.vert.glsl").is_file());
        assert_eq!(std::fs::read_to_string(dir.join("Mat_mesh.frag.glsl")).unwrap(), "#version 450\n");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_ends_with_newline() {
        let dir = scratch_dir("json");
        let path = dir.join("nested").join("Mat_data.json");
        write_json(&path, &serde_json::json!({"name": "Mat_data"})).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
