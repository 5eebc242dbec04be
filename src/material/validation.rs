//! Soft GLSL validation using naga's GLSL front-end.
//!
//! Generated stages include engine headers (`compiled.inc`, `std/*.glsl`)
//! that are not available here, so include lines are dropped and the
//! G-buffer index macros are predefined. Anything the front-end still
//! rejects is reported as a warning by the caller; validation never fails
//! a build.

use anyhow::{Context, Result, anyhow};

use super::shader::Stage;

/// Macros the G-buffer layout header would define.
const GBUFFER_DEFINES: [(&str, &str); 6] = [
    ("GBUF_SIZE", "2"),
    ("GBUF_IDX_0", "0"),
    ("GBUF_IDX_1", "1"),
    ("GBUF_IDX_2", "2"),
    ("GBUF_IDX_EMISSION", "2"),
    ("GBUF_IDX_REFRACTION", "2"),
];

fn naga_stage(stage: Stage) -> Option<naga::ShaderStage> {
    match stage {
        Stage::Vert => Some(naga::ShaderStage::Vertex),
        Stage::Frag => Some(naga::ShaderStage::Fragment),
        // naga has no geometry or tessellation front-end
        Stage::Geom | Stage::Tesc | Stage::Tese => None,
    }
}

/// Drops `#include` lines, which naga's preprocessor does not resolve.
pub fn preprocess(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        if line.trim_start().starts_with("#include") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Parses one stage with naga's GLSL front-end.
///
/// Returns `Ok(None)` for stages naga cannot parse at all (geometry and
/// tessellation).
pub fn validate_glsl(source: &str, stage: Stage) -> Result<Option<naga::Module>> {
    let Some(shader_stage) = naga_stage(stage) else {
        return Ok(None);
    };

    let mut options = naga::front::glsl::Options::from(shader_stage);
    for (name, value) in GBUFFER_DEFINES {
        options.defines.insert(name.to_string(), value.to_string());
    }

    let mut parser = naga::front::glsl::Frontend::default();
    let module = parser
        .parse(&options, &preprocess(source))
        .map_err(|e| anyhow!("GLSL parse failed: {e:?}"))?;
    Ok(Some(module))
}

/// Validates a stage and names the generating pass in the error.
pub fn validate_glsl_with_context(source: &str, stage: Stage, context: &str) -> Result<Option<naga::Module>> {
    validate_glsl(source, stage).with_context(|| format!("{context} generated invalid GLSL ({})", stage.ext()))
}

/// Validates every stage of a pass, logging failures. Returns the number of
/// stages that did not parse.
pub fn check_stages(context: &str, sources: &[(Stage, String)]) -> usize {
    let mut failed = 0;
    for (stage, source) in sources {
        if let Err(e) = validate_glsl_with_context(source, *stage, context) {
            log::warn!("[validate] {e:#}");
            failed += 1;
        }
    }
    failed
}
