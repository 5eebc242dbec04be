//! Feature stages: named, independently testable pieces of a pass script.
//!
//! Each stage is a unit struct with an activation predicate over the pass
//! state (world defs, material settings, what the context already contains)
//! and an `apply` that mutates the context. A pipeline is an ordered slice of
//! stages run front to back.

use crate::material::context::{ShaderContext, UniformOpts};

use super::PassState;

pub trait FeatureStage {
    fn name(&self) -> &'static str;
    fn active(&self, st: &PassState<'_>, con: &ShaderContext) -> bool;
    fn apply(&self, st: &mut PassState<'_>, con: &mut ShaderContext);
}

pub type Pipeline = [&'static dyn FeatureStage];

/// Runs every active stage of `pipeline` in order.
pub fn run(pipeline: &Pipeline, st: &mut PassState<'_>, con: &mut ShaderContext) {
    for stage in pipeline {
        if stage.active(st, con) {
            log::trace!("[material] {} {}: {}", con.matname(), con.name(), stage.name());
            stage.apply(st, con);
        }
    }
}

/// Names of the stages of `pipeline` that would run.
pub fn active_names(pipeline: &Pipeline, st: &PassState<'_>, con: &ShaderContext) -> Vec<&'static str> {
    pipeline
        .iter()
        .filter(|s| s.active(st, con))
        .map(|s| s.name())
        .collect()
}

/// Uniform registered with the context only; an include declares it.
pub(crate) fn included(link: Option<&str>) -> UniformOpts<'_> {
    UniformOpts {
        link,
        included: true,
        ..UniformOpts::default()
    }
}

/// Uniform declared above the includes.
pub(crate) fn top() -> UniformOpts<'static> {
    UniformOpts {
        top: true,
        ..UniformOpts::default()
    }
}
