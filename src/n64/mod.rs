//! N64 backend: lowers trait IR into C.
//!
//! `traits.h` carries one data struct per trait (parents first so `_parent`
//! embeds a complete type) plus the lifecycle and method declarations;
//! `traits.c` carries the bodies and the static tween callbacks.

pub mod calls;
pub mod emitter;
pub mod headers;
pub mod ir;
pub mod media;
pub mod template;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::{IndexMap, IndexSet};

use emitter::{TraitEmitter, lifecycle};
use ir::{IrKind, IrNode, TraitIr, TraitIrDoc};
use template::{TemplateError, check_coverage};

const DEFAULT_CTYPE: &str = "float";

/// Lifecycle functions every trait exports, whether or not it has a body.
const REQUIRED_EVENTS: [(&str, bool); 3] = [("on_ready", false), ("on_update", true), ("on_remove", false)];

/// Trait names ordered so every parent precedes its children.
pub fn parent_first_order(traits: &IndexMap<String, TraitIr>) -> Vec<&str> {
    fn visit<'a>(
        name: &'a str,
        traits: &'a IndexMap<String, TraitIr>,
        visiting: &mut HashSet<&'a str>,
        out: &mut IndexSet<&'a str>,
    ) {
        // `visiting` stops inheritance cycles
        if out.contains(name) || !visiting.insert(name) {
            return;
        }
        let Some((key, ir)) = traits.get_key_value(name) else {
            return;
        };
        if let Some(parent) = ir.parent.as_deref() {
            visit(parent, traits, visiting, out);
        }
        out.insert(key.as_str());
    }
    let mut visiting = HashSet::new();
    let mut out = IndexSet::new();
    for name in traits.keys() {
        visit(name, traits, &mut visiting, &mut out);
    }
    out.into_iter().collect()
}

fn ctype(t: Option<&str>) -> &str {
    t.filter(|t| !t.is_empty()).unwrap_or(DEFAULT_CTYPE)
}

fn param_list(params: &[ir::ParamIr]) -> String {
    params
        .iter()
        .map(|p| format!(", {} {}", ctype(p.ctype.as_deref()), p.name))
        .collect()
}

/// Lifecycle functions of a trait: the required three plus any other
/// lifecycle event the trait defines, with their bodies.
fn lifecycle_events(t: &TraitIr) -> Vec<(&'static str, bool, &[IrNode])> {
    let mut out: Vec<(&'static str, bool, &[IrNode])> =
        REQUIRED_EVENTS.iter().map(|(s, dt)| (*s, *dt, Default::default())).collect();
    for (event, body) in &t.events {
        let Some((suffix, dt)) = lifecycle(event) else {
            log::warn!("[n64] unknown lifecycle event '{event}', skipped");
            continue;
        };
        match out.iter_mut().find(|(s, _, _)| *s == suffix) {
            Some(slot) => slot.2 = body.as_slice(),
            None => out.push((suffix, dt, body.as_slice())),
        }
    }
    out
}

fn lifecycle_signature(c_name: &str, suffix: &str, dt: bool) -> String {
    if dt {
        format!("void {c_name}_{suffix}(void *obj, float dt, void *data)")
    } else {
        format!("void {c_name}_{suffix}(void *obj, void *data)")
    }
}

fn method_signature(c_name: &str, name: &str, m: &ir::MethodIr) -> String {
    let ret = m.return_type.as_deref().filter(|r| !r.is_empty()).unwrap_or("void");
    format!("{ret} {c_name}_{}(void *obj, void *data{})", name.to_lowercase(), param_list(&m.params))
}

pub fn data_struct(name: &str, t: &TraitIr, traits: &IndexMap<String, TraitIr>) -> String {
    let c_name = t.c_name_or(name);
    let mut fields = Vec::new();
    if let Some(parent) = t.parent.as_deref().and_then(|p| traits.get_key_value(p)) {
        fields.push(format!("    {}Data _parent;", parent.1.c_name_or(parent.0)));
    }
    for m in &t.members {
        fields.push(format!("    {} {};", ctype(m.ctype.as_deref()), m.name));
    }
    for flag in ["_update_enabled", "_late_update_enabled", "_render2d_enabled"] {
        fields.push(format!("    bool {flag};"));
    }
    for (m_name, m) in t.methods.iter().filter(|(_, m)| m.is_virtual) {
        let ret = m.return_type.as_deref().filter(|r| !r.is_empty()).unwrap_or("void");
        fields.push(format!("    {ret} (*_vfn_{m_name})(void *obj, void *data{});", param_list(&m.params)));
    }
    format!("typedef struct {{\n{}\n}} {c_name}Data;\n", fields.join("\n"))
}

pub fn traits_h(doc: &TraitIrDoc) -> String {
    let mut body = String::new();
    for name in parent_first_order(&doc.traits) {
        if let Some(t) = doc.traits.get(name) {
            body.push_str(&format!("// Trait: {name}\n"));
            body.push_str(&data_struct(name, t, &doc.traits));
            body.push('\n');
        }
    }
    for (name, t) in &doc.traits {
        let c_name = t.c_name_or(name);
        for (suffix, dt, _) in lifecycle_events(t) {
            body.push_str(&format!("{};\n", lifecycle_signature(&c_name, suffix, dt)));
        }
        for (m_name, m) in &t.methods {
            body.push_str(&format!("{};\n", method_signature(&c_name, m_name, m)));
        }
    }
    let mut out = String::from("#ifndef ARM_TRAITS_H\n#define ARM_TRAITS_H\n\n");
    out.push_str("#include <stdbool.h>\n#include <stdint.h>\n#include \"../engine.h\"\n\n");
    out.push_str(&body);
    out.push_str("\n#endif // ARM_TRAITS_H\n");
    out
}

/// Emits the C implementation of one trait.
pub fn trait_source(name: &str, traits: &IndexMap<String, TraitIr>) -> Option<String> {
    let t = traits.get(name)?;
    let e = TraitEmitter::for_trait(name, traits)?;
    let c_name = e.c_name().to_string();
    let mut out = vec![format!("// Trait: {name}")];

    // Capture globals for parameters that tween closures read after the call returns
    let mut captures: IndexMap<String, String> = IndexMap::new();
    let mut callbacks = Vec::new();
    for m in t.methods.values() {
        for cb in media::find_tween_callbacks(&m.body) {
            for cap in cb.captures.iter().filter(|c| c.is_param) {
                let ty = m.params.iter().find(|p| p.name == cap.name).and_then(|p| p.ctype.as_deref());
                captures.entry(cap.name.clone()).or_insert_with(|| ctype(ty).to_string());
            }
            callbacks.push(cb);
        }
    }
    for body in t.events.values() {
        callbacks.extend(media::find_tween_callbacks(body));
    }
    for (cap, ty) in &captures {
        out.push(format!("static {ty} {c_name}_capture_{cap};"));
    }
    for cb in &callbacks {
        if let Some(f) = e.tween_callback_fn(cb) {
            out.push(String::new());
            out.push(f);
        }
    }

    for (suffix, dt, body) in lifecycle_events(t) {
        out.push(String::new());
        out.push(format!("{} {{", lifecycle_signature(&c_name, suffix, dt)));
        out.push("    (void)obj;".to_string());
        if dt {
            out.push("    (void)dt;".to_string());
        }
        out.push("    (void)data;".to_string());
        let stmts = e.emit_statements(body, "    ");
        if !stmts.is_empty() {
            out.push(stmts);
        }
        out.push("}".to_string());
    }
    for (m_name, m) in &t.methods {
        out.push(String::new());
        out.push(format!("{} {{", method_signature(&c_name, m_name, m)));
        out.push("    (void)obj;\n    (void)data;".to_string());
        let stmts = e.emit_statements(&m.body, "    ");
        if !stmts.is_empty() {
            out.push(stmts);
        }
        out.push("}".to_string());
    }
    Some(out.join("\n") + "\n")
}

pub fn traits_c(doc: &TraitIrDoc) -> String {
    let mut out = String::from("#include \"traits.h\"\n");
    for name in doc.traits.keys() {
        if let Some(src) = trait_source(name, &doc.traits) {
            out.push('\n');
            out.push_str(&src);
        }
    }
    out
}

/// Named placeholders each templated node kind fills in.
fn template_names(kind: IrKind) -> &'static [&'static str] {
    match kind {
        IrKind::PhysicsCall | IrKind::RemoveObject => &["obj"],
        IrKind::SignalCall => &["signal_ptr", "handler", "struct_type"],
        IrKind::GlobalSignalCall => &["signal_ptr", "handler"],
        IrKind::VecCall => &["v", "vraw"],
        _ => &[],
    }
}

fn walk<'a>(nodes: &'a [IrNode], f: &mut impl FnMut(&'a IrNode)) {
    for node in nodes {
        f(node);
        walk(&node.children, f);
        walk(&node.args, f);
        if let Some(then) = &node.props.then {
            walk(then, f);
        }
        if let Some(else_branch) = &node.props.else_branch {
            walk(else_branch, f);
        }
        if let Some(obj) = node.object.as_deref() {
            walk(std::slice::from_ref(obj), f);
        }
    }
}

/// Checks every macro-provided template against the arguments its node
/// carries. Transform calls are exempt from the positional check since
/// missing trailing arguments take a default.
pub fn check_templates(doc: &TraitIrDoc) -> Vec<TemplateError> {
    let mut errors = Vec::new();
    for t in doc.traits.values() {
        let bodies = t.methods.values().map(|m| &m.body).chain(t.events.values());
        for body in bodies {
            walk(body, &mut |node| {
                let (Some(kind), Some(code)) = (node.kind(), node.c_code.as_deref()) else {
                    return;
                };
                let arg_count = if kind == IrKind::TransformCall { usize::MAX } else { node.args.len() };
                if let Err(e) = check_coverage(code, arg_count, template_names(kind)) {
                    errors.push(e);
                }
            });
        }
    }
    errors
}

fn write_text(dir: &Path, file: &str, text: &str) -> Result<PathBuf> {
    let path = dir.join(file);
    std::fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
    log::debug!("[n64] wrote {}", path.display());
    Ok(path)
}

/// Writes `traits.h`/`traits.c` and whichever sibling headers the document
/// has data for.
pub fn write_outputs(doc: &TraitIrDoc, out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("failed to create {}", out_dir.display()))?;
    for e in check_templates(doc) {
        log::warn!("[n64] {e}");
    }
    let mut files = vec![
        write_text(out_dir, "traits.h", &traits_h(doc))?,
        write_text(out_dir, "traits.c", &traits_c(doc))?,
    ];
    if !doc.scenes.is_empty() {
        files.push(write_text(out_dir, "scenes.h", &headers::scenes_h(&doc.scenes))?);
    }
    if !doc.fonts.is_empty() {
        files.push(write_text(out_dir, "fonts.h", &headers::fonts_h(&doc.fonts))?);
    }
    if !doc.canvases.is_empty() {
        files.push(write_text(out_dir, "canvas.h", &headers::canvas_h(&doc.canvases))?);
    }
    log::info!("[n64] wrote {} files for {} traits", files.len(), doc.traits.len());
    Ok(files)
}
