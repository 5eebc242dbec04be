//! IR to C lowering for one trait.
//!
//! [`TraitEmitter::emit`] dispatches on the node's [`IrKind`]. Literal, name
//! and statement rules live here; call lowering is in `calls`, audio and
//! tween lowering in `media`. An unknown or empty node emits an empty string.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use super::ir::{IrKind, IrNode, TraitIr};

/// Lifecycle method names to `(C suffix, takes dt)`.
pub fn lifecycle(method: &str) -> Option<(&'static str, bool)> {
    match method {
        "new" | "onReady" | "init" => Some(("on_ready", false)),
        "onUpdate" | "update" => Some(("on_update", true)),
        "onFixedUpdate" | "fixedUpdate" => Some(("on_fixed_update", true)),
        "onLateUpdate" | "lateUpdate" => Some(("on_late_update", true)),
        "onRemove" | "remove" => Some(("on_remove", false)),
        "onRender2D" | "render2D" => Some(("on_render2d", false)),
        _ => None,
    }
}

pub struct TraitEmitter<'a> {
    pub(super) trait_name: String,
    pub(super) c_name: String,
    pub(super) member_names: Vec<String>,
    pub(super) data_type: String,
    /// Traits pass `obj`/`data` to callbacks, autoloads pass `NULL`.
    pub(super) is_trait: bool,
    pub(super) parent_name: Option<String>,
    pub(super) all_traits: &'a IndexMap<String, TraitIr>,
    pub(super) virtual_methods: IndexSet<String>,
    member_depth: HashMap<String, usize>,
    /// Captured parameter name to its capture global, inside autoload callbacks.
    param_captures: HashMap<String, String>,
}

impl<'a> TraitEmitter<'a> {
    pub fn new(
        trait_name: &str,
        c_name: &str,
        member_names: Vec<String>,
        is_trait: bool,
        parent_name: Option<&str>,
        all_traits: &'a IndexMap<String, TraitIr>,
        virtual_methods: IndexSet<String>,
    ) -> Self {
        let mut emitter = Self {
            trait_name: trait_name.to_string(),
            c_name: c_name.to_string(),
            member_names,
            data_type: format!("{c_name}Data"),
            is_trait,
            parent_name: parent_name.map(str::to_string),
            all_traits,
            virtual_methods,
            member_depth: HashMap::new(),
            param_captures: HashMap::new(),
        };
        emitter.member_depth = emitter.build_member_depth();
        emitter
    }

    /// Emitter for `name` as declared in `all_traits`.
    pub fn for_trait(name: &str, all_traits: &'a IndexMap<String, TraitIr>) -> Option<Self> {
        let t = all_traits.get(name)?;
        let virtuals = t
            .methods
            .iter()
            .filter(|(_, m)| m.is_virtual)
            .map(|(n, _)| n.clone())
            .collect();
        Some(Self::new(
            name,
            &t.c_name_or(name),
            t.members.iter().map(|m| m.name.clone()).collect(),
            !t.is_autoload,
            t.parent.as_deref(),
            all_traits,
            virtuals,
        ))
    }

    /// Routes reads of the captured parameters through their capture globals.
    pub fn with_captures(mut self, names: &[String]) -> Self {
        self.param_captures = names
            .iter()
            .map(|n| (n.clone(), self.capture_global(n)))
            .collect();
        self
    }

    pub(super) fn capture_global(&self, name: &str) -> String {
        format!("{}_capture_{name}", self.c_name)
    }

    pub fn c_name(&self) -> &str {
        &self.c_name
    }

    pub fn is_trait(&self) -> bool {
        self.is_trait
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Ancestors from the direct parent upward, with their depth.
    pub(super) fn ancestors(&self, start: Option<&str>) -> Vec<(&'a str, &'a TraitIr, usize)> {
        let mut out = Vec::new();
        let mut current = start.or(self.parent_name.as_deref()).map(str::to_string);
        let mut depth = 1;
        while let Some(name) = current {
            let Some((key, ir)) = self.all_traits.get_key_value(name.as_str()) else {
                break;
            };
            // Guard against inheritance cycles in malformed input
            if out.iter().any(|(n, _, _)| *n == key.as_str()) {
                break;
            }
            out.push((key.as_str(), ir, depth));
            current = ir.parent.clone();
            depth += 1;
        }
        out
    }

    fn build_member_depth(&self) -> HashMap<String, usize> {
        let mut map: HashMap<String, usize> = self.member_names.iter().map(|m| (m.clone(), 0)).collect();
        for (_, ir, depth) in self.ancestors(None) {
            for m in &ir.members {
                // Child members shadow parent ones
                map.entry(m.name.clone()).or_insert(depth);
            }
        }
        map
    }

    pub(super) fn member_access(&self, name: &str) -> String {
        let depth = self.member_depth.get(name).copied().unwrap_or(0);
        format!("(({}*)data)->{}{name}", self.data_type, "_parent.".repeat(depth))
    }

    pub(super) fn is_member(&self, name: &str) -> bool {
        self.member_depth.contains_key(name)
    }

    pub(super) fn owner_data_type(&self, owner: &str) -> String {
        let c_name = self
            .all_traits
            .get(owner)
            .map(|t| t.c_name_or(owner))
            .unwrap_or_else(|| owner.to_lowercase());
        format!("{c_name}Data")
    }

    pub fn emit(&self, node: &IrNode) -> String {
        let Some(kind) = node.kind() else {
            if !node.node_type.is_empty() {
                log::debug!("[n64] {}: skipping unknown IR node '{}'", self.trait_name, node.node_type);
            }
            return String::new();
        };
        match kind {
            IrKind::Int => self.emit_int(node),
            IrKind::Float => float_literal(&node.value_str()),
            IrKind::String => self.emit_string(node),
            IrKind::Sprintf => self.emit_sprintf(node),
            IrKind::Bool => bool_literal(node.value.as_bool().unwrap_or(false)).to_string(),
            IrKind::Null => "NULL".to_string(),
            IrKind::Skip => String::new(),
            IrKind::Literal => self.emit_literal(node),
            IrKind::Member => self.member_access(&node.value_str()),
            IrKind::InheritedMember => self.emit_inherited_member(node),
            IrKind::PotentiallyInherited => self.emit_potentially_inherited(node),
            IrKind::Ident => {
                let name = node.value_str();
                match self.param_captures.get(&name) {
                    Some(global) => global.clone(),
                    None => emit_ident(&name),
                }
            }
            IrKind::MethodRef => node.c_name.clone().unwrap_or_default(),
            IrKind::FieldAccess => self.emit_field_access(node),
            IrKind::ArrayAccess => self.emit_array_access(node),
            IrKind::CLiteral => node.c_code().to_string(),
            IrKind::Assign => self.emit_assign(node),
            IrKind::Binop => self.emit_binop(node),
            IrKind::Unop => self.emit_unop(node),
            IrKind::If => self.emit_if(node),
            IrKind::Block => self.emit_block(node),
            IrKind::Var => self.emit_var(node),
            IrKind::Return => self.emit_return(node),
            IrKind::Call => self.emit_call(node),
            IrKind::CallbackParamCall => self.emit_callback_param_call(node),
            IrKind::SuperCall => self.emit_super_call(node),
            IrKind::TraitMethodCall => self.emit_trait_method_call(node),
            IrKind::InheritedMethodCall => self.emit_inherited_method_call(node),
            IrKind::MethodCall => self.emit_method_call(node),
            IrKind::SceneCall => self.emit_scene_call(node),
            IrKind::CanvasGetLabel => self.emit_canvas_get_label(node),
            IrKind::LabelSetText => self.emit_label_set_text(node),
            IrKind::TransformCall => self.emit_transform_call(node),
            IrKind::MathCall => self.emit_math_call(node),
            IrKind::InputCall => node.c_code.clone().unwrap_or_else(|| "0".to_string()),
            IrKind::PhysicsCall => self.emit_physics_call(node),
            IrKind::SignalCall => self.emit_signal_call(node),
            IrKind::GlobalSignalCall => self.emit_global_signal_call(node),
            IrKind::AutoloadCall => self.emit_autoload_call(node),
            IrKind::AutoloadField => self.emit_autoload_field(node),
            IrKind::RemoveObject => self.emit_remove_object(node),
            IrKind::CastCall => self.emit_cast_call(node),
            IrKind::DebugCall => self.emit_debug_call(node),
            IrKind::ObjectCall => node.c_code().to_string(),
            IrKind::VecCall => self.emit_vec_call(node),
            IrKind::NewVec => self.emit_new_vec(node),
            IrKind::RemoveUpdate => self.lifecycle_flag("_update_enabled", false),
            IrKind::RemoveLateUpdate => self.lifecycle_flag("_late_update_enabled", false),
            IrKind::RemoveRender2d => self.lifecycle_flag("_render2d_enabled", false),
            IrKind::NotifyUpdate => self.lifecycle_flag("_update_enabled", true),
            IrKind::NotifyRender2d => self.lifecycle_flag("_render2d_enabled", true),
            IrKind::Render2dSetColor => self.emit_render2d_set_color(node),
            IrKind::Render2dFillRect => self.emit_render2d_fill_rect(node),
            IrKind::ColorFromFloats => self.emit_color_from_floats(node),
            IrKind::AudioLoad => self.emit_audio_start_call(node, "arm_audio_load"),
            IrKind::AudioPlay => self.emit_audio_start_call(node, "arm_audio_play"),
            IrKind::AudioMixVolume => self.emit_audio_mix_volume(node),
            IrKind::AudioMixVolumeGet => node.c_code().to_string(),
            IrKind::AudioHandlePlay => self.emit_audio_handle(node, "arm_audio_start"),
            // No pause on the target: pausing stops the voice
            IrKind::AudioHandleStop | IrKind::AudioHandlePause => self.emit_audio_handle(node, "arm_audio_stop"),
            IrKind::AudioHandleVolume => self.emit_audio_handle_volume(node),
            IrKind::AudioHandleField => self.emit_audio_handle_field(node),
            IrKind::TweenAlloc => "tween_alloc()".to_string(),
            IrKind::TweenFloat => self.emit_tween_float(node),
            IrKind::TweenVec4 => self.emit_tween_vec4(node),
            IrKind::TweenDelay => self.emit_tween_delay(node),
            IrKind::TweenStart => self.emit_tween_control(node, "tween_start"),
            IrKind::TweenPause => self.emit_tween_control(node, "tween_pause"),
            IrKind::TweenStop => self.emit_tween_control(node, "tween_stop"),
        }
    }

    pub fn emit_opt(&self, node: Option<&IrNode>) -> String {
        node.map(|n| self.emit(n)).unwrap_or_default()
    }

    /// Emits each node, dropping empty results.
    pub fn emit_list(&self, nodes: &[IrNode]) -> Vec<String> {
        nodes.iter().map(|n| self.emit(n)).filter(|c| !c.is_empty()).collect()
    }

    /// Emits nodes as indented statements, terminating each with `;` unless
    /// it already ends in `;`, `{` or `}`.
    pub fn emit_statements(&self, nodes: &[IrNode], indent: &str) -> String {
        let mut out = Vec::new();
        for line in self.emit_list(nodes) {
            for sub in terminate(line).split('\n') {
                out.push(format!("{indent}{sub}"));
            }
        }
        out.join("\n")
    }

    /// Emits `args`, dropping empty results.
    pub(super) fn emit_args(&self, args: &[IrNode]) -> Vec<String> {
        self.emit_list(args)
    }

    fn lifecycle_flag(&self, flag: &str, on: bool) -> String {
        format!("(({}*)data)->{flag} = {};", self.data_type, bool_literal(on))
    }

    // Literals

    fn emit_int(&self, node: &IrNode) -> String {
        let v = node.value_str();
        if v.is_empty() { "0".to_string() } else { v }
    }

    fn emit_string(&self, node: &IrNode) -> String {
        let v = node.value_str();
        if v.is_empty() { "NULL".to_string() } else { format!("\"{v}\"") }
    }

    fn emit_sprintf(&self, node: &IrNode) -> String {
        let format = node.value_str();
        if node.args.is_empty() {
            return format!("\"{format}\"");
        }
        let args: Vec<String> = node.args.iter().map(|a| self.emit(a)).collect();
        format!("_str_concat(\"{format}\", {})", args.join(", "))
    }

    fn emit_literal(&self, node: &IrNode) -> String {
        let value = node.value_str();
        match node.props.literal_type.as_deref() {
            Some("float") => float_literal(&value),
            Some("string") => format!("\"{value}\""),
            Some("bool") => bool_literal(value == "true").to_string(),
            Some("null") => "NULL".to_string(),
            _ => value,
        }
    }

    fn emit_render2d_set_color(&self, node: &IrNode) -> String {
        match node.args.first() {
            Some(c) => format!("_g2_color = {};", self.emit(c)),
            None => "_g2_color = RGBA32(0, 0, 0, 255);".to_string(),
        }
    }

    fn emit_render2d_fill_rect(&self, node: &IrNode) -> String {
        let p = &node.props;
        let part = |n: &Option<Box<IrNode>>| {
            let s = self.emit_opt(n.as_deref());
            if s.is_empty() { "0".to_string() } else { s }
        };
        let (x, y, w, h) = (part(&p.x), part(&p.y), part(&p.width), part(&p.height));
        // Corners, not extents
        format!("render2d_fill_rect({x}, {y}, ({x}) + ({w}), ({y}) + ({h}), _g2_color);")
    }

    fn emit_color_from_floats(&self, node: &IrNode) -> String {
        if node.args.len() < 4 {
            return "RGBA32(0, 0, 0, 255)".to_string();
        }
        let c: Vec<String> = node.args[..4]
            .iter()
            .map(|a| format!("(uint8_t)(({}) * 255.0f)", self.emit(a)))
            .collect();
        format!("RGBA32({})", c.join(", "))
    }

    // Names

    fn emit_inherited_member(&self, node: &IrNode) -> String {
        let name = node.value_str();
        let owner = node.owner.as_deref().unwrap_or("");
        if self.ancestors(None).iter().any(|(n, _, _)| *n == owner) {
            return format!("(({}*)data)->{name}", self.owner_data_type(owner));
        }
        log::error!(
            "[n64] {}: inherited member '{name}' owner '{owner}' not found in inheritance chain",
            self.trait_name
        );
        format!("/* ERROR: inherited member '{name}' from '{owner}' not found */ data->_parent.{name}")
    }

    fn emit_potentially_inherited(&self, node: &IrNode) -> String {
        let name = node.value_str();
        let owner = self
            .ancestors(node.parent.as_deref())
            .into_iter()
            .find(|(_, ir, _)| ir.has_member(&name));
        match owner {
            Some((owner, _, _)) => format!("(({}*)data)->{name}", self.owner_data_type(owner)),
            None => name,
        }
    }

    fn emit_field_access(&self, node: &IrNode) -> String {
        let field = node.value_str();
        let Some(obj_node) = node.object.as_deref() else {
            return field;
        };
        let obj_value = obj_node.value_str();

        // Assets.sounds.<name> is a ROM path
        if obj_node.is(IrKind::FieldAccess) && obj_value == "sounds" {
            if let Some(inner) = obj_node.object.as_deref() {
                if inner.is(IrKind::Ident) && inner.value_str() == "Assets" {
                    return format!("\"rom:/{field}.wav64\"");
                }
            }
        }
        if obj_node.is(IrKind::PotentiallyInherited) && field == "length" && obj_value == "elements" {
            return "UI_ELEMENT_COUNT".to_string();
        }
        if obj_node.is(IrKind::Ident) && (obj_value == "this" || obj_value == "inst") {
            return if self.is_member(&field) { self.member_access(&field) } else { field };
        }

        let obj = self.emit(obj_node);
        if obj.is_empty() {
            return field;
        }
        if let Some(sub) = field.strip_prefix("transform.") {
            return format!("{obj}->transform.{sub}");
        }
        if ["ArmObject*", "ArmCamera*", "ArmLight*"].iter().any(|p| obj.contains(p)) || obj_node.is(IrKind::ArrayAccess) {
            return format!("{obj}->{field}");
        }
        format!("({obj}).{field}")
    }

    fn emit_array_access(&self, node: &IrNode) -> String {
        let [array, index, ..] = node.children.as_slice() else {
            return String::new();
        };
        let index_expr = self.emit(index);
        if index_expr.is_empty() {
            return String::new();
        }
        if is_ui_elements(array) {
            return format!("canvas_get_image({index_expr})");
        }
        let array_expr = self.emit(array);
        if array_expr.is_empty() {
            return String::new();
        }
        format!("{array_expr}[{index_expr}]")
    }

    // Statements and operators

    fn emit_assign(&self, node: &IrNode) -> String {
        let [target, value, ..] = node.children.as_slice() else {
            return String::new();
        };
        if target.is(IrKind::Skip) || value.is(IrKind::Skip) {
            return String::new();
        }

        // elements[i].visible = v toggles a whole UI group
        if target.is(IrKind::FieldAccess) && target.value_str() == "visible" {
            if let Some(obj) = target.object.as_deref().filter(|o| o.is(IrKind::ArrayAccess)) {
                if let [array, index, ..] = obj.children.as_slice() {
                    if is_ui_elements(array) {
                        let (i, v) = (self.emit(index), self.emit(value));
                        if i.is_empty() || v.is_empty() {
                            return String::new();
                        }
                        return format!("canvas_element_set_visible({i}, {v});");
                    }
                }
            }
        }

        let (t, v) = (self.emit(target), self.emit(value));
        if t.is_empty() || v.is_empty() {
            return String::new();
        }
        format!("{t} = {v};")
    }

    fn emit_binop(&self, node: &IrNode) -> String {
        let op = match node.value_str() {
            s if s.is_empty() => "+".to_string(),
            s => s,
        };
        let [left, right, ..] = node.children.as_slice() else {
            return String::new();
        };
        let (l, r) = (self.emit(left), self.emit(right));
        if l.is_empty() || r.is_empty() {
            return String::new();
        }
        const COMPOUND: [&str; 10] = ["+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>="];
        if COMPOUND.contains(&op.as_str()) {
            return format!("{l} {op} {r};");
        }
        format!("({l} {op} {r})")
    }

    fn emit_unop(&self, node: &IrNode) -> String {
        let op = match node.value_str() {
            s if s.is_empty() => "!".to_string(),
            s => s,
        };
        let operand = self.emit_opt(node.children.first());
        if operand.is_empty() {
            return String::new();
        }
        if node.props.postfix { format!("({operand}{op})") } else { format!("({op}{operand})") }
    }

    fn emit_if(&self, node: &IrNode) -> String {
        let cond = self.emit_opt(node.children.first());
        let then = node.props.then.as_deref().unwrap_or_default();
        if cond.is_empty() || then.is_empty() {
            return String::new();
        }
        let mut out = format!("if ({cond}) {{\n{}\n}}", self.emit_statements(then, "    "));
        if let Some(else_nodes) = node.props.else_branch.as_deref().filter(|e| !e.is_empty()) {
            out.push_str(&format!(" else {{\n{}\n}}", self.emit_statements(else_nodes, "    ")));
        }
        out
    }

    fn emit_block(&self, node: &IrNode) -> String {
        self.emit_list(&node.children)
            .into_iter()
            .map(terminate)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn emit_var(&self, node: &IrNode) -> String {
        let name = node.value_str();
        let ctype = node.props.ctype.as_deref().unwrap_or("float");
        let value = self.emit_opt(node.children.first());
        if value.is_empty() {
            format!("{ctype} {name};")
        } else {
            format!("{ctype} {name} = {value};")
        }
    }

    fn emit_return(&self, node: &IrNode) -> String {
        let value = self.emit_opt(node.children.first());
        if value.is_empty() { "return;".to_string() } else { format!("return {value};") }
    }
}

fn is_ui_elements(node: &IrNode) -> bool {
    node.is(IrKind::PotentiallyInherited) && node.value_str() == "elements"
}

fn terminate(line: String) -> String {
    let trimmed = line.trim_end();
    if trimmed.ends_with(';') || trimmed.ends_with('}') || trimmed.ends_with('{') {
        line
    } else {
        line + ";"
    }
}

pub(super) fn bool_literal(v: bool) -> &'static str {
    if v { "true" } else { "false" }
}

/// C float literal: always a decimal point, always an `f` suffix.
pub fn float_literal(text: &str) -> String {
    if text.is_empty() {
        return "0.0f".to_string();
    }
    if text.contains('.') {
        format!("{text}f")
    } else {
        format!("{text}.0f")
    }
}

fn emit_ident(name: &str) -> String {
    match name {
        "object" => "((ArmObject*)obj)".to_string(),
        "dt" => "time_delta".to_string(),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::n64::ir::test_utils::*;
    use serde_json::json;

    fn traits() -> IndexMap<String, TraitIr> {
        let mut all = IndexMap::new();
        all.insert("Base".to_string(), trait_ir("arm_base", &["health", "speed"], None));
        all.insert("Mid".to_string(), trait_ir("arm_mid", &["tween"], Some("Base")));
        all.insert("Player".to_string(), trait_ir("arm_player", &["speed"], Some("Mid")));
        all
    }

    #[test]
    fn literals_follow_c_grammar() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], true, None, &all, IndexSet::new());
        assert_eq!(e.emit(&float(2.0)), "2.0f");
        assert_eq!(e.emit(&with_value("float", json!(3))), "3.0f");
        assert_eq!(e.emit(&with_value("string", json!(""))), "NULL");
        assert_eq!(e.emit(&with_value("string", json!("hi"))), "\"hi\"");
        assert_eq!(e.emit(&with_value("bool", json!(true))), "true");
        assert_eq!(e.emit(&node("null")), "NULL");
        let mut lit = with_value("literal", json!("4"));
        lit.props.literal_type = Some("float".into());
        assert_eq!(e.emit(&lit), "4.0f");
    }

    #[test]
    fn members_route_through_parents() {
        let all = traits();
        let e = TraitEmitter::for_trait("Player", &all).unwrap();
        assert_eq!(e.emit(&member("speed")), "((arm_playerData*)data)->speed");
        assert_eq!(e.emit(&member("tween")), "((arm_playerData*)data)->_parent.tween");
        assert_eq!(e.emit(&member("health")), "((arm_playerData*)data)->_parent._parent.health");
    }

    #[test]
    fn inherited_member_casts_to_owner() {
        let all = traits();
        let e = TraitEmitter::for_trait("Player", &all).unwrap();
        let mut n = with_value("inherited_member", json!("health"));
        n.owner = Some("Base".into());
        assert_eq!(e.emit(&n), "((arm_baseData*)data)->health");
        n.owner = Some("Nobody".into());
        assert!(e.emit(&n).starts_with("/* ERROR: inherited member 'health'"));
        let p = with_value("potentially_inherited", json!("tween"));
        assert_eq!(e.emit(&p), "((arm_midData*)data)->tween");
        assert_eq!(e.emit(&with_value("potentially_inherited", json!("local"))), "local");
    }

    #[test]
    fn unknown_and_empty_nodes_emit_nothing() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], true, None, &all, IndexSet::new());
        assert_eq!(e.emit(&node("while_loop")), "");
        assert_eq!(e.emit(&node("")), "");
        assert_eq!(e.emit(&node("skip")), "");
    }

    #[test]
    fn lifecycle_toggles_write_flags() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], true, None, &all, IndexSet::new());
        assert_eq!(e.emit(&node("remove_update")), "((arm_tData*)data)->_update_enabled = false;");
        assert_eq!(e.emit(&node("notify_render2d")), "((arm_tData*)data)->_render2d_enabled = true;");
    }

    #[test]
    fn statements_get_terminated_and_indented() {
        let all = traits();
        let e = TraitEmitter::for_trait("Base", &all).unwrap();
        let mut assign = node("assign");
        assign.children = vec![member("speed"), float(1.5)];
        let mut call = node("call");
        call.method = Some("reset".into());
        let mut cond = node("if");
        cond.children = vec![ident("dt")];
        cond.props.then = Some(vec![call.clone()]);
        cond.props.else_branch = Some(vec![node("return")]);
        let out = e.emit_statements(&[assign, call, node("skip"), cond], "    ");
        assert_eq!(
            out,
            "    ((arm_baseData*)data)->speed = 1.5f;\n    reset();\n    if (time_delta) {\n        reset();\n    } else {\n        return;\n    }"
        );
    }

    #[test]
    fn assignments_to_skip_are_dropped() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], true, None, &all, IndexSet::new());
        let mut a = node("assign");
        a.children = vec![ident("x"), node("skip")];
        assert_eq!(e.emit(&a), "");
    }

    #[test]
    fn operators() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], true, None, &all, IndexSet::new());
        let mut b = with_value("binop", json!("+="));
        b.children = vec![ident("x"), int(1)];
        assert_eq!(e.emit(&b), "x += 1;");
        b.value = json!("*");
        assert_eq!(e.emit(&b), "(x * 1)");
        let mut u = with_value("unop", json!("++"));
        u.children = vec![ident("i")];
        u.props.postfix = true;
        assert_eq!(e.emit(&u), "(i++)");
    }

    #[test]
    fn field_access_forms() {
        let all = traits();
        let e = TraitEmitter::for_trait("Base", &all).unwrap();
        let mut f = with_value("field_access", json!("speed"));
        f.object = Some(Box::new(ident("this")));
        assert_eq!(e.emit(&f), "((arm_baseData*)data)->speed");

        let mut sounds = with_value("field_access", json!("sounds"));
        sounds.object = Some(Box::new(ident("Assets")));
        let mut snd = with_value("field_access", json!("jump"));
        snd.object = Some(Box::new(sounds));
        assert_eq!(e.emit(&snd), "\"rom:/jump.wav64\"");

        let mut loc = with_value("field_access", json!("transform.loc"));
        loc.object = Some(Box::new(ident("object")));
        assert_eq!(e.emit(&loc), "((ArmObject*)obj)->transform.loc");

        let mut x = with_value("field_access", json!("x"));
        x.object = Some(Box::new(ident("v")));
        assert_eq!(e.emit(&x), "(v).x");
    }

    #[test]
    fn ui_element_visibility() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], true, None, &all, IndexSet::new());
        let mut arr = node("array_access");
        arr.children = vec![with_value("potentially_inherited", json!("elements")), ident("i")];
        let mut vis = with_value("field_access", json!("visible"));
        vis.object = Some(Box::new(arr.clone()));
        let mut a = node("assign");
        a.children = vec![vis, with_value("bool", json!(false))];
        assert_eq!(e.emit(&a), "canvas_element_set_visible(i, false);");
        assert_eq!(e.emit(&arr), "canvas_get_image(i)");
    }

    #[test]
    fn float_literal_grammar() {
        assert_eq!(float_literal("0.5"), "0.5f");
        assert_eq!(float_literal("7"), "7.0f");
        assert_eq!(float_literal(""), "0.0f");
    }
}
