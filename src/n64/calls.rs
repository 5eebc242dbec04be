//! Call lowering: plain calls, trait method dispatch, super calls and the
//! macro-provided `c_code` templates.

use super::emitter::{TraitEmitter, lifecycle};
use super::ir::{IrKind, IrNode};
use super::template::substitute;
use crate::material::utils::safesrc;

const CALLBACK_WRAPPER: &str = "callback_wrapper";

impl TraitEmitter<'_> {
    /// Template substitution with emitted positional args.
    pub(super) fn fill(&self, template: &str, args: &[IrNode], named: &[(&str, &str)]) -> String {
        let args: Vec<String> = args.iter().map(|a| self.emit(a)).collect();
        substitute(template, &args, named, None)
    }

    /// Arguments of a trait method call. Skipped optional arguments become
    /// `NULL`; closures become their generated function name and queue the
    /// assignments of the parameters they capture.
    fn method_args(&self, args: &[IrNode]) -> (Vec<String>, Vec<String>) {
        let mut out = Vec::new();
        let mut captures = Vec::new();
        for a in args {
            if a.is(IrKind::Skip) {
                out.push("NULL".to_string());
            } else if a.node_type == CALLBACK_WRAPPER {
                out.push(a.callback_name.clone().unwrap_or_default());
                captures.extend(
                    a.captures
                        .iter()
                        .filter(|c| c.is_param && !c.name.is_empty())
                        .map(|c| format!("{} = {}", self.capture_global(&c.name), c.name)),
                );
            } else {
                let s = self.emit(a);
                if !s.is_empty() {
                    out.push(s);
                }
            }
        }
        (out, captures)
    }

    pub(super) fn emit_call(&self, node: &IrNode) -> String {
        // Traits name the function in `method`, autoloads in `value`
        let func = node.method.clone().filter(|m| !m.is_empty()).unwrap_or_else(|| node.value_str());
        if func.is_empty() {
            return String::new();
        }
        let args = if node.args.is_empty() { &node.children } else { &node.args };
        format!("{func}({})", self.emit_args(args).join(", "))
    }

    pub(super) fn emit_callback_param_call(&self, node: &IrNode) -> String {
        let Some(name) = node.name.as_deref().filter(|n| !n.is_empty()) else {
            return String::new();
        };
        let mut args = self.emit_args(&node.args);
        args.extend(["obj".to_string(), "data".to_string()]);
        format!("if ({name}) {{ {name}({}); }}", args.join(", "))
    }

    pub(super) fn emit_super_call(&self, node: &IrNode) -> String {
        let parent = node.value_str();
        let Some(parent_ir) = self.all_traits.get(&parent) else {
            return "// super call - no parent found".to_string();
        };
        let parent_c = parent_ir.c_name_or(&parent);
        let method = node.method.as_deref().unwrap_or("");
        // The full data pointer is passed so virtual calls in the parent reach
        // the child's overrides; `_parent` sits at offset 0.
        match lifecycle(method) {
            Some((suffix, true)) => format!("{parent_c}_{suffix}(obj, dt, data)"),
            Some((suffix, false)) => format!("{parent_c}_{suffix}(obj, data)"),
            None => with_args(&format!("{parent_c}_{method}"), &self.emit_args(&node.args)),
        }
    }

    pub(super) fn emit_trait_method_call(&self, node: &IrNode) -> String {
        let Some(c_name) = node.c_name.as_deref().filter(|c| !c.is_empty()) else {
            return "// trait_method_call - missing cName".to_string();
        };
        let method = node.method.as_deref().unwrap_or("");
        let (args, captures) = self.method_args(&node.args);
        let call = if self.virtual_methods.contains(method) {
            with_args(&format!("(({}*)data)->_vfn_{method}", self.data_type), &args)
        } else {
            with_args(c_name, &args)
        };
        prefix_captures(captures, call)
    }

    pub(super) fn emit_inherited_method_call(&self, node: &IrNode) -> String {
        let method = node.method.as_deref().unwrap_or("");
        let owner = self
            .ancestors(node.parent.as_deref())
            .into_iter()
            .find(|(_, ir, _)| ir.methods.contains_key(method));
        let Some((owner, owner_ir, _)) = owner else {
            log::error!(
                "[n64] {} calls inherited method '{method}' but no parent class declares it",
                self.trait_name
            );
            return format!("/* ERROR: inherited method '{method}' not found */");
        };
        let (args, captures) = self.method_args(&node.args);
        let func = format!("{}_{}", owner_ir.c_name_or(owner), method.to_lowercase());
        prefix_captures(captures, with_args(&func, &args))
    }

    pub(super) fn emit_method_call(&self, node: &IrNode) -> String {
        let (Some(method), Some(obj_node)) = (node.method.as_deref(), node.object.as_deref()) else {
            return String::new();
        };
        if method.is_empty() {
            return String::new();
        }

        // tween.float(...).start() emits the setup and then the control call
        if matches!(obj_node.kind(), Some(IrKind::TweenFloat | IrKind::TweenVec4 | IrKind::TweenDelay)) {
            let tween_var = match obj_node.object.as_deref() {
                Some(inner) => self.emit(inner),
                None => "NULL".to_string(),
            };
            let mut parts = self.tween_capture_assignments(obj_node);
            parts.push(self.emit(obj_node));
            if matches!(method, "start" | "pause" | "stop") {
                parts.push(format!("tween_{method}({tween_var})"));
            }
            return parts.join(";\n    ");
        }

        let obj = self.emit(obj_node);
        if obj.is_empty() {
            return String::new();
        }
        match method {
            "play" => format!("arm_audio_start(&{obj})"),
            "stop" | "pause" => format!("arm_audio_stop(&{obj})"),
            "setVolume" => {
                let vol = node.args.first().map(|a| self.emit(a)).unwrap_or_else(|| "1.0f".to_string());
                format!("arm_audio_set_volume(&{obj}, {vol})")
            }
            _ => {
                let args: Vec<String> = node.args.iter().map(|a| self.emit(a)).collect();
                format!("{obj}.{method}({})", args.join(", "))
            }
        }
    }

    pub(super) fn emit_scene_call(&self, node: &IrNode) -> String {
        if let Some(code) = &node.c_code {
            return format!("{code};");
        }
        match node.args.first() {
            Some(name) => format!("scene_switch_to(scene_get_id_by_name({}));", self.emit(name)),
            None => String::new(),
        }
    }

    pub(super) fn emit_canvas_get_label(&self, node: &IrNode) -> String {
        match node.props.key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => format!("canvas_get_label(UI_LABEL_{})", safesrc(key).to_uppercase()),
            None => "NULL".to_string(),
        }
    }

    pub(super) fn emit_label_set_text(&self, node: &IrNode) -> String {
        let (Some(label), Some(value)) = (node.props.label.as_deref(), node.args.first()) else {
            return String::new();
        };
        if label.is_empty() {
            return String::new();
        }
        let label_expr = if self.member_names.iter().any(|m| m == label) {
            format!("(({}*)data)->{label}", self.data_type)
        } else {
            label.to_string()
        };
        format!("ui_label_set_text({label_expr}, {});", self.emit(value))
    }

    pub(super) fn emit_transform_call(&self, node: &IrNode) -> String {
        let code = node.c_code();
        if code.is_empty() {
            return String::new();
        }
        let args: Vec<String> = node.args.iter().map(|a| self.emit(a)).collect();
        // Optional trailing arguments (a move scale, say) default to 1.0f
        substitute(code, &args, &[], Some("1.0f"))
    }

    pub(super) fn emit_math_call(&self, node: &IrNode) -> String {
        let code = node.c_code();
        if !code.is_empty() {
            return self.fill(code, &node.args, &[]);
        }
        format!("{}({})", node.value_str(), self.emit_args(&node.args).join(", "))
    }

    pub(super) fn emit_physics_call(&self, node: &IrNode) -> String {
        let code = node.c_code();
        if code.is_empty() {
            return String::new();
        }
        let obj = match node.object.as_deref() {
            Some(o) => self.emit(o),
            None => "((ArmObject*)obj)".to_string(),
        };
        self.fill(code, &node.args, &[("obj", &obj)])
    }

    pub(super) fn emit_signal_call(&self, node: &IrNode) -> String {
        let code = node.c_code();
        if code.is_empty() {
            return String::new();
        }
        let signal = node.props.signal_name.as_deref().unwrap_or("");
        let signal_ptr = format!("&(({}*)data)->{signal}", self.data_type);
        let handler = self.handler_name(node.props.callback.as_deref());
        let struct_type = format!("{}_{signal}_payload_t", self.c_name);
        self.fill(
            code,
            &node.args,
            &[("signal_ptr", &signal_ptr), ("handler", &handler), ("struct_type", &struct_type)],
        )
    }

    pub(super) fn emit_global_signal_call(&self, node: &IrNode) -> String {
        let code = node.c_code();
        if code.is_empty() {
            return String::new();
        }
        let signal_ptr = format!("&{}", node.props.global_signal.as_deref().unwrap_or(""));
        let handler = self.handler_name(node.props.callback.as_deref());
        self.fill(code, &node.args, &[("signal_ptr", &signal_ptr), ("handler", &handler)])
    }

    fn handler_name(&self, callback: Option<&str>) -> String {
        match callback.filter(|c| !c.is_empty()) {
            Some(cb) => format!("{}_{cb}", self.c_name),
            None => String::new(),
        }
    }

    pub(super) fn emit_autoload_call(&self, node: &IrNode) -> String {
        let (Some(c_name), Some(method)) = (node.props.c_name.as_deref(), node.props.method.as_deref()) else {
            return String::new();
        };
        let args: Vec<String> = node.args.iter().map(|a| self.emit(a)).collect();
        format!("{c_name}_{method}({})", args.join(", "))
    }

    pub(super) fn emit_autoload_field(&self, node: &IrNode) -> String {
        match (node.props.c_name.as_deref(), node.props.field.as_deref()) {
            (Some(c_name), Some(field)) => format!("{c_name}_{field}"),
            _ => String::new(),
        }
    }

    pub(super) fn emit_remove_object(&self, node: &IrNode) -> String {
        let code = node.c_code();
        if code.is_empty() {
            return String::new();
        }
        let obj = match node.object.as_deref() {
            Some(o) => self.emit(o),
            None => "object".to_string(),
        };
        substitute(code, &[], &[("obj", &obj)], None)
    }

    pub(super) fn emit_cast_call(&self, node: &IrNode) -> String {
        let cast = match node.value_str() {
            c if c.is_empty() => "(int32_t)".to_string(),
            c => c,
        };
        match node.args.first() {
            Some(a) => format!("{cast}({})", self.emit(a)),
            None => String::new(),
        }
    }

    pub(super) fn emit_debug_call(&self, node: &IrNode) -> String {
        if node.args.is_empty() {
            return "debugf(\"\")".to_string();
        }
        let args = self.emit_args(&node.args);
        let format = vec!["%s"; args.len()].join(", ");
        format!("debugf(\"{format}\\n\", {})", args.join(", "))
    }

    pub(super) fn emit_vec_call(&self, node: &IrNode) -> String {
        let code = node.c_code();
        let obj = self.emit_opt(node.object.as_deref());
        if code.is_empty() || obj.is_empty() {
            return String::new();
        }
        let vec = if obj.starts_with("(Arm") { format!("({obj})") } else { obj.clone() };
        self.fill(code, &node.args, &[("v", &vec), ("vraw", &obj)])
    }

    pub(super) fn emit_new_vec(&self, node: &IrNode) -> String {
        let code = node.c_code();
        if code.is_empty() {
            return String::new();
        }
        self.fill(code, &node.args, &[])
    }
}

/// `func(obj, data[, args])`
fn with_args(func: &str, args: &[String]) -> String {
    if args.is_empty() {
        format!("{func}(obj, data)")
    } else {
        format!("{func}(obj, data, {})", args.join(", "))
    }
}

fn prefix_captures(captures: Vec<String>, call: String) -> String {
    if captures.is_empty() {
        call
    } else {
        format!("{}; {call}", captures.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::n64::ir::test_utils::*;
    use crate::n64::ir::{Capture, MethodIr, TraitIr};
    use indexmap::{IndexMap, IndexSet};
    use serde_json::json;

    fn traits() -> IndexMap<String, TraitIr> {
        let mut base = trait_ir("arm_base", &["label"], None);
        base.methods.insert("Reset".to_string(), MethodIr::default());
        let mut all = IndexMap::new();
        all.insert("Base".to_string(), base);
        all.insert("Player".to_string(), trait_ir("arm_player", &["title"], Some("Base")));
        all
    }

    fn player(all: &IndexMap<String, TraitIr>) -> TraitEmitter<'_> {
        let mut virtuals = IndexSet::new();
        virtuals.insert("jump".to_string());
        TraitEmitter::new("Player", "arm_player", vec!["title".into()], true, Some("Base"), all, virtuals)
    }

    #[test]
    fn plain_call_uses_method_or_value() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], false, None, &all, IndexSet::new());
        let mut c = node("call");
        c.method = Some("sinf".into());
        c.args = vec![float(1.0), node("skip")];
        assert_eq!(e.emit(&c), "sinf(1.0f)");
        let mut v = with_value("call", json!("reset"));
        v.children = vec![int(2)];
        assert_eq!(e.emit(&v), "reset(2)");
    }

    #[test]
    fn super_calls_map_lifecycle_names() {
        let all = traits();
        let e = player(&all);
        let mut s = with_value("super_call", json!("Base"));
        s.method = Some("update".into());
        assert_eq!(e.emit(&s), "arm_base_on_update(obj, dt, data)");
        s.method = Some("new".into());
        assert_eq!(e.emit(&s), "arm_base_on_ready(obj, data)");
        s.method = Some("shoot".into());
        s.args = vec![int(3)];
        assert_eq!(e.emit(&s), "arm_base_shoot(obj, data, 3)");
        s.value = json!("Ghost");
        assert_eq!(e.emit(&s), "// super call - no parent found");
    }

    #[test]
    fn trait_method_calls_dispatch_virtuals() {
        let all = traits();
        let e = player(&all);
        let mut c = node("trait_method_call");
        c.c_name = Some("arm_player_jump".into());
        c.method = Some("jump".into());
        assert_eq!(e.emit(&c), "((arm_playerData*)data)->_vfn_jump(obj, data)");
        c.method = Some("land".into());
        c.c_name = Some("arm_player_land".into());
        let mut wrapper = node("callback_wrapper");
        wrapper.callback_name = Some("arm_player_cb0".into());
        wrapper.captures = vec![Capture { name: "speed".into(), is_param: true }];
        c.args = vec![node("skip"), wrapper];
        assert_eq!(
            e.emit(&c),
            "arm_player_capture_speed = speed; arm_player_land(obj, data, NULL, arm_player_cb0)"
        );
        c.c_name = None;
        assert_eq!(e.emit(&c), "// trait_method_call - missing cName");
    }

    #[test]
    fn inherited_method_calls_find_owner() {
        let all = traits();
        let e = player(&all);
        let mut c = node("inherited_method_call");
        c.method = Some("Reset".into());
        assert_eq!(e.emit(&c), "arm_base_reset(obj, data)");
        c.method = Some("Missing".into());
        assert!(e.emit(&c).starts_with("/* ERROR"));
    }

    #[test]
    fn audio_handle_methods() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], true, None, &all, IndexSet::new());
        let mut m = node("method_call");
        m.object = Some(Box::new(ident("music")));
        m.method = Some("pause".into());
        assert_eq!(e.emit(&m), "arm_audio_stop(&music)");
        m.method = Some("setVolume".into());
        assert_eq!(e.emit(&m), "arm_audio_set_volume(&music, 1.0f)");
        m.method = Some("fadeOut".into());
        m.args = vec![float(0.5)];
        assert_eq!(e.emit(&m), "music.fadeOut(0.5f)");
    }

    #[test]
    fn templated_calls() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], true, None, &all, IndexSet::new());
        let t = c_code("transform_call", "it_move(obj, {0}, {1})", vec![ident("dir")]);
        assert_eq!(e.emit(&t), "it_move(obj, dir, 1.0f)");
        let p = c_code("physics_call", "physics_apply_impulse({obj}, {0})", vec![ident("f")]);
        assert_eq!(e.emit(&p), "physics_apply_impulse(((ArmObject*)obj), f)");
        let mut v = c_code("vec_call", "vec3_length({v}) + {vraw}.x", vec![]);
        v.object = Some(Box::new(ident("object")));
        assert_eq!(e.emit(&v), "vec3_length(((ArmObject*)obj)) + ((ArmObject*)obj).x");
        let r = c_code("remove_object", "object_remove({obj})", vec![]);
        assert_eq!(e.emit(&r), "object_remove(object)");
        assert_eq!(e.emit(&node("input_call")), "0");
    }

    #[test]
    fn signals_fill_named_placeholders() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], true, None, &all, IndexSet::new());
        let mut s = c_code("signal_call", "signal_connect({signal_ptr}, {handler}, obj, data)", vec![]);
        s.props.signal_name = Some("hit".into());
        s.props.callback = Some("on_hit".into());
        assert_eq!(e.emit(&s), "signal_connect(&((arm_tData*)data)->hit, arm_t_on_hit, obj, data)");
        let mut g = c_code("global_signal_call", "signal_emit({signal_ptr}, NULL)", vec![]);
        g.props.global_signal = Some("g_game_over".into());
        assert_eq!(e.emit(&g), "signal_emit(&g_game_over, NULL)");
    }

    #[test]
    fn labels_and_scenes() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec!["score".into()], true, None, &all, IndexSet::new());
        let mut l = node("canvas_get_label");
        l.props.key = Some("Score Text".into());
        assert_eq!(e.emit(&l), "canvas_get_label(UI_LABEL_SCORETEXT)");
        assert_eq!(e.emit(&node("canvas_get_label")), "NULL");
        let mut set = node("label_set_text");
        set.props.label = Some("score".into());
        set.args = vec![with_value("string", json!("0"))];
        assert_eq!(e.emit(&set), "ui_label_set_text(((arm_tData*)data)->score, \"0\");");
        let mut sc = node("scene_call");
        sc.args = vec![with_value("string", json!("Level2"))];
        assert_eq!(e.emit(&sc), "scene_switch_to(scene_get_id_by_name(\"Level2\"));");
    }

    #[test]
    fn debug_and_cast() {
        let all = IndexMap::new();
        let e = TraitEmitter::new("T", "arm_t", vec![], true, None, &all, IndexSet::new());
        let mut d = node("debug_call");
        assert_eq!(e.emit(&d), "debugf(\"\")");
        d.args = vec![ident("a")];
        assert_eq!(e.emit(&d), "debugf(\"%s\\n\", a)");
        d.args.push(ident("b"));
        assert_eq!(e.emit(&d), "debugf(\"%s, %s\\n\", a, b)");
        let mut c = node("cast_call");
        c.args = vec![float(2.5)];
        assert_eq!(e.emit(&c), "(int32_t)(2.5f)");
    }
}
