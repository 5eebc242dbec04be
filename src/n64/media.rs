//! Audio and tween lowering, plus the static callbacks generated for tween
//! closures.

use super::emitter::TraitEmitter;
use super::ir::{IrKind, IrNode, TweenCallback, value_text};

const DEFAULT_SOUND: &str = "\"rom:/sound.wav64\"";

impl TraitEmitter<'_> {
    /// `arm_audio_load` / `arm_audio_play` with mix channel and loop flag.
    pub(super) fn emit_audio_start_call(&self, node: &IrNode, func: &str) -> String {
        let path = match node.args.first() {
            Some(a) => self.emit(a),
            None if !node.c_code().is_empty() => return node.c_code().to_string(),
            None => DEFAULT_SOUND.to_string(),
        };
        let channel = node.props.mix_channel.as_deref().unwrap_or("AUDIO_MIX_MASTER");
        let looping = node
            .props
            .looping
            .as_ref()
            .map(value_text)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "false".to_string());
        format!("{func}({path}, {channel}, {looping})")
    }

    pub(super) fn emit_audio_mix_volume(&self, node: &IrNode) -> String {
        let channel = node.props.channel.as_deref().unwrap_or("AUDIO_MIX_MASTER");
        let mut volume = node
            .props
            .volume
            .as_ref()
            .map(value_text)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "1.0f".to_string());
        let plain_name = !volume.chars().any(|c| "\"()+-*/=<>".contains(c));
        if plain_name && self.member_names.contains(&volume) {
            let ident = IrNode {
                node_type: IrKind::Ident.as_str().to_string(),
                value: volume.clone().into(),
                ..IrNode::default()
            };
            volume = self.emit(&ident);
        }
        format!("arm_audio_set_mix_volume({channel}, {volume})")
    }

    pub(super) fn emit_audio_handle(&self, node: &IrNode, func: &str) -> String {
        match node.children.first() {
            Some(handle) => format!("{func}(&{})", self.emit(handle)),
            None => node.c_code().to_string(),
        }
    }

    pub(super) fn emit_audio_handle_volume(&self, node: &IrNode) -> String {
        let Some(handle) = node.children.first() else {
            return node.c_code().to_string();
        };
        let vol = node.args.first().map(|a| self.emit(a)).unwrap_or_else(|| "1.0f".to_string());
        format!("arm_audio_set_volume(&{}, {vol})", self.emit(handle))
    }

    pub(super) fn emit_audio_handle_field(&self, node: &IrNode) -> String {
        let field = node.value_str();
        match node.props.handle_name.as_deref() {
            Some(handle) if !handle.is_empty() && !field.is_empty() => format!("{handle}.{field}"),
            _ => node.c_code().to_string(),
        }
    }

    /// Capture-global assignments for parameters captured by a tween's callbacks.
    pub(super) fn tween_capture_assignments(&self, node: &IrNode) -> Vec<String> {
        [&node.props.on_update, &node.props.on_done]
            .into_iter()
            .flatten()
            .flat_map(|cb| cb.captures.iter())
            .filter(|c| c.is_param)
            .map(|c| format!("{} = {}", self.capture_global(&c.name), c.name))
            .collect()
    }

    fn tween_target(&self, node: &IrNode) -> String {
        match node.object.as_deref() {
            Some(o) => self.emit(o),
            None => "NULL".to_string(),
        }
    }

    fn arg_or(&self, node: &IrNode, i: usize, default: &str) -> String {
        node.args.get(i).map(|a| self.emit(a)).unwrap_or_else(|| default.to_string())
    }

    /// Trait callbacks see `obj`/`data`; autoload callbacks use globals.
    fn callback_context(&self) -> (&'static str, &'static str) {
        if self.is_trait { ("obj", "data") } else { ("NULL", "NULL") }
    }

    fn with_tween_captures(&self, node: &IrNode, call: String) -> String {
        let captures = self.tween_capture_assignments(node);
        if captures.is_empty() {
            call
        } else {
            format!("{}; {call}", captures.join("; "))
        }
    }

    pub(super) fn emit_tween_float(&self, node: &IrNode) -> String {
        let call = self.tween_setup(node, "tween_float", "0.0f", "float", |v| v);
        self.with_tween_captures(node, call)
    }

    pub(super) fn emit_tween_vec4(&self, node: &IrNode) -> String {
        let call = self.tween_setup(node, "tween_vec4", "NULL", "vec4", |v| format!("&{v}"));
        self.with_tween_captures(node, call)
    }

    fn tween_setup(
        &self,
        node: &IrNode,
        func: &str,
        default_value: &str,
        update_suffix: &str,
        by_ref: impl Fn(String) -> String,
    ) -> String {
        let var = self.tween_target(node);
        let from = by_ref(self.arg_or(node, 0, default_value));
        let to = by_ref(self.arg_or(node, 1, default_value));
        let duration = self.arg_or(node, 2, "1.0f");
        let ease = node.props.ease.as_deref().unwrap_or("EASE_LINEAR");
        let update = callback_ref(node.props.on_update.as_ref(), update_suffix);
        let done = callback_ref(node.props.on_done.as_ref(), "done");
        let (obj, data) = self.callback_context();
        format!("{func}({var}, {from}, {to}, {duration}, {update}, {done}, {ease}, {obj}, {data})")
    }

    pub(super) fn emit_tween_delay(&self, node: &IrNode) -> String {
        let var = self.tween_target(node);
        let duration = self.arg_or(node, 0, "1.0f");
        let done = callback_ref(node.props.on_done.as_ref(), "done");
        let (obj, data) = self.callback_context();
        self.with_tween_captures(node, format!("tween_delay({var}, {duration}, {done}, {obj}, {data})"))
    }

    pub(super) fn emit_tween_control(&self, node: &IrNode, func: &str) -> String {
        format!("{func}({})", self.tween_target(node))
    }

    /// Static C function for one tween closure, or `None` when the callback
    /// has no name, no body or an unknown type.
    pub fn tween_callback_fn(&self, cb: &TweenCallback) -> Option<String> {
        if cb.callback_name.is_empty() || cb.body.is_empty() {
            return None;
        }
        let param = cb.param_name.as_deref().filter(|p| !p.is_empty()).unwrap_or("v");
        let name = &cb.callback_name;
        let signature = match cb.callback_type.as_deref()? {
            "float" => format!("static void {name}_float(float {param}, void* obj, void* data) {{"),
            "vec4" => format!("static void {name}_vec4(ArmVec4* {param}, void* obj, void* data) {{"),
            "done" => format!("static void {name}_done(void* obj, void* data) {{"),
            _ => return None,
        };
        let mut lines = vec![signature];
        lines.push(if self.is_trait { "    (void)obj;" } else { "    (void)obj; (void)data;" }.to_string());

        let captured: Vec<String> = cb.captures.iter().filter(|c| c.is_param).map(|c| c.name.clone()).collect();
        let body = if !self.is_trait && !captured.is_empty() {
            self.scoped(&captured).emit_statements(&cb.body, "    ")
        } else {
            self.emit_statements(&cb.body, "    ")
        };
        lines.extend(body.lines().filter(|l| !l.trim().is_empty()).map(str::to_string));
        lines.push("}".to_string());
        Some(lines.join("\n"))
    }

    fn scoped(&self, captured: &[String]) -> Self {
        TraitEmitter::new(
            &self.trait_name,
            &self.c_name,
            self.member_names.clone(),
            self.is_trait,
            self.parent_name.as_deref(),
            self.all_traits,
            self.virtual_methods.clone(),
        )
        .with_captures(captured)
    }
}

fn callback_ref(cb: Option<&TweenCallback>, suffix: &str) -> String {
    match cb.filter(|c| !c.callback_name.is_empty()) {
        Some(c) => format!("{}_{suffix}", c.callback_name),
        None => "NULL".to_string(),
    }
}

/// Every named tween callback under `nodes`, in source order.
pub fn find_tween_callbacks(nodes: &[IrNode]) -> Vec<&TweenCallback> {
    let mut out = Vec::new();
    for node in nodes {
        collect_tween_callbacks(node, &mut out);
    }
    out
}

fn collect_tween_callbacks<'a>(node: &'a IrNode, out: &mut Vec<&'a TweenCallback>) {
    if matches!(node.kind(), Some(IrKind::TweenFloat | IrKind::TweenVec4 | IrKind::TweenDelay)) {
        for cb in [&node.props.on_update, &node.props.on_done].into_iter().flatten() {
            if !cb.callback_name.is_empty() {
                out.push(cb);
            }
        }
    }
    let props = &node.props;
    let branches = props.then.iter().chain(props.else_branch.iter()).flatten();
    for child in node.children.iter().chain(node.args.iter()).chain(branches) {
        collect_tween_callbacks(child, out);
    }
    if let Some(obj) = node.object.as_deref() {
        collect_tween_callbacks(obj, out);
    }
}
