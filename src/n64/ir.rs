//! Trait IR document model.
//!
//! IR nodes arrive as JSON objects tagged by `type`. The node shape is shared
//! by every tag; which fields a tag reads is up to its emit rule. Tags are
//! mapped onto the closed [`IrKind`] set so the emitter dispatches with an
//! exhaustive `match`. Unknown tags map to `None` and emit nothing.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct IrNode {
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub children: Vec<IrNode>,
    #[serde(default)]
    pub args: Vec<IrNode>,
    #[serde(default)]
    pub props: IrProps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Box<IrNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(rename = "cName", default, skip_serializing_if = "Option::is_none")]
    pub c_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declaring class of an inherited member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Parent class hint for inherited lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Generated function name of a `callback_wrapper` argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub captures: Vec<Capture>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IrProps {
    pub literal_type: Option<String>,
    pub postfix: bool,
    pub then: Option<Vec<IrNode>>,
    #[serde(rename = "else_")]
    pub else_branch: Option<Vec<IrNode>>,
    pub ctype: Option<String>,
    pub key: Option<String>,
    pub label: Option<String>,
    pub signal_name: Option<String>,
    pub callback: Option<String>,
    pub global_signal: Option<String>,
    pub c_name: Option<String>,
    pub method: Option<String>,
    pub field: Option<String>,
    pub mix_channel: Option<String>,
    #[serde(rename = "loop")]
    pub looping: Option<serde_json::Value>,
    pub channel: Option<String>,
    pub volume: Option<serde_json::Value>,
    pub handle_name: Option<String>,
    pub ease: Option<String>,
    pub on_update: Option<TweenCallback>,
    pub on_done: Option<TweenCallback>,
    /// `fill_rect` geometry.
    pub x: Option<Box<IrNode>>,
    pub y: Option<Box<IrNode>>,
    pub width: Option<Box<IrNode>>,
    pub height: Option<Box<IrNode>>,
}

/// A tween update or completion callback generated from a closure.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TweenCallback {
    pub callback_name: String,
    /// `float`, `vec4` or `done`.
    pub callback_type: Option<String>,
    pub param_name: Option<String>,
    pub body: Vec<IrNode>,
    pub captures: Vec<Capture>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Capture {
    pub name: String,
    pub is_param: bool,
}

macro_rules! ir_kinds {
    ($($variant:ident => $tag:literal,)*) => {
        /// Closed set of IR node tags the emitter lowers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum IrKind {
            $($variant,)*
        }

        impl IrKind {
            pub const ALL: &'static [IrKind] = &[$(IrKind::$variant,)*];

            pub fn parse(tag: &str) -> Option<Self> {
                match tag {
                    $($tag => Some(IrKind::$variant),)*
                    _ => None,
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(IrKind::$variant => $tag,)*
                }
            }
        }
    };
}

ir_kinds! {
    // Literals
    Int => "int",
    Float => "float",
    String => "string",
    Sprintf => "sprintf",
    Bool => "bool",
    Null => "null",
    Skip => "skip",
    Literal => "literal",
    // Names
    Member => "member",
    InheritedMember => "inherited_member",
    PotentiallyInherited => "potentially_inherited",
    Ident => "ident",
    MethodRef => "method_ref",
    FieldAccess => "field_access",
    ArrayAccess => "array_access",
    CLiteral => "c_literal",
    // Statements and operators
    Assign => "assign",
    Binop => "binop",
    Unop => "unop",
    If => "if",
    Block => "block",
    Var => "var",
    Return => "return",
    // Calls
    Call => "call",
    CallbackParamCall => "callback_param_call",
    SuperCall => "super_call",
    TraitMethodCall => "trait_method_call",
    InheritedMethodCall => "inherited_method_call",
    MethodCall => "method_call",
    SceneCall => "scene_call",
    CanvasGetLabel => "canvas_get_label",
    LabelSetText => "label_set_text",
    TransformCall => "transform_call",
    MathCall => "math_call",
    InputCall => "input_call",
    PhysicsCall => "physics_call",
    SignalCall => "signal_call",
    GlobalSignalCall => "global_signal_call",
    AutoloadCall => "autoload_call",
    AutoloadField => "autoload_field",
    RemoveObject => "remove_object",
    CastCall => "cast_call",
    DebugCall => "debug_call",
    ObjectCall => "object_call",
    VecCall => "vec_call",
    NewVec => "new_vec",
    // Lifecycle toggles and 2D drawing
    RemoveUpdate => "remove_update",
    RemoveLateUpdate => "remove_late_update",
    RemoveRender2d => "remove_render2d",
    NotifyUpdate => "notify_update",
    NotifyRender2d => "notify_render2d",
    Render2dSetColor => "render2d_set_color",
    Render2dFillRect => "render2d_fill_rect",
    ColorFromFloats => "color_from_floats",
    // Audio
    AudioLoad => "audio_load",
    AudioPlay => "audio_play",
    AudioMixVolume => "audio_mix_volume",
    AudioMixVolumeGet => "audio_mix_volume_get",
    AudioHandlePlay => "audio_handle_play",
    AudioHandleStop => "audio_handle_stop",
    AudioHandlePause => "audio_handle_pause",
    AudioHandleVolume => "audio_handle_volume",
    AudioHandleField => "audio_handle_field",
    // Tweens
    TweenAlloc => "tween_alloc",
    TweenFloat => "tween_float",
    TweenVec4 => "tween_vec4",
    TweenDelay => "tween_delay",
    TweenStart => "tween_start",
    TweenPause => "tween_pause",
    TweenStop => "tween_stop",
}

impl IrNode {
    pub fn kind(&self) -> Option<IrKind> {
        IrKind::parse(&self.node_type)
    }

    pub fn is(&self, kind: IrKind) -> bool {
        self.kind() == Some(kind)
    }

    /// `value` as source text: strings verbatim, numbers and bools printed.
    pub fn value_str(&self) -> String {
        value_text(&self.value)
    }

    pub fn c_code(&self) -> &str {
        self.c_code.as_deref().unwrap_or("")
    }
}

pub fn value_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MemberIr {
    pub name: String,
    pub ctype: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ParamIr {
    pub name: String,
    pub ctype: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MethodIr {
    pub params: Vec<ParamIr>,
    pub return_type: Option<String>,
    pub body: Vec<IrNode>,
    /// Public methods that a child trait may override.
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
}

/// One trait or autoload class.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TraitIr {
    pub c_name: Option<String>,
    pub parent: Option<String>,
    /// Autoloads are singletons without object or data pointers.
    pub is_autoload: bool,
    pub members: Vec<MemberIr>,
    pub methods: IndexMap<String, MethodIr>,
    /// Lifecycle name (`init`, `update`, ...) to body.
    pub events: IndexMap<String, Vec<IrNode>>,
}

impl TraitIr {
    pub fn c_name_or(&self, trait_name: &str) -> String {
        self.c_name.clone().unwrap_or_else(|| trait_name.to_lowercase())
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CanvasIr {
    pub width: u32,
    pub height: u32,
    /// Label keys in element order.
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FontIr {
    pub key: String,
    pub font_id: u32,
}

/// A whole trait IR export: traits plus the data the sibling headers need.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TraitIrDoc {
    pub traits: IndexMap<String, TraitIr>,
    pub scenes: Vec<String>,
    pub fonts: Vec<FontIr>,
    pub canvases: IndexMap<String, CanvasIr>,
}

pub fn load_trait_ir_from_str(text: &str) -> Result<TraitIrDoc> {
    serde_json::from_str(text).context("failed to parse trait IR json")
}

pub fn load_trait_ir_from_path(path: impl AsRef<Path>) -> Result<TraitIrDoc> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read trait IR json at {}", path.display()))?;
    load_trait_ir_from_str(&text).with_context(|| format!("invalid trait IR in {}", path.display()))
}

#[cfg(test)]
pub mod test_utils {
    //! Terse IR constructors for emitter tests.

    use super::*;

    pub fn node(ty: &str) -> IrNode {
        IrNode {
            node_type: ty.to_string(),
            ..IrNode::default()
        }
    }

    pub fn with_value(ty: &str, value: serde_json::Value) -> IrNode {
        IrNode {
            value,
            ..node(ty)
        }
    }

    pub fn ident(name: &str) -> IrNode {
        with_value("ident", name.into())
    }

    pub fn int(v: i64) -> IrNode {
        with_value("int", v.into())
    }

    pub fn float(v: f64) -> IrNode {
        with_value("float", v.into())
    }

    pub fn member(name: &str) -> IrNode {
        with_value("member", name.into())
    }

    pub fn c_code(ty: &str, code: &str, args: Vec<IrNode>) -> IrNode {
        IrNode {
            c_code: Some(code.to_string()),
            args,
            ..node(ty)
        }
    }

    pub fn trait_ir(c_name: &str, members: &[&str], parent: Option<&str>) -> TraitIr {
        TraitIr {
            c_name: Some(c_name.to_string()),
            parent: parent.map(str::to_string),
            members: members
                .iter()
                .map(|m| MemberIr {
                    name: m.to_string(),
                    ctype: Some("float".to_string()),
                })
                .collect(),
            ..TraitIr::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for kind in IrKind::ALL {
            assert_eq!(IrKind::parse(kind.as_str()), Some(*kind));
        }
        assert_eq!(IrKind::parse("while_loop"), None);
    }

    #[test]
    fn parses_nested_if() {
        let text = r#"{
            "type": "if",
            "children": [{"type": "ident", "value": "ok"}],
            "props": {"then": [{"type": "return"}], "else_": null}
        }"#;
        let node: IrNode = serde_json::from_str(text).unwrap();
        assert_eq!(node.kind(), Some(IrKind::If));
        assert_eq!(node.props.then.as_ref().map(Vec::len), Some(1));
        assert!(node.props.else_branch.is_none());
    }

    #[test]
    fn value_text_prints_scalars() {
        assert_eq!(value_text(&serde_json::json!("x")), "x");
        assert_eq!(value_text(&serde_json::json!(3)), "3");
        assert_eq!(value_text(&serde_json::json!(1.5)), "1.5");
        assert_eq!(value_text(&serde_json::Value::Null), "");
    }

    #[test]
    fn trait_doc_defaults() {
        let doc = load_trait_ir_from_str(r#"{"traits": {"Rotator": {"members": [{"name": "speed"}]}}}"#).unwrap();
        let t = &doc.traits["Rotator"];
        assert_eq!(t.c_name_or("Rotator"), "rotator");
        assert!(t.has_member("speed"));
        assert!(doc.scenes.is_empty());
    }
}
