//! Sibling headers that generated trait code refers to by symbol name:
//! `SCENE_<NAME>`, `FONT_<NAME>` and `UI_LABEL_<KEY>`.

use indexmap::IndexMap;

use super::ir::{CanvasIr, FontIr};
use crate::material::utils::safesrc;

fn guarded(guard: &str, includes: &[&str], body: &str) -> String {
    let mut out = format!("#ifndef {guard}\n#define {guard}\n\n");
    for inc in includes {
        out.push_str(&format!("#include {inc}\n"));
    }
    if !includes.is_empty() {
        out.push('\n');
    }
    out.push_str(body);
    out.push_str(&format!("\n#endif // {guard}\n"));
    out
}

pub fn scenes_h(scenes: &[String]) -> String {
    let names: Vec<String> = scenes.iter().map(|s| safesrc(s).to_lowercase()).collect();
    let mut body = String::from("typedef enum {\n");
    for (i, name) in names.iter().enumerate() {
        body.push_str(&format!("    SCENE_{} = {i},\n", name.to_uppercase()));
    }
    body.push_str(&format!("    SCENE_COUNT = {}\n}} SceneId;\n\n", names.len()));
    for name in &names {
        body.push_str(&format!("void scene_{name}_init(ArmScene *scene);\n"));
    }
    guarded("ARM_SCENES_H", &["\"../engine.h\""], &body)
}

/// Enum entry name for a font key.
pub fn font_enum_name(key: &str) -> String {
    key.to_uppercase().replace(['-', ' '], "_")
}

pub fn fonts_h(fonts: &[FontIr]) -> String {
    let mut sorted: Vec<&FontIr> = fonts.iter().collect();
    sorted.sort_by_key(|f| f.font_id);
    let mut body = String::from("typedef enum {\n");
    for f in &sorted {
        body.push_str(&format!("    FONT_{} = {},\n", font_enum_name(&f.key), f.font_id));
    }
    body.push_str(&format!("    FONT_COUNT = {}\n}} FontId;\n", fonts.len()));
    guarded("ARM_FONTS_H", &[], &body)
}

/// Label defines keyed by label key only, so traits work against whichever
/// canvas the current scene loaded. A key seen again at another index keeps
/// its first index and logs a warning.
pub fn canvas_h(canvases: &IndexMap<String, CanvasIr>) -> String {
    let mut seen: IndexMap<String, usize> = IndexMap::new();
    let mut body = String::new();
    let mut label_count = 0;

    if let Some(first) = canvases.values().next() {
        body.push_str(&format!(
            "#define UI_CANVAS_WIDTH {}\n#define UI_CANVAS_HEIGHT {}\n\n",
            first.width, first.height
        ));
    }
    for (name, canvas) in canvases {
        body.push_str(&format!("// Canvas: {name} ({}x{})\n", canvas.width, canvas.height));
        for (idx, key) in canvas.labels.iter().enumerate() {
            let safe_key = safesrc(key).to_uppercase();
            match seen.get(&safe_key) {
                Some(&prev) if prev != idx => log::warn!(
                    "[n64] label key \"{key}\" has different indices across canvases (index {prev} vs {idx}); traits using it may misbehave across scenes"
                ),
                Some(_) => {}
                None => {
                    body.push_str(&format!("#define UI_LABEL_{safe_key} {idx}\n"));
                    seen.insert(safe_key, idx);
                }
            }
        }
        label_count = label_count.max(canvas.labels.len());
        body.push('\n');
    }
    body.push_str(&format!("#define UI_LABEL_COUNT {label_count}\n"));
    guarded("ARM_CANVAS_H", &["\"ui.h\""], &body)
}
