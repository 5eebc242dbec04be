//! Per-stage shader assembly.
//!
//! A [`Shader`] accumulates declarations and body text for one pipeline stage.
//! Every registration is idempotent: adding the same include, varying,
//! function or uniform twice leaves a single declaration behind. Body text is
//! kept in separate sections that are concatenated in a fixed order when the
//! stage is emitted.

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Vert,
    Frag,
    Geom,
    Tesc,
    Tese,
}

impl Stage {
    /// Order in which stage files are emitted.
    pub const ALL: [Stage; 5] = [Stage::Vert, Stage::Frag, Stage::Geom, Stage::Tesc, Stage::Tese];

    pub fn ext(self) -> &'static str {
        match self {
            Stage::Vert => "vert",
            Stage::Frag => "frag",
            Stage::Geom => "geom",
            Stage::Tesc => "tesc",
            Stage::Tese => "tese",
        }
    }

    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

/// A uniform registered twice under one name with different declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformConflict {
    pub name: String,
    pub kept: String,
    pub rejected: String,
}

#[derive(Debug, Clone)]
pub struct Shader {
    stage: Stage,
    pub(crate) includes: Vec<String>,
    pub(crate) ins: Vec<String>,
    pub(crate) outs: Vec<String>,
    uniforms_top: Vec<String>,
    uniforms: Vec<String>,
    uniform_decls: IndexMap<String, String>,
    conflicts: Vec<UniformConflict>,
    constants: Vec<String>,
    functions: IndexMap<String, String>,
    main: String,
    main_init: String,
    main_normal: String,
    main_textures: String,
    main_attribs: String,
    header: String,
    /// Route plain writes to the init section.
    pub write_pre: bool,
    /// While > 0, plain writes land in the normal section.
    pub write_normal: u32,
    /// While > 0, plain writes land in the texture section.
    pub write_textures: u32,
    pub tab: usize,
    pub lock: bool,
}

impl Shader {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            includes: Vec::new(),
            ins: Vec::new(),
            outs: Vec::new(),
            uniforms_top: Vec::new(),
            uniforms: Vec::new(),
            uniform_decls: IndexMap::new(),
            conflicts: Vec::new(),
            constants: Vec::new(),
            functions: IndexMap::new(),
            main: String::new(),
            main_init: String::new(),
            main_normal: String::new(),
            main_textures: String::new(),
            main_attribs: String::new(),
            header: String::new(),
            write_pre: false,
            write_normal: 0,
            write_textures: 0,
            tab: 1,
            lock: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn has_include(&self, s: &str) -> bool {
        self.includes.iter().any(|i| i == s)
    }

    pub fn add_include(&mut self, s: &str) {
        if !self.has_include(s) {
            self.includes.push(s.to_string());
        }
    }

    /// Inserts an include at the front, keeping `compiled.inc` first.
    pub fn add_include_front(&mut self, s: &str) {
        if self.has_include(s) {
            return;
        }
        let pos = usize::from(self.includes.first().is_some_and(|i| i == "compiled.inc"));
        self.includes.insert(pos, s.to_string());
    }

    pub fn add_out(&mut self, s: &str) {
        if !self.outs.iter().any(|o| o == s) {
            self.outs.push(s.to_string());
        }
    }

    pub(crate) fn push_in(&mut self, s: &str) {
        if !self.ins.iter().any(|i| i == s) {
            self.ins.push(s.to_string());
        }
    }

    pub fn outs(&self) -> &[String] {
        &self.outs
    }

    pub fn ins(&self) -> &[String] {
        &self.ins
    }

    pub fn uniforms(&self) -> &[String] {
        &self.uniforms
    }

    pub fn uniforms_top(&self) -> &[String] {
        &self.uniforms_top
    }

    pub fn uniform_conflicts(&self) -> &[UniformConflict] {
        &self.conflicts
    }

    /// Records a uniform declaration in this stage's declaration list.
    ///
    /// Identical redeclarations are no-ops. A divergent redeclaration under
    /// an already registered name keeps the first one and is recorded as a
    /// conflict. Returns whether the declaration is (now) present.
    pub(crate) fn declare_uniform(&mut self, decl: &str, top: bool) -> bool {
        let name = uniform_name(decl).to_string();
        match self.uniform_decls.get(&name) {
            Some(existing) if existing == decl => return true,
            Some(existing) => {
                log::warn!(
                    "[material] {} stage: uniform '{name}' redeclared as '{decl}', keeping '{existing}'",
                    self.stage.ext()
                );
                self.conflicts.push(UniformConflict {
                    name,
                    kept: existing.clone(),
                    rejected: decl.to_string(),
                });
                return false;
            }
            None => {}
        }
        self.uniform_decls.insert(name, decl.to_string());
        if top {
            self.uniforms_top.push(decl.to_string());
        } else {
            self.uniforms.push(decl.to_string());
        }
        true
    }

    /// Adds a global constant; `array_size > 0` declares an array.
    pub fn add_const(&mut self, ty: &str, name: &str, value: &str, array_size: usize) {
        let c = if array_size == 0 {
            format!("{ty} {name} = {value}")
        } else {
            format!("{ty} {name}[{array_size}] = {ty}[]({value})")
        };
        if !self.constants.contains(&c) {
            self.constants.push(c);
        }
    }

    /// Registers a helper function once, keyed by everything before its `(`.
    pub fn add_function(&mut self, s: &str) {
        let key = s.split('(').next().unwrap_or(s).to_string();
        self.functions.entry(key).or_insert_with(|| s.to_string());
    }

    /// Substring search over the body sections, plus exact match against
    /// this stage's own in-list.
    pub fn contains_local(&self, s: &str) -> bool {
        self.main.contains(s)
            || self.main_init.contains(s)
            || self.main_normal.contains(s)
            || self.ins.iter().any(|i| i == s)
            || self.main_textures.contains(s)
            || self.main_attribs.contains(s)
    }

    pub fn replace(&mut self, old: &str, new: &str) {
        self.main = self.main.replace(old, new);
        self.main_init = self.main_init.replace(old, new);
        self.main_normal = self.main_normal.replace(old, new);
        self.main_textures = self.main_textures.replace(old, new);
        self.main_attribs = self.main_attribs.replace(old, new);
        for u in &mut self.uniforms {
            *u = u.replace(old, new);
        }
        self.uniform_decls = self
            .uniform_decls
            .drain(..)
            .map(|(name, decl)| (name, decl.replace(old, new)))
            .collect();
    }

    /// Prepends a line to the init section unless it already occurs.
    pub fn write_init(&mut self, s: &str) {
        if self.contains_local(s) {
            return;
        }
        self.main_init = format!("\t{s}\n{}", self.main_init);
    }

    pub fn write(&mut self, s: &str) {
        if self.lock {
            return;
        }
        if self.write_textures > 0 {
            push_line(&mut self.main_textures, 1, s);
        } else if self.write_normal > 0 {
            push_line(&mut self.main_normal, 1, s);
        } else if self.write_pre {
            push_line(&mut self.main_init, 1, s);
        } else {
            push_line(&mut self.main, self.tab, s);
        }
    }

    pub fn write_attrib(&mut self, s: &str) {
        push_line(&mut self.main_attribs, 1, s);
    }

    pub fn write_header(&mut self, s: &str) {
        self.header.push_str(s);
        self.header.push('\n');
    }

    /// Full source text. Stage io must already be resolved by the owning
    /// context (vertex inputs, tessellation pass-through outs).
    pub fn get(&self) -> String {
        let mut s = String::from("#version 450\n");
        s.push_str(&self.header);

        let (in_ext, out_ext) = match self.stage {
            Stage::Tesc => {
                s.push_str("layout(vertices = 3) out;\n");
                ("[]", "[]")
            }
            Stage::Tese => {
                s.push_str("layout(triangles, equal_spacing, ccw) in;\n");
                ("[]", "")
            }
            Stage::Geom => {
                s.push_str("layout(triangles) in;\n");
                s.push_str("layout(triangle_strip) out;\n");
                s.push_str("layout(max_vertices=3) out;\n");
                ("[]", "")
            }
            Stage::Vert | Stage::Frag => ("", ""),
        };

        for u in &self.uniforms_top {
            s.push_str(&format!("uniform {u};\n"));
        }
        for i in &self.includes {
            s.push_str(&format!("#include \"{i}\"\n"));
        }
        for i in &self.ins {
            s.push_str(&format!("in {i}{in_ext};\n"));
        }
        for o in &self.outs {
            s.push_str(&format!("out {o}{out_ext};\n"));
        }
        for u in &self.uniforms {
            s.push_str(&format!("uniform {u};\n"));
        }
        for c in &self.constants {
            s.push_str(&format!("const {c};\n"));
        }
        for f in self.functions.values() {
            s.push_str(f);
            s.push('\n');
        }
        s.push_str("void main() {\n");
        s.push_str(&self.main_attribs);
        s.push_str(&self.main_textures);
        s.push_str(&self.main_normal);
        s.push_str(&self.main_init);
        s.push_str(&self.main);
        s.push_str("}\n");
        s
    }

    /// Generates `tc_` pass-through outs for every in of a control stage.
    pub(crate) fn gen_tesc_passthrough(&mut self) {
        let ins = self.ins.clone();
        for sin in ins {
            let Some((ty, name)) = sin.rsplit_once(' ') else {
                continue;
            };
            let tc = format!("tc_{name}");
            self.add_out(&format!("{ty} {tc}"));
            self.write(&format!("{tc}[gl_InvocationID] = {name}[gl_InvocationID];"));
        }
    }
}

/// Identifier of a uniform declaration: the word before any array bracket,
/// so `vec4 lightsArray[maxLights * 3]` is `lightsArray`.
pub(crate) fn uniform_name(decl: &str) -> &str {
    let head = decl.split('[').next().unwrap_or(decl).trim_end();
    head.rsplit(' ').next().unwrap_or(head)
}

fn push_line(buf: &mut String, tabs: usize, s: &str) {
    for _ in 0..tabs {
        buf.push('\t');
    }
    buf.push_str(s);
    buf.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_routes_by_section_flags() {
        let mut sh = Shader::new(Stage::Frag);
        sh.write("a;");
        sh.write_textures += 1;
        sh.write("t;");
        sh.write_textures -= 1;
        sh.write_normal += 1;
        sh.write("n;");
        sh.write_normal -= 1;
        sh.write_pre = true;
        sh.write("i;");
        sh.write_pre = false;
        sh.write_attrib("at;");
        let text = sh.get();
        let body = text.split("void main() {\n").nth(1).unwrap();
        assert_eq!(body, "\tat;\n\tt;\n\tn;\n\ti;\n\ta;\n}\n");
    }

    #[test]
    fn locked_shader_ignores_writes() {
        let mut sh = Shader::new(Stage::Vert);
        sh.lock = true;
        sh.write("x = 1.0;");
        assert!(!sh.contains_local("x = 1.0;"));
    }

    #[test]
    fn write_init_prepends_once() {
        let mut sh = Shader::new(Stage::Frag);
        sh.write_init("float b = 1.0;");
        sh.write_init("float a = 0.0;");
        sh.write_init("float b = 1.0;");
        assert!(sh.get().contains("\tfloat a = 0.0;\n\tfloat b = 1.0;\n"));
    }

    #[test]
    fn functions_and_includes_are_registered_once() {
        let mut sh = Shader::new(Stage::Frag);
        sh.add_function("float f(float x) { return x; }");
        sh.add_function("float f(float x) { return 2.0 * x; }");
        sh.add_include("std/math.glsl");
        sh.add_include("compiled.inc");
        sh.add_include("std/math.glsl");
        sh.add_include_front("std/clusters.glsl");
        let text = sh.get();
        assert_eq!(text.matches("float f(").count(), 1);
        assert!(text.contains("return x;"));
        assert_eq!(sh.includes, vec!["std/clusters.glsl", "std/math.glsl", "compiled.inc"]);
    }

    #[test]
    fn include_front_keeps_compiled_inc_on_top() {
        let mut sh = Shader::new(Stage::Frag);
        sh.add_include("compiled.inc");
        sh.add_include_front("std/clusters.glsl");
        assert_eq!(sh.includes, vec!["compiled.inc", "std/clusters.glsl"]);
    }

    #[test]
    fn divergent_uniform_is_reported_not_dropped_silently() {
        let mut sh = Shader::new(Stage::Frag);
        assert!(sh.declare_uniform("vec3 eye", false));
        assert!(sh.declare_uniform("vec3 eye", false));
        assert!(!sh.declare_uniform("vec4 eye", false));
        assert_eq!(sh.uniforms(), ["vec3 eye"]);
        assert_eq!(sh.uniform_conflicts().len(), 1);
        assert_eq!(sh.uniform_conflicts()[0].rejected, "vec4 eye");
    }

    #[test]
    fn array_uniforms_are_keyed_by_identifier() {
        assert_eq!(uniform_name("vec4 lightsArray[maxLights * 3]"), "lightsArray");
        assert_eq!(uniform_name("layout(RGBA8) image3D voxels"), "voxels");
        let mut sh = Shader::new(Stage::Frag);
        assert!(sh.declare_uniform("vec4 lightsArray[maxLights * 3]", false));
        assert!(sh.declare_uniform("vec4 casData[shadowmapCascades * 4 + 3]", false));
        assert!(sh.uniform_conflicts().is_empty());
    }

    #[test]
    fn tessellation_control_layout() {
        let mut sh = Shader::new(Stage::Tesc);
        sh.push_in("vec3 wnormal");
        sh.gen_tesc_passthrough();
        let text = sh.get();
        assert!(text.contains("layout(vertices = 3) out;\n"));
        assert!(text.contains("in vec3 wnormal[];\n"));
        assert!(text.contains("out vec3 tc_wnormal[];\n"));
        assert!(text.contains("tc_wnormal[gl_InvocationID] = wnormal[gl_InvocationID];"));
    }

    #[test]
    fn array_constants() {
        let mut sh = Shader::new(Stage::Frag);
        sh.add_const("vec3", "ramp_cols", "vec3(0.0), vec3(1.0)", 2);
        sh.add_const("float", "v_res", "0.5", 0);
        let text = sh.get();
        assert!(text.contains("const vec3 ramp_cols[2] = vec3[](vec3(0.0), vec3(1.0));\n"));
        assert!(text.contains("const float v_res = 0.5;\n"));
    }
}
