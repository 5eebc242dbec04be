//! Shader contexts: one render pass of one material.
//!
//! A [`ShaderContext`] owns the stage shaders of a pass together with the
//! descriptor record the external build tool loads (`vertex_elements`,
//! `texture_units`, `constants`, stage file names). Stages are reached
//! through [`StageMut`], which pairs a stage with the shared record so a
//! uniform registration can update both in one call.

use std::ops::{Deref, DerefMut};

use serde::Serialize;

use super::shader::{Shader, Stage};
use super::utils::data_size;

const VERTEX_ELEMENT_ORDER: [&str; 12] = [
    "pos", "nor", "tex", "tex1", "morph", "col", "tang", "bone", "weight", "ipos", "irot", "iscl",
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VertexElement {
    pub name: String,
    pub data: String,
}

impl VertexElement {
    pub fn new(name: &str, data: &str) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct TextureUnit {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_image: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addressing_u: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addressing_v: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_min: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_mag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mipmap_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_image_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_arm_parameter: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct Constant {
    pub name: String,
    #[serde(rename = "type")]
    pub ctype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(rename = "floatValue", skip_serializing_if = "Option::is_none")]
    pub float_value: Option<f32>,
    #[serde(rename = "vec3Value", skip_serializing_if = "Option::is_none")]
    pub vec3_value: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_arm_parameter: Option<bool>,
}

/// Default value attached to a material-parameter uniform.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformDefault {
    Float(f32),
    Vec3([f32; 3]),
    Image(String),
}

/// Optional knobs for [`StageMut::add_uniform_with`].
#[derive(Debug, Clone, Default)]
pub struct UniformOpts<'a> {
    pub link: Option<&'a str>,
    /// Registered with the context but declared by an include.
    pub included: bool,
    /// Declared above the includes.
    pub top: bool,
    pub addressing_u: Option<&'a str>,
    pub addressing_v: Option<&'a str>,
    pub filter_min: Option<&'a str>,
    pub filter_mag: Option<&'a str>,
    pub mipmap_filter: Option<&'a str>,
    pub default_value: Option<UniformDefault>,
    pub is_material_param: bool,
}

impl<'a> UniformOpts<'a> {
    pub fn link(link: &'a str) -> Self {
        Self {
            link: Some(link),
            ..Self::default()
        }
    }
}

/// The serialized descriptor of one context, keys matching the build tool.
#[derive(Debug, Clone, Serialize)]
pub struct ContextRecord {
    pub name: String,
    pub depth_write: bool,
    pub compare_mode: String,
    pub cull_mode: String,
    pub vertex_elements: Vec<VertexElement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blend_operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_blend_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_blend_destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha_blend_operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_writes_red: Option<Vec<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_writes_green: Option<Vec<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_writes_blue: Option<Vec<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_writes_alpha: Option<Vec<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_attachments: Option<Vec<String>>,
    pub texture_units: Vec<TextureUnit>,
    pub constants: Vec<Constant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertex_shader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_shader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry_shader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tesscontrol_shader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tesseval_shader: Option<String>,
}

impl ContextRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            depth_write: true,
            compare_mode: "less".to_string(),
            cull_mode: "clockwise".to_string(),
            vertex_elements: vec![
                VertexElement::new("pos", "short4norm"),
                VertexElement::new("nor", "short2norm"),
            ],
            blend_source: None,
            blend_destination: None,
            blend_operation: None,
            alpha_blend_source: None,
            alpha_blend_destination: None,
            alpha_blend_operation: None,
            color_writes_red: None,
            color_writes_green: None,
            color_writes_blue: None,
            color_writes_alpha: None,
            color_attachments: None,
            texture_units: Vec::new(),
            constants: Vec::new(),
            vertex_shader: None,
            fragment_shader: None,
            geometry_shader: None,
            tesscontrol_shader: None,
            tesseval_shader: None,
        }
    }

    pub fn add_constant(
        &mut self,
        ctype: &str,
        name: &str,
        link: Option<&str>,
        default_value: Option<&UniformDefault>,
        is_material_param: bool,
    ) {
        if self.constants.iter().any(|c| c.name == name) {
            return;
        }
        let mut c = Constant {
            name: name.to_string(),
            ctype: ctype.to_string(),
            link: link.map(str::to_string),
            ..Constant::default()
        };
        match (ctype, default_value) {
            ("float", Some(UniformDefault::Float(v))) => c.float_value = Some(*v),
            ("vec3", Some(UniformDefault::Vec3(v))) => c.vec3_value = Some(*v),
            _ => {}
        }
        if is_material_param {
            c.is_arm_parameter = Some(true);
        }
        self.constants.push(c);
    }

    pub fn add_texture_unit(&mut self, unit: TextureUnit) {
        if self.texture_units.iter().any(|t| t.name == unit.name) {
            return;
        }
        self.texture_units.push(unit);
    }

    /// Adds a vertex element once, keeping the canonical element order.
    /// Names outside that order are dropped.
    pub fn add_elem(&mut self, name: &str, data: &str) {
        let elem = VertexElement::new(name, data);
        if self.vertex_elements.contains(&elem) {
            return;
        }
        self.vertex_elements.push(elem);
        let mut vs = Vec::with_capacity(self.vertex_elements.len());
        for ename in VERTEX_ELEMENT_ORDER {
            if let Some(e) = self.vertex_elements.iter().find(|e| e.name == ename) {
                vs.push(e.clone());
            }
        }
        self.vertex_elements = vs;
    }

    pub fn is_elem(&self, name: &str) -> bool {
        self.vertex_elements.iter().any(|e| e.name == name)
    }

    fn set_stage_file(&mut self, stage: Stage, file: String) {
        let slot = match stage {
            Stage::Vert => &mut self.vertex_shader,
            Stage::Frag => &mut self.fragment_shader,
            Stage::Geom => &mut self.geometry_shader,
            Stage::Tesc => &mut self.tesscontrol_shader,
            Stage::Tese => &mut self.tesseval_shader,
        };
        *slot = Some(file);
    }
}

#[derive(Debug, Clone)]
pub struct ShaderContext {
    matname: String,
    pub data: ContextRecord,
    shaders: [Option<Shader>; 5],
    links: [Option<Stage>; 5],
    pending_ins: Vec<(Stage, String)>,
    resolved: bool,
}

impl ShaderContext {
    pub fn new(matname: &str, data: ContextRecord) -> Self {
        Self {
            matname: matname.to_string(),
            data,
            shaders: Default::default(),
            links: [None; 5],
            pending_ins: Vec::new(),
            resolved: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn matname(&self) -> &str {
        &self.matname
    }

    /// Creates (or resets) a stage and records its file name.
    pub fn make(&mut self, stage: Stage) -> StageMut<'_> {
        let file = format!("{}_{}.{}", self.matname, self.data.name, stage.ext());
        self.data.set_stage_file(stage, file);
        self.shaders[stage.slot()] = Some(Shader::new(stage));
        self.links[stage.slot()] = None;
        self.stage(stage)
    }

    pub fn has(&self, stage: Stage) -> bool {
        self.shaders[stage.slot()].is_some()
    }

    pub fn shader(&self, stage: Stage) -> Option<&Shader> {
        self.shaders[stage.slot()].as_ref()
    }

    /// Mutable access to a stage, created on first use.
    pub fn stage(&mut self, stage: Stage) -> StageMut<'_> {
        if self.shaders[stage.slot()].is_none() {
            let file = format!("{}_{}.{}", self.matname, self.data.name, stage.ext());
            self.data.set_stage_file(stage, file);
        }
        let shader = self.shaders[stage.slot()].get_or_insert_with(|| Shader::new(stage));
        StageMut {
            shader,
            data: &mut self.data,
            link: self.links[stage.slot()],
            pending_ins: &mut self.pending_ins,
        }
    }

    pub fn vert(&mut self) -> StageMut<'_> {
        self.stage(Stage::Vert)
    }

    pub fn frag(&mut self) -> StageMut<'_> {
        self.stage(Stage::Frag)
    }

    /// The tessellation-evaluation stage if present, else the vertex stage.
    pub fn tese_or_vert(&mut self) -> StageMut<'_> {
        if self.has(Stage::Tese) {
            self.stage(Stage::Tese)
        } else {
            self.stage(Stage::Vert)
        }
    }

    /// Makes `consumer`'s inputs an alias of `producer`'s outputs. Outs
    /// added to the producer later are still visible to the consumer.
    pub fn link_stages(&mut self, producer: Stage, consumer: Stage) {
        self.links[consumer.slot()] = Some(producer);
    }

    pub fn linked_producer(&self, consumer: Stage) -> Option<Stage> {
        self.links[consumer.slot()]
    }

    /// Effective in-list of a stage, following stage links.
    pub fn stage_ins(&self, stage: Stage) -> Vec<String> {
        let mut ins = match self.links[stage.slot()] {
            Some(p) => self.shader(p).map(|s| s.outs.clone()).unwrap_or_default(),
            None => self.shader(stage).map(|s| s.ins.clone()).unwrap_or_default(),
        };
        for (s, decl) in &self.pending_ins {
            if *s == stage && !ins.contains(decl) {
                ins.push(decl.clone());
            }
        }
        ins
    }

    pub fn contains(&self, stage: Stage, s: &str) -> bool {
        let Some(sh) = self.shader(stage) else {
            return false;
        };
        sh.contains_local(s) || self.stage_ins(stage).iter().any(|i| i == s)
    }

    pub fn add_elem(&mut self, name: &str, data: &str) {
        self.data.add_elem(name, data);
    }

    pub fn is_elem(&self, name: &str) -> bool {
        self.data.is_elem(name)
    }

    pub fn get_elem(&self, name: &str) -> Option<&VertexElement> {
        self.data.vertex_elements.iter().find(|e| e.name == name)
    }

    pub fn remove_elem(&mut self, name: &str) {
        self.data.vertex_elements.retain(|e| e.name != name);
    }

    /// Materializes stage inputs ahead of emission.
    ///
    /// Vertex inputs come from the vertex elements when none were declared.
    /// Ins queued on linked stages become producer outs, the control stage
    /// grows its `tc_` pass-through outs, and every linked stage copies its
    /// producer's final out-list. Running it twice is a no-op.
    pub fn resolve_stage_io(&mut self) {
        if self.resolved {
            return;
        }
        self.resolved = true;

        let elems: Vec<String> = self
            .data
            .vertex_elements
            .iter()
            .map(|e| format!("vec{} {}", data_size(&e.data), e.name))
            .collect();
        if let Some(vert) = self.shaders[Stage::Vert.slot()].as_mut() {
            if vert.ins.is_empty() && self.links[Stage::Vert.slot()].is_none() {
                for e in &elems {
                    vert.push_in(e);
                }
            }
        }

        for (stage, decl) in std::mem::take(&mut self.pending_ins) {
            match self.links[stage.slot()] {
                Some(p) => {
                    if let Some(prod) = self.shaders[p.slot()].as_mut() {
                        prod.add_out(&decl);
                    }
                }
                None => {
                    if let Some(sh) = self.shaders[stage.slot()].as_mut() {
                        sh.push_in(&decl);
                    }
                }
            }
        }

        for stage in [Stage::Tesc, Stage::Tese, Stage::Geom, Stage::Frag] {
            if let Some(p) = self.links[stage.slot()] {
                let outs = self.shader(p).map(|s| s.outs.clone()).unwrap_or_default();
                if let Some(sh) = self.shaders[stage.slot()].as_mut() {
                    for o in &outs {
                        sh.push_in(o);
                    }
                }
            }
            if stage == Stage::Tesc {
                if let Some(tesc) = self.shaders[Stage::Tesc.slot()].as_mut() {
                    tesc.gen_tesc_passthrough();
                }
            }
        }
    }

    /// Source text of every present stage, in emission order.
    pub fn sources(&mut self) -> Vec<(Stage, String)> {
        self.resolve_stage_io();
        Stage::ALL
            .into_iter()
            .filter_map(|st| self.shader(st).map(|sh| (st, sh.get())))
            .collect()
    }
}

/// A stage of a context plus the context's shared descriptor record.
pub struct StageMut<'a> {
    shader: &'a mut Shader,
    data: &'a mut ContextRecord,
    link: Option<Stage>,
    pending_ins: &'a mut Vec<(Stage, String)>,
}

impl Deref for StageMut<'_> {
    type Target = Shader;

    fn deref(&self) -> &Shader {
        &*self.shader
    }
}

impl DerefMut for StageMut<'_> {
    fn deref_mut(&mut self) -> &mut Shader {
        &mut *self.shader
    }
}

impl StageMut<'_> {
    pub fn add_uniform(&mut self, decl: &str, link: Option<&str>) {
        self.add_uniform_with(
            decl,
            UniformOpts {
                link,
                ..UniformOpts::default()
            },
        );
    }

    /// Registers a uniform with the context and declares it in this stage.
    ///
    /// Sampler and image types become texture units (`name[N]` arrays expand
    /// into one unit per element); everything else becomes a constant, with
    /// `float[]`, `vec4[]` and `mat4[]` arrays packed as `floats`.
    pub fn add_uniform_with(&mut self, decl: &str, opts: UniformOpts<'_>) {
        let parts: Vec<&str> = decl.split(' ').collect();
        if parts.len() < 2 {
            log::warn!("[material] malformed uniform declaration '{decl}'");
            return;
        }
        let utype = parts[parts.len() - 2];
        let uname = parts[parts.len() - 1];

        let is_texture =
            utype.starts_with("sampler") || utype.starts_with("image") || utype.starts_with("uimage");
        if is_texture {
            let is_image = (utype.starts_with("image") || utype.starts_with("uimage")).then_some(true);
            let unit = |name: String| TextureUnit {
                name,
                link: opts.link.map(str::to_string),
                is_image,
                addressing_u: opts.addressing_u.map(str::to_string),
                addressing_v: opts.addressing_v.map(str::to_string),
                filter_min: opts.filter_min.map(str::to_string),
                filter_mag: opts.filter_mag.map(str::to_string),
                mipmap_filter: opts.mipmap_filter.map(str::to_string),
                ..TextureUnit::default()
            };
            if let Some((base, count)) = array_suffix(uname) {
                for i in 0..count {
                    self.data.add_texture_unit(unit(format!("{base}[{i}]")));
                }
            } else {
                let mut u = unit(uname.to_string());
                if let Some(UniformDefault::Image(file)) = &opts.default_value {
                    u.default_image_file = Some(file.clone());
                }
                if opts.is_material_param {
                    u.is_arm_parameter = Some(true);
                }
                self.data.add_texture_unit(u);
            }
        } else {
            let (mut ctype, mut cname) = (parts[0], parts[1]);
            if matches!(ctype, "float" | "vec4" | "mat4") && cname.contains('[') {
                ctype = "floats";
                cname = cname.split('[').next().unwrap_or(cname);
            }
            self.data.add_constant(
                ctype,
                cname,
                opts.link,
                opts.default_value.as_ref(),
                opts.is_material_param,
            );
        }

        if !opts.included {
            self.shader.declare_uniform(decl, opts.top);
        }
    }

    /// Adds an input varying. On a linked stage it becomes an out of the
    /// producer, like assigning to an aliased list.
    pub fn add_in(&mut self, s: &str) {
        match self.link {
            Some(_) => {
                let stage = self.shader.stage();
                if !self.pending_ins.iter().any(|(st, d)| *st == stage && d == s) {
                    self.pending_ins.push((stage, s.to_string()));
                }
            }
            None => self.shader.push_in(s),
        }
    }

    /// Substring search over the body sections plus exact in-list match,
    /// including ins queued through a stage link.
    pub fn contains(&self, s: &str) -> bool {
        let stage = self.shader.stage();
        self.shader.contains_local(s) || self.pending_ins.iter().any(|(st, d)| *st == stage && d == s)
    }

    pub fn add_elem(&mut self, name: &str, data: &str) {
        self.data.add_elem(name, data);
    }

    pub fn is_elem(&self, name: &str) -> bool {
        self.data.is_elem(name)
    }
}

fn array_suffix(uname: &str) -> Option<(&str, usize)> {
    let inner = uname.strip_suffix(']')?;
    let (base, count) = inner.split_once('[')?;
    Some((base, count.parse().ok()?))
}
