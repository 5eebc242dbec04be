//! Descriptor documents handed to the external build tool.

use serde::Serialize;

use super::context::ContextRecord;

/// `<matname>_data`: every context compiled for one material.
#[derive(Debug, Clone, Serialize)]
pub struct ShaderData {
    pub shader_datas: Vec<ShaderDataEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShaderDataEntry {
    pub name: String,
    pub contexts: Vec<ContextRecord>,
}

impl ShaderData {
    pub fn new(matname: &str) -> Self {
        Self {
            shader_datas: vec![ShaderDataEntry {
                name: format!("{matname}_data"),
                contexts: Vec::new(),
            }],
        }
    }

    pub fn name(&self) -> &str {
        self.shader_datas.first().map(|e| e.name.as_str()).unwrap_or("")
    }

    pub fn add_context(&mut self, record: ContextRecord) {
        if let Some(entry) = self.shader_datas.first_mut() {
            if !entry.contexts.iter().any(|c| c.name == record.name) {
                entry.contexts.push(record);
            }
        }
    }

    pub fn contexts(&self) -> &[ContextRecord] {
        self.shader_datas.first().map(|e| e.contexts.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct BindConstant {
    pub name: String,
    #[serde(rename = "boolValue", skip_serializing_if = "Option::is_none")]
    pub bool_value: Option<bool>,
    #[serde(rename = "intValue", skip_serializing_if = "Option::is_none")]
    pub int_value: Option<i32>,
    #[serde(rename = "floatValue", skip_serializing_if = "Option::is_none")]
    pub float_value: Option<f32>,
    #[serde(rename = "vec3Value", skip_serializing_if = "Option::is_none")]
    pub vec3_value: Option<[f32; 3]>,
}

impl BindConstant {
    pub fn bool(name: &str, v: bool) -> Self {
        Self {
            name: name.to_string(),
            bool_value: Some(v),
            ..Self::default()
        }
    }

    pub fn int(name: &str, v: i32) -> Self {
        Self {
            name: name.to_string(),
            int_value: Some(v),
            ..Self::default()
        }
    }
}

/// Texture referenced by a material context.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct BindTexture {
    pub name: String,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mag_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mipmap_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_mipmaps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub u_addressing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v_addressing: Option<String>,
    /// `movie` for video sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialContext {
    pub name: String,
    pub bind_constants: Vec<BindConstant>,
    pub bind_textures: Vec<BindTexture>,
    pub depth_read: bool,
}

/// `<matname>.material.json`: per-pass bindings plus the shader data reference.
#[derive(Debug, Clone, Serialize)]
pub struct MaterialData {
    pub name: String,
    pub shader: String,
    pub contexts: Vec<MaterialContext>,
}

impl MaterialData {
    pub fn new(name: &str, shader_data_name: &str) -> Self {
        Self {
            name: name.to_string(),
            shader: format!("{shader_data_name}.json/{shader_data_name}"),
            contexts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_data_nests_contexts_under_data_name() {
        let mut sd = ShaderData::new("Mat");
        sd.add_context(ContextRecord::new("mesh"));
        sd.add_context(ContextRecord::new("mesh"));
        let v = serde_json::to_value(&sd).unwrap();
        assert_eq!(v["shader_datas"][0]["name"], "Mat_data");
        assert_eq!(v["shader_datas"][0]["contexts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn material_data_references_shader_data() {
        let mut md = MaterialData::new("Mat", "Mat_data");
        md.contexts.push(MaterialContext {
            name: "mesh".into(),
            bind_constants: vec![BindConstant::bool("receiveShadow", true)],
            bind_textures: Vec::new(),
            depth_read: false,
        });
        let v = serde_json::to_value(&md).unwrap();
        assert_eq!(v["shader"], "Mat_data.json/Mat_data");
        assert_eq!(v["contexts"][0]["bind_constants"][0]["boolValue"], true);
        assert!(v["contexts"][0]["bind_constants"][0].get("intValue").is_none());
    }
}
