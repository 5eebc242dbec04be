//! Shading backend: material node graphs to GLSL stages plus the descriptor
//! documents the external build tool loads.

pub mod context;
pub mod functions;
pub mod parser;
pub mod render_path;
pub mod shader;
pub mod shader_data;
pub mod types;
pub mod utils;
pub mod validation;
pub mod writer;
