pub mod camera;
pub mod config;
pub mod context;
pub mod core;
pub mod descriptor;
pub mod draw;
pub mod error;
pub mod memory;
pub mod resources;
pub mod shader_data;

pub use context::{FrameStatus, GraphicsContext};
pub use error::{RenderError, RenderResult};
