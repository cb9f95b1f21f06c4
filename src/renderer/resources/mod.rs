/// "Resources" refers to middle-level objects that are created by "Core" objects.
/// They own a single GPU object each and are managed by the context.

pub mod buffer;
pub mod image;
pub mod material;
pub mod mesh;
pub mod pipeline;
pub mod shader;
pub mod texture;
pub mod transition;
pub mod vertex;
