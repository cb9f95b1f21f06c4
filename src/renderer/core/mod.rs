/// "Core" refers to the objects that own Vulkan state for the renderer's whole lifetime.
/// They create and drive the "Resources" objects.

pub mod device;
pub mod frame;
pub mod instance;
pub mod queue;
pub mod render_pass;
pub mod target;
pub mod transfer;
