use std::path::PathBuf;
use ash::vk;

/// Number of frame slots recorded ahead of the GPU
pub const FRAMES_IN_FLIGHT: usize = 2;

/// One second, used for every fence and image acquisition wait
pub const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Contains configuration options for the renderer like the resolution and other settings
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Size of the offscreen color/depth attachments, blitted to the swapchain every frame
    pub window_extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub fence_timeout_ns: u64,
    /// Directory holding `<shader_name>.vert.spv` and `<shader_name>.frag.spv`
    pub shader_dir: PathBuf,
    pub shader_name: String,
    /// Upper bound for the sampled image array, further clamped by the device limit
    pub max_textures: usize,
    pub enable_validation: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            clear_color: [0.1, 0.1, 0.1, 1.0],
            fence_timeout_ns: FENCE_TIMEOUT_NS,
            shader_dir: PathBuf::from("shaders-built"),
            shader_name: "objview".into(),
            max_textures: 16,
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl RenderConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.window_extent.width as f32 / self.window_extent.height.max(1) as f32
    }
}
