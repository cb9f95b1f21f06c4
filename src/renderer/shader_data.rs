use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Matrices written into the uniform buffer before every frame
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct PerFrameData {
    pub projection: Mat4,
    pub rotation_up: Mat4,
    pub rotation_right: Mat4,
    pub view: Mat4,
}

/// Data unique to each vertex passed as elements into a vertex buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PerVertexData {
    pub position: [f32; 4],
    pub normal: [f32; 4],
    pub texcoord: [f32; 2],
}

/// Surface parameters of one material, laid out for a std430 push constant block
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MaterialProperties {
    pub ambient: [f32; 3],
    pub specular_exponent: f32,
    pub diffuse: [f32; 3],
    pub optical_density: f32,
    pub specular: [f32; 3],
    pub dissolve: f32,
    pub texture_index: u32,
    pub illumination: f32,
    pub shininess: f32,
    pub(crate) _padding: f32,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            ambient: [0.0; 3],
            specular_exponent: 100.0,
            diffuse: [1.0; 3],
            optical_density: 1.0,
            specular: [0.01; 3],
            dissolve: 1.0,
            texture_index: 0,
            illumination: 1.0,
            shininess: 32.0,
            _padding: 0.0,
        }
    }
}

/// Lighting shared by every draw of a frame
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SceneProperties {
    pub light_position: [f32; 3],
    _padding0: f32,
    pub camera_position: [f32; 3],
    _padding1: f32,
    pub ambient_light: [f32; 3],
    _padding2: f32,
    pub light_intensity: [f32; 3],
    _padding3: f32,
}

impl SceneProperties {
    pub fn new(light_position: [f32; 3], camera_position: [f32; 3]) -> Self {
        Self {
            light_position,
            camera_position,
            ..Self::default()
        }
    }
}

impl Default for SceneProperties {
    fn default() -> Self {
        Self {
            light_position: [0.0; 3],
            _padding0: 0.0,
            camera_position: [0.0; 3],
            _padding1: 0.0,
            ambient_light: [0.3; 3],
            _padding2: 0.0,
            light_intensity: [0.8; 3],
            _padding3: 0.0,
        }
    }
}

/// Pushed before each draw call
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct PushConstants {
    pub material: MaterialProperties,
    pub scene: SceneProperties,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layouts_match_shader_blocks() {
        assert_eq!(size_of::<PerFrameData>(), 4 * 64);
        assert_eq!(size_of::<PerVertexData>(), 40);
        assert_eq!(size_of::<MaterialProperties>(), 64);
        assert_eq!(size_of::<SceneProperties>(), 64);
        // Stays within the guaranteed minimum push constant size
        assert_eq!(size_of::<PushConstants>(), 128);

        assert_eq!(offset_of!(MaterialProperties, diffuse), 16);
        assert_eq!(offset_of!(MaterialProperties, texture_index), 48);
        assert_eq!(offset_of!(SceneProperties, ambient_light), 32);
        assert_eq!(offset_of!(PushConstants, scene), 64);
    }

    #[test]
    fn scene_defaults() {
        let scene = SceneProperties::new([1.0, 2.0, 3.0], [0.0, 0.0, 100.0]);
        assert_eq!(scene.ambient_light, [0.3; 3]);
        assert_eq!(scene.light_intensity, [0.8; 3]);
        assert_eq!(scene.light_position, [1.0, 2.0, 3.0]);
    }
}
