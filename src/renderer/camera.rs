use glam::{Mat4, Vec3};
use crate::renderer::shader_data::{PerFrameData, SceneProperties};

/// Fixed viewpoint looking down -Z at the origin
pub struct Camera {
    position: Vec3,
    front: Vec3,
    up: Vec3,
    right: Vec3,
    fov_y_deg: f32,
    near: f32,
    far: f32,
}

impl Camera {
    const DEFAULT_DISTANCE: f32 = 100.0;
    const DEFAULT_FOV_Y_DEG: f32 = 55.0;

    pub fn new() -> Self {
        let mut camera = Self {
            position: Vec3::new(0.0, 0.0, Self::DEFAULT_DISTANCE),
            front: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            near: 0.1,
            far: 2000.0,
        };
        camera.look_at(Vec3::ZERO);
        camera
    }

    /// Re-derives the camera basis so it faces `target`. Does nothing if `target` is the
    /// camera position.
    pub fn look_at(&mut self, target: Vec3) {
        if target == self.position {
            return;
        }
        let direction = (self.position - target).normalize();
        self.right = self.up.cross(direction).normalize();
        self.up = direction.cross(self.right);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    /// Reversed-Z perspective: the near plane maps to depth 1 and the far plane to 0.
    /// Y is flipped to match Vulkan's downward clip space.
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        let mut projection = Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            aspect_ratio,
            self.far,
            self.near,
        );
        projection.y_axis.y = -projection.y_axis.y;
        projection
    }

    pub fn frame_data(&self, aspect_ratio: f32, rotation: &ModelRotation) -> PerFrameData {
        PerFrameData {
            projection: self.projection_matrix(aspect_ratio),
            rotation_up: Mat4::from_axis_angle(self.up, rotation.up_deg.to_radians()),
            rotation_right: Mat4::from_axis_angle(self.right, rotation.right_deg.to_radians()),
            view: self.view_matrix(),
        }
    }

    /// The light sits at the eye
    pub fn scene_properties(&self) -> SceneProperties {
        SceneProperties::new(self.position.to_array(), self.position.to_array())
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

/// Model spin in degrees around the camera's up and right axes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelRotation {
    pub up_deg: f32,
    pub right_deg: f32,
}

impl ModelRotation {
    pub const STEP_DEG: f32 = -0.5;

    pub fn advance(&mut self) {
        self.up_deg = (self.up_deg + Self::STEP_DEG).rem_euclid(360.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn ndc_depth(projection: Mat4, view_z: f32) -> f32 {
        let clip = projection * Vec4::new(0.0, 0.0, view_z, 1.0);
        clip.z / clip.w
    }

    #[test]
    fn default_basis() {
        let camera = Camera::new();
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 100.0));
        assert!(camera.right.abs_diff_eq(Vec3::X, 1e-6));
        assert!(camera.up.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn depth_is_reversed() {
        let projection = Camera::new().projection_matrix(4.0 / 3.0);
        assert!((ndc_depth(projection, -0.1) - 1.0).abs() < 1e-4);
        assert!(ndc_depth(projection, -2000.0).abs() < 1e-4);
        assert!(ndc_depth(projection, -10.0) > ndc_depth(projection, -100.0));
    }

    #[test]
    fn y_is_flipped() {
        let projection = Camera::new().projection_matrix(1.0);
        let clip = projection * Vec4::new(0.0, 1.0, -10.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn view_moves_origin_in_front_of_camera() {
        let view = Camera::new().view_matrix();
        let origin = view.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 0.0, -100.0), 1e-4));
    }

    #[test]
    fn rotation_wraps() {
        let mut rotation = ModelRotation::default();
        rotation.advance();
        assert_eq!(rotation.up_deg, 359.5);
        for _ in 0..719 {
            rotation.advance();
        }
        assert!(rotation.up_deg.abs() < 1e-3);
        assert_eq!(rotation.right_deg, 0.0);
    }
}
