//! Perspective camera.

use glam::{EulerRot, Mat4, Quat, Vec3};

/// A perspective camera. Orientation is yaw around world Y followed by
/// pitch around the camera's X axis; roll is never introduced.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Radians, positive turns left.
    pub yaw: f32,
    /// Radians, positive looks up.
    pub pitch: f32,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            yaw: 0.0,
            pitch: 0.0,
            fov_y: 45.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the aspect ratio; ignored for degenerate sizes.
    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation() * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation() * Vec3::Y
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    /// Y-up projection with depth in `[0, 1]`. The frame's viewport does
    /// the flip to Vulkan's Y-down framebuffer.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Maps clip-space positions to world-space view directions, ignoring
    /// translation. Used to draw the environment behind everything.
    pub fn inverse_view_rotation_projection(&self) -> Mat4 {
        let view_rotation = Mat4::from_quat(self.rotation().inverse());
        (self.projection_matrix() * view_rotation).inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = Camera::new();
        assert!(approx_eq_vec3(camera.forward(), Vec3::NEG_Z));
        assert!(approx_eq_vec3(camera.right(), Vec3::X));
        assert!(approx_eq_vec3(camera.up(), Vec3::Y));
    }

    #[test]
    fn test_positive_yaw_turns_left() {
        let camera = Camera {
            yaw: std::f32::consts::FRAC_PI_2,
            ..Camera::default()
        };
        assert!(
            approx_eq_vec3(camera.forward(), Vec3::NEG_X),
            "got {:?}",
            camera.forward()
        );
    }

    #[test]
    fn test_view_matrix_moves_position_to_origin() {
        let camera = Camera {
            position: Vec3::new(1.0, 2.0, 3.0),
            yaw: 0.7,
            pitch: -0.3,
            ..Camera::default()
        };
        let origin = camera.view_matrix().transform_point3(camera.position);
        assert!(approx_eq_vec3(origin, Vec3::ZERO));
    }

    #[test]
    fn test_projection_is_y_up() {
        let camera = Camera::new();
        let above = camera
            .view_projection_matrix()
            .project_point3(camera.position + camera.forward() * 10.0 + Vec3::Y);
        assert!(above.y > 0.0);
        assert!(above.z > 0.0 && above.z < 1.0);
    }

    #[test]
    fn test_inverse_rotation_projection_center_is_forward() {
        let camera = Camera {
            position: Vec3::new(10.0, -4.0, 2.0),
            yaw: 1.1,
            pitch: 0.4,
            ..Camera::default()
        };
        let far = camera
            .inverse_view_rotation_projection()
            .project_point3(Vec3::new(0.0, 0.0, 1.0));
        assert!(
            approx_eq_vec3(far.normalize(), camera.forward()),
            "got {:?}, expected {:?}",
            far.normalize(),
            camera.forward()
        );
    }

    #[test]
    fn test_set_aspect_rejects_degenerate() {
        let mut camera = Camera::new();
        camera.set_aspect(0.0);
        camera.set_aspect(f32::NAN);
        assert_eq!(camera.aspect, 16.0 / 9.0);
        camera.set_aspect(2.0);
        assert_eq!(camera.aspect, 2.0);
    }
}
