// Object transform and camera

use glam::{Mat3, Mat4, Quat, Vec3};

/// Position, rotation and uniform scale of a scene object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }
}

impl Transform {
    /// Model matrix: translate, then rotate, then scale.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            self.rotation,
            self.position,
        )
    }
}

/// Perspective camera. The view matrix is the inverse of the camera's
/// own transform.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    transform: Transform,
    fov_y_degrees: f32,
    aspect: f32,
    z_near: f32,
    z_far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            transform: Transform::default(),
            fov_y_degrees: 90.0,
            aspect: 1.0,
            z_near: 1.0,
            z_far: 100.0,
        }
    }
}

impl Camera {
    pub fn set_fov(&mut self, fov_y_degrees: f32) {
        assert!(fov_y_degrees > 0.0);
        self.fov_y_degrees = fov_y_degrees;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        assert!(aspect > 0.0);
        self.aspect = aspect;
    }

    pub fn set_z_range(&mut self, z_near: f32, z_far: f32) {
        assert!(z_near > 0.0 && z_near < z_far);
        self.z_near = z_near;
        self.z_far = z_far;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.z_near,
            self.z_far,
        )
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.transform.matrix().inverse()
    }
}

/// Normal matrix for lighting: the rotation part of the modelview.
/// Valid because scaling is uniform.
pub fn normal_matrix(modelview: Mat4) -> Mat3 {
    Mat3::from_mat4(modelview)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform_matrix() {
        let t = Transform::default();
        assert_eq!(t.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_transform_applies_scale_after_rotation() {
        let t = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::IDENTITY,
            scale: 2.0,
        };
        let p = t.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(3.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn test_view_matrix_inverts_camera_position() {
        let mut camera = Camera::default();
        camera.set_position(Vec3::new(0.0, 0.0, 5.0));

        // A point at the camera position maps to the view-space origin.
        let p = camera
            .view_matrix()
            .transform_point3(Vec3::new(0.0, 0.0, 5.0));
        assert!(p.length() < 1e-6);
    }
}
