// Arcball rotation control

use glam::{Quat, Vec3};

/// Maps mouse drags to object rotations.
///
/// Screen coordinates are projected onto a virtual unit sphere covering
/// the viewport. Dragging from the press point to the current point
/// rotates along the great circle between the two projected vectors;
/// points outside the sphere fall back to a rotation around the view
/// axis.
#[derive(Debug, Clone, Copy)]
pub struct Arcball {
    viewport: (u32, u32),
    start_vector: Vec3,
    start_rotation: Quat,
}

impl Arcball {
    pub fn new() -> Self {
        Self {
            viewport: (1, 1),
            start_vector: Vec3::Z,
            start_rotation: Quat::IDENTITY,
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
    }

    /// Starts a drag at the given screen position, using `rotation` as
    /// the base the drag is applied on top of.
    pub fn press(&mut self, x: f64, y: f64, rotation: Quat) {
        self.start_vector = self.project_on_sphere(x, y);
        self.start_rotation = rotation;
    }

    /// Returns the rotation for the current drag position.
    pub fn drag(&mut self, x: f64, y: f64) -> Quat {
        let end_vector = self.project_on_sphere(x, y);

        let axis = self.start_vector.cross(end_vector);
        // Both vectors are unit length, so the dot product is the
        // cosine of the angle between them directly.
        let angle = self
            .start_vector
            .dot(end_vector)
            .clamp(-1.0, 1.0)
            .acos();

        let rotation = if axis.length() > f32::EPSILON {
            Quat::from_axis_angle(axis.normalize(), angle)
        } else {
            // Too short to derive an axis from; no extra rotation.
            Quat::IDENTITY
        };

        (rotation * self.start_rotation).normalize()
    }

    /// Projects screen coordinates onto the unit sphere. Positions
    /// outside the sphere are projected onto the unit circle in the XY
    /// plane instead, giving a rotation around the view axis.
    fn project_on_sphere(&self, x: f64, y: f64) -> Vec3 {
        let fx = (x as f32 / self.viewport.0 as f32) * 2.0 - 1.0;
        // Screen Y runs downwards, scene Y upwards.
        let fy = -((y as f32 / self.viewport.1 as f32) * 2.0 - 1.0);

        let length_sq = fx * fx + fy * fy;
        if length_sq > 1.0 {
            let norm = 1.0 / length_sq.sqrt();
            Vec3::new(fx * norm, fy * norm, 0.0)
        } else {
            // Hit point on the hemisphere facing the viewer.
            Vec3::new(fx, fy, (1.0 - length_sq).sqrt())
        }
    }
}

impl Default for Arcball {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_is_unit_length() {
        let mut arcball = Arcball::new();
        arcball.set_viewport(800, 600);

        for (x, y) in [(400.0, 300.0), (0.0, 0.0), (800.0, 600.0), (799.0, 1.0)] {
            let v = arcball.project_on_sphere(x, y);
            assert!((v.length() - 1.0).abs() < 1e-5, "({}, {}) -> {:?}", x, y, v);
        }
    }

    #[test]
    fn test_center_projects_to_view_axis() {
        let mut arcball = Arcball::new();
        arcball.set_viewport(800, 600);
        let v = arcball.project_on_sphere(400.0, 300.0);
        assert!((v - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_drag_without_motion_keeps_rotation() {
        let mut arcball = Arcball::new();
        arcball.set_viewport(800, 600);

        let base = Quat::from_rotation_y(0.5);
        arcball.press(200.0, 200.0, base);
        let rotation = arcball.drag(200.0, 200.0);
        assert!(rotation.angle_between(base) < 1e-4);
    }

    #[test]
    fn test_horizontal_drag_rotates_about_y() {
        let mut arcball = Arcball::new();
        arcball.set_viewport(800, 600);

        arcball.press(300.0, 300.0, Quat::IDENTITY);
        let rotation = arcball.drag(500.0, 300.0);

        let (axis, angle) = rotation.to_axis_angle();
        assert!(angle > 0.0);
        assert!(axis.y.abs() > 0.99, "axis {:?}", axis);
    }
}
