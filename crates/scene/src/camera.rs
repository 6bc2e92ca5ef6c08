//! Camera state and ray-generation matrices.
//!
//! The ray generation shader reconstructs primary rays from the inverse
//! view and inverse projection matrices, so both forward and inverse forms
//! are exposed here.

use glam::{Mat4, Vec3};

/// Perspective camera.
#[derive(Debug, Clone)]
pub struct Camera {
    /// World-space position.
    pub position: Vec3,
    /// Look-at target.
    pub target: Vec3,
    /// Up direction.
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Near clip distance.
    pub near: f32,
    /// Far clip distance.
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_degrees: 60.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Returns the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Returns the projection matrix for the given aspect ratio.
    ///
    /// Vulkan clip space has an inverted Y axis relative to OpenGL, so the
    /// Y scale is flipped here.
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            aspect_ratio,
            self.near,
            self.far,
        );
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Returns the inverse view matrix used for primary ray origins.
    pub fn inverse_view_matrix(&self) -> Mat4 {
        self.view_matrix().inverse()
    }

    /// Returns the inverse projection matrix used for primary ray directions.
    pub fn inverse_projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        self.projection_matrix(aspect_ratio).inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn view_matrix_places_camera_at_origin() {
        let camera = Camera {
            position: Vec3::new(0.0, 0.0, 5.0),
            ..Default::default()
        };
        let eye = camera.view_matrix().transform_point3(camera.position);
        assert!(eye.abs_diff_eq(Vec3::ZERO, 1e-5));
    }

    #[test]
    fn inverse_view_recovers_position() {
        let camera = Camera {
            position: Vec3::new(3.0, 1.0, -2.0),
            ..Default::default()
        };
        let origin = camera
            .inverse_view_matrix()
            .transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(camera.position, 1e-4));
    }

    #[test]
    fn projection_flips_y() {
        let camera = Camera::default();
        let proj = camera.projection_matrix(16.0 / 9.0);
        assert!(proj.y_axis.y < 0.0);
    }

    #[test]
    fn inverse_projection_is_inverse() {
        let camera = Camera::default();
        let aspect = 1.5;
        let product = camera.projection_matrix(aspect) * camera.inverse_projection_matrix(aspect);
        let identity = Mat4::IDENTITY;
        for col in 0..4 {
            let a: Vec4 = product.col(col);
            let b: Vec4 = identity.col(col);
            assert!(a.abs_diff_eq(b, 1e-4));
        }
    }
}
