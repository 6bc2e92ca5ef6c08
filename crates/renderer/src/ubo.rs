//! Scene uniform buffer layout.
//!
//! One [`SceneUniform`] is uploaded per frame in flight. The layout must
//! match the GLSL scene uniform block exactly, so every field is
//! explicitly padded to std140 rules.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use raytracer_scene::{Camera, DirectionalLight, PointLight};

/// Per-frame uniform data read by all ray tracing stages.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: inverse view matrix (64 bytes)
/// - Offset 192: inverse projection matrix (64 bytes)
/// - Offset 256: directional light direction, `w` is intensity (16 bytes)
/// - Offset 272: directional light color (16 bytes)
/// - Offset 288: point light position, `w` is intensity (16 bytes)
/// - Offset 304: point light color (16 bytes)
/// - Offset 320: emitting instance count, frame counters (16 bytes)
/// - Total size: 336 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct SceneUniform {
    /// View matrix (world to view space).
    pub view: Mat4,
    /// Projection matrix (view to clip space).
    pub projection: Mat4,
    /// Inverse view matrix, used for primary ray origins.
    pub view_inverse: Mat4,
    /// Inverse projection matrix, used for primary ray directions.
    pub projection_inverse: Mat4,
    /// Directional light travel direction, `w` carries the intensity.
    pub sun_direction: Vec4,
    /// Directional light color, `w` unused.
    pub sun_color: Vec4,
    /// Point light position, `w` carries the intensity.
    pub point_light_position: Vec4,
    /// Point light color, `w` unused.
    pub point_light_color: Vec4,
    /// Number of entries in the emitting instance buffer.
    pub emitting_instance_count: u32,
    /// Frames accumulated into the render target since the last reset.
    pub accumulated_frames: u32,
    /// Samples traced per pixel each frame.
    pub samples_per_frame: u32,
    pub _pad: u32,
}

impl SceneUniform {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Builds the uniform from the camera, lights, and frame counters.
    ///
    /// Missing lights are encoded with zero intensity so shaders can skip
    /// them without a separate flag.
    pub fn new(
        camera: &Camera,
        aspect_ratio: f32,
        directional: Option<&DirectionalLight>,
        point: Option<&PointLight>,
        emitting_instance_count: u32,
        accumulated_frames: u32,
        samples_per_frame: u32,
    ) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix(aspect_ratio);

        let (sun_direction, sun_color) = match directional {
            Some(light) => (
                light.direction.extend(light.intensity),
                light.color.extend(0.0),
            ),
            None => (Vec4::ZERO, Vec4::ZERO),
        };
        let (point_light_position, point_light_color) = match point {
            Some(light) => (
                light.position.extend(light.intensity),
                light.color.extend(0.0),
            ),
            None => (Vec4::ZERO, Vec4::ZERO),
        };

        Self {
            view,
            projection,
            view_inverse: view.inverse(),
            projection_inverse: projection.inverse(),
            sun_direction,
            sun_color,
            point_light_position,
            point_light_color,
            emitting_instance_count,
            accumulated_frames,
            samples_per_frame,
            _pad: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn scene_uniform_size() {
        // 4 Mat4 (256) + 4 Vec4 (64) + 4 u32 (16) = 336 bytes
        assert_eq!(SceneUniform::SIZE, 336);
    }

    #[test]
    fn scene_uniform_alignment() {
        assert_eq!(std::mem::align_of::<SceneUniform>(), 16);
    }

    #[test]
    fn missing_lights_have_zero_intensity() {
        let camera = Camera::default();
        let ubo = SceneUniform::new(&camera, 1.0, None, None, 0, 0, 1);
        assert_eq!(ubo.sun_direction.w, 0.0);
        assert_eq!(ubo.point_light_position.w, 0.0);
    }

    #[test]
    fn lights_pack_intensity_into_w() {
        let camera = Camera::default();
        let sun = DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE, 2.0);
        let lamp = PointLight::new(Vec3::new(1.0, 2.0, 3.0), Vec3::X, 7.0);
        let ubo = SceneUniform::new(&camera, 1.0, Some(&sun), Some(&lamp), 3, 10, 4);
        assert_eq!(ubo.sun_direction.w, 2.0);
        assert_eq!(ubo.point_light_position.w, 7.0);
        assert_eq!(ubo.point_light_position.truncate(), lamp.position);
        assert_eq!(ubo.emitting_instance_count, 3);
        assert_eq!(ubo.accumulated_frames, 10);
        assert_eq!(ubo.samples_per_frame, 4);
    }

    #[test]
    fn inverse_matrices_match() {
        let camera = Camera::default();
        let ubo = SceneUniform::new(&camera, 16.0 / 9.0, None, None, 0, 0, 1);
        let product = ubo.view * ubo.view_inverse;
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn uniform_is_pod() {
        let ubo = SceneUniform::default();
        let bytes: &[u8] = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), SceneUniform::SIZE);
    }
}
