//! Per-frame draw context.
//!
//! The scene flattens itself into a list of [`RenderObject`]s once per
//! frame. The renderer's resource layer consumes this list to rebuild the
//! top level acceleration structure, the instance mapping buffer, and the
//! emitting instance list.

use glam::Mat4;

/// One flattened instance ready for upload.
#[derive(Debug, Clone, Copy)]
pub struct RenderObject {
    /// World transform of the instance.
    pub transform: Mat4,
    /// Geometry id of the mesh, assigned at geometry upload.
    pub geometry_id: u32,
    /// Index of the material block in the material buffer.
    pub material_index: u32,
    /// Emission power of the instance's material.
    pub emission_power: f32,
    /// Triangle count of the mesh, used for light sampling.
    pub primitive_count: u32,
}

/// Flat list of instances for one frame.
#[derive(Debug, Default)]
pub struct DrawContext {
    pub objects: Vec<RenderObject>,
}

impl DrawContext {
    /// Removes all objects, keeping the allocation for the next frame.
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Number of objects with a light-emitting material.
    pub fn emitting_object_count(&self) -> usize {
        self.objects
            .iter()
            .filter(|object| object.emission_power > 0.0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(emission_power: f32) -> RenderObject {
        RenderObject {
            transform: Mat4::IDENTITY,
            geometry_id: 0,
            material_index: 0,
            emission_power,
            primitive_count: 12,
        }
    }

    #[test]
    fn emitting_count_ignores_dark_objects() {
        let mut ctx = DrawContext::default();
        ctx.objects.push(object(0.0));
        ctx.objects.push(object(2.0));
        ctx.objects.push(object(0.0));
        ctx.objects.push(object(1.0));
        assert_eq!(ctx.emitting_object_count(), 2);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut ctx = DrawContext::default();
        ctx.objects.push(object(1.0));
        let capacity = ctx.objects.capacity();
        ctx.clear();
        assert!(ctx.objects.is_empty());
        assert_eq!(ctx.objects.capacity(), capacity);
    }
}
