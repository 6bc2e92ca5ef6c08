//! Instance mapping and emitting instance buffers.
//!
//! The top level acceleration structure stores only a custom index per
//! instance. Two side buffers carry the rest: a mapping buffer that
//! resolves an instance to its geometry id and material index, and an
//! emitting instance list used for light sampling.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use tracing::{debug, info};

use raytracer_rhi::buffer::{Buffer, BufferUsage};
use raytracer_rhi::command::CommandManager;
use raytracer_rhi::device::Device;
use raytracer_rhi::RhiResult;
use raytracer_scene::RenderObject;

/// Per-instance record resolving the TLAS custom index.
///
/// Indexed by `gl_InstanceCustomIndexEXT` in the hit shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct InstanceMappingData {
    /// Geometry id of the instance's mesh.
    pub geometry_id: u32,
    /// Index of the instance's material block.
    pub material_index: u32,
}

/// One entry of the emitting instance list.
///
/// Light sampling picks a random entry, then a random primitive within
/// it, so the transform and triangle count travel with the instance id.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct EmittingInstanceData {
    /// World transform of the emitting instance.
    pub model_matrix: Mat4,
    /// TLAS custom index of the instance.
    pub instance_id: u32,
    /// Triangle count of the instance's mesh.
    pub primitive_count: u32,
    pub _pad: [u32; 2],
}

/// Builds the mapping records for every object, in TLAS instance order.
///
/// An empty object list is a caller bug.
fn pack_instance_mappings(objects: &[RenderObject]) -> Vec<InstanceMappingData> {
    debug_assert!(!objects.is_empty());
    objects
        .iter()
        .map(|object| InstanceMappingData {
            geometry_id: object.geometry_id,
            material_index: object.material_index,
        })
        .collect()
}

/// Builds the emitting instance list.
///
/// Shaders index this buffer unconditionally, so a scene with no
/// emitters still gets one entry: the last object stands in with its
/// zero emission power, which light sampling weights to nothing.
/// An empty object list is a caller bug.
fn pack_emitting_instances(objects: &[RenderObject]) -> Vec<EmittingInstanceData> {
    debug_assert!(!objects.is_empty());
    let mut entries = Vec::new();
    for (instance_id, object) in objects.iter().enumerate() {
        let is_last = instance_id + 1 == objects.len();
        if object.emission_power > 0.0 || (is_last && entries.is_empty()) {
            entries.push(EmittingInstanceData {
                model_matrix: object.transform,
                instance_id: instance_id as u32,
                primitive_count: object.primitive_count,
                _pad: [0; 2],
            });
        }
    }
    entries
}

/// Owns the instance mapping and emitting instance buffers.
pub struct InstanceBuilder {
    device: Arc<Device>,
    /// One [`InstanceMappingData`] per TLAS instance.
    mapping_buffer: Option<Buffer>,
    /// Emitting instance list, never empty once uploaded.
    emitting_buffer: Option<Buffer>,
    /// Number of genuinely emitting entries, excluding the fallback.
    emitting_count: u32,
}

impl InstanceBuilder {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            mapping_buffer: None,
            emitting_buffer: None,
            emitting_count: 0,
        }
    }

    /// Rebuilds the instance mapping buffer from the frame's objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub fn upload_mappings(
        &mut self,
        commands: &CommandManager,
        objects: &[RenderObject],
    ) -> RhiResult<()> {
        let records = pack_instance_mappings(objects);
        self.mapping_buffer = Some(Buffer::new_device_local(
            self.device.clone(),
            commands,
            BufferUsage::Storage,
            bytemuck::cast_slice(&records),
        )?);
        debug!("Uploaded {} instance mappings", records.len());
        Ok(())
    }

    /// Rebuilds the emitting instance buffer from the frame's objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub fn upload_emitting(
        &mut self,
        commands: &CommandManager,
        objects: &[RenderObject],
    ) -> RhiResult<()> {
        let entries = pack_emitting_instances(objects);
        self.emitting_count = objects
            .iter()
            .filter(|object| object.emission_power > 0.0)
            .count() as u32;
        self.emitting_buffer = Some(Buffer::new_device_local(
            self.device.clone(),
            commands,
            BufferUsage::Storage,
            bytemuck::cast_slice(&entries),
        )?);
        info!(
            "Uploaded emitting instances: {} entries ({} emitting)",
            entries.len(),
            self.emitting_count
        );
        Ok(())
    }

    /// Returns the instance mapping buffer, if uploaded.
    pub fn mapping_buffer(&self) -> Option<&Buffer> {
        self.mapping_buffer.as_ref()
    }

    /// Returns the emitting instance buffer, if uploaded.
    pub fn emitting_buffer(&self) -> Option<&Buffer> {
        self.emitting_buffer.as_ref()
    }

    /// Number of genuinely emitting instances, excluding the fallback
    /// entry uploaded for dark scenes.
    pub fn emitting_count(&self) -> u32 {
        self.emitting_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(geometry_id: u32, material_index: u32, emission_power: f32) -> RenderObject {
        RenderObject {
            transform: Mat4::from_translation(glam::Vec3::splat(geometry_id as f32)),
            geometry_id,
            material_index,
            emission_power,
            primitive_count: 6,
        }
    }

    #[test]
    fn mapping_preserves_instance_order() {
        let objects = vec![object(2, 1, 0.0), object(0, 0, 0.0), object(1, 1, 0.0)];
        let records = pack_instance_mappings(&objects);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], InstanceMappingData { geometry_id: 2, material_index: 1 });
        assert_eq!(records[2], InstanceMappingData { geometry_id: 1, material_index: 1 });
    }

    #[test]
    fn emitting_list_keeps_only_emitters() {
        let objects = vec![
            object(0, 0, 0.0),
            object(1, 1, 5.0),
            object(2, 0, 0.0),
            object(3, 1, 2.0),
        ];
        let entries = pack_emitting_instances(&objects);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].instance_id, 1);
        assert_eq!(entries[1].instance_id, 3);
        assert_eq!(entries[0].primitive_count, 6);
    }

    #[test]
    fn dark_scene_gets_fallback_entry() {
        let objects = vec![object(0, 0, 0.0), object(1, 0, 0.0)];
        let entries = pack_emitting_instances(&objects);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].instance_id, 1);
    }

    #[test]
    fn fallback_is_skipped_when_an_emitter_exists() {
        let objects = vec![object(0, 0, 3.0), object(1, 0, 0.0)];
        let entries = pack_emitting_instances(&objects);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].instance_id, 0);
    }

    #[test]
    #[should_panic]
    fn mapping_rejects_empty_input() {
        let _ = pack_instance_mappings(&[]);
    }

    #[test]
    #[should_panic]
    fn emitting_rejects_empty_input() {
        let _ = pack_emitting_instances(&[]);
    }

    #[test]
    fn record_layouts_match_shader_expectations() {
        assert_eq!(std::mem::size_of::<InstanceMappingData>(), 8);
        assert_eq!(std::mem::size_of::<EmittingInstanceData>(), 80);
    }
}
