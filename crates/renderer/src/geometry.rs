//! Shared geometry buffers and bottom level acceleration structures.
//!
//! All meshes of a scene are concatenated into one vertex buffer and one
//! index buffer. Each mesh receives a geometry id equal to its position,
//! and a mapping buffer of [`GeometryOffsets`] records lets the closest
//! hit shader translate a geometry id into buffer offsets.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use raytracer_rhi::accel::{AccelKind, AccelerationStructure, BuildMode};
use raytracer_rhi::buffer::{Buffer, BufferUsage};
use raytracer_rhi::command::CommandManager;
use raytracer_rhi::device::Device;
use raytracer_rhi::RhiResult;
use raytracer_scene::{GeometryOffsets, MeshAsset, Vertex};

/// Element offsets assigned to each mesh plus the concatenated totals.
#[derive(Debug, PartialEq, Eq)]
struct GeometryLayout {
    offsets: Vec<GeometryOffsets>,
    total_vertices: usize,
    total_indices: usize,
}

/// Computes each mesh's position in the shared buffers.
fn compute_layout(meshes: &[MeshAsset]) -> GeometryLayout {
    let mut offsets = Vec::with_capacity(meshes.len());
    let mut vertex_cursor = 0usize;
    let mut index_cursor = 0usize;
    for mesh in meshes {
        offsets.push(GeometryOffsets {
            vertex_offset: vertex_cursor as u32,
            index_offset: index_cursor as u32,
        });
        vertex_cursor += mesh.vertices.len();
        index_cursor += mesh.indices.len();
    }
    GeometryLayout {
        offsets,
        total_vertices: vertex_cursor,
        total_indices: index_cursor,
    }
}

/// Owns the shared geometry buffers and one bottom level acceleration
/// structure per mesh.
///
/// # Thread Safety
///
/// Not thread-safe; uploads happen on the thread that owns the scene
/// resources.
pub struct GeometryBuilder {
    device: Arc<Device>,
    /// Concatenated vertex data for all meshes.
    vertex_buffer: Option<Buffer>,
    /// Concatenated index data for all meshes.
    index_buffer: Option<Buffer>,
    /// One [`GeometryOffsets`] record per geometry id.
    mapping_buffer: Option<Buffer>,
    /// Bottom level structures, indexed by geometry id.
    blases: Vec<AccelerationStructure>,
}

impl GeometryBuilder {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            vertex_buffer: None,
            index_buffer: None,
            mapping_buffer: None,
            blases: Vec::new(),
        }
    }

    /// Uploads all meshes and builds their bottom level structures.
    ///
    /// Assigns each mesh its geometry id and buffer offsets. Any previous
    /// upload is dropped first; callers must ensure the GPU is idle before
    /// replacing a live scene.
    ///
    /// A scene without geometry is a caller bug.
    ///
    /// # Errors
    ///
    /// Returns an error if a buffer upload or acceleration structure
    /// build fails.
    pub fn upload(&mut self, commands: &CommandManager, meshes: &mut [MeshAsset]) -> RhiResult<()> {
        let layout = compute_layout(meshes);
        debug_assert!(layout.total_vertices > 0 && layout.total_indices > 0);

        // Old structures reference the old buffers; drop them first
        self.blases.clear();

        let mut vertices: Vec<Vertex> = Vec::with_capacity(layout.total_vertices);
        let mut indices: Vec<u32> = Vec::with_capacity(layout.total_indices);
        for (id, mesh) in meshes.iter_mut().enumerate() {
            mesh.offsets = layout.offsets[id];
            mesh.geometry_id = id as u32;
            vertices.extend_from_slice(&mesh.vertices);
            indices.extend_from_slice(&mesh.indices);
        }

        let vertex_buffer = Buffer::new_device_local(
            self.device.clone(),
            commands,
            BufferUsage::GeometryInput,
            bytemuck::cast_slice(&vertices),
        )?;
        let index_buffer = Buffer::new_device_local(
            self.device.clone(),
            commands,
            BufferUsage::GeometryInput,
            bytemuck::cast_slice(&indices),
        )?;
        let mapping_buffer = Buffer::new_device_local(
            self.device.clone(),
            commands,
            BufferUsage::Storage,
            bytemuck::cast_slice(&layout.offsets),
        )?;

        let stride = std::mem::size_of::<Vertex>() as vk::DeviceSize;
        for mesh in meshes.iter() {
            let mut blas = AccelerationStructure::new(self.device.clone(), AccelKind::BottomLevel);
            blas.add_triangle_geometry(
                &vertex_buffer,
                &index_buffer,
                mesh.max_vertex(),
                mesh.triangle_count(),
                stride,
                mesh.offsets.vertex_offset,
                mesh.offsets.index_offset,
            )?;
            blas.build(
                commands,
                vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE,
                BuildMode::Build,
            )?;
            debug!(
                "Built bottom level structure for '{}' (geometry {})",
                mesh.name, mesh.geometry_id
            );
            self.blases.push(blas);
        }

        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);
        self.mapping_buffer = Some(mapping_buffer);

        info!(
            "Uploaded geometry: {} meshes, {} vertices, {} indices",
            meshes.len(),
            layout.total_vertices,
            layout.total_indices
        );
        Ok(())
    }

    /// Returns the concatenated vertex buffer, if uploaded.
    pub fn vertex_buffer(&self) -> Option<&Buffer> {
        self.vertex_buffer.as_ref()
    }

    /// Returns the concatenated index buffer, if uploaded.
    pub fn index_buffer(&self) -> Option<&Buffer> {
        self.index_buffer.as_ref()
    }

    /// Returns the geometry mapping buffer, if uploaded.
    pub fn mapping_buffer(&self) -> Option<&Buffer> {
        self.mapping_buffer.as_ref()
    }

    /// Returns the bottom level structure for a geometry id.
    pub fn blas(&self, geometry_id: u32) -> Option<&AccelerationStructure> {
        self.blases.get(geometry_id as usize)
    }

    /// Number of uploaded meshes.
    pub fn mesh_count(&self) -> usize {
        self.blases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn mesh(vertex_count: usize, triangle_count: usize) -> MeshAsset {
        let vertices = (0..vertex_count)
            .map(|i| Vertex::new(Vec3::splat(i as f32), Vec3::Z, [0.0, 0.0]))
            .collect();
        let indices = (0..triangle_count * 3).map(|i| (i % vertex_count) as u32).collect();
        MeshAsset::new("mesh", vertices, indices)
    }

    #[test]
    fn layout_concatenates_in_order() {
        let meshes = vec![mesh(4, 2), mesh(3, 1), mesh(8, 4)];
        let layout = compute_layout(&meshes);
        assert_eq!(
            layout.offsets,
            vec![
                GeometryOffsets { vertex_offset: 0, index_offset: 0 },
                GeometryOffsets { vertex_offset: 4, index_offset: 6 },
                GeometryOffsets { vertex_offset: 7, index_offset: 9 },
            ]
        );
        assert_eq!(layout.total_vertices, 15);
        assert_eq!(layout.total_indices, 21);
    }

    #[test]
    fn layout_of_empty_scene_is_empty() {
        let layout = compute_layout(&[]);
        assert!(layout.offsets.is_empty());
        assert_eq!(layout.total_vertices, 0);
        assert_eq!(layout.total_indices, 0);
    }

    #[test]
    fn three_mesh_layout_matches_expected_ids() {
        // Mirrors a small scene with three meshes sharing the buffers
        let mut meshes = vec![mesh(3, 1), mesh(4, 2), mesh(3, 1)];
        let layout = compute_layout(&meshes);
        for (id, mesh) in meshes.iter_mut().enumerate() {
            mesh.offsets = layout.offsets[id];
            mesh.geometry_id = id as u32;
        }
        assert_eq!(meshes[2].geometry_id, 2);
        assert_eq!(meshes[1].offsets.vertex_offset, 3);
        assert_eq!(meshes[2].offsets.index_offset, 9);
    }
}
