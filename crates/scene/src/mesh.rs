//! Mesh assets.
//!
//! Every mesh in a scene is concatenated into one shared vertex buffer and
//! one shared index buffer. Shaders address a mesh through its
//! [`GeometryOffsets`] record, looked up by the geometry id written into
//! each acceleration structure instance.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Interleaved vertex layout shared by all meshes.
///
/// UV coordinates are split around the position and normal so the struct
/// packs into 32 bytes without padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv_x: f32,
    pub normal: Vec3,
    pub uv_y: f32,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position,
            uv_x: uv[0],
            normal,
            uv_y: uv[1],
        }
    }
}

/// Location of a mesh inside the shared geometry buffers.
///
/// Offsets are element counts, not bytes. The layout matches the geometry
/// mapping SSBO read by the closest hit shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GeometryOffsets {
    /// First vertex of the mesh in the shared vertex buffer.
    pub vertex_offset: u32,
    /// First index of the mesh in the shared index buffer.
    pub index_offset: u32,
}

/// A triangle mesh owned by the scene.
#[derive(Debug, Clone)]
pub struct MeshAsset {
    /// Debug name.
    pub name: String,
    /// Vertex data.
    pub vertices: Vec<Vertex>,
    /// Triangle indices into `vertices`.
    pub indices: Vec<u32>,
    /// Position inside the shared geometry buffers, assigned on upload.
    pub offsets: GeometryOffsets,
    /// Identifier used by acceleration structure instances, assigned on
    /// upload.
    pub geometry_id: u32,
}

impl MeshAsset {
    pub fn new(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            indices,
            offsets: GeometryOffsets::default(),
            geometry_id: 0,
        }
    }

    /// Number of triangles in the mesh.
    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    /// Highest addressable vertex index.
    pub fn max_vertex(&self) -> u32 {
        self.vertices.len().saturating_sub(1) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> MeshAsset {
        let vertices = vec![
            Vertex::new(Vec3::new(-1.0, -1.0, 0.0), Vec3::Z, [0.0, 0.0]),
            Vertex::new(Vec3::new(1.0, -1.0, 0.0), Vec3::Z, [1.0, 0.0]),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec3::Z, [1.0, 1.0]),
            Vertex::new(Vec3::new(-1.0, 1.0, 0.0), Vec3::Z, [0.0, 1.0]),
        ];
        MeshAsset::new("quad", vertices, vec![0, 1, 2, 2, 3, 0])
    }

    #[test]
    fn vertex_is_32_bytes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn geometry_offsets_are_8_bytes() {
        assert_eq!(std::mem::size_of::<GeometryOffsets>(), 8);
    }

    #[test]
    fn triangle_count_and_max_vertex() {
        let mesh = quad();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.max_vertex(), 3);
    }

    #[test]
    fn empty_mesh_has_zero_max_vertex() {
        let mesh = MeshAsset::new("empty", Vec::new(), Vec::new());
        assert_eq!(mesh.max_vertex(), 0);
        assert_eq!(mesh.triangle_count(), 0);
    }
}
