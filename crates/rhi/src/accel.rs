//! Acceleration structure build and refit.
//!
//! This module implements bottom-level (per-mesh triangle) and top-level
//! (per-scene instance set) acceleration structures.
//!
//! # Overview
//!
//! - [`GeometrySet`] is the device-free core: an ordered list of geometry
//!   entries with per-entry dirty bits plus a pending instance list
//! - [`AccelerationStructure`] wraps a `GeometrySet` with the Vulkan handle,
//!   the backing buffer, and the build submission
//!
//! Bottom-level structures are built once per mesh and are immutable
//! afterwards. Top-level structures are rebuilt or refit whenever the
//! instance set changes; [`BuildMode::Update`] consumes only entries marked
//! dirty since the last build.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use glam::Mat4;
//! use raytracer_rhi::accel::{AccelKind, AccelerationStructure, BuildMode};
//! use raytracer_rhi::command::CommandManager;
//! use raytracer_rhi::device::Device;
//! use raytracer_rhi::vk;
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     commands: &CommandManager,
//! #     blas: &AccelerationStructure,
//! # ) -> Result<(), raytracer_rhi::RhiError> {
//! let mut tlas = AccelerationStructure::new(device, AccelKind::TopLevel);
//! tlas.add_instance(blas, Mat4::IDENTITY, 0);
//! tlas.add_instance_geometry()?;
//! tlas.build(
//!     commands,
//!     vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE,
//!     BuildMode::Build,
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::{debug, info};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandManager;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Kind of acceleration structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccelKind {
    /// Geometry-only structure over one mesh's triangles.
    BottomLevel,
    /// Structure over a set of instances referencing bottom-level
    /// structures by device address.
    TopLevel,
}

impl AccelKind {
    /// Converts to the Vulkan acceleration structure type.
    pub fn to_vk_type(self) -> vk::AccelerationStructureTypeKHR {
        match self {
            AccelKind::BottomLevel => vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            AccelKind::TopLevel => vk::AccelerationStructureTypeKHR::TOP_LEVEL,
        }
    }

    /// Returns a human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            AccelKind::BottomLevel => "bottom-level",
            AccelKind::TopLevel => "top-level",
        }
    }
}

/// Build mode passed to [`AccelerationStructure::build`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildMode {
    /// Fresh size query and full construction.
    Build,
    /// Refit consuming only entries marked dirty since the last build.
    Update,
}

impl BuildMode {
    /// Converts to the Vulkan build mode.
    pub fn to_vk_mode(self) -> vk::BuildAccelerationStructureModeKHR {
        match self {
            BuildMode::Build => vk::BuildAccelerationStructureModeKHR::BUILD,
            BuildMode::Update => vk::BuildAccelerationStructureModeKHR::UPDATE,
        }
    }
}

/// Triangle geometry descriptor for a bottom-level entry.
///
/// Addresses are pre-offset into the shared vertex/index concatenations.
#[derive(Clone, Copy, Debug)]
pub struct TriangleGeometryDesc {
    /// Device address of the first vertex of this mesh.
    pub vertex_address: vk::DeviceAddress,
    /// Device address of the first index of this mesh.
    pub index_address: vk::DeviceAddress,
    /// Highest vertex index referenced by this mesh.
    pub max_vertex: u32,
    /// Vertex stride in bytes.
    pub vertex_stride: vk::DeviceSize,
}

/// Payload of one geometry entry.
#[derive(Clone, Copy, Debug)]
pub enum GeometryData {
    /// Bottom-level triangle data.
    Triangles(TriangleGeometryDesc),
    /// Top-level instance data read from a packed instance buffer.
    Instances {
        /// Device address of the packed instance record buffer.
        buffer_address: vk::DeviceAddress,
    },
}

/// One entry in a structure's ordered geometry list.
#[derive(Clone, Copy, Debug)]
pub struct GeometryEntry {
    /// Geometry descriptor.
    pub data: GeometryData,
    /// Number of primitives (triangles or instances).
    pub primitive_count: u32,
    /// Set when the entry's data changed since the last build that
    /// consumed it.
    pub dirty: bool,
}

/// Device-free geometry bookkeeping for one acceleration structure.
///
/// Holds the ordered geometry entries and, for top-level structures, the
/// pending instance list that is promoted into an entry on
/// [`promote_instances`](Self::promote_instances).
pub struct GeometrySet {
    kind: AccelKind,
    entries: Vec<GeometryEntry>,
    pending_instances: Vec<vk::AccelerationStructureInstanceKHR>,
}

impl GeometrySet {
    /// Creates an empty geometry set.
    pub fn new(kind: AccelKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            pending_instances: Vec::new(),
        }
    }

    /// Returns the structure kind.
    #[inline]
    pub fn kind(&self) -> AccelKind {
        self.kind
    }

    /// Returns the geometry entries.
    #[inline]
    pub fn entries(&self) -> &[GeometryEntry] {
        &self.entries
    }

    /// Returns the number of pending instance records.
    #[inline]
    pub fn pending_instance_count(&self) -> usize {
        self.pending_instances.len()
    }

    /// Returns the pending instance records.
    #[inline]
    pub fn pending_instances(&self) -> &[vk::AccelerationStructureInstanceKHR] {
        &self.pending_instances
    }

    /// Stages a triangle geometry entry. Bottom-level only.
    pub fn add_triangle_geometry(&mut self, desc: TriangleGeometryDesc, triangle_count: u32) {
        debug_assert_eq!(self.kind, AccelKind::BottomLevel);
        self.entries.push(GeometryEntry {
            data: GeometryData::Triangles(desc),
            primitive_count: triangle_count,
            dirty: true,
        });
    }

    /// Appends one instance record to the pending list. Top-level only.
    pub fn add_instance(
        &mut self,
        blas_address: vk::DeviceAddress,
        transform: Mat4,
        instance_id: u32,
    ) {
        debug_assert_eq!(self.kind, AccelKind::TopLevel);
        self.pending_instances.push(vk::AccelerationStructureInstanceKHR {
            transform: transform_to_vk(transform),
            instance_custom_index_and_mask: vk::Packed24_8::new(instance_id, 0xFF),
            instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(0, 0),
            acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
                device_handle: blas_address,
            },
        });
    }

    /// Promotes the pending instance list into a new geometry entry and
    /// clears the list. Returns the new entry's index.
    ///
    /// `buffer_address` is the device address of the packed instance buffer
    /// the caller has uploaded the pending records to.
    pub fn promote_instances(&mut self, buffer_address: vk::DeviceAddress) -> usize {
        debug_assert_eq!(self.kind, AccelKind::TopLevel);
        debug_assert!(!self.pending_instances.is_empty());

        self.entries.push(GeometryEntry {
            data: GeometryData::Instances { buffer_address },
            primitive_count: self.pending_instances.len() as u32,
            dirty: true,
        });
        self.pending_instances.clear();
        self.entries.len() - 1
    }

    /// Replaces entry `index`'s instance data in place and marks it dirty,
    /// leaving other entries untouched. Clears the pending list.
    pub fn update_instances(&mut self, index: usize, buffer_address: vk::DeviceAddress) {
        debug_assert_eq!(self.kind, AccelKind::TopLevel);
        debug_assert!(index < self.entries.len());

        self.entries[index] = GeometryEntry {
            data: GeometryData::Instances { buffer_address },
            primitive_count: self.pending_instances.len() as u32,
            dirty: true,
        };
        self.pending_instances.clear();
    }

    /// Returns the entries a build in `mode` must consume.
    ///
    /// Build mode consumes every entry; update mode consumes only dirty
    /// entries.
    pub fn entries_for_build(&self, mode: BuildMode) -> Vec<GeometryEntry> {
        self.entries
            .iter()
            .filter(|entry| mode == BuildMode::Build || entry.dirty)
            .copied()
            .collect()
    }

    /// Clears every dirty bit. Called once a build has consumed the data.
    pub fn clear_dirty(&mut self) {
        for entry in &mut self.entries {
            entry.dirty = false;
        }
    }
}

/// Converts a column-major matrix to the row-major 3x4 Vulkan transform.
pub fn transform_to_vk(mat: Mat4) -> vk::TransformMatrixKHR {
    let cols = mat.to_cols_array_2d();
    let mut matrix = [0.0f32; 12];
    for row in 0..3 {
        for col in 0..4 {
            matrix[row * 4 + col] = cols[col][row];
        }
    }
    vk::TransformMatrixKHR { matrix }
}

/// Returns whether the backing allocation must be replaced for a build
/// requiring `required` bytes.
fn needs_realloc(current: Option<vk::DeviceSize>, required: vk::DeviceSize) -> bool {
    current != Some(required)
}

/// Acceleration structure with backing storage and build submission.
///
/// The backing buffer is reallocated only when the size reported by the
/// build-size query differs from the previous allocation, so repeated
/// refits of an unchanged instance set keep the same buffer and device
/// address.
///
/// # Thread Safety
///
/// Not thread-safe. Builds are recorded and synchronously awaited; there is
/// never more than one outstanding build.
pub struct AccelerationStructure {
    device: Arc<Device>,
    geometry: GeometrySet,
    handle: vk::AccelerationStructureKHR,
    backing: Option<Buffer>,
    instance_buffer: Option<Buffer>,
    device_address: vk::DeviceAddress,
}

impl AccelerationStructure {
    /// Creates an unbuilt structure.
    pub fn new(device: Arc<Device>, kind: AccelKind) -> Self {
        Self {
            device,
            geometry: GeometrySet::new(kind),
            handle: vk::AccelerationStructureKHR::null(),
            backing: None,
            instance_buffer: None,
            device_address: 0,
        }
    }

    /// Returns the structure kind.
    #[inline]
    pub fn kind(&self) -> AccelKind {
        self.geometry.kind()
    }

    /// Returns the Vulkan handle, null until the first build.
    #[inline]
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.handle
    }

    /// Returns the device address, 0 until the first build.
    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_address
    }

    /// Returns whether the structure has been built at least once.
    #[inline]
    pub fn is_built(&self) -> bool {
        self.handle != vk::AccelerationStructureKHR::null()
    }

    /// Returns the device-free geometry bookkeeping.
    #[inline]
    pub fn geometry(&self) -> &GeometrySet {
        &self.geometry
    }

    /// Stages a triangle-geometry descriptor. Bottom-level only.
    ///
    /// `vertex_offset` and `index_offset` are element offsets into the
    /// shared concatenated vertex/index buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if either buffer lacks a device address.
    pub fn add_triangle_geometry(
        &mut self,
        vertex_buffer: &Buffer,
        index_buffer: &Buffer,
        max_vertex: u32,
        triangle_count: u32,
        vertex_stride: vk::DeviceSize,
        vertex_offset: u32,
        index_offset: u32,
    ) -> RhiResult<()> {
        let desc = TriangleGeometryDesc {
            vertex_address: vertex_buffer.device_address()?
                + vertex_offset as vk::DeviceSize * vertex_stride,
            index_address: index_buffer.device_address()?
                + index_offset as vk::DeviceSize * std::mem::size_of::<u32>() as vk::DeviceSize,
            max_vertex,
            vertex_stride,
        };
        self.geometry.add_triangle_geometry(desc, triangle_count);
        Ok(())
    }

    /// Appends one instance referencing a built bottom-level structure to
    /// the pending list. Top-level only.
    pub fn add_instance(&mut self, child: &AccelerationStructure, transform: Mat4, instance_id: u32) {
        debug_assert!(child.is_built());
        self.geometry
            .add_instance(child.device_address(), transform, instance_id);
    }

    /// First-time promotion of the pending instance list into a geometry
    /// entry plus device upload. Clears the pending list.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance buffer upload fails.
    pub fn add_instance_geometry(&mut self) -> RhiResult<()> {
        let address = self.fill_instance_buffer()?;
        self.geometry.promote_instances(address);
        Ok(())
    }

    /// Replaces geometry entry `index`'s instance data in place and marks
    /// it dirty. Clears the pending list.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance buffer upload fails.
    pub fn update_instance_geometry(&mut self, index: usize) -> RhiResult<()> {
        let address = self.fill_instance_buffer()?;
        self.geometry.update_instances(index, address);
        Ok(())
    }

    /// Uploads the pending instance records, reallocating the instance
    /// buffer only when the required size changed. Returns its address.
    fn fill_instance_buffer(&mut self) -> RhiResult<vk::DeviceAddress> {
        let records = self.geometry.pending_instances();
        debug_assert!(!records.is_empty());

        let required = std::mem::size_of_val(records) as vk::DeviceSize;

        let reuse = self
            .instance_buffer
            .as_ref()
            .is_some_and(|buffer| buffer.size() == required);
        if !reuse {
            self.instance_buffer = Some(Buffer::new(
                self.device.clone(),
                BufferUsage::InstanceInput,
                required,
            )?);
        }

        let buffer = self.instance_buffer.as_ref().unwrap();
        let bytes = unsafe {
            std::slice::from_raw_parts(records.as_ptr() as *const u8, required as usize)
        };
        buffer.write_data(0, bytes)?;
        buffer.device_address()
    }

    /// Builds or refits the structure.
    ///
    /// Build mode performs a fresh size query, reallocates the backing
    /// buffer only if the reported size differs from the previous
    /// allocation, and constructs the structure. Update mode refits using
    /// only entries marked dirty since the last build and clears their
    /// dirty bits afterwards.
    ///
    /// The build command is recorded, submitted, and awaited before this
    /// function returns.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::AccelerationStructureBuild`] if the size query,
    /// structure creation, or build submission fails.
    pub fn build(
        &mut self,
        commands: &CommandManager,
        flags: vk::BuildAccelerationStructureFlagsKHR,
        mode: BuildMode,
    ) -> RhiResult<()> {
        debug_assert!(!self.geometry.entries().is_empty());
        if mode == BuildMode::Update {
            debug_assert!(self.is_built());
        }

        let entries = self.geometry.entries_for_build(mode);
        if entries.is_empty() {
            return Ok(());
        }

        let geometries: Vec<vk::AccelerationStructureGeometryKHR> =
            entries.iter().map(|entry| entry_to_vk(entry)).collect();
        let range_infos: Vec<vk::AccelerationStructureBuildRangeInfoKHR> = entries
            .iter()
            .map(|entry| {
                vk::AccelerationStructureBuildRangeInfoKHR::default()
                    .primitive_count(entry.primitive_count)
            })
            .collect();
        let primitive_counts: Vec<u32> =
            entries.iter().map(|entry| entry.primitive_count).collect();

        let mut build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(self.kind().to_vk_type())
            .flags(flags)
            .mode(mode.to_vk_mode())
            .geometries(&geometries);
        if mode == BuildMode::Update {
            build_info.src_acceleration_structure = self.handle;
            build_info.dst_acceleration_structure = self.handle;
        }

        let mut size_info = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            self.device.accel_loader().get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_info,
                &primitive_counts,
                &mut size_info,
            );
        }
        if size_info.acceleration_structure_size == 0 {
            return Err(RhiError::AccelerationStructureBuild(
                "size query reported a zero-sized structure".to_string(),
            ));
        }

        // The backing allocation and handle survive as long as the reported
        // size is unchanged, which keeps the device address stable across
        // refits.
        if needs_realloc(
            self.backing.as_ref().map(|buffer| buffer.size()),
            size_info.acceleration_structure_size,
        ) {
            if self.is_built() {
                unsafe {
                    self.device
                        .accel_loader()
                        .destroy_acceleration_structure(self.handle, None);
                }
                self.handle = vk::AccelerationStructureKHR::null();
            }

            self.backing = Some(Buffer::new(
                self.device.clone(),
                BufferUsage::AccelerationStructure,
                size_info.acceleration_structure_size,
            )?);

            let create_info = vk::AccelerationStructureCreateInfoKHR::default()
                .buffer(self.backing.as_ref().unwrap().handle())
                .size(size_info.acceleration_structure_size)
                .ty(self.kind().to_vk_type());

            self.handle = unsafe {
                self.device
                    .accel_loader()
                    .create_acceleration_structure(&create_info, None)
                    .map_err(|e| {
                        RhiError::AccelerationStructureBuild(format!(
                            "failed to create {} structure: {:?}",
                            self.kind().name(),
                            e
                        ))
                    })?
            };

            debug!(
                "Allocated {} structure backing: {} bytes",
                self.kind().name(),
                size_info.acceleration_structure_size
            );
        }

        let scratch = Buffer::new(
            self.device.clone(),
            BufferUsage::Scratch,
            size_info.build_scratch_size.max(size_info.update_scratch_size),
        )?;

        build_info.dst_acceleration_structure = self.handle;
        build_info.scratch_data = vk::DeviceOrHostAddressKHR {
            device_address: scratch.device_address()?,
        };

        let cmd = commands.begin_single_time()?;
        unsafe {
            self.device.accel_loader().cmd_build_acceleration_structures(
                cmd,
                std::slice::from_ref(&build_info),
                &[&range_infos],
            );
        }
        commands.end_single_time(cmd).map_err(|e| {
            RhiError::AccelerationStructureBuild(format!("build submission failed: {}", e))
        })?;

        let address_info =
            vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(self.handle);
        self.device_address = unsafe {
            self.device
                .accel_loader()
                .get_acceleration_structure_device_address(&address_info)
        };

        self.geometry.clear_dirty();

        info!(
            "Built {} structure ({:?} mode, {} geometry entr{})",
            self.kind().name(),
            mode,
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" }
        );

        Ok(())
    }

    /// Releases the backing buffer, instance buffer, and handle.
    ///
    /// A no-op if the structure was never built. Idempotent.
    pub fn destroy(&mut self) {
        self.backing = None;
        self.instance_buffer = None;

        if self.is_built() {
            unsafe {
                self.device
                    .accel_loader()
                    .destroy_acceleration_structure(self.handle, None);
            }
            self.handle = vk::AccelerationStructureKHR::null();
            self.device_address = 0;
            debug!("Destroyed {} structure", self.kind().name());
        }
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Converts a geometry entry to the Vulkan geometry description.
fn entry_to_vk(entry: &GeometryEntry) -> vk::AccelerationStructureGeometryKHR<'static> {
    match entry.data {
        GeometryData::Triangles(desc) => vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                triangles: vk::AccelerationStructureGeometryTrianglesDataKHR::default()
                    .vertex_format(vk::Format::R32G32B32_SFLOAT)
                    .vertex_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: desc.vertex_address,
                    })
                    .max_vertex(desc.max_vertex)
                    .vertex_stride(desc.vertex_stride)
                    .index_type(vk::IndexType::UINT32)
                    .index_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: desc.index_address,
                    }),
            }),
        GeometryData::Instances { buffer_address } => {
            vk::AccelerationStructureGeometryKHR::default()
                .geometry_type(vk::GeometryTypeKHR::INSTANCES)
                .flags(vk::GeometryFlagsKHR::OPAQUE)
                .geometry(vk::AccelerationStructureGeometryDataKHR {
                    instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                        .array_of_pointers(false)
                        .data(vk::DeviceOrHostAddressConstKHR {
                            device_address: buffer_address,
                        }),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promote_consumes_pending_instances() {
        let mut set = GeometrySet::new(AccelKind::TopLevel);
        for id in 0..5 {
            set.add_instance(0x1000, Mat4::IDENTITY, id);
        }
        assert_eq!(set.pending_instance_count(), 5);

        let index = set.promote_instances(0x2000);
        assert_eq!(index, 0);
        assert_eq!(set.pending_instance_count(), 0);
        assert_eq!(set.entries()[0].primitive_count, 5);
        assert!(set.entries()[0].dirty);
    }

    #[test]
    fn test_update_replaces_entry_in_place() {
        let mut set = GeometrySet::new(AccelKind::TopLevel);
        set.add_instance(0x1000, Mat4::IDENTITY, 0);
        set.add_instance(0x1000, Mat4::IDENTITY, 1);
        set.promote_instances(0x2000);
        set.clear_dirty();

        set.add_instance(0x1000, Mat4::IDENTITY, 0);
        set.add_instance(0x1000, Mat4::IDENTITY, 1);
        set.add_instance(0x1000, Mat4::IDENTITY, 2);
        set.update_instances(0, 0x3000);

        assert_eq!(set.entries().len(), 1);
        assert_eq!(set.entries()[0].primitive_count, 3);
        assert!(set.entries()[0].dirty);
        assert_eq!(set.pending_instance_count(), 0);
    }

    #[test]
    fn test_update_mode_selects_only_dirty_entries() {
        let mut set = GeometrySet::new(AccelKind::TopLevel);
        set.add_instance(0x1000, Mat4::IDENTITY, 0);
        set.promote_instances(0x2000);
        set.add_instance(0x1000, Mat4::IDENTITY, 1);
        set.promote_instances(0x2100);
        set.clear_dirty();

        set.add_instance(0x1000, Mat4::IDENTITY, 1);
        set.update_instances(1, 0x2200);

        assert_eq!(set.entries_for_build(BuildMode::Build).len(), 2);
        let refit = set.entries_for_build(BuildMode::Update);
        assert_eq!(refit.len(), 1);
        assert_eq!(refit[0].primitive_count, 1);
    }

    #[test]
    fn test_clear_dirty_after_build() {
        let mut set = GeometrySet::new(AccelKind::BottomLevel);
        set.add_triangle_geometry(
            TriangleGeometryDesc {
                vertex_address: 0x1000,
                index_address: 0x2000,
                max_vertex: 2,
                vertex_stride: 48,
            },
            1,
        );
        assert!(set.entries()[0].dirty);
        set.clear_dirty();
        assert!(!set.entries()[0].dirty);
        assert!(set.entries_for_build(BuildMode::Update).is_empty());
    }

    #[test]
    fn test_instance_record_packing() {
        let mut set = GeometrySet::new(AccelKind::TopLevel);
        set.add_instance(0xDEAD_BEEF, Mat4::IDENTITY, 42);

        let record = &set.pending_instances()[0];
        assert_eq!(record.instance_custom_index_and_mask.low_24(), 42);
        assert_eq!(record.instance_custom_index_and_mask.high_8(), 0xFF);
        let reference = unsafe { record.acceleration_structure_reference.device_handle };
        assert_eq!(reference, 0xDEAD_BEEF);
    }

    #[test]
    fn test_transform_conversion_is_row_major() {
        let translation = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let vk_transform = transform_to_vk(translation);

        // Row-major 3x4: translation lands in the last column of each row
        assert_eq!(vk_transform.matrix[3], 1.0);
        assert_eq!(vk_transform.matrix[7], 2.0);
        assert_eq!(vk_transform.matrix[11], 3.0);
        // Diagonal stays identity
        assert_eq!(vk_transform.matrix[0], 1.0);
        assert_eq!(vk_transform.matrix[5], 1.0);
        assert_eq!(vk_transform.matrix[10], 1.0);
    }

    #[test]
    fn test_needs_realloc_only_on_size_change() {
        assert!(needs_realloc(None, 1024));
        assert!(needs_realloc(Some(512), 1024));
        assert!(needs_realloc(Some(2048), 1024));
        assert!(!needs_realloc(Some(1024), 1024));
    }
}
