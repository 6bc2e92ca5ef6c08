//! Descriptor set layouts and a growable descriptor allocator.
//!
//! This module provides wrappers for descriptor resources:
//!
//! - [`DescriptorSetLayout`] defines the structure of shader resource bindings
//! - [`DescriptorAllocator`] hands out descriptor sets from a list of pools
//!   sized by a ratio table, growing geometrically when a pool is exhausted
//! - [`PendingWrite`] queues buffer/image/acceleration-structure writes that
//!   are flushed in one batched `vkUpdateDescriptorSets` call
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use raytracer_rhi::device::Device;
//! use raytracer_rhi::descriptor::{DescriptorAllocator, DescriptorSetLayout, PoolSizeRatio};
//!
//! # fn example(device: Arc<Device>) -> Result<(), raytracer_rhi::RhiError> {
//! let ratios = [
//!     PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
//!     PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 4.0),
//! ];
//! let mut allocator = DescriptorAllocator::new(device.clone(), 16, &ratios)?;
//!
//! let binding = vk::DescriptorSetLayoutBinding::default()
//!     .binding(0)
//!     .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
//!     .descriptor_count(1)
//!     .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR);
//! let layout = DescriptorSetLayout::new(device, &[binding])?;
//!
//! let set = allocator.allocate(layout.handle())?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Pool growth factor applied each time a new pool is created.
const GROW_RATIO: f32 = 1.5;

/// Hard cap on the number of sets a single pool may hold.
const MAX_SETS_PER_POOL: u32 = 4092;

/// Descriptor set layout wrapper.
///
/// A descriptor set layout defines the structure of resources that can be
/// bound to a shader. It specifies the binding points, descriptor types,
/// and shader stages that can access each resource.
///
/// # Thread Safety
///
/// The layout itself is immutable after creation. It can be shared between
/// threads when wrapped in `Arc`.
pub struct DescriptorSetLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor set layout handle.
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a new descriptor set layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `bindings` - Array of binding descriptions
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Relative demand for one descriptor type within a pool.
///
/// A pool created for N sets reserves `ratio * N` descriptors of each type
/// in its ratio table.
#[derive(Clone, Copy, Debug)]
pub struct PoolSizeRatio {
    /// Descriptor type this ratio applies to.
    pub descriptor_type: vk::DescriptorType,
    /// Descriptors reserved per set.
    pub ratio: f32,
}

impl PoolSizeRatio {
    /// Creates a new pool size ratio.
    #[inline]
    pub fn new(descriptor_type: vk::DescriptorType, ratio: f32) -> Self {
        Self {
            descriptor_type,
            ratio,
        }
    }
}

/// One queued descriptor write.
///
/// Pending writes own their info structs so they can be recorded long before
/// the destination set is known. [`DescriptorAllocator::update_set`] resolves
/// them against a concrete set in one batched call.
pub enum PendingWrite {
    /// Buffer binding write.
    Buffer {
        binding: u32,
        descriptor_type: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    },
    /// Single image binding write.
    Image {
        binding: u32,
        descriptor_type: vk::DescriptorType,
        info: vk::DescriptorImageInfo,
    },
    /// Image array binding write (one write covering several array elements).
    Images {
        binding: u32,
        descriptor_type: vk::DescriptorType,
        infos: Vec<vk::DescriptorImageInfo>,
    },
    /// Acceleration structure binding write.
    AccelerationStructure {
        binding: u32,
        handle: vk::AccelerationStructureKHR,
    },
}

/// Growable descriptor set allocator with deferred batched writes.
///
/// Sets are allocated from a list of ready pools. When a pool runs out it is
/// moved to the full list and a new pool is created, its capacity grown by
/// [`GROW_RATIO`] up to [`MAX_SETS_PER_POOL`]. [`clear_pools`](Self::clear_pools)
/// resets every pool and moves the full list back to ready, so pools are
/// recycled rather than reallocated.
///
/// # Thread Safety
///
/// The allocator is not thread-safe. The pending write list in particular is
/// owned by exactly one synchronization pass at a time.
pub struct DescriptorAllocator {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Pools with remaining capacity.
    ready_pools: Vec<vk::DescriptorPool>,
    /// Pools that failed an allocation since the last clear.
    full_pools: Vec<vk::DescriptorPool>,
    /// Relative binding-type demand used to size new pools.
    ratios: Vec<PoolSizeRatio>,
    /// Capacity of the next pool to be created.
    sets_per_pool: u32,
    /// Queued writes awaiting the next `update_set` flush.
    pending: Vec<PendingWrite>,
}

impl DescriptorAllocator {
    /// Creates the allocator and its first pool.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `initial_sets` - Capacity of the first pool
    /// * `ratios` - Relative binding-type demand table
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceExhausted`] if the driver refuses to
    /// create the first pool.
    pub fn new(
        device: Arc<Device>,
        initial_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> RhiResult<Self> {
        debug_assert!(initial_sets > 0);
        debug_assert!(!ratios.is_empty());

        let first_pool = create_pool(&device, initial_sets, ratios)?;

        Ok(Self {
            device,
            ready_pools: vec![first_pool],
            full_pools: Vec::new(),
            ratios: ratios.to_vec(),
            sets_per_pool: grown_pool_size(initial_sets),
            pending: Vec::new(),
        })
    }

    /// Allocates one descriptor set for the given layout.
    ///
    /// Takes a ready pool (creating a grown one if none is ready) and
    /// attempts allocation. If the pool is exhausted or fragmented it is
    /// moved to the full list and the allocation is retried once against a
    /// fresh pool.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceExhausted`] if the retry also fails.
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let mut pool = self.take_pool()?;

        match self.try_allocate(pool, layout) {
            Ok(set) => {
                self.ready_pools.push(pool);
                Ok(set)
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.full_pools.push(pool);

                pool = self.take_pool()?;
                let set = self.try_allocate(pool, layout).map_err(|e| {
                    RhiError::ResourceExhausted(format!(
                        "descriptor set allocation failed twice: {:?}",
                        e
                    ))
                })?;
                self.ready_pools.push(pool);
                Ok(set)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resets every pool and moves the full list back to ready.
    ///
    /// All previously allocated sets become invalid. Pools are reused
    /// without reallocation.
    ///
    /// # Errors
    ///
    /// Returns an error if a pool reset fails.
    pub fn clear_pools(&mut self) -> RhiResult<()> {
        for &pool in &self.ready_pools {
            unsafe {
                self.device
                    .handle()
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())?;
            }
        }
        for &pool in &self.full_pools {
            unsafe {
                self.device
                    .handle()
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())?;
            }
        }
        self.ready_pools.append(&mut self.full_pools);
        debug!("Cleared {} descriptor pool(s)", self.ready_pools.len());
        Ok(())
    }

    /// Destroys every pool. The allocator must not be used afterwards
    /// except to be dropped.
    pub fn destroy_pools(&mut self) {
        let count = self.ready_pools.len() + self.full_pools.len();
        for pool in self.ready_pools.drain(..).chain(self.full_pools.drain(..)) {
            unsafe {
                self.device.handle().destroy_descriptor_pool(pool, None);
            }
        }
        if count > 0 {
            debug!("Destroyed {} descriptor pool(s)", count);
        }
    }

    /// Queues a buffer write against a not-yet-specified set.
    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
        offset: vk::DeviceSize,
        descriptor_type: vk::DescriptorType,
    ) {
        self.pending.push(PendingWrite::Buffer {
            binding,
            descriptor_type,
            info: vk::DescriptorBufferInfo {
                buffer,
                offset,
                range,
            },
        });
    }

    /// Queues a single image write against a not-yet-specified set.
    pub fn write_image(
        &mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        descriptor_type: vk::DescriptorType,
    ) {
        self.pending.push(PendingWrite::Image {
            binding,
            descriptor_type,
            info: vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: layout,
            },
        });
    }

    /// Queues one write covering an array of images sharing a sampler.
    pub fn write_images(
        &mut self,
        binding: u32,
        views: &[vk::ImageView],
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        descriptor_type: vk::DescriptorType,
    ) {
        let infos = views
            .iter()
            .map(|&view| vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: layout,
            })
            .collect();
        self.pending.push(PendingWrite::Images {
            binding,
            descriptor_type,
            infos,
        });
    }

    /// Queues one write covering an array of fully specified image infos,
    /// for arrays where each element pairs its own sampler.
    pub fn write_image_array(
        &mut self,
        binding: u32,
        infos: Vec<vk::DescriptorImageInfo>,
        descriptor_type: vk::DescriptorType,
    ) {
        self.pending.push(PendingWrite::Images {
            binding,
            descriptor_type,
            infos,
        });
    }

    /// Queues an acceleration structure write against a not-yet-specified set.
    pub fn write_acceleration_structure(
        &mut self,
        binding: u32,
        handle: vk::AccelerationStructureKHR,
    ) {
        self.pending
            .push(PendingWrite::AccelerationStructure { binding, handle });
    }

    /// Flushes all pending writes against one concrete set in a single
    /// batched call.
    ///
    /// The pending list is retained so the same batch can be flushed against
    /// each frame-in-flight set; call [`clear_writes`](Self::clear_writes)
    /// once every set has been updated.
    pub fn update_set(&mut self, set: vk::DescriptorSet) {
        if self.pending.is_empty() {
            return;
        }

        // Handle arrays and extension structs must keep stable addresses
        // while the write list is assembled, so both vectors are sized
        // exactly up front.
        let accel_handles: Vec<[vk::AccelerationStructureKHR; 1]> = self
            .pending
            .iter()
            .filter_map(|write| match write {
                PendingWrite::AccelerationStructure { handle, .. } => Some([*handle]),
                _ => None,
            })
            .collect();

        let mut accel_infos: Vec<vk::WriteDescriptorSetAccelerationStructureKHR> =
            Vec::with_capacity(accel_handles.len());
        for handles in &accel_handles {
            accel_infos.push(
                vk::WriteDescriptorSetAccelerationStructureKHR::default()
                    .acceleration_structures(handles),
            );
        }

        let mut accel_iter = accel_infos.iter_mut();
        let mut writes: Vec<vk::WriteDescriptorSet> = Vec::with_capacity(self.pending.len());

        for pending in &self.pending {
            match pending {
                PendingWrite::Buffer {
                    binding,
                    descriptor_type,
                    info,
                } => {
                    writes.push(
                        vk::WriteDescriptorSet::default()
                            .dst_set(set)
                            .dst_binding(*binding)
                            .descriptor_type(*descriptor_type)
                            .buffer_info(std::slice::from_ref(info)),
                    );
                }
                PendingWrite::Image {
                    binding,
                    descriptor_type,
                    info,
                } => {
                    writes.push(
                        vk::WriteDescriptorSet::default()
                            .dst_set(set)
                            .dst_binding(*binding)
                            .descriptor_type(*descriptor_type)
                            .image_info(std::slice::from_ref(info)),
                    );
                }
                PendingWrite::Images {
                    binding,
                    descriptor_type,
                    infos,
                } => {
                    writes.push(
                        vk::WriteDescriptorSet::default()
                            .dst_set(set)
                            .dst_binding(*binding)
                            .descriptor_type(*descriptor_type)
                            .image_info(infos),
                    );
                }
                PendingWrite::AccelerationStructure { binding, .. } => {
                    let info = accel_iter
                        .next()
                        .expect("accel info count matches pending accel writes");
                    // push_next does not set descriptor_count for extension
                    // structs, so it is written explicitly.
                    let mut write = vk::WriteDescriptorSet::default()
                        .dst_set(set)
                        .dst_binding(*binding)
                        .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                        .push_next(info);
                    write.descriptor_count = 1;
                    writes.push(write);
                }
            }
        }

        unsafe {
            self.device.handle().update_descriptor_sets(&writes, &[]);
        }

        debug!("Flushed {} descriptor write(s)", writes.len());
    }

    /// Discards the pending write list without touching GPU state.
    pub fn clear_writes(&mut self) {
        self.pending.clear();
    }

    /// Returns the number of queued writes.
    #[inline]
    pub fn pending_write_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns the number of pools currently owned by the allocator.
    #[inline]
    pub fn pool_count(&self) -> usize {
        self.ready_pools.len() + self.full_pools.len()
    }

    /// Pops a ready pool or creates a grown one.
    fn take_pool(&mut self) -> RhiResult<vk::DescriptorPool> {
        if let Some(pool) = self.ready_pools.pop() {
            return Ok(pool);
        }

        let pool = create_pool(&self.device, self.sets_per_pool, &self.ratios)?;
        debug!("Grew descriptor allocator: new pool of {} sets", self.sets_per_pool);
        self.sets_per_pool = grown_pool_size(self.sets_per_pool);
        Ok(pool)
    }

    fn try_allocate(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, vk::Result> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        self.destroy_pools();
    }
}

/// Computes the capacity of the next pool after a growth event.
fn grown_pool_size(current: u32) -> u32 {
    (((current as f32) * GROW_RATIO) as u32).min(MAX_SETS_PER_POOL)
}

/// Scales a ratio table to concrete pool sizes for a pool of `set_count` sets.
fn scaled_pool_sizes(ratios: &[PoolSizeRatio], set_count: u32) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|ratio| vk::DescriptorPoolSize {
            ty: ratio.descriptor_type,
            descriptor_count: ((ratio.ratio * set_count as f32) as u32).max(1),
        })
        .collect()
}

fn create_pool(
    device: &Device,
    set_count: u32,
    ratios: &[PoolSizeRatio],
) -> RhiResult<vk::DescriptorPool> {
    let pool_sizes = scaled_pool_sizes(ratios, set_count);

    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .max_sets(set_count)
        .pool_sizes(&pool_sizes);

    let pool = unsafe {
        device
            .handle()
            .create_descriptor_pool(&pool_info, None)
            .map_err(|e| {
                RhiError::ResourceExhausted(format!("descriptor pool creation failed: {:?}", e))
            })?
    };

    debug!("Created descriptor pool for {} sets", set_count);
    Ok(pool)
}

/// Creates descriptor binding descriptions for common binding types.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    /// Creates a uniform buffer binding.
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }

    /// Creates a storage buffer binding.
    #[inline]
    pub fn storage_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }

    /// Creates a storage image binding.
    #[inline]
    pub fn storage_image(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }

    /// Creates a combined image sampler binding.
    #[inline]
    pub fn combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }

    /// Creates a combined image sampler array binding.
    #[inline]
    pub fn combined_image_sampler_array(
        binding: u32,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(count)
            .stage_flags(stage_flags)
    }

    /// Creates an acceleration structure binding.
    #[inline]
    pub fn acceleration_structure(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grown_pool_size_applies_grow_ratio() {
        assert_eq!(grown_pool_size(16), 24);
        assert_eq!(grown_pool_size(24), 36);
    }

    #[test]
    fn test_grown_pool_size_caps_at_maximum() {
        assert_eq!(grown_pool_size(MAX_SETS_PER_POOL), MAX_SETS_PER_POOL);
        assert_eq!(grown_pool_size(4000), MAX_SETS_PER_POOL);
    }

    #[test]
    fn test_repeated_growth_converges_to_cap() {
        let mut size = 16;
        for _ in 0..64 {
            size = grown_pool_size(size);
        }
        assert_eq!(size, MAX_SETS_PER_POOL);
    }

    #[test]
    fn test_scaled_pool_sizes() {
        let ratios = [
            PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
            PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 4.0),
            PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 0.5),
        ];
        let sizes = scaled_pool_sizes(&ratios, 16);
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes[0].descriptor_count, 16);
        assert_eq!(sizes[1].descriptor_count, 64);
        assert_eq!(sizes[2].descriptor_count, 8);
    }

    #[test]
    fn test_scaled_pool_sizes_never_zero() {
        let ratios = [PoolSizeRatio::new(vk::DescriptorType::SAMPLER, 0.01)];
        let sizes = scaled_pool_sizes(&ratios, 4);
        assert_eq!(sizes[0].descriptor_count, 1);
    }

    #[test]
    fn test_binding_builder_types() {
        let binding =
            DescriptorBindingBuilder::acceleration_structure(0, vk::ShaderStageFlags::RAYGEN_KHR);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
        );
        assert_eq!(binding.descriptor_count, 1);

        let array = DescriptorBindingBuilder::combined_image_sampler_array(
            8,
            6,
            vk::ShaderStageFlags::CLOSEST_HIT_KHR,
        );
        assert_eq!(array.binding, 8);
        assert_eq!(array.descriptor_count, 6);
    }
}
