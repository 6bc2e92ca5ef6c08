//! Scene resource orchestrator.
//!
//! [`SceneResources`] owns everything the ray tracing pipeline binds:
//! shared geometry buffers, the material buffer, bottom and top level
//! acceleration structures, the progressive render target, and one
//! uniform buffer plus binding set per frame in flight.
//!
//! # Overview
//!
//! Callers load a scene once with [`SceneResources::load_new_scene`],
//! then drive [`SceneResources::update_scene`] every frame with the
//! accumulated [`UpdateFlags`]. The orchestrator performs only the work
//! the flags require: the steady-state frame refreshes the uniform
//! buffer and the rotating image bindings and nothing else.
//!
//! # Binding Set Layout
//!
//! | Binding | Resource | Type |
//! |---------|----------|------|
//! | 0 | Top level acceleration structure | acceleration structure |
//! | 1 | Accumulation image | storage image |
//! | 2 | Scene uniform | uniform buffer |
//! | 3 | Shared vertex buffer | storage buffer |
//! | 4 | Shared index buffer | storage buffer |
//! | 5 | Geometry mapping | storage buffer |
//! | 6 | Instance mapping | storage buffer |
//! | 7 | Emitting instances | storage buffer |
//! | 8 | Material textures | combined image sampler array |
//! | 9 | RNG state texture | storage image |
//! | 10 | Material block offsets | storage buffer |
//! | 11 | Material blocks | storage buffer |

use std::sync::Arc;

use ash::vk;
use thiserror::Error;
use tracing::{debug, info};

use raytracer_core::ScopedTimer;
use raytracer_rhi::accel::{AccelKind, AccelerationStructure, BuildMode};
use raytracer_rhi::buffer::{Buffer, BufferUsage};
use raytracer_rhi::command::CommandManager;
use raytracer_rhi::descriptor::{
    DescriptorAllocator, DescriptorBindingBuilder, DescriptorSetLayout, PoolSizeRatio,
};
use raytracer_rhi::device::Device;
use raytracer_rhi::RhiError;
use raytracer_scene::{DrawContext, Scene};

use crate::geometry::GeometryBuilder;
use crate::instance::InstanceBuilder;
use crate::materials::{MaterialBuilder, MATERIAL_TEXTURE_COUNT};
use crate::render_target::RenderTarget;
use crate::ubo::SceneUniform;
use crate::update_flags::UpdateFlags;
use crate::MAX_FRAMES_IN_FLIGHT;

pub const BINDING_TLAS: u32 = 0;
pub const BINDING_RENDER_IMAGE: u32 = 1;
pub const BINDING_SCENE_UNIFORM: u32 = 2;
pub const BINDING_VERTICES: u32 = 3;
pub const BINDING_INDICES: u32 = 4;
pub const BINDING_GEOMETRY_MAPPING: u32 = 5;
pub const BINDING_INSTANCE_MAPPING: u32 = 6;
pub const BINDING_EMITTING_INSTANCES: u32 = 7;
pub const BINDING_MATERIAL_TEXTURES: u32 = 8;
pub const BINDING_RNG_IMAGE: u32 = 9;
pub const BINDING_MATERIAL_OFFSETS: u32 = 10;
pub const BINDING_MATERIAL_BLOCKS: u32 = 11;

/// Shader stages that read scene resources.
const SCENE_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::RAYGEN_KHR.as_raw()
        | vk::ShaderStageFlags::CLOSEST_HIT_KHR.as_raw()
        | vk::ShaderStageFlags::MISS_KHR.as_raw(),
);

/// Initial descriptor pool capacity in sets.
const INITIAL_POOL_SETS: u32 = 8;

/// Errors raised while synchronizing scene resources.
#[derive(Debug, Error)]
pub enum SceneSyncError {
    /// An update was requested before any scene was loaded.
    #[error("no scene loaded")]
    NoSceneLoaded,
    /// A render object references a geometry id with no uploaded mesh.
    #[error("unknown geometry id {0}")]
    UnknownGeometry(u32),
    /// Underlying device error.
    #[error(transparent)]
    Rhi(#[from] RhiError),
}

pub type SceneSyncResult<T> = Result<T, SceneSyncError>;

/// Whether the flags require waiting for in-flight GPU work before
/// mutating shared buffers.
fn needs_idle_wait(flags: &UpdateFlags) -> bool {
    flags.has_any(UpdateFlags::STATIC_GEOMETRY_UPDATE)
        || flags.has_any(UpdateFlags::MATERIAL_UPDATE)
        || flags.has_any(UpdateFlags::SCENE_UPDATE)
}

/// Owner of all GPU-resident scene resources.
///
/// # Thread Safety
///
/// Not thread-safe. One instance is driven by the render thread; the
/// pending descriptor write batch in particular has exactly one owner
/// per synchronization pass.
pub struct SceneResources {
    device: Arc<Device>,
    commands: CommandManager,
    layout: DescriptorSetLayout,
    allocator: DescriptorAllocator,
    /// One binding set per frame in flight.
    binding_sets: Vec<vk::DescriptorSet>,
    /// One scene uniform buffer per frame in flight.
    uniform_buffers: Vec<Buffer>,
    geometry: GeometryBuilder,
    instances: InstanceBuilder,
    materials: MaterialBuilder,
    /// Top level structure, rebuilt or refitted on geometry updates.
    tlas: AccelerationStructure,
    target: RenderTarget,
    scene: Option<Scene>,
    /// Work accumulated since the last successful pass.
    flags: UpdateFlags,
}

impl SceneResources {
    /// Creates the orchestrator with no scene loaded.
    ///
    /// All per-frame resources, the descriptor layout, and the default
    /// material placeholders are created here; scene-dependent buffers
    /// appear on the first [`load_new_scene`](Self::load_new_scene).
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan resource creation fails.
    pub fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        samples_per_frame: u32,
    ) -> SceneSyncResult<Self> {
        let commands = CommandManager::new(device.clone())?;

        let bindings = Self::layout_bindings();
        let layout = DescriptorSetLayout::new(device.clone(), &bindings)?;

        let ratios = [
            PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
            PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 7.0),
            PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 2.0),
            PoolSizeRatio::new(
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                MATERIAL_TEXTURE_COUNT as f32,
            ),
            PoolSizeRatio::new(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, 1.0),
        ];
        let mut allocator = DescriptorAllocator::new(device.clone(), INITIAL_POOL_SETS, &ratios)?;

        let mut binding_sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut uniform_buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            binding_sets.push(allocator.allocate(layout.handle())?);
            uniform_buffers.push(Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                SceneUniform::SIZE as vk::DeviceSize,
            )?);
        }

        let materials = MaterialBuilder::new(device.clone(), &commands)?;
        let geometry = GeometryBuilder::new(device.clone());
        let instances = InstanceBuilder::new(device.clone());
        let tlas = AccelerationStructure::new(device.clone(), AccelKind::TopLevel);
        let target = RenderTarget::new(device.clone(), &commands, extent, samples_per_frame)?;

        info!(
            "Scene resources initialized: {} frames in flight, {}x{}",
            MAX_FRAMES_IN_FLIGHT, extent.width, extent.height
        );

        Ok(Self {
            device,
            commands,
            layout,
            allocator,
            binding_sets,
            uniform_buffers,
            geometry,
            instances,
            materials,
            tlas,
            target,
            scene: None,
            flags: UpdateFlags::new(),
        })
    }

    fn layout_bindings() -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        vec![
            DescriptorBindingBuilder::acceleration_structure(BINDING_TLAS, SCENE_STAGES),
            DescriptorBindingBuilder::storage_image(BINDING_RENDER_IMAGE, SCENE_STAGES),
            DescriptorBindingBuilder::uniform_buffer(BINDING_SCENE_UNIFORM, SCENE_STAGES),
            DescriptorBindingBuilder::storage_buffer(BINDING_VERTICES, SCENE_STAGES),
            DescriptorBindingBuilder::storage_buffer(BINDING_INDICES, SCENE_STAGES),
            DescriptorBindingBuilder::storage_buffer(BINDING_GEOMETRY_MAPPING, SCENE_STAGES),
            DescriptorBindingBuilder::storage_buffer(BINDING_INSTANCE_MAPPING, SCENE_STAGES),
            DescriptorBindingBuilder::storage_buffer(BINDING_EMITTING_INSTANCES, SCENE_STAGES),
            DescriptorBindingBuilder::combined_image_sampler_array(
                BINDING_MATERIAL_TEXTURES,
                MATERIAL_TEXTURE_COUNT as u32,
                SCENE_STAGES,
            ),
            DescriptorBindingBuilder::storage_image(BINDING_RNG_IMAGE, SCENE_STAGES),
            DescriptorBindingBuilder::storage_buffer(BINDING_MATERIAL_OFFSETS, SCENE_STAGES),
            DescriptorBindingBuilder::storage_buffer(BINDING_MATERIAL_BLOCKS, SCENE_STAGES),
        ]
    }

    /// Tears down all per-scene resources and uploads the new scene's
    /// geometry.
    ///
    /// Meshes receive their geometry ids and buffer offsets here. The
    /// remaining per-scene state (materials, instances, the top level
    /// structure) is built by the next [`update_scene`](Self::update_scene)
    /// pass, which this method arms by setting `SCENE_UPDATE`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device wait or geometry upload fails.
    pub fn load_new_scene(&mut self, mut scene: Scene) -> SceneSyncResult<()> {
        let _timer = ScopedTimer::new("Scene load");
        self.device.wait_idle()?;

        self.geometry.upload(&self.commands, &mut scene.meshes)?;
        // The old structure references the previous scene's instance data
        self.tlas = AccelerationStructure::new(self.device.clone(), AccelKind::TopLevel);

        // Geometry buffers are immutable for the scene's lifetime, so
        // their bindings are written once here for every frame's set
        if let (Some(vertices), Some(indices), Some(mapping)) = (
            self.geometry.vertex_buffer(),
            self.geometry.index_buffer(),
            self.geometry.mapping_buffer(),
        ) {
            self.allocator.write_buffer(
                BINDING_VERTICES,
                vertices.handle(),
                vertices.size(),
                0,
                vk::DescriptorType::STORAGE_BUFFER,
            );
            self.allocator.write_buffer(
                BINDING_INDICES,
                indices.handle(),
                indices.size(),
                0,
                vk::DescriptorType::STORAGE_BUFFER,
            );
            self.allocator.write_buffer(
                BINDING_GEOMETRY_MAPPING,
                mapping.handle(),
                mapping.size(),
                0,
                vk::DescriptorType::STORAGE_BUFFER,
            );
        }
        self.allocator.write_image_array(
            BINDING_MATERIAL_TEXTURES,
            self.materials.texture_descriptors(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        );
        for &set in &self.binding_sets {
            self.allocator.update_set(set);
        }
        self.allocator.clear_writes();

        info!(
            "Loaded scene '{}': {} meshes, {} materials, {} instances",
            scene.name,
            scene.meshes.len(),
            scene.materials.len(),
            scene.instances.len()
        );

        self.scene = Some(scene);
        self.flags.set(UpdateFlags::SCENE_UPDATE);
        Ok(())
    }

    /// The single per-frame synchronization entry point.
    ///
    /// Merges `flags` into the accumulated set, performs the gated
    /// uploads and acceleration structure work, batches the resulting
    /// descriptor writes, flushes them into every frame's binding set,
    /// and refreshes the per-frame uniform and rotating image bindings.
    /// The accumulated flags are cleared only after the whole pass
    /// succeeds, so a failed pass retries the same work next frame.
    ///
    /// # Errors
    ///
    /// Returns an error if no scene is loaded, an object references an
    /// unknown geometry, or any upload or build fails.
    pub fn update_scene(
        &mut self,
        draw_context: &DrawContext,
        frame_index: usize,
        flags: UpdateFlags,
    ) -> SceneSyncResult<()> {
        if self.scene.is_none() {
            return Err(SceneSyncError::NoSceneLoaded);
        }
        self.flags.merge(flags);

        // Structural updates mutate buffers in-flight frames may still
        // read; steady-state frames skip the stall entirely
        if needs_idle_wait(&self.flags) {
            self.device.wait_idle()?;
        }

        if self.flags.contains(UpdateFlags::MATERIAL_UPDATE) {
            self.rebuild_materials()?;
        }
        if self.flags.contains(UpdateFlags::STATIC_GEOMETRY_UPDATE) {
            self.rebuild_instances(draw_context)?;
        }
        // The emitting list depends on both geometry placement and
        // material emission
        if self.flags.has_any(UpdateFlags::STATIC_GEOMETRY_UPDATE)
            || self.flags.has_any(UpdateFlags::MATERIAL_UPDATE)
        {
            self.instances
                .upload_emitting(&self.commands, &draw_context.objects)?;
            if let Some(emitting) = self.instances.emitting_buffer() {
                self.allocator.write_buffer(
                    BINDING_EMITTING_INSTANCES,
                    emitting.handle(),
                    emitting.size(),
                    0,
                    vk::DescriptorType::STORAGE_BUFFER,
                );
            }
        }

        // Flush the shared batch into every frame's set, then handle the
        // per-frame bindings individually
        for &set in &self.binding_sets {
            self.allocator.update_set(set);
        }
        self.allocator.clear_writes();

        if self.flags.contains(UpdateFlags::TARGET_RESET) {
            self.target.reset_accumulation();
        }

        self.refresh_uniform(frame_index)?;
        self.refresh_frame_bindings(frame_index);

        debug!("Scene update pass complete: {:?}", self.flags);
        self.flags.reset();
        Ok(())
    }

    fn rebuild_materials(&mut self) -> SceneSyncResult<()> {
        let scene = self.scene.as_ref().ok_or(SceneSyncError::NoSceneLoaded)?;
        self.materials.upload(&self.commands, &scene.materials)?;

        if let (Some(blocks), Some(offsets)) = (
            self.materials.material_buffer(),
            self.materials.offset_buffer(),
        ) {
            self.allocator.write_buffer(
                BINDING_MATERIAL_BLOCKS,
                blocks.handle(),
                blocks.size(),
                0,
                vk::DescriptorType::STORAGE_BUFFER,
            );
            self.allocator.write_buffer(
                BINDING_MATERIAL_OFFSETS,
                offsets.handle(),
                offsets.size(),
                0,
                vk::DescriptorType::STORAGE_BUFFER,
            );
        }
        Ok(())
    }

    fn rebuild_instances(&mut self, draw_context: &DrawContext) -> SceneSyncResult<()> {
        debug_assert!(!draw_context.objects.is_empty());
        self.instances
            .upload_mappings(&self.commands, &draw_context.objects)?;

        for (instance_id, object) in draw_context.objects.iter().enumerate() {
            let blas = self
                .geometry
                .blas(object.geometry_id)
                .ok_or(SceneSyncError::UnknownGeometry(object.geometry_id))?;
            self.tlas
                .add_instance(blas, object.transform, instance_id as u32);
        }

        let build_flags = vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_BUILD
            | vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE;
        if self.tlas.is_built() {
            // Refit keeps the backing buffer as long as the reported
            // size is unchanged
            self.tlas.update_instance_geometry(0)?;
            self.tlas
                .build(&self.commands, build_flags, BuildMode::Update)?;
        } else {
            self.tlas.add_instance_geometry()?;
            self.tlas
                .build(&self.commands, build_flags, BuildMode::Build)?;
        }

        self.allocator
            .write_acceleration_structure(BINDING_TLAS, self.tlas.handle());
        if let Some(mapping) = self.instances.mapping_buffer() {
            self.allocator.write_buffer(
                BINDING_INSTANCE_MAPPING,
                mapping.handle(),
                mapping.size(),
                0,
                vk::DescriptorType::STORAGE_BUFFER,
            );
        }
        Ok(())
    }

    /// Uploads the frame's uniform data. Camera and lights change every
    /// frame, so this runs unconditionally.
    fn refresh_uniform(&mut self, frame_index: usize) -> SceneSyncResult<()> {
        let scene = self.scene.as_ref().ok_or(SceneSyncError::NoSceneLoaded)?;
        let extent = self.target.extent();
        let aspect_ratio = extent.width as f32 / extent.height as f32;

        let uniform = SceneUniform::new(
            &scene.camera,
            aspect_ratio,
            scene.directional_lights.first(),
            scene.point_lights.first(),
            self.instances.emitting_count(),
            self.target.state().accumulated_frames(),
            self.target.state().samples_per_frame(),
        );
        self.uniform_buffers[frame_index].write_data(0, bytemuck::bytes_of(&uniform))?;
        Ok(())
    }

    /// Rewrites the bindings that differ per frame slot: the uniform
    /// buffer and the rotating accumulation and RNG images.
    fn refresh_frame_bindings(&mut self, frame_index: usize) {
        let uniform = &self.uniform_buffers[frame_index];
        self.allocator.write_buffer(
            BINDING_SCENE_UNIFORM,
            uniform.handle(),
            uniform.size(),
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
        );
        self.allocator.write_image(
            BINDING_RENDER_IMAGE,
            self.target.image(frame_index).view(),
            vk::Sampler::null(),
            vk::ImageLayout::GENERAL,
            vk::DescriptorType::STORAGE_IMAGE,
        );
        self.allocator.write_image(
            BINDING_RNG_IMAGE,
            self.target.rng_image(frame_index).view(),
            vk::Sampler::null(),
            vk::ImageLayout::GENERAL,
            vk::DescriptorType::STORAGE_IMAGE,
        );
        self.allocator.update_set(self.binding_sets[frame_index]);
        self.allocator.clear_writes();
    }

    /// Recreates the render target at a new extent and rebinds the
    /// output images for every frame slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the device wait or image recreation fails.
    pub fn update_render_target(&mut self, extent: vk::Extent2D) -> SceneSyncResult<()> {
        self.device.wait_idle()?;
        self.target.recreate(&self.commands, extent)?;
        for frame_index in 0..MAX_FRAMES_IN_FLIGHT {
            self.refresh_frame_bindings(frame_index);
        }
        Ok(())
    }

    /// Returns the binding set for a frame slot.
    pub fn scene_binding_set(&self, frame_index: usize) -> vk::DescriptorSet {
        self.binding_sets[frame_index]
    }

    /// Returns the descriptor set layout shared by all frame slots.
    pub fn binding_layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    /// Returns the loaded scene, if any.
    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    /// Returns the loaded scene mutably. Callers that edit it must pass
    /// the matching [`UpdateFlags`] to the next
    /// [`update_scene`](Self::update_scene).
    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    /// Returns the progressive render target.
    pub fn render_target(&self) -> &RenderTarget {
        &self.target
    }

    /// Returns the render target mutably, for advancing the slot ring.
    pub fn render_target_mut(&mut self) -> &mut RenderTarget {
        &mut self.target
    }

    /// Returns the top level acceleration structure.
    pub fn tlas(&self) -> &AccelerationStructure {
        &self.tlas
    }

    /// Flags accumulated since the last successful pass.
    pub fn pending_flags(&self) -> UpdateFlags {
        self.flags
    }
}

impl Drop for SceneResources {
    fn drop(&mut self) {
        // Sets allocated from the pools die with them
        if self.device.wait_idle().is_ok() {
            self.allocator.destroy_pools();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn layout_covers_all_bindings_once() {
        let bindings = SceneResources::layout_bindings();
        assert_eq!(bindings.len(), 12);
        let slots: HashSet<u32> = bindings.iter().map(|b| b.binding).collect();
        assert_eq!(slots.len(), bindings.len());
        assert!(slots.contains(&BINDING_TLAS));
        assert!(slots.contains(&BINDING_MATERIAL_BLOCKS));
    }

    #[test]
    fn all_bindings_visible_to_ray_tracing_stages() {
        for binding in SceneResources::layout_bindings() {
            assert!(binding
                .stage_flags
                .contains(vk::ShaderStageFlags::RAYGEN_KHR));
            assert!(binding
                .stage_flags
                .contains(vk::ShaderStageFlags::CLOSEST_HIT_KHR));
            assert!(binding.stage_flags.contains(vk::ShaderStageFlags::MISS_KHR));
        }
    }

    #[test]
    fn texture_array_binding_has_full_count() {
        let bindings = SceneResources::layout_bindings();
        let array = bindings
            .iter()
            .find(|b| b.binding == BINDING_MATERIAL_TEXTURES)
            .unwrap();
        assert_eq!(array.descriptor_count, MATERIAL_TEXTURE_COUNT as u32);
    }

    #[test]
    fn idle_wait_only_for_structural_updates() {
        let mut steady = UpdateFlags::new();
        steady.set(UpdateFlags::TARGET_RESET);
        assert!(!needs_idle_wait(&steady));

        let mut geometry = UpdateFlags::new();
        geometry.set(UpdateFlags::STATIC_GEOMETRY_UPDATE);
        assert!(needs_idle_wait(&geometry));

        let mut material = UpdateFlags::new();
        material.set(UpdateFlags::MATERIAL_UPDATE);
        assert!(needs_idle_wait(&material));

        assert!(!needs_idle_wait(&UpdateFlags::new()));
    }
}
