//! Material buffer and default placeholder resources.
//!
//! Material parameter blocks have different sizes per variant, so the
//! material buffer is a concatenated blob plus a byte-offset table
//! indexed by material index. Texture indices inside each block point
//! into the combined image sampler array.
//!
//! Placeholder images and samplers are plain fields of the builder,
//! constructed once when the orchestrator initializes. They are never
//! global state.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use raytracer_rhi::buffer::{Buffer, BufferUsage};
use raytracer_rhi::command::CommandManager;
use raytracer_rhi::device::Device;
use raytracer_rhi::image::Image;
use raytracer_rhi::sampler::Sampler;
use raytracer_rhi::RhiResult;
use raytracer_scene::MaterialInstance;

/// Size of the combined image sampler array in the binding set.
pub const MATERIAL_TEXTURE_COUNT: usize = 6;

/// Checkerboard error texture edge length.
const CHECKERBOARD_SIZE: u32 = 16;

/// Concatenated material blocks plus the byte offset of each block.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PackedMaterials {
    /// All parameter blocks back to back.
    pub data: Vec<u8>,
    /// Byte offset of each material's block, indexed by material index.
    pub offsets: Vec<u32>,
}

/// Packs materials in declaration order; index equals position.
///
/// An empty material list is a caller bug.
fn pack_materials(materials: &[MaterialInstance]) -> PackedMaterials {
    debug_assert!(!materials.is_empty());
    let mut packed = PackedMaterials::default();
    for material in materials {
        packed.offsets.push(packed.data.len() as u32);
        packed.data.extend_from_slice(material.params.as_bytes());
    }
    packed
}

fn solid_pixels(rgba: [u8; 4]) -> Vec<u8> {
    rgba.to_vec()
}

fn checkerboard_pixels() -> Vec<u8> {
    let magenta = [255u8, 0, 255, 255];
    let black = [0u8, 0, 0, 255];
    let mut pixels = Vec::with_capacity((CHECKERBOARD_SIZE * CHECKERBOARD_SIZE * 4) as usize);
    for y in 0..CHECKERBOARD_SIZE {
        for x in 0..CHECKERBOARD_SIZE {
            if (x + y) % 2 == 0 {
                pixels.extend_from_slice(&magenta);
            } else {
                pixels.extend_from_slice(&black);
            }
        }
    }
    pixels
}

/// Owns the material buffer and the default placeholder resources.
pub struct MaterialBuilder {
    device: Arc<Device>,
    /// 1x1 white placeholder.
    white_image: Image,
    /// 1x1 mid-grey placeholder.
    grey_image: Image,
    /// 1x1 black placeholder.
    black_image: Image,
    /// Magenta/black checkerboard shown for missing textures.
    checkerboard_image: Image,
    nearest_sampler: Sampler,
    linear_sampler: Sampler,
    anisotropic_sampler: Sampler,
    /// Concatenated parameter blocks.
    material_buffer: Option<Buffer>,
    /// Byte offset per material index.
    offset_buffer: Option<Buffer>,
    material_count: u32,
}

impl MaterialBuilder {
    /// Creates the builder along with all placeholder resources.
    ///
    /// # Errors
    ///
    /// Returns an error if image upload or sampler creation fails.
    pub fn new(device: Arc<Device>, commands: &CommandManager) -> RhiResult<Self> {
        let format = vk::Format::R8G8B8A8_UNORM;
        let white_image = Image::new_with_data(
            device.clone(),
            commands,
            1,
            1,
            format,
            &solid_pixels([255, 255, 255, 255]),
        )?;
        let grey_image = Image::new_with_data(
            device.clone(),
            commands,
            1,
            1,
            format,
            &solid_pixels([128, 128, 128, 255]),
        )?;
        let black_image = Image::new_with_data(
            device.clone(),
            commands,
            1,
            1,
            format,
            &solid_pixels([0, 0, 0, 255]),
        )?;
        let checkerboard_image = Image::new_with_data(
            device.clone(),
            commands,
            CHECKERBOARD_SIZE,
            CHECKERBOARD_SIZE,
            format,
            &checkerboard_pixels(),
        )?;

        let nearest_sampler = Sampler::nearest(device.clone())?;
        let linear_sampler = Sampler::linear(device.clone())?;
        let anisotropic_sampler = Sampler::anisotropic(device.clone())?;

        debug!("Created default material resources");

        Ok(Self {
            device,
            white_image,
            grey_image,
            black_image,
            checkerboard_image,
            nearest_sampler,
            linear_sampler,
            anisotropic_sampler,
            material_buffer: None,
            offset_buffer: None,
            material_count: 0,
        })
    }

    /// Rebuilds the material buffer and offset table from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if a buffer upload fails.
    pub fn upload(
        &mut self,
        commands: &CommandManager,
        materials: &[MaterialInstance],
    ) -> RhiResult<()> {
        let packed = pack_materials(materials);
        self.material_buffer = Some(Buffer::new_device_local(
            self.device.clone(),
            commands,
            BufferUsage::Storage,
            &packed.data,
        )?);
        self.offset_buffer = Some(Buffer::new_device_local(
            self.device.clone(),
            commands,
            BufferUsage::Storage,
            bytemuck::cast_slice(&packed.offsets),
        )?);
        self.material_count = materials.len() as u32;

        info!(
            "Uploaded material buffer: {} materials, {} bytes",
            materials.len(),
            packed.data.len()
        );
        Ok(())
    }

    /// Returns the concatenated material block buffer, if uploaded.
    pub fn material_buffer(&self) -> Option<&Buffer> {
        self.material_buffer.as_ref()
    }

    /// Returns the material offset table, if uploaded.
    pub fn offset_buffer(&self) -> Option<&Buffer> {
        self.offset_buffer.as_ref()
    }

    /// Number of materials in the buffer.
    pub fn material_count(&self) -> u32 {
        self.material_count
    }

    /// Descriptor infos for the combined image sampler array.
    ///
    /// Slot order is fixed so texture indices stay stable across scenes.
    pub fn texture_descriptors(&self) -> Vec<vk::DescriptorImageInfo> {
        let slots: [(&Image, &Sampler); MATERIAL_TEXTURE_COUNT] = [
            (&self.white_image, &self.linear_sampler),
            (&self.grey_image, &self.linear_sampler),
            (&self.black_image, &self.linear_sampler),
            (&self.checkerboard_image, &self.nearest_sampler),
            (&self.white_image, &self.anisotropic_sampler),
            (&self.checkerboard_image, &self.linear_sampler),
        ];
        slots
            .iter()
            .map(|(image, sampler)| {
                vk::DescriptorImageInfo::default()
                    .image_view(image.view())
                    .sampler(sampler.handle())
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raytracer_scene::{MaterialParams, MetalRoughParams, PhongParams};

    #[test]
    fn packing_assigns_offsets_by_position() {
        let materials = vec![
            MaterialInstance::new("a", MaterialParams::Phong(PhongParams::default())),
            MaterialInstance::new("b", MaterialParams::MetalRough(MetalRoughParams::default())),
            MaterialInstance::new("c", MaterialParams::Phong(PhongParams::default())),
        ];
        let packed = pack_materials(&materials);
        // Phong is 64 bytes, metal-rough is 48
        assert_eq!(packed.offsets, vec![0, 64, 112]);
        assert_eq!(packed.data.len(), 176);
    }

    #[test]
    fn packing_two_materials_yields_two_entries() {
        let materials = vec![
            MaterialInstance::new("a", MaterialParams::Phong(PhongParams::default())),
            MaterialInstance::new("b", MaterialParams::Phong(PhongParams::default())),
        ];
        let packed = pack_materials(&materials);
        assert_eq!(packed.offsets.len(), 2);
    }

    #[test]
    #[should_panic]
    fn packing_rejects_empty_input() {
        let _ = pack_materials(&[]);
    }

    #[test]
    fn checkerboard_alternates_colors() {
        let pixels = checkerboard_pixels();
        assert_eq!(
            pixels.len(),
            (CHECKERBOARD_SIZE * CHECKERBOARD_SIZE * 4) as usize
        );
        // First two pixels of the top row differ
        assert_ne!(&pixels[0..4], &pixels[4..8]);
    }
}
