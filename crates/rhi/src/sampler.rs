//! Texture sampler management.
//!
//! Small wrapper over VkSampler with constructors for the filtering modes
//! used by material textures.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Texture sampler wrapper.
///
/// # Thread Safety
///
/// Samplers are immutable after creation and can be safely shared between
/// threads.
pub struct Sampler {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan sampler handle.
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates a sampler with nearest-neighbor filtering.
    ///
    /// Used for textures where interpolation would bleed between texels,
    /// such as the checkerboard error texture.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn nearest(device: Arc<Device>) -> RhiResult<Self> {
        Self::new(device, vk::Filter::NEAREST, false)
    }

    /// Creates a sampler with linear filtering.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn linear(device: Arc<Device>) -> RhiResult<Self> {
        Self::new(device, vk::Filter::LINEAR, false)
    }

    /// Creates a sampler with linear filtering and maximum anisotropy.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn anisotropic(device: Arc<Device>) -> RhiResult<Self> {
        Self::new(device, vk::Filter::LINEAR, true)
    }

    fn new(device: Arc<Device>, filter: vk::Filter, anisotropy: bool) -> RhiResult<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy {
                device.max_sampler_anisotropy()
            } else {
                1.0
            })
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .max_lod(vk::LOD_CLAMP_NONE);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };

        debug!("Created {:?} sampler (anisotropy: {})", filter, anisotropy);

        Ok(Self { device, sampler })
    }

    /// Returns the Vulkan sampler handle.
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed sampler");
    }
}
