//! Progressive render target.
//!
//! The ray generation shader accumulates radiance into one storage image
//! per frame in flight, alongside a matching RNG state texture seeded
//! from the CPU. The accumulation counter survives frames and resets when
//! any visible scene state changes.

use std::sync::Arc;

use ash::vk;
use rand::Rng;
use tracing::{debug, info};

use raytracer_rhi::command::CommandManager;
use raytracer_rhi::device::Device;
use raytracer_rhi::image::Image;
use raytracer_rhi::{RhiError, RhiResult};

use crate::MAX_FRAMES_IN_FLIGHT;

/// Accumulation image format.
const ACCUMULATION_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
/// RNG state texture format, four u32 words of xoshiro state per pixel.
const RNG_FORMAT: vk::Format = vk::Format::R32G32B32A32_UINT;
/// RNG state words per pixel.
const RNG_WORDS_PER_PIXEL: usize = 4;

/// CPU-side accumulation bookkeeping.
///
/// Kept separate from the GPU images so ring cycling and reset behavior
/// can be exercised without a device.
#[derive(Debug, Clone)]
pub struct AccumulationState {
    /// Index of the image slot used for the current frame.
    current: usize,
    /// Number of image slots in the ring.
    depth: usize,
    /// Frames accumulated since the last reset.
    accumulated_frames: u32,
    /// Samples traced per pixel each frame.
    samples_per_frame: u32,
}

impl AccumulationState {
    pub fn new(depth: usize, samples_per_frame: u32) -> Self {
        Self {
            current: 0,
            depth,
            accumulated_frames: 0,
            samples_per_frame,
        }
    }

    /// Advances to the next image slot and counts the finished frame.
    ///
    /// Returns the slot index to render into.
    pub fn next_image(&mut self) -> usize {
        self.current = (self.current + 1) % self.depth;
        self.accumulated_frames += 1;
        self.current
    }

    /// Restarts accumulation from sample zero.
    ///
    /// The ring position is kept; only the sample history is discarded.
    pub fn reset(&mut self) {
        self.accumulated_frames = 0;
    }

    /// Returns the slot index of the current frame.
    #[inline]
    pub fn current_image(&self) -> usize {
        self.current
    }

    /// Returns the number of frames accumulated since the last reset.
    #[inline]
    pub fn accumulated_frames(&self) -> u32 {
        self.accumulated_frames
    }

    /// Returns the samples traced per pixel each frame.
    #[inline]
    pub fn samples_per_frame(&self) -> u32 {
        self.samples_per_frame
    }

    /// Total samples per pixel accumulated since the last reset.
    pub fn total_sample_count(&self) -> u64 {
        u64::from(self.accumulated_frames) * u64::from(self.samples_per_frame)
    }
}

/// Storage images for progressive accumulation.
///
/// Owns [`MAX_FRAMES_IN_FLIGHT`] accumulation images kept in `GENERAL`
/// layout plus one RNG state texture per slot, seeded with CPU-generated
/// random words so every pixel starts from an independent sequence.
pub struct RenderTarget {
    device: Arc<Device>,
    /// Accumulation images, one per frame in flight.
    images: Vec<Image>,
    /// RNG state textures, one per frame in flight.
    rng_images: Vec<Image>,
    /// Current extent.
    extent: vk::Extent2D,
    /// Accumulation bookkeeping.
    state: AccumulationState,
}

impl RenderTarget {
    /// Creates the render target images for the given extent.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `commands` - Command manager used for layout transitions and seeding
    /// * `extent` - Render resolution
    /// * `samples_per_frame` - Samples traced per pixel each frame
    ///
    /// # Errors
    ///
    /// Returns an error if image creation, seeding, or submission fails.
    pub fn new(
        device: Arc<Device>,
        commands: &CommandManager,
        extent: vk::Extent2D,
        samples_per_frame: u32,
    ) -> RhiResult<Self> {
        let (images, rng_images) = Self::create_images(&device, commands, extent)?;

        info!(
            "Created render target: {}x{}, {} slots",
            extent.width,
            extent.height,
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            device,
            images,
            rng_images,
            extent,
            state: AccumulationState::new(MAX_FRAMES_IN_FLIGHT, samples_per_frame),
        })
    }

    fn create_images(
        device: &Arc<Device>,
        commands: &CommandManager,
        extent: vk::Extent2D,
    ) -> RhiResult<(Vec<Image>, Vec<Image>)> {
        let mut images = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut rng_images = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);

        let pixel_count = extent.width as usize * extent.height as usize;
        let mut rng = rand::thread_rng();

        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let image = Image::new(
                device.clone(),
                extent.width,
                extent.height,
                ACCUMULATION_FORMAT,
                vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC,
            )?;

            // Storage images must be in GENERAL layout before first use
            let cmd = commands.begin_single_time()?;
            image.transition_layout(cmd, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
            commands.end_single_time(cmd)?;

            let mut seeds: Vec<u32> = vec![0; pixel_count * RNG_WORDS_PER_PIXEL];
            rng.fill(seeds.as_mut_slice());
            let rng_image = Image::new_storage_with_data(
                device.clone(),
                commands,
                extent.width,
                extent.height,
                RNG_FORMAT,
                bytemuck::cast_slice(&seeds),
            )?;

            debug!("Created render target slot {}", slot);
            images.push(image);
            rng_images.push(rng_image);
        }

        Ok((images, rng_images))
    }

    /// Recreates all images at a new extent and resets accumulation.
    ///
    /// The caller must ensure no frame in flight still references the old
    /// images, typically by waiting for device idle first.
    ///
    /// # Errors
    ///
    /// Returns an error if image recreation fails.
    pub fn recreate(&mut self, commands: &CommandManager, extent: vk::Extent2D) -> RhiResult<()> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(
                "Render target extent must be greater than 0".to_string(),
            ));
        }

        let (images, rng_images) = Self::create_images(&self.device, commands, extent)?;
        self.images = images;
        self.rng_images = rng_images;
        self.extent = extent;
        self.state.reset();

        info!(
            "Recreated render target: {}x{}",
            extent.width, extent.height
        );
        Ok(())
    }

    /// Restarts accumulation without touching the images.
    ///
    /// Shaders overwrite rather than blend when the accumulated frame
    /// counter is zero, so no clear pass is needed.
    pub fn reset_accumulation(&mut self) {
        self.state.reset();
        debug!("Reset accumulation");
    }

    /// Advances to the next slot and returns its index.
    pub fn next_image(&mut self) -> usize {
        self.state.next_image()
    }

    /// Returns the accumulation image for a slot.
    pub fn image(&self, slot: usize) -> &Image {
        &self.images[slot]
    }

    /// Returns the RNG state texture for a slot.
    pub fn rng_image(&self, slot: usize) -> &Image {
        &self.rng_images[slot]
    }

    /// Returns the accumulation bookkeeping.
    #[inline]
    pub fn state(&self) -> &AccumulationState {
        &self.state
    }

    /// Returns the render resolution.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_image_cycles_through_slots() {
        let mut state = AccumulationState::new(2, 1);
        assert_eq!(state.current_image(), 0);
        assert_eq!(state.next_image(), 1);
        assert_eq!(state.next_image(), 0);
        assert_eq!(state.next_image(), 1);
        assert_eq!(state.accumulated_frames(), 3);
    }

    #[test]
    fn reset_clears_history_but_keeps_position() {
        let mut state = AccumulationState::new(3, 4);
        state.next_image();
        state.next_image();
        let position = state.current_image();
        state.reset();
        assert_eq!(state.accumulated_frames(), 0);
        assert_eq!(state.current_image(), position);
    }

    #[test]
    fn total_sample_count_multiplies_frames_by_samples() {
        let mut state = AccumulationState::new(2, 8);
        for _ in 0..5 {
            state.next_image();
        }
        assert_eq!(state.total_sample_count(), 40);
    }

    #[test]
    fn fresh_state_has_no_samples() {
        let state = AccumulationState::new(2, 16);
        assert_eq!(state.total_sample_count(), 0);
        assert_eq!(state.samples_per_frame(), 16);
    }
}
