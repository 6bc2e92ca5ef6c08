//! Command pool and single-time command submission.
//!
//! This module provides a wrapper for VkCommandPool together with the
//! begin/submit pattern used for resource uploads and acceleration structure
//! builds.
//!
//! # Overview
//!
//! - [`CommandManager`] owns a transient command pool on the graphics queue
//!   and records single-time command buffers that are submitted and waited
//!   on with a fence
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use raytracer_rhi::device::Device;
//! use raytracer_rhi::command::CommandManager;
//!
//! # fn example(device: Arc<Device>) -> Result<(), raytracer_rhi::RhiError> {
//! let commands = CommandManager::new(device)?;
//!
//! let cmd = commands.begin_single_time()?;
//! // ... record transfer or build commands ...
//! commands.end_single_time(cmd)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::device::Device;
use crate::error::RhiResult;

/// Fence wait timeout for single-time submissions, in nanoseconds.
const SUBMIT_TIMEOUT_NS: u64 = 10_000_000_000;

/// Command pool and single-time submission helper for the graphics queue.
///
/// Uploads and acceleration structure builds are recorded into short-lived
/// command buffers that are submitted once and waited on before returning.
///
/// # Thread Safety
///
/// Command pools are not thread-safe. For multi-threaded command recording,
/// create a separate manager per thread.
pub struct CommandManager {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Transient command pool for short-lived command buffers.
    pool: vk::CommandPool,
    /// Queue family index this pool belongs to.
    queue_family_index: u32,
}

impl CommandManager {
    /// Creates a new command manager on the graphics queue family.
    ///
    /// The pool is created with the `TRANSIENT` flag since every command
    /// buffer it allocates is recorded once, submitted, and freed.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let queue_family_index = device
            .queue_families()
            .graphics_family
            .expect("device was created with a graphics queue");

        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                    | vk::CommandPoolCreateFlags::TRANSIENT,
            );

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Returns the queue family index this pool belongs to.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Returns a reference to the device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Allocates and begins recording a single-time command buffer.
    ///
    /// The returned command buffer must be passed to
    /// [`end_single_time`](Self::end_single_time) once recording is done.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or begin fails.
    pub fn begin_single_time(&self) -> RhiResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let cmd = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? }[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device.handle().begin_command_buffer(cmd, &begin_info)?;
        }

        Ok(cmd)
    }

    /// Ends, submits, and waits for a single-time command buffer.
    ///
    /// The submission is fenced, so the recorded commands have fully executed
    /// by the time this function returns. The command buffer is freed
    /// afterwards.
    ///
    /// # Arguments
    ///
    /// * `cmd` - A command buffer returned by [`begin_single_time`](Self::begin_single_time)
    ///
    /// # Errors
    ///
    /// Returns an error if ending, submitting, or waiting fails.
    pub fn end_single_time(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        unsafe {
            self.device.handle().end_command_buffer(cmd)?;
        }

        let fence_info = vk::FenceCreateInfo::default();
        let fence = unsafe { self.device.handle().create_fence(&fence_info, None)? };

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        let result = unsafe {
            self.device
                .submit_graphics(&[submit_info], fence)
                .and_then(|_| {
                    self.device
                        .handle()
                        .wait_for_fences(&[fence], true, SUBMIT_TIMEOUT_NS)
                        .map_err(Into::into)
                })
        };

        unsafe {
            self.device.handle().destroy_fence(fence, None);
            self.device
                .handle()
                .free_command_buffers(self.pool, &command_buffers);
        }

        result
    }
}

impl Drop for CommandManager {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_timeout_is_finite() {
        assert!(SUBMIT_TIMEOUT_NS < u64::MAX);
        assert!(SUBMIT_TIMEOUT_NS >= 1_000_000_000);
    }
}
