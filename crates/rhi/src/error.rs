//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No ray-tracing capable GPU found")]
    NoSuitableGpu,

    /// Binding pool growth hit its hard cap; there is no fallback
    /// allocation strategy.
    #[error("Descriptor resources exhausted: {0}")]
    ResourceExhausted(String),

    /// Acceleration structure size query or build submission failed.
    #[error("Acceleration structure build failed: {0}")]
    AccelerationStructureBuild(String),

    /// A presentation or target resource was observed out of date mid-frame.
    /// Recoverable by skipping the frame and re-deriving dimensions.
    #[error("Resource out of date")]
    OutOfDate,

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
