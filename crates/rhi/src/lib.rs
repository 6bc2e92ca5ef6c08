//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate,
//! scoped to what a ray-tracing scene synchronization layer needs:
//! - Instance and device creation with the KHR ray-tracing extension set
//! - Buffer and image management with gpu-allocator backed memory
//! - Single-time command submission
//! - Descriptor set layouts and a growable binding-pool allocator with
//!   deferred batched writes
//! - Bottom-level and top-level acceleration structure build/refit

mod error;

pub mod accel;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod sampler;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
