//! GPU scene resource synchronization for the ray tracer.
//!
//! This crate keeps GPU-resident scene resources in sync with the CPU
//! scene: shared geometry buffers, the material buffer, acceleration
//! structures, the progressive render target, and the per-frame
//! descriptor sets that expose all of it to the ray tracing pipeline.
//!
//! # Overview
//!
//! [`SceneResources`](scene_manager::SceneResources) is the entry point.
//! Callers load a scene once, then call
//! [`update_scene`](scene_manager::SceneResources::update_scene) each
//! frame with the accumulated [`UpdateFlags`](update_flags::UpdateFlags);
//! the orchestrator performs the minimal set of uploads, rebuilds, and
//! descriptor writes the flags require.

pub mod geometry;
pub mod instance;
pub mod materials;
pub mod render_target;
pub mod scene_manager;
pub mod ubo;
pub mod update_flags;

pub use scene_manager::{SceneResources, SceneSyncError, SceneSyncResult};
pub use update_flags::UpdateFlags;

/// Number of frames that can be processed concurrently.
///
/// Every per-frame resource (uniform buffers, descriptor sets, render
/// target images) exists once per slot.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
