//! Scene description consumed by the ray tracer.
//!
//! This crate holds the CPU side of the scene: transforms, cameras, lights,
//! mesh assets with their offsets into the shared geometry concatenation,
//! material parameter variants, and the flat draw context the renderer's
//! resource layer reads once per frame.

pub mod camera;
pub mod draw;
pub mod light;
pub mod material;
pub mod mesh;
mod scene;
pub mod transform;

pub use camera::Camera;
pub use draw::{DrawContext, RenderObject};
pub use light::{DirectionalLight, PointLight};
pub use material::{MaterialInstance, MaterialParams, MetalRoughParams, PhongParams};
pub use mesh::{GeometryOffsets, MeshAsset, Vertex};
pub use scene::{Scene, SceneInstance};
pub use transform::Transform;
