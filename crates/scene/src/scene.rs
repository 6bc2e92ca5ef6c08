//! Scene container.

use crate::camera::Camera;
use crate::draw::{DrawContext, RenderObject};
use crate::light::{DirectionalLight, PointLight};
use crate::material::MaterialInstance;
use crate::mesh::MeshAsset;
use crate::transform::Transform;

/// One placed mesh in the scene.
#[derive(Debug, Clone)]
pub struct SceneInstance {
    pub transform: Transform,
    /// Index into [`Scene::meshes`].
    pub mesh_id: usize,
    /// Index into [`Scene::materials`].
    pub material_id: usize,
}

/// Full scene description.
///
/// Mesh and material order is significant: geometry ids and material
/// indices are assigned by position when resources are uploaded.
#[derive(Debug, Default)]
pub struct Scene {
    pub name: String,
    pub meshes: Vec<MeshAsset>,
    pub materials: Vec<MaterialInstance>,
    pub instances: Vec<SceneInstance>,
    pub camera: Camera,
    pub directional_lights: Vec<DirectionalLight>,
    pub point_lights: Vec<PointLight>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Flattens the instance list into the draw context.
    ///
    /// Instances referencing a missing mesh or material are skipped.
    pub fn fill_draw_context(&self, ctx: &mut DrawContext) {
        ctx.clear();
        for instance in &self.instances {
            let mesh = match self.meshes.get(instance.mesh_id) {
                Some(mesh) => mesh,
                None => continue,
            };
            let material = match self.materials.get(instance.material_id) {
                Some(material) => material,
                None => continue,
            };
            ctx.objects.push(RenderObject {
                transform: instance.transform.matrix(),
                geometry_id: mesh.geometry_id,
                material_index: instance.material_id as u32,
                emission_power: material.params.emission_power(),
                primitive_count: mesh.triangle_count(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{MaterialParams, PhongParams};
    use crate::mesh::Vertex;
    use glam::{Vec3, Vec4};

    fn triangle(name: &str) -> MeshAsset {
        let vertices = vec![
            Vertex::new(Vec3::ZERO, Vec3::Z, [0.0, 0.0]),
            Vertex::new(Vec3::X, Vec3::Z, [1.0, 0.0]),
            Vertex::new(Vec3::Y, Vec3::Z, [0.0, 1.0]),
        ];
        MeshAsset::new(name, vertices, vec![0, 1, 2])
    }

    fn emissive(power: f32) -> MaterialInstance {
        let mut params = PhongParams::default();
        params.emission = Vec4::new(1.0, 1.0, 1.0, power);
        MaterialInstance::new("mat", MaterialParams::Phong(params))
    }

    #[test]
    fn fill_draw_context_flattens_instances() {
        let mut scene = Scene::new("test");
        scene.meshes.push(triangle("a"));
        scene.meshes.push(triangle("b"));
        scene.materials.push(emissive(0.0));
        scene.materials.push(emissive(3.0));
        scene.instances.push(SceneInstance {
            transform: Transform::default(),
            mesh_id: 0,
            material_id: 1,
        });
        scene.instances.push(SceneInstance {
            transform: Transform::from_translation(Vec3::X),
            mesh_id: 1,
            material_id: 0,
        });

        let mut ctx = DrawContext::default();
        scene.fill_draw_context(&mut ctx);

        assert_eq!(ctx.objects.len(), 2);
        assert_eq!(ctx.objects[0].material_index, 1);
        assert_eq!(ctx.objects[0].emission_power, 3.0);
        assert_eq!(ctx.objects[1].primitive_count, 1);
        assert_eq!(ctx.emitting_object_count(), 1);
    }

    #[test]
    fn small_scene_flattens_to_expected_counts() {
        // Three meshes, two materials, five placed instances
        let mut scene = Scene::new("small");
        for name in ["floor", "cube", "lamp"] {
            scene.meshes.push(triangle(name));
        }
        scene.materials.push(emissive(0.0));
        scene.materials.push(emissive(4.0));
        for (mesh_id, material_id) in [(0, 0), (1, 0), (1, 1), (2, 1), (2, 0)] {
            scene.instances.push(SceneInstance {
                transform: Transform::default(),
                mesh_id,
                material_id,
            });
        }

        let mut ctx = DrawContext::default();
        scene.fill_draw_context(&mut ctx);
        assert_eq!(ctx.objects.len(), 5);
        assert_eq!(ctx.emitting_object_count(), 2);
    }

    #[test]
    fn fill_draw_context_skips_dangling_references() {
        let mut scene = Scene::new("test");
        scene.meshes.push(triangle("a"));
        scene.materials.push(emissive(0.0));
        scene.instances.push(SceneInstance {
            transform: Transform::default(),
            mesh_id: 5,
            material_id: 0,
        });

        let mut ctx = DrawContext::default();
        scene.fill_draw_context(&mut ctx);
        assert!(ctx.objects.is_empty());
    }
}
