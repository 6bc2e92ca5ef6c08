//! Material parameters.
//!
//! Materials are a closed set of parameter block variants. Each variant is
//! a `#[repr(C)]` struct matching the layout the hit shaders read, and the
//! blocks are concatenated into one shared material buffer with each
//! instance addressing its block by material index.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// Phong parameter block.
///
/// `emission.w` carries the emission power; a non-zero power marks the
/// material as a mesh light.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PhongParams {
    /// Diffuse albedo, `w` unused.
    pub diffuse: Vec4,
    /// Specular color, `w` is the shininess exponent.
    pub specular: Vec4,
    /// Emitted radiance, `w` is the emission power.
    pub emission: Vec4,
    /// Index into the material texture array.
    pub texture_index: u32,
    pub _pad: [u32; 3],
}

impl Default for PhongParams {
    fn default() -> Self {
        Self {
            diffuse: Vec4::new(0.8, 0.8, 0.8, 0.0),
            specular: Vec4::new(0.0, 0.0, 0.0, 32.0),
            emission: Vec4::ZERO,
            texture_index: 0,
            _pad: [0; 3],
        }
    }
}

/// Metallic-roughness parameter block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MetalRoughParams {
    /// Base color, `w` unused.
    pub base_color: Vec4,
    /// Emitted radiance, `w` is the emission power.
    pub emission: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    /// Index into the material texture array.
    pub texture_index: u32,
    pub _pad: u32,
}

impl Default for MetalRoughParams {
    fn default() -> Self {
        Self {
            base_color: Vec4::new(0.8, 0.8, 0.8, 0.0),
            emission: Vec4::ZERO,
            metallic: 0.0,
            roughness: 0.5,
            texture_index: 0,
            _pad: 0,
        }
    }
}

/// Parameter block of a material instance.
///
/// The byte size differs per variant; the material buffer records each
/// block's offset when it is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialParams {
    Phong(PhongParams),
    MetalRough(MetalRoughParams),
}

impl MaterialParams {
    /// Returns the raw parameter block bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Phong(params) => bytemuck::bytes_of(params),
            Self::MetalRough(params) => bytemuck::bytes_of(params),
        }
    }

    /// Returns the emission power of the block.
    pub fn emission_power(&self) -> f32 {
        match self {
            Self::Phong(params) => params.emission.w,
            Self::MetalRough(params) => params.emission.w,
        }
    }
}

/// A named material in the scene.
#[derive(Debug, Clone)]
pub struct MaterialInstance {
    /// Debug name.
    pub name: String,
    /// Parameter block uploaded to the material buffer.
    pub params: MaterialParams,
}

impl MaterialInstance {
    pub fn new(name: impl Into<String>, params: MaterialParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Whether this material turns its instances into mesh lights.
    pub fn is_emissive(&self) -> bool {
        self.params.emission_power() > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_blocks_have_expected_sizes() {
        assert_eq!(std::mem::size_of::<PhongParams>(), 64);
        assert_eq!(std::mem::size_of::<MetalRoughParams>(), 48);
    }

    #[test]
    fn variants_serialize_to_different_lengths() {
        let phong = MaterialParams::Phong(PhongParams::default());
        let pbr = MaterialParams::MetalRough(MetalRoughParams::default());
        assert_eq!(phong.as_bytes().len(), 64);
        assert_eq!(pbr.as_bytes().len(), 48);
    }

    #[test]
    fn emission_power_reads_emission_w() {
        let mut params = PhongParams::default();
        params.emission = Vec4::new(1.0, 1.0, 1.0, 4.5);
        let material = MaterialInstance::new("lamp", MaterialParams::Phong(params));
        assert_eq!(material.params.emission_power(), 4.5);
        assert!(material.is_emissive());
    }

    #[test]
    fn default_materials_are_not_emissive() {
        let material =
            MaterialInstance::new("matte", MaterialParams::MetalRough(MetalRoughParams::default()));
        assert!(!material.is_emissive());
    }
}
