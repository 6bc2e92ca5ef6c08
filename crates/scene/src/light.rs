//! Light sources.
//!
//! Analytic lights uploaded through the scene uniform buffer. Mesh lights
//! are handled separately through the emitting instance list.

use glam::Vec3;

/// Directional light with uniform direction and no falloff.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    /// Direction the light travels, normalized by the constructor.
    pub direction: Vec3,
    /// Light color.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
            intensity,
        }
    }
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self::new(Vec3::new(-0.5, -1.0, -0.3), Vec3::ONE, 1.0)
    }
}

/// Point light with inverse-square falloff.
#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    /// World-space position.
    pub position: Vec3,
    /// Light color.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            color,
            intensity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directional_light_normalizes_direction() {
        let light = DirectionalLight::new(Vec3::new(0.0, -2.0, 0.0), Vec3::ONE, 1.0);
        assert!((light.direction.length() - 1.0).abs() < 1e-6);
    }
}
