// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Layout of the ray cache texture.
//!
//! The cache stores the hit distances of every ray of every probe: one layer per cascade,
//! [RayCacheLayout::PROBES_PER_ROW] probes per row, `rays_per_probe` texels per probe.

use glam::{UVec3, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayCacheLayout {
    rays_per_probe: u32,
    probe_count: u32,
    layer_count: u32,
}

impl RayCacheLayout {
    pub const PROBES_PER_ROW: u32 = 64;

    pub fn new(rays_per_probe: u32, probe_count: u32, layer_count: u32) -> Self {
        RayCacheLayout {
            rays_per_probe,
            probe_count,
            layer_count,
        }
    }

    pub fn rays_per_probe(&self) -> u32 {
        self.rays_per_probe
    }
    pub fn probe_count(&self) -> u32 {
        self.probe_count
    }
    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    /// Returns `true` if the ray count changed; cached rays are stale in that case.
    pub fn set_rays_per_probe(&mut self, rays_per_probe: u32) -> bool {
        if rays_per_probe == self.rays_per_probe {
            return false;
        }
        self.rays_per_probe = rays_per_probe;
        true
    }

    /// Texture size as width, height, layers.
    pub fn texture_size(&self) -> UVec3 {
        UVec3::new(
            Self::PROBES_PER_ROW * self.rays_per_probe,
            self.probe_count.div_ceil(Self::PROBES_PER_ROW).max(1),
            self.layer_count,
        )
    }

    /// Reciprocal of the texture width and height.
    pub fn ray_map_scale(&self) -> Vec2 {
        let size = self.texture_size();
        Vec2::new(1.0 / size.x as f32, 1.0 / size.y as f32)
    }
}
