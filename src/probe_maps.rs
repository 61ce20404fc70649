// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Sizes and clear values of the probe map textures.

Every probe owns a square tile of `map size + 2` texels (one border texel per side).  Tiles of a
layer are arranged `count.x * count.y` wide and `count.z` high with one extra border texel around
the whole layer.  Each cascade gets its own layer.
*/

use crate::config::GiConfig;
use glam::{UVec3, Vec2, Vec4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeMapLayout {
    irradiance: UVec3,
    distance: UVec3,
    offset: UVec3,
}

impl ProbeMapLayout {
    pub fn new(config: &GiConfig, cascade_count: u32) -> Self {
        let count = config.probe_count.as_uvec3();
        let tiled = |tile: u32| {
            UVec3::new(tile * count.x * count.y + 2, tile * count.z + 2, cascade_count)
        };
        ProbeMapLayout {
            irradiance: tiled(config.irradiance_map_size_with_border()),
            distance: tiled(config.distance_map_size_with_border()),
            offset: UVec3::new(count.x * count.y, count.z, cascade_count),
        }
    }

    /// Width, height and layers of the RGBA irradiance texture.
    pub fn irradiance_size(&self) -> UVec3 {
        self.irradiance
    }
    /// Width, height and layers of the RG distance texture.
    pub fn distance_size(&self) -> UVec3 {
        self.distance
    }
    /// One texel per probe.
    pub fn offset_size(&self) -> UVec3 {
        self.offset
    }

    pub fn irradiance_map_scale(&self) -> Vec2 {
        Vec2::ONE / self.irradiance.truncate().as_vec2()
    }
    pub fn distance_map_scale(&self) -> Vec2 {
        Vec2::ONE / self.distance.truncate().as_vec2()
    }
}

/// Texel values written when the probe maps are cleared.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeMapClear {
    pub irradiance: Vec4,
    /// Mean distance and mean squared distance, both at the far limit.
    pub distance: Vec4,
    pub offset: Vec4,
}

impl ProbeMapClear {
    pub fn new(max_probe_distance: f32) -> Self {
        let d = max_probe_distance;
        ProbeMapClear {
            irradiance: Vec4::ZERO,
            distance: Vec4::new(d, d, d, d * d),
            offset: Vec4::ZERO,
        }
    }
}
