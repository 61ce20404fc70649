// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Per-frame tracing budget derived from the configuration.

use crate::config::GiConfig;
use glam::UVec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRays {
    probe_count: u32,
    rays_per_probe: u32,
    probes_per_line: u32,
}

impl TraceRays {
    /// Probes laid out side by side in one row of the sample image.
    pub const PROBES_PER_LINE: u32 = 8;

    pub fn from_config(config: &GiConfig) -> Self {
        TraceRays {
            probe_count: config.update_speed.probe_budget(),
            rays_per_probe: config.quality.rays_per_probe(),
            probes_per_line: Self::PROBES_PER_LINE,
        }
    }

    /// Regular per-frame probe budget.
    pub fn probe_count(&self) -> u32 {
        self.probe_count
    }
    pub fn rays_per_probe(&self) -> u32 {
        self.rays_per_probe
    }
    pub fn probes_per_line(&self) -> u32 {
        self.probes_per_line
    }

    /// Picks up quality or update speed changes.  Returns `true` if anything changed.
    pub fn update_from_config(&mut self, config: &GiConfig) -> bool {
        let updated = Self::from_config(config);
        if updated == *self {
            return false;
        }
        logwise::info_sync!(
            "GI trace rays changed: {probes} probes, {rays} rays per probe",
            probes = updated.probe_count,
            rays = updated.rays_per_probe
        );
        *self = updated;
        true
    }

    /**
    Size of the image the tracer writes its samples into for `update_count` probes.

    Each probe takes `rays_per_probe` texels in a row.  The image is never less than one row
    high so its reciprocal size stays finite.
    */
    pub fn sample_image_size(&self, update_count: usize) -> UVec2 {
        let rows = (update_count as u32).div_ceil(self.probes_per_line).max(1);
        UVec2::new(self.probes_per_line * self.rays_per_probe, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GiQuality, GiUpdateSpeed};

    #[test]
    fn follows_config() {
        let mut config = GiConfig::default();
        let mut trace_rays = TraceRays::from_config(&config);
        assert_eq!(trace_rays.probe_count(), 512);
        assert_eq!(trace_rays.rays_per_probe(), 64);
        assert!(!trace_rays.update_from_config(&config));

        config.quality = GiQuality::High;
        config.update_speed = GiUpdateSpeed::Low;
        assert!(trace_rays.update_from_config(&config));
        assert_eq!(trace_rays.probe_count(), 256);
        assert_eq!(trace_rays.rays_per_probe(), 128);
    }

    #[test]
    fn sample_image_rows() {
        let trace_rays = TraceRays::from_config(&GiConfig::default());
        assert_eq!(trace_rays.sample_image_size(0), UVec2::new(512, 1));
        assert_eq!(trace_rays.sample_image_size(8), UVec2::new(512, 1));
        assert_eq!(trace_rays.sample_image_size(9), UVec2::new(512, 2));
    }
}
