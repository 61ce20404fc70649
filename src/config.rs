// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Configuration of the GI state.

[GiConfig] deserializes from any serde format.  Missing fields take their defaults, and preset
names are matched loosely so `veryHigh`, `very-high` and `very_high` all parse:

```
use gi_cascades::config::{GiConfig, GiQuality};

let quality: GiQuality = "Very_High".parse().unwrap();
assert_eq!(quality, GiQuality::VeryHigh);
assert_eq!(quality.rays_per_probe(), 256);

let config = GiConfig { quality, ..GiConfig::default() };
assert!(config.validate().is_ok());
```
*/

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Number of cascades a [crate::state::GiState] builds.
pub const CASCADE_COUNT: usize = 4;

/// Upper bound of probes per cascade; probe indices are 16 bit.
pub const MAX_PROBES_PER_CASCADE: usize = 65536;

#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Probe count {0} needs at least 2 probes per axis")]
    ProbeCountTooSmall(IVec3),
    #[error("Probe count {count} exceeds 65536 probes per cascade")]
    TooManyProbes { count: usize },
    #[error("GI volume size {0} must be finite and positive")]
    InvalidSize(Vec3),
    #[error("{which} map size must be positive")]
    InvalidMapSize { which: &'static str },
    #[error("Hysteresis {0} outside 0..1")]
    InvalidHysteresis(f32),
    #[error("Irradiance gamma {0} must be positive")]
    InvalidGamma(f32),
    #[error("Detection range {0} must be finite and not negative")]
    InvalidDetectionRange(f32),
    #[error("Cascade update cycle is empty")]
    EmptyUpdateCycle,
    #[error("Cascade update cycle names cascade {entry} but only 4 exist")]
    CycleEntryOutOfRange { entry: usize },
    #[error("Unknown GI quality {0:?}")]
    UnknownQuality(String),
    #[error("Unknown GI update speed {0:?}")]
    UnknownUpdateSpeed(String),
}

fn normalize_key(value: &str) -> String {
    value
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' ' | '.'))
        .collect()
}

/// Tracing quality; decides rays per probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GiQuality {
    Off,
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl GiQuality {
    pub const fn rays_per_probe(self) -> u32 {
        match self {
            GiQuality::Off | GiQuality::VeryLow => 16,
            GiQuality::Low => 32,
            GiQuality::Medium => 64,
            GiQuality::High => 128,
            GiQuality::VeryHigh => 256,
        }
    }
}

impl FromStr for GiQuality {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match normalize_key(value).as_str() {
            "off" => Self::Off,
            "verylow" => Self::VeryLow,
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "veryhigh" => Self::VeryHigh,
            _ => return Err(ConfigError::UnknownQuality(value.to_string())),
        })
    }
}

/// How many probes may be updated per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GiUpdateSpeed {
    Off,
    VeryLow,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl GiUpdateSpeed {
    /// Regular per-frame update budget.  Invalid probes inside the view are updated regardless.
    pub const fn probe_budget(self) -> u32 {
        match self {
            GiUpdateSpeed::Off => 0,
            GiUpdateSpeed::VeryLow => 128,
            GiUpdateSpeed::Low => 256,
            GiUpdateSpeed::Medium => 512,
            GiUpdateSpeed::High => 1024,
            GiUpdateSpeed::VeryHigh => 2048,
        }
    }
}

impl FromStr for GiUpdateSpeed {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match normalize_key(value).as_str() {
            "off" => Self::Off,
            "verylow" => Self::VeryLow,
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "veryhigh" => Self::VeryHigh,
            _ => return Err(ConfigError::UnknownUpdateSpeed(value.to_string())),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GiConfig {
    /// World extent covered by the coarsest cascade.
    pub size: Vec3,
    /// Probes per axis, shared by all cascades.
    pub probe_count: IVec3,
    pub quality: GiQuality,
    pub update_speed: GiUpdateSpeed,
    pub irradiance_map_size: u32,
    pub distance_map_size: u32,
    pub depth_sharpness: f32,
    /// Weight of a probe's history when blending new samples.
    pub hysteresis: f32,
    pub irradiance_gamma: f32,
    /// Scaled by the smallest probe spacing of a cascade.
    pub self_shadow_bias: f32,
    /// How far past the probe field geometry is still detected.
    pub max_detection_range: f32,
    /// Cascade updated each frame when nothing more urgent is pending.
    pub cascade_update_cycle: Vec<usize>,
}

impl Default for GiConfig {
    fn default() -> Self {
        GiConfig {
            size: Vec3::new(256.0, 64.0, 256.0),
            probe_count: IVec3::new(32, 8, 32),
            quality: GiQuality::default(),
            update_speed: GiUpdateSpeed::default(),
            irradiance_map_size: 8,
            distance_map_size: 16,
            depth_sharpness: 50.0,
            hysteresis: 0.9,
            irradiance_gamma: 5.0,
            self_shadow_bias: 0.35,
            max_detection_range: 50.0,
            cascade_update_cycle: vec![0, 1, 2, 0, 1, 3],
        }
    }
}

impl GiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_count.cmplt(IVec3::splat(2)).any() {
            return Err(ConfigError::ProbeCountTooSmall(self.probe_count));
        }
        let count = self.probe_count.as_i64vec3().element_product() as usize;
        if count > MAX_PROBES_PER_CASCADE {
            return Err(ConfigError::TooManyProbes { count });
        }
        if !self.size.is_finite() || self.size.cmple(Vec3::ZERO).any() {
            return Err(ConfigError::InvalidSize(self.size));
        }
        if self.irradiance_map_size == 0 {
            return Err(ConfigError::InvalidMapSize { which: "Irradiance" });
        }
        if self.distance_map_size == 0 {
            return Err(ConfigError::InvalidMapSize { which: "Distance" });
        }
        if !(0.0..1.0).contains(&self.hysteresis) {
            return Err(ConfigError::InvalidHysteresis(self.hysteresis));
        }
        if !(self.irradiance_gamma > 0.0) {
            return Err(ConfigError::InvalidGamma(self.irradiance_gamma));
        }
        if !self.max_detection_range.is_finite() || self.max_detection_range < 0.0 {
            return Err(ConfigError::InvalidDetectionRange(self.max_detection_range));
        }
        if self.cascade_update_cycle.is_empty() {
            return Err(ConfigError::EmptyUpdateCycle);
        }
        if let Some(&entry) = self.cascade_update_cycle.iter().find(|&&c| c >= CASCADE_COUNT) {
            return Err(ConfigError::CycleEntryOutOfRange { entry });
        }
        Ok(())
    }

    /// Irradiance map size plus its one texel border on each side.
    pub(crate) fn irradiance_map_size_with_border(&self) -> u32 {
        self.irradiance_map_size + 2
    }
    pub(crate) fn distance_map_size_with_border(&self) -> u32 {
        self.distance_map_size + 2
    }
}
