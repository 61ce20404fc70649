// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Probe records and their per-probe state.
//!
//! A [Probe] is one irradiance sample point of a cascade.  Probes live in a single contiguous
//! array owned by the cascade and are addressed by [ProbeIndex]; they are never created or
//! destroyed after the cascade is built, only reset.
//!
//! Probe status is held in [ProbeFlags], a set of named booleans.  The GPU sees the same state
//! packed into one byte (see [ProbeFlags::bits]), which is why every flag has a fixed bit.

use glam::{IVec3, Vec3};

/// Index of a probe inside its cascade.
///
/// Probe indices are uploaded to the GPU as 16-bit values, so a cascade holds at most
/// `u16::MAX + 1` probes.
pub type ProbeIndex = u16;

/// Number of observed offset updates after which a probe's offset is frozen.
///
/// Empirical value.  Some probes alternate between two offsets for reasons that are not
/// understood; freezing them bounds the damage to ray-cache churn.
pub const MAX_OFFSET_MOVES: u8 = 5;

/// Status of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeFlags {
    /// The GPU blends new samples with the probe's history instead of replacing it.
    pub smooth_update: bool,
    /// The tracer found the probe inside geometry.
    pub disabled: bool,
    /// Static geometry lies within the probe's reach.
    pub near_geometry: bool,
    /// The probe has been scheduled for at least one update since it was last invalidated.
    pub valid: bool,
    /// The cached ray hit distances of this probe can be reused.
    pub ray_cache_valid: bool,
    /// The probe was inside the view frustum at the last classification.
    pub inside_view: bool,
    /// The tracer found no dynamic geometry near the probe; cheap refreshes are pointless
    /// until something dynamic touches it again.
    pub dynamic_disable: bool,
}

impl ProbeFlags {
    pub const SMOOTH_UPDATE: u8 = 0x01;
    pub const DISABLED: u8 = 0x02;
    pub const NEAR_GEOMETRY: u8 = 0x04;
    pub const VALID: u8 = 0x08;
    pub const RAY_CACHE_VALID: u8 = 0x10;
    pub const INSIDE_VIEW: u8 = 0x20;
    pub const DYNAMIC_DISABLE: u8 = 0x40;

    pub const fn from_bits(bits: u8) -> Self {
        Self {
            smooth_update: bits & Self::SMOOTH_UPDATE != 0,
            disabled: bits & Self::DISABLED != 0,
            near_geometry: bits & Self::NEAR_GEOMETRY != 0,
            valid: bits & Self::VALID != 0,
            ray_cache_valid: bits & Self::RAY_CACHE_VALID != 0,
            inside_view: bits & Self::INSIDE_VIEW != 0,
            dynamic_disable: bits & Self::DYNAMIC_DISABLE != 0,
        }
    }

    pub const fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.smooth_update {
            bits |= Self::SMOOTH_UPDATE;
        }
        if self.disabled {
            bits |= Self::DISABLED;
        }
        if self.near_geometry {
            bits |= Self::NEAR_GEOMETRY;
        }
        if self.valid {
            bits |= Self::VALID;
        }
        if self.ray_cache_valid {
            bits |= Self::RAY_CACHE_VALID;
        }
        if self.inside_view {
            bits |= Self::INSIDE_VIEW;
        }
        if self.dynamic_disable {
            bits |= Self::DYNAMIC_DISABLE;
        }
        bits
    }

    /// Neither disabled by the tracer nor parked until dynamic geometry shows up.
    pub const fn is_enabled(&self) -> bool {
        !self.disabled && !self.dynamic_disable
    }

    /// The probe needs a full trace, rebuilding its ray cache.
    pub const fn is_eligible_for_expensive_update(&self) -> bool {
        self.is_enabled() && !self.ray_cache_valid
    }

    /// The probe only needs a dynamic-geometry refresh on top of its cached rays.
    pub const fn is_eligible_for_cheap_update(&self) -> bool {
        self.is_enabled() && self.valid && self.ray_cache_valid
    }

    pub const fn is_invalid_inside_view(&self) -> bool {
        !self.valid && self.inside_view
    }

    pub(crate) fn clear_geometry_state(&mut self) {
        self.disabled = false;
        self.near_geometry = false;
        self.ray_cache_valid = false;
        self.dynamic_disable = false;
    }
}

/**
Flicker lock of a probe's offset.

Every feedback observation moves a tracking probe one step closer to [OffsetMotion::Locked].
Once locked, further offsets reported by the GPU are ignored until the probe is invalidated.
A probe the tracer reports as disabled locks immediately.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetMotion {
    Tracking { moves: u8 },
    Locked,
}

impl Default for OffsetMotion {
    fn default() -> Self {
        OffsetMotion::Tracking { moves: 0 }
    }
}

impl OffsetMotion {
    pub const fn moves(&self) -> u8 {
        match self {
            OffsetMotion::Tracking { moves } => *moves,
            OffsetMotion::Locked => MAX_OFFSET_MOVES,
        }
    }

    pub const fn is_locked(&self) -> bool {
        matches!(self, OffsetMotion::Locked)
    }

    /**
    Records one offset observation.

    Returns `true` if the observed offset may still be applied.  The observation that saturates
    the counter is itself still applied.
    */
    pub fn observe(&mut self, disabled: bool) -> bool {
        match *self {
            OffsetMotion::Locked => false,
            OffsetMotion::Tracking { moves } => {
                let moves = moves + 1;
                *self = if disabled || moves >= MAX_OFFSET_MOVES {
                    OffsetMotion::Locked
                } else {
                    OffsetMotion::Tracking { moves }
                };
                true
            }
        }
    }

    pub fn reset(&mut self) {
        *self = OffsetMotion::default();
    }
}

/// One irradiance probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe {
    index: ProbeIndex,
    coord: IVec3,
    pub(crate) shifted_coord: IVec3,
    pub(crate) position: Vec3,
    pub(crate) offset: Vec3,
    pub(crate) flags: ProbeFlags,
    pub(crate) motion: OffsetMotion,
    pub(crate) min_extend: Vec3,
    pub(crate) max_extend: Vec3,
}

impl Probe {
    pub(crate) fn new(index: ProbeIndex, coord: IVec3, detection_box: Vec3) -> Self {
        Probe {
            index,
            coord,
            shifted_coord: coord,
            position: Vec3::ZERO,
            offset: Vec3::ZERO,
            flags: ProbeFlags::default(),
            motion: OffsetMotion::default(),
            min_extend: -detection_box,
            max_extend: detection_box,
        }
    }

    pub fn index(&self) -> ProbeIndex {
        self.index
    }
    /// Logical grid address.  Never changes.
    pub fn coord(&self) -> IVec3 {
        self.coord
    }
    /// Wrapped grid address under the cascade's current shift.
    pub fn shifted_coord(&self) -> IVec3 {
        self.shifted_coord
    }
    /// Grid-aligned position in cascade space.
    pub fn position(&self) -> Vec3 {
        self.position
    }
    pub fn offset(&self) -> Vec3 {
        self.offset
    }
    /// Position the GPU traces from.
    pub fn traced_position(&self) -> Vec3 {
        self.position + self.offset
    }
    pub fn flags(&self) -> ProbeFlags {
        self.flags
    }
    pub fn motion(&self) -> OffsetMotion {
        self.motion
    }
    pub fn min_extend(&self) -> Vec3 {
        self.min_extend
    }
    pub fn max_extend(&self) -> Vec3 {
        self.max_extend
    }

    pub(crate) fn extends_overlap(&self, min_extend: Vec3, max_extend: Vec3) -> bool {
        self.max_extend.cmpgt(min_extend).all() && self.min_extend.cmplt(max_extend).all()
    }

    ///Back to the unconfirmed state, reaching as far as the detection box.
    pub(crate) fn reset(&mut self, detection_box: Vec3) {
        self.flags = ProbeFlags::default();
        self.offset = Vec3::ZERO;
        self.motion.reset();
        self.min_extend = -detection_box;
        self.max_extend = detection_box;
    }

    ///Forgets geometry knowledge but keeps validity and extends.
    pub(crate) fn reset_geometry(&mut self) {
        self.flags.clear_geometry_state();
        self.offset = Vec3::ZERO;
        self.motion.reset();
    }
}
