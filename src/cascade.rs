// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
One level of the probe hierarchy.

A [Cascade] owns a wrapped [ProbeGrid] that scrolls along with a reference point (usually the
camera).  Each frame the owning [crate::state::GiState] runs one cascade through:

1. [Cascade::update_position]: snap the anchor to the lattice, invalidate probes that scrolled out.
2. [Cascade::find_probes_to_update]: classify probes against the view and pick the batch.
3. [Cascade::prepare_ray_cache_probes]: the part of the batch whose ray cache is rebuilt.
4. Export through the `write_*` family; the renderer traces the batch.
5. [Cascade::update_probe_offsets] / [Cascade::update_probe_extends]: ingest what the GPU found.

Scene edits ([Cascade::invalidate_area], [Cascade::touch_dynamic_area]) may arrive any time
between frames.

# Spaces

World space uses `f64`.  Cascade space is world space translated by the cascade position
and uses `f32`; probe positions, offsets and extends are all in cascade space.
*/

mod export;
mod feedback;
mod invalidation;
mod positioner;
mod ray_cache;
mod scheduler;

pub use export::{BvhInfo, ExportParameters, MaterialInfo};
pub use feedback::{EXTENDS_FEEDBACK_STRIDE, OFFSET_FEEDBACK_STRIDE};
pub use positioner::PositionUpdate;
pub use scheduler::{PassReport, ScheduleReport, UpdateTier};

use crate::bittricks;
use crate::grid::{GridLayout, ProbeGrid};
use crate::probe::{Probe, ProbeIndex};
use glam::{DVec3, IVec3, Vec3};
use scheduler::AgedProbes;

/// Hard cap of probes per update batch.
pub const MAX_UPDATE_PROBES: usize = 2048;

/// Default reach of geometry detection beyond the probe field.
pub const DEFAULT_MAX_DETECTION_RANGE: f32 = 50.0;

/// Fraction of the spacing the reference point has to travel before an axis moves.
pub const HYSTERESIS_FACTOR: f64 = 0.8;

/// Offsets closer than this per axis count as unchanged.
pub const OFFSET_EPSILON: f32 = 0.05;

const STATIC_HALF_ENLARGE: f32 = 0.05;

/**
Identifies the batch a feedback array belongs to.

Handed out when a batch is exported and checked again on ingestion.  Feedback is only accepted
by the cascade and generation that produced the token.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchToken {
    pub cascade: usize,
    pub generation: u64,
    pub update_count: usize,
    pub ray_cache_count: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum FeedbackError {
    #[error("Feedback for cascade {token} handed to cascade {cascade}")]
    WrongCascade { token: usize, cascade: usize },
    #[error("Feedback of batch generation {token} but cascade is at generation {current}")]
    StaleBatch { token: u64, current: u64 },
    #[error("Batch changed since export: {what} count {token} at export, {current} now")]
    BatchChanged {
        what: &'static str,
        token: usize,
        current: usize,
    },
    #[error("Expected {expected} floats of {what} feedback, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Cascade {
    index: usize,
    lattice_offset: DVec3,
    spacing: Vec3,
    spacing_inv: Vec3,
    field_size: Vec3,
    field_origin: Vec3,
    dynamic_half_enlarge: Vec3,
    static_half_enlarge: Vec3,
    detection_box: Vec3,
    max_probe_distance: f32,
    fill_up_with_expensive_probes: bool,
    sky_shadow_cascade: usize,

    position: DVec3,
    last_ref_position: DVec3,
    grid: ProbeGrid,
    aged: AgedProbes,

    has_invalid_probes_inside_view: bool,
    requires_full_update_inside_view: bool,
    clear_probes: Vec<u32>,
    has_clear_probes: bool,

    update_probes: Vec<ProbeIndex>,
    ray_cache_probes: Vec<ProbeIndex>,
    generation: u64,
}

impl Cascade {
    /**
    Creates a cascade with every probe unconfirmed.

    `lattice_offset` shifts the lattice the anchor snaps to; the anchor starts there.
    The cascade starts out requiring a full update of the probes inside the view.

    # Panics
    Panics if `layout` holds more probes than a [ProbeIndex] can address.
    */
    pub fn new(index: usize, layout: GridLayout, spacing: Vec3, lattice_offset: Vec3, max_detection_range: f32) -> Self {
        debug_assert!(spacing.cmpgt(Vec3::ZERO).all(), "Probe spacing must be positive");
        let field_size = spacing * layout.coord_clamp().as_vec3();
        let field_origin = field_size * -0.5;
        let detection_box = field_size * 0.5 + Vec3::splat(max_detection_range);
        let grid = ProbeGrid::new(layout, spacing, field_origin, detection_box);
        let probe_count = layout.real_probe_count();
        let lattice_offset = lattice_offset.as_dvec3();
        Cascade {
            index,
            lattice_offset,
            spacing,
            spacing_inv: Vec3::ONE / spacing,
            field_size,
            field_origin,
            dynamic_half_enlarge: spacing * 1.9 * 0.5,
            static_half_enlarge: Vec3::splat(STATIC_HALF_ENLARGE),
            detection_box,
            max_probe_distance: spacing.length() * 1.5,
            fill_up_with_expensive_probes: false,
            sky_shadow_cascade: index,
            position: lattice_offset,
            last_ref_position: lattice_offset,
            grid,
            aged: AgedProbes::new(probe_count),
            has_invalid_probes_inside_view: true,
            requires_full_update_inside_view: true,
            clear_probes: vec![0; bittricks::words_for_bits(probe_count)],
            has_clear_probes: false,
            update_probes: Vec::with_capacity(MAX_UPDATE_PROBES),
            ray_cache_probes: Vec::with_capacity(MAX_UPDATE_PROBES),
            generation: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }
    pub fn field_size(&self) -> Vec3 {
        self.field_size
    }
    pub fn field_origin(&self) -> Vec3 {
        self.field_origin
    }
    pub fn detection_box(&self) -> Vec3 {
        self.detection_box
    }
    pub fn dynamic_half_enlarge(&self) -> Vec3 {
        self.dynamic_half_enlarge
    }
    pub fn max_probe_distance(&self) -> f32 {
        self.max_probe_distance
    }
    /// Anchor in world space, always on the lattice.
    pub fn position(&self) -> DVec3 {
        self.position
    }
    /// Reference position of the last anchor move, per axis.
    pub fn last_ref_position(&self) -> DVec3 {
        self.last_ref_position
    }
    pub fn grid_coord_shift(&self) -> IVec3 {
        self.grid.shift()
    }
    pub fn grid(&self) -> &ProbeGrid {
        &self.grid
    }
    pub fn probes(&self) -> &[Probe] {
        self.grid.probes()
    }
    pub fn probe(&self, index: ProbeIndex) -> &Probe {
        self.grid.probe(index)
    }

    pub fn fill_up_with_expensive_probes(&self) -> bool {
        self.fill_up_with_expensive_probes
    }
    /// Spend unused slots of a batch on invalid probes regardless of the view.
    pub fn set_fill_up_with_expensive_probes(&mut self, fill_up: bool) {
        self.fill_up_with_expensive_probes = fill_up;
    }
    /// Cascade whose sky shadow map this cascade uses.
    pub fn sky_shadow_cascade(&self) -> usize {
        self.sky_shadow_cascade
    }
    pub fn set_sky_shadow_cascade(&mut self, cascade: usize) {
        self.sky_shadow_cascade = cascade;
    }

    pub fn has_invalid_probes_inside_view(&self) -> bool {
        self.has_invalid_probes_inside_view
    }
    pub fn requires_full_update_inside_view(&self) -> bool {
        self.requires_full_update_inside_view
    }
    /// The next scheduling pass updates every probe inside the view, ignoring the budget.
    pub fn set_requires_full_update_inside_view(&mut self, requires: bool) {
        self.requires_full_update_inside_view = requires;
    }

    /// Probes selected by the last scheduling pass, in export order.
    pub fn update_probes(&self) -> &[ProbeIndex] {
        &self.update_probes
    }
    /// Subset of [Self::update_probes] whose ray cache is rebuilt, in export order.
    pub fn ray_cache_probes(&self) -> &[ProbeIndex] {
        &self.ray_cache_probes
    }
    /// Number of scheduling passes run so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
    pub fn batch_token(&self) -> BatchToken {
        BatchToken {
            cascade: self.index,
            generation: self.generation,
            update_count: self.update_probes.len(),
            ray_cache_count: self.ray_cache_probes.len(),
        }
    }

    /// One bit per probe index, set for probes whose GPU maps have to be cleared.
    pub fn clear_probes(&self) -> &[u32] {
        &self.clear_probes
    }
    pub fn has_clear_probes(&self) -> bool {
        self.has_clear_probes
    }
    pub fn clear_clear_probes(&mut self) {
        self.clear_probes.fill(0);
        self.has_clear_probes = false;
    }
    pub(crate) fn mark_clear_probe(&mut self, index: usize) {
        bittricks::set_bit(&mut self.clear_probes, index);
        self.has_clear_probes = true;
    }

    /// Grid coordinate nearest to a world position, relative to the current anchor.
    pub fn world_to_grid(&self, position: DVec3) -> IVec3 {
        ((position - self.position - self.field_origin.as_dvec3()) * self.spacing_inv.as_dvec3())
            .round()
            .as_ivec3()
    }

    pub fn grid_to_world(&self, grid: IVec3) -> DVec3 {
        self.position + self.field_origin.as_dvec3() + grid.as_dvec3() * self.spacing.as_dvec3()
    }

    pub fn grid_to_local(&self, grid: IVec3) -> Vec3 {
        self.grid.grid_to_local(grid)
    }

    pub(crate) fn update_has_invalid_probes_inside_view(&mut self) {
        self.has_invalid_probes_inside_view = self
            .grid
            .probes()
            .iter()
            .any(|probe| probe.flags.is_invalid_inside_view());
    }
}
