// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Anchor tracking.

use super::{Cascade, HYSTERESIS_FACTOR};
use glam::{BVec3, DVec3, IVec3};

/// Result of [Cascade::update_position].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionUpdate {
    /// Grid cells the anchor moved by.
    pub grid_offset: IVec3,
    /// Probes that scrolled out and were reset.
    pub invalidated: usize,
}

impl Cascade {
    /**
    Lattice point nearest to `position`.

    Each axis rounds half up: a remainder of exactly half the spacing moves to the next point.
    */
    pub fn closest_grid_point(&self, position: DVec3) -> DVec3 {
        let spacing = self.spacing.as_dvec3();
        let relative = position - self.lattice_offset;
        let mut result = spacing * (relative * self.spacing_inv.as_dvec3()).floor();
        let reaches_half = (relative - result).cmpge(spacing * 0.5);
        result += DVec3::select(reaches_half, spacing, DVec3::ZERO);
        result + self.lattice_offset
    }

    /**
    Moves the anchor towards `reference`.

    Axes where `reference` stays within [HYSTERESIS_FACTOR] spacings of the reference that last
    moved them are held.  Probes scrolling out of the grid are reset and marked in the clear mask;
    the extends of the others are carried along.  Moves of any number of cells are supported.

    Returns `None` if the anchor did not move.
    */
    pub fn update_position(&mut self, reference: DVec3) -> Option<PositionUpdate> {
        let mut closest = self.closest_grid_point(reference);
        if closest.abs_diff_eq(self.position, 1e-6) {
            return None;
        }

        let spacing = self.spacing.as_dvec3();
        let keep: BVec3 = (reference - self.last_ref_position)
            .abs()
            .cmplt(spacing * HYSTERESIS_FACTOR);
        if keep.all() {
            return None;
        }
        closest = DVec3::select(keep, self.position, closest);
        if closest == self.position {
            return None;
        }

        let _interval = logwise::perfwarn_begin!("Cascade::update_position");
        //extends move against the anchor
        let extends_offset = (closest - self.position).as_vec3();
        let grid_offset = (extends_offset * self.spacing_inv).round().as_ivec3();
        let layout = *self.grid.layout();
        let detection_box = self.detection_box;

        let mut scrolled_out = Vec::new();
        for (i, probe) in self.grid.probes_mut().iter_mut().enumerate() {
            if layout.contains(probe.shifted_coord - grid_offset) {
                probe.min_extend -= extends_offset;
                probe.max_extend -= extends_offset;
            } else {
                probe.reset(detection_box);
                scrolled_out.push(i);
            }
        }
        if !scrolled_out.is_empty() {
            self.has_invalid_probes_inside_view = true;
        }
        for &i in &scrolled_out {
            self.mark_clear_probe(i);
        }

        self.position = closest;
        self.last_ref_position = DVec3::select(keep, self.last_ref_position, reference);
        let shift = self.grid.shift() - grid_offset;
        self.grid.reshift(shift);

        logwise::trace_sync!(
            "Cascade {cascade} moved by {offset}, {invalidated} probes scrolled out",
            cascade = self.index,
            offset = logwise::privacy::LogIt(&grid_offset),
            invalidated = scrolled_out.len()
        );
        Some(PositionUpdate {
            grid_offset,
            invalidated: scrolled_out.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::tests::small_cascade;
    use crate::probe::ProbeFlags;
    use glam::Vec3;

    #[test]
    fn closest_point_rounds_half_up() {
        let cascade = small_cascade();
        assert_eq!(cascade.closest_grid_point(DVec3::new(0.9, 0.0, 0.0)), DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(cascade.closest_grid_point(DVec3::new(0.5, 0.49, -0.5)), DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(cascade.closest_grid_point(DVec3::new(-1.6, 2.2, 7.0)), DVec3::new(-2.0, 2.0, 7.0));
    }

    #[test]
    fn move_one_cell_in_x() {
        let mut cascade = small_cascade();
        let old_shift = cascade.grid_coord_shift();
        for probe in cascade.grid.probes_mut() {
            probe.flags.valid = true;
        }

        let update = cascade.update_position(DVec3::new(0.9, 0.0, 0.0)).unwrap();
        assert_eq!(update.grid_offset, IVec3::X);
        assert_eq!(update.invalidated, 16);
        assert_eq!(cascade.position(), DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(cascade.grid_coord_shift().x, (old_shift.x - 1 + 4) % 4);

        let invalid: Vec<_> = cascade.probes().iter().filter(|p| !p.flags().valid).collect();
        assert_eq!(invalid.len(), 16);
        for probe in &invalid {
            //scrolled out probes reappear on the leading edge
            assert_eq!(probe.shifted_coord().x, 3);
            assert_eq!(probe.min_extend(), -cascade.detection_box());
            assert!(crate::bittricks::is_bit_set(cascade.clear_probes(), probe.index() as usize));
        }
        assert!(cascade.has_clear_probes());
        assert!(cascade.has_invalid_probes_inside_view());

        let count = cascade.grid().layout().probe_count();
        for probe in cascade.probes() {
            assert_eq!(probe.shifted_coord(), (probe.coord() + cascade.grid_coord_shift()) % count);
        }
    }

    #[test]
    fn surviving_extends_follow_the_anchor() {
        let mut cascade = small_cascade();
        let survivor = cascade
            .probes()
            .iter()
            .position(|p| p.shifted_coord().x == 2)
            .unwrap();
        cascade.grid.probes_mut()[survivor].min_extend = Vec3::splat(-1.0);
        cascade.grid.probes_mut()[survivor].max_extend = Vec3::splat(1.0);
        cascade.update_position(DVec3::new(0.9, 0.0, 0.0)).unwrap();
        let probe = &cascade.probes()[survivor];
        assert_eq!(probe.min_extend(), Vec3::new(-2.0, -1.0, -1.0));
        assert_eq!(probe.max_extend(), Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(probe.shifted_coord().x, 1);
    }

    #[test]
    fn repeated_reference_is_a_no_op() {
        let mut cascade = small_cascade();
        let reference = DVec3::new(2.7, -1.2, 0.3);
        assert!(cascade.update_position(reference).is_some());
        let probes = cascade.probes().to_vec();
        let shift = cascade.grid_coord_shift();
        assert!(cascade.update_position(reference).is_none());
        assert_eq!(cascade.probes(), probes.as_slice());
        assert_eq!(cascade.grid_coord_shift(), shift);
    }

    #[test]
    fn hysteresis_holds_small_oscillation() {
        let mut cascade = small_cascade();
        cascade.update_position(DVec3::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(cascade.position().x, 1.0);
        //each step stays within 79% of the spacing from the triggering reference
        for x in [0.45, 1.6, 0.3, 1.79, 0.21] {
            cascade.update_position(DVec3::new(x, 0.0, 0.0));
            assert_eq!(cascade.position().x, 1.0);
        }
        cascade.update_position(DVec3::new(1.85, 0.0, 0.0)).unwrap();
        assert_eq!(cascade.position().x, 2.0);
    }

    #[test]
    fn held_axes_stay_put() {
        let mut cascade = small_cascade();
        let update = cascade.update_position(DVec3::new(0.6, 0.9, 2.1)).unwrap();
        //y and z moved past the hysteresis band, x did not
        assert_eq!(cascade.position(), DVec3::new(0.0, 1.0, 2.0));
        assert_eq!(update.grid_offset, IVec3::new(0, 1, 2));
        assert_eq!(cascade.last_ref_position(), DVec3::new(0.0, 0.9, 2.1));
    }

    #[test]
    fn held_axes_do_not_count_as_a_move() {
        let mut cascade = small_cascade();
        cascade.last_ref_position = DVec3::new(0.0, -1.0, 0.0);
        //x snaps to the next point but is held, y is released but snaps back to the anchor
        let reference = DVec3::new(0.6, 0.0, 0.0);
        assert_eq!(cascade.closest_grid_point(reference), DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(cascade.update_position(reference), None);
        assert_eq!(cascade.position(), DVec3::ZERO);
        assert!(!cascade.has_clear_probes());
    }

    #[test]
    fn teleport_resets_everything() {
        let mut cascade = small_cascade();
        for probe in cascade.grid.probes_mut() {
            probe.flags = ProbeFlags {
                valid: true,
                ray_cache_valid: true,
                ..Default::default()
            };
        }
        let update = cascade.update_position(DVec3::new(100.0, -40.0, 13.0)).unwrap();
        assert_eq!(update.invalidated, 64);
        assert!(cascade.probes().iter().all(|p| p.flags() == ProbeFlags::default()));
        let shift = cascade.grid_coord_shift();
        assert!(shift.cmpge(IVec3::ZERO).all() && shift.cmplt(IVec3::splat(4)).all());
    }
}
