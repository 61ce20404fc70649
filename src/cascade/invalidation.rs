// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Reactions to scene edits.

use super::Cascade;
use glam::{DVec3, IVec3, Vec3};

impl Cascade {
    /// Resets every probe to the unconfirmed state and forgets pending map clears.
    pub fn invalidate(&mut self) {
        let detection_box = self.detection_box;
        for probe in self.grid.probes_mut() {
            probe.reset(detection_box);
        }
        self.has_invalid_probes_inside_view = true;
        self.clear_clear_probes();
        logwise::trace_sync!("Cascade {cascade} invalidated", cascade = self.index);
    }

    /**
    Static geometry changed inside the world box `min..max`.

    Probes whose extends overlap the box lose their geometry state and get a full trace.  A soft
    invalidation leaves probes alone the tracer had disabled.  Returns the number of probes hit.
    */
    pub fn invalidate_area(&mut self, min: DVec3, max: DVec3, hard: bool) -> usize {
        let local_min = (min - self.position).as_vec3() - self.static_half_enlarge;
        let local_max = (max - self.position).as_vec3() + self.static_half_enlarge;
        if !(local_max.cmpgt(-self.detection_box).all() && local_min.cmplt(self.detection_box).all()) {
            return 0;
        }

        let _interval = logwise::perfwarn_begin!("Cascade::invalidate_area");
        let mut hit = 0;
        for probe in self.grid.probes_mut() {
            if !hard && probe.flags.disabled {
                continue;
            }
            if probe.extends_overlap(local_min, local_max) {
                probe.reset_geometry();
                hit += 1;
            }
        }
        logwise::trace_sync!(
            "Cascade {cascade} invalidated {hit} probes (hard {hard})",
            cascade = self.index,
            hit = hit,
            hard = logwise::privacy::LogIt(&hard)
        );
        hit
    }

    /**
    A dynamic object moved inside the world box `min..max`.

    Re-enables probes parked by the tracer for lack of dynamic geometry.  Only the grid cells the
    enlarged box covers are visited.  Returns the number of probes re-enabled.
    */
    pub fn touch_dynamic_area(&mut self, min: DVec3, max: DVec3) -> usize {
        let local_min = (min - self.position).as_vec3() - self.dynamic_half_enlarge;
        let local_max = (max - self.position).as_vec3() + self.dynamic_half_enlarge;
        if !(local_max.cmpgt(self.field_origin).all() && local_min.cmplt(-self.field_origin).all()) {
            return 0;
        }

        let clamp = self.grid.layout().coord_clamp();
        let cell = |local: Vec3| {
            ((local - self.field_origin) * self.spacing_inv)
                .as_ivec3()
                .clamp(IVec3::ZERO, clamp)
        };
        let from = cell(local_min);
        let to = cell(local_max);

        let mut touched = 0;
        for y in from.y..=to.y {
            for z in from.z..=to.z {
                for x in from.x..=to.x {
                    let index = self.grid.index_at_shifted(IVec3::new(x, y, z));
                    let probe = self.grid.probe_mut(index);
                    if probe.position.cmpgt(local_min).all() && probe.position.cmplt(local_max).all() {
                        if probe.flags.dynamic_disable {
                            touched += 1;
                        }
                        probe.flags.dynamic_disable = false;
                    }
                }
            }
        }
        touched
    }
}
