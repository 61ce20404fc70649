// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Per-frame probe selection.

Probes are picked in priority tiers until the budget runs out:

| # | Tier                     | Cap                                         |
|---|--------------------------|---------------------------------------------|
| 1 | invalid, inside view     | [MAX_UPDATE_PROBES], ignores the budget     |
| 2 | expensive, inside view   | 80% of half the budget, minus tier 1        |
| 3 | invalid, outside view    | 20% of half the budget, shared with tier 4  |
| 4 | expensive, outside view  | see tier 3                                  |
| 5 | cheap, inside view       | 80% of what is left                         |
| 6 | cheap, outside view      | fills up to the budget                      |
| 7 | invalid anywhere         | optional, shares the rest with tier 6       |

"Expensive" probes need their ray cache rebuilt; "cheap" ones only refresh dynamic geometry on
top of cached rays.  Every tier except the full inside-view mode skips probes the tracer
disabled.

Candidates come from an aged list holding every probe index.  Each pass keeps unselected
entries in order at the front; selected entries go to the back once all passes are done, so the
least recently updated probes are always looked at first.
*/

use super::{Cascade, MAX_UPDATE_PROBES};
use crate::frustum::Frustum;
use crate::probe::{Probe, ProbeFlags, ProbeIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateTier {
    InvalidInsideView,
    ExpensiveInsideView,
    InvalidOutsideView,
    ExpensiveOutsideView,
    CheapInsideView,
    CheapOutsideView,
    /// Fill-up with invalid probes regardless of view.
    InvalidAnywhere,
    /// Full inside-view update; takes every probe in view.
    InsideView,
}

impl UpdateTier {
    pub const fn accepts(self, flags: ProbeFlags) -> bool {
        let expensive = flags.is_eligible_for_expensive_update();
        let cheap = flags.is_eligible_for_cheap_update();
        let inside = flags.inside_view;
        match self {
            UpdateTier::InvalidInsideView => !flags.valid && inside && expensive,
            UpdateTier::ExpensiveInsideView => flags.valid && inside && expensive,
            UpdateTier::InvalidOutsideView => !flags.valid && !inside && expensive,
            UpdateTier::ExpensiveOutsideView => flags.valid && !inside && expensive,
            UpdateTier::CheapInsideView => inside && cheap,
            UpdateTier::CheapOutsideView => !inside && cheap,
            UpdateTier::InvalidAnywhere => !flags.valid && expensive,
            UpdateTier::InsideView => inside,
        }
    }
}

/// Probes taken by one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub tier: UpdateTier,
    pub selected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleReport {
    pub full_update_inside_view: bool,
    pub passes: Vec<PassReport>,
    pub update_count: usize,
}

impl ScheduleReport {
    pub fn selected_by(&self, tier: UpdateTier) -> usize {
        self.passes
            .iter()
            .filter(|pass| pass.tier == tier)
            .map(|pass| pass.selected)
            .sum()
    }
}

/// Probe indices ordered from least to most recently updated.
#[derive(Debug, Clone)]
pub(crate) struct AgedProbes {
    order: Vec<ProbeIndex>,
    //entries past this were consumed by the current schedule
    last: usize,
}

impl AgedProbes {
    pub(crate) fn new(probe_count: usize) -> Self {
        AgedProbes {
            order: (0..probe_count).map(|i| i as ProbeIndex).collect(),
            last: probe_count,
        }
    }

    #[cfg(test)]
    pub(crate) fn order(&self) -> &[ProbeIndex] {
        &self.order
    }

    fn begin(&mut self) {
        self.last = self.order.len();
    }

    /**
    Moves probes accepted by `tier` from the candidates into `batch`.

    Stops once `remaining` hits zero or the batch holds `max` entries.  A pass that cannot take
    anything leaves the candidates untouched.
    */
    fn select(
        &mut self,
        probes: &[Probe],
        tier: UpdateTier,
        batch: &mut Vec<ProbeIndex>,
        remaining: &mut i32,
        max: usize,
    ) -> usize {
        if *remaining <= 0 || batch.len() >= max {
            return 0;
        }
        let start = batch.len();
        let end = self.last;
        let mut kept = 0;
        let mut i = 0;
        while i < end {
            let index = self.order[i];
            i += 1;
            if !tier.accepts(probes[index as usize].flags) {
                self.order[kept] = index;
                kept += 1;
                continue;
            }
            *remaining -= 1;
            batch.push(index);
            if batch.len() == max || *remaining == 0 {
                break;
            }
        }
        self.order.copy_within(i..end, kept);
        kept += end - i;
        self.last = kept;
        batch.len() - start
    }

    fn finish(&mut self, batch: &[ProbeIndex]) {
        let last = self.last;
        self.order[last..last + batch.len()].copy_from_slice(batch);
        self.last = last + batch.len();
        debug_assert_eq!(self.last, self.order.len());
    }
}

struct Passes<'a> {
    aged: &'a mut AgedProbes,
    probes: &'a [Probe],
    batch: &'a mut Vec<ProbeIndex>,
    report: Vec<PassReport>,
}

impl Passes<'_> {
    fn run(&mut self, tier: UpdateTier, remaining: &mut i32, max: usize) {
        let selected = self.aged.select(self.probes, tier, self.batch, remaining, max);
        self.report.push(PassReport { tier, selected });
        logwise::trace_sync!(
            "Update pass {tier}: {selected} probes",
            tier = logwise::privacy::LogIt(&tier),
            selected = selected
        );
    }
}

impl Cascade {
    /**
    Picks the probes to trace this frame.

    Classifies every probe against `frustum` first.  `budget` bounds the regular tiers and is
    capped at [MAX_UPDATE_PROBES]; invalid probes inside the view are taken regardless, as are
    all probes inside the view while a full inside-view update is pending.

    Starts a new batch generation and drops the ray-cache batch of the previous one.
    */
    pub fn find_probes_to_update(&mut self, frustum: &Frustum, budget: u32) -> ScheduleReport {
        let _interval = logwise::perfwarn_begin!("Cascade::find_probes_to_update");
        self.classify_inside_view(frustum);

        self.generation += 1;
        self.update_probes.clear();
        self.ray_cache_probes.clear();
        self.aged.begin();

        let full_update_inside_view = self.requires_full_update_inside_view;
        let mut passes = Passes {
            aged: &mut self.aged,
            probes: self.grid.probes(),
            batch: &mut self.update_probes,
            report: Vec::new(),
        };
        if full_update_inside_view {
            let mut remaining = MAX_UPDATE_PROBES as i32;
            passes.run(UpdateTier::InsideView, &mut remaining, MAX_UPDATE_PROBES);
        } else {
            let budget = (budget as usize).min(MAX_UPDATE_PROBES);
            schedule_regular(&mut passes, budget, self.fill_up_with_expensive_probes);
        }
        let report = passes.report;
        self.aged.finish(&self.update_probes);
        if full_update_inside_view {
            self.requires_full_update_inside_view = false;
        }

        self.mark_batch_for_update();
        logwise::trace_sync!(
            "Cascade {cascade} scheduled {count} probes (generation {generation})",
            cascade = self.index,
            count = self.update_probes.len(),
            generation = self.generation
        );
        ScheduleReport {
            full_update_inside_view,
            passes: report,
            update_count: self.update_probes.len(),
        }
    }

    fn classify_inside_view(&mut self, frustum: &Frustum) {
        let push_back = self.spacing.length() * 0.5;
        let planes = frustum
            .bounding_planes()
            .map(|plane| plane.translated(self.position, push_back));
        for probe in self.grid.probes_mut() {
            let position = probe.position.as_dvec3();
            probe.flags.inside_view = planes.iter().all(|plane| plane.contains(position));
        }
    }

    //flags change only after selection so the tiers see consistent state
    fn mark_batch_for_update(&mut self) {
        for i in 0..self.update_probes.len() {
            let probe = self.grid.probe_mut(self.update_probes[i]);
            if probe.flags.valid {
                //the first accepted move is a jump from a bad position, replace the history
                probe.flags.smooth_update = probe.motion.moves() != 1;
            } else {
                probe.offset = glam::Vec3::ZERO;
                probe.motion.reset();
                probe.flags.smooth_update = false;
                probe.flags.valid = true;
            }
            probe.flags.disabled = false;
            probe.flags.dynamic_disable = false;
        }
    }
}

fn schedule_regular(passes: &mut Passes<'_>, budget: usize, fill_up: bool) {
    let mut remaining = MAX_UPDATE_PROBES as i32;
    passes.run(UpdateTier::InvalidInsideView, &mut remaining, MAX_UPDATE_PROBES);

    let expensive = (budget as f32 * 0.5) as i32;
    let mut expensive_outside = (expensive as f32 * 0.2) as i32;
    let mut expensive_inside = expensive - expensive_outside - passes.batch.len() as i32;
    passes.run(UpdateTier::ExpensiveInsideView, &mut expensive_inside, budget);
    passes.run(UpdateTier::InvalidOutsideView, &mut expensive_outside, budget);
    passes.run(UpdateTier::ExpensiveOutsideView, &mut expensive_outside, budget);

    let cheap = budget as i32 - passes.batch.len() as i32;
    let cheap_outside = (cheap as f32 * 0.2) as i32;
    let mut cheap_inside = cheap - cheap_outside;
    passes.run(UpdateTier::CheapInsideView, &mut cheap_inside, budget);

    let mut fill = budget as i32 - passes.batch.len() as i32;
    passes.run(UpdateTier::CheapOutsideView, &mut fill, budget);
    if fill_up {
        passes.run(UpdateTier::InvalidAnywhere, &mut fill, budget);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::tests::{open_frustum, small_cascade};
    use crate::frustum::Plane;
    use glam::{DVec3, Vec3};

    /// Frustum only probes with `x > 0` pass, once pushed back by half the spacing diagonal.
    fn right_half_frustum(cascade: &Cascade) -> Frustum {
        let open = Plane::new(Vec3::X, f64::NEG_INFINITY);
        let near = Plane::new(Vec3::X, (cascade.spacing().length() * 0.5) as f64);
        Frustum::new(open, open, open, open, near, open)
    }

    fn assert_permutation(cascade: &Cascade) {
        let mut order = cascade.aged.order().to_vec();
        order.sort_unstable();
        let expected: Vec<ProbeIndex> = (0..cascade.probes().len() as ProbeIndex).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn tier_predicates() {
        let invalid_inside = ProbeFlags {
            inside_view: true,
            ..Default::default()
        };
        assert!(UpdateTier::InvalidInsideView.accepts(invalid_inside));
        assert!(UpdateTier::InvalidAnywhere.accepts(invalid_inside));
        assert!(!UpdateTier::InvalidOutsideView.accepts(invalid_inside));

        let cheap_outside = ProbeFlags {
            valid: true,
            ray_cache_valid: true,
            ..Default::default()
        };
        assert!(UpdateTier::CheapOutsideView.accepts(cheap_outside));
        assert!(!UpdateTier::ExpensiveOutsideView.accepts(cheap_outside));

        let disabled = ProbeFlags {
            inside_view: true,
            disabled: true,
            ..Default::default()
        };
        assert!(!UpdateTier::InvalidInsideView.accepts(disabled));
        assert!(UpdateTier::InsideView.accepts(disabled));
    }

    #[test]
    fn full_update_takes_every_probe_in_view() {
        let mut cascade = small_cascade();
        let frustum = right_half_frustum(&cascade);
        let report = cascade.find_probes_to_update(&frustum, 0);
        assert!(report.full_update_inside_view);
        assert_eq!(report.update_count, 32);
        assert!(!cascade.requires_full_update_inside_view());
        for &index in cascade.update_probes() {
            let probe = cascade.probe(index);
            assert!(probe.position().x > 0.0);
            assert!(probe.flags().valid);
            assert!(!probe.flags().smooth_update);
        }
        assert_permutation(&cascade);
        //selected probes moved to the back of the aged list
        assert_eq!(&cascade.aged.order()[32..], cascade.update_probes());
    }

    #[test]
    fn zero_budget_still_takes_invalid_probes_in_view() {
        let mut cascade = small_cascade();
        cascade.set_requires_full_update_inside_view(false);
        let frustum = right_half_frustum(&cascade);
        let report = cascade.find_probes_to_update(&frustum, 0);
        assert_eq!(report.update_count, 32);
        assert_eq!(report.selected_by(UpdateTier::InvalidInsideView), 32);

        //the rest is outside the view and the budget is zero
        let report = cascade.find_probes_to_update(&frustum, 0);
        assert_eq!(report.update_count, 0);
    }

    #[test]
    fn regular_tiers_respect_budget() {
        let mut cascade = small_cascade();
        cascade.set_requires_full_update_inside_view(false);
        cascade.set_fill_up_with_expensive_probes(true);
        let frustum = right_half_frustum(&cascade);
        cascade.find_probes_to_update(&frustum, 0);
        cascade.prepare_ray_cache_probes();
        cascade.validated_ray_caches();

        //32 cheap probes inside, 32 invalid outside
        let report = cascade.find_probes_to_update(&frustum, 20);
        assert!(report.update_count <= 20);
        //half of 20 is 10, of which 2 go outside
        assert_eq!(report.selected_by(UpdateTier::InvalidOutsideView), 2);
        //20 - 2 = 18 cheap left, 80% inside
        assert_eq!(report.selected_by(UpdateTier::CheapInsideView), 15);
        assert_eq!(report.selected_by(UpdateTier::CheapOutsideView), 0);
        assert_eq!(report.selected_by(UpdateTier::InvalidAnywhere), 3);
        assert_eq!(report.update_count, 20);
        assert_permutation(&cascade);
    }

    #[test]
    fn fill_up_is_optional() {
        let mut cascade = small_cascade();
        cascade.set_requires_full_update_inside_view(false);
        let report = cascade.find_probes_to_update(&right_half_frustum(&cascade), 20);
        //all 32 invalid inside go first regardless of the budget and exhaust it
        assert_eq!(report.update_count, 32);
        assert_eq!(report.selected_by(UpdateTier::InvalidOutsideView), 0);
        assert_eq!(report.selected_by(UpdateTier::InvalidAnywhere), 0);

        cascade.prepare_ray_cache_probes();
        cascade.validated_ray_caches();
        //without fill-up the unused cheap share stays unused
        let report = cascade.find_probes_to_update(&right_half_frustum(&cascade), 20);
        assert_eq!(report.selected_by(UpdateTier::InvalidOutsideView), 2);
        assert_eq!(report.selected_by(UpdateTier::CheapInsideView), 15);
        assert_eq!(report.update_count, 17);
    }

    #[test]
    fn aged_list_rotates_cheap_updates() {
        let mut cascade = small_cascade();
        let frustum = open_frustum();
        cascade.find_probes_to_update(&frustum, 0);
        cascade.prepare_ray_cache_probes();
        cascade.validated_ray_caches();

        let first = {
            cascade.find_probes_to_update(&frustum, 10);
            cascade.update_probes().to_vec()
        };
        let second = {
            cascade.find_probes_to_update(&frustum, 10);
            cascade.update_probes().to_vec()
        };
        //80% of the budget goes to cheap probes inside the view
        assert_eq!(first.len(), 8);
        assert!(first.iter().all(|index| !second.contains(index)));
        assert_permutation(&cascade);
    }

    #[test]
    fn post_process_smooth_update() {
        let mut cascade = small_cascade();
        let frustum = open_frustum();
        cascade.find_probes_to_update(&frustum, 0);
        cascade.grid.probe_mut(0).motion.observe(false);
        cascade.grid.probe_mut(1).motion.observe(false);
        cascade.grid.probe_mut(1).motion.observe(false);
        cascade.set_requires_full_update_inside_view(true);
        cascade.find_probes_to_update(&frustum, 0);
        assert!(!cascade.probe(0).flags().smooth_update);
        assert!(cascade.probe(1).flags().smooth_update);
        assert!(cascade.probe(2).flags().smooth_update);
    }

    #[test]
    fn schedule_is_classified_in_cascade_space() {
        let mut cascade = small_cascade();
        cascade.update_position(DVec3::new(10.0, 0.0, 0.0)).unwrap();
        //world x > 10 is local x > 0
        let near = Plane::new(Vec3::X, 10.0 + (cascade.spacing().length() * 0.5) as f64);
        let open = Plane::new(Vec3::X, f64::NEG_INFINITY);
        let frustum = Frustum::new(open, open, open, open, near, open);
        let report = cascade.find_probes_to_update(&frustum, 0);
        assert_eq!(report.update_count, 32);
        assert!(cascade.probes().iter().all(|p| p.flags().inside_view == (p.position().x > 0.0)));
    }
}
