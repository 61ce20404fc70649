// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Per-frame budgets of the probe scheduler, seen from outside the crate.

use gi_cascades::bittricks::flags_to_f32;
use gi_cascades::cascade::{Cascade, DEFAULT_MAX_DETECTION_RANGE, UpdateTier};
use gi_cascades::frustum::{Frustum, Plane};
use gi_cascades::glam::{IVec3, Vec3};
use gi_cascades::grid::GridLayout;
use gi_cascades::probe::{ProbeFlags, ProbeIndex};
use std::collections::HashSet;

fn open_frustum() -> Frustum {
    let plane = Plane::new(Vec3::Y, f64::NEG_INFINITY);
    Frustum::new(plane, plane, plane, plane, plane, plane)
}

/// 8x8x8 probes at unit spacing.
fn cascade() -> Cascade {
    Cascade::new(
        0,
        GridLayout::new(IVec3::splat(8)),
        Vec3::ONE,
        Vec3::ZERO,
        DEFAULT_MAX_DETECTION_RANGE,
    )
}

/// Runs the initial full update and reports `flags` back for every probe.
fn settled(flags: ProbeFlags) -> Cascade {
    let mut cascade = cascade();
    let report = cascade.find_probes_to_update(&open_frustum(), 0);
    assert!(report.full_update_inside_view);
    let token = cascade.batch_token();
    let lane = flags_to_f32(flags.bits());
    let data: Vec<f32> = cascade
        .update_probes()
        .iter()
        .flat_map(|_| [0.0, 0.0, 0.0, lane])
        .collect();
    cascade.update_probe_offsets(&token, &data).unwrap();
    cascade
}

fn cached() -> ProbeFlags {
    ProbeFlags {
        valid: true,
        ray_cache_valid: true,
        ..Default::default()
    }
}

#[test]
fn full_update_ignores_the_budget() {
    let mut cascade = cascade();
    let report = cascade.find_probes_to_update(&open_frustum(), 0);
    assert_eq!(report.update_count, 512);
    assert_eq!(report.selected_by(UpdateTier::InsideView), 512);
    assert!(!cascade.requires_full_update_inside_view());
}

#[test]
fn invalid_probes_inside_view_ignore_the_budget() {
    let mut cascade = cascade();
    cascade.set_requires_full_update_inside_view(false);
    let report = cascade.find_probes_to_update(&open_frustum(), 0);
    assert!(!report.full_update_inside_view);
    assert_eq!(report.selected_by(UpdateTier::InvalidInsideView), 512);
    assert_eq!(report.update_count, 512);
}

#[test]
fn cheap_updates_take_most_of_the_budget() {
    let mut cascade = settled(cached());
    let report = cascade.find_probes_to_update(&open_frustum(), 100);
    assert_eq!(report.selected_by(UpdateTier::CheapInsideView), 80);
    assert_eq!(report.selected_by(UpdateTier::CheapOutsideView), 0);
    assert_eq!(report.update_count, 80);
    //nothing to rebuild for cheap probes
    assert_eq!(cascade.prepare_ray_cache_probes(), 0);
}

#[test]
fn expensive_updates_take_half_the_budget() {
    let stale = ProbeFlags {
        valid: true,
        ..Default::default()
    };
    let mut cascade = settled(stale);
    cascade.set_fill_up_with_expensive_probes(true);
    let report = cascade.find_probes_to_update(&open_frustum(), 100);
    //80% of half the budget, the rest is reserved for probes outside the view
    assert_eq!(report.selected_by(UpdateTier::ExpensiveInsideView), 40);
    assert_eq!(report.selected_by(UpdateTier::InvalidAnywhere), 0);
    assert_eq!(report.update_count, 40);
    assert_eq!(cascade.prepare_ray_cache_probes(), 40);
}

#[test]
fn disabled_probes_are_skipped() {
    let disabled = ProbeFlags {
        disabled: true,
        ..cached()
    };
    let mut cascade = settled(disabled);
    let report = cascade.find_probes_to_update(&open_frustum(), 2048);
    assert_eq!(report.update_count, 0);
}

#[test]
fn aged_list_visits_every_probe() {
    let mut cascade = settled(cached());
    let mut seen: HashSet<ProbeIndex> = HashSet::new();
    for frame in 0..7 {
        cascade.find_probes_to_update(&open_frustum(), 100);
        let batch = cascade.update_probes();
        assert_eq!(batch.len(), 80);
        if frame < 6 {
            //no probe is picked twice before all others had their turn
            assert!(batch.iter().all(|index| !seen.contains(index)));
        }
        seen.extend(batch.iter().copied());
    }
    assert_eq!(seen.len(), 512);
}
