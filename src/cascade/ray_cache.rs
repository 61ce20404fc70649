// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Ray-cache bookkeeping of the update batch.

use super::Cascade;

impl Cascade {
    /// Collects the probes of the update batch whose ray cache has to be rebuilt, keeping batch
    /// order.  Returns how many there are.
    pub fn prepare_ray_cache_probes(&mut self) -> usize {
        let probes = self.grid.probes();
        self.ray_cache_probes.clear();
        self.ray_cache_probes.extend(
            self.update_probes
                .iter()
                .copied()
                .filter(|&index| !probes[index as usize].flags.ray_cache_valid),
        );
        self.ray_cache_probes.len()
    }

    /// The renderer rebuilt the ray cache of every probe in [Self::ray_cache_probes].
    pub fn validated_ray_caches(&mut self) {
        for i in 0..self.ray_cache_probes.len() {
            let index = self.ray_cache_probes[i];
            self.grid.probe_mut(index).flags.ray_cache_valid = true;
        }
    }

    /// Forces every probe to rebuild its ray cache, re-enabling probes the tracer had disabled.
    pub fn invalidate_all_ray_caches(&mut self) {
        for probe in self.grid.probes_mut() {
            probe.flags.ray_cache_valid = false;
            probe.flags.disabled = false;
            probe.flags.dynamic_disable = false;
        }
        logwise::trace_sync!("Cascade {cascade} ray caches invalidated", cascade = self.index);
    }
}
