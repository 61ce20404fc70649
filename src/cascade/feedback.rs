// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Ingestion of what the GPU found out about the last batch.

use super::{BatchToken, Cascade, FeedbackError, OFFSET_EPSILON};
use crate::bittricks::f32_to_flags;
use crate::probe::ProbeFlags;
use glam::Vec3;

/// Floats per updated probe in the offset feedback: offset xyz and flag bits.
pub const OFFSET_FEEDBACK_STRIDE: usize = 4;
/// Floats per ray-cache probe in the extends feedback: min xyz and max xyz.
pub const EXTENDS_FEEDBACK_STRIDE: usize = 6;

impl Cascade {
    fn check_token(&self, token: &BatchToken) -> Result<(), FeedbackError> {
        if token.cascade != self.index {
            return Err(FeedbackError::WrongCascade {
                token: token.cascade,
                cascade: self.index,
            });
        }
        if token.generation != self.generation {
            return Err(FeedbackError::StaleBatch {
                token: token.generation,
                current: self.generation,
            });
        }
        if token.update_count != self.update_probes.len() {
            return Err(FeedbackError::BatchChanged {
                what: "update",
                token: token.update_count,
                current: self.update_probes.len(),
            });
        }
        if token.ray_cache_count != self.ray_cache_probes.len() {
            return Err(FeedbackError::BatchChanged {
                what: "ray cache",
                token: token.ray_cache_count,
                current: self.ray_cache_probes.len(),
            });
        }
        Ok(())
    }

    /**
    Applies the offsets and flags the GPU computed for the update batch.

    `data` holds [OFFSET_FEEDBACK_STRIDE] floats per updated probe, in batch order.  The flags
    replace the probe's flags.  A new offset is only taken while the probe's motion is not locked
    and it differs from the current one by more than [OFFSET_EPSILON] on some axis; taking it
    invalidates the ray cache.

    Returns the number of probes whose offset changed.
    */
    pub fn update_probe_offsets(&mut self, token: &BatchToken, data: &[f32]) -> Result<usize, FeedbackError> {
        self.check_token(token)?;
        let expected = self.update_probes.len() * OFFSET_FEEDBACK_STRIDE;
        if data.len() != expected {
            return Err(FeedbackError::LengthMismatch {
                what: "offset",
                expected,
                actual: data.len(),
            });
        }

        let _interval = logwise::perfwarn_begin!("Cascade::update_probe_offsets");
        let mut moved = 0;
        for (&index, chunk) in self.update_probes.iter().zip(data.chunks_exact(OFFSET_FEEDBACK_STRIDE)) {
            let probe = self.grid.probe_mut(index);
            probe.flags = ProbeFlags::from_bits(f32_to_flags(chunk[3]));
            if !probe.motion.observe(probe.flags.disabled) {
                continue;
            }
            let offset = Vec3::new(chunk[0], chunk[1], chunk[2]);
            if !offset.abs_diff_eq(probe.offset, OFFSET_EPSILON) {
                probe.offset = offset;
                probe.flags.ray_cache_valid = false;
                probe.flags.dynamic_disable = false;
                moved += 1;
            }
        }
        self.update_has_invalid_probes_inside_view();
        logwise::trace_sync!(
            "Cascade {cascade} ingested offsets, {moved} probes moved",
            cascade = self.index,
            moved = moved
        );
        Ok(moved)
    }

    /// Applies the extends the GPU measured for the ray-cache batch, [EXTENDS_FEEDBACK_STRIDE]
    /// floats per probe in batch order.
    pub fn update_probe_extends(&mut self, token: &BatchToken, data: &[f32]) -> Result<(), FeedbackError> {
        self.check_token(token)?;
        let expected = self.ray_cache_probes.len() * EXTENDS_FEEDBACK_STRIDE;
        if data.len() != expected {
            return Err(FeedbackError::LengthMismatch {
                what: "extends",
                expected,
                actual: data.len(),
            });
        }
        for (&index, chunk) in self.ray_cache_probes.iter().zip(data.chunks_exact(EXTENDS_FEEDBACK_STRIDE)) {
            let probe = self.grid.probe_mut(index);
            probe.min_extend = Vec3::new(chunk[0], chunk[1], chunk[2]);
            probe.max_extend = Vec3::new(chunk[3], chunk[4], chunk[5]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bittricks::flags_to_f32;
    use crate::cascade::tests::{open_frustum, small_cascade};
    use crate::probe::MAX_OFFSET_MOVES;

    /// Cascade with every probe scheduled and its ray cache in the batch.
    fn scheduled() -> (Cascade, BatchToken) {
        let mut cascade = small_cascade();
        cascade.find_probes_to_update(&open_frustum(), 0);
        cascade.prepare_ray_cache_probes();
        let token = cascade.batch_token();
        (cascade, token)
    }

    fn feedback(cascade: &Cascade, offset: Vec3, flags: ProbeFlags) -> Vec<f32> {
        cascade
            .update_probes()
            .iter()
            .flat_map(|_| [offset.x, offset.y, offset.z, flags_to_f32(flags.bits())])
            .collect()
    }

    fn traced_flags() -> ProbeFlags {
        ProbeFlags {
            valid: true,
            inside_view: true,
            ray_cache_valid: true,
            near_geometry: true,
            ..Default::default()
        }
    }

    #[test]
    fn offset_feedback_moves_probes() {
        let (mut cascade, token) = scheduled();
        assert_eq!(token.update_count, 64);
        let data = feedback(&cascade, Vec3::new(0.2, 0.0, 0.0), traced_flags());
        assert_eq!(cascade.update_probe_offsets(&token, &data), Ok(64));
        for probe in cascade.probes() {
            assert_eq!(probe.offset(), Vec3::new(0.2, 0.0, 0.0));
            assert!(!probe.flags().ray_cache_valid);
            assert!(probe.flags().near_geometry);
        }
        assert!(!cascade.has_invalid_probes_inside_view());
    }

    #[test]
    fn same_offset_keeps_ray_cache() {
        let (mut cascade, token) = scheduled();
        let data = feedback(&cascade, Vec3::new(0.02, 0.0, -0.04), traced_flags());
        //within the epsilon of the zero offset
        assert_eq!(cascade.update_probe_offsets(&token, &data), Ok(0));
        assert!(cascade.probes().iter().all(|p| p.flags().ray_cache_valid));
        assert!(cascade.probes().iter().all(|p| p.offset() == Vec3::ZERO));
    }

    #[test]
    fn flickering_probe_locks() {
        let (mut cascade, token) = scheduled();
        for step in 0..MAX_OFFSET_MOVES as usize + 2 {
            let offset = if step % 2 == 0 { Vec3::X * 0.3 } else { Vec3::ZERO };
            let data = feedback(&cascade, offset, traced_flags());
            let moved = cascade.update_probe_offsets(&token, &data).unwrap();
            if step < MAX_OFFSET_MOVES as usize {
                assert_eq!(moved, 64);
            } else {
                assert_eq!(moved, 0);
            }
        }
        //offset of the last accepted observation
        assert_eq!(cascade.probe(0).offset(), Vec3::X * 0.3);
        assert!(cascade.probe(0).motion().is_locked());
    }

    #[test]
    fn disabled_probe_locks_immediately() {
        let (mut cascade, token) = scheduled();
        let disabled = ProbeFlags {
            disabled: true,
            ..traced_flags()
        };
        let data = feedback(&cascade, Vec3::Y * 0.5, disabled);
        assert_eq!(cascade.update_probe_offsets(&token, &data), Ok(64));
        let data = feedback(&cascade, Vec3::ZERO, traced_flags());
        assert_eq!(cascade.update_probe_offsets(&token, &data), Ok(0));
        assert_eq!(cascade.probe(5).offset(), Vec3::Y * 0.5);
    }

    #[test]
    fn invalid_view_flag_recomputed() {
        let (mut cascade, token) = scheduled();
        let flags = ProbeFlags {
            valid: false,
            ..traced_flags()
        };
        cascade.has_invalid_probes_inside_view = false;
        let data = feedback(&cascade, Vec3::ZERO, flags);
        cascade.update_probe_offsets(&token, &data).unwrap();
        assert!(cascade.has_invalid_probes_inside_view());
    }

    #[test]
    fn token_mismatches_are_rejected() {
        let (mut cascade, token) = scheduled();
        let data = feedback(&cascade, Vec3::ZERO, traced_flags());

        let wrong = BatchToken { cascade: 3, ..token };
        assert_eq!(
            cascade.update_probe_offsets(&wrong, &data),
            Err(FeedbackError::WrongCascade { token: 3, cascade: 0 })
        );

        cascade.find_probes_to_update(&open_frustum(), 0);
        assert_eq!(
            cascade.update_probe_offsets(&token, &data),
            Err(FeedbackError::StaleBatch { token: 1, current: 2 })
        );
    }

    #[test]
    fn ray_cache_batch_change_is_rejected() {
        let mut cascade = small_cascade();
        cascade.find_probes_to_update(&open_frustum(), 0);
        let token = cascade.batch_token();
        cascade.prepare_ray_cache_probes();
        assert_eq!(
            cascade.update_probe_extends(&token, &vec![0.0; 64 * 6]),
            Err(FeedbackError::BatchChanged {
                what: "ray cache",
                token: 0,
                current: 64
            })
        );
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let (mut cascade, token) = scheduled();
        let before = cascade.probes().to_vec();
        assert_eq!(
            cascade.update_probe_offsets(&token, &[0.0; 12]),
            Err(FeedbackError::LengthMismatch {
                what: "offset",
                expected: 256,
                actual: 12
            })
        );
        assert_eq!(
            cascade.update_probe_extends(&token, &[0.0; 7]),
            Err(FeedbackError::LengthMismatch {
                what: "extends",
                expected: 384,
                actual: 7
            })
        );
        assert_eq!(cascade.probes(), before.as_slice());
    }

    #[test]
    fn extends_feedback_lands_on_ray_cache_probes() {
        let (mut cascade, token) = scheduled();
        let data: Vec<f32> = cascade
            .ray_cache_probes()
            .iter()
            .flat_map(|_| [-1.0, -2.0, -3.0, 1.0, 2.0, 3.0])
            .collect();
        cascade.update_probe_extends(&token, &data).unwrap();
        for probe in cascade.probes() {
            assert_eq!(probe.min_extend(), Vec3::new(-1.0, -2.0, -3.0));
            assert_eq!(probe.max_extend(), Vec3::new(1.0, 2.0, 3.0));
        }
    }
}
