// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The GI state of one view: four cascades updated round robin, one per frame.

A frame runs through these calls, in this order:

```text
activate_next_cascade ─▶ update ─▶ prepare_state[_ray_cache] ─▶ (trace) ─▶ validated_ray_caches
        ▲                                                                  probes_moved
        │                                                                       │
        └──────────────────── (next frame) ◀──────────────── start_read_back ◀──┘
```

[GiState::update] of the next frame ingests what the GPU wrote back for the batch exported by
the previous one.  The position in this cycle is tracked as a [FramePhase]; calls out of order
fail with [StateError::OutOfOrder] instead of silently mixing up batches.

```
use gi_cascades::config::GiConfig;
use gi_cascades::frustum::{Frustum, Plane};
use gi_cascades::glam::{DVec3, Vec3};
use gi_cascades::state::{FramePhase, GiState};

let mut state = GiState::new(GiConfig::default()).unwrap();
let open = Plane::new(Vec3::Y, f64::NEG_INFINITY);
let frustum = Frustum::new(open, open, open, open, open, open);

// a fresh state updates every probe inside the view of the largest cascade first
assert_eq!(state.activate_next_cascade().unwrap(), 3);
let report = state.update(DVec3::ZERO, &frustum, None).unwrap();
assert!(report.full_update_inside_view);
assert_eq!(state.phase(), FramePhase::Scheduled);
```
*/

use crate::buffer::{BufferError, StructuredBufferWriter};
use crate::cascade::{
    BatchToken, BvhInfo, Cascade, EXTENDS_FEEDBACK_STRIDE, ExportParameters, FeedbackError, MaterialInfo,
    OFFSET_FEEDBACK_STRIDE, ScheduleReport,
};
use crate::config::{CASCADE_COUNT, ConfigError, GiConfig, GiQuality, GiUpdateSpeed};
use crate::frustum::Frustum;
use crate::grid::GridLayout;
use crate::probe_maps::{ProbeMapClear, ProbeMapLayout};
use crate::ray_cache::RayCacheLayout;
use crate::rays::write_ray_directions;
use crate::trace_rays::TraceRays;
use glam::{DVec3, UVec2, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramePhase {
    /// No batch in flight.
    Idle,
    /// A batch is selected and may be exported.
    Scheduled,
    /// The batch was handed to the renderer.
    Exported,
    /// The renderer read the feedback back; the next [GiState::update] ingests it.
    AwaitingFeedback,
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum StateError {
    #[error("No cascade {index}, the state has {count}")]
    NoSuchCascade { index: usize, count: usize },
    #[error("{operation} is not allowed in frame phase {phase:?}")]
    OutOfOrder {
        operation: &'static str,
        phase: FramePhase,
    },
    #[error(transparent)]
    Feedback(#[from] FeedbackError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What the renderer has to read back from the GPU for the exported batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBackRequest {
    pub token: BatchToken,
    /// Probes of the update batch whose offsets to read, `0` to skip.
    pub offset_probes: usize,
    /// Probes of the ray-cache batch whose extends to read, `0` to skip.
    pub extend_probes: usize,
}

impl ReadBackRequest {
    pub fn offset_floats(&self) -> usize {
        self.offset_probes * OFFSET_FEEDBACK_STRIDE
    }
    pub fn extend_floats(&self) -> usize {
        self.extend_probes * EXTENDS_FEEDBACK_STRIDE
    }
}

/// Read-back GPU buffers, mapped for the CPU.
pub trait ProbeFeedback {
    fn probe_offsets(&self) -> Option<&[f32]>;
    fn probe_extends(&self) -> Option<&[f32]>;
}

/// Owned feedback data.  Buffers may be longer than requested; excess floats are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackBuffers {
    pub offsets: Vec<f32>,
    pub extends: Vec<f32>,
}

impl ProbeFeedback for FeedbackBuffers {
    fn probe_offsets(&self) -> Option<&[f32]> {
        Some(&self.offsets)
    }
    fn probe_extends(&self) -> Option<&[f32]> {
        Some(&self.extends)
    }
}

/// Destinations of one export pass.
pub struct StateWriters<'a> {
    pub parameters: &'a mut dyn StructuredBufferWriter,
    pub ray_directions: &'a mut dyn StructuredBufferWriter,
    pub probe_indices: &'a mut dyn StructuredBufferWriter,
    pub probe_positions: &'a mut dyn StructuredBufferWriter,
}

#[derive(Debug)]
pub struct GiState {
    config: GiConfig,
    cascades: Vec<Cascade>,
    active_cascade: usize,
    last_cascade: usize,
    cycle_index: usize,
    tone_map_adaption_count: usize,

    trace_rays: TraceRays,
    ray_cache: RayCacheLayout,
    probe_maps: ProbeMapLayout,
    sample_image_size: UVec2,

    static_bvh: BvhInfo,
    dynamic_bvh: BvhInfo,
    static_bvh_dirty: bool,
    dynamic_bvh_dirty: bool,
    materials: MaterialInfo,

    clear_maps: bool,
    probes_have_moved: bool,
    extends_changed: bool,
    phase: FramePhase,
    pending: Option<ReadBackRequest>,
}

impl GiState {
    pub fn new(config: GiConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let layout = GridLayout::new(config.probe_count);
        let spacings = cascade_spacings(config.size, layout);
        let mut cascades = Vec::with_capacity(CASCADE_COUNT);
        for (index, spacing) in spacings.into_iter().enumerate() {
            let mut cascade = Cascade::new(index, layout, spacing, Vec3::ZERO, config.max_detection_range);
            cascade.set_fill_up_with_expensive_probes(true);
            logwise::info_sync!(
                "GI cascade {index}: spacing {spacing}, detection box {detection_box}",
                index = index,
                spacing = logwise::privacy::LogIt(&spacing),
                detection_box = logwise::privacy::LogIt(&cascade.detection_box())
            );
            cascades.push(cascade);
        }
        //two cascades share one sky shadow map
        cascades[0].set_sky_shadow_cascade(1);
        cascades[2].set_sky_shadow_cascade(3);

        let trace_rays = TraceRays::from_config(&config);
        let ray_cache = RayCacheLayout::new(
            trace_rays.rays_per_probe(),
            layout.real_probe_count() as u32,
            CASCADE_COUNT as u32,
        );
        let probe_maps = ProbeMapLayout::new(&config, CASCADE_COUNT as u32);
        Ok(GiState {
            tone_map_adaption_count: config.cascade_update_cycle.len(),
            config,
            cascades,
            active_cascade: 0,
            last_cascade: 0,
            cycle_index: 0,
            sample_image_size: trace_rays.sample_image_size(0),
            trace_rays,
            ray_cache,
            probe_maps,
            static_bvh: BvhInfo::default(),
            dynamic_bvh: BvhInfo::default(),
            static_bvh_dirty: false,
            dynamic_bvh_dirty: false,
            materials: MaterialInfo::default(),
            clear_maps: true,
            probes_have_moved: false,
            extends_changed: false,
            phase: FramePhase::Idle,
            pending: None,
        })
    }

    pub fn config(&self) -> &GiConfig {
        &self.config
    }
    pub fn phase(&self) -> FramePhase {
        self.phase
    }
    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }
    pub fn cascade_at(&self, index: usize) -> Result<&Cascade, StateError> {
        self.cascades.get(index).ok_or(StateError::NoSuchCascade {
            index,
            count: self.cascades.len(),
        })
    }
    pub fn active_cascade(&self) -> &Cascade {
        &self.cascades[self.active_cascade]
    }
    /// Cascade updated in the previous frame.
    pub fn last_cascade(&self) -> &Cascade {
        &self.cascades[self.last_cascade]
    }
    /// Cascade whose sky shadow map the active cascade uses.
    pub fn sky_shadow_cascade(&self) -> &Cascade {
        &self.cascades[self.active_cascade().sky_shadow_cascade()]
    }
    pub fn trace_rays(&self) -> &TraceRays {
        &self.trace_rays
    }
    pub fn ray_cache(&self) -> &RayCacheLayout {
        &self.ray_cache
    }
    pub fn probe_maps(&self) -> &ProbeMapLayout {
        &self.probe_maps
    }
    pub fn probe_map_clear(&self) -> ProbeMapClear {
        let largest = &self.cascades[self.cascades.len() - 1];
        ProbeMapClear::new(largest.max_probe_distance())
    }
    pub fn sample_image_size(&self) -> UVec2 {
        self.sample_image_size
    }

    /// Tone mapping should adapt instantly until every cycle entry was updated once.
    pub fn camera_force_tone_map_adaption(&self) -> bool {
        self.tone_map_adaption_count > 0
    }

    pub fn set_quality(&mut self, quality: GiQuality) {
        self.config.quality = quality;
    }
    pub fn set_update_speed(&mut self, update_speed: GiUpdateSpeed) {
        self.config.update_speed = update_speed;
    }

    pub fn set_static_bvh(&mut self, bvh: BvhInfo) {
        self.static_bvh = bvh;
    }
    pub fn set_dynamic_bvh(&mut self, bvh: BvhInfo) {
        self.dynamic_bvh = bvh;
    }
    pub fn set_materials(&mut self, materials: MaterialInfo) {
        self.materials = materials;
    }
    /// Static geometry changed since the last call; the static BVH needs a rebuild.
    pub fn take_static_bvh_dirty(&mut self) -> bool {
        std::mem::take(&mut self.static_bvh_dirty)
    }
    /// Dynamic geometry moved since the last call.
    pub fn take_dynamic_bvh_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dynamic_bvh_dirty)
    }
    /// The probe maps have to be cleared to [Self::probe_map_clear] since the last call.
    pub fn take_clear_maps(&mut self) -> bool {
        std::mem::take(&mut self.clear_maps)
    }

    fn require(&self, operation: &'static str, allowed: &[FramePhase]) -> Result<(), StateError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(StateError::OutOfOrder {
                operation,
                phase: self.phase,
            })
        }
    }

    /**
    Picks the cascade of this frame and returns its index.

    The largest cascade still requiring a full inside-view update wins, then the largest with
    invalid probes inside the view, then the next entry of the update cycle.
    */
    pub fn activate_next_cascade(&mut self) -> Result<usize, StateError> {
        self.require(
            "activate_next_cascade",
            &[FramePhase::Idle, FramePhase::AwaitingFeedback],
        )?;
        self.last_cascade = self.active_cascade;

        let urgent = self
            .cascades
            .iter()
            .rposition(Cascade::requires_full_update_inside_view)
            .or_else(|| self.cascades.iter().rposition(Cascade::has_invalid_probes_inside_view));
        self.active_cascade = match urgent {
            Some(index) => index,
            None => {
                let cycle = &self.config.cascade_update_cycle;
                let index = cycle[self.cycle_index % cycle.len()];
                self.cycle_index = (self.cycle_index + 1) % cycle.len();
                self.tone_map_adaption_count = self.tone_map_adaption_count.saturating_sub(1);
                index
            }
        };
        logwise::trace_sync!(
            "GI active cascade {active} (urgent {urgent})",
            active = self.active_cascade,
            urgent = logwise::privacy::LogIt(&urgent.is_some())
        );
        Ok(self.active_cascade)
    }

    /**
    Runs the CPU side of a frame for the active cascade.

    Ingests the feedback of the batch read back last frame, picks up configuration changes, moves
    the cascade to `camera` and selects the batch to trace.  Pass `None` as `feedback` if nothing
    was read back; the pending batch is then dropped.
    */
    pub fn update(
        &mut self,
        camera: DVec3,
        frustum: &Frustum,
        feedback: Option<&dyn ProbeFeedback>,
    ) -> Result<ScheduleReport, StateError> {
        let _interval = logwise::perfwarn_begin!("GiState::update");
        match self.phase {
            FramePhase::AwaitingFeedback => match (self.pending.take(), feedback) {
                (Some(request), Some(feedback)) => {
                    self.drop_pending();
                    self.ingest(&request, feedback)?;
                }
                (Some(request), None) => {
                    logwise::warn_sync!(
                        "GI feedback of cascade {cascade} missing, batch dropped",
                        cascade = request.token.cascade
                    );
                    self.drop_pending();
                }
                (None, _) => self.drop_pending(),
            },
            FramePhase::Scheduled | FramePhase::Exported => {
                logwise::warn_sync!(
                    "GI batch of cascade {cascade} was never read back",
                    cascade = self.active_cascade
                );
                self.drop_pending();
            }
            FramePhase::Idle => {}
        }

        self.trace_rays.update_from_config(&self.config);

        let cascade = &mut self.cascades[self.active_cascade];
        cascade.update_position(camera);
        let report = cascade.find_probes_to_update(frustum, self.trace_rays.probe_count());
        self.sample_image_size = self.trace_rays.sample_image_size(report.update_count);

        if self.ray_cache.set_rays_per_probe(self.trace_rays.rays_per_probe()) {
            logwise::info_sync!(
                "GI rays per probe changed to {rays}, ray caches invalidated",
                rays = self.trace_rays.rays_per_probe()
            );
            for cascade in &mut self.cascades {
                cascade.invalidate_all_ray_caches();
            }
        }
        self.cascades[self.active_cascade].prepare_ray_cache_probes();
        self.phase = FramePhase::Scheduled;
        Ok(report)
    }

    /// Forgets the batch in flight along with the tracer notifications that belong to it.
    fn drop_pending(&mut self) {
        self.pending = None;
        self.probes_have_moved = false;
        self.extends_changed = false;
        self.phase = FramePhase::Idle;
    }

    fn ingest(&mut self, request: &ReadBackRequest, feedback: &dyn ProbeFeedback) -> Result<(), StateError> {
        let index = request.token.cascade;
        let count = self.cascades.len();
        let cascade = self
            .cascades
            .get_mut(index)
            .ok_or(StateError::NoSuchCascade { index, count })?;

        if request.offset_probes > 0 {
            match feedback.probe_offsets() {
                Some(data) => {
                    let data = &data[..request.offset_floats().min(data.len())];
                    cascade.update_probe_offsets(&request.token, data)?;
                }
                None => logwise::warn_sync!("GI probe offsets requested but not read back"),
            }
        }
        if request.extend_probes > 0 {
            match feedback.probe_extends() {
                Some(data) => {
                    let data = &data[..request.extend_floats().min(data.len())];
                    cascade.update_probe_extends(&request.token, data)?;
                }
                None => logwise::warn_sync!("GI probe extends requested but not read back"),
            }
        }
        Ok(())
    }

    fn export_parameters(&self) -> ExportParameters {
        ExportParameters {
            sample_image_size: self.sample_image_size,
            rays_per_probe: self.trace_rays.rays_per_probe(),
            probes_per_line: self.trace_rays.probes_per_line(),
            irradiance_map_size: self.config.irradiance_map_size,
            distance_map_size: self.config.distance_map_size,
            irradiance_map_scale: self.probe_maps.irradiance_map_scale(),
            distance_map_scale: self.probe_maps.distance_map_scale(),
            depth_sharpness: self.config.depth_sharpness,
            hysteresis: self.config.hysteresis,
            grid_probe_count: self.config.probe_count,
            irradiance_gamma: self.config.irradiance_gamma,
            self_shadow_bias: self.config.self_shadow_bias,
            ray_map_scale: self.ray_cache.ray_map_scale(),
            materials: self.materials,
        }
    }

    /// Parameter block of the active cascade for shading passes.
    pub fn prepare_parameters(&self, writer: &mut dyn StructuredBufferWriter) -> Result<(), StateError> {
        let cascade = self.active_cascade();
        cascade.write_parameters(
            writer,
            &self.export_parameters(),
            &self.dynamic_bvh,
            cascade.update_probes().len(),
        )?;
        Ok(())
    }

    /// Exports the update batch for tracing against the dynamic BVH.
    pub fn prepare_state(&mut self, writers: StateWriters<'_>) -> Result<BatchToken, StateError> {
        self.require("prepare_state", &[FramePhase::Scheduled, FramePhase::Exported])?;
        let params = self.export_parameters();
        let cascade = &self.cascades[self.active_cascade];
        let count = cascade.update_probes().len();
        cascade.write_parameters(writers.parameters, &params, &self.dynamic_bvh, count)?;
        write_ray_directions(writers.ray_directions, self.trace_rays.rays_per_probe())?;
        if count > 0 {
            cascade.write_update_indices(writers.probe_indices)?;
            cascade.write_update_positions(writers.probe_positions)?;
        }
        let token = cascade.batch_token();
        self.phase = FramePhase::Exported;
        Ok(token)
    }

    /// Exports the ray-cache batch for tracing against the static BVH.
    pub fn prepare_state_ray_cache(&mut self, writers: StateWriters<'_>) -> Result<BatchToken, StateError> {
        self.require(
            "prepare_state_ray_cache",
            &[FramePhase::Scheduled, FramePhase::Exported],
        )?;
        let params = self.export_parameters();
        let cascade = &self.cascades[self.active_cascade];
        let count = cascade.ray_cache_probes().len();
        cascade.write_parameters(writers.parameters, &params, &self.static_bvh, count)?;
        write_ray_directions(writers.ray_directions, self.trace_rays.rays_per_probe())?;
        if count > 0 {
            cascade.write_ray_cache_indices(writers.probe_indices)?;
            cascade.write_ray_cache_positions(writers.probe_positions)?;
        }
        let token = cascade.batch_token();
        self.phase = FramePhase::Exported;
        Ok(token)
    }

    /**
    Exports the clear mask of the active cascade and resets it.

    Returns `false` if no probe needed clearing; the renderer can skip the clear pass then.
    */
    pub fn prepare_clear_probes(
        &mut self,
        parameters: &mut dyn StructuredBufferWriter,
        clear_probes: &mut dyn StructuredBufferWriter,
    ) -> Result<bool, StateError> {
        let params = self.export_parameters();
        let cascade = &mut self.cascades[self.active_cascade];
        if !cascade.has_clear_probes() {
            return Ok(false);
        }
        cascade.write_parameters(parameters, &params, &self.dynamic_bvh, 0)?;
        cascade.write_clear_probes(clear_probes)?;
        cascade.clear_clear_probes();
        Ok(true)
    }

    /// The renderer rebuilt the ray caches of the exported ray-cache batch.
    pub fn validated_ray_caches(&mut self) -> Result<(), StateError> {
        self.require("validated_ray_caches", &[FramePhase::Exported])?;
        self.cascades[self.active_cascade].validated_ray_caches();
        self.extends_changed = true;
        Ok(())
    }

    /// The tracer computed new probe offsets for the exported update batch.
    pub fn probes_moved(&mut self) -> Result<(), StateError> {
        self.require("probes_moved", &[FramePhase::Exported])?;
        self.probes_have_moved = true;
        Ok(())
    }

    /// Ends the frame.  The returned request tells the renderer what to copy back.
    pub fn start_read_back(&mut self) -> Result<ReadBackRequest, StateError> {
        self.require("start_read_back", &[FramePhase::Exported])?;
        let cascade = &self.cascades[self.active_cascade];
        let request = ReadBackRequest {
            token: cascade.batch_token(),
            offset_probes: if self.probes_have_moved {
                cascade.update_probes().len()
            } else {
                0
            },
            extend_probes: if self.extends_changed {
                cascade.ray_cache_probes().len()
            } else {
                0
            },
        };
        self.pending = Some(request);
        self.phase = FramePhase::AwaitingFeedback;
        Ok(request)
    }

    /// Forgets everything known about every cascade.
    pub fn invalidate(&mut self) {
        for cascade in &mut self.cascades {
            cascade.invalidate();
        }
        self.clear_maps = true;
        self.drop_pending();
        logwise::info_sync!("GI state invalidated");
    }

    /// Invalidates and schedules a full inside-view update of every cascade, as after a world
    /// change.
    pub fn reset(&mut self) {
        self.invalidate();
        for cascade in &mut self.cascades {
            cascade.set_requires_full_update_inside_view(true);
        }
    }

    /// Static geometry changed inside `min..max`.  Returns the number of probes hit over all
    /// cascades.
    pub fn invalidate_area(&mut self, min: DVec3, max: DVec3, hard: bool) -> usize {
        if !max.cmpgt(min).all() {
            return 0;
        }
        let hit = self
            .cascades
            .iter_mut()
            .map(|cascade| cascade.invalidate_area(min, max, hard))
            .sum();
        self.static_bvh_dirty = true;
        hit
    }

    /// Dynamic geometry moved inside `min..max`.  Returns the number of probes re-enabled.
    pub fn touch_dynamic_area(&mut self, min: DVec3, max: DVec3) -> usize {
        if !max.cmpgt(min).all() {
            return 0;
        }
        let touched = self
            .cascades
            .iter_mut()
            .map(|cascade| cascade.touch_dynamic_area(min, max))
            .sum();
        self.dynamic_bvh_dirty = true;
        touched
    }
}

fn cascade_spacings(size: Vec3, layout: GridLayout) -> [Vec3; CASCADE_COUNT] {
    let largest = size / layout.coord_clamp().as_vec3();
    let smallest = Vec3::ONE.min(largest / 8.0);
    let second = smallest * 2.0;
    [smallest, second, second.lerp(largest, 1.0 / 3.0), largest]
}
