// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Packing cascade state for the GPU.

Array writers emit one element per batch entry in batch order; feedback is matched back to
probes by that order, see [Cascade::update_probe_offsets].
*/

use super::Cascade;
use crate::bittricks::flags_to_f32;
use crate::buffer::{ArrayElement, BufferError, GiParameter, Mapped, ParameterValue, StructuredBufferWriter};
use crate::probe::ProbeIndex;
use glam::{DVec3, IVec3, UVec2, Vec2};

/// Instance BVH the tracer walks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhInfo {
    /// Index of the root node, `-1` if the BVH is empty.
    pub root_node: i32,
    /// World position the BVH is built relative to.
    pub position: DVec3,
}

impl Default for BvhInfo {
    fn default() -> Self {
        BvhInfo {
            root_node: -1,
            position: DVec3::ZERO,
        }
    }
}

/// Layout of the material atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialInfo {
    pub maps_per_row: i32,
    pub map_size: i32,
}

/// Values shared by all cascades of a GI state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportParameters {
    pub sample_image_size: UVec2,
    pub rays_per_probe: u32,
    pub probes_per_line: u32,
    pub irradiance_map_size: u32,
    pub distance_map_size: u32,
    pub irradiance_map_scale: Vec2,
    pub distance_map_scale: Vec2,
    pub depth_sharpness: f32,
    pub hysteresis: f32,
    pub grid_probe_count: IVec3,
    pub irradiance_gamma: f32,
    /// Fraction of the smallest spacing, scaled per cascade by [Cascade::self_shadow_bias].
    pub self_shadow_bias: f32,
    pub ray_map_scale: Vec2,
    pub materials: MaterialInfo,
}

impl Cascade {
    pub fn self_shadow_bias(&self, factor: f32) -> f32 {
        factor * self.spacing.min_element()
    }

    /// Fills the parameter block for a pass over `probe_count` probes tracing against `bvh`.
    pub fn write_parameters<W: StructuredBufferWriter + ?Sized>(
        &self,
        writer: &mut W,
        params: &ExportParameters,
        bvh: &BvhInfo,
        probe_count: usize,
    ) -> Result<(), BufferError> {
        use GiParameter as P;
        use ParameterValue as V;
        let spacing = self.spacing;
        let sample_scale = Vec2::ONE / params.sample_image_size.as_vec2();

        let mut w = Mapped::new(writer)?;
        w.set_parameter(P::SampleImageScale, V::Vec2(sample_scale.to_array()))?;
        w.set_parameter(P::ProbeCount, V::Int(probe_count as i32))?;
        w.set_parameter(P::RaysPerProbe, V::Int(params.rays_per_probe as i32))?;
        w.set_parameter(P::ProbesPerLine, V::Int(params.probes_per_line as i32))?;
        w.set_parameter(P::IrradianceMapSize, V::Int(params.irradiance_map_size as i32))?;
        w.set_parameter(P::DistanceMapSize, V::Int(params.distance_map_size as i32))?;
        w.set_parameter(P::IrradianceMapScale, V::Vec2(params.irradiance_map_scale.to_array()))?;
        w.set_parameter(P::DistanceMapScale, V::Vec2(params.distance_map_scale.to_array()))?;
        w.set_parameter(P::MaxProbeDistance, V::Float(self.max_probe_distance))?;
        w.set_parameter(P::DepthSharpness, V::Float(params.depth_sharpness))?;
        w.set_parameter(P::GridOrigin, V::Vec3(self.field_origin.to_array()))?;
        w.set_parameter(P::GridCoordUnshift, V::IVec3(self.grid.shift().to_array()))?;
        w.set_parameter(P::FieldSize, V::Vec3(self.field_size.to_array()))?;
        w.set_parameter(P::BlendUpdateProbe, V::Float(1.0 - params.hysteresis))?;
        w.set_parameter(P::BvhInstanceRootNode, V::Int(bvh.root_node))?;
        w.set_parameter(P::GridProbeCount, V::IVec3(params.grid_probe_count.to_array()))?;
        w.set_parameter(P::GridProbeSpacing, V::Vec3(spacing.to_array()))?;
        w.set_parameter(P::IrradianceGamma, V::Float(params.irradiance_gamma))?;
        w.set_parameter(P::InvIrradianceGamma, V::Float(1.0 / params.irradiance_gamma))?;
        w.set_parameter(P::SelfShadowBias, V::Float(self.self_shadow_bias(params.self_shadow_bias)))?;
        w.set_parameter(P::Cascade, V::Int(self.index as i32))?;
        w.set_parameter(P::DetectionBox, V::Vec3(self.detection_box.to_array()))?;
        let bvh_offset = (self.position - bvh.position).as_vec3();
        w.set_parameter(P::BvhOffset, V::Vec3(bvh_offset.to_array()))?;
        w.set_parameter(P::MaterialMapsPerRow, V::Int(params.materials.maps_per_row))?;
        w.set_parameter(P::MaterialMapSize, V::Int(params.materials.map_size))?;
        //probes may move at most half way towards their neighbors
        w.set_parameter(P::MoveMaxOffset, V::Vec3((spacing * 0.49).to_array()))?;
        w.set_parameter(P::MoveMinDistToSurface, V::Float(spacing.min_element() * 0.25))?;
        w.set_parameter(P::RayMapScale, V::Vec2(params.ray_map_scale.to_array()))?;
        Ok(())
    }

    pub fn write_update_indices<W: StructuredBufferWriter + ?Sized>(&self, writer: &mut W) -> Result<(), BufferError> {
        write_indices(writer, &self.update_probes)
    }
    pub fn write_update_positions<W: StructuredBufferWriter + ?Sized>(&self, writer: &mut W) -> Result<(), BufferError> {
        self.write_positions(writer, &self.update_probes)
    }
    pub fn write_ray_cache_indices<W: StructuredBufferWriter + ?Sized>(&self, writer: &mut W) -> Result<(), BufferError> {
        write_indices(writer, &self.ray_cache_probes)
    }
    pub fn write_ray_cache_positions<W: StructuredBufferWriter + ?Sized>(
        &self,
        writer: &mut W,
    ) -> Result<(), BufferError> {
        self.write_positions(writer, &self.ray_cache_probes)
    }

    /// Clear mask, four words per element, zero padded.
    pub fn write_clear_probes<W: StructuredBufferWriter + ?Sized>(&self, writer: &mut W) -> Result<(), BufferError> {
        let mut w = Mapped::new(writer)?;
        for (i, words) in self.clear_probes.chunks(4).enumerate() {
            let mut element = [0u32; 4];
            element[..words.len()].copy_from_slice(words);
            w.set_array_element(i, ArrayElement::UVec4(element))?;
        }
        Ok(())
    }

    fn write_positions<W: StructuredBufferWriter + ?Sized>(
        &self,
        writer: &mut W,
        indices: &[ProbeIndex],
    ) -> Result<(), BufferError> {
        let mut w = Mapped::new(writer)?;
        for (i, &index) in indices.iter().enumerate() {
            let probe = self.grid.probe(index);
            let position = probe.traced_position().extend(flags_to_f32(probe.flags.bits()));
            w.set_array_element(i, ArrayElement::Vec4(position.to_array()))?;
        }
        Ok(())
    }
}

fn write_indices<W: StructuredBufferWriter + ?Sized>(writer: &mut W, indices: &[ProbeIndex]) -> Result<(), BufferError> {
    let mut w = Mapped::new(writer)?;
    for (i, chunk) in indices.chunks(4).enumerate() {
        let mut element = [0i32; 4];
        for (lane, &index) in element.iter_mut().zip(chunk) {
            *lane = index as i32;
        }
        w.set_array_element(i, ArrayElement::IVec4(element))?;
    }
    Ok(())
}
