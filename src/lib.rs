// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! gi_cascades is the CPU side of a probe-based real-time global illumination system.

It keeps track of a hierarchy of probe grids around the camera, decides every frame which probes
the GPU should trace, and ingests what the GPU found out about them.  It does not trace rays,
own textures or compile shaders; those belong to the renderer.

Four cascades cover the same number of probes with growing spacing:

| Cascade | Spacing                          | Sky shadow map of |
|---------|----------------------------------|-------------------|
| 0       | finest, at most 1 unit per axis  | cascade 1         |
| 1       | twice cascade 0                  | cascade 1         |
| 2       | a third of the way to cascade 3  | cascade 3         |
| 3       | volume size / (probe count - 1)  | cascade 3         |

One cascade is updated per frame, see [state::GiState] for the frame cycle.

# Probe updates

Updating a probe is expensive when its ray cache has to be rebuilt and cheap when only dynamic
geometry is refreshed on top of cached rays.  The scheduler in [cascade] spends a per-frame
budget in priority tiers, invalid probes inside the view first, and rotates through the rest so
that every probe is refreshed eventually.

# Backends

The crate writes GPU-bound data through [buffer::StructuredBufferWriter].  With the default
`backend_wgpu` feature, [WgpuParameterBlock] uploads into a `wgpu::Buffer`; without it, write into
a [buffer::ParameterBlock] and upload the bytes yourself.
*/

pub mod buffer;
pub mod cascade;
pub mod config;
pub mod frustum;
pub mod grid;
pub mod probe;
pub mod probe_maps;
pub mod ray_cache;
pub mod rays;
pub mod state;
pub mod trace_rays;
pub mod bittricks;
mod imp;

pub use glam;

#[cfg(feature = "backend_wgpu")]
pub use imp::WgpuParameterBlock;
