// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Wrapped probe grid addressing.

A cascade keeps its probes in one flat array.  When the cascade scrolls, probe memory does not
move; instead a per-axis wrap shift is applied so that a probe's logical coordinate maps to a new
"shifted" coordinate in the volume.

```text
 logical coord     shift = 1 (x)      shifted coord
  0 1 2 3            ──────▶             1 2 3 0
```

Indices are laid out y-major, then z, then x:

```
use gi_cascades::grid::GridLayout;
use gi_cascades::glam::IVec3;

let layout = GridLayout::new(IVec3::new(4, 2, 3));
assert_eq!(layout.real_probe_count(), 24);
assert_eq!(layout.coord_to_index(IVec3::new(1, 1, 2)), 12 + 8 + 1);
assert_eq!(layout.index_to_coord(21), IVec3::new(1, 1, 2));

// wrapping never produces negative coordinates
let shift = layout.wrap_shift(IVec3::new(-1, 0, 4));
assert_eq!(shift, IVec3::new(3, 0, 1));
```
*/

use crate::probe::{Probe, ProbeIndex};
use glam::{IVec3, Vec3};

/// Dimensions and index arithmetic of a probe grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    probe_count: IVec3,
    stride: i32,
    real_probe_count: usize,
}

impl GridLayout {
    /**
    Creates a layout.

    # Panics
    Panics if any axis holds fewer than one probe.
    */
    pub fn new(probe_count: IVec3) -> Self {
        assert!(
            probe_count.cmpge(IVec3::ONE).all(),
            "Probe grid needs at least one probe per axis"
        );
        let stride = probe_count.x * probe_count.z;
        GridLayout {
            probe_count,
            stride,
            real_probe_count: (stride * probe_count.y) as usize,
        }
    }

    pub const fn probe_count(&self) -> IVec3 {
        self.probe_count
    }
    /// Largest valid coordinate per axis.
    pub fn coord_clamp(&self) -> IVec3 {
        self.probe_count - IVec3::ONE
    }
    /// Number of probes in one xz layer.
    pub const fn stride(&self) -> i32 {
        self.stride
    }
    pub const fn real_probe_count(&self) -> usize {
        self.real_probe_count
    }

    pub fn index_to_coord(&self, index: usize) -> IVec3 {
        let index = index as i32;
        let y = index / self.stride;
        let rest = index - self.stride * y;
        let z = rest / self.probe_count.x;
        let x = rest - self.probe_count.x * z;
        IVec3::new(x, y, z)
    }

    pub fn coord_to_index(&self, coord: IVec3) -> usize {
        (self.stride * coord.y + self.probe_count.x * coord.z + coord.x) as usize
    }

    pub fn contains(&self, coord: IVec3) -> bool {
        coord.cmpge(IVec3::ZERO).all() && coord.cmplt(self.probe_count).all()
    }

    /// Wraps an arbitrary shift into `0..probe_count` per axis.
    pub fn wrap_shift(&self, shift: IVec3) -> IVec3 {
        IVec3::new(
            shift.x.rem_euclid(self.probe_count.x),
            shift.y.rem_euclid(self.probe_count.y),
            shift.z.rem_euclid(self.probe_count.z),
        )
    }

    /// `shift` must already be wrapped.
    pub fn local_to_shifted(&self, coord: IVec3, shift: IVec3) -> IVec3 {
        (coord + shift) % self.probe_count
    }

    /// `shift` must already be wrapped.
    pub fn shifted_to_local(&self, coord: IVec3, shift: IVec3) -> IVec3 {
        (coord - shift + self.probe_count) % self.probe_count
    }
}

/// The probes of one cascade together with their wrapped addressing.
#[derive(Debug, Clone)]
pub struct ProbeGrid {
    layout: GridLayout,
    spacing: Vec3,
    field_origin: Vec3,
    shift: IVec3,
    probes: Vec<Probe>,
}

impl ProbeGrid {
    pub(crate) fn new(layout: GridLayout, spacing: Vec3, field_origin: Vec3, detection_box: Vec3) -> Self {
        let count = layout.real_probe_count();
        assert!(
            count <= ProbeIndex::MAX as usize + 1,
            "Probe grid exceeds the 16-bit probe index range"
        );
        let probes = (0..count)
            .map(|i| Probe::new(i as ProbeIndex, layout.index_to_coord(i), detection_box))
            .collect();
        let mut grid = ProbeGrid {
            layout,
            spacing,
            field_origin,
            shift: IVec3::ZERO,
            probes,
        };
        grid.reshift(IVec3::ZERO);
        grid
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }
    pub fn shift(&self) -> IVec3 {
        self.shift
    }
    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }
    pub(crate) fn probes_mut(&mut self) -> &mut [Probe] {
        &mut self.probes
    }
    pub fn probe(&self, index: ProbeIndex) -> &Probe {
        &self.probes[index as usize]
    }
    pub(crate) fn probe_mut(&mut self, index: ProbeIndex) -> &mut Probe {
        &mut self.probes[index as usize]
    }

    /// Cascade-space position of a shifted grid coordinate.
    pub fn grid_to_local(&self, shifted: IVec3) -> Vec3 {
        self.spacing * shifted.as_vec3() + self.field_origin
    }

    /// Index of the probe currently occupying `shifted`.
    pub fn index_at_shifted(&self, shifted: IVec3) -> ProbeIndex {
        let local = self.layout.shifted_to_local(shifted, self.shift);
        self.layout.coord_to_index(local) as ProbeIndex
    }

    ///Applies a new wrap shift and recomputes every probe's shifted coordinate and position.
    pub(crate) fn reshift(&mut self, shift: IVec3) {
        let shift = self.layout.wrap_shift(shift);
        self.shift = shift;
        let layout = self.layout;
        let spacing = self.spacing;
        let field_origin = self.field_origin;
        for probe in &mut self.probes {
            probe.shifted_coord = layout.local_to_shifted(probe.coord(), shift);
            probe.position = spacing * probe.shifted_coord.as_vec3() + field_origin;
        }
    }
}
