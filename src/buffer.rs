// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Structured buffer writer interface.
//!
//! GI state reaches the GPU through parameter blocks.  This crate does not own GPU memory; it
//! writes through the [StructuredBufferWriter] trait, which a backend implements on top of
//! whatever buffer mechanism it has.  [ParameterBlock] is the CPU implementation used by the
//! wgpu backend and by tests.
//!
//! Writers have to be mapped before writing.  [Mapped] maps on creation and unmaps when dropped:
//!
//! ```
//! use gi_cascades::buffer::{ArrayElement, BlockLayout, Mapped, ParameterBlock, StructuredBufferWriter};
//!
//! let mut block = ParameterBlock::new(BlockLayout::Array { capacity: 2 });
//! {
//!     let mut mapped = Mapped::new(&mut block).unwrap();
//!     mapped.set_array_element(1, ArrayElement::IVec4([1, 2, 3, 4])).unwrap();
//! }
//! assert_eq!(block.ivec4_at(1), [1, 2, 3, 4]);
//! assert!(!block.is_mapped());
//! ```

mod block;

pub use block::{BlockLayout, ParameterBlock, SLOT_SIZE};

use std::ops::{Deref, DerefMut};

/// Named parameters of the GI parameter block, in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GiParameter {
    SampleImageScale,
    ProbeCount,
    RaysPerProbe,
    ProbesPerLine,
    IrradianceMapSize,
    DistanceMapSize,
    IrradianceMapScale,
    DistanceMapScale,
    MaxProbeDistance,
    DepthSharpness,
    GridOrigin,
    GridCoordUnshift,
    FieldSize,
    BlendUpdateProbe,
    BvhInstanceRootNode,
    GridProbeCount,
    GridProbeSpacing,
    IrradianceGamma,
    InvIrradianceGamma,
    SelfShadowBias,
    Cascade,
    DetectionBox,
    BvhOffset,
    MaterialMapsPerRow,
    MaterialMapSize,
    MoveMaxOffset,
    MoveMinDistToSurface,
    RayMapScale,
}

impl GiParameter {
    pub const COUNT: usize = GiParameter::RayMapScale as usize + 1;

    pub const fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    IVec3([i32; 3]),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArrayElement {
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    IVec4([i32; 4]),
    UVec4([u32; 4]),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BufferError {
    #[error("Buffer is not mapped")]
    NotMapped,
    #[error("Buffer is already mapped")]
    AlreadyMapped,
    #[error("Parameter {0:?} written to an array block")]
    NotAParameterBlock(GiParameter),
    #[error("Array element written to a parameter block")]
    NotAnArrayBlock,
    #[error("Array index {index} out of range (capacity {capacity})")]
    IndexOutOfRange { index: usize, capacity: usize },
}

/**
Destination for GPU-consumable parameters.

Implementations decide memory layout and upload strategy.  All writes happen between [Self::map]
and [Self::unmap]; use [Mapped] instead of calling them directly.
*/
pub trait StructuredBufferWriter {
    fn map(&mut self) -> Result<(), BufferError>;
    fn unmap(&mut self);
    fn set_parameter(&mut self, parameter: GiParameter, value: ParameterValue) -> Result<(), BufferError>;
    fn set_array_element(&mut self, index: usize, element: ArrayElement) -> Result<(), BufferError>;
}

/// Keeps a writer mapped for the guard's lifetime.
pub struct Mapped<'a, W: StructuredBufferWriter + ?Sized> {
    writer: &'a mut W,
}

impl<'a, W: StructuredBufferWriter + ?Sized> Mapped<'a, W> {
    pub fn new(writer: &'a mut W) -> Result<Self, BufferError> {
        writer.map()?;
        Ok(Mapped { writer })
    }
}

impl<W: StructuredBufferWriter + ?Sized> Deref for Mapped<'_, W> {
    type Target = W;
    fn deref(&self) -> &Self::Target {
        self.writer
    }
}

impl<W: StructuredBufferWriter + ?Sized> DerefMut for Mapped<'_, W> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.writer
    }
}

impl<W: StructuredBufferWriter + ?Sized> Drop for Mapped<'_, W> {
    fn drop(&mut self) {
        self.writer.unmap();
    }
}
