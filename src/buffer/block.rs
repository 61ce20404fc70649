// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
CPU image of a parameter block.

Every entry occupies one 16-byte slot.  Scalars sit in the first lane, vectors fill as many lanes
as they have components, and unused lanes are zero.  Shaders declare the block with vec4-sized
members in [GiParameter] order.
*/

use super::{ArrayElement, BufferError, GiParameter, ParameterValue, StructuredBufferWriter};

pub const SLOT_SIZE: usize = 16;

type Slot = [u32; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLayout {
    /// One slot per [GiParameter].
    Parameters,
    /// A fixed-capacity array of 16-byte elements.
    Array { capacity: usize },
}

#[derive(Debug, Clone)]
pub struct ParameterBlock {
    layout: BlockLayout,
    slots: Vec<Slot>,
    mapped: bool,
    //one past the highest array element written since the last map
    written: usize,
}

impl ParameterBlock {
    pub fn new(layout: BlockLayout) -> Self {
        let slot_count = match layout {
            BlockLayout::Parameters => GiParameter::COUNT,
            BlockLayout::Array { capacity } => capacity,
        };
        ParameterBlock {
            layout,
            slots: vec![[0; 4]; slot_count],
            mapped: false,
            written: 0,
        }
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout
    }
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
    pub fn byte_len(&self) -> usize {
        self.slots.len() * SLOT_SIZE
    }
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.slots)
    }
    /// Bytes up to the last array element written during the current or last mapping.
    pub fn written_bytes(&self) -> &[u8] {
        match self.layout {
            BlockLayout::Parameters => self.bytes(),
            BlockLayout::Array { .. } => bytemuck::cast_slice(&self.slots[..self.written]),
        }
    }
    /// Number of array elements written during the current or last mapping.
    pub fn written_elements(&self) -> usize {
        self.written
    }

    pub fn f32s(&self, parameter: GiParameter) -> [f32; 4] {
        bytemuck::cast(self.slots[parameter.slot()])
    }
    pub fn i32s(&self, parameter: GiParameter) -> [i32; 4] {
        bytemuck::cast(self.slots[parameter.slot()])
    }
    pub fn float(&self, parameter: GiParameter) -> f32 {
        self.f32s(parameter)[0]
    }
    pub fn int(&self, parameter: GiParameter) -> i32 {
        self.i32s(parameter)[0]
    }

    pub fn vec4_at(&self, index: usize) -> [f32; 4] {
        bytemuck::cast(self.slots[index])
    }
    pub fn ivec4_at(&self, index: usize) -> [i32; 4] {
        bytemuck::cast(self.slots[index])
    }
    pub fn uvec4_at(&self, index: usize) -> [u32; 4] {
        self.slots[index]
    }
}

fn encode_parameter(value: ParameterValue) -> Slot {
    match value {
        ParameterValue::Float(v) => bytemuck::cast([v, 0.0, 0.0, 0.0]),
        ParameterValue::Int(v) => bytemuck::cast([v, 0, 0, 0]),
        ParameterValue::Vec2([x, y]) => bytemuck::cast([x, y, 0.0, 0.0]),
        ParameterValue::Vec3([x, y, z]) => bytemuck::cast([x, y, z, 0.0]),
        ParameterValue::IVec3([x, y, z]) => bytemuck::cast([x, y, z, 0]),
    }
}

fn encode_element(element: ArrayElement) -> Slot {
    match element {
        ArrayElement::Vec3([x, y, z]) => bytemuck::cast([x, y, z, 0.0]),
        ArrayElement::Vec4(v) => bytemuck::cast(v),
        ArrayElement::IVec4(v) => bytemuck::cast(v),
        ArrayElement::UVec4(v) => v,
    }
}

impl StructuredBufferWriter for ParameterBlock {
    fn map(&mut self) -> Result<(), BufferError> {
        if self.mapped {
            return Err(BufferError::AlreadyMapped);
        }
        self.mapped = true;
        self.written = 0;
        Ok(())
    }

    fn unmap(&mut self) {
        self.mapped = false;
    }

    fn set_parameter(&mut self, parameter: GiParameter, value: ParameterValue) -> Result<(), BufferError> {
        if !self.mapped {
            return Err(BufferError::NotMapped);
        }
        if self.layout != BlockLayout::Parameters {
            return Err(BufferError::NotAParameterBlock(parameter));
        }
        self.slots[parameter.slot()] = encode_parameter(value);
        Ok(())
    }

    fn set_array_element(&mut self, index: usize, element: ArrayElement) -> Result<(), BufferError> {
        if !self.mapped {
            return Err(BufferError::NotMapped);
        }
        let BlockLayout::Array { capacity } = self.layout else {
            return Err(BufferError::NotAnArrayBlock);
        };
        if index >= capacity {
            return Err(BufferError::IndexOutOfRange { index, capacity });
        }
        self.slots[index] = encode_element(element);
        self.written = self.written.max(index + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Mapped;

    #[test]
    fn parameters_fill_lanes() {
        let mut block = ParameterBlock::new(BlockLayout::Parameters);
        {
            let mut mapped = Mapped::new(&mut block).unwrap();
            mapped
                .set_parameter(GiParameter::GridOrigin, ParameterValue::Vec3([1.0, 2.0, 3.0]))
                .unwrap();
            mapped
                .set_parameter(GiParameter::Cascade, ParameterValue::Int(2))
                .unwrap();
        }
        assert_eq!(block.f32s(GiParameter::GridOrigin), [1.0, 2.0, 3.0, 0.0]);
        assert_eq!(block.int(GiParameter::Cascade), 2);
        assert_eq!(block.byte_len(), GiParameter::COUNT * SLOT_SIZE);
        let offset = GiParameter::Cascade.slot() * SLOT_SIZE;
        assert_eq!(&block.bytes()[offset..offset + 4], &2i32.to_ne_bytes());
    }

    #[test]
    fn writes_require_mapping_and_matching_layout() {
        let mut block = ParameterBlock::new(BlockLayout::Parameters);
        assert_eq!(
            block.set_parameter(GiParameter::ProbeCount, ParameterValue::Int(1)),
            Err(BufferError::NotMapped)
        );
        let mut mapped = Mapped::new(&mut block).unwrap();
        assert_eq!(
            mapped.set_array_element(0, ArrayElement::UVec4([0; 4])),
            Err(BufferError::NotAnArrayBlock)
        );
    }

    #[test]
    fn written_range_tracks_highest_element() {
        let mut block = ParameterBlock::new(BlockLayout::Array { capacity: 8 });
        {
            let mut mapped = Mapped::new(&mut block).unwrap();
            mapped.set_array_element(2, ArrayElement::Vec4([1.0; 4])).unwrap();
        }
        assert_eq!(block.written_elements(), 3);
        assert_eq!(block.written_bytes().len(), 3 * SLOT_SIZE);
        assert_eq!(block.vec4_at(2), [1.0; 4]);
        assert_eq!(block.vec4_at(1), [0.0; 4]);
    }
}
