// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! wgpu upload path for parameter blocks.

use crate::buffer::{
    ArrayElement, BlockLayout, BufferError, GiParameter, ParameterBlock, ParameterValue, SLOT_SIZE,
    StructuredBufferWriter,
};
use wgpu::{BufferDescriptor, BufferUsages};

/**
A [ParameterBlock] mirrored into a `wgpu::Buffer`.

Writes land in the CPU image; unmapping uploads the written range with `Queue::write_buffer`.
Parameter layouts become uniform buffers, array layouts storage buffers.
*/
#[derive(Debug)]
pub struct WgpuParameterBlock {
    block: ParameterBlock,
    buffer: wgpu::Buffer,
    queue: wgpu::Queue,
}

impl WgpuParameterBlock {
    pub fn new(device: &wgpu::Device, queue: wgpu::Queue, layout: BlockLayout, label: &str) -> Self {
        let block = ParameterBlock::new(layout);
        let usage = match layout {
            BlockLayout::Parameters => BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            BlockLayout::Array { .. } => BufferUsages::STORAGE | BufferUsages::COPY_DST,
        };
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size: block.byte_len().max(SLOT_SIZE) as u64,
            usage,
            mapped_at_creation: false,
        });
        logwise::trace_sync!(
            "Created GI parameter buffer {label} ({bytes} bytes)",
            label = logwise::privacy::LogIt(label),
            bytes = block.byte_len()
        );
        WgpuParameterBlock {
            block,
            buffer,
            queue,
        }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
    /// The CPU image as of the last write.
    pub fn block(&self) -> &ParameterBlock {
        &self.block
    }
}

impl StructuredBufferWriter for WgpuParameterBlock {
    fn map(&mut self) -> Result<(), BufferError> {
        self.block.map()
    }

    fn unmap(&mut self) {
        if !self.block.is_mapped() {
            return;
        }
        self.block.unmap();
        let bytes = self.block.written_bytes();
        if !bytes.is_empty() {
            self.queue.write_buffer(&self.buffer, 0, bytes);
        }
    }

    fn set_parameter(&mut self, parameter: GiParameter, value: ParameterValue) -> Result<(), BufferError> {
        self.block.set_parameter(parameter, value)
    }

    fn set_array_element(&mut self, index: usize, element: ArrayElement) -> Result<(), BufferError> {
        self.block.set_array_element(index, element)
    }
}
