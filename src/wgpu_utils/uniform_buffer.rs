// src/wgpu_utils/uniform_buffer.rs - Per-draw uniform arena
use std::marker::PhantomData;

/// Uniform buffer holding one `Content` slot per draw, addressed by dynamic offset
///
/// Slots are written through the queue as they are pushed, so every draw of a
/// frame keeps its own copy. When the arena fills up it is replaced by one
/// twice the size; draws already recorded keep the old buffer alive.
pub struct DynamicUniformBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
    stride: u64,
    capacity: u64,
    cursor: u64,
}

impl<Content: bytemuck::Pod> DynamicUniformBuffer<Content> {
    fn name() -> &'static str {
        let type_name = std::any::type_name::<Content>();
        let pos = type_name.rfind(':').unwrap_or(0);
        if pos > 0 {
            &type_name[(pos + 1)..]
        } else {
            type_name
        }
    }

    /// Slot size rounded up to the device's dynamic offset alignment
    pub fn aligned_stride(alignment: u32) -> u64 {
        let size = std::mem::size_of::<Content>() as u64;
        let alignment = alignment.max(1) as u64;
        size.div_ceil(alignment) * alignment
    }

    fn create_buffer(device: &wgpu::Device, stride: u64, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("DynamicUniformBuffer: {} x{}", Self::name(), capacity)),
            size: stride * capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub fn new(device: &wgpu::Device, capacity: u64) -> Self {
        let stride = Self::aligned_stride(device.limits().min_uniform_buffer_offset_alignment);
        let capacity = capacity.max(1);

        DynamicUniformBuffer {
            buffer: Self::create_buffer(device, stride, capacity),
            content_type: PhantomData,
            stride,
            capacity,
            cursor: 0,
        }
    }

    /// Writes `content` into the next free slot and returns its byte offset
    ///
    /// Returns `true` alongside the offset when the buffer was replaced, in
    /// which case bind groups referencing it must be recreated.
    pub fn push(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, content: &Content) -> (u32, bool) {
        let mut grown = false;
        if self.cursor >= self.capacity {
            self.capacity *= 2;
            self.buffer = Self::create_buffer(device, self.stride, self.capacity);
            self.cursor = 0;
            grown = true;
        }

        let offset = self.cursor * self.stride;
        queue.write_buffer(&self.buffer, offset, bytemuck::bytes_of(content));
        self.cursor += 1;
        (offset as u32, grown)
    }

    /// Makes every slot available again; call once per frame
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Binding covering a single slot, for use with dynamic offsets
    pub fn binding_resource(&self) -> wgpu::BindingResource {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(std::mem::size_of::<Content>() as u64),
        })
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn len(&self) -> u64 {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct Block {
        data: [f32; 20],
    }

    #[test]
    fn test_stride_alignment() {
        assert_eq!(DynamicUniformBuffer::<Block>::aligned_stride(256), 256);
        assert_eq!(DynamicUniformBuffer::<Block>::aligned_stride(64), 128);
        assert_eq!(DynamicUniformBuffer::<Block>::aligned_stride(16), 80);
    }
}
