//! The frame-resource ring.
//!
//! A [`FrameResource`] bundles everything the CPU writes for one frame: the
//! command allocator, the pass constants, the SSAO constants, the material
//! buffer and one instance buffer per render item. [`FrameRing`] rotates `N`
//! of them behind a [`FrameGate`], so the CPU fills slot `K mod N` while the
//! GPU is still reading the other slots.
//!
//! Buffers are created through a [`FrameBackend`]. The Vulkan backend hands
//! out persistently mapped [`UploadBuffer`]s; [`HostBackend`] keeps plain
//! vectors for tests.

use bytemuck::Pod;
use prism_rhi::buffer::{BufferUsage, UploadBuffer};
use tracing::debug;

use crate::error::{RendererError, RendererResult};
use crate::gpu_types::{InstanceData, MaterialData, PassConstants, SsaoConstants};
use crate::sync_gate::{FrameGate, GpuTimeline};

/// A CPU-writable array the GPU reads from.
pub trait UploadArray<T: Pod> {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes element `index`.
    fn write(&mut self, index: usize, value: &T) -> RendererResult<()>;

    /// Writes `values` starting at element 0.
    fn write_slice(&mut self, values: &[T]) -> RendererResult<()>;

    /// GPU address shaders use to reach the array.
    fn address(&self) -> RendererResult<u64>;
}

/// Per-slot command recording memory.
pub trait CommandAllocator {
    /// Reclaims every command recorded from this allocator. Only valid once
    /// the slot's fence has been reached.
    fn reset(&mut self) -> RendererResult<()>;
}

/// Creates the buffers of a frame resource.
pub trait FrameBackend {
    type Upload<T: Pod>: UploadArray<T>;
    type Allocator: CommandAllocator;

    fn create_upload<T: Pod>(&self, usage: BufferUsage, len: usize) -> RendererResult<Self::Upload<T>>;

    fn create_command_allocator(&self) -> RendererResult<Self::Allocator>;
}

impl<T: Pod> UploadArray<T> for UploadBuffer<T> {
    fn len(&self) -> usize {
        UploadBuffer::len(self)
    }

    fn write(&mut self, index: usize, value: &T) -> RendererResult<()> {
        Ok(self.copy(index, value)?)
    }

    fn write_slice(&mut self, values: &[T]) -> RendererResult<()> {
        Ok(self.copy_slice(values)?)
    }

    fn address(&self) -> RendererResult<u64> {
        Ok(self.buffer().device_address()?)
    }
}

/// Sizes of the buffers in every slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    /// Main pass, cube faces and shadow slots.
    pub pass_count: usize,
    /// Materials in the library. The buffer always holds at least one.
    pub material_count: usize,
    /// Total instance count of each render item, indexed by `item_index`.
    pub instance_counts: Vec<usize>,
}

/// One slot of the ring.
pub struct FrameResource<B: FrameBackend> {
    pub commands: B::Allocator,
    pub pass_constants: B::Upload<PassConstants>,
    pub ssao_constants: B::Upload<SsaoConstants>,
    pub materials: B::Upload<MaterialData>,
    /// Arena indexed by `item_index`.
    instances: Vec<B::Upload<InstanceData>>,
    material_count: usize,
}

impl<B: FrameBackend> FrameResource<B> {
    pub fn new(backend: &B, layout: &FrameLayout) -> RendererResult<Self> {
        let instances = layout
            .instance_counts
            .iter()
            .map(|&count| backend.create_upload(BufferUsage::Storage, count))
            .collect::<RendererResult<Vec<_>>>()?;

        Ok(Self {
            commands: backend.create_command_allocator()?,
            pass_constants: backend.create_upload(BufferUsage::Uniform, layout.pass_count)?,
            ssao_constants: backend.create_upload(BufferUsage::Uniform, 1)?,
            materials: backend.create_upload(BufferUsage::Storage, layout.material_count.max(1))?,
            instances,
            material_count: layout.material_count,
        })
    }

    /// Materials the shaders may index; ids at or past this are dangling.
    #[inline]
    pub fn material_count(&self) -> usize {
        self.material_count
    }

    /// Number of items with an instance buffer.
    #[inline]
    pub fn instance_buffer_count(&self) -> usize {
        self.instances.len()
    }

    /// The instance buffer of item `item_index`.
    ///
    /// # Errors
    ///
    /// A missing buffer is a bookkeeping bug: debug builds panic, release
    /// builds return [`RendererError::MissingInstanceBuffer`].
    pub fn instance_buffer(&self, item_index: usize) -> RendererResult<&B::Upload<InstanceData>> {
        debug_assert!(
            item_index < self.instances.len(),
            "no instance buffer for item {item_index}"
        );
        self.instances
            .get(item_index)
            .ok_or(RendererError::MissingInstanceBuffer(item_index))
    }

    pub fn instance_buffer_mut(
        &mut self,
        item_index: usize,
    ) -> RendererResult<&mut B::Upload<InstanceData>> {
        debug_assert!(
            item_index < self.instances.len(),
            "no instance buffer for item {item_index}"
        );
        self.instances
            .get_mut(item_index)
            .ok_or(RendererError::MissingInstanceBuffer(item_index))
    }

    /// Writes pass constants into `slot`.
    pub fn write_pass(&mut self, slot: usize, constants: &PassConstants) -> RendererResult<()> {
        check_pass_slot(slot, self.pass_constants.len())?;
        self.pass_constants.write(slot, constants)
    }
}

/// Validates a pass-constant slot against the slot count of a frame.
pub fn check_pass_slot(slot: usize, count: usize) -> RendererResult<()> {
    debug_assert!(slot < count, "pass constant slot {slot} of {count}");
    if slot < count {
        Ok(())
    } else {
        Err(RendererError::PassSlotOutOfRange { slot, count })
    }
}

/// `N` frame resources plus the gate that protects them.
pub struct FrameRing<B: FrameBackend> {
    frames: Vec<FrameResource<B>>,
    gate: FrameGate,
    layout: FrameLayout,
}

impl<B: FrameBackend> FrameRing<B> {
    pub fn new(backend: &B, slot_count: usize, layout: FrameLayout) -> RendererResult<Self> {
        let frames = (0..slot_count)
            .map(|_| FrameResource::new(backend, &layout))
            .collect::<RendererResult<Vec<_>>>()?;
        debug!(
            "Created frame ring: {} slots, {} pass slots, {} materials, {} instance buffers",
            slot_count,
            layout.pass_count,
            layout.material_count,
            layout.instance_counts.len()
        );
        Ok(Self {
            frames,
            gate: FrameGate::new(slot_count),
            layout,
        })
    }

    /// Moves to the next slot, waiting for the GPU to release it.
    pub fn advance(&mut self, timeline: &impl GpuTimeline) -> RendererResult<usize> {
        self.gate.advance_frame(timeline)
    }

    /// Records the submission of the current slot; returns the fence value
    /// to signal.
    pub fn post_submission(&mut self) -> u64 {
        self.gate.post_submission()
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.gate.current_slot()
    }

    #[inline]
    pub fn current(&self) -> &FrameResource<B> {
        &self.frames[self.gate.current_slot()]
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut FrameResource<B> {
        &mut self.frames[self.gate.current_slot()]
    }

    pub fn frame(&self, slot: usize) -> &FrameResource<B> {
        &self.frames[slot]
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn gate(&self) -> &FrameGate {
        &self.gate
    }

    #[inline]
    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameResource<B>> {
        self.frames.iter()
    }
}

/// A vector standing in for a mapped GPU buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct HostUpload<T> {
    data: Vec<T>,
    usage: BufferUsage,
    address: u64,
}

impl<T> HostUpload<T> {
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl<T: Pod> UploadArray<T> for HostUpload<T> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn write(&mut self, index: usize, value: &T) -> RendererResult<()> {
        let len = self.data.len();
        let slot = self.data.get_mut(index).ok_or_else(|| {
            prism_rhi::RhiError::OutOfBounds(format!("element {index} of {len}-element host buffer"))
        })?;
        *slot = *value;
        Ok(())
    }

    fn write_slice(&mut self, values: &[T]) -> RendererResult<()> {
        if values.len() > self.data.len() {
            return Err(prism_rhi::RhiError::OutOfBounds(format!(
                "{} elements into {}-element host buffer",
                values.len(),
                self.data.len()
            ))
            .into());
        }
        self.data[..values.len()].copy_from_slice(values);
        Ok(())
    }

    fn address(&self) -> RendererResult<u64> {
        Ok(self.address)
    }
}

/// Counts allocator resets.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostAllocator {
    pub resets: usize,
}

impl CommandAllocator for HostAllocator {
    fn reset(&mut self) -> RendererResult<()> {
        self.resets += 1;
        Ok(())
    }
}

/// Frame backend over host memory. Every buffer gets a distinct fake
/// address so bindings can be told apart.
#[derive(Debug, Default)]
pub struct HostBackend {
    next_address: std::cell::Cell<u64>,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameBackend for HostBackend {
    type Upload<T: Pod> = HostUpload<T>;
    type Allocator = HostAllocator;

    fn create_upload<T: Pod>(&self, usage: BufferUsage, len: usize) -> RendererResult<HostUpload<T>> {
        let address = self.next_address.get() + 0x1000;
        self.next_address.set(address);
        Ok(HostUpload {
            data: vec![bytemuck::Zeroable::zeroed(); len],
            usage,
            address,
        })
    }

    fn create_command_allocator(&self) -> RendererResult<HostAllocator> {
        Ok(HostAllocator::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_gate::ScriptedTimeline;

    fn layout() -> FrameLayout {
        FrameLayout {
            pass_count: 8,
            material_count: 4,
            instance_counts: vec![1, 5, 0],
        }
    }

    #[test]
    fn test_frame_resource_buffer_sizes() {
        let frame = FrameResource::new(&HostBackend::new(), &layout()).unwrap();
        assert_eq!(frame.pass_constants.len(), 8);
        assert_eq!(frame.materials.len(), 4);
        assert_eq!(frame.ssao_constants.len(), 1);
        assert_eq!(frame.instance_buffer_count(), 3);
        assert_eq!(frame.instance_buffer(1).unwrap().len(), 5);
        assert!(frame.instance_buffer(2).unwrap().is_empty());
        assert_eq!(frame.materials.usage(), BufferUsage::Storage);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "no instance buffer"))]
    fn test_missing_instance_buffer() {
        let frame = FrameResource::new(&HostBackend::new(), &layout()).unwrap();
        assert!(matches!(
            frame.instance_buffer(7),
            Err(RendererError::MissingInstanceBuffer(7))
        ));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "pass constant slot"))]
    fn test_pass_slot_out_of_range() {
        let mut frame = FrameResource::new(&HostBackend::new(), &layout()).unwrap();
        assert!(matches!(
            frame.write_pass(8, &PassConstants::default()),
            Err(RendererError::PassSlotOutOfRange { slot: 8, count: 8 })
        ));
    }

    #[test]
    fn test_ring_slots_have_distinct_buffers() {
        let ring = FrameRing::new(&HostBackend::new(), 3, layout()).unwrap();
        let addresses: Vec<u64> = ring
            .iter()
            .map(|frame| frame.instance_buffer(1).unwrap().address().unwrap())
            .collect();
        assert_eq!(addresses.len(), 3);
        assert!(addresses[0] != addresses[1] && addresses[1] != addresses[2]);
    }

    #[test]
    fn test_ring_cycles_through_slots() {
        let timeline = ScriptedTimeline::new();
        let mut ring = FrameRing::new(&HostBackend::new(), 3, layout()).unwrap();
        let mut visited = Vec::new();
        for _ in 0..6 {
            visited.push(ring.advance(&timeline).unwrap());
            ring.post_submission();
        }
        assert_eq!(visited, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(timeline.waits(), vec![1, 2, 3]);
    }

    #[test]
    fn test_host_upload_rejects_overflow() {
        let backend = HostBackend::new();
        let mut upload: HostUpload<u32> = backend.create_upload(BufferUsage::Storage, 2).unwrap();
        upload.write_slice(&[7, 9]).unwrap();
        assert_eq!(upload.as_slice(), &[7, 9]);
        assert!(upload.write_slice(&[1, 2, 3]).is_err());
        assert!(upload.write(2, &1).is_err());
    }
}
