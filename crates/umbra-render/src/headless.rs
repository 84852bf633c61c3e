//! A device that records what it is asked to do instead of talking to a GPU.
//!
//! Buffers keep their bytes in memory so writes can be read back, every
//! created and destroyed handle is counted, and submitted encoders are kept
//! with the commands passes recorded into them.

use std::cell::{Cell, RefCell};

use rustc_hash::FxHashMap;

use crate::device::GpuDevice;
use crate::resource::{ResourceDesc, ResourceError, ResourceKind, Resolver};

/// Default dynamic offset alignment reported by most adapters.
pub const DEFAULT_OFFSET_ALIGNMENT: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessHandle {
    pub id: u64,
    pub kind: ResourceKind,
    pub label: String,
}

/// Commands recorded for one frame.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeadlessEncoder {
    pub label: String,
    pub commands: Vec<String>,
}

impl HeadlessEncoder {
    pub fn record(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }
}

pub struct HeadlessDevice {
    next_id: Cell<u64>,
    live: Cell<usize>,
    destroyed: Cell<usize>,
    buffers: RefCell<FxHashMap<u64, Vec<u8>>>,
    writes: Cell<usize>,
    submitted: RefCell<Vec<HeadlessEncoder>>,
    alignment: u32,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_alignment(DEFAULT_OFFSET_ALIGNMENT)
    }

    pub fn with_alignment(alignment: u32) -> Self {
        Self {
            next_id: Cell::new(1),
            live: Cell::new(0),
            destroyed: Cell::new(0),
            buffers: RefCell::new(FxHashMap::default()),
            writes: Cell::new(0),
            submitted: RefCell::new(Vec::new()),
            alignment,
        }
    }

    /// Handles created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.live.get()
    }

    pub fn destroyed_count(&self) -> usize {
        self.destroyed.get()
    }

    /// Number of buffer writes queued so far.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    /// Current bytes of a live buffer.
    pub fn buffer_contents(&self, handle: &HeadlessHandle) -> Option<Vec<u8>> {
        self.buffers.borrow().get(&handle.id).cloned()
    }

    /// Encoders handed to [`GpuDevice::submit`], oldest first.
    pub fn submitted(&self) -> Vec<HeadlessEncoder> {
        self.submitted.borrow().clone()
    }
}

impl GpuDevice for HeadlessDevice {
    type Handle = HeadlessHandle;
    type Encoder = HeadlessEncoder;

    fn create_resource(
        &self,
        name: &str,
        desc: &ResourceDesc,
        deps: &Resolver<'_, HeadlessHandle>,
    ) -> Result<HeadlessHandle, ResourceError> {
        for (dependency, _) in desc.dependencies() {
            deps.get(name, dependency)?;
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        if let ResourceDesc::Buffer(buffer) = desc {
            self.buffers
                .borrow_mut()
                .insert(id, vec![0; buffer.size as usize]);
        }
        self.live.set(self.live.get() + 1);
        Ok(HeadlessHandle {
            id,
            kind: desc.kind(),
            label: name.to_string(),
        })
    }

    fn destroy_resource(&self, handle: HeadlessHandle) {
        self.buffers.borrow_mut().remove(&handle.id);
        self.live.set(self.live.get() - 1);
        self.destroyed.set(self.destroyed.get() + 1);
    }

    fn write_buffer(
        &self,
        buffer: &HeadlessHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let mut buffers = self.buffers.borrow_mut();
        let bytes = buffers
            .get_mut(&buffer.id)
            .ok_or_else(|| ResourceError::KindMismatch {
                name: buffer.label.clone(),
                expected: ResourceKind::Buffer,
                found: buffer.kind,
            })?;
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(ResourceError::InvalidWrite {
                name: buffer.label.clone(),
                offset,
                len: data.len() as u64,
                size: bytes.len() as u64,
            });
        }
        bytes[start..end].copy_from_slice(data);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn create_encoder(&self, label: &str) -> HeadlessEncoder {
        HeadlessEncoder {
            label: label.to_string(),
            commands: Vec::new(),
        }
    }

    fn submit(&self, encoder: HeadlessEncoder) {
        self.submitted.borrow_mut().push(encoder);
    }

    fn min_storage_buffer_offset_alignment(&self) -> u32 {
        self.alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::BufferDesc;

    #[test]
    fn test_buffers_start_zeroed_and_accept_writes() {
        let device = HeadlessDevice::new();
        let entries = FxHashMap::default();
        let desc = ResourceDesc::Buffer(BufferDesc {
            size: 8,
            usage: wgpu::BufferUsages::COPY_DST,
        });
        let handle = device
            .create_resource("buf", &desc, &Resolver::new(&entries))
            .unwrap();
        assert_eq!(device.buffer_contents(&handle), Some(vec![0; 8]));

        device.write_buffer(&handle, 4, &[7, 7, 7, 7]).unwrap();
        assert_eq!(
            device.buffer_contents(&handle),
            Some(vec![0, 0, 0, 0, 7, 7, 7, 7])
        );
        assert_eq!(device.write_count(), 1);

        device.destroy_resource(handle.clone());
        assert_eq!(device.buffer_contents(&handle), None);
        assert_eq!(device.live_count(), 0);
    }

    #[test]
    fn test_submitted_encoders_are_kept_in_order() {
        let device = HeadlessDevice::new();
        let mut first = device.create_encoder("frame-1");
        first.record("draw");
        device.submit(first);
        device.submit(device.create_encoder("frame-2"));

        let submitted = device.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].commands, vec!["draw".to_string()]);
        assert_eq!(submitted[1].label, "frame-2");
    }
}
