//! Per-instance storage buffer with dense slot allocation.
//!
//! Every renderable owns one fixed-stride record in `Scene/InstanceBuffer`.
//! Passes bind the buffer once and select a record with a dynamic offset, so
//! live records must stay packed in `[0, live_count)`. Removal moves the last
//! record into the freed slot; the moved instance's offset changes and callers
//! must look offsets up again after any removal.
//!
//! A CPU staging mirror holds the bytes of every slot. Writes land there first
//! and reach the GPU either immediately ([`InstanceAllocator::write_record`])
//! or batched into one upload per frame ([`InstanceAllocator::flush`]).

use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use log::{debug, error, info};
use rustc_hash::FxHashMap;

use crate::device::GpuDevice;
use crate::names::scene;
use crate::resource::{
    BindGroupDesc, BindGroupEntryDesc, BindGroupLayoutDesc, BindingResourceDesc, BufferDesc,
    ResourceDesc, ResourceError, ResourceTable,
};

/// Capacity always grows in multiples of this many instances.
pub const GROWTH_GRANULARITY: u32 = 128;

/// Surface parameters of one instance.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialBlock {
    pub base_color: [f32; 4],
    pub emissive: [f32; 4],
    /// Roughness, metallic, specular, ambient occlusion.
    pub params: [f32; 4],
}

static_assertions::assert_eq_size!(MaterialBlock, [u8; 48]);

impl Default for MaterialBlock {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            emissive: [0.0; 4],
            params: [0.5, 0.0, 0.5, 1.0],
        }
    }
}

impl MaterialBlock {
    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color.to_array();
        self
    }

    pub fn with_roughness_metallic(mut self, roughness: f32, metallic: f32) -> Self {
        self.params[0] = roughness;
        self.params[1] = metallic;
        self
    }
}

/// GPU payload of one slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `model`, for transforming normals.
    pub normal_matrix: [[f32; 4]; 4],
    pub material: MaterialBlock,
}

static_assertions::assert_eq_size!(InstanceRecord, [u8; 176]);

impl InstanceRecord {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(model: Mat4, material: MaterialBlock) -> Self {
        // Singular transforms (zero scale) have no inverse; fall back to the model itself.
        let normal = if model.determinant().abs() > f32::EPSILON {
            model.inverse().transpose()
        } else {
            model
        };
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: normal.to_cols_array_2d(),
            material,
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

/// Errors from slot management.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    /// A record was written or released for an id that owns no slot.
    #[error("instance '{id}' has no allocated slot")]
    NotAllocated { id: String },

    /// The id already owns a slot.
    #[error("instance '{id}' already has slot {slot}")]
    AlreadyAllocated { id: String, slot: u32 },

    /// The allocator was used before `init`.
    #[error("instance allocator used before init")]
    NotInitialized,

    /// Creating or writing the storage buffer failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Dense slot allocator over `Scene/InstanceBuffer`.
#[derive(Debug)]
pub struct InstanceAllocator {
    growth: u32,
    stride: u64,
    capacity: u32,
    slots: FxHashMap<String, u32>,
    /// Slot index to owning id; its length is the live count.
    ids: Vec<String>,
    staging: Vec<u8>,
    dirty: Option<Range<u64>>,
    initialized: bool,
}

impl InstanceAllocator {
    /// `growth` is rounded up to [`GROWTH_GRANULARITY`].
    pub fn new(growth: u32) -> Self {
        let growth = align_up(u64::from(growth.max(1)), u64::from(GROWTH_GRANULARITY)) as u32;
        Self {
            growth,
            stride: InstanceRecord::SIZE,
            capacity: 0,
            slots: FxHashMap::default(),
            ids: Vec::new(),
            staging: Vec::new(),
            dirty: None,
            initialized: false,
        }
    }

    /// Create the bind group layout and derive the record stride from the
    /// device's dynamic offset alignment. The buffer itself is created on the
    /// first allocation.
    pub fn init<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) -> Result<(), InstanceError> {
        let alignment = u64::from(table.min_storage_buffer_offset_alignment()?)
            .max(wgpu::COPY_BUFFER_ALIGNMENT);
        self.stride = align_up(InstanceRecord::SIZE, alignment);

        table.create_resource(
            scene::INSTANCE_BIND_GROUP_LAYOUT,
            ResourceDesc::BindGroupLayout(BindGroupLayoutDesc {
                entries: vec![wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(InstanceRecord::SIZE),
                    },
                    count: None,
                }],
            }),
        )?;
        self.initialized = true;
        info!(
            "Instance allocator ready (stride {} bytes, growth {})",
            self.stride, self.growth
        );
        Ok(())
    }

    /// Assign the next dense slot to `id`, growing the buffer when full.
    pub fn allocate_slot<D: GpuDevice>(
        &mut self,
        table: &mut ResourceTable<D>,
        id: &str,
    ) -> Result<u32, InstanceError> {
        if !self.initialized {
            return Err(InstanceError::NotInitialized);
        }
        if let Some(&slot) = self.slots.get(id) {
            error!("Instance '{id}' allocated twice (slot {slot})");
            return Err(InstanceError::AlreadyAllocated {
                id: id.to_string(),
                slot,
            });
        }
        if self.live_count() == self.capacity {
            self.grow(table)?;
        }

        let slot = self.live_count();
        self.ids.push(id.to_string());
        self.slots.insert(id.to_string(), slot);
        debug!("Instance '{id}' -> slot {slot}");
        Ok(slot)
    }

    /// Recreate the buffer and bind group one growth chunk larger and upload
    /// every live record. Existing slot indices are unchanged.
    fn grow<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) -> Result<(), InstanceError> {
        let capacity = self.capacity + self.growth;
        table.create_resource(
            scene::INSTANCE_BUFFER,
            ResourceDesc::Buffer(BufferDesc {
                size: u64::from(capacity) * self.stride,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            }),
        )?;
        table.create_resource(
            scene::INSTANCE_BIND_GROUP,
            ResourceDesc::BindGroup(BindGroupDesc {
                layout: scene::INSTANCE_BIND_GROUP_LAYOUT.to_string(),
                entries: vec![BindGroupEntryDesc {
                    binding: 0,
                    resource: BindingResourceDesc::Buffer {
                        name: scene::INSTANCE_BUFFER.to_string(),
                        offset: 0,
                        size: wgpu::BufferSize::new(InstanceRecord::SIZE),
                    },
                }],
            }),
        )?;
        self.capacity = capacity;
        self.staging.resize((u64::from(capacity) * self.stride) as usize, 0);

        self.upload_all(table)?;
        info!("Instance buffer grown to {capacity} slots");
        Ok(())
    }

    /// Free `id`'s slot, moving the last live record into it.
    ///
    /// The moved record is uploaded at its new offset before this returns.
    pub fn release_slot<D: GpuDevice>(
        &mut self,
        table: &ResourceTable<D>,
        id: &str,
    ) -> Result<(), InstanceError> {
        let Some(slot) = self.slots.remove(id) else {
            error!("Release of unallocated instance '{id}'");
            return Err(InstanceError::NotAllocated { id: id.to_string() });
        };
        let last = self.live_count() - 1;
        let stride = self.stride as usize;
        let last_range = last as usize * stride..(last as usize + 1) * stride;

        self.ids.swap_remove(slot as usize);
        if slot != last {
            let slot_start = slot as usize * stride;
            self.staging
                .copy_within(last_range.clone(), slot_start);
            let moved = &self.ids[slot as usize];
            self.slots.insert(moved.clone(), slot);
            debug!("Instance '{moved}' moved from slot {last} to {slot}");
            table.write_buffer(
                scene::INSTANCE_BUFFER,
                slot_start as u64,
                &self.staging[slot_start..slot_start + stride],
            )?;
        }

        self.staging[last_range.clone()].fill(0);
        self.mark_dirty(last_range.start as u64..last_range.end as u64);
        Ok(())
    }

    /// Stage `record` for `id` and upload it in a single write.
    pub fn write_record<D: GpuDevice>(
        &mut self,
        table: &ResourceTable<D>,
        id: &str,
        record: &InstanceRecord,
    ) -> Result<(), InstanceError> {
        let range = self.stage(id, record)?;
        table.write_buffer(
            scene::INSTANCE_BUFFER,
            range.start,
            &self.staging[range.start as usize..range.end as usize],
        )?;
        Ok(())
    }

    /// Stage `record` for `id`; it reaches the GPU on the next [`flush`](Self::flush).
    pub fn stage_record(&mut self, id: &str, record: &InstanceRecord) -> Result<(), InstanceError> {
        let range = self.stage(id, record)?;
        self.mark_dirty(range);
        Ok(())
    }

    fn stage(&mut self, id: &str, record: &InstanceRecord) -> Result<Range<u64>, InstanceError> {
        let Some(offset) = self.byte_offset(id) else {
            error!("Record written for unallocated instance '{id}'");
            return Err(InstanceError::NotAllocated { id: id.to_string() });
        };
        let start = offset as usize;
        let payload = bytemuck::bytes_of(record);
        self.staging[start..start + payload.len()].copy_from_slice(payload);
        Ok(offset..offset + self.stride)
    }

    fn mark_dirty(&mut self, range: Range<u64>) {
        self.dirty = Some(match self.dirty.take() {
            Some(dirty) => dirty.start.min(range.start)..dirty.end.max(range.end),
            None => range,
        });
    }

    /// Upload every staged change in one write. Returns whether anything was written.
    pub fn flush<D: GpuDevice>(&mut self, table: &ResourceTable<D>) -> Result<bool, InstanceError> {
        let Some(range) = self.dirty.take() else {
            return Ok(false);
        };
        table.write_buffer(
            scene::INSTANCE_BUFFER,
            range.start,
            &self.staging[range.start as usize..range.end as usize],
        )?;
        Ok(true)
    }

    /// Upload all live slots.
    pub fn upload_all<D: GpuDevice>(&mut self, table: &ResourceTable<D>) -> Result<(), InstanceError> {
        let end = u64::from(self.live_count()) * self.stride;
        if end > 0 {
            table.write_buffer(scene::INSTANCE_BUFFER, 0, &self.staging[..end as usize])?;
        }
        self.dirty = None;
        Ok(())
    }

    pub fn slot(&self, id: &str) -> Option<u32> {
        self.slots.get(id).copied()
    }

    /// Current byte offset of `id`'s record. Invalidated by any removal.
    pub fn byte_offset(&self, id: &str) -> Option<u64> {
        self.slot(id).map(|slot| u64::from(slot) * self.stride)
    }

    /// Offset to pass as the dynamic offset when binding `Scene/InstanceBindGroup`.
    pub fn dynamic_offset(&self, id: &str) -> Option<u32> {
        self.byte_offset(id).and_then(|offset| u32::try_from(offset).ok())
    }

    /// Staged record of `id`.
    pub fn read_record(&self, id: &str) -> Option<InstanceRecord> {
        let start = self.byte_offset(id)? as usize;
        let end = start + InstanceRecord::SIZE as usize;
        Some(bytemuck::pod_read_unaligned(&self.staging[start..end]))
    }

    pub fn live_count(&self) -> u32 {
        self.ids.len() as u32
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Instance ids in slot order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn destroy<D: GpuDevice>(&mut self, table: &mut ResourceTable<D>) {
        table.delete_resource(scene::INSTANCE_BIND_GROUP);
        table.delete_resource(scene::INSTANCE_BUFFER);
        table.delete_resource(scene::INSTANCE_BIND_GROUP_LAYOUT);
        self.slots.clear();
        self.ids.clear();
        self.staging.clear();
        self.capacity = 0;
        self.dirty = None;
        self.initialized = false;
    }
}
