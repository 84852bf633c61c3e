use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, info, warn};
use rustc_hash::FxHashMap;

use super::{BufferDesc, ResourceDesc, ResourceError, ResourceKind, SamplerDesc, TextureDesc};
use crate::device::GpuDevice;
use crate::names::placeholder;

/// One live GPU object and everything known about it.
#[derive(Debug)]
pub struct ResourceEntry<H> {
    handle: H,
    desc: ResourceDesc,
    version: u64,
    created_at: Instant,
    metadata: BTreeMap<String, String>,
    ref_count: u32,
}

impl<H> ResourceEntry<H> {
    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn kind(&self) -> ResourceKind {
        self.desc.kind()
    }

    pub fn descriptor(&self) -> &ResourceDesc {
        &self.desc
    }

    /// Starts at 1 and grows by one every time the name is (re)created.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }
}

/// Read-only lookup of existing handles handed to [`GpuDevice::create_resource`].
pub struct Resolver<'a, H> {
    entries: &'a FxHashMap<String, ResourceEntry<H>>,
}

impl<'a, H> Resolver<'a, H> {
    pub(crate) fn new(entries: &'a FxHashMap<String, ResourceEntry<H>>) -> Self {
        Self { entries }
    }

    /// Look up a dependency of the resource named `owner`.
    pub fn get(&self, owner: &str, dependency: &str) -> Result<&'a H, ResourceError> {
        self.entries
            .get(dependency)
            .map(|entry| &entry.handle)
            .ok_or_else(|| ResourceError::MissingDependency {
                name: owner.to_string(),
                dependency: dependency.to_string(),
            })
    }
}

/// Lifetime counters for one resource kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindStats {
    /// Currently live.
    pub count: usize,
    /// Total ever created, recreations included.
    pub created: u64,
    /// Total ever destroyed, replacements included.
    pub deleted: u64,
}

/// Snapshot of [`KindStats`] for every kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceStats {
    per_kind: BTreeMap<ResourceKind, KindStats>,
}

impl ResourceStats {
    pub fn get(&self, kind: ResourceKind) -> KindStats {
        self.per_kind.get(&kind).copied().unwrap_or_default()
    }

    pub fn total_count(&self) -> usize {
        self.per_kind.values().map(|s| s.count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, KindStats)> + '_ {
        self.per_kind.iter().map(|(k, s)| (*k, *s))
    }
}

/// The single authority over GPU object lifetimes.
///
/// Every buffer, texture, sampler, layout, pipeline and shader module the
/// renderer uses is created, replaced and destroyed through this table, keyed
/// by a unique name. Callers look handles up by name each frame and never keep
/// them across a recreation.
pub struct ResourceTable<D: GpuDevice> {
    device: Option<D>,
    entries: FxHashMap<String, ResourceEntry<D::Handle>>,
    /// Last version issued per name, kept after deletion so versions never repeat.
    versions: FxHashMap<String, u64>,
    stats: ResourceStats,
}

impl<D: GpuDevice> Default for ResourceTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: GpuDevice> ResourceTable<D> {
    /// An empty table without a device; every create fails until
    /// [`init_device`](Self::init_device) is called.
    pub fn new() -> Self {
        Self {
            device: None,
            entries: FxHashMap::default(),
            versions: FxHashMap::default(),
            stats: ResourceStats::default(),
        }
    }

    pub fn with_device(device: D) -> Self {
        let mut table = Self::new();
        table.init_device(device);
        table
    }

    /// Attach the device. Resources created on a previous device are destroyed.
    pub fn init_device(&mut self, device: D) {
        if self.device.is_some() {
            warn!("Resource table device replaced; clearing {} resources", self.len());
            self.clear_all();
        }
        self.device = Some(device);
        info!("Resource table attached to device");
    }

    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    /// Create `name` from `desc`, replacing any existing resource of that name.
    ///
    /// The new object is built first; the previous handle is destroyed and the
    /// version bumped only once creation succeeded, so a failed call leaves the
    /// table exactly as it was.
    pub fn create_resource(
        &mut self,
        name: &str,
        desc: ResourceDesc,
    ) -> Result<&D::Handle, ResourceError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| ResourceError::DeviceNotInitialized {
                name: name.to_string(),
            })?;

        desc.validate()
            .map_err(|reason| ResourceError::InvalidDescriptor {
                name: name.to_string(),
                reason,
            })?;

        for (dependency, expected) in desc.dependencies() {
            let entry =
                self.entries
                    .get(dependency)
                    .ok_or_else(|| ResourceError::MissingDependency {
                        name: name.to_string(),
                        dependency: dependency.to_string(),
                    })?;
            if entry.kind() != expected {
                return Err(ResourceError::KindMismatch {
                    name: dependency.to_string(),
                    expected,
                    found: entry.kind(),
                });
            }
        }

        let handle = device.create_resource(name, &desc, &Resolver::new(&self.entries))?;
        let kind = desc.kind();

        let version = self.versions.entry(name.to_string()).or_insert(0);
        *version += 1;
        let version = *version;

        let mut entry = ResourceEntry {
            handle,
            desc,
            version,
            created_at: Instant::now(),
            metadata: BTreeMap::new(),
            ref_count: 0,
        };

        if let Some(old) = self.entries.remove(name) {
            // Metadata and references follow the name, not the handle.
            entry.metadata = old.metadata;
            entry.ref_count = old.ref_count;
            let old_kind = old.desc.kind();
            device.destroy_resource(old.handle);
            let stats = self.stats.per_kind.entry(old_kind).or_default();
            stats.count -= 1;
            stats.deleted += 1;
            debug!("Recreated {kind} '{name}' (v{version})");
        } else {
            debug!("Created {kind} '{name}'");
        }

        let stats = self.stats.per_kind.entry(kind).or_default();
        stats.count += 1;
        stats.created += 1;

        let entry = self.entries.entry(name.to_string()).or_insert(entry);
        Ok(&entry.handle)
    }

    pub fn get_resource(&self, name: &str) -> Option<&D::Handle> {
        self.entries.get(name).map(|entry| &entry.handle)
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Option<&ResourceEntry<D::Handle>> {
        self.entries.get(name)
    }

    pub fn version(&self, name: &str) -> Option<u64> {
        self.entries.get(name).map(|entry| entry.version)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ResourceDesc> {
        self.entries.get(name).map(|entry| &entry.desc)
    }

    /// Destroy `name` if it exists. Returns whether it existed.
    pub fn delete_resource(&mut self, name: &str) -> bool {
        let Some(entry) = self.entries.remove(name) else {
            return false;
        };
        let kind = entry.kind();
        if let Some(device) = &self.device {
            device.destroy_resource(entry.handle);
        }
        let stats = self.stats.per_kind.entry(kind).or_default();
        stats.count -= 1;
        stats.deleted += 1;
        debug!("Deleted {kind} '{name}'");
        true
    }

    /// Destroy everything. Counters keep their history.
    pub fn clear_all(&mut self) {
        let names: Vec<String> = self.entries.keys().cloned().collect();
        for name in &names {
            self.delete_resource(name);
        }
        if !names.is_empty() {
            info!("Cleared {} resources", names.len());
        }
    }

    pub fn resource_stats(&self) -> ResourceStats {
        self.stats.clone()
    }

    pub fn update_metadata(
        &mut self,
        name: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ResourceError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ResourceError::NotFound {
                name: name.to_string(),
            })?;
        entry.metadata.insert(key.into(), value.into());
        Ok(())
    }

    /// Names of all live resources of `kind`, sorted.
    pub fn names_of_kind(&self, kind: ResourceKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.kind() == kind)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take a shared reference to `name`. Returns the new count.
    pub fn acquire(&mut self, name: &str) -> Result<u32, ResourceError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ResourceError::NotFound {
                name: name.to_string(),
            })?;
        entry.ref_count += 1;
        Ok(entry.ref_count)
    }

    /// Drop a shared reference; the last release deletes the resource.
    ///
    /// Returns `true` when the resource was deleted.
    pub fn release(&mut self, name: &str) -> Result<bool, ResourceError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ResourceError::NotFound {
                name: name.to_string(),
            })?;
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            self.delete_resource(name);
            return Ok(true);
        }
        Ok(false)
    }

    /// Queue a write into the buffer `name`.
    pub fn write_buffer(&self, name: &str, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| ResourceError::DeviceNotInitialized {
                name: name.to_string(),
            })?;
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ResourceError::NotFound {
                name: name.to_string(),
            })?;
        let size = entry
            .desc
            .buffer_size()
            .ok_or_else(|| ResourceError::KindMismatch {
                name: name.to_string(),
                expected: ResourceKind::Buffer,
                found: entry.kind(),
            })?;
        let len = data.len() as u64;
        let aligned = offset % wgpu::COPY_BUFFER_ALIGNMENT == 0
            && len % wgpu::COPY_BUFFER_ALIGNMENT == 0;
        if !aligned || offset + len > size {
            return Err(ResourceError::InvalidWrite {
                name: name.to_string(),
                offset,
                len,
                size,
            });
        }
        device.write_buffer(&entry.handle, offset, data)
    }

    pub fn create_encoder(&self, label: &str) -> Result<D::Encoder, ResourceError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| ResourceError::DeviceNotInitialized {
                name: label.to_string(),
            })?;
        Ok(device.create_encoder(label))
    }

    pub fn submit(&self, encoder: D::Encoder) -> Result<(), ResourceError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| ResourceError::DeviceNotInitialized {
                name: "submit".to_string(),
            })?;
        device.submit(encoder);
        Ok(())
    }

    pub fn min_storage_buffer_offset_alignment(&self) -> Result<u32, ResourceError> {
        self.device
            .as_ref()
            .map(|device| device.min_storage_buffer_offset_alignment())
            .ok_or_else(|| ResourceError::DeviceNotInitialized {
                name: "limits".to_string(),
            })
    }

    /// Create the fallback texture, buffers and sampler under
    /// [`crate::names::placeholder`].
    pub fn create_placeholders(&mut self) -> Result<(), ResourceError> {
        self.create_resource(
            placeholder::TEXTURE,
            ResourceDesc::Texture(TextureDesc::d2(
                1,
                1,
                wgpu::TextureFormat::Rgba8Unorm,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            )),
        )?;
        self.create_resource(
            placeholder::UNIFORM_BUFFER,
            ResourceDesc::Buffer(BufferDesc {
                size: 16,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            }),
        )?;
        self.create_resource(
            placeholder::STORAGE_BUFFER,
            ResourceDesc::Buffer(BufferDesc {
                size: 16,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            }),
        )?;
        self.create_resource(
            placeholder::SAMPLER,
            ResourceDesc::Sampler(SamplerDesc::nearest_clamp()),
        )?;
        Ok(())
    }
}

impl<D: GpuDevice> Drop for ResourceTable<D> {
    fn drop(&mut self) {
        self.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use crate::resource::{BindGroupDesc, BindGroupEntryDesc, BindGroupLayoutDesc};
    use crate::resource::BindingResourceDesc;

    fn uniform(size: u64) -> ResourceDesc {
        ResourceDesc::Buffer(BufferDesc {
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
    }

    fn table() -> ResourceTable<HeadlessDevice> {
        ResourceTable::with_device(HeadlessDevice::new())
    }

    fn layout() -> ResourceDesc {
        ResourceDesc::BindGroupLayout(BindGroupLayoutDesc {
            entries: vec![wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        })
    }

    #[test]
    fn test_create_before_device_is_fatal() {
        let mut table: ResourceTable<HeadlessDevice> = ResourceTable::new();
        let err = table.create_resource("buf", uniform(16)).unwrap_err();
        assert!(matches!(err, ResourceError::DeviceNotInitialized { .. }));
        assert!(err.is_configuration_error());
        assert!(table.is_empty());
    }

    #[test]
    fn test_recreate_keeps_one_handle_and_bumps_version() {
        let mut table = table();
        table.create_resource("buf", uniform(16)).unwrap();
        assert_eq!(table.version("buf"), Some(1));
        table.create_resource("buf", uniform(32)).unwrap();
        table.create_resource("buf", uniform(64)).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.version("buf"), Some(3));
        assert_eq!(table.descriptor("buf").and_then(|d| d.buffer_size()), Some(64));

        let device = table.device().unwrap();
        assert_eq!(device.live_count(), 1);
        assert_eq!(device.destroyed_count(), 2);

        let stats = table.resource_stats().get(ResourceKind::Buffer);
        assert_eq!(stats, KindStats { count: 1, created: 3, deleted: 2 });
    }

    #[test]
    fn test_versions_never_repeat_after_delete() {
        let mut table = table();
        table.create_resource("tex", uniform(16)).unwrap();
        table.create_resource("tex", uniform(16)).unwrap();
        assert!(table.delete_resource("tex"));
        table.create_resource("tex", uniform(16)).unwrap();
        assert_eq!(table.version("tex"), Some(3));
    }

    #[test]
    fn test_delete_reports_existence() {
        let mut table = table();
        table.create_resource("buf", uniform(16)).unwrap();
        assert!(table.has_resource("buf"));
        assert!(table.delete_resource("buf"));
        assert!(!table.delete_resource("buf"));
        assert!(table.get_resource("buf").is_none());
        let stats = table.resource_stats().get(ResourceKind::Buffer);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.deleted, 1);
    }

    #[test]
    fn test_failed_recreate_leaves_entry_intact() {
        let mut table = table();
        table.create_resource("group", layout()).unwrap();
        let before = table.resource_stats();

        let bad = ResourceDesc::Texture(TextureDesc::d2(
            0,
            0,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING,
        ));
        let err = table.create_resource("group", bad).unwrap_err();
        assert!(matches!(err, ResourceError::InvalidDescriptor { .. }));

        assert_eq!(table.version("group"), Some(1));
        assert_eq!(
            table.entry("group").map(|e| e.kind()),
            Some(ResourceKind::BindGroupLayout)
        );
        assert_eq!(table.resource_stats(), before);
    }

    #[test]
    fn test_missing_dependency_fails_single_call() {
        let mut table = table();
        let desc = ResourceDesc::BindGroup(BindGroupDesc {
            layout: "missing-layout".into(),
            entries: Vec::new(),
        });
        let err = table.create_resource("group", desc).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::MissingDependency { ref dependency, .. } if dependency == "missing-layout"
        ));
        assert!(table.is_empty());
        assert_eq!(table.device().unwrap().live_count(), 0);
    }

    #[test]
    fn test_dependency_kind_is_checked() {
        let mut table = table();
        table.create_resource("layout", layout()).unwrap();
        table.create_resource("not-a-buffer", layout()).unwrap();
        let desc = ResourceDesc::BindGroup(BindGroupDesc {
            layout: "layout".into(),
            entries: vec![BindGroupEntryDesc {
                binding: 0,
                resource: BindingResourceDesc::buffer("not-a-buffer"),
            }],
        });
        let err = table.create_resource("group", desc).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::KindMismatch {
                expected: ResourceKind::Buffer,
                found: ResourceKind::BindGroupLayout,
                ..
            }
        ));
    }

    #[test]
    fn test_metadata_survives_recreation() {
        let mut table = table();
        table.create_resource("buf", uniform(16)).unwrap();
        table.update_metadata("buf", "owner", "scene").unwrap();
        table.create_resource("buf", uniform(32)).unwrap();
        assert_eq!(
            table.entry("buf").unwrap().metadata().get("owner").map(String::as_str),
            Some("scene")
        );
        assert!(matches!(
            table.update_metadata("nope", "k", "v"),
            Err(ResourceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_write_buffer_bounds_are_enforced() {
        let mut table = table();
        table.create_resource("buf", uniform(16)).unwrap();
        table.write_buffer("buf", 0, &[1u8; 16]).unwrap();
        assert!(matches!(
            table.write_buffer("buf", 8, &[0u8; 16]),
            Err(ResourceError::InvalidWrite { .. })
        ));
        assert!(matches!(
            table.write_buffer("buf", 2, &[0u8; 4]),
            Err(ResourceError::InvalidWrite { .. })
        ));

        let handle = table.get_resource("buf").unwrap();
        let bytes = table.device().unwrap().buffer_contents(handle).unwrap();
        assert_eq!(bytes, vec![1u8; 16]);
    }

    #[test]
    fn test_release_last_reference_deletes() {
        let mut table = table();
        table.create_resource("shared", uniform(16)).unwrap();
        assert_eq!(table.acquire("shared").unwrap(), 1);
        assert_eq!(table.acquire("shared").unwrap(), 2);
        assert!(!table.release("shared").unwrap());
        assert!(table.has_resource("shared"));
        assert!(table.release("shared").unwrap());
        assert!(!table.has_resource("shared"));
    }

    #[test]
    fn test_placeholders_and_kind_listing() {
        let mut table = table();
        table.create_placeholders().unwrap();
        assert_eq!(
            table.names_of_kind(ResourceKind::Buffer),
            vec![placeholder::STORAGE_BUFFER, placeholder::UNIFORM_BUFFER]
        );
        assert!(table.has_resource(placeholder::TEXTURE));
        assert!(table.has_resource(placeholder::SAMPLER));
        assert_eq!(table.resource_stats().total_count(), 4);
    }

    #[test]
    fn test_clear_all_keeps_history() {
        let mut table = table();
        table.create_resource("a", uniform(16)).unwrap();
        table.create_resource("b", uniform(16)).unwrap();
        table.clear_all();
        assert!(table.is_empty());
        let stats = table.resource_stats().get(ResourceKind::Buffer);
        assert_eq!(stats, KindStats { count: 0, created: 2, deleted: 2 });
        assert_eq!(table.device().unwrap().live_count(), 0);
    }

    #[test]
    fn test_uniqueness_over_mixed_sequence() {
        let mut table = table();
        let names = ["a", "b", "a", "c", "b", "a"];
        let mut last_version: FxHashMap<&str, u64> = FxHashMap::default();
        for name in names {
            table.create_resource(name, uniform(16)).unwrap();
            let version = table.version(name).unwrap();
            if let Some(previous) = last_version.insert(name, version) {
                assert!(version > previous);
            }
            assert_eq!(table.device().unwrap().live_count(), table.len());
        }
        assert_eq!(table.len(), 3);
    }
}
