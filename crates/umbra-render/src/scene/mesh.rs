//! Static mesh vertex data and its GPU buffers.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use log::debug;

use crate::device::GpuDevice;
use crate::names::scene;
use crate::resource::{BufferDesc, ResourceDesc, ResourceError, ResourceTable, VertexLayoutDesc};

/// The single vertex format every mesh arrives in.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct StaticVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub uv: [[f32; 2]; 4],
}

static_assertions::assert_eq_size!(StaticVertex, [u8; 68]);

impl StaticVertex {
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(position: Vec3, normal: Vec3, tangent: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tangent: tangent.to_array(),
            uv: [uv, [0.0; 2], [0.0; 2], [0.0; 2]],
        }
    }

    pub fn layout() -> VertexLayoutDesc {
        VertexLayoutDesc {
            array_stride: Self::STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: wgpu::vertex_attr_array![
                0 => Float32x3,
                1 => Float32x3,
                2 => Float32x3,
                3 => Float32x2,
                4 => Float32x2,
                5 => Float32x2,
                6 => Float32x2
            ]
            .to_vec(),
        }
    }
}

/// Index data that can be either u16 or u32 format.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    pub fn format(&self) -> wgpu::IndexFormat {
        match self {
            IndexData::U16(_) => wgpu::IndexFormat::Uint16,
            IndexData::U32(_) => wgpu::IndexFormat::Uint32,
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            IndexData::U16(data) => data.len() as u32,
            IndexData::U32(data) => data.len() as u32,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(data) => bytemuck::cast_slice(data),
            IndexData::U32(data) => bytemuck::cast_slice(data),
        }
    }

    fn max_index(&self) -> Option<u32> {
        match self {
            IndexData::U16(data) => data.iter().max().map(|&i| u32::from(i)),
            IndexData::U32(data) => data.iter().max().copied(),
        }
    }
}

/// Errors for vertex data handed over by a loader.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// The loader's vertex stride does not match [`StaticVertex`].
    #[error("vertex stride {found} does not match the expected {expected}")]
    StrideMismatch { expected: u64, found: u64 },

    /// The byte length is not a whole number of vertices.
    #[error("{len} vertex bytes is not a multiple of the {stride}-byte stride")]
    Truncated { len: usize, stride: u64 },

    /// An index points past the last vertex.
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: u32 },

    #[error("mesh has no indices")]
    Empty,
}

/// CPU-side mesh in the vertex layout the passes expect.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    vertices: Vec<u8>,
    vertex_count: u32,
    indices: IndexData,
}

impl MeshData {
    pub fn from_vertices(vertices: &[StaticVertex], indices: IndexData) -> Result<Self, MeshError> {
        Self::from_raw(bytemuck::cast_slice(vertices).to_vec(), StaticVertex::STRIDE, indices)
    }

    /// Take loader output as is. No format conversion is attempted.
    pub fn from_raw(vertices: Vec<u8>, stride: u64, indices: IndexData) -> Result<Self, MeshError> {
        if stride != StaticVertex::STRIDE {
            return Err(MeshError::StrideMismatch {
                expected: StaticVertex::STRIDE,
                found: stride,
            });
        }
        if vertices.len() as u64 % stride != 0 {
            return Err(MeshError::Truncated {
                len: vertices.len(),
                stride,
            });
        }
        let vertex_count = (vertices.len() as u64 / stride) as u32;
        match indices.max_index() {
            None => return Err(MeshError::Empty),
            Some(index) if index >= vertex_count => {
                return Err(MeshError::IndexOutOfRange {
                    index,
                    vertex_count,
                })
            }
            Some(_) => {}
        }
        Ok(Self {
            vertices,
            vertex_count,
            indices,
        })
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn indices(&self) -> &IndexData {
        &self.indices
    }

    /// Axis-aligned cube centred on the origin, four vertices per face.
    pub fn cube(half_extent: f32) -> Self {
        let faces: [(Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (Vec3::NEG_Y, Vec3::X),
            (Vec3::Z, Vec3::X),
            (Vec3::NEG_Z, Vec3::NEG_X),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, tangent) in faces {
            let bitangent = normal.cross(tangent);
            let base = vertices.len() as u16;
            for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                let position = (normal + tangent * (u * 2.0 - 1.0) + bitangent * (v * 2.0 - 1.0))
                    * half_extent;
                vertices.push(StaticVertex::new(position, normal, tangent, [u, 1.0 - v]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self {
            vertex_count: vertices.len() as u32,
            vertices: bytemuck::cast_slice(&vertices).to_vec(),
            indices: IndexData::U16(indices),
        }
    }

    /// Square on the XZ plane facing +Y.
    pub fn plane(half_extent: f32) -> Self {
        let h = half_extent;
        let vertices = [
            StaticVertex::new(Vec3::new(-h, 0.0, h), Vec3::Y, Vec3::X, [0.0, 0.0]),
            StaticVertex::new(Vec3::new(h, 0.0, h), Vec3::Y, Vec3::X, [1.0, 0.0]),
            StaticVertex::new(Vec3::new(h, 0.0, -h), Vec3::Y, Vec3::X, [1.0, 1.0]),
            StaticVertex::new(Vec3::new(-h, 0.0, -h), Vec3::Y, Vec3::X, [0.0, 1.0]),
        ];
        Self {
            vertex_count: 4,
            vertices: bytemuck::cast_slice(&vertices).to_vec(),
            indices: IndexData::U16(vec![0, 1, 2, 0, 2, 3]),
        }
    }
}

/// Pad to the copy alignment; u16 index data can end on a 2-byte boundary.
fn padded(bytes: &[u8]) -> Vec<u8> {
    let mut data = bytes.to_vec();
    let aligned = data.len().div_ceil(4) * 4;
    data.resize(aligned.max(4), 0);
    data
}

/// Table names and draw parameters of an uploaded mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuMesh {
    pub id: String,
    pub vertex_buffer: String,
    pub index_buffer: String,
    pub index_count: u32,
    pub index_format: wgpu::IndexFormat,
}

impl GpuMesh {
    /// Create and fill `Mesh/<id>/Vertices` and `Mesh/<id>/Indices`.
    pub fn upload<D: GpuDevice>(
        table: &mut ResourceTable<D>,
        id: &str,
        data: &MeshData,
    ) -> Result<Self, ResourceError> {
        let vertex_buffer = scene::mesh_vertices(id);
        let index_buffer = scene::mesh_indices(id);

        for (name, bytes, usage) in [
            (&vertex_buffer, data.vertex_bytes(), wgpu::BufferUsages::VERTEX),
            (&index_buffer, data.indices().as_bytes(), wgpu::BufferUsages::INDEX),
        ] {
            let contents = padded(bytes);
            table.create_resource(
                name,
                ResourceDesc::Buffer(BufferDesc {
                    size: contents.len() as u64,
                    usage: usage | wgpu::BufferUsages::COPY_DST,
                }),
            )?;
            table.write_buffer(name, 0, &contents)?;
        }

        debug!(
            "Uploaded mesh '{id}' ({} vertices, {} indices)",
            data.vertex_count(),
            data.indices().count()
        );
        Ok(Self {
            id: id.to_string(),
            vertex_buffer,
            index_buffer,
            index_count: data.indices().count(),
            index_format: data.indices().format(),
        })
    }

    pub fn destroy<D: GpuDevice>(&self, table: &mut ResourceTable<D>) {
        table.delete_resource(&self.vertex_buffer);
        table.delete_resource(&self.index_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    #[test]
    fn test_wrong_stride_is_rejected() {
        let err = MeshData::from_raw(vec![0; 64], 32, IndexData::U16(vec![0])).unwrap_err();
        assert!(matches!(err, MeshError::StrideMismatch { found: 32, .. }));
    }

    #[test]
    fn test_truncated_and_out_of_range_data() {
        let err = MeshData::from_raw(vec![0; 70], 68, IndexData::U16(vec![0])).unwrap_err();
        assert!(matches!(err, MeshError::Truncated { .. }));

        let err = MeshData::from_raw(vec![0; 136], 68, IndexData::U32(vec![0, 1, 2])).unwrap_err();
        assert!(matches!(
            err,
            MeshError::IndexOutOfRange {
                index: 2,
                vertex_count: 2
            }
        ));
    }

    #[test]
    fn test_cube_has_24_vertices_and_36_indices() {
        let cube = MeshData::cube(0.5);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.indices().count(), 36);
        assert_eq!(cube.vertex_bytes().len(), 24 * 68);
        let inside = cube
            .vertex_bytes()
            .chunks_exact(68)
            .map(bytemuck::pod_read_unaligned::<StaticVertex>)
            .all(|v| v.position.iter().all(|c| c.abs() <= 0.5 + 1e-6));
        assert!(inside);
    }

    #[test]
    fn test_layout_covers_all_attributes() {
        let layout = StaticVertex::layout();
        assert_eq!(layout.array_stride, 68);
        assert_eq!(layout.attributes.len(), 7);
        assert_eq!(layout.attributes[6].offset, 60);
    }

    #[test]
    fn test_upload_pads_odd_u16_index_data() {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let vertices = [StaticVertex::default(); 3];
        let data = MeshData::from_vertices(&vertices, IndexData::U16(vec![0, 1, 2])).unwrap();
        let mesh = GpuMesh::upload(&mut table, "tri", &data).unwrap();

        assert_eq!(mesh.vertex_buffer, "Mesh/tri/Vertices");
        assert_eq!(table.descriptor(&mesh.index_buffer).and_then(|d| d.buffer_size()), Some(8));
        let handle = table.get_resource(&mesh.index_buffer).unwrap();
        let bytes = table.device().unwrap().buffer_contents(handle).unwrap();
        assert_eq!(&bytes[..6], bytemuck::cast_slice::<u16, u8>(&[0, 1, 2]));

        mesh.destroy(&mut table);
        assert!(table.is_empty());
    }
}
