//! Mesh and Geometry
//!
//! Source mesh records handed to the combiner and the combined multi-material
//! mesh it produces.

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::math::Aabb;

/// Largest vertex count addressable with 16-bit indices
pub const MESH_16BIT_VERTEX_LIMIT: usize = 65535;

/// Opaque material identity.
///
/// Two refs are the same material only if they are the same handle; material
/// content is never compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialRef(pub u64);

impl MaterialRef {
    /// Get the raw handle value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MaterialRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "material#{}", self.0)
    }
}

/// Mesh geometry as stored on a scene node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshData {
    /// Mesh name
    pub name: String,
    /// Local-space positions
    pub vertices: Vec<Vec3>,
    /// Per-vertex normals, empty when absent
    pub normals: Vec<Vec3>,
    /// Per-vertex texture coordinates, empty when absent
    pub uvs: Vec<Vec2>,
    /// Index list per submesh
    pub submeshes: Vec<Vec<u32>>,
}

impl MeshData {
    /// Create a single-submesh mesh
    pub fn new(name: impl Into<String>, vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            vertices,
            normals: Vec::new(),
            uvs: Vec::new(),
            submeshes: vec![indices],
        }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Local-space bounds, `None` when the mesh has no vertices
    pub fn local_bounds(&self) -> Option<Aabb> {
        Aabb::from_points(&self.vertices)
    }
}

/// One submesh of a source record bound to its material slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmeshSource {
    pub indices: Vec<u32>,
    pub material: MaterialRef,
}

/// One source mesh to be merged, already resolved out of the scene
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRecord {
    /// Name of the node the record came from
    pub name: String,
    /// Local-space positions
    pub vertices: Vec<Vec3>,
    /// Per-vertex normals, empty when absent
    pub normals: Vec<Vec3>,
    /// Per-vertex texture coordinates, empty when absent
    pub uvs: Vec<Vec2>,
    /// Submeshes with their materials
    pub submeshes: Vec<SubmeshSource>,
    /// Local to world transform at combination time
    pub world_transform: Mat4,
}

impl MeshRecord {
    /// Pair each submesh of `mesh` with the material in the same slot.
    ///
    /// Submeshes without a material slot, and slots without a submesh, are
    /// dropped.
    pub fn from_mesh(
        name: impl Into<String>,
        mesh: &MeshData,
        materials: &[MaterialRef],
        world_transform: Mat4,
    ) -> Self {
        let submeshes = mesh
            .submeshes
            .iter()
            .zip(materials)
            .map(|(indices, &material)| SubmeshSource {
                indices: indices.clone(),
                material,
            })
            .collect();

        Self {
            name: name.into(),
            vertices: mesh.vertices.clone(),
            normals: mesh.normals.clone(),
            uvs: mesh.uvs.clone(),
            submeshes,
            world_transform,
        }
    }

    /// Records without vertices are treated as absent
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        !self.vertices.is_empty() && self.normals.len() == self.vertices.len()
    }

    pub fn has_uvs(&self) -> bool {
        !self.vertices.is_empty() && self.uvs.len() == self.vertices.len()
    }
}

/// Bit width of an index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IndexWidth {
    #[default]
    U16,
    U32,
}

impl IndexWidth {
    /// Size of one index in bytes
    pub fn bytes(&self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// Index data in its declared width
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexBuffer {
    pub fn len(&self) -> usize {
        match self {
            Self::U16(indices) => indices.len(),
            Self::U32(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> IndexWidth {
        match self {
            Self::U16(_) => IndexWidth::U16,
            Self::U32(_) => IndexWidth::U32,
        }
    }
}

/// Merged world-space geometry for one material
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmeshGeometry {
    pub vertices: Vec<Vec3>,
    /// Empty unless every contribution carried normals
    pub normals: Vec<Vec3>,
    /// Empty unless every contribution carried texture coordinates
    pub uvs: Vec<Vec2>,
    /// Indices into this submesh's own vertex buffer
    pub indices: Vec<u32>,
    pub index_width: IndexWidth,
}

impl SubmeshGeometry {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Indices narrowed to the declared width.
    ///
    /// A 16-bit submesh holding an index above `u16::MAX` falls back to a
    /// 32-bit buffer instead of wrapping.
    pub fn index_buffer(&self) -> IndexBuffer {
        if self.index_width == IndexWidth::U16 {
            let narrowed: Result<Vec<u16>, _> =
                self.indices.iter().map(|&i| u16::try_from(i)).collect();
            match narrowed {
                Ok(indices) => return IndexBuffer::U16(indices),
                Err(_) => log::warn!(
                    "16-bit submesh with {} vertices does not fit 16-bit indices, using 32-bit",
                    self.vertices.len()
                ),
            }
        }
        IndexBuffer::U32(self.indices.clone())
    }
}

/// Result of a combine call: one submesh per unique material
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedMesh {
    pub name: String,
    /// Unique materials in first-seen order
    pub materials: Vec<MaterialRef>,
    /// `submeshes[i]` is drawn with `materials[i]`
    pub submeshes: Vec<SubmeshGeometry>,
    pub index_width: IndexWidth,
    /// Cumulative vertex count across all merged contributions
    pub vertex_count: usize,
    /// Number of non-empty records that were merged
    pub source_count: usize,
}

impl CombinedMesh {
    pub fn is_empty(&self) -> bool {
        self.submeshes.is_empty()
    }

    pub fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }

    /// World-space bounds of all submeshes
    pub fn bounds(&self) -> Option<Aabb> {
        self.submeshes
            .iter()
            .filter_map(|s| Aabb::from_points(&s.vertices))
            .reduce(|a, b| a.merge(&b))
    }

    /// Concatenate every submesh into one vertex buffer and one index list,
    /// rebasing each submesh's indices past the vertices before it.
    pub fn flattened(&self) -> (Vec<Vec3>, Vec<u32>) {
        let mut vertices = Vec::with_capacity(self.submeshes.iter().map(|s| s.vertices.len()).sum());
        let mut indices = Vec::with_capacity(self.submeshes.iter().map(|s| s.indices.len()).sum());
        for submesh in &self.submeshes {
            let base = vertices.len() as u32;
            vertices.extend_from_slice(&submesh.vertices);
            indices.extend(submesh.indices.iter().map(|&i| i + base));
        }
        (vertices, indices)
    }
}
