//! Mesh combination
//!
//! Groups source submeshes by material, merges each group into one
//! world-space submesh and assembles the groups into a multi-material mesh.
//!
//! Index width follows a running vertex total. Once the total crosses the
//! 16-bit limit the whole result switches to 32-bit indices, and so does every
//! submesh already built before the crossing. Those early submeshes could
//! have stayed 16-bit; the retroactive widening is a known quirk kept so the
//! output matches what the level tooling has always produced.

use ahash::RandomState;
use indexmap::IndexSet;

use crate::math::normal_matrix;
use crate::mesh::{
    CombinedMesh, IndexWidth, MESH_16BIT_VERTEX_LIMIT, MaterialRef, MeshRecord, SubmeshGeometry,
    SubmeshSource,
};

/// Combination settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombineOptions {
    /// Cumulative vertex count above which 32-bit indices are used
    pub vertex_limit_16bit: usize,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            vertex_limit_16bit: MESH_16BIT_VERTEX_LIMIT,
        }
    }
}

/// Merges mesh records into a [`CombinedMesh`]
#[derive(Debug, Clone, Default)]
pub struct MeshCombiner {
    options: CombineOptions,
}

impl MeshCombiner {
    /// Limits above what 16-bit indices can address are clamped.
    pub fn new(mut options: CombineOptions) -> Self {
        if options.vertex_limit_16bit > MESH_16BIT_VERTEX_LIMIT {
            log::warn!(
                "16-bit vertex limit {} is above {}, clamping",
                options.vertex_limit_16bit,
                MESH_16BIT_VERTEX_LIMIT
            );
            options.vertex_limit_16bit = MESH_16BIT_VERTEX_LIMIT;
        }
        Self { options }
    }

    pub fn options(&self) -> &CombineOptions {
        &self.options
    }

    /// Combine `records` into one mesh named `name`.
    ///
    /// Records without vertices are skipped and take no part in material
    /// discovery. An empty input yields an empty mesh.
    pub fn combine(&self, records: &[MeshRecord], name: &str) -> CombinedMesh {
        let sources: Vec<&MeshRecord> = records.iter().filter(|r| !r.is_empty()).collect();
        let materials = discover_materials(&sources);

        let mut vertex_count = 0usize;
        let mut wide = false;
        let mut submeshes = Vec::with_capacity(materials.len());

        for &material in &materials {
            let contributions: Vec<(&MeshRecord, &SubmeshSource)> = sources
                .iter()
                .flat_map(|&record| {
                    record
                        .submeshes
                        .iter()
                        .filter(move |s| s.material == material)
                        .map(move |s| (record, s))
                })
                .collect();

            let mut geometry = merge_group(&contributions);
            vertex_count += geometry.vertex_count();

            if !wide && vertex_count > self.options.vertex_limit_16bit {
                log::debug!(
                    "Mesh \"{}\" crossed {} vertices at {}, switching to 32-bit indices",
                    name,
                    self.options.vertex_limit_16bit,
                    material
                );
                wide = true;
            }

            geometry.index_width = if wide { IndexWidth::U32 } else { IndexWidth::U16 };
            submeshes.push(geometry);
        }

        let index_width = if wide {
            for submesh in &mut submeshes {
                submesh.index_width = IndexWidth::U32;
            }
            IndexWidth::U32
        } else {
            IndexWidth::U16
        };

        if wide {
            log::warn!(
                "Mesh \"{}\" was created from {} meshes and has {} submeshes and {} vertices. \
                 Some old devices, like Android with Mali-400 GPU, do not support over {} vertices.",
                name,
                sources.len(),
                submeshes.len(),
                vertex_count,
                self.options.vertex_limit_16bit
            );
        } else {
            log::info!(
                "Mesh \"{}\" was created from {} meshes and has {} submeshes and {} vertices.",
                name,
                sources.len(),
                submeshes.len(),
                vertex_count
            );
        }

        CombinedMesh {
            name: name.to_string(),
            materials: materials.into_iter().collect(),
            submeshes,
            index_width,
            vertex_count,
            source_count: sources.len(),
        }
    }
}

/// Combine with default options
pub fn combine(records: &[MeshRecord], name: &str) -> CombinedMesh {
    MeshCombiner::default().combine(records, name)
}

fn discover_materials(sources: &[&MeshRecord]) -> IndexSet<MaterialRef, RandomState> {
    let mut materials = IndexSet::with_hasher(RandomState::new());
    for record in sources {
        for submesh in &record.submeshes {
            materials.insert(submesh.material);
        }
    }
    materials
}

/// Append each contribution's full vertex buffer in world space and its
/// submesh indices rebased onto the group buffer.
fn merge_group(contributions: &[(&MeshRecord, &SubmeshSource)]) -> SubmeshGeometry {
    let keep_normals = contributions.iter().all(|(r, _)| r.has_normals());
    let keep_uvs = contributions.iter().all(|(r, _)| r.has_uvs());

    let total_vertices = contributions.iter().map(|(r, _)| r.vertices.len()).sum();
    let total_indices = contributions.iter().map(|(_, s)| s.indices.len()).sum();

    let mut geometry = SubmeshGeometry {
        vertices: Vec::with_capacity(total_vertices),
        indices: Vec::with_capacity(total_indices),
        ..Default::default()
    };

    for (record, submesh) in contributions {
        let base = geometry.vertices.len() as u32;
        let world = record.world_transform;

        geometry
            .vertices
            .extend(record.vertices.iter().map(|&v| world.transform_point3(v)));

        if keep_normals {
            let normal_world = normal_matrix(world);
            geometry
                .normals
                .extend(record.normals.iter().map(|&n| (normal_world * n).normalize_or_zero()));
        }
        if keep_uvs {
            geometry.uvs.extend_from_slice(&record.uvs);
        }

        geometry.indices.extend(submesh.indices.iter().map(|&i| i + base));
    }

    geometry
}
