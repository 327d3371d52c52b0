//! Prefab persistence
//!
//! Prefabs are JSON documents under the project's prefab directory. Mesh
//! payloads they reference are cooked to binary `.mesh` files under
//! `<prefab_dir>/Meshes`, named by content hash so identical geometry is
//! written once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use meshbake_core::{CombinedMesh, Transform};
use meshbake_physics::{
    ColliderGroup, ColliderMesh, ColliderObject, Layer, Layers, MeshCollider,
};
use serde::{Deserialize, Serialize};

use crate::scene_doc::MaterialTable;
use crate::{AssetDatabase, AssetError, AssetId, AssetResult, AssetType};

/// Sub-directory of the prefab directory holding cooked meshes
pub const MESH_DIR: &str = "Meshes";

/// Binary mesh payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CookedMesh {
    Combined(CombinedMesh),
    Collider(ColliderMesh),
}

impl CookedMesh {
    pub fn to_bytes(&self) -> AssetResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| AssetError::SerializationError(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> AssetResult<Self> {
        bincode::deserialize(bytes).map_err(|e| AssetError::SerializationError(e.to_string()))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Combined(mesh) => &mesh.name,
            Self::Collider(mesh) => &mesh.name,
        }
    }
}

/// Renderer attached to a prefab node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefabRenderer {
    pub mesh: AssetId,
    /// Material names, one per submesh
    pub materials: Vec<String>,
}

/// Collider attached to a prefab node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefabCollider {
    pub mesh: AssetId,
    pub convex: bool,
}

/// One node of a prefab
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefabNode {
    pub name: String,
    pub transform: Transform,
    pub layer: Layer,
    pub renderer: Option<PrefabRenderer>,
    pub collider: Option<PrefabCollider>,
    /// Model file instanced by this node, relative to the project root
    pub model: Option<PathBuf>,
    pub children: Vec<PrefabNode>,
}

impl PrefabNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            ..Default::default()
        }
    }

    pub fn find(&self, name: &str) -> Option<&PrefabNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Prefab file root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefabDocument {
    pub name: String,
    pub root: PrefabNode,
}

impl PrefabDocument {
    pub fn to_json(&self) -> AssetResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| AssetError::SerializationError(e.to_string()))
    }

    pub fn from_json(text: &str) -> AssetResult<Self> {
        serde_json::from_str(text).map_err(|e| AssetError::SerializationError(e.to_string()))
    }

    /// Mesh assets referenced anywhere in the tree
    pub fn mesh_references(&self) -> Vec<AssetId> {
        let mut ids = Vec::new();
        let mut open = vec![&self.root];
        while let Some(node) = open.pop() {
            if let Some(renderer) = &node.renderer {
                ids.push(renderer.mesh);
            }
            if let Some(collider) = &node.collider {
                ids.push(collider.mesh);
            }
            open.extend(node.children.iter());
        }
        ids.sort_by_key(|id| id.value());
        ids.dedup();
        ids
    }
}

/// Writes and reads prefabs inside a project
pub struct PrefabStore {
    database: Arc<AssetDatabase>,
    prefab_dir: PathBuf,
}

impl PrefabStore {
    /// `prefab_dir` is relative to the database's project root
    pub fn new(database: Arc<AssetDatabase>, prefab_dir: impl Into<PathBuf>) -> Self {
        Self {
            database,
            prefab_dir: prefab_dir.into(),
        }
    }

    pub fn database(&self) -> &Arc<AssetDatabase> {
        &self.database
    }

    pub fn prefab_dir(&self) -> &Path {
        &self.prefab_dir
    }

    /// Project-relative path of the prefab named `name`
    pub fn prefab_path(&self, name: &str) -> PathBuf {
        self.prefab_dir.join(format!("{}.prefab", name))
    }

    /// Persist a combined mesh as a prefab with a single renderer
    pub fn save_combined(
        &self,
        combined: &CombinedMesh,
        materials: &MaterialTable,
    ) -> AssetResult<PathBuf> {
        let mesh = self.write_mesh(&CookedMesh::Combined(combined.clone()))?;
        let material_names = combined
            .materials
            .iter()
            .map(|m| {
                materials
                    .name(*m)
                    .map(str::to_string)
                    .unwrap_or_else(|| m.to_string())
            })
            .collect();

        let mut root = PrefabNode::new(combined.name.clone());
        root.renderer = Some(PrefabRenderer {
            mesh,
            materials: material_names,
        });

        self.write_prefab(&PrefabDocument {
            name: combined.name.clone(),
            root,
        })
    }

    /// Persist a collider group as a prefab, one child per collider object
    pub fn save_collider_group(&self, group: &ColliderGroup, layers: &Layers) -> AssetResult<PathBuf> {
        let mut root = PrefabNode::new(group.name());
        for object in group.children() {
            let mesh = self.write_mesh(&CookedMesh::Collider(object.collider.mesh.as_ref().clone()))?;
            if layers.layer_name(object.layer).is_none() {
                log::warn!("Collider \"{}\" is on unnamed layer {}", object.name, object.layer.0);
            }
            root.children.push(PrefabNode {
                name: object.name.clone(),
                transform: object.transform,
                layer: object.layer,
                collider: Some(PrefabCollider {
                    mesh,
                    convex: object.collider.convex,
                }),
                ..Default::default()
            });
        }

        self.write_prefab(&PrefabDocument {
            name: group.name().to_string(),
            root,
        })
    }

    /// Persist a prefab instancing an imported model file
    pub fn save_model_prefab(&self, name: &str, model: &Path) -> AssetResult<PathBuf> {
        let model_id = self
            .database
            .get_id_by_path(model)
            .ok_or_else(|| AssetError::NotFound(model.display().to_string()))?;

        let mut root = PrefabNode::new(name);
        root.model = Some(model.to_path_buf());

        let document = PrefabDocument {
            name: name.to_string(),
            root,
        };
        self.write_document(&document, vec![model_id])
    }

    /// Load the prefab named `name`
    pub fn load(&self, name: &str) -> AssetResult<PrefabDocument> {
        let path = self.database.project_root().join(self.prefab_path(name));
        let text = std::fs::read_to_string(&path)
            .map_err(|_| AssetError::NotFound(path.display().to_string()))?;
        PrefabDocument::from_json(&text)
    }

    /// Load a cooked mesh referenced by a prefab
    pub fn load_mesh(&self, id: AssetId) -> AssetResult<CookedMesh> {
        let path = self
            .database
            .get(id)
            .map(|meta| meta.source_path)
            .unwrap_or_else(|| self.mesh_path(id));
        let bytes = std::fs::read(self.database.project_root().join(&path))
            .map_err(|_| AssetError::NotFound(id.to_string()))?;
        CookedMesh::from_bytes(&bytes)
    }

    /// Rebuild a collider group from its saved prefab
    ///
    /// Returns `Ok(None)` when no prefab named `name` has been saved yet.
    pub fn load_collider_group(&self, name: &str) -> AssetResult<Option<ColliderGroup>> {
        let path = self.database.project_root().join(self.prefab_path(name));
        if !path.is_file() {
            return Ok(None);
        }
        let document = self.load(name)?;

        let mut group = ColliderGroup::new(document.name.clone());
        for node in document.root.children {
            let Some(collider) = node.collider else {
                log::warn!("Prefab \"{}\" child \"{}\" has no collider", name, node.name);
                continue;
            };
            let mesh = match self.load_mesh(collider.mesh)? {
                CookedMesh::Collider(mesh) => Arc::new(mesh),
                CookedMesh::Combined(mesh) => Arc::new(ColliderMesh::from_combined(&mesh)),
            };
            group.insert(ColliderObject {
                name: node.name,
                transform: node.transform,
                layer: node.layer,
                collider: MeshCollider {
                    mesh,
                    convex: collider.convex,
                },
            });
        }

        log::debug!("Loaded {} colliders from prefab \"{}\"", group.len(), name);
        Ok(Some(group))
    }

    fn mesh_path(&self, id: AssetId) -> PathBuf {
        self.prefab_dir.join(MESH_DIR).join(format!("{}.mesh", id))
    }

    fn write_mesh(&self, mesh: &CookedMesh) -> AssetResult<AssetId> {
        let bytes = mesh.to_bytes()?;
        let content_id = AssetId::from_content(&bytes);
        let relative = self.mesh_path(content_id);
        let full = self.database.project_root().join(&relative);

        if !full.exists() {
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&full, &bytes)?;
            log::debug!("Cooked mesh \"{}\" ({} bytes)", mesh.name(), bytes.len());
        }
        self.database
            .import_as(content_id, &relative, AssetType::Mesh, Vec::new())
    }

    fn write_prefab(&self, document: &PrefabDocument) -> AssetResult<PathBuf> {
        let dependencies = document.mesh_references();
        self.write_document(document, dependencies)
    }

    fn write_document(
        &self,
        document: &PrefabDocument,
        dependencies: Vec<AssetId>,
    ) -> AssetResult<PathBuf> {
        let relative = self.prefab_path(&document.name);
        let full = self.database.project_root().join(&relative);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if full.exists() {
            log::debug!("Overwriting prefab {}", relative.display());
        }
        std::fs::write(&full, document.to_json()?)?;
        self.database.import(&relative, AssetType::Prefab, dependencies)?;

        log::info!("Saved prefab {}", relative.display());
        Ok(relative)
    }
}
