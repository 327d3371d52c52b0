//! Scene documents
//!
//! JSON description of a level hierarchy, loaded into a [`SceneGraph`].
//! Meshes live in a shared table so several nodes can reference the same
//! mesh; materials are referenced by name and interned into [`MaterialRef`]s.
//! LOD renderers are named nodes inside the LOD group's subtree, bones are
//! named nodes anywhere in the scene.

use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use glam::Mat4;
use meshbake_core::scene::{BoneWeights, LodTier, MeshRenderer, SkinnedMeshRenderer};
use meshbake_core::{MaterialRef, MeshData, NodeId, NodeKind, SceneGraph, Transform};
use serde::{Deserialize, Serialize};

use crate::{AssetError, AssetResult};

/// Material names interned to stable handles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialTable {
    names: Vec<String>,
    lookup: AHashMap<String, MaterialRef>,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `name`, allocating one on first use
    pub fn intern(&mut self, name: &str) -> MaterialRef {
        if let Some(&material) = self.lookup.get(name) {
            return material;
        }
        let material = MaterialRef(self.names.len() as u64);
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), material);
        material
    }

    pub fn get(&self, name: &str) -> Option<MaterialRef> {
        self.lookup.get(name).copied()
    }

    pub fn name(&self, material: MaterialRef) -> Option<&str> {
        self.names.get(material.0 as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Scene file root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDocument {
    /// Materials declared up front, in handle order
    pub materials: Vec<String>,
    pub meshes: Vec<MeshData>,
    /// Root nodes
    pub nodes: Vec<SceneNodeDoc>,
}

/// One node of a scene file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneNodeDoc {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKindDoc,
    pub children: Vec<SceneNodeDoc>,
}

/// Node kind as written in a scene file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKindDoc {
    Plain {
        #[serde(default)]
        mesh: Option<usize>,
        #[serde(default)]
        materials: Vec<String>,
    },
    LodGroup {
        tiers: Vec<LodTierDoc>,
    },
    Skinned {
        #[serde(default)]
        mesh: Option<usize>,
        #[serde(default)]
        materials: Vec<String>,
        #[serde(default)]
        bones: Vec<String>,
        #[serde(default)]
        bind_poses: Vec<Mat4>,
        #[serde(default)]
        weights: Vec<BoneWeights>,
    },
}

impl Default for NodeKindDoc {
    fn default() -> Self {
        Self::Plain {
            mesh: None,
            materials: Vec::new(),
        }
    }
}

/// One LOD tier as written in a scene file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LodTierDoc {
    pub screen_height: f32,
    /// Node names inside the LOD group's subtree
    pub renderers: Vec<String>,
}

/// A scene graph together with the material names it uses
#[derive(Debug, Clone, Default)]
pub struct LoadedScene {
    pub scene: SceneGraph,
    pub materials: MaterialTable,
}

impl SceneDocument {
    /// Parse a scene document from JSON text
    pub fn from_json(text: &str) -> AssetResult<Self> {
        serde_json::from_str(text).map_err(|e| AssetError::SerializationError(e.to_string()))
    }

    /// Load a scene document from a file
    pub fn load(path: &Path) -> AssetResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> AssetResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| AssetError::SerializationError(e.to_string()))
    }

    /// Build the scene graph described by this document
    pub fn build(&self) -> AssetResult<LoadedScene> {
        let mut loaded = LoadedScene::default();
        for name in &self.materials {
            loaded.materials.intern(name);
        }

        let meshes: Vec<Arc<MeshData>> = self.meshes.iter().cloned().map(Arc::new).collect();

        // Nodes are created first so LOD renderers and bones can refer to
        // nodes declared after them.
        let mut pending = Vec::new();
        for root in &self.nodes {
            self.create_node(&mut loaded.scene, None, root, &mut pending)?;
        }

        for (id, doc) in pending {
            let kind = resolve_kind(&loaded.scene, id, doc, &meshes, &mut loaded.materials)?;
            if let Some(node) = loaded.scene.get_mut(id) {
                node.kind = kind;
            }
        }

        log::debug!(
            "Loaded scene with {} nodes, {} meshes, {} materials",
            loaded.scene.node_count(),
            meshes.len(),
            loaded.materials.len()
        );
        Ok(loaded)
    }

    fn create_node<'a>(
        &self,
        scene: &mut SceneGraph,
        parent: Option<NodeId>,
        doc: &'a SceneNodeDoc,
        pending: &mut Vec<(NodeId, &'a NodeKindDoc)>,
    ) -> AssetResult<()> {
        let id = match parent {
            Some(parent) => scene
                .add_child(parent, doc.name.clone(), NodeKind::default())
                .map_err(|e| AssetError::InvalidScene(e.to_string()))?,
            None => scene.add_node(doc.name.clone(), NodeKind::default()),
        };
        if let Some(node) = scene.get_mut(id) {
            node.local_transform = doc.transform;
        }
        pending.push((id, &doc.kind));

        for child in &doc.children {
            self.create_node(scene, Some(id), child, pending)?;
        }
        Ok(())
    }
}

fn resolve_kind(
    scene: &SceneGraph,
    id: NodeId,
    doc: &NodeKindDoc,
    meshes: &[Arc<MeshData>],
    materials: &mut MaterialTable,
) -> AssetResult<NodeKind> {
    let mesh_at = |index: &Option<usize>| -> AssetResult<Option<Arc<MeshData>>> {
        match index {
            Some(i) => meshes
                .get(*i)
                .cloned()
                .map(Some)
                .ok_or_else(|| AssetError::InvalidScene(format!("mesh index {} out of range", i))),
            None => Ok(None),
        }
    };

    let kind = match doc {
        NodeKindDoc::Plain { mesh, materials: names } => {
            let mesh = mesh_at(mesh)?;
            if mesh.is_none() && names.is_empty() {
                NodeKind::Plain(None)
            } else {
                NodeKind::Plain(Some(MeshRenderer {
                    mesh,
                    materials: names.iter().map(|n| materials.intern(n)).collect(),
                }))
            }
        }
        NodeKindDoc::LodGroup { tiers } => {
            let subtree = scene.subtree(id);
            let mut resolved = Vec::with_capacity(tiers.len());
            for tier in tiers {
                let mut renderers = Vec::with_capacity(tier.renderers.len());
                for name in &tier.renderers {
                    let found = subtree
                        .iter()
                        .copied()
                        .find(|&n| scene.get(n).is_some_and(|node| &node.name == name))
                        .ok_or_else(|| {
                            AssetError::InvalidScene(format!(
                                "LOD renderer \"{}\" is not under its LOD group",
                                name
                            ))
                        })?;
                    renderers.push(found);
                }
                resolved.push(LodTier {
                    screen_height: tier.screen_height,
                    renderers,
                });
            }
            NodeKind::LodGroup(resolved)
        }
        NodeKindDoc::Skinned {
            mesh,
            materials: names,
            bones,
            bind_poses,
            weights,
        } => {
            let mut bone_ids = Vec::with_capacity(bones.len());
            for bone in bones {
                let found = scene
                    .find_by_name(bone)
                    .ok_or_else(|| AssetError::InvalidScene(format!("unknown bone \"{}\"", bone)))?;
                bone_ids.push(found);
            }
            NodeKind::Skinned(SkinnedMeshRenderer {
                mesh: mesh_at(mesh)?,
                materials: names.iter().map(|n| materials.intern(n)).collect(),
                bones: bone_ids,
                bind_poses: bind_poses.clone(),
                weights: weights.clone(),
            })
        }
    };
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use meshbake_core::collect_mesh_records;

    use super::*;

    const BUILDING: &str = r#"{
        "materials": ["Brick"],
        "meshes": [
            { "name": "wall", "vertices": [[0,0,0],[1,0,0],[1,1,0]], "submeshes": [[0,1,2]] },
            { "name": "roof", "vertices": [[0,2,0],[1,2,0],[1,2,1]], "submeshes": [[0,1,2]] }
        ],
        "nodes": [
            {
                "name": "House",
                "transform": { "position": [10, 0, 0] },
                "children": [
                    { "name": "Wall", "kind": { "type": "plain", "mesh": 0, "materials": ["Brick"] } },
                    { "name": "Roof", "kind": { "type": "plain", "mesh": 1, "materials": ["Tiles"] } },
                    {
                        "name": "Chimney",
                        "kind": { "type": "lod_group", "tiers": [
                            { "screen_height": 0.5, "renderers": ["Chimney_LOD0"] },
                            { "screen_height": 0.1, "renderers": ["Chimney_LOD1"] }
                        ] },
                        "children": [
                            { "name": "Chimney_LOD0", "kind": { "type": "plain", "mesh": 0, "materials": ["Brick"] } },
                            { "name": "Chimney_LOD1", "kind": { "type": "plain", "mesh": 1, "materials": ["Brick"] } }
                        ]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_build_scene() {
        let loaded = SceneDocument::from_json(BUILDING).unwrap().build().unwrap();
        let scene = &loaded.scene;

        assert_eq!(scene.node_count(), 6);
        assert_eq!(loaded.materials.get("Brick"), Some(MaterialRef(0)));
        assert_eq!(loaded.materials.get("Tiles"), Some(MaterialRef(1)));
        assert_eq!(loaded.materials.name(MaterialRef(1)), Some("Tiles"));

        let wall = scene.find_by_name("Wall").unwrap();
        assert!((scene.world_position(wall) - Vec3::new(10.0, 0.0, 0.0)).length() < 0.001);
    }

    #[test]
    fn test_shared_mesh_table() {
        let loaded = SceneDocument::from_json(BUILDING).unwrap().build().unwrap();
        let scene = &loaded.scene;
        let wall = scene.get(scene.find_by_name("Wall").unwrap()).unwrap();
        let lod0 = scene.get(scene.find_by_name("Chimney_LOD0").unwrap()).unwrap();

        assert!(Arc::ptr_eq(wall.mesh().unwrap(), lod0.mesh().unwrap()));
    }

    #[test]
    fn test_loaded_scene_feeds_traversal() {
        let loaded = SceneDocument::from_json(BUILDING).unwrap().build().unwrap();
        let house = loaded.scene.find_by_name("House").unwrap();

        let records = collect_mesh_records(&loaded.scene, house, 0.0);
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Chimney_LOD1", "Roof", "Wall"]);
    }

    #[test]
    fn test_lod_renderer_outside_group_fails() {
        let text = r#"{
            "nodes": [
                { "name": "Other" },
                { "name": "Group", "kind": { "type": "lod_group", "tiers": [ { "renderers": ["Other"] } ] } }
            ]
        }"#;
        let result = SceneDocument::from_json(text).unwrap().build();
        assert!(matches!(result, Err(AssetError::InvalidScene(_))));
    }

    #[test]
    fn test_mesh_index_out_of_range() {
        let text = r#"{ "nodes": [ { "name": "A", "kind": { "type": "plain", "mesh": 3 } } ] }"#;
        let result = SceneDocument::from_json(text).unwrap().build();
        assert!(matches!(result, Err(AssetError::InvalidScene(_))));
    }

    #[test]
    fn test_skinned_bones_resolve_by_name() {
        let text = r#"{
            "meshes": [ { "name": "body", "vertices": [[0,0,0]], "submeshes": [[0]] } ],
            "nodes": [
                { "name": "Body", "kind": { "type": "skinned", "mesh": 0, "materials": ["Skin"], "bones": ["Hip"] } },
                { "name": "Hip" }
            ]
        }"#;
        let loaded = SceneDocument::from_json(text).unwrap().build().unwrap();
        let body = loaded.scene.get(loaded.scene.find_by_name("Body").unwrap()).unwrap();
        match &body.kind {
            NodeKind::Skinned(skinned) => {
                assert_eq!(skinned.bones, vec![loaded.scene.find_by_name("Hip").unwrap()]);
            }
            other => panic!("expected skinned node, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            SceneDocument::from_json("{ nodes: "),
            Err(AssetError::SerializationError(_))
        ));
    }
}
