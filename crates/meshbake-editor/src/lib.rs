//! # Meshbake Editor
//!
//! Editing commands run against a loaded level.
//!
//! ## Features
//! - Building mesh: combine a selected subtree into one multi-material mesh
//! - Building collider: convex collider from the combined building mesh
//! - Floor colliders: split floor pieces into convex and exact colliders
//! - Selection bounds
//! - Remeshing driver for an external remeshing engine

pub mod remesh;

pub use remesh::{
    EngineLoader, InitError, ProcessEngine, ProcessLoader, RemeshError, RemeshOutcome,
    RemeshSettings, RemeshingEngine, run_remeshing, start_remeshing,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use meshbake_assets::{AssetDatabase, AssetError, LoadedScene, MaterialTable, PrefabStore, SceneDocument};
use meshbake_core::{
    BoundsBox, CombinedMesh, MeshCombiner, NodeId, SceneGraph, ToolConfig, collect_floor_nodes,
    collect_mesh_records, compute_bounds,
};
use meshbake_physics::{
    ColliderGroup, ColliderMesh, InsertOutcome, Layers, PhysicsError, building_collider,
    split_collider,
};
use thiserror::Error;

/// Editor command errors. Selection problems carry the text shown to the user.
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("No Object Selected: please select an object first")]
    NoSelection,

    #[error("Item selected is not a scene object ({0})")]
    NotASceneObject(NodeId),

    #[error("Must select {0}")]
    WrongSelection(String),

    #[error("Item selected has no meshes")]
    NoMeshes,

    #[error("Physics error: {0}")]
    Physics(#[from] PhysicsError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),
}

/// Result type for editor commands
pub type EditorResult<T> = Result<T, EditorError>;

/// Load a tool configuration from a JSON file. Missing fields take defaults.
pub fn load_config(path: &Path) -> anyhow::Result<ToolConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Outcome of the building mesh command
#[derive(Debug, Clone)]
pub struct BuildingMesh {
    pub combined: CombinedMesh,
    /// Project-relative prefab path
    pub prefab: PathBuf,
}

/// Outcome of a collider command
#[derive(Debug, Clone)]
pub struct ColliderReport {
    /// Collider root the objects were added to
    pub group: String,
    pub inserted: Vec<(String, InsertOutcome)>,
    /// Project-relative prefab path of the group
    pub prefab: PathBuf,
}

impl ColliderReport {
    pub fn replaced(&self) -> usize {
        self.inserted
            .iter()
            .filter(|(_, outcome)| *outcome == InsertOutcome::Replaced)
            .count()
    }
}

/// Editor state
pub struct Editor {
    config: ToolConfig,
    layers: Layers,
    scene: SceneGraph,
    materials: MaterialTable,
    store: PrefabStore,
    selection: Option<NodeId>,
    /// Collider roots touched this session, seeded from their saved prefabs
    collider_groups: Vec<ColliderGroup>,
}

impl Editor {
    pub fn new(project_root: PathBuf, config: ToolConfig, loaded: LoadedScene) -> EditorResult<Self> {
        let layers = Layers::new(config.layers.clone())?;
        let database = Arc::new(AssetDatabase::new(project_root));
        let store = PrefabStore::new(database, config.prefab_dir.clone());

        Ok(Self {
            config,
            layers,
            scene: loaded.scene,
            materials: loaded.materials,
            store,
            selection: None,
            collider_groups: Vec::new(),
        })
    }

    /// Open a project with the scene at `scene_path`
    pub fn open(project_root: PathBuf, config: ToolConfig, scene_path: &Path) -> anyhow::Result<Self> {
        let loaded = SceneDocument::load(scene_path)
            .and_then(|doc| doc.build())
            .with_context(|| format!("loading scene {}", scene_path.display()))?;
        log::info!(
            "Opened {} ({} nodes) in {}",
            scene_path.display(),
            loaded.scene.node_count(),
            project_root.display()
        );
        Ok(Self::new(project_root, config, loaded)?)
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn store(&self) -> &PrefabStore {
        &self.store
    }

    pub fn selection(&self) -> Option<NodeId> {
        self.selection
    }

    pub fn select(&mut self, selection: Option<NodeId>) {
        self.selection = selection;
    }

    /// Select the first node with the given name
    pub fn select_by_name(&mut self, name: &str) -> bool {
        self.selection = self.scene.find_by_name(name);
        self.selection.is_some()
    }

    pub fn collider_group(&self, name: &str) -> Option<&ColliderGroup> {
        self.collider_groups.iter().find(|g| g.name() == name)
    }

    /// Combine the selection's meshes and save them as a prefab
    pub fn create_building_mesh(&mut self) -> EditorResult<BuildingMesh> {
        let selected = self.selected()?;
        let combined = self.combine_selection(selected)?;
        let prefab = self.store.save_combined(&combined, &self.materials)?;
        Ok(BuildingMesh { combined, prefab })
    }

    /// Combine the selection and hang a convex collider of the result under
    /// the building collider root
    pub fn create_building_collider(&mut self) -> EditorResult<ColliderReport> {
        let selected = self.selected()?;
        let combined = self.combine_selection(selected)?;
        let layer = self.layers.name_to_layer(&self.config.wall_layer)?;

        let object = building_collider(&combined, layer);
        let name = object.name.clone();
        let root = self.config.building_collider_root.clone();
        let outcome = self.group_mut(&root)?.insert(object);

        self.save_group(&root, vec![(name, outcome)])
    }

    /// Split every floor piece under the selected quadtree and hang an exact
    /// collider for each under the ground root
    ///
    /// Scene documents are read-only input, so the convex half of each split
    /// is not written back onto the piece.
    pub fn separate_floor_colliders(&mut self) -> EditorResult<ColliderReport> {
        let selected = self.selected()?;
        let is_quadtree = self
            .scene
            .get(selected)
            .is_some_and(|node| node.name == self.config.quadtree_root);
        if !is_quadtree {
            return Err(EditorError::WrongSelection(self.config.quadtree_root.clone()));
        }
        let layer = self.layers.name_to_layer(&self.config.ground_layer)?;

        let floors = collect_floor_nodes(
            &self.scene,
            selected,
            &self.config.floor_name,
            &self.config.lod_marker,
        );
        log::info!("Found {} floor pieces under \"{}\"", floors.len(), self.config.quadtree_root);

        let root = self.config.ground_collider_root.clone();
        let mut inserted = Vec::with_capacity(floors.len());
        for id in floors {
            let Some(node) = self.scene.get(id) else {
                continue;
            };
            let Some(mesh) = node.mesh() else {
                log::warn!("Floor piece \"{}\" has no mesh, skipping", node.name);
                continue;
            };
            let mesh = Arc::new(ColliderMesh::from_mesh(mesh));

            let split = split_collider(&node.name, mesh, self.scene.world_matrix(id), layer);
            let name = split.object.name.clone();
            let outcome = self.group_mut(&root)?.insert(split.object);
            inserted.push((name, outcome));
        }

        self.save_group(&root, inserted)
    }

    /// Footprint of the selection
    pub fn selection_bounds(&self) -> EditorResult<BoundsBox> {
        let selected = self.selected()?;
        Ok(compute_bounds(
            &self.scene.subtree_render_bounds(selected),
            self.scene.world_position(selected),
        ))
    }

    fn selected(&self) -> EditorResult<NodeId> {
        let id = self.selection.ok_or(EditorError::NoSelection)?;
        if self.scene.get(id).is_none() {
            return Err(EditorError::NotASceneObject(id));
        }
        Ok(id)
    }

    fn combine_selection(&self, selected: NodeId) -> EditorResult<CombinedMesh> {
        let records = collect_mesh_records(&self.scene, selected, self.config.min_size);
        if records.is_empty() {
            return Err(EditorError::NoMeshes);
        }
        let name = self
            .scene
            .node(selected)
            .map_err(|_| EditorError::NotASceneObject(selected))?
            .name
            .clone();
        Ok(MeshCombiner::new(self.config.combine_options()).combine(&records, &name))
    }

    /// The collider root named `name`. On first use it starts from the
    /// group saved by earlier sessions, if any.
    fn group_mut(&mut self, name: &str) -> EditorResult<&mut ColliderGroup> {
        let index = match self.collider_groups.iter().position(|g| g.name() == name) {
            Some(index) => index,
            None => {
                let group = match self.store.load_collider_group(name)? {
                    Some(saved) => {
                        log::info!("Continuing \"{}\" with {} saved colliders", name, saved.len());
                        saved
                    }
                    None => ColliderGroup::new(name),
                };
                self.collider_groups.push(group);
                self.collider_groups.len() - 1
            }
        };
        Ok(&mut self.collider_groups[index])
    }

    fn save_group(
        &mut self,
        name: &str,
        inserted: Vec<(String, InsertOutcome)>,
    ) -> EditorResult<ColliderReport> {
        let group = self.group_mut(name)?.clone();
        let prefab = self.store.save_collider_group(&group, &self.layers)?;
        Ok(ColliderReport {
            group: name.to_string(),
            inserted,
            prefab,
        })
    }
}


#[cfg(test)]
mod tests {
    use glam::Vec3;
    use meshbake_core::{IndexWidth, MaterialRef};

    use super::*;
    use crate::test_support::temp_project;

    const LEVEL: &str = r#"{
        "materials": ["Brick", "Stone"],
        "meshes": [
            { "name": "block", "vertices": [[-1,0,-1],[1,0,-1],[1,0,1],[-1,0,1]], "submeshes": [[0,1,2],[0,2,3]] },
            { "name": "tile", "vertices": [[-2,0,-2],[2,0,-2],[2,0,2]], "submeshes": [[0,1,2]] }
        ],
        "nodes": [
            {
                "name": "House",
                "children": [
                    { "name": "Wall", "kind": { "type": "plain", "mesh": 0, "materials": ["Brick", "Stone"] } },
                    { "name": "Porch", "transform": { "position": [5, 0, 0] },
                      "kind": { "type": "plain", "mesh": 1, "materials": ["Stone"] } }
                ]
            },
            { "name": "Empty" },
            {
                "name": "quadtree",
                "children": [
                    {
                        "name": "Cell_LOD0",
                        "children": [
                            { "name": "StoneFloor_01", "transform": { "position": [10, 0, 0] },
                              "kind": { "type": "plain", "mesh": 1, "materials": ["Stone"] } },
                            { "name": "StoneFloor_02", "kind": { "type": "plain", "mesh": 1, "materials": ["Stone"] } }
                        ]
                    },
                    {
                        "name": "Cell_LOD1",
                        "children": [
                            { "name": "StoneFloor_01", "kind": { "type": "plain", "mesh": 1, "materials": ["Stone"] } }
                        ]
                    }
                ]
            }
        ]
    }"#;

    fn editor(tag: &str) -> Editor {
        let loaded = SceneDocument::from_json(LEVEL).unwrap().build().unwrap();
        Editor::new(temp_project(tag), ToolConfig::default(), loaded).unwrap()
    }

    #[test]
    fn test_commands_need_selection() {
        let mut editor = editor("no-selection");
        assert!(matches!(editor.create_building_mesh(), Err(EditorError::NoSelection)));
        assert!(matches!(editor.selection_bounds(), Err(EditorError::NoSelection)));
        assert!(!editor.select_by_name("Missing"));
    }

    #[test]
    fn test_stale_selection() {
        let mut editor = editor("stale");
        let mut other = SceneGraph::new();
        for i in 0..64 {
            other.add_node(format!("n{}", i), Default::default());
        }
        editor.select(other.find_by_name("n63"));
        assert!(matches!(
            editor.create_building_mesh(),
            Err(EditorError::NotASceneObject(_))
        ));
    }

    #[test]
    fn test_create_building_mesh() {
        let mut editor = editor("building-mesh");
        assert!(editor.select_by_name("House"));

        let result = editor.create_building_mesh().unwrap();
        assert_eq!(result.combined.name, "House");
        assert_eq!(result.combined.materials.len(), 2);
        assert_eq!(result.combined.index_width, IndexWidth::U16);
        assert_eq!(result.prefab, PathBuf::from("Assets/Resources/House.prefab"));

        let doc = editor.store().load("House").unwrap();
        assert_eq!(
            doc.root.renderer.unwrap().materials,
            vec![String::from("Stone"), String::from("Brick")]
        );
        assert_eq!(result.combined.materials, vec![MaterialRef(1), MaterialRef(0)]);
    }

    #[test]
    fn test_building_mesh_without_meshes() {
        let mut editor = editor("no-meshes");
        editor.select_by_name("Empty");
        assert!(matches!(editor.create_building_mesh(), Err(EditorError::NoMeshes)));
    }

    #[test]
    fn test_create_building_collider() {
        let mut editor = editor("building-collider");
        editor.select_by_name("House");

        let report = editor.create_building_collider().unwrap();
        assert_eq!(report.group, "BuildingColliderObj");
        assert_eq!(report.inserted, vec![(String::from("House"), InsertOutcome::Added)]);

        let group = editor.collider_group("BuildingColliderObj").unwrap();
        let object = group.find("House").unwrap();
        assert!(object.collider.convex);
        assert_eq!(object.layer.0, 9);

        let again = editor.create_building_collider().unwrap();
        assert_eq!(again.replaced(), 1);
        assert_eq!(editor.collider_group("BuildingColliderObj").unwrap().len(), 1);
    }

    #[test]
    fn test_collider_groups_accumulate_across_sessions() {
        let root = temp_project("sessions");
        let session = || {
            let loaded = SceneDocument::from_json(LEVEL).unwrap().build().unwrap();
            Editor::new(root.clone(), ToolConfig::default(), loaded).unwrap()
        };

        let mut first = session();
        first.select_by_name("Wall");
        first.create_building_collider().unwrap();

        let mut second = session();
        second.select_by_name("Porch");
        let report = second.create_building_collider().unwrap();
        assert_eq!(report.inserted, vec![(String::from("Porch"), InsertOutcome::Added)]);

        let saved = second.store().load("BuildingColliderObj").unwrap();
        let names: Vec<_> = saved.root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Wall", "Porch"]);

        let mut third = session();
        third.select_by_name("Wall");
        let report = third.create_building_collider().unwrap();
        assert_eq!(report.replaced(), 1);
        let group = third.collider_group("BuildingColliderObj").unwrap();
        assert_eq!(group.len(), 2);
        assert!(group.find("Porch").unwrap().collider.convex);
    }

    #[test]
    fn test_floor_colliders_require_quadtree() {
        let mut editor = editor("wrong-root");
        editor.select_by_name("House");
        match editor.separate_floor_colliders() {
            Err(EditorError::WrongSelection(name)) => assert_eq!(name, "quadtree"),
            other => panic!("expected wrong selection, got {:?}", other.map(|r| r.group)),
        }
    }

    #[test]
    fn test_separate_floor_colliders() {
        let mut editor = editor("floors");
        editor.select_by_name("quadtree");

        let report = editor.separate_floor_colliders().unwrap();
        let names: Vec<_> = report.inserted.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["StoneFloor_01", "StoneFloor_02"]);
        assert_eq!(report.prefab, PathBuf::from("Assets/Resources/ColliderGround.prefab"));

        let group = editor.collider_group("ColliderGround").unwrap();
        let floor = group.find("StoneFloor_01").unwrap();
        assert!(!floor.collider.convex);
        assert_eq!(floor.layer.0, 8);
        assert!((floor.transform.position - Vec3::new(10.0, 0.0, 0.0)).length() < 0.001);

        let saved = editor.store().load("ColliderGround").unwrap();
        assert_eq!(saved.root.children.len(), 2);
    }

    #[test]
    fn test_separate_floor_colliders_twice_replaces() {
        let mut editor = editor("floors-twice");
        editor.select_by_name("quadtree");
        editor.separate_floor_colliders().unwrap();

        let report = editor.separate_floor_colliders().unwrap();
        assert_eq!(report.replaced(), 2);
        assert_eq!(editor.collider_group("ColliderGround").unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_layer() {
        let loaded = SceneDocument::from_json(LEVEL).unwrap().build().unwrap();
        let config = ToolConfig {
            wall_layer: String::from("Walls"),
            ..Default::default()
        };
        let mut editor = Editor::new(temp_project("layer"), config, loaded).unwrap();
        editor.select_by_name("House");
        assert!(matches!(
            editor.create_building_collider(),
            Err(EditorError::Physics(PhysicsError::UnknownLayer(_)))
        ));
    }

    #[test]
    fn test_selection_bounds() {
        let mut editor = editor("bounds");
        editor.select_by_name("House");

        let bounds = editor.selection_bounds().unwrap();
        assert_eq!(bounds.min.x, -1.0);
        assert_eq!(bounds.max.x, 7.0);
        assert_eq!(bounds.min.z, -2.0);
        assert_eq!(bounds.max.z, 2.0);
    }

    #[test]
    fn test_load_config_defaults() {
        let dir = temp_project("config");
        let path = dir.join("meshbake.json");
        std::fs::write(&path, r#"{ "min_size": 2.5, "remesh": { "on_screen_size": 120 } }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.min_size, 2.5);
        assert_eq!(config.remesh.on_screen_size, 120);
        assert_eq!(config.remesh.output_folder, "SimplyGonOutPut");
        assert_eq!(config.floor_name, "StoneFloor");

        assert!(load_config(&dir.join("missing.json")).is_err());
    }
}
