//! # Meshbake Core
//!
//! Geometry core of the meshbake level tools.
//!
//! This crate provides the pieces every editor command builds on:
//! - **Mesh**: source mesh records and the combined multi-material mesh
//! - **Combine**: material grouping, world-space merge and index width selection
//! - **Bounds**: X/Z footprint aggregation used as a size gate
//! - **Scene Graph**: read-only hierarchy with LOD groups and skinned meshes
//! - **Traverse**: flattening a selected subtree into mesh records

pub mod bounds;
pub mod combine;
pub mod math;
pub mod mesh;
pub mod scene;
pub mod traverse;

pub use bounds::{BoundsBox, compute_bounds};
pub use combine::{CombineOptions, MeshCombiner, combine};
pub use mesh::{
    CombinedMesh, IndexBuffer, IndexWidth, MaterialRef, MeshData, MeshRecord, SubmeshGeometry,
    SubmeshSource,
};
pub use scene::{Node, NodeId, NodeKind, SceneGraph, Transform};
pub use traverse::{collect_floor_nodes, collect_mesh_records};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Hole filling aggressiveness for the remeshing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoleFilling {
    Disabled,
    Low,
    #[default]
    Medium,
    High,
}

impl HoleFilling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Remeshing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemeshConfig {
    /// Folder the engine writes into, mirrored under the asset folder
    pub output_folder: String,
    /// On-screen size target in pixels
    pub on_screen_size: u32,
    pub hole_filling: HoleFilling,
}

impl Default for RemeshConfig {
    fn default() -> Self {
        Self {
            output_folder: String::from("SimplyGonOutPut"),
            on_screen_size: 80,
            hole_filling: HoleFilling::Medium,
        }
    }
}

/// Level tool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Subtrees with both X and Z extents below this are not combined
    pub min_size: f32,
    /// Cumulative vertex count above which 32-bit indices are used
    pub vertex_limit_16bit: usize,
    /// Name fragment identifying floor pieces
    pub floor_name: String,
    /// Name fragment identifying the highest-detail LOD branch
    pub lod_marker: String,
    /// Required name of the selection for the floor collider split
    pub quadtree_root: String,
    /// Root object holding floor colliders
    pub ground_collider_root: String,
    /// Root object holding building colliders
    pub building_collider_root: String,
    pub ground_layer: String,
    pub wall_layer: String,
    /// Physics layer names, index = layer number
    pub layers: Vec<String>,
    /// Prefab output directory, relative to the project
    pub prefab_dir: String,
    pub remesh: RemeshConfig,
}

impl ToolConfig {
    pub fn combine_options(&self) -> CombineOptions {
        CombineOptions {
            vertex_limit_16bit: self.vertex_limit_16bit,
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            min_size: 0.0,
            vertex_limit_16bit: mesh::MESH_16BIT_VERTEX_LIMIT,
            floor_name: String::from("StoneFloor"),
            lod_marker: String::from("LOD0"),
            quadtree_root: String::from("quadtree"),
            ground_collider_root: String::from("ColliderGround"),
            building_collider_root: String::from("BuildingColliderObj"),
            ground_layer: String::from("Ground"),
            wall_layer: String::from("Wall"),
            layers: [
                "Default",
                "TransparentFX",
                "Ignore Raycast",
                "",
                "Water",
                "UI",
                "",
                "",
                "Ground",
                "Wall",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            prefab_dir: String::from("Assets/Resources"),
            remesh: RemeshConfig::default(),
        }
    }
}
