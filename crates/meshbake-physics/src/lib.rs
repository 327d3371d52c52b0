//! # Meshbake Physics
//!
//! Collider derivation for the meshbake level tools.
//!
//! ## Features
//! - Named physics layers
//! - Convex and exact mesh colliders built from combined or scene meshes
//! - Collider groups: named roots whose children are replaced by name

use std::sync::Arc;

use glam::{Mat4, Vec3};
use meshbake_core::{CombinedMesh, MeshData, Transform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Physics errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("Unknown layer: {0}")]
    UnknownLayer(String),

    #[error("Too many layers: {0} (at most 32)")]
    TooManyLayers(usize),
}

/// Result type for physics operations
pub type PhysicsResult<T> = Result<T, PhysicsError>;

/// Collision layer mask
pub type LayerMask = u32;

/// Physics layer number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Layer(pub u8);

impl Layer {
    pub const DEFAULT: Self = Self(0);

    /// Mask with only this layer set
    pub fn mask(&self) -> LayerMask {
        1 << self.0
    }
}

/// Layer name table, index = layer number
#[derive(Debug, Clone, Default)]
pub struct Layers {
    names: Vec<String>,
}

impl Layers {
    pub fn new(names: Vec<String>) -> PhysicsResult<Self> {
        if names.len() > 32 {
            return Err(PhysicsError::TooManyLayers(names.len()));
        }
        Ok(Self { names })
    }

    /// Resolve a layer by name. Blank slots never match.
    pub fn name_to_layer(&self, name: &str) -> PhysicsResult<Layer> {
        self.names
            .iter()
            .position(|n| !n.is_empty() && n == name)
            .map(|i| Layer(i as u8))
            .ok_or_else(|| PhysicsError::UnknownLayer(name.to_string()))
    }

    pub fn layer_name(&self, layer: Layer) -> Option<&str> {
        self.names
            .get(layer.0 as usize)
            .map(String::as_str)
            .filter(|n| !n.is_empty())
    }
}

/// Triangle soup a mesh collider is cooked from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColliderMesh {
    pub name: String,
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl ColliderMesh {
    /// All submeshes of a combined mesh in one buffer, already in world space
    pub fn from_combined(combined: &CombinedMesh) -> Self {
        let (vertices, indices) = combined.flattened();
        Self {
            name: combined.name.clone(),
            vertices,
            indices,
        }
    }

    /// All submeshes of a scene mesh, in the mesh's local space
    pub fn from_mesh(mesh: &MeshData) -> Self {
        Self {
            name: mesh.name.clone(),
            vertices: mesh.vertices.clone(),
            indices: mesh.submeshes.iter().flatten().copied().collect(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }
}

/// Mesh collider in one of two fidelity modes
#[derive(Debug, Clone, PartialEq)]
pub struct MeshCollider {
    pub mesh: Arc<ColliderMesh>,
    /// Convex hull when set, exact triangles otherwise
    pub convex: bool,
}

impl MeshCollider {
    pub fn convex(mesh: Arc<ColliderMesh>) -> Self {
        Self { mesh, convex: true }
    }

    pub fn exact(mesh: Arc<ColliderMesh>) -> Self {
        Self { mesh, convex: false }
    }
}

/// Standalone object carrying a collider
#[derive(Debug, Clone, PartialEq)]
pub struct ColliderObject {
    pub name: String,
    /// World transform of the object
    pub transform: Transform,
    pub layer: Layer,
    pub collider: MeshCollider,
}

/// What happened when a child was inserted into a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    Replaced,
}

/// Named root object whose children are unique by name
#[derive(Debug, Clone, PartialEq)]
pub struct ColliderGroup {
    name: String,
    children: Vec<ColliderObject>,
}

impl ColliderGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[ColliderObject] {
        &self.children
    }

    pub fn find(&self, name: &str) -> Option<&ColliderObject> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Add a child, replacing any existing child with the same name.
    ///
    /// The replacement goes to the end of the child list.
    pub fn insert(&mut self, object: ColliderObject) -> InsertOutcome {
        let outcome = match self.children.iter().position(|c| c.name == object.name) {
            Some(index) => {
                log::error!(
                    "\"{}\" already has a child named \"{}\", replacing it",
                    self.name,
                    object.name
                );
                self.children.remove(index);
                InsertOutcome::Replaced
            }
            None => InsertOutcome::Added,
        };
        self.children.push(object);
        outcome
    }

    pub fn remove(&mut self, name: &str) -> Option<ColliderObject> {
        let index = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(index))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Result of splitting a scene object's collision
#[derive(Debug, Clone, PartialEq)]
pub struct ColliderSplit {
    /// Convex collider that stays on the source object
    pub source: MeshCollider,
    /// Separate object with the exact collider
    pub object: ColliderObject,
}

/// Split collision for one source mesh: the source keeps a convex collider
/// and a new object with the source's name and world transform gets an
/// exact collider on `layer`.
pub fn split_collider(
    name: &str,
    mesh: Arc<ColliderMesh>,
    world_matrix: Mat4,
    layer: Layer,
) -> ColliderSplit {
    ColliderSplit {
        source: MeshCollider::convex(mesh.clone()),
        object: ColliderObject {
            name: name.to_string(),
            transform: Transform::from_matrix(world_matrix),
            layer,
            collider: MeshCollider::exact(mesh),
        },
    }
}

/// Convex collider object for a combined building mesh.
///
/// Combined geometry is already in world space, so the object sits at the
/// origin.
pub fn building_collider(combined: &CombinedMesh, layer: Layer) -> ColliderObject {
    ColliderObject {
        name: combined.name.clone(),
        transform: Transform::IDENTITY,
        layer,
        collider: MeshCollider::convex(Arc::new(ColliderMesh::from_combined(combined))),
    }
}
