//! Scene Graph
//!
//! Read-only hierarchy the level tools walk to gather geometry:
//! - Arena storage addressed by [`NodeId`]
//! - Transform parenting with world matrices resolved on demand
//! - Node kinds resolved up front (plain, LOD group, skinned)

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::math::Aabb;
use crate::mesh::{MaterialRef, MeshData};
use crate::{CoreError, CoreResult};

/// Local transform of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    /// Local position
    pub position: Vec3,
    /// Local rotation
    pub rotation: Quat,
    /// Local scale
    pub scale: Vec3,
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Create a new transform with the given position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Create a new transform from all components
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Decompose a matrix into a transform
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Get the local transformation matrix
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Index of a node inside its [`SceneGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Static mesh plus the materials drawn on its submeshes, slot for slot
#[derive(Debug, Clone, Default)]
pub struct MeshRenderer {
    pub mesh: Option<Arc<MeshData>>,
    pub materials: Vec<MaterialRef>,
}

impl MeshRenderer {
    pub fn new(mesh: Arc<MeshData>, materials: Vec<MaterialRef>) -> Self {
        Self {
            mesh: Some(mesh),
            materials,
        }
    }
}

/// One level of detail: the nodes rendered at that level
#[derive(Debug, Clone, Default)]
pub struct LodTier {
    /// Screen height fraction below which the next tier takes over
    pub screen_height: f32,
    pub renderers: Vec<NodeId>,
}

/// Up to four bone influences of one vertex
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoneWeights {
    pub bones: [u16; 4],
    pub weights: [f32; 4],
}

/// Deformable mesh driven by bone nodes
#[derive(Debug, Clone, Default)]
pub struct SkinnedMeshRenderer {
    pub mesh: Option<Arc<MeshData>>,
    pub materials: Vec<MaterialRef>,
    pub bones: Vec<NodeId>,
    /// Inverse bind matrix per bone
    pub bind_poses: Vec<Mat4>,
    /// Influences per vertex, empty for a mesh shown in bind pose
    pub weights: Vec<BoneWeights>,
}

impl SkinnedMeshRenderer {
    /// Bake the current pose into a static mesh in the skinned node's local
    /// space.
    ///
    /// Without bones or a full set of weights the bind pose is returned.
    pub fn bake(&self, scene: &SceneGraph, node: NodeId) -> Option<MeshData> {
        let mesh = self.mesh.as_ref()?;
        let mut baked = MeshData::clone(mesh);
        if self.bones.is_empty() || self.weights.len() != mesh.vertices.len() {
            return Some(baked);
        }

        let to_local = scene.world_matrix(node).inverse();
        let skin: Vec<Mat4> = self
            .bones
            .iter()
            .zip(&self.bind_poses)
            .map(|(&bone, &bind_pose)| to_local * scene.world_matrix(bone) * bind_pose)
            .collect();

        let has_normals = mesh.normals.len() == mesh.vertices.len();
        for (i, influence) in self.weights.iter().enumerate() {
            let mut blended = Mat4::ZERO;
            let mut total = 0.0;
            for (&bone, &weight) in influence.bones.iter().zip(&influence.weights) {
                if weight <= 0.0 {
                    continue;
                }
                if let Some(matrix) = skin.get(bone as usize) {
                    blended += *matrix * weight;
                    total += weight;
                }
            }
            if total <= 0.0 {
                continue;
            }
            let blended = blended * (1.0 / total);
            baked.vertices[i] = blended.transform_point3(mesh.vertices[i]);
            if has_normals {
                baked.normals[i] = blended.transform_vector3(mesh.normals[i]).normalize_or_zero();
            }
        }

        Some(baked)
    }
}

/// What a node contributes to the level tools
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Transform node, optionally drawing a static mesh
    Plain(Option<MeshRenderer>),
    /// Level-of-detail switch, tiers ordered from most to least detailed
    LodGroup(Vec<LodTier>),
    /// Skinned mesh that must be baked before use
    Skinned(SkinnedMeshRenderer),
}

impl Default for NodeKind {
    fn default() -> Self {
        Self::Plain(None)
    }
}

/// Scene graph node
#[derive(Debug, Clone)]
pub struct Node {
    /// Node name for identification
    pub name: String,
    /// Local transform
    pub local_transform: Transform,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 8]>,
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Mesh drawn by this node, if any
    pub fn mesh(&self) -> Option<&Arc<MeshData>> {
        match &self.kind {
            NodeKind::Plain(Some(renderer)) => renderer.mesh.as_ref(),
            NodeKind::Skinned(skinned) => skinned.mesh.as_ref(),
            _ => None,
        }
    }

    pub fn is_static_mesh(&self) -> bool {
        matches!(&self.kind, NodeKind::Plain(Some(renderer)) if renderer.mesh.is_some())
    }

    pub fn is_skinned(&self) -> bool {
        matches!(self.kind, NodeKind::Skinned(_))
    }
}

/// Arena-backed hierarchy
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl SceneGraph {
    /// Create a new empty scene graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root node
    pub fn add_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            name: name.into(),
            local_transform: Transform::IDENTITY,
            kind,
            parent: None,
            children: SmallVec::new(),
        });
        self.roots.push(id);
        id
    }

    /// Add a node under `parent`
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> CoreResult<NodeId> {
        self.node(parent)?;
        let id = self.add_node(name, kind);
        self.set_parent(id, Some(parent))?;
        Ok(id)
    }

    /// Reparent a node, `None` makes it a root
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> CoreResult<()> {
        self.node(child)?;
        if let Some(parent) = parent {
            self.node(parent)?;
            if self.is_ancestor_or_self(child, parent) {
                return Err(CoreError::InvalidHierarchy(format!(
                    "cannot parent {} under its own descendant {}",
                    child, parent
                )));
            }
        }

        if let Some(old_parent) = self.nodes[child.index()].parent {
            self.nodes[old_parent.index()].children.retain(|c| *c != child);
        }

        match parent {
            Some(parent) => {
                self.nodes[parent.index()].children.push(child);
                self.roots.retain(|r| *r != child);
            }
            None => {
                if !self.roots.contains(&child) {
                    self.roots.push(child);
                }
            }
        }
        self.nodes[child.index()].parent = parent;
        Ok(())
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes[id.index()].parent;
        }
        false
    }

    /// Get a node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Get a mutable node by id
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    /// Get a node by id, failing for ids from another graph
    pub fn node(&self, id: NodeId) -> CoreResult<&Node> {
        self.get(id).ok_or(CoreError::NodeNotFound(id))
    }

    /// Get root nodes
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Find the first node with the given name, in creation order
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.name == name)
            .map(|i| NodeId(i as u32))
    }

    /// Local to world matrix, identity for unknown ids
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = self.get(id);
        while let Some(node) = current {
            matrix = node.local_transform.local_matrix() * matrix;
            current = node.parent.and_then(|p| self.get(p));
        }
        matrix
    }

    /// World-space position of a node
    pub fn world_position(&self, id: NodeId) -> Vec3 {
        self.world_matrix(id).w_axis.truncate()
    }

    /// World-space bounds of the mesh drawn by this node
    pub fn render_bounds(&self, id: NodeId) -> Option<Aabb> {
        let local = self.get(id)?.mesh()?.local_bounds()?;
        Some(local.transform(self.world_matrix(id)))
    }

    /// Render bounds of a node and all its descendants, pre-order
    pub fn subtree_render_bounds(&self, id: NodeId) -> Vec<Aabb> {
        self.subtree(id)
            .into_iter()
            .filter_map(|n| self.render_bounds(n))
            .collect()
    }

    /// A node followed by all its descendants, pre-order
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        if self.get(id).is_some() {
            self.collect_subtree(id, &mut result);
        }
        result
    }

    fn collect_subtree(&self, id: NodeId, result: &mut Vec<NodeId>) {
        result.push(id);
        for &child in &self.nodes[id.index()].children {
            self.collect_subtree(child, result);
        }
    }

    /// Get all descendants of a node
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut nodes = self.subtree(id);
        if !nodes.is_empty() {
            nodes.remove(0);
        }
        nodes
    }

    /// Get the number of nodes in the scene
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the scene is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Arc<MeshData> {
        Arc::new(MeshData::new(
            "quad",
            vec![
                Vec3::new(-1.0, 0.0, -1.0),
                Vec3::new(1.0, 0.0, -1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(-1.0, 0.0, 1.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        ))
    }

    #[test]
    fn test_transform_matrix() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let matrix = t.local_matrix();
        let translation = matrix.w_axis.truncate();
        assert!((translation - Vec3::new(1.0, 2.0, 3.0)).length() < 0.001);
    }

    #[test]
    fn test_transform_from_matrix() {
        let t = Transform::new(Vec3::new(4.0, 0.0, 1.0), Quat::from_rotation_y(0.5), Vec3::splat(2.0));
        let back = Transform::from_matrix(t.local_matrix());
        assert!((back.position - t.position).length() < 0.001);
        assert!((back.scale - t.scale).length() < 0.001);
    }

    #[test]
    fn test_scene_graph_parenting() {
        let mut sg = SceneGraph::new();
        let parent = sg.add_node("Parent", NodeKind::default());
        let child = sg.add_child(parent, "Child", NodeKind::default()).unwrap();

        assert!(sg.get(parent).unwrap().children().contains(&child));
        assert_eq!(sg.get(child).unwrap().parent(), Some(parent));
        assert!(!sg.roots().contains(&child));
        assert_eq!(sg.node_count(), 2);
    }

    #[test]
    fn test_reparenting_under_descendant_fails() {
        let mut sg = SceneGraph::new();
        let root = sg.add_node("Root", NodeKind::default());
        let child = sg.add_child(root, "Child", NodeKind::default()).unwrap();

        let result = sg.set_parent(root, Some(child));
        assert!(matches!(result, Err(CoreError::InvalidHierarchy(_))));
    }

    #[test]
    fn test_world_matrix_accumulates() {
        let mut sg = SceneGraph::new();
        let parent = sg.add_node("Parent", NodeKind::default());
        sg.get_mut(parent).unwrap().local_transform.position = Vec3::new(10.0, 0.0, 0.0);
        let child = sg.add_child(parent, "Child", NodeKind::default()).unwrap();
        sg.get_mut(child).unwrap().local_transform.position = Vec3::new(5.0, 0.0, 0.0);

        assert!((sg.world_position(child).x - 15.0).abs() < 0.001);
    }

    #[test]
    fn test_find_by_name() {
        let mut sg = SceneGraph::new();
        let id = sg.add_node("UniqueNode", NodeKind::default());

        assert_eq!(sg.find_by_name("UniqueNode"), Some(id));
        assert_eq!(sg.find_by_name("NonExistent"), None);
    }

    #[test]
    fn test_subtree_is_preorder() {
        let mut sg = SceneGraph::new();
        let root = sg.add_node("Root", NodeKind::default());
        let a = sg.add_child(root, "A", NodeKind::default()).unwrap();
        let a1 = sg.add_child(a, "A1", NodeKind::default()).unwrap();
        let b = sg.add_child(root, "B", NodeKind::default()).unwrap();

        assert_eq!(sg.subtree(root), vec![root, a, a1, b]);
        assert_eq!(sg.descendants(root), vec![a, a1, b]);
    }

    #[test]
    fn test_render_bounds_in_world_space() {
        let mut sg = SceneGraph::new();
        let root = sg.add_node("Root", NodeKind::default());
        sg.get_mut(root).unwrap().local_transform.position = Vec3::new(0.0, 0.0, 10.0);
        let floor = sg
            .add_child(
                root,
                "Floor",
                NodeKind::Plain(Some(MeshRenderer::new(quad(), vec![MaterialRef(0)]))),
            )
            .unwrap();

        let bounds = sg.render_bounds(floor).unwrap();
        assert_eq!(bounds.min, Vec3::new(-1.0, 0.0, 9.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 0.0, 11.0));
        assert_eq!(sg.subtree_render_bounds(root).len(), 1);
        assert!(sg.render_bounds(root).is_none());
    }

    #[test]
    fn test_bake_without_bones_is_bind_pose() {
        let mut sg = SceneGraph::new();
        let skinned = SkinnedMeshRenderer {
            mesh: Some(quad()),
            materials: vec![MaterialRef(0)],
            ..Default::default()
        };
        let id = sg.add_node("Skin", NodeKind::Skinned(skinned.clone()));

        let baked = skinned.bake(&sg, id).unwrap();
        assert_eq!(baked.vertices, quad().vertices);
    }

    #[test]
    fn test_bake_follows_bone() {
        let mut sg = SceneGraph::new();
        let root = sg.add_node("Rig", NodeKind::default());
        let bone = sg.add_child(root, "Bone", NodeKind::default()).unwrap();
        sg.get_mut(bone).unwrap().local_transform.position = Vec3::new(0.0, 2.0, 0.0);

        let skinned = SkinnedMeshRenderer {
            mesh: Some(quad()),
            materials: vec![MaterialRef(0)],
            bones: vec![bone],
            bind_poses: vec![Mat4::IDENTITY],
            weights: vec![
                BoneWeights {
                    bones: [0, 0, 0, 0],
                    weights: [1.0, 0.0, 0.0, 0.0],
                };
                4
            ],
        };
        let node = sg
            .add_child(root, "Skin", NodeKind::Skinned(skinned.clone()))
            .unwrap();

        let baked = skinned.bake(&sg, node).unwrap();
        assert!((baked.vertices[0] - Vec3::new(-1.0, 2.0, -1.0)).length() < 0.001);
    }

    #[test]
    fn test_node_kind_queries() {
        let mut sg = SceneGraph::new();
        let plain = sg.add_node(
            "Mesh",
            NodeKind::Plain(Some(MeshRenderer::new(quad(), vec![MaterialRef(0)]))),
        );
        let empty = sg.add_node("Empty", NodeKind::Plain(Some(MeshRenderer::default())));

        assert!(sg.get(plain).unwrap().is_static_mesh());
        assert!(!sg.get(empty).unwrap().is_static_mesh());
        assert!(sg.get(empty).unwrap().mesh().is_none());
    }
}
