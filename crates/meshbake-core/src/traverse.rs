//! Hierarchy traversal
//!
//! Flattens a selected subtree into the [`MeshRecord`] sequence the combiner
//! consumes, and finds the floor pieces the collider split works on.

use crate::bounds::compute_bounds;
use crate::mesh::MeshRecord;
use crate::scene::{NodeId, NodeKind, SceneGraph};

/// Gather mesh records under `root`.
///
/// Walks with an explicit stack, children pushed in order and popped last
/// first. A node whose subtree footprint is below `min_size` is pruned with
/// its whole subtree. A LOD group contributes only its lowest-detail tier and
/// is not descended into. Skinned meshes are baked to a static snapshot.
/// Nodes without geometry are skipped silently.
pub fn collect_mesh_records(scene: &SceneGraph, root: NodeId, min_size: f32) -> Vec<MeshRecord> {
    let mut records = Vec::new();
    if scene.get(root).is_none() {
        return records;
    }

    let mut open = vec![root];
    while let Some(id) = open.pop() {
        let Some(node) = scene.get(id) else {
            continue;
        };

        let bounds = compute_bounds(&scene.subtree_render_bounds(id), scene.world_position(id));
        if bounds.is_below_footprint(min_size) {
            log::debug!("Pruning \"{}\": footprint below {}", node.name, min_size);
            continue;
        }

        match &node.kind {
            NodeKind::LodGroup(tiers) if !tiers.is_empty() => {
                let lowest = &tiers[tiers.len() - 1];
                for &renderer in &lowest.renderers {
                    if let Some(record) = lod_renderer_record(scene, renderer) {
                        records.push(record);
                    }
                }
                continue;
            }
            NodeKind::LodGroup(_) => {}
            NodeKind::Plain(_) | NodeKind::Skinned(_) => {
                if let Some(record) = node_record(scene, id) {
                    records.push(record);
                }
            }
        }

        open.extend(node.children().iter().copied());
    }

    records
}

/// Record for the mesh drawn by a single node
pub fn node_record(scene: &SceneGraph, id: NodeId) -> Option<MeshRecord> {
    let node = scene.get(id)?;
    match &node.kind {
        NodeKind::Plain(Some(renderer)) => {
            let mesh = renderer.mesh.as_ref()?;
            Some(MeshRecord::from_mesh(
                &node.name,
                mesh,
                &renderer.materials,
                scene.world_matrix(id),
            ))
        }
        NodeKind::Skinned(skinned) => {
            let baked = skinned.bake(scene, id)?;
            Some(MeshRecord::from_mesh(
                &node.name,
                &baked,
                &skinned.materials,
                scene.world_matrix(id),
            ))
        }
        _ => None,
    }
}

/// A LOD renderer resolves to the first static mesh in its subtree, falling
/// back to the first skinned mesh there.
fn lod_renderer_record(scene: &SceneGraph, renderer: NodeId) -> Option<MeshRecord> {
    let subtree = scene.subtree(renderer);
    let static_mesh = subtree
        .iter()
        .copied()
        .find(|&n| scene.get(n).is_some_and(|node| node.is_static_mesh()));
    let found = static_mesh.or_else(|| {
        subtree
            .iter()
            .copied()
            .find(|&n| scene.get(n).is_some_and(|node| node.is_skinned()))
    })?;
    node_record(scene, found)
}

/// Leaves under `root` whose name contains `name_fragment` and that sit at or
/// below a node whose name contains `lod_marker`.
///
/// The marker search climbs past `root` up to the scene root.
pub fn collect_floor_nodes(
    scene: &SceneGraph,
    root: NodeId,
    name_fragment: &str,
    lod_marker: &str,
) -> Vec<NodeId> {
    let mut floors = Vec::new();
    if scene.get(root).is_some() {
        gather_floor_nodes(scene, root, name_fragment, lod_marker, &mut floors);
    }
    floors
}

fn gather_floor_nodes(
    scene: &SceneGraph,
    id: NodeId,
    name_fragment: &str,
    lod_marker: &str,
    floors: &mut Vec<NodeId>,
) {
    let Some(node) = scene.get(id) else {
        return;
    };

    if !node.children().is_empty() {
        for &child in node.children() {
            gather_floor_nodes(scene, child, name_fragment, lod_marker, floors);
        }
    } else if node.name.contains(name_fragment) && has_marked_ancestor(scene, id, lod_marker) {
        floors.push(id);
    }
}

fn has_marked_ancestor(scene: &SceneGraph, id: NodeId, marker: &str) -> bool {
    let mut current = scene.get(id);
    while let Some(node) = current {
        if node.name.contains(marker) {
            return true;
        }
        current = node.parent().and_then(|p| scene.get(p));
    }
    false
}
