//! Recursive teardown of a scene subtree.

use crate::graph::SceneGraph;
use crate::infospot::Infospot;
use crate::mesh::MeshResources;
use hecs::Entity;

/// What a teardown touched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Disposal {
    /// Despawned nodes, children before parents.
    pub nodes: Vec<Entity>,
    /// Despawned nodes that carried an [`Infospot`].
    pub infospots: Vec<Entity>,
    /// Mesh resources released.
    pub released: usize,
}

/// Dispose and despawn every descendant of `root`.
///
/// The traversal order is collected before anything is removed, then each node
/// is processed children first: infospot and mesh resources are released, the
/// node is detached from its parent and despawned. `root` itself survives with
/// no children.
pub fn dispose_subtree(scene: &mut SceneGraph, root: Entity) -> Disposal {
    let order = scene.post_order(root);
    let mut report = Disposal::default();

    for entity in order {
        if let Ok(spot) = scene.world_mut().query_one_mut::<&mut Infospot>(entity) {
            spot.dispose();
            report.infospots.push(entity);
        }
        if let Ok(mesh) = scene.world_mut().query_one_mut::<&mut MeshResources>(entity) {
            mesh.dispose();
            report.released += 1;
        }

        scene.despawn(entity);
        report.nodes.push(entity);
    }

    log::debug!(
        "Disposed {} nodes ({} infospots) below {:?}",
        report.nodes.len(),
        report.infospots.len(),
        root
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Geometry, Material, Transform};
    use crate::texture::Icon;

    #[test]
    fn children_go_before_parents() {
        let mut scene = SceneGraph::new();
        let root = scene.spawn(Transform::new());
        let group = scene.spawn(Transform::new());
        let leaf = scene.spawn(Transform::new());
        scene.add_child(root, group);
        scene.add_child(group, leaf);

        let report = dispose_subtree(&mut scene, root);

        assert_eq!(report.nodes, vec![leaf, group]);
        assert!(scene.children(root).is_empty());
        assert!(scene.contains(root));
        assert!(!scene.contains(group));
    }

    #[test]
    fn releases_infospots_and_meshes() {
        let mut scene = SceneGraph::new();
        let root = scene.spawn(Transform::new());
        let spot = Infospot::spawn(&mut scene, 1.0, Icon::Arrow.into());
        let model = scene.spawn(Transform::new());
        scene.insert(
            model,
            MeshResources::new(Geometry::sphere(1.0, 4, 2), Material::basic()),
        );
        scene.add_child(root, spot);
        scene.add_child(root, model);

        let report = dispose_subtree(&mut scene, root);

        assert_eq!(report.infospots, vec![spot]);
        assert_eq!(report.released, 1);
        assert_eq!(report.nodes.len(), 2);
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn leaf_root_is_untouched() {
        let mut scene = SceneGraph::new();
        let root = scene.spawn(Transform::new());
        assert_eq!(dispose_subtree(&mut scene, root), Disposal::default());
        assert!(scene.contains(root));
    }
}
