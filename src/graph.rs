//! Scene graph built on a `hecs` world.
//!
//! Every node is an entity carrying a [`Node`] (hierarchy and visibility) and a
//! [`Transform`]. Other components mark what a node is:
//!
//! - [`MeshResources`](crate::MeshResources): renderable geometry + material
//! - [`Infospot`](crate::Infospot): a navigation marker
//! - [`ScaleAdapter`]: a coordinate wrapper inserted by a panorama
//! - [`Mailbox`]: opt-in storage for downward [`NodeEvent`]s
//!
//! # Example
//!
//! ```
//! use panowalk::{SceneGraph, Transform, Vec3};
//!
//! let mut scene = SceneGraph::new();
//! let root = scene.spawn(Transform::new());
//! let child = scene.spawn(Transform::from_position(Vec3::X));
//!
//! scene.add_child(root, child);
//! assert_eq!(scene.children(root), vec![child]);
//! assert_eq!(scene.world_position(child), Vec3::X);
//! ```

use crate::event::NodeEvent;
use crate::infospot::Infospot;
use crate::mesh::Transform;
use glam::{Mat4, Vec3};
use hecs::{Entity, World};

/// Hierarchy and render flags of a scene node.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: Option<String>,
    parent: Option<Entity>,
    children: Vec<Entity>,
    pub visible: bool,
    /// Lower values are drawn first.
    pub render_order: i32,
}

impl Node {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            parent: None,
            children: Vec::new(),
            visible: true,
            render_order: 0,
        }
    }

    pub fn parent(&self) -> Option<Entity> {
        self.parent
    }

    pub fn children(&self) -> &[Entity] {
        &self.children
    }
}

/// Marker for a coordinate wrapper.
///
/// A panorama mirrors its sphere on the x axis so the texture reads correctly
/// from inside. Arbitrary content attached to it is wrapped in a node with
/// x-scale `-1` carrying this marker, which cancels the mirroring: the content's
/// world matrix keeps the handedness it would have had without the panorama.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScaleAdapter;

/// Queue of [`NodeEvent`]s received by a node.
///
/// Insert it on any node whose owner wants to observe panorama enter/leave,
/// container or dismiss notifications, then drain it with
/// [`SceneGraph::take_events`].
#[derive(Clone, Debug, Default)]
pub struct Mailbox(Vec<NodeEvent>);

/// Hierarchical store of scene nodes.
#[derive(Default)]
pub struct SceneGraph {
    world: World,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access to the underlying world.
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Spawn an unnamed, parentless node.
    pub fn spawn(&mut self, transform: Transform) -> Entity {
        self.world.spawn((Node::new(None), transform))
    }

    /// Spawn a parentless node with a name.
    pub fn spawn_named(&mut self, name: impl Into<String>, transform: Transform) -> Entity {
        self.world.spawn((Node::new(Some(name.into())), transform))
    }

    /// Attach an extra component to a node. Returns `false` if the node is gone.
    pub fn insert<C: hecs::Component>(&mut self, entity: Entity, component: C) -> bool {
        self.world.insert_one(entity, component).is_ok()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.world.contains(entity)
    }

    /// Number of live nodes.
    pub fn len(&self) -> u32 {
        self.world.len()
    }

    pub fn is_empty(&self) -> bool {
        self.world.len() == 0
    }

    fn node_mut(&mut self, entity: Entity) -> Option<&mut Node> {
        self.world.query_one_mut::<&mut Node>(entity).ok()
    }

    pub fn name(&self, entity: Entity) -> Option<String> {
        self.world
            .get::<&Node>(entity)
            .ok()
            .and_then(|node| node.name.clone())
    }

    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        self.world
            .get::<&Node>(entity)
            .ok()
            .and_then(|node| node.parent)
    }

    /// Direct children in insertion order.
    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.world
            .get::<&Node>(entity)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Whether `ancestor` appears on the parent chain of `entity`.
    pub fn is_ancestor(&self, ancestor: Entity, entity: Entity) -> bool {
        let mut current = self.parent(entity);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Make `child` the last child of `parent`, detaching it from any previous parent.
    ///
    /// Returns `false` (and changes nothing) if either node is missing or the
    /// link would create a cycle.
    pub fn add_child(&mut self, parent: Entity, child: Entity) -> bool {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return false;
        }
        if self.is_ancestor(child, parent) {
            log::warn!("Refusing to parent {:?} under its own descendant", child);
            return false;
        }

        self.detach(child);
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        true
    }

    /// Remove `child` from `parent`'s children. Returns `false` if it was not a child.
    pub fn remove_child(&mut self, parent: Entity, child: Entity) -> bool {
        let removed = match self.node_mut(parent) {
            Some(node) => {
                let before = node.children.len();
                node.children.retain(|&c| c != child);
                node.children.len() != before
            }
            None => false,
        };

        if removed {
            if let Some(node) = self.node_mut(child) {
                if node.parent == Some(parent) {
                    node.parent = None;
                }
            }
        }
        removed
    }

    /// Detach a node from its parent, if any.
    pub fn detach(&mut self, entity: Entity) -> bool {
        match self.parent(entity) {
            Some(parent) => self.remove_child(parent, entity),
            None => false,
        }
    }

    /// Every node below `root`, depth-first, parents before children.
    pub fn descendants(&self, root: Entity) -> Vec<Entity> {
        let mut out = Vec::new();
        let mut stack: Vec<Entity> = self.children(root).into_iter().rev().collect();

        while let Some(entity) = stack.pop() {
            out.push(entity);
            stack.extend(self.children(entity).into_iter().rev());
        }
        out
    }

    /// Every node below `root`, children before parents, last child first.
    pub fn post_order(&self, root: Entity) -> Vec<Entity> {
        let mut out = Vec::new();
        let mut stack: Vec<(Entity, bool)> = self
            .children(root)
            .into_iter()
            .map(|child| (child, false))
            .collect();

        while let Some((entity, expanded)) = stack.pop() {
            if expanded {
                out.push(entity);
            } else {
                stack.push((entity, true));
                stack.extend(self.children(entity).into_iter().map(|child| (child, false)));
            }
        }
        out
    }

    pub fn transform(&self, entity: Entity) -> Option<Transform> {
        self.world.get::<&Transform>(entity).ok().map(|t| *t)
    }

    pub fn set_transform(&mut self, entity: Entity, transform: Transform) -> bool {
        match self.world.query_one_mut::<&mut Transform>(entity) {
            Ok(t) => {
                *t = transform;
                true
            }
            Err(_) => false,
        }
    }

    /// Local-to-world matrix, composed up the parent chain.
    pub fn world_matrix(&self, entity: Entity) -> Mat4 {
        let local = |e: Entity| self.transform(e).map(|t| t.matrix()).unwrap_or_default();

        let mut matrix = local(entity);
        let mut current = self.parent(entity);
        while let Some(parent) = current {
            matrix = local(parent) * matrix;
            current = self.parent(parent);
        }
        matrix
    }

    pub fn world_position(&self, entity: Entity) -> Vec3 {
        self.world_matrix(entity).transform_point3(Vec3::ZERO)
    }

    pub fn is_visible(&self, entity: Entity) -> bool {
        self.world
            .get::<&Node>(entity)
            .map(|node| node.visible)
            .unwrap_or(false)
    }

    pub fn set_visible(&mut self, entity: Entity, visible: bool) {
        if let Some(node) = self.node_mut(entity) {
            node.visible = visible;
        }
    }

    pub fn render_order(&self, entity: Entity) -> i32 {
        self.world
            .get::<&Node>(entity)
            .map(|node| node.render_order)
            .unwrap_or_default()
    }

    pub fn set_render_order(&mut self, entity: Entity, order: i32) {
        if let Some(node) = self.node_mut(entity) {
            node.render_order = order;
        }
    }

    /// Wrap `child` in a new [`ScaleAdapter`] node with x-scale `-1`.
    ///
    /// Returns the wrapper, which is left parentless.
    pub fn wrap_inverted(&mut self, child: Entity) -> Entity {
        let wrapper = self.world.spawn((
            Node::new(Some("scale-adapter".to_string())),
            Transform::new().scale(Vec3::new(-1.0, 1.0, 1.0)),
            ScaleAdapter,
        ));
        self.add_child(wrapper, child);
        wrapper
    }

    pub fn is_scale_adapter(&self, entity: Entity) -> bool {
        self.world.get::<&ScaleAdapter>(entity).is_ok()
    }

    pub fn is_infospot(&self, entity: Entity) -> bool {
        self.world.get::<&Infospot>(entity).is_ok()
    }

    /// Deliver a downward notification to one node.
    ///
    /// Infospots handle it immediately; nodes with a [`Mailbox`] queue it.
    pub fn dispatch(&mut self, entity: Entity, event: NodeEvent) {
        if let Ok(spot) = self.world.query_one_mut::<&mut Infospot>(entity) {
            spot.handle(&event);
        }
        if let Ok(mailbox) = self.world.query_one_mut::<&mut Mailbox>(entity) {
            mailbox.0.push(event);
        }
    }

    /// Drain the node's [`Mailbox`]. Empty if it has none.
    pub fn take_events(&mut self, entity: Entity) -> Vec<NodeEvent> {
        self.world
            .query_one_mut::<&mut Mailbox>(entity)
            .map(|mailbox| std::mem::take(&mut mailbox.0))
            .unwrap_or_default()
    }

    /// Remove a node from the world.
    ///
    /// It is detached from its parent first; its children become parentless.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.detach(entity);
        for child in self.children(entity) {
            if let Some(node) = self.node_mut(child) {
                node.parent = None;
            }
        }
        self.world.despawn(entity).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (SceneGraph, Entity, [Entity; 4]) {
        // root
        // ├── a
        // │   ├── a1
        // │   └── a2
        // └── b
        let mut scene = SceneGraph::new();
        let root = scene.spawn_named("root", Transform::new());
        let a = scene.spawn_named("a", Transform::new());
        let a1 = scene.spawn_named("a1", Transform::new());
        let a2 = scene.spawn_named("a2", Transform::new());
        let b = scene.spawn_named("b", Transform::new());
        scene.add_child(root, a);
        scene.add_child(a, a1);
        scene.add_child(a, a2);
        scene.add_child(root, b);
        (scene, root, [a, a1, a2, b])
    }

    #[test]
    fn descendants_are_pre_order() {
        let (scene, root, [a, a1, a2, b]) = tree();
        assert_eq!(scene.descendants(root), vec![a, a1, a2, b]);
        assert_eq!(scene.descendants(b), vec![]);
    }

    #[test]
    fn post_order_visits_children_first_last_child_first() {
        let (scene, root, [a, a1, a2, b]) = tree();
        assert_eq!(scene.post_order(root), vec![b, a2, a1, a]);
    }

    #[test]
    fn add_child_reparents() {
        let (mut scene, root, [a, a1, _, b]) = tree();
        assert!(scene.add_child(b, a1));
        assert_eq!(scene.parent(a1), Some(b));
        assert!(!scene.children(a).contains(&a1));
        assert!(scene.is_ancestor(root, a1));
    }

    #[test]
    fn add_child_rejects_cycles() {
        let (mut scene, root, [a, a1, _, _]) = tree();
        assert!(!scene.add_child(a1, root));
        assert!(!scene.add_child(a, a));
        assert_eq!(scene.parent(a), Some(root));
    }

    #[test]
    fn remove_and_detach() {
        let (mut scene, root, [a, _, _, b]) = tree();
        assert!(scene.remove_child(root, b));
        assert!(!scene.remove_child(root, b));
        assert_eq!(scene.parent(b), None);

        assert!(scene.detach(a));
        assert!(!scene.detach(a));
        assert!(scene.children(root).is_empty());
    }

    #[test]
    fn world_matrix_composes_parents() {
        let mut scene = SceneGraph::new();
        let parent = scene.spawn(Transform::from_position(Vec3::new(0.0, 1.0, 0.0)).uniform_scale(2.0));
        let child = scene.spawn(Transform::from_position(Vec3::new(1.0, 0.0, 0.0)));
        scene.add_child(parent, child);

        assert_eq!(scene.world_position(child), Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn inverted_wrapper_cancels_mirrored_parent() {
        let mut scene = SceneGraph::new();
        let mirrored = scene.spawn(Transform::new().scale(Vec3::new(-1.0, 1.0, 1.0)));
        let content = scene.spawn(Transform::from_position(Vec3::new(3.0, 0.0, 0.0)));

        let wrapper = scene.wrap_inverted(content);
        scene.add_child(mirrored, wrapper);

        assert!(scene.is_scale_adapter(wrapper));
        assert!(scene.world_matrix(content).determinant() > 0.0);
        assert_eq!(scene.world_position(content), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn dispatch_reaches_mailbox_only() {
        let (mut scene, _, [a, a1, _, _]) = tree();
        scene.insert(a, Mailbox::default());

        scene.dispatch(a, NodeEvent::Dismiss);
        scene.dispatch(a1, NodeEvent::Dismiss);

        assert_eq!(scene.take_events(a), vec![NodeEvent::Dismiss]);
        assert!(scene.take_events(a).is_empty());
        assert!(scene.take_events(a1).is_empty());
    }

    #[test]
    fn despawn_orphans_children() {
        let (mut scene, root, [a, a1, a2, _]) = tree();
        assert!(scene.despawn(a));
        assert!(!scene.contains(a));
        assert_eq!(scene.parent(a1), None);
        assert_eq!(scene.parent(a2), None);
        assert_eq!(scene.children(root).len(), 1);
    }

    #[test]
    fn visibility_and_render_order() {
        let (mut scene, root, _) = tree();
        assert!(scene.is_visible(root));
        scene.set_visible(root, false);
        scene.set_render_order(root, -1);
        assert!(!scene.is_visible(root));
        assert_eq!(scene.render_order(root), -1);
        assert_eq!(scene.name(root).as_deref(), Some("root"));
    }
}
