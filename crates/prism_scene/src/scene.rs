//! 3D scene graph.
//!
//! Nodes live in a `SlotMap` arena; handles are stable across insertions and
//! removals. The scene also carries the pending [`InvalidateTypes`] the host
//! drains once per frame, and (while a host is running) the
//! [`AttachContext`] used to auto-attach newly added nodes.

use glam::Mat4;
use prism_core::{PrismError, RenderType, Result, Visibility};
use prism_resources::AttachContext;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::context::RenderContext;
use crate::invalidation::{DirtyFlags, InvalidateTypes, propagate};
use crate::node::SceneNode;

new_key_type! {
    /// Handle to a [`SceneNode`] in a [`Scene`].
    pub struct NodeHandle;
}

/// Entry of the pre-order flattened scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenedNode {
    pub depth: usize,
    pub handle: NodeHandle,
}

#[derive(Default)]
pub struct Scene {
    nodes: SlotMap<NodeHandle, SceneNode>,
    roots: Vec<NodeHandle>,
    pending: InvalidateTypes,
    attach_context: Option<AttachContext>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Topology
    // ========================================================================

    /// Adds a root node. It is attached immediately when a host context is set.
    pub fn add_node(&mut self, node: SceneNode) -> NodeHandle {
        let handle = self.nodes.insert(node);
        self.roots.push(handle);
        self.on_node_added(handle);
        handle
    }

    /// Adds `node` under `parent`.
    pub fn add_child(&mut self, parent: NodeHandle, mut node: SceneNode) -> Result<NodeHandle> {
        if !self.nodes.contains_key(parent) {
            return Err(PrismError::NodeNotFound);
        }
        node.parent = Some(parent);
        let handle = self.nodes.insert(node);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(handle);
        }
        self.on_node_added(handle);
        Ok(handle)
    }

    fn on_node_added(&mut self, handle: NodeHandle) {
        self.pending |= InvalidateTypes::SCENE_GRAPH | InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER;

        let parent_attached = self
            .nodes
            .get(handle)
            .and_then(|n| n.parent)
            .is_none_or(|p| self.nodes.get(p).is_some_and(|p| p.attached));
        if parent_attached && let Some(ctx) = self.attach_context.clone() {
            if let Err(err) = self.attach(handle, Some(&ctx)) {
                log::warn!("Failed to attach new node: {err}");
            }
        }
    }

    /// Moves `child` (and its subtree) under `parent`.
    pub fn reparent(&mut self, child: NodeHandle, parent: NodeHandle) -> Result<()> {
        if child == parent || self.is_ancestor(child, parent) {
            log::warn!("Refusing to parent a node under itself or its descendant");
            return Ok(());
        }
        if !self.nodes.contains_key(child) || !self.nodes.contains_key(parent) {
            return Err(PrismError::NodeNotFound);
        }
        self.unlink(child);
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = Some(parent);
            let model = *c.model_matrix();
            c.set_model_matrix(model);
        }
        self.pending |= InvalidateTypes::SCENE_GRAPH | InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER;
        Ok(())
    }

    fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut cursor = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(h) = cursor {
            if h == ancestor {
                return true;
            }
            cursor = self.nodes.get(h).and_then(|n| n.parent);
        }
        false
    }

    /// Detaches the node from its parent's child list (or the root list).
    fn unlink(&mut self, handle: NodeHandle) {
        match self.nodes.get(handle).and_then(|n| n.parent) {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.retain(|&c| c != handle);
                }
            }
            None => self.roots.retain(|&r| r != handle),
        }
    }

    /// Removes a node and its subtree, detaching them first.
    ///
    /// Returns `false` for a stale handle.
    pub fn remove_node(&mut self, handle: NodeHandle) -> bool {
        if !self.nodes.contains_key(handle) {
            return false;
        }
        self.detach(handle);
        self.unlink(handle);

        let mut stack: SmallVec<[NodeHandle; 16]> = SmallVec::new();
        stack.push(handle);
        while let Some(h) = stack.pop() {
            if let Some(node) = self.nodes.remove(h) {
                stack.extend(node.children);
            }
        }

        self.pending |= InvalidateTypes::SCENE_GRAPH | InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER;
        true
    }

    // ========================================================================
    // Access
    // ========================================================================

    #[must_use]
    pub fn get(&self, handle: NodeHandle) -> Option<&SceneNode> {
        self.nodes.get(handle)
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut SceneNode> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &SceneNode)> {
        self.nodes.iter()
    }

    /// First node with the given name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<NodeHandle> {
        self.nodes.iter().find(|(_, n)| n.name == name).map(|(h, _)| h)
    }

    // ========================================================================
    // Attachment
    // ========================================================================

    #[must_use]
    pub fn attach_context(&self) -> Option<&AttachContext> {
        self.attach_context.as_ref()
    }

    /// Installs (or clears) the context new nodes auto-attach with.
    pub fn set_attach_context(&mut self, ctx: Option<AttachContext>) {
        self.attach_context = ctx;
    }

    /// Attaches a node and its subtree.
    ///
    /// No-op for already attached nodes and when `ctx` is `None`. Stops at the
    /// first core that fails to attach; nodes attached before it stay attached.
    pub fn attach(&mut self, handle: NodeHandle, ctx: Option<&AttachContext>) -> Result<()> {
        let Some(ctx) = ctx else {
            return Ok(());
        };
        let Some(node) = self.nodes.get_mut(handle) else {
            return Err(PrismError::NodeNotFound);
        };

        if !node.attached {
            if let Some(core) = node.core.materialize() {
                core.attach(ctx)
                    .map_err(|e| PrismError::core_fault(node.name.clone(), e.to_string()))?;
            }
            node.attached = true;
            node.dirty |= DirtyFlags::TRANSFORM | DirtyFlags::VISUAL;
            self.pending |= InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER;
        }

        let children: SmallVec<[NodeHandle; 8]> = self
            .nodes
            .get(handle)
            .map(|n| n.children.iter().copied().collect())
            .unwrap_or_default();
        for child in children {
            self.attach(child, Some(ctx))?;
        }
        Ok(())
    }

    /// Attaches every root subtree with the stored context.
    ///
    /// A root whose subtree fails to attach is logged and skipped; device
    /// errors abort the walk.
    pub fn attach_all(&mut self) -> Result<()> {
        let Some(ctx) = self.attach_context.clone() else {
            return Ok(());
        };
        for root in self.roots.clone() {
            match self.attach(root, Some(&ctx)) {
                Err(err) if err.is_device_error() => return Err(err),
                Err(err) => log::warn!("Skipping scene subtree that failed to attach: {err}"),
                Ok(()) => {}
            }
        }
        self.pending |= InvalidateTypes::SCENE_GRAPH | InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER;
        Ok(())
    }

    /// Detaches a node and its subtree, releasing core resources.
    pub fn detach(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        if node.attached {
            if let Some(core) = node.core.get_mut() {
                core.detach();
            }
            node.attached = false;
            self.pending |= InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER;
        }
        let children: SmallVec<[NodeHandle; 8]> = node.children.iter().copied().collect();
        for child in children {
            self.detach(child);
        }
    }

    pub fn detach_all(&mut self) {
        for root in self.roots.clone() {
            self.detach(root);
        }
    }

    // ========================================================================
    // Mutation with invalidation
    // ========================================================================

    pub fn set_visibility(&mut self, handle: NodeHandle, visibility: Visibility) {
        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        if node.visibility == visibility {
            return;
        }
        node.visibility = visibility;
        self.pending |= InvalidateTypes::PER_FRAME_RENDERABLES;
        self.invalidate_visual(handle);
    }

    pub fn set_model_matrix(&mut self, handle: NodeHandle, model: Mat4) {
        if let Some(node) = self.nodes.get_mut(handle) {
            node.set_model_matrix(model);
            self.invalidate_transform(handle);
        }
    }

    pub fn set_render_type(&mut self, handle: NodeHandle, render_type: RenderType) {
        if let Some(node) = self.nodes.get_mut(handle)
            && node.render_type != render_type
        {
            node.render_type = render_type;
            node.set_render_priority(render_type.default_priority());
            self.pending |= InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER;
        }
    }

    pub fn set_render_priority(&mut self, handle: NodeHandle, priority: u32) {
        if let Some(node) = self.nodes.get_mut(handle) {
            node.set_render_priority(priority);
            self.pending |= InvalidateTypes::RENDER;
        }
    }

    /// Sets `flag` on the node and its ancestors, raising a render request
    /// when the node is attached.
    pub fn invalidate(&mut self, handle: NodeHandle, flag: DirtyFlags) {
        if propagate(&mut self.nodes, handle, flag) == Some(true) {
            self.pending |= InvalidateTypes::RENDER;
        }
    }

    pub fn invalidate_measure(&mut self, handle: NodeHandle) {
        self.invalidate(handle, DirtyFlags::MEASURE);
    }

    pub fn invalidate_arrange(&mut self, handle: NodeHandle) {
        self.invalidate(handle, DirtyFlags::ARRANGE);
    }

    pub fn invalidate_visual(&mut self, handle: NodeHandle) {
        self.invalidate(handle, DirtyFlags::VISUAL);
    }

    pub fn invalidate_transform(&mut self, handle: NodeHandle) {
        self.invalidate(handle, DirtyFlags::TRANSFORM);
    }

    pub fn invalidate_all(&mut self, handle: NodeHandle) {
        self.invalidate(handle, DirtyFlags::all());
    }

    // ========================================================================
    // Scene-level invalidation
    // ========================================================================

    pub fn request_render(&mut self) {
        self.pending |= InvalidateTypes::RENDER;
    }

    pub fn invalidate_scene_graph(&mut self) {
        self.pending |= InvalidateTypes::SCENE_GRAPH | InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER;
    }

    pub fn invalidate_per_frame_renderables(&mut self) {
        self.pending |= InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER;
    }

    #[must_use]
    pub fn pending_invalidation(&self) -> InvalidateTypes {
        self.pending
    }

    /// Returns and clears the pending invalidation.
    pub fn take_invalidation(&mut self) -> InvalidateTypes {
        std::mem::take(&mut self.pending)
    }

    // ========================================================================
    // Per-frame
    // ========================================================================

    /// Pre-order walk of every root subtree, recording depth.
    pub fn flatten(&self, out: &mut Vec<FlattenedNode>) {
        out.clear();
        let mut stack: Vec<FlattenedNode> = self
            .roots
            .iter()
            .rev()
            .map(|&handle| FlattenedNode { depth: 0, handle })
            .collect();

        while let Some(entry) = stack.pop() {
            let Some(node) = self.nodes.get(entry.handle) else {
                continue;
            };
            out.push(entry);
            stack.extend(node.children.iter().rev().map(|&handle| FlattenedNode {
                depth: entry.depth + 1,
                handle,
            }));
        }
    }

    /// Per-frame update of a single node: total transform, core update and
    /// world bounds. Parents must be updated before their children.
    ///
    /// Per-frame dirty bits are consumed here.
    pub fn update_node(&mut self, handle: NodeHandle, ctx: &RenderContext) -> Result<()> {
        let parent = self
            .nodes
            .get(handle)
            .ok_or(PrismError::NodeNotFound)?
            .parent
            .and_then(|p| self.nodes.get(p))
            .map(|p| (*p.total_transform(), p.transform_generation()));

        let node = self.nodes.get_mut(handle).ok_or(PrismError::NodeNotFound)?;
        let moved = node.update_transform(parent.as_ref().map(|(m, g)| (m, *g)));
        node.dirty = DirtyFlags::empty();

        let world = *node.total_transform();
        if let Some(core) = node.core.get_mut() {
            core.on_update(ctx, &world)
                .map_err(|e| PrismError::core_fault(node.name.clone(), e.to_string()))?;
        }
        if moved || node.world_bounds().is_none() {
            node.update_world_bounds();
        }
        Ok(())
    }
}
