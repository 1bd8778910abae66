use glam::{Affine2, Vec2};
use prism_core::math::Rect;
use prism_core::{PrismError, Result, Visibility};
use prism_resources::{AttachContext, DeviceContext};
use slotmap::SlotMap;
use smallvec::SmallVec;

use crate::invalidation::{DirtyFlags, InvalidateTypes, propagate};
use crate::scene2d::Node2DHandle;
use crate::scene2d::layout::{HorizontalAlignment, VerticalAlignment, align};
use crate::scene2d::node::SceneNode2D;

type Children = SmallVec<[Node2DHandle; 8]>;

/// 2D overlay scene graph.
///
/// # Layout
///
/// [`update_layout`](Self::update_layout) runs measure then arrange from the
/// roots. Both passes cache their input (`previous_measure_size`,
/// `previous_arrange_rect`) and skip work when the input is unchanged and the
/// corresponding dirty bit is clear.
#[derive(Default)]
pub struct Scene2D {
    nodes: SlotMap<Node2DHandle, SceneNode2D>,
    roots: Vec<Node2DHandle>,
    pending: InvalidateTypes,
    attach_context: Option<AttachContext>,
}

impl Scene2D {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Topology
    // ========================================================================

    pub fn add_node(&mut self, node: SceneNode2D) -> Node2DHandle {
        let handle = self.nodes.insert(node);
        self.roots.push(handle);
        self.on_node_added(handle);
        handle
    }

    pub fn add_child(&mut self, parent: Node2DHandle, mut node: SceneNode2D) -> Result<Node2DHandle> {
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

    fn on_node_added(&mut self, handle: Node2DHandle) {
        self.invalidate_measure(handle);
        self.pending |= InvalidateTypes::RENDER;
        let parent_attached = self
            .nodes
            .get(handle)
            .and_then(|n| n.parent)
            .is_none_or(|p| self.nodes.get(p).is_some_and(|p| p.attached));
        if parent_attached && let Some(ctx) = self.attach_context.clone() {
            if let Err(err) = self.attach(handle, Some(&ctx)) {
                log::warn!("Failed to attach new 2D node: {err}");
            }
        }
    }

    pub fn remove_node(&mut self, handle: Node2DHandle) -> bool {
        if !self.nodes.contains_key(handle) {
            return false;
        }
        self.detach(handle);
        match self.nodes.get(handle).and_then(|n| n.parent) {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.retain(|&c| c != handle);
                }
                self.invalidate_measure(parent);
            }
            None => self.roots.retain(|&r| r != handle),
        }
        let mut stack: Children = SmallVec::new();
        stack.push(handle);
        while let Some(h) = stack.pop() {
            if let Some(node) = self.nodes.remove(h) {
                stack.extend(node.children);
            }
        }
        self.pending |= InvalidateTypes::RENDER;
        true
    }

    #[must_use]
    pub fn get(&self, handle: Node2DHandle) -> Option<&SceneNode2D> {
        self.nodes.get(handle)
    }

    /// Direct access. Layout inputs changed through this reference need an
    /// explicit `invalidate_measure`.
    pub fn get_mut(&mut self, handle: Node2DHandle) -> Option<&mut SceneNode2D> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn roots(&self) -> &[Node2DHandle] {
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

    /// Whether any root would draw.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.roots
            .iter()
            .any(|&r| self.nodes.get(r).is_some_and(SceneNode2D::is_renderable))
    }

    // ========================================================================
    // Attachment
    // ========================================================================

    pub fn set_attach_context(&mut self, ctx: Option<AttachContext>) {
        self.attach_context = ctx;
    }

    pub fn attach(&mut self, handle: Node2DHandle, ctx: Option<&AttachContext>) -> Result<()> {
        let Some(ctx) = ctx else {
            return Ok(());
        };
        let Some(node) = self.nodes.get_mut(handle) else {
            return Err(PrismError::NodeNotFound);
        };
        if !node.attached {
            if let Some(core) = node.core.as_mut() {
                core.attach(ctx)?;
            }
            node.attached = true;
            node.bitmap_valid = false;
        }
        let children: Children = node.children.iter().copied().collect();
        for child in children {
            self.attach(child, Some(ctx))?;
        }
        self.pending |= InvalidateTypes::RENDER;
        Ok(())
    }

    pub fn attach_all(&mut self) -> Result<()> {
        let Some(ctx) = self.attach_context.clone() else {
            return Ok(());
        };
        for root in self.roots.clone() {
            self.attach(root, Some(&ctx))?;
        }
        Ok(())
    }

    /// Detaches the subtree and releases bitmap caches.
    pub fn detach(&mut self, handle: Node2DHandle) {
        let device = self.attach_context.as_ref().map(|c| c.device().clone());
        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        if node.attached {
            if let Some(core) = node.core.as_mut() {
                core.detach();
            }
            if let Some((bitmap, _, _)) = node.bitmap.take()
                && let Some(device) = device.as_ref()
            {
                device.destroy_bitmap(bitmap);
            }
            node.bitmap_valid = false;
            node.attached = false;
        }
        let children: Children = node.children.iter().copied().collect();
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
    // Invalidation
    // ========================================================================

    pub fn invalidate(&mut self, handle: Node2DHandle, flag: DirtyFlags) {
        if flag.contains(DirtyFlags::VISUAL)
            && let Some(node) = self.nodes.get_mut(handle)
        {
            node.bitmap_valid = false;
        }
        if propagate(&mut self.nodes, handle, flag) == Some(true) {
            self.pending |= InvalidateTypes::RENDER;
        }
    }

    pub fn invalidate_measure(&mut self, handle: Node2DHandle) {
        self.invalidate(handle, DirtyFlags::MEASURE);
    }

    pub fn invalidate_arrange(&mut self, handle: Node2DHandle) {
        self.invalidate(handle, DirtyFlags::ARRANGE);
    }

    pub fn invalidate_visual(&mut self, handle: Node2DHandle) {
        self.invalidate(handle, DirtyFlags::VISUAL);
    }

    pub fn invalidate_transform(&mut self, handle: Node2DHandle) {
        self.invalidate(handle, DirtyFlags::TRANSFORM);
    }

    pub fn invalidate_all(&mut self, handle: Node2DHandle) {
        self.invalidate(handle, DirtyFlags::all());
    }

    pub fn set_visibility(&mut self, handle: Node2DHandle, visibility: Visibility) {
        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        if node.visibility == visibility {
            return;
        }
        let affects_layout = visibility == Visibility::Collapsed || node.visibility == Visibility::Collapsed;
        node.visibility = visibility;
        if affects_layout {
            self.invalidate_measure(handle);
        }
        self.invalidate_visual(handle);
    }

    pub fn take_invalidation(&mut self) -> InvalidateTypes {
        std::mem::take(&mut self.pending)
    }

    #[must_use]
    pub fn pending_invalidation(&self) -> InvalidateTypes {
        self.pending
    }

    // ========================================================================
    // Layout
    // ========================================================================

    /// Measures and arranges every root against the overlay size.
    pub fn update_layout(&mut self, available: Vec2) {
        for root in self.roots.clone() {
            self.measure(root, available);
            self.arrange(root, Rect::from_origin_size(Vec2::ZERO, available));
        }
    }

    /// Measure pass. No-op when `available` matches the previous pass and
    /// `MEASURE` is clear.
    pub fn measure(&mut self, handle: Node2DHandle, available: Vec2) {
        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        if node.previous_measure_size == Some(available) && !node.dirty.contains(DirtyFlags::MEASURE) {
            return;
        }
        node.previous_measure_size = Some(available);

        if node.visibility == Visibility::Collapsed {
            node.desired_size = Vec2::ZERO;
            node.dirty.remove(DirtyFlags::MEASURE);
            return;
        }
        node.measure_count += 1;

        let margin = node.margin.size();
        let content_available = node.constrain((available - margin).max(Vec2::ZERO));
        let mut content = node
            .core
            .as_mut()
            .map_or(Vec2::ZERO, |core| core.measure_override(content_available));

        let children: Children = node.children.iter().copied().collect();
        for &child in &children {
            self.measure(child, content_available);
            if let Some(c) = self.nodes.get(child) {
                content = content.max(c.desired_size);
            }
        }

        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        let desired = node.constrain(content) + margin;
        let changed = desired != node.desired_size;
        node.desired_size = desired;
        node.dirty.remove(DirtyFlags::MEASURE);

        if changed {
            self.invalidate_arrange(handle);
            for child in children {
                self.invalidate_measure(child);
            }
        }
    }

    /// Arrange pass. Runs a measure first when it is stale.
    pub fn arrange(&mut self, handle: Node2DHandle, final_rect: Rect) {
        let Some(node) = self.nodes.get(handle) else {
            return;
        };
        if node.visibility == Visibility::Collapsed {
            return;
        }
        if node.dirty.contains(DirtyFlags::MEASURE) || node.previous_measure_size.is_none() {
            self.measure(handle, final_rect.size());
        }

        let Some(node) = self.nodes.get_mut(handle) else {
            return;
        };
        if node.previous_arrange_rect == Some(final_rect) && !node.dirty.contains(DirtyFlags::ARRANGE) {
            return;
        }

        // Stretch yields to an explicit size.
        let horizontal = match (node.horizontal_alignment, node.width) {
            (HorizontalAlignment::Stretch, Some(_)) => HorizontalAlignment::Center,
            (h, _) => h,
        };
        let vertical = match (node.vertical_alignment, node.height) {
            (VerticalAlignment::Stretch, Some(_)) => VerticalAlignment::Center,
            (v, _) => v,
        };
        let content = (node.desired_size - node.margin.size()).max(Vec2::ZERO);
        let arrangement = align(content, final_rect, horizontal, vertical, node.margin);

        let mut bound = arrangement.bound;
        let size = bound.size().min(node.max_size);
        bound.width = size.x;
        bound.height = size.y;

        if bound.size() != node.render_size {
            node.bitmap_valid = false;
        }
        node.layout_bound = bound;
        node.render_size = bound.size();
        node.clip_enabled = arrangement.clip_enabled;
        node.previous_arrange_rect = Some(final_rect);
        node.dirty.remove(DirtyFlags::ARRANGE);
        node.dirty.insert(DirtyFlags::VISUAL);

        let children: Children = node.children.iter().copied().collect();
        for child in children {
            self.arrange(child, bound);
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Draws the overlay. Non-device errors of a single node are logged and
    /// the node is skipped.
    pub fn render(&mut self, dc: &mut dyn DeviceContext) -> Result<()> {
        dc.begin_2d()?;
        for root in self.roots.clone() {
            self.render_node(root, dc)?;
        }
        dc.end_2d()
    }

    fn render_node(&mut self, handle: Node2DHandle, dc: &mut dyn DeviceContext) -> Result<()> {
        let Some(node) = self.nodes.get(handle) else {
            return Ok(());
        };
        if !node.is_renderable() {
            return Ok(());
        }
        let clip = node.clip_enabled.then_some(node.layout_bound);
        if let Some(rect) = clip {
            dc.push_clip(rect);
        }

        if let Err(err) = self.draw_visual(handle, dc) {
            if err.is_device_error() {
                return Err(err);
            }
            log::warn!("2D node render failed: {err}");
        }

        let children: Children = self
            .nodes
            .get(handle)
            .map(|n| n.children.iter().copied().collect())
            .unwrap_or_default();
        for child in children {
            self.render_node(child, dc)?;
        }

        if clip.is_some() {
            dc.pop_clip();
        }
        if let Some(node) = self.nodes.get_mut(handle) {
            node.dirty.remove(DirtyFlags::VISUAL);
        }
        Ok(())
    }

    fn draw_visual(&mut self, handle: Node2DHandle, dc: &mut dyn DeviceContext) -> Result<()> {
        let device = self.attach_context.as_ref().map(|c| c.device().clone());
        let Some(node) = self.nodes.get_mut(handle) else {
            return Ok(());
        };
        let Some(core) = node.core.as_ref() else {
            return Ok(());
        };
        let bound = node.layout_bound;

        let cache_size = (bound.width.ceil() as u32, bound.height.ceil() as u32);
        let use_cache = node.bitmap_cache && device.is_some() && cache_size.0 > 0 && cache_size.1 > 0;
        if !use_cache {
            dc.set_transform_2d(Affine2::from_translation(bound.origin()));
            return core.render(dc, bound.size());
        }

        let Some(device) = device else {
            return Ok(());
        };
        let bitmap = match node.bitmap {
            Some((id, w, h)) if (w, h) == cache_size => id,
            stale => {
                if let Some((id, _, _)) = stale {
                    device.destroy_bitmap(id);
                }
                node.bitmap = None;
                let id = device.create_bitmap(cache_size.0, cache_size.1)?;
                node.bitmap = Some((id, cache_size.0, cache_size.1));
                node.bitmap_valid = false;
                id
            }
        };

        if !node.bitmap_valid {
            dc.begin_bitmap(bitmap)?;
            dc.set_transform_2d(Affine2::IDENTITY);
            // The bitmap scope is closed even when the content fails, so
            // siblings keep drawing into the overlay.
            let drawn = core.render(dc, bound.size());
            dc.end_bitmap()?;
            drawn?;
            node.bitmap_valid = true;
        }
        dc.set_transform_2d(Affine2::IDENTITY);
        dc.draw_bitmap(bitmap, bound);
        Ok(())
    }
}
