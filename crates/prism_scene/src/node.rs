use glam::{Mat4, Vec3};
use prism_core::math::{BoundingBox, BoundingSphere};
use prism_core::{OrderKey, RenderType, Visibility};

use crate::core::{CoreSlot, RenderCore};
use crate::cores::GroupCore;
use crate::invalidation::{DirtyFlags, DirtyNode};
use crate::scene::NodeHandle;

/// A 3D scene node.
///
/// # Hierarchy
///
/// - `parent`: non-owning back link (None for roots)
/// - `children`: owned by the scene arena through these handles
///
/// # Transform
///
/// `total_transform = parent.total_transform * model_matrix`. It is recomputed
/// only when the local matrix changed or the parent's total transform changed
/// since this node last looked, tracked with a per-node generation counter.
///
/// # Renderability
///
/// A node is renderable iff it is `Visible` and attached to a host.
#[derive(Debug)]
pub struct SceneNode {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,

    pub(crate) visibility: Visibility,
    pub(crate) attached: bool,
    pub(crate) render_type: RenderType,
    pub(crate) core: CoreSlot,
    pub(crate) dirty: DirtyFlags,

    render_priority: u32,
    order_key: OrderKey,
    is_in_frustum: bool,

    // === Transform ===
    model_matrix: Mat4,
    model_changed: bool,
    total_transform: Mat4,
    transform_generation: u64,
    parent_generation_seen: u64,

    // === Bounds ===
    world_box: Option<BoundingBox>,
    world_sphere: Option<BoundingSphere>,

    /// Renderability observed by the previous classification walk.
    was_renderable: bool,
}

impl SceneNode {
    /// Grouping node: Opaque, with a [`GroupCore`] that draws nothing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            visibility: Visibility::Visible,
            attached: false,
            render_type: RenderType::Opaque,
            core: CoreSlot::Ready(Box::new(GroupCore)),
            dirty: DirtyFlags::empty(),
            render_priority: RenderType::Opaque.default_priority(),
            order_key: OrderKey::default(),
            is_in_frustum: true,
            model_matrix: Mat4::IDENTITY,
            model_changed: true,
            total_transform: Mat4::IDENTITY,
            transform_generation: 0,
            parent_generation_seen: 0,
            world_box: None,
            world_sphere: None,
            was_renderable: false,
        }
    }

    /// Node with an eagerly constructed core.
    #[must_use]
    pub fn with_core(name: impl Into<String>, render_type: RenderType, core: Box<dyn RenderCore>) -> Self {
        let mut node = Self::new(name).with_render_type(render_type);
        node.core = CoreSlot::Ready(core);
        node
    }

    /// Node whose core is built on first attach.
    #[must_use]
    pub fn with_lazy_core<F>(name: impl Into<String>, render_type: RenderType, factory: F) -> Self
    where
        F: FnOnce() -> Box<dyn RenderCore> + Send + Sync + 'static,
    {
        let mut node = Self::new(name).with_render_type(render_type);
        node.core = CoreSlot::Pending(Box::new(factory));
        node
    }

    #[must_use]
    pub fn with_render_type(mut self, render_type: RenderType) -> Self {
        self.render_type = render_type;
        self.render_priority = render_type.default_priority();
        self
    }

    #[must_use]
    pub fn with_transform(mut self, model: Mat4) -> Self {
        self.model_matrix = model;
        self.model_changed = true;
        self
    }

    #[must_use]
    pub fn with_translation(self, translation: Vec3) -> Self {
        self.with_transform(Mat4::from_translation(translation))
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    #[must_use]
    pub fn with_render_priority(mut self, priority: u32) -> Self {
        self.render_priority = priority;
        self
    }

    // === Accessors ===

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    #[inline]
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    #[inline]
    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.visibility.is_visible() && self.attached
    }

    #[inline]
    #[must_use]
    pub fn render_type(&self) -> RenderType {
        self.render_type
    }

    #[must_use]
    pub fn core(&self) -> Option<&dyn RenderCore> {
        self.core.get()
    }

    pub fn core_mut(&mut self) -> Option<&mut Box<dyn RenderCore>> {
        self.core.get_mut()
    }

    #[inline]
    #[must_use]
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    #[inline]
    #[must_use]
    pub fn render_priority(&self) -> u32 {
        self.render_priority
    }

    pub(crate) fn set_render_priority(&mut self, priority: u32) {
        self.render_priority = priority;
    }

    #[inline]
    #[must_use]
    pub fn order_key(&self) -> OrderKey {
        self.order_key
    }

    /// Recomputes the order key from the camera distance to the bounds centre
    /// (or the node origin when it has no bounds).
    pub fn update_order_key(&mut self, eye: Vec3) -> OrderKey {
        let center = self
            .world_sphere
            .map_or_else(|| self.total_transform.transform_point3(Vec3::ZERO), |s| s.center);
        self.order_key = OrderKey::new(self.render_priority, eye.distance(center));
        self.order_key
    }

    #[inline]
    #[must_use]
    pub fn is_in_frustum(&self) -> bool {
        self.is_in_frustum
    }

    #[inline]
    pub fn set_in_frustum(&mut self, in_frustum: bool) {
        self.is_in_frustum = in_frustum;
    }

    #[inline]
    #[must_use]
    pub fn model_matrix(&self) -> &Mat4 {
        &self.model_matrix
    }

    pub(crate) fn set_model_matrix(&mut self, model: Mat4) {
        self.model_matrix = model;
        self.model_changed = true;
    }

    #[inline]
    #[must_use]
    pub fn total_transform(&self) -> &Mat4 {
        &self.total_transform
    }

    #[inline]
    #[must_use]
    pub fn transform_generation(&self) -> u64 {
        self.transform_generation
    }

    /// Records the current renderability and reports whether it differs from
    /// what the previous call saw.
    pub fn observe_renderability(&mut self) -> bool {
        let renderable = self.is_renderable();
        let changed = renderable != self.was_renderable;
        self.was_renderable = renderable;
        changed
    }

    /// World-space box and sphere, if the core reports bounds.
    #[must_use]
    pub fn world_bounds(&self) -> Option<(BoundingBox, BoundingSphere)> {
        self.world_box.zip(self.world_sphere)
    }

    /// Recomputes the total transform if the local matrix or the parent's
    /// total changed. Returns whether it was recomputed.
    pub(crate) fn update_transform(&mut self, parent: Option<(&Mat4, u64)>) -> bool {
        let parent_generation = parent.map_or(0, |(_, generation)| generation);
        if !self.model_changed && parent_generation == self.parent_generation_seen {
            return false;
        }

        self.total_transform = match parent {
            Some((parent_total, _)) => *parent_total * self.model_matrix,
            None => self.model_matrix,
        };
        self.parent_generation_seen = parent_generation;
        self.model_changed = false;
        self.transform_generation += 1;
        true
    }

    pub(crate) fn update_world_bounds(&mut self) {
        let local = self.core.get().and_then(RenderCore::local_bounds);
        self.world_box = local.map(|b| b.transform(&self.total_transform));
        self.world_sphere = local.map(|b| b.to_sphere().transform(&self.total_transform));
    }
}

impl DirtyNode<NodeHandle> for SceneNode {
    fn dirty_mut(&mut self) -> &mut DirtyFlags {
        &mut self.dirty
    }

    fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    fn is_attached(&self) -> bool {
        self.attached
    }
}
