use glam::Vec2;
use prism_core::Visibility;
use prism_core::math::{Rect, Thickness};
use prism_resources::BitmapId;

use crate::invalidation::{DirtyFlags, DirtyNode};
use crate::scene2d::core::RenderCore2D;
use crate::scene2d::layout::{HorizontalAlignment, VerticalAlignment};
use crate::scene2d::Node2DHandle;

/// A 2D overlay node with measure/arrange layout.
///
/// `desired_size` includes the margin; `render_size` and `layout_bound` are
/// the arranged result in overlay coordinates.
pub struct SceneNode2D {
    pub(crate) name: String,
    pub(crate) parent: Option<Node2DHandle>,
    pub(crate) children: Vec<Node2DHandle>,
    pub(crate) visibility: Visibility,
    pub(crate) attached: bool,
    pub(crate) dirty: DirtyFlags,
    pub(crate) core: Option<Box<dyn RenderCore2D>>,

    // === Layout inputs ===
    pub(crate) width: Option<f32>,
    pub(crate) height: Option<f32>,
    pub(crate) min_size: Vec2,
    pub(crate) max_size: Vec2,
    pub(crate) margin: Thickness,
    pub(crate) horizontal_alignment: HorizontalAlignment,
    pub(crate) vertical_alignment: VerticalAlignment,

    // === Layout results ===
    pub(crate) desired_size: Vec2,
    pub(crate) render_size: Vec2,
    pub(crate) layout_bound: Rect,
    pub(crate) clip_enabled: bool,
    pub(crate) previous_measure_size: Option<Vec2>,
    pub(crate) previous_arrange_rect: Option<Rect>,
    pub(crate) measure_count: u32,

    // === Bitmap cache ===
    pub(crate) bitmap_cache: bool,
    pub(crate) bitmap: Option<(BitmapId, u32, u32)>,
    pub(crate) bitmap_valid: bool,
}

impl SceneNode2D {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            visibility: Visibility::Visible,
            attached: false,
            dirty: DirtyFlags::MEASURE | DirtyFlags::ARRANGE | DirtyFlags::VISUAL,
            core: None,
            width: None,
            height: None,
            min_size: Vec2::ZERO,
            max_size: Vec2::INFINITY,
            margin: Thickness::default(),
            horizontal_alignment: HorizontalAlignment::Stretch,
            vertical_alignment: VerticalAlignment::Stretch,
            desired_size: Vec2::ZERO,
            render_size: Vec2::ZERO,
            layout_bound: Rect::default(),
            clip_enabled: false,
            previous_measure_size: None,
            previous_arrange_rect: None,
            measure_count: 0,
            bitmap_cache: false,
            bitmap: None,
            bitmap_valid: false,
        }
    }

    #[must_use]
    pub fn with_core(mut self, core: Box<dyn RenderCore2D>) -> Self {
        self.core = Some(core);
        self
    }

    #[must_use]
    pub fn with_size(mut self, width: Option<f32>, height: Option<f32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_min_max(mut self, min: Vec2, max: Vec2) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    #[must_use]
    pub fn with_margin(mut self, margin: Thickness) -> Self {
        self.margin = margin;
        self
    }

    #[must_use]
    pub fn with_alignment(mut self, horizontal: HorizontalAlignment, vertical: VerticalAlignment) -> Self {
        self.horizontal_alignment = horizontal;
        self.vertical_alignment = vertical;
        self
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    #[must_use]
    pub fn with_bitmap_cache(mut self, enabled: bool) -> Self {
        self.bitmap_cache = enabled;
        self
    }

    // === Accessors ===

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<Node2DHandle> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[Node2DHandle] {
        &self.children
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    #[must_use]
    pub fn is_renderable(&self) -> bool {
        self.visibility.is_visible() && self.attached
    }

    #[must_use]
    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    #[must_use]
    pub fn desired_size(&self) -> Vec2 {
        self.desired_size
    }

    #[must_use]
    pub fn render_size(&self) -> Vec2 {
        self.render_size
    }

    #[must_use]
    pub fn layout_bound(&self) -> Rect {
        self.layout_bound
    }

    #[must_use]
    pub fn clip_enabled(&self) -> bool {
        self.clip_enabled
    }

    #[must_use]
    pub fn previous_measure_size(&self) -> Option<Vec2> {
        self.previous_measure_size
    }

    #[must_use]
    pub fn previous_arrange_rect(&self) -> Option<Rect> {
        self.previous_arrange_rect
    }

    /// How many times this node actually ran a measure pass.
    #[must_use]
    pub fn measure_count(&self) -> u32 {
        self.measure_count
    }

    #[must_use]
    pub fn bitmap(&self) -> Option<BitmapId> {
        self.bitmap.map(|(id, _, _)| id)
    }

    #[must_use]
    pub fn is_bitmap_valid(&self) -> bool {
        self.bitmap_valid
    }

    /// Explicit size and min/max clamp applied to a content size.
    pub(crate) fn constrain(&self, content: Vec2) -> Vec2 {
        let size = Vec2::new(self.width.unwrap_or(content.x), self.height.unwrap_or(content.y));
        size.max(self.min_size).min(self.max_size)
    }
}

impl DirtyNode<Node2DHandle> for SceneNode2D {
    fn dirty_mut(&mut self) -> &mut DirtyFlags {
        &mut self.dirty
    }

    fn parent(&self) -> Option<Node2DHandle> {
        self.parent
    }

    fn is_attached(&self) -> bool {
        self.attached
    }
}
