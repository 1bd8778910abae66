//! Per-Frame Renderables
//!
//! Turns the scene graph into the per-bucket lists the renderer submits.
//!
//! # Flow
//!
//! ```text
//! Scene ──flatten (on SCENE_GRAPH)──▶ flattened pre-order list
//!       ──walk: update + skip hidden subtrees──▶ buckets (on change)
//!       ──order keys + stable sort──▶ sorted buckets
//!       ──frustum filter──▶ opaque_in_frustum / transparent_in_frustum
//! ```
//!
//! The walk runs every frame because transforms, core updates and the
//! per-frame lists (GPU updates, async updates, post-render callbacks) are
//! frame-local. Bucket membership is only rebuilt when the scene graph or
//! the renderable set changed, or when a renderability change or a node
//! fault is seen during the walk. A node queued for a GPU update is still
//! classified into its bucket, so the buckets always partition the
//! renderable set.

use prism_core::RenderType;
use prism_scene::{FlattenedNode, InvalidateTypes, NodeHandle, RenderContext, Scene};
use rustc_hash::FxHashSet;

use crate::frustum::{FrustumStrategy, FrustumTester};
use crate::settings::RendererSettings;

/// Index just past the subtree rooted at `flattened[index]`.
///
/// Relies on the pre-order layout: the subtree is the run of following
/// entries with a greater depth.
#[must_use]
pub fn skip_subtree(flattened: &[FlattenedNode], index: usize) -> usize {
    let Some(root) = flattened.get(index) else {
        return index;
    };
    let mut next = index + 1;
    while next < flattened.len() && flattened[next].depth > root.depth {
        next += 1;
    }
    next
}

/// Counters from the last [`PerFrameRenderables::separate`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeparationStats {
    pub flattened: usize,
    pub renderable: usize,
    /// Entries skipped because they or an ancestor are not renderable.
    pub skipped: usize,
    /// Nodes whose update failed and were left out of this frame.
    pub faulted: usize,
    /// Whether bucket membership was rebuilt this frame.
    pub rebuilt: bool,
    pub strategy: FrustumStrategy,
}

#[derive(Debug)]
pub struct PerFrameRenderables {
    flattened: Vec<FlattenedNode>,

    // === Buckets ===
    pub opaque: Vec<NodeHandle>,
    pub opaque_in_frustum: Vec<NodeHandle>,
    pub transparent: Vec<NodeHandle>,
    pub transparent_in_frustum: Vec<NodeHandle>,
    pub particle: Vec<NodeHandle>,
    pub light: Vec<NodeHandle>,
    pub pre_proc: Vec<NodeHandle>,
    pub post_proc: Vec<NodeHandle>,
    pub screen_spaced: Vec<NodeHandle>,

    // === Frame-local lists ===
    pub need_update_cores: Vec<NodeHandle>,
    pub async_update_nodes: Vec<NodeHandle>,
    pub nodes_for_post_render: Vec<NodeHandle>,

    frustum: FrustumTester,
    faulted: FxHashSet<NodeHandle>,
    force_rebuild: bool,
    stats: SeparationStats,
}

impl Default for PerFrameRenderables {
    fn default() -> Self {
        Self::new(crate::settings::DEFAULT_FRUSTUM_PARALLEL_THRESHOLD)
    }
}

impl PerFrameRenderables {
    #[must_use]
    pub fn new(frustum_parallel_threshold: usize) -> Self {
        Self {
            flattened: Vec::new(),
            opaque: Vec::new(),
            opaque_in_frustum: Vec::new(),
            transparent: Vec::new(),
            transparent_in_frustum: Vec::new(),
            particle: Vec::new(),
            light: Vec::new(),
            pre_proc: Vec::new(),
            post_proc: Vec::new(),
            screen_spaced: Vec::new(),
            need_update_cores: Vec::new(),
            async_update_nodes: Vec::new(),
            nodes_for_post_render: Vec::new(),
            frustum: FrustumTester::new(frustum_parallel_threshold),
            faulted: FxHashSet::default(),
            force_rebuild: true,
            stats: SeparationStats::default(),
        }
    }

    #[must_use]
    pub fn flattened(&self) -> &[FlattenedNode] {
        &self.flattened
    }

    #[must_use]
    pub fn stats(&self) -> SeparationStats {
        self.stats
    }

    #[must_use]
    pub fn frustum_tester(&self) -> &FrustumTester {
        &self.frustum
    }

    /// Every classified node, bucket by bucket.
    pub fn classified(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.pre_proc
            .iter()
            .chain(&self.light)
            .chain(&self.opaque)
            .chain(&self.particle)
            .chain(&self.transparent)
            .chain(&self.post_proc)
            .chain(&self.screen_spaced)
            .copied()
    }

    /// Drops every list; the next `separate` rebuilds from scratch.
    pub fn clear(&mut self) {
        self.flattened.clear();
        self.clear_buckets();
        self.need_update_cores.clear();
        self.async_update_nodes.clear();
        self.nodes_for_post_render.clear();
        self.faulted.clear();
        self.force_rebuild = true;
    }

    fn clear_buckets(&mut self) {
        self.opaque.clear();
        self.opaque_in_frustum.clear();
        self.transparent.clear();
        self.transparent_in_frustum.clear();
        self.particle.clear();
        self.light.clear();
        self.pre_proc.clear();
        self.post_proc.clear();
        self.screen_spaced.clear();
    }

    fn classify(&mut self, handle: NodeHandle, render_type: RenderType) {
        let bucket = match render_type {
            RenderType::Opaque => &mut self.opaque,
            RenderType::Transparent => &mut self.transparent,
            RenderType::Particle => &mut self.particle,
            RenderType::Light => &mut self.light,
            RenderType::PreProc => &mut self.pre_proc,
            RenderType::PostProc => &mut self.post_proc,
            RenderType::ScreenSpaced => &mut self.screen_spaced,
        };
        bucket.push(handle);
    }

    /// Runs the per-frame update and classification.
    ///
    /// `invalidation` is what the scene accumulated since the previous frame.
    /// Node faults are logged and the node is left out for this frame only.
    pub fn separate(
        &mut self,
        scene: &mut Scene,
        ctx: &mut RenderContext,
        settings: &RendererSettings,
        invalidation: InvalidateTypes,
    ) -> SeparationStats {
        let mut rebuild = self.force_rebuild
            || invalidation.intersects(InvalidateTypes::SCENE_GRAPH | InvalidateTypes::PER_FRAME_RENDERABLES);
        if self.force_rebuild || invalidation.contains(InvalidateTypes::SCENE_GRAPH) {
            scene.flatten(&mut self.flattened);
        }
        self.force_rebuild = false;

        if rebuild {
            self.clear_buckets();
        }
        self.need_update_cores.clear();
        self.async_update_nodes.clear();
        self.nodes_for_post_render.clear();
        self.faulted.clear();

        let mut stats = SeparationStats {
            flattened: self.flattened.len(),
            ..SeparationStats::default()
        };
        let mut renderability_changed = false;

        let mut index = 0;
        while index < self.flattened.len() {
            let handle = self.flattened[index].handle;
            let Some(node) = scene.get_mut(handle) else {
                index += 1;
                continue;
            };

            // Updates never change visibility or attachment, so hidden
            // subtrees are skipped before their nodes update.
            renderability_changed |= node.observe_renderability();
            if !node.is_renderable() {
                let next = skip_subtree(&self.flattened, index);
                stats.skipped += next - index;
                index = next;
                continue;
            }

            if let Err(err) = scene.update_node(handle, ctx) {
                log::warn!("Excluding node from this frame: {err}");
                self.faulted.insert(handle);
                stats.faulted += 1;
                index += 1;
                continue;
            }

            stats.renderable += 1;
            if let Some(node) = scene.get(handle) {
                if rebuild {
                    self.classify(handle, node.render_type());
                }
                if let Some(core) = node.core() {
                    if core.needs_gpu_update() {
                        self.need_update_cores.push(handle);
                    }
                    if core.has_async_update() {
                        self.async_update_nodes.push(handle);
                    }
                    if core.needs_post_render() {
                        self.nodes_for_post_render.push(handle);
                    }
                }
            }
            index += 1;
        }

        // Faulted nodes come back once they update cleanly again.
        self.force_rebuild = !self.faulted.is_empty();
        if !rebuild && (renderability_changed || !self.faulted.is_empty()) {
            rebuild = true;
            self.reclassify(scene);
        }
        stats.rebuilt = rebuild;

        self.collect_lights(scene, ctx);
        if settings.enable_render_order {
            self.sort_buckets(scene, ctx);
        }

        let candidates = self.opaque.len() + self.transparent.len();
        self.frustum
            .configure(settings.enable_render_frustum, settings.frustum_parallel_threshold, candidates);
        if rebuild {
            self.frustum.rebuild_partitions(candidates);
        }
        let mut opaque_in_frustum = std::mem::take(&mut self.opaque_in_frustum);
        let mut transparent_in_frustum = std::mem::take(&mut self.transparent_in_frustum);
        self.frustum
            .filter(&ctx.frustum, scene, &self.opaque, &mut opaque_in_frustum);
        self.frustum
            .filter(&ctx.frustum, scene, &self.transparent, &mut transparent_in_frustum);
        self.opaque_in_frustum = opaque_in_frustum;
        self.transparent_in_frustum = transparent_in_frustum;

        stats.strategy = self.frustum.strategy();
        self.stats = stats;
        stats
    }

    /// Rebuilds bucket membership from the flattened list without running
    /// node updates again.
    fn reclassify(&mut self, scene: &Scene) {
        self.clear_buckets();
        let mut index = 0;
        while index < self.flattened.len() {
            let handle = self.flattened[index].handle;
            let Some(node) = scene.get(handle) else {
                index += 1;
                continue;
            };
            if !node.is_renderable() {
                index = skip_subtree(&self.flattened, index);
                continue;
            }
            if !self.faulted.contains(&handle) {
                self.classify(handle, node.render_type());
            }
            index += 1;
        }
    }

    fn collect_lights(&self, scene: &Scene, ctx: &mut RenderContext) {
        ctx.lights.clear();
        ctx.lights.extend(
            self.light
                .iter()
                .filter_map(|&h| scene.get(h).and_then(|n| n.core()).and_then(|c| c.light())),
        );
    }

    /// Recomputes order keys and stable-sorts the ordered buckets. Transparent
    /// keeps scene order.
    fn sort_buckets(&mut self, scene: &mut Scene, ctx: &RenderContext) {
        for bucket in [&mut self.opaque, &mut self.pre_proc, &mut self.post_proc, &mut self.particle] {
            sort_by_order_key(bucket, scene, ctx);
        }
    }
}

fn sort_by_order_key(bucket: &mut [NodeHandle], scene: &mut Scene, ctx: &RenderContext) {
    for &handle in bucket.iter() {
        if let Some(node) = scene.get_mut(handle) {
            node.update_order_key(ctx.eye);
        }
    }
    if bucket.len() > 1 {
        bucket.sort_by_key(|&h| scene.get(h).map(prism_scene::SceneNode::order_key).unwrap_or_default());
    }
}
