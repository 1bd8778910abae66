//! Pass Submission
//!
//! Issues one frame's draw work for classified renderables in a fixed order:
//!
//! ```text
//! Setup         main target, clear, global constants + lights
//! CoreUpdate    update_gpu for cores that asked for it
//! PreProc       PreProc bucket
//! Opaque        Opaque bucket, frustum-filtered
//! Particle      Particle bucket
//! Transparent   Transparent bucket, frustum-filtered
//! PostProc      resolve to ping-pong, PostProc bucket (only when needed)
//! ScreenSpaced  ScreenSpaced bucket
//! Composite     main target onto the back buffer
//! ```
//!
//! Per-node failures that are not device errors are logged and the node is
//! skipped. Device errors and frame-level failures are returned.

use prism_core::Result;
use prism_resources::{DeviceContext, RenderStage, RenderTarget};
use prism_scene::{NodeHandle, RenderContext, Scene};
use rayon::prelude::*;

use crate::renderables::PerFrameRenderables;
use crate::settings::RendererSettings;
use crate::stats::PassStats;

/// Nodes among `candidates` whose cores requested a post effect, in order.
///
/// Runs on the rayon pool when there are more than `parallel_threshold`
/// candidates; both paths return the same list.
#[must_use]
pub fn collect_post_effect_nodes(scene: &Scene, candidates: &[NodeHandle], parallel_threshold: usize) -> Vec<NodeHandle> {
    let wants_effect =
        |h: &&NodeHandle| scene.get(**h).and_then(|n| n.core()).is_some_and(|c| c.has_post_effect());

    if candidates.len() > parallel_threshold {
        candidates.par_iter().filter(wants_effect).copied().collect()
    } else {
        candidates.iter().filter(wants_effect).copied().collect()
    }
}

#[derive(Debug, Default)]
pub struct Renderer {
    candidates: Vec<NodeHandle>,
}

impl Renderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Submits one frame into `dc`. The caller owns `begin_draw`/`end_draw`.
    pub fn render(
        &mut self,
        scene: &Scene,
        renderables: &PerFrameRenderables,
        ctx: &mut RenderContext,
        dc: &mut dyn DeviceContext,
        settings: &RendererSettings,
    ) -> Result<PassStats> {
        let mut stats = PassStats::default();

        // --- Setup ---
        Self::enter(ctx, dc, RenderStage::Setup);
        dc.set_render_target(RenderTarget::Main)?;
        dc.clear(settings.clear_color);
        dc.upload_globals(&ctx.globals(), ctx.uploaded_lights())?;

        // --- GPU-side core updates ---
        Self::enter(ctx, dc, RenderStage::CoreUpdate);
        for &handle in &renderables.need_update_cores {
            let Some(core) = scene.get(handle).and_then(|n| n.core()) else {
                continue;
            };
            match core.update_gpu(ctx, dc) {
                Ok(()) => stats.gpu_updates += 1,
                Err(err) if err.is_device_error() => return Err(err),
                Err(err) => log::warn!("GPU update failed for {handle:?}: {err}"),
            }
        }

        self.candidates.clear();
        self.candidates.extend_from_slice(&renderables.opaque_in_frustum);
        self.candidates.extend_from_slice(&renderables.transparent_in_frustum);
        ctx.post_effect_nodes = collect_post_effect_nodes(scene, &self.candidates, settings.post_effect_parallel_threshold);
        stats.post_effect_nodes = ctx.post_effect_nodes.len();

        Self::render_pass(RenderStage::PreProc, &renderables.pre_proc, scene, ctx, dc, &mut stats)?;
        Self::render_pass(RenderStage::Opaque, &renderables.opaque_in_frustum, scene, ctx, dc, &mut stats)?;
        Self::render_pass(RenderStage::Particle, &renderables.particle, scene, ctx, dc, &mut stats)?;
        Self::render_pass(
            RenderStage::Transparent,
            &renderables.transparent_in_frustum,
            scene,
            ctx,
            dc,
            &mut stats,
        )?;

        if settings.enable_post_effects || !ctx.post_effect_nodes.is_empty() {
            Self::enter(ctx, dc, RenderStage::PostProc);
            dc.resolve_to_ping_pong()?;
            Self::render_pass(RenderStage::PostProc, &renderables.post_proc, scene, ctx, dc, &mut stats)?;
            stats.post_effects_ran = true;
        }

        Self::render_pass(
            RenderStage::ScreenSpaced,
            &renderables.screen_spaced,
            scene,
            ctx,
            dc,
            &mut stats,
        )?;

        Self::enter(ctx, dc, RenderStage::Composite);
        dc.composite_to_back_buffer()?;
        Ok(stats)
    }

    fn enter(ctx: &mut RenderContext, dc: &mut dyn DeviceContext, stage: RenderStage) {
        if ctx.stage != stage || stage == RenderStage::Setup {
            ctx.stage = stage;
            dc.begin_stage(stage);
        }
    }

    fn render_pass(
        stage: RenderStage,
        nodes: &[NodeHandle],
        scene: &Scene,
        ctx: &mut RenderContext,
        dc: &mut dyn DeviceContext,
        stats: &mut PassStats,
    ) -> Result<()> {
        Self::enter(ctx, dc, stage);
        for &handle in nodes {
            let Some(node) = scene.get(handle) else {
                continue;
            };
            let Some(core) = node.core() else {
                continue;
            };
            match core.render(ctx, dc) {
                Ok(()) => stats.drawn += 1,
                Err(err) if err.is_device_error() => return Err(err),
                Err(err) => {
                    log::warn!("Skipping node '{}' in {stage:?}: {err}", node.name());
                    stats.failed += 1;
                }
            }
        }
        Ok(())
    }
}
