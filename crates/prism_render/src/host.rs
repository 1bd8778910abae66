//! Render Host
//!
//! Owns the device resources of one viewport and drives its frames.
//!
//! # Lifecycle
//!
//! ```text
//!                start_d3d               stop_rendering
//! Uninitialized ──────────▶ Rendering ◀──────────────▶ Paused
//!        │                   │    ▲     start_rendering    │
//!        │          end_d3d  │    │ start_d3d              │ end_d3d
//!        │                   ▼    │                        │
//!        └──── dispose ───▶ Stopped ◀──────────────────────┘
//!                            │
//!                            └─ dispose ─▶ Disposed (terminal)
//! ```
//!
//! # Frame
//!
//! [`RenderHost::update_and_render`] drains invalidations, asks the frame
//! regulator whether a frame is due, then:
//!
//! 1. updates the viewport and the per-frame render context
//! 2. flattens, updates and classifies the scene
//! 3. `begin_draw`, starts background tasks (async core updates, triangle
//!    counting) that read the scene while the renderer submits
//! 4. submits the passes, `end_draw`, draws the 2D overlay, `present`
//! 5. joins the background tasks and runs post-render callbacks
//!
//! A device-class error anywhere in the frame tears the device resources
//! down, asks the provider for a fresh device and restarts. Any other error
//! reaching this level stops the host and raises
//! [`HostEvent::ExceptionOccurred`].
//!
//! # Threading
//!
//! The host is driven from one thread. Other threads talk to it through an
//! [`InvalidationHandle`] and read its [`HostEvent`] stream; both are flume
//! channels.

use std::sync::Arc;
use std::time::Instant;

use flume::{Receiver, Sender};
use glam::Vec2;
use prism_core::{PrismError, Result};
use prism_resources::{
    AttachContext, DeviceProvider, EffectsManager, GraphicsDevice, RenderBuffer, RenderBufferDesc, RenderStage,
};
use prism_scene::{InvalidateTypes, NodeHandle, RenderContext, Scene, Scene2D};

use crate::clock::{FrameClock, FrameTime};
use crate::regulator::FrameRegulator;
use crate::renderables::PerFrameRenderables;
use crate::renderer::Renderer;
use crate::settings::RendererSettings;
use crate::stats::{PassStats, RenderStatistics};
use crate::viewport::{Viewport, ViewportProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostState {
    #[default]
    Uninitialized,
    Rendering,
    /// Device resources live, frames suspended.
    Paused,
    /// Device resources released; `start_d3d` brings the host back.
    Stopped,
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A new main render target exists; consumers must rebind to it.
    NewRenderTargetTexture { id: u64, width: u32, height: u32 },
    StartRendering,
    StopRendering,
    /// The device was lost and the host recovered onto a new one.
    DeviceLost,
    /// An unrecoverable error stopped the host.
    ExceptionOccurred(String),
}

/// Cloneable, thread-safe way to request frames from outside the host
/// thread.
#[derive(Debug, Clone)]
pub struct InvalidationHandle {
    tx: Sender<InvalidateTypes>,
}

impl InvalidationHandle {
    pub fn invalidate(&self, types: InvalidateTypes) {
        // The host is gone when the receiver is dropped; nothing left to do.
        let _ = self.tx.send(types);
    }

    pub fn request_render(&self) {
        self.invalidate(InvalidateTypes::RENDER);
    }

    pub fn invalidate_scene_graph(&self) {
        self.invalidate(InvalidateTypes::SCENE_GRAPH | InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER);
    }

    pub fn invalidate_per_frame_renderables(&self) {
        self.invalidate(InvalidateTypes::PER_FRAME_RENDERABLES | InvalidateTypes::RENDER);
    }
}

pub struct RenderHost<V: ViewportProvider = Viewport> {
    provider: Box<dyn DeviceProvider>,
    viewport: V,
    settings: RendererSettings,
    state: HostState,
    size: (u32, u32),

    // === Device resources ===
    device: Option<Arc<dyn GraphicsDevice>>,
    effects: Option<Arc<EffectsManager>>,
    buffer: Option<Box<dyn RenderBuffer>>,

    // === Per-frame ===
    renderer: Renderer,
    renderables: PerFrameRenderables,
    render_context: RenderContext,
    regulator: FrameRegulator,
    clock: FrameClock,
    pending_invalidation: InvalidateTypes,
    stats: RenderStatistics,

    // === Channels ===
    events_tx: Sender<HostEvent>,
    events_rx: Receiver<HostEvent>,
    invalidation_tx: Sender<InvalidateTypes>,
    invalidation_rx: Receiver<InvalidateTypes>,
}

impl<V: ViewportProvider> RenderHost<V> {
    pub fn new(provider: impl DeviceProvider + 'static, viewport: V, settings: RendererSettings) -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        let (invalidation_tx, invalidation_rx) = flume::unbounded();
        Self {
            provider: Box::new(provider),
            viewport,
            regulator: FrameRegulator::new(settings.min_update_count, settings.max_fps),
            renderables: PerFrameRenderables::new(settings.frustum_parallel_threshold),
            settings,
            state: HostState::Uninitialized,
            size: (0, 0),
            device: None,
            effects: None,
            buffer: None,
            renderer: Renderer::new(),
            render_context: RenderContext::default(),
            clock: FrameClock::new(),
            pending_invalidation: InvalidateTypes::empty(),
            stats: RenderStatistics::default(),
            events_tx,
            events_rx,
            invalidation_tx,
            invalidation_rx,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn state(&self) -> HostState {
        self.state
    }

    /// Device resources (effects and the main render buffer) are live.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.buffer.is_some() && self.effects.is_some()
    }

    #[must_use]
    pub fn is_rendering(&self) -> bool {
        self.state == HostState::Rendering
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Id of the current main render buffer.
    #[must_use]
    pub fn render_target_id(&self) -> Option<u64> {
        self.buffer.as_ref().map(|b| b.id())
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[must_use]
    pub fn viewport(&self) -> &V {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut V {
        &mut self.viewport
    }

    #[must_use]
    pub fn scene(&self) -> &Scene {
        self.viewport.scene()
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        self.viewport.scene_mut()
    }

    #[must_use]
    pub fn device(&self) -> Option<&Arc<dyn GraphicsDevice>> {
        self.device.as_ref()
    }

    #[must_use]
    pub fn effects(&self) -> Option<&Arc<EffectsManager>> {
        self.effects.as_ref()
    }

    #[must_use]
    pub fn renderables(&self) -> &PerFrameRenderables {
        &self.renderables
    }

    #[must_use]
    pub fn render_context(&self) -> &RenderContext {
        &self.render_context
    }

    #[must_use]
    pub fn statistics(&self) -> &RenderStatistics {
        &self.stats
    }

    #[must_use]
    pub fn regulator(&self) -> &FrameRegulator {
        &self.regulator
    }

    #[must_use]
    pub fn invalidation_handle(&self) -> InvalidationHandle {
        InvalidationHandle {
            tx: self.invalidation_tx.clone(),
        }
    }

    /// Receiver for host events. Every clone competes for the same events.
    #[must_use]
    pub fn events(&self) -> Receiver<HostEvent> {
        self.events_rx.clone()
    }

    /// Takes every event raised so far.
    pub fn drain_events(&self) -> Vec<HostEvent> {
        self.events_rx.try_iter().collect()
    }

    fn emit(&self, event: HostEvent) {
        log::debug!("Host event: {event:?}");
        let _ = self.events_tx.send(event);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Creates device resources and starts rendering at `width` x `height`.
    ///
    /// No-op once disposed, when already initialized, or when the provider
    /// has no device yet.
    pub fn start_d3d(&mut self, width: u32, height: u32) -> Result<()> {
        if self.state == HostState::Disposed || self.is_initialized() {
            return Ok(());
        }
        let Some(device) = self.provider.device() else {
            log::info!("No graphics device available yet, deferring start");
            return Ok(());
        };

        let effects = Arc::new(EffectsManager::new(Arc::clone(&device)));
        let desc = RenderBufferDesc {
            width,
            height,
            msaa_samples: self.settings.msaa_samples,
        };
        let buffer = self.provider.create_render_buffer(&desc)?;
        let target_id = buffer.id();

        log::info!("Render host started on '{}' at {width}x{height}", device.name());
        self.device = Some(device);
        self.effects = Some(Arc::clone(&effects));
        self.buffer = Some(buffer);
        self.size = (width, height);

        let attach = AttachContext::new(effects);
        let (scene, overlay) = self.viewport.scenes_mut();
        scene.set_attach_context(Some(attach.clone()));
        let attached = scene.attach_all();
        scene.invalidate_scene_graph();
        let attached = attached.and_then(|()| match overlay {
            Some(overlay) => {
                overlay.set_attach_context(Some(attach));
                overlay.attach_all()
            }
            None => Ok(()),
        });
        if let Err(err) = attached {
            self.release_device_resources();
            return Err(err);
        }

        self.sync_viewport_size();
        self.renderables.clear();
        self.pending_invalidation |= InvalidateTypes::SCENE_GRAPH | InvalidateTypes::PER_FRAME_RENDERABLES;
        self.clock.reset();
        self.state = HostState::Rendering;
        self.regulator.request_update();

        self.emit(HostEvent::NewRenderTargetTexture {
            id: target_id,
            width,
            height,
        });
        self.emit(HostEvent::StartRendering);
        Ok(())
    }

    /// Tells the viewport the logical size of the current target.
    #[allow(clippy::cast_precision_loss)]
    fn sync_viewport_size(&mut self) {
        let dpi = self.viewport.dpi_scale().max(f32::EPSILON);
        let (width, height) = self.size;
        self.viewport.resize(width as f32 / dpi, height as f32 / dpi);
    }

    /// Suspends frames, keeping device resources.
    pub fn stop_rendering(&mut self) {
        if self.state == HostState::Rendering {
            self.state = HostState::Paused;
            self.emit(HostEvent::StopRendering);
        }
    }

    pub fn start_rendering(&mut self) {
        if self.state == HostState::Paused && self.is_initialized() {
            self.state = HostState::Rendering;
            self.clock.reset();
            self.regulator.request_update();
            self.emit(HostEvent::StartRendering);
        }
    }

    /// Resizes the main target. A same-size call does nothing.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if (width, height) == self.size {
            return Ok(());
        }
        if self.buffer.is_none() {
            self.size = (width, height);
            return Ok(());
        }

        let was_rendering = self.state == HostState::Rendering;
        self.stop_rendering();
        self.size = (width, height);

        let resized = match self.buffer.as_mut() {
            Some(buffer) => buffer.resize(width, height).map(|()| buffer.id()),
            None => return Ok(()),
        };
        let id = match resized {
            Ok(id) => id,
            Err(err) if err.is_device_error() => return self.recover_device_lost(),
            Err(err) => return Err(err),
        };

        self.sync_viewport_size();
        self.emit(HostEvent::NewRenderTargetTexture { id, width, height });

        if was_rendering {
            self.start_rendering();
        }
        self.regulator.request_update();
        Ok(())
    }

    /// Rebuilds the render target.
    ///
    /// `hot` keeps the device, effects and attached scene and only recreates
    /// the render buffer. A cold restart goes through `end_d3d`/`start_d3d`.
    pub fn restart(&mut self, hot: bool) -> Result<()> {
        if self.state == HostState::Disposed {
            return Ok(());
        }
        let (width, height) = self.size;
        if !hot || !self.is_initialized() {
            self.end_d3d();
            return self.start_d3d(width, height);
        }

        let was_rendering = self.state == HostState::Rendering;
        self.stop_rendering();
        if let Some(mut old) = self.buffer.take() {
            old.dispose();
        }
        let desc = RenderBufferDesc {
            width,
            height,
            msaa_samples: self.settings.msaa_samples,
        };
        let buffer = match self.provider.create_render_buffer(&desc) {
            Ok(buffer) => buffer,
            Err(err) => {
                self.end_d3d();
                return Err(err);
            }
        };
        let id = buffer.id();
        self.buffer = Some(buffer);
        self.emit(HostEvent::NewRenderTargetTexture { id, width, height });

        if was_rendering {
            self.start_rendering();
        }
        self.regulator.request_update();
        Ok(())
    }

    /// Releases device resources and detaches the scenes. Idempotent.
    pub fn end_d3d(&mut self) {
        if self.state == HostState::Rendering {
            self.emit(HostEvent::StopRendering);
        }
        self.release_device_resources();
        if self.state != HostState::Disposed {
            self.state = HostState::Stopped;
        }
    }

    fn release_device_resources(&mut self) {
        let (scene, overlay) = self.viewport.scenes_mut();
        scene.detach_all();
        scene.set_attach_context(None);
        if let Some(overlay) = overlay {
            overlay.detach_all();
            overlay.set_attach_context(None);
        }

        self.renderables.clear();
        self.render_context.post_effect_nodes.clear();
        self.regulator.reset();

        if let Some(mut buffer) = self.buffer.take() {
            buffer.dispose();
        }
        if let Some(effects) = self.effects.take() {
            effects.release();
        }
        self.device = None;
    }

    /// Stops the host for good.
    pub fn dispose(&mut self) {
        if self.state == HostState::Disposed {
            return;
        }
        self.end_d3d();
        self.state = HostState::Disposed;
        log::debug!("Render host disposed");
    }

    /// Applies new settings. An MSAA change on a live host triggers a hot
    /// restart.
    pub fn set_settings(&mut self, settings: RendererSettings) -> Result<()> {
        settings.validate()?;
        let msaa_changed = settings.msaa_samples != self.settings.msaa_samples;
        self.regulator.set_min_update_count(settings.min_update_count);
        self.regulator.set_max_fps(settings.max_fps);
        self.settings = settings;

        self.pending_invalidation |= InvalidateTypes::PER_FRAME_RENDERABLES;
        self.regulator.request_update();
        if msaa_changed && self.is_initialized() {
            self.restart(true)?;
        }
        Ok(())
    }

    // ========================================================================
    // Frame
    // ========================================================================

    fn poll_invalidation(&mut self) {
        let mut requested: InvalidateTypes = self.invalidation_rx.try_iter().fold(InvalidateTypes::empty(), |a, b| a | b);
        let (scene, overlay) = self.viewport.scenes_mut();
        requested |= scene.take_invalidation();
        if let Some(overlay) = overlay {
            requested |= overlay.take_invalidation();
        }
        if !requested.is_empty() {
            self.pending_invalidation |= requested;
            self.regulator.request_update();
        }
    }

    /// Whether a frame would be rendered at `now`.
    #[must_use]
    pub fn can_render(&self, now: Instant) -> bool {
        self.state == HostState::Rendering && self.is_initialized() && self.regulator.should_render(now)
    }

    /// Renders one frame if one is due. Returns whether a frame was
    /// presented.
    ///
    /// Device loss is recovered in place and reported through
    /// [`HostEvent::DeviceLost`]. Any other frame error stops the host and is
    /// returned.
    pub fn update_and_render(&mut self) -> Result<bool> {
        if self.state == HostState::Disposed {
            return Ok(false);
        }
        self.poll_invalidation();

        let now = Instant::now();
        if !self.can_render(now) {
            return Ok(false);
        }

        let time = self.clock.tick_at(now);
        match self.render_frame(time) {
            Ok(()) => {
                self.regulator.frame_rendered(now);
                self.stats.frames_rendered += 1;
                self.stats.last_frame_time = now.elapsed();
                Ok(true)
            }
            Err(err) if err.is_device_error() => {
                log::warn!("Device lost during frame: {err}");
                self.recover_device_lost().map(|()| false)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn fail(&mut self, err: PrismError) -> PrismError {
        log::error!("Render host stopped: {err}");
        self.end_d3d();
        self.emit(HostEvent::ExceptionOccurred(err.to_string()));
        err
    }

    fn recover_device_lost(&mut self) -> Result<()> {
        self.stats.device_losses += 1;
        let (width, height) = self.size;
        self.end_d3d();

        let recovered = self
            .provider
            .on_device_lost()
            .and_then(|()| self.start_d3d(width, height));
        match recovered {
            Ok(()) => {
                log::info!("Recovered from device loss");
                self.emit(HostEvent::DeviceLost);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn render_frame(&mut self, time: FrameTime) -> Result<()> {
        let Self {
            viewport,
            settings,
            buffer,
            renderer,
            renderables,
            render_context: ctx,
            pending_invalidation,
            stats,
            ..
        } = self;
        let buffer = buffer
            .as_mut()
            .ok_or_else(|| PrismError::Backend("render buffer missing".into()))?;

        viewport.update(&time);
        let (width, height) = viewport.actual_size();
        ctx.update_view(viewport.camera(), viewport.world_matrix(), width, height, viewport.dpi_scale());
        ctx.update_time(time.total, time.dt, time.frame_index);

        let invalidation = std::mem::take(pending_invalidation);
        let separation = renderables.separate(viewport.scene_mut(), ctx, settings, invalidation);
        stats.record_separation(&separation);
        stats.opaque = renderables.opaque.len();
        stats.opaque_in_frustum = renderables.opaque_in_frustum.len();
        stats.transparent = renderables.transparent.len();
        stats.transparent_in_frustum = renderables.transparent_in_frustum.len();

        let run_async_inline = !settings.enable_async_scene_update;
        if run_async_inline {
            stats.async_updates = run_async_updates(viewport.scene(), &renderables.async_update_nodes, ctx);
        }

        buffer.begin_draw()?;

        let (scene, overlay) = viewport.scenes_mut();
        let scene: &Scene = scene;
        let renderables: &PerFrameRenderables = renderables;
        let settings: &RendererSettings = settings;
        let snapshot = ctx.clone();

        std::thread::scope(|scope| -> Result<()> {
            let async_task = (!run_async_inline && !renderables.async_update_nodes.is_empty()).then(|| {
                let snapshot = &snapshot;
                scope.spawn(move || run_async_updates(scene, &renderables.async_update_nodes, snapshot))
            });
            let triangle_task = settings
                .show_triangle_count
                .then(|| scope.spawn(move || count_triangles(scene, renderables)));

            let submitted = submit_frame(
                renderer,
                scene,
                renderables,
                ctx,
                &mut **buffer,
                overlay,
                settings,
                Vec2::new(width, height),
            );

            // Join before propagating, so a panicked task never masks the
            // frame error.
            if let Some(task) = async_task {
                match task.join() {
                    Ok(count) => stats.async_updates = count,
                    Err(_) => log::error!("Async scene update task panicked"),
                }
            }
            stats.triangle_count = triangle_task.and_then(|task| match task.join() {
                Ok(count) => Some(count),
                Err(_) => {
                    log::error!("Triangle count task panicked");
                    None
                }
            });
            let passes = submitted?;

            // --- Post-render ---
            for &handle in &renderables.nodes_for_post_render {
                if let Some(core) = scene.get(handle).and_then(|n| n.core()) {
                    core.post_render(ctx);
                }
            }
            stats.passes = passes;
            Ok(())
        })
    }
}

impl<V: ViewportProvider> Drop for RenderHost<V> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// 3D passes, then the overlay, then present.
fn submit_frame(
    renderer: &mut Renderer,
    scene: &Scene,
    renderables: &PerFrameRenderables,
    ctx: &mut RenderContext,
    buffer: &mut dyn RenderBuffer,
    overlay: Option<&mut Scene2D>,
    settings: &RendererSettings,
    size: Vec2,
) -> Result<PassStats> {
    let passes = renderer.render(scene, renderables, ctx, buffer.context(), settings)?;
    buffer.end_draw()?;

    if let Some(overlay) = overlay
        && overlay.has_content()
    {
        let dc = buffer.context();
        dc.begin_stage(RenderStage::Overlay2D);
        overlay.update_layout(size);
        match overlay.render(dc) {
            Err(err) if err.is_device_error() => return Err(err),
            Err(err) => log::warn!("2D overlay failed: {err}"),
            Ok(()) => {}
        }
    }

    buffer.present()?;
    Ok(passes)
}

/// Runs `update_not_render` for every node in `nodes`, returning how many
/// succeeded.
fn run_async_updates(scene: &Scene, nodes: &[NodeHandle], ctx: &RenderContext) -> usize {
    let mut updated = 0;
    for &handle in nodes {
        let Some(core) = scene.get(handle).and_then(|n| n.core()) else {
            continue;
        };
        match core.update_not_render(ctx) {
            Ok(()) => updated += 1,
            Err(err) => log::warn!("Async update failed for {handle:?}: {err}"),
        }
    }
    updated
}

/// Triangles in the nodes the renderer draws this frame.
fn count_triangles(scene: &Scene, renderables: &PerFrameRenderables) -> u64 {
    renderables
        .pre_proc
        .iter()
        .chain(&renderables.opaque_in_frustum)
        .chain(&renderables.particle)
        .chain(&renderables.transparent_in_frustum)
        .chain(&renderables.screen_spaced)
        .filter_map(|&h| scene.get(h).and_then(|n| n.core()))
        .map(|core| core.triangle_count())
        .sum()
}
