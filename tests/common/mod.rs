//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Mat4, Vec3, Vec4};
use prism::core::math::BoundingBox;
use prism::core::{PrismError, RenderType, Result};
use prism::resources::headless::HeadlessDeviceProvider;
use prism::resources::{AttachContext, ColorMaterial, DeviceContext, DeviceProvider, DrawCall, EffectsManager};
use prism::scene::cores::{MeshCore, MeshGeometry};
use prism::scene::{CameraCore, RenderContext, RenderCore, SceneNode};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Attach context backed by a fresh headless device.
pub fn attach_context() -> AttachContext {
    let provider = HeadlessDeviceProvider::new();
    let device = provider.device().expect("headless provider starts with a device");
    AttachContext::new(Arc::new(EffectsManager::new(device)))
}

/// Render context looking at the origin from +Z, 100x100.
pub fn view_context() -> RenderContext {
    let mut ctx = RenderContext::default();
    ctx.update_view(CameraCore::default(), Mat4::IDENTITY, 100.0, 100.0, 1.0);
    ctx
}

pub fn unit_bounds() -> BoundingBox {
    BoundingBox::new(Vec3::splat(-0.5), Vec3::splat(0.5))
}

/// Counters shared between a [`ProbeCore`] and the test that owns it.
#[derive(Clone, Default)]
pub struct ProbeCounters {
    /// Number of upcoming `on_update` calls that fail.
    pub failing_updates: Arc<AtomicUsize>,
    pub async_runs: Arc<AtomicUsize>,
    pub post_renders: Arc<AtomicUsize>,
    pub renders: Arc<AtomicUsize>,
}

impl ProbeCounters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Render core that records what the host does with it and draws one
/// tagged call per render.
#[derive(Clone, Default)]
pub struct ProbeCore {
    pub bounds: Option<BoundingBox>,
    pub post_effect: bool,
    pub async_update: bool,
    /// `update_not_render` panics instead of counting.
    pub async_panics: bool,
    pub post_render: bool,
    pub tag: u64,
    pub counters: ProbeCounters,
}

impl ProbeCore {
    pub fn tagged(tag: u64) -> Self {
        Self {
            bounds: Some(unit_bounds()),
            tag,
            ..Self::default()
        }
    }
}

impl RenderCore for ProbeCore {
    fn attach(&mut self, _ctx: &AttachContext) -> Result<()> {
        Ok(())
    }

    fn detach(&mut self) {}

    fn local_bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    fn on_update(&mut self, _ctx: &RenderContext, _world: &Mat4) -> Result<()> {
        let failing = &self.counters.failing_updates;
        if failing.load(Ordering::SeqCst) > 0 {
            failing.fetch_sub(1, Ordering::SeqCst);
            return Err(PrismError::Backend("probe update failure".into()));
        }
        Ok(())
    }

    fn render(&self, ctx: &RenderContext, dc: &mut dyn DeviceContext) -> Result<()> {
        self.counters.renders.fetch_add(1, Ordering::SeqCst);
        dc.draw(&DrawCall {
            stage: ctx.stage,
            vertex_buffer: None,
            index_buffer: None,
            element_count: 3,
            instance_count: 1,
            tag: self.tag,
        })
    }

    fn has_async_update(&self) -> bool {
        self.async_update
    }

    fn update_not_render(&self, _ctx: &RenderContext) -> Result<()> {
        assert!(!self.async_panics, "async update blew up");
        self.counters.async_runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn has_post_effect(&self) -> bool {
        self.post_effect
    }

    fn needs_post_render(&self) -> bool {
        self.post_render
    }

    fn post_render(&self, _ctx: &RenderContext) {
        self.counters.post_renders.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn probe_node(name: &str, render_type: RenderType, core: ProbeCore) -> SceneNode {
    SceneNode::with_core(name, render_type, Box::new(core))
}

pub fn tagged_node(name: &str, render_type: RenderType, tag: u64) -> SceneNode {
    probe_node(name, render_type, ProbeCore::tagged(tag))
}

pub fn cube_node(name: &str) -> SceneNode {
    let core = MeshCore::new(MeshGeometry::cube(1.0), Box::new(ColorMaterial::new(Vec4::ONE)));
    SceneNode::with_core(name, RenderType::Opaque, Box::new(core))
}
