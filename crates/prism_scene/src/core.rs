//! Render cores.
//!
//! A [`RenderCore`] is the drawable part of a scene node. The node carries the
//! hierarchy, visibility and render-type tag; the core owns device resources
//! and knows how to draw itself. The trait doubles as a capability table: the
//! classifier asks a core whether it needs a GPU update, runs async work, has
//! a post effect or contributes a light, and routes it accordingly.
//!
//! # Threading
//!
//! `on_update`, `attach` and `detach` take `&mut self` and run on the render
//! thread while it has exclusive access to the scene. Everything called during
//! submission takes `&self`, because background tasks may read the same core
//! concurrently; mutable GPU-side state therefore lives behind a
//! `parking_lot::Mutex` or an atomic inside the core.

use std::fmt;

use glam::Mat4;
use prism_core::Result;
use prism_core::math::BoundingBox;
use prism_resources::{AttachContext, DeviceContext, LightData};

use crate::context::RenderContext;

pub trait RenderCore: Send + Sync {
    /// Binds device resources.
    fn attach(&mut self, ctx: &AttachContext) -> Result<()>;

    /// Releases device resources. Must tolerate being called when not attached.
    fn detach(&mut self);

    /// Object-space bounds. `None` opts out of frustum culling.
    fn local_bounds(&self) -> Option<BoundingBox> {
        None
    }

    /// Per-frame CPU update with the node's total transform.
    fn on_update(&mut self, _ctx: &RenderContext, _world: &Mat4) -> Result<()> {
        Ok(())
    }

    /// Whether the core has GPU state to upload before drawing.
    fn needs_gpu_update(&self) -> bool {
        false
    }

    /// Uploads pending GPU state. Runs once per frame, before any pass.
    fn update_gpu(&self, _ctx: &RenderContext, _dc: &mut dyn DeviceContext) -> Result<()> {
        Ok(())
    }

    fn render(&self, ctx: &RenderContext, dc: &mut dyn DeviceContext) -> Result<()>;

    /// Whether [`update_not_render`](Self::update_not_render) should run on a
    /// background task this frame.
    fn has_async_update(&self) -> bool {
        false
    }

    /// Work that does not touch the device (simulation, sorting, ...).
    fn update_not_render(&self, _ctx: &RenderContext) -> Result<()> {
        Ok(())
    }

    fn has_post_effect(&self) -> bool {
        false
    }

    fn triangle_count(&self) -> u64 {
        0
    }

    /// Light contributed to the global constants.
    fn light(&self) -> Option<LightData> {
        None
    }

    fn needs_post_render(&self) -> bool {
        false
    }

    /// Runs after present, once background tasks have joined.
    fn post_render(&self, _ctx: &RenderContext) {}
}

pub type CoreFactory = Box<dyn FnOnce() -> Box<dyn RenderCore> + Send + Sync>;

/// Lazily materialised core.
#[derive(Default)]
pub(crate) enum CoreSlot {
    #[default]
    Empty,
    Pending(CoreFactory),
    Ready(Box<dyn RenderCore>),
}

impl CoreSlot {
    /// Builds the core from its factory on first use.
    pub(crate) fn materialize(&mut self) -> Option<&mut Box<dyn RenderCore>> {
        if let CoreSlot::Pending(_) = self
            && let CoreSlot::Pending(factory) = std::mem::take(self)
        {
            *self = CoreSlot::Ready(factory());
        }
        match self {
            CoreSlot::Ready(core) => Some(core),
            _ => None,
        }
    }

    pub(crate) fn get(&self) -> Option<&dyn RenderCore> {
        match self {
            CoreSlot::Ready(core) => Some(core.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self) -> Option<&mut Box<dyn RenderCore>> {
        match self {
            CoreSlot::Ready(core) => Some(core),
            _ => None,
        }
    }
}

impl fmt::Debug for CoreSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoreSlot::Empty => "Empty",
            CoreSlot::Pending(_) => "Pending",
            CoreSlot::Ready(_) => "Ready",
        })
    }
}
