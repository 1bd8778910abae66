//! Device Contracts
//!
//! The render host never talks to a graphics API directly. It goes through four
//! small traits, implemented by a backend (the headless recorder in
//! [`crate::headless`], or the wgpu backend of `prism_render`):
//!
//! | Trait              | Role                                                    |
//! |--------------------|---------------------------------------------------------|
//! | [`DeviceProvider`] | Owns the device, builds render buffers, handles loss    |
//! | [`GraphicsDevice`] | Thread-safe resource creation (buffers, textures, ...)  |
//! | [`RenderBuffer`]   | Swap chain + back buffer + ping-pong target             |
//! | [`DeviceContext`]  | Immediate context; render thread only                   |
//!
//! Resources are referred to by opaque ids so that render cores can hold them
//! without borrowing the device.

use std::sync::Arc;

use bitflags::bitflags;
use glam::Affine2;
use prism_core::Result;
use prism_core::math::Rect;

use crate::constants::{GlobalConstants, LightData};
use crate::texture::TextureInfo;

// ============================================================================
// Resource Ids
// ============================================================================

/// Opaque GPU buffer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Opaque GPU texture id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Opaque 2D bitmap id (bitmap caches, 2D brushes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitmapId(pub u64);

bitflags! {
    /// How a buffer is bound.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const VERTEX     = 1 << 0;
        const INDEX      = 1 << 1;
        const CONSTANT   = 1 << 2;
        const STRUCTURED = 1 << 3;
        /// Rewritten frequently from the CPU.
        const DYNAMIC    = 1 << 4;
    }
}

/// Buffer creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub stride: u32,
    pub usage: BufferUsage,
}

// ============================================================================
// Draw Submission
// ============================================================================

/// Pass markers emitted by the renderer, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStage {
    Setup,
    CoreUpdate,
    PreProc,
    Opaque,
    Particle,
    Transparent,
    PostProc,
    ScreenSpaced,
    Composite,
    Overlay2D,
}

/// Where color output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// Main scene target (back buffer or its MSAA companion).
    Main,
    /// Intermediate target used by post effects.
    PingPong,
}

/// One draw call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCall {
    pub stage: RenderStage,
    pub vertex_buffer: Option<BufferId>,
    pub index_buffer: Option<BufferId>,
    pub element_count: u32,
    pub instance_count: u32,
    /// Caller-defined tag, carried through to backends for debugging.
    pub tag: u64,
}

/// Immediate device context. Owned by the render thread.
pub trait DeviceContext: Send {
    /// Marks the start of a pass. Backends may map it to a debug group.
    fn begin_stage(&mut self, stage: RenderStage);

    fn set_render_target(&mut self, target: RenderTarget) -> Result<()>;
    fn clear(&mut self, color: [f32; 4]);
    fn upload_globals(&mut self, globals: &GlobalConstants, lights: &[LightData]) -> Result<()>;
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()>;

    fn set_technique(&mut self, technique: &str, pass: &str);
    fn bind_texture(&mut self, slot: u32, texture: TextureId);
    fn bind_constant_buffer(&mut self, slot: u32, buffer: BufferId);
    fn draw(&mut self, call: &DrawCall) -> Result<()>;

    /// Copies the main target into the ping-pong target and binds it.
    fn resolve_to_ping_pong(&mut self) -> Result<()>;
    /// Copies whatever target is current onto the back buffer.
    fn composite_to_back_buffer(&mut self) -> Result<()>;

    // === 2D ===
    fn begin_2d(&mut self) -> Result<()>;
    fn end_2d(&mut self) -> Result<()>;
    fn set_transform_2d(&mut self, transform: Affine2);
    fn push_clip(&mut self, rect: Rect);
    fn pop_clip(&mut self);
    fn fill_rect(&mut self, rect: Rect, color: [f32; 4]);
    fn draw_bitmap(&mut self, bitmap: BitmapId, rect: Rect);
    /// Redirects 2D drawing into `bitmap` until [`end_bitmap`](Self::end_bitmap).
    fn begin_bitmap(&mut self, bitmap: BitmapId) -> Result<()>;
    fn end_bitmap(&mut self) -> Result<()>;
}

/// Thread-safe resource factory.
pub trait GraphicsDevice: Send + Sync {
    fn name(&self) -> &str;

    fn create_buffer(&self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferId>;
    fn destroy_buffer(&self, id: BufferId);

    fn create_texture(&self, info: &TextureInfo) -> Result<TextureId>;
    fn destroy_texture(&self, id: TextureId);

    fn create_bitmap(&self, width: u32, height: u32) -> Result<BitmapId>;
    fn destroy_bitmap(&self, id: BitmapId);
}

/// Render buffer creation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderBufferDesc {
    pub width: u32,
    pub height: u32,
    pub msaa_samples: u32,
}

/// Swap chain, back buffer and the ping-pong target, plus their context.
pub trait RenderBuffer: Send {
    /// Unique id; a recreated buffer always reports a new id.
    fn id(&self) -> u64;
    fn size(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    fn begin_draw(&mut self) -> Result<()>;
    fn end_draw(&mut self) -> Result<()>;
    fn present(&mut self) -> Result<()>;

    fn context(&mut self) -> &mut dyn DeviceContext;

    /// Releases GPU memory. Called once before the buffer is dropped.
    fn dispose(&mut self);
}

/// Device/surface provider: the boundary collaborator owning the device.
pub trait DeviceProvider: Send {
    /// `None` when the device is missing or has been disposed.
    fn device(&self) -> Option<Arc<dyn GraphicsDevice>>;

    fn create_render_buffer(&mut self, desc: &RenderBufferDesc) -> Result<Box<dyn RenderBuffer>>;

    /// Notification that the host tore down after a device-class error.
    /// The provider recreates its device before the host restarts.
    fn on_device_lost(&mut self) -> Result<()>;
}
