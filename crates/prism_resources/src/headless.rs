//! Headless Device
//!
//! A GPU-free implementation of the device contracts. Every context call is
//! appended to a shared command log, resources are tracked as live ids, and
//! one-shot faults can be injected at chosen points to exercise the host's
//! error policy.
//!
//! The provider is moved into a render host; a [`HeadlessProbe`] obtained from
//! [`HeadlessDeviceProvider::probe`] keeps read access to the log afterwards.
//!
//! ```ignore
//! let provider = HeadlessDeviceProvider::new();
//! let probe = provider.probe();
//! probe.inject_fault(FaultPoint::Present, PrismError::DeviceRemoved("test".into()));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Affine2;
use parking_lot::Mutex;
use prism_core::math::Rect;
use prism_core::{PrismError, Result};
use rustc_hash::FxHashSet;

use crate::constants::{GlobalConstants, LightData};
use crate::device::{
    BitmapId, BufferDesc, BufferId, DeviceContext, DeviceProvider, DrawCall, GraphicsDevice, RenderBuffer,
    RenderBufferDesc, RenderStage, RenderTarget, TextureId,
};
use crate::texture::TextureInfo;

// ============================================================================
// Command Log
// ============================================================================

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    BeginDraw,
    EndDraw,
    Present,
    Resize { width: u32, height: u32 },
    Stage(RenderStage),
    SetRenderTarget(RenderTarget),
    Clear([f32; 4]),
    UploadGlobals { light_count: usize },
    WriteBuffer { buffer: BufferId, len: usize },
    SetTechnique { technique: String, pass: String },
    BindTexture { slot: u32, texture: TextureId },
    BindConstantBuffer { slot: u32, buffer: BufferId },
    Draw(DrawCall),
    ResolveToPingPong,
    Composite,
    Begin2D,
    End2D,
    SetTransform2D(Affine2),
    PushClip(Rect),
    PopClip,
    FillRect(Rect),
    DrawBitmap(BitmapId, Rect),
    BeginBitmap(BitmapId),
    EndBitmap,
}

/// Places where an injected fault can fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    CreateRenderBuffer,
    CreateResource,
    Resize,
    BeginDraw,
    Draw,
    EndDraw,
    Present,
}

#[derive(Default)]
struct SharedState {
    commands: Vec<DeviceCommand>,
    faults: Vec<(FaultPoint, PrismError)>,
    render_buffers_created: u64,
    device_losses: u64,
}

impl SharedState {
    fn record(&mut self, command: DeviceCommand) {
        self.commands.push(command);
    }

    /// Pops the first fault registered for `point`.
    fn take_fault(&mut self, point: FaultPoint) -> Option<PrismError> {
        let index = self.faults.iter().position(|(p, _)| *p == point)?;
        Some(self.faults.remove(index).1)
    }

    fn check(&mut self, point: FaultPoint) -> Result<()> {
        match self.take_fault(point) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

type Shared = Arc<Mutex<SharedState>>;
type DeviceSlot = Arc<Mutex<Option<Arc<HeadlessDevice>>>>;

// ============================================================================
// Device
// ============================================================================

#[derive(Default)]
struct LiveResources {
    buffers: FxHashSet<BufferId>,
    textures: FxHashSet<TextureId>,
    bitmaps: FxHashSet<BitmapId>,
}

pub struct HeadlessDevice {
    name: String,
    generation: u64,
    next_id: AtomicU64,
    live: Mutex<LiveResources>,
    state: Shared,
}

impl HeadlessDevice {
    fn new(generation: u64, state: Shared) -> Self {
        Self {
            name: format!("headless#{generation}"),
            generation,
            next_id: AtomicU64::new(1),
            live: Mutex::new(LiveResources::default()),
            state,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.live.lock().buffers.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.live.lock().textures.len()
    }

    #[must_use]
    pub fn live_bitmaps(&self) -> usize {
        self.live.lock().bitmaps.len()
    }

    fn allocate(&self) -> Result<u64> {
        self.state.lock().check(FaultPoint::CreateResource)?;
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_buffer(&self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferId> {
        if let Some(bytes) = contents
            && bytes.len() as u64 > desc.size
        {
            return Err(PrismError::resource(
                "buffer",
                format!("'{}': contents exceed size {}", desc.label, desc.size),
            ));
        }
        let id = BufferId(self.allocate()?);
        self.live.lock().buffers.insert(id);
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) {
        self.live.lock().buffers.remove(&id);
    }

    fn create_texture(&self, info: &TextureInfo) -> Result<TextureId> {
        let id = TextureId(self.allocate()?);
        log::trace!("Headless texture '{}' -> {id:?}", info.label);
        self.live.lock().textures.insert(id);
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) {
        self.live.lock().textures.remove(&id);
    }

    fn create_bitmap(&self, width: u32, height: u32) -> Result<BitmapId> {
        if width == 0 || height == 0 {
            return Err(PrismError::resource("bitmap", format!("zero extent {width}x{height}")));
        }
        let id = BitmapId(self.allocate()?);
        self.live.lock().bitmaps.insert(id);
        Ok(id)
    }

    fn destroy_bitmap(&self, id: BitmapId) {
        self.live.lock().bitmaps.remove(&id);
    }
}

// ============================================================================
// Context & Render Buffer
// ============================================================================

pub struct HeadlessContext {
    state: Shared,
}

impl HeadlessContext {
    fn record(&self, command: DeviceCommand) {
        self.state.lock().record(command);
    }
}

impl DeviceContext for HeadlessContext {
    fn begin_stage(&mut self, stage: RenderStage) {
        self.record(DeviceCommand::Stage(stage));
    }

    fn set_render_target(&mut self, target: RenderTarget) -> Result<()> {
        self.record(DeviceCommand::SetRenderTarget(target));
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.record(DeviceCommand::Clear(color));
    }

    fn upload_globals(&mut self, _globals: &GlobalConstants, lights: &[LightData]) -> Result<()> {
        self.record(DeviceCommand::UploadGlobals {
            light_count: lights.len(),
        });
        Ok(())
    }

    fn write_buffer(&mut self, buffer: BufferId, _offset: u64, data: &[u8]) -> Result<()> {
        self.record(DeviceCommand::WriteBuffer { buffer, len: data.len() });
        Ok(())
    }

    fn set_technique(&mut self, technique: &str, pass: &str) {
        self.record(DeviceCommand::SetTechnique {
            technique: technique.to_string(),
            pass: pass.to_string(),
        });
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.record(DeviceCommand::BindTexture { slot, texture });
    }

    fn bind_constant_buffer(&mut self, slot: u32, buffer: BufferId) {
        self.record(DeviceCommand::BindConstantBuffer { slot, buffer });
    }

    fn draw(&mut self, call: &DrawCall) -> Result<()> {
        let mut state = self.state.lock();
        state.check(FaultPoint::Draw)?;
        state.record(DeviceCommand::Draw(call.clone()));
        Ok(())
    }

    fn resolve_to_ping_pong(&mut self) -> Result<()> {
        self.record(DeviceCommand::ResolveToPingPong);
        Ok(())
    }

    fn composite_to_back_buffer(&mut self) -> Result<()> {
        self.record(DeviceCommand::Composite);
        Ok(())
    }

    fn begin_2d(&mut self) -> Result<()> {
        self.record(DeviceCommand::Begin2D);
        Ok(())
    }

    fn end_2d(&mut self) -> Result<()> {
        self.record(DeviceCommand::End2D);
        Ok(())
    }

    fn set_transform_2d(&mut self, transform: Affine2) {
        self.record(DeviceCommand::SetTransform2D(transform));
    }

    fn push_clip(&mut self, rect: Rect) {
        self.record(DeviceCommand::PushClip(rect));
    }

    fn pop_clip(&mut self) {
        self.record(DeviceCommand::PopClip);
    }

    fn fill_rect(&mut self, rect: Rect, _color: [f32; 4]) {
        self.record(DeviceCommand::FillRect(rect));
    }

    fn draw_bitmap(&mut self, bitmap: BitmapId, rect: Rect) {
        self.record(DeviceCommand::DrawBitmap(bitmap, rect));
    }

    fn begin_bitmap(&mut self, bitmap: BitmapId) -> Result<()> {
        self.record(DeviceCommand::BeginBitmap(bitmap));
        Ok(())
    }

    fn end_bitmap(&mut self) -> Result<()> {
        self.record(DeviceCommand::EndBitmap);
        Ok(())
    }
}

pub struct HeadlessRenderBuffer {
    id: u64,
    width: u32,
    height: u32,
    context: HeadlessContext,
}

impl RenderBuffer for HeadlessRenderBuffer {
    fn id(&self) -> u64 {
        self.id
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let mut state = self.context.state.lock();
        state.check(FaultPoint::Resize)?;
        state.record(DeviceCommand::Resize { width, height });
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn begin_draw(&mut self) -> Result<()> {
        let mut state = self.context.state.lock();
        state.check(FaultPoint::BeginDraw)?;
        state.record(DeviceCommand::BeginDraw);
        Ok(())
    }

    fn end_draw(&mut self) -> Result<()> {
        let mut state = self.context.state.lock();
        state.check(FaultPoint::EndDraw)?;
        state.record(DeviceCommand::EndDraw);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let mut state = self.context.state.lock();
        state.check(FaultPoint::Present)?;
        state.record(DeviceCommand::Present);
        Ok(())
    }

    fn context(&mut self) -> &mut dyn DeviceContext {
        &mut self.context
    }

    fn dispose(&mut self) {
        log::trace!("Disposing headless render buffer #{}", self.id);
    }
}

// ============================================================================
// Provider & Probe
// ============================================================================

pub struct HeadlessDeviceProvider {
    state: Shared,
    device: DeviceSlot,
    generation: u64,
}

impl Default for HeadlessDeviceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDeviceProvider {
    #[must_use]
    pub fn new() -> Self {
        let state: Shared = Arc::default();
        let device = Arc::new(HeadlessDevice::new(1, Arc::clone(&state)));
        Self {
            state,
            device: Arc::new(Mutex::new(Some(device))),
            generation: 1,
        }
    }

    /// Provider that reports no device until the next `on_device_lost`.
    #[must_use]
    pub fn without_device() -> Self {
        let provider = Self::new();
        provider.device.lock().take();
        provider
    }

    #[must_use]
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: Arc::clone(&self.state),
            device: Arc::clone(&self.device),
        }
    }

    fn install_device(&mut self) {
        self.generation += 1;
        let device = Arc::new(HeadlessDevice::new(self.generation, Arc::clone(&self.state)));
        *self.device.lock() = Some(device);
    }
}

impl DeviceProvider for HeadlessDeviceProvider {
    fn device(&self) -> Option<Arc<dyn GraphicsDevice>> {
        self.device
            .lock()
            .clone()
            .map(|device| device as Arc<dyn GraphicsDevice>)
    }

    fn create_render_buffer(&mut self, desc: &RenderBufferDesc) -> Result<Box<dyn RenderBuffer>> {
        let mut state = self.state.lock();
        state.check(FaultPoint::CreateRenderBuffer)?;
        state.render_buffers_created += 1;
        Ok(Box::new(HeadlessRenderBuffer {
            id: state.render_buffers_created,
            width: desc.width,
            height: desc.height,
            context: HeadlessContext {
                state: Arc::clone(&self.state),
            },
        }))
    }

    fn on_device_lost(&mut self) -> Result<()> {
        self.state.lock().device_losses += 1;
        self.install_device();
        log::debug!("Headless device recreated (generation {})", self.generation);
        Ok(())
    }
}

/// Shared inspection handle over a [`HeadlessDeviceProvider`].
#[derive(Clone)]
pub struct HeadlessProbe {
    state: Shared,
    device: DeviceSlot,
}

impl HeadlessProbe {
    #[must_use]
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.state.lock().commands.clone()
    }

    /// Drains the log.
    pub fn take_commands(&self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.state.lock().commands)
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Arms a one-shot fault. Faults for the same point fire in FIFO order.
    pub fn inject_fault(&self, point: FaultPoint, error: PrismError) {
        self.state.lock().faults.push((point, error));
    }

    #[must_use]
    pub fn pending_faults(&self) -> usize {
        self.state.lock().faults.len()
    }

    #[must_use]
    pub fn render_buffers_created(&self) -> u64 {
        self.state.lock().render_buffers_created
    }

    #[must_use]
    pub fn device_losses(&self) -> u64 {
        self.state.lock().device_losses
    }

    #[must_use]
    pub fn device(&self) -> Option<Arc<HeadlessDevice>> {
        self.device.lock().clone()
    }

    /// Simulates an adapter disappearing: the provider stops reporting a device.
    pub fn remove_device(&self) {
        self.device.lock().take();
    }

    /// Stages recorded so far, in order.
    #[must_use]
    pub fn stages(&self) -> Vec<RenderStage> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::Stage(stage) => Some(*stage),
                _ => None,
            })
            .collect()
    }

    /// Draw calls recorded so far.
    #[must_use]
    pub fn draws(&self) -> Vec<DrawCall> {
        self.state
            .lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                DeviceCommand::Draw(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn count(&self, command: &DeviceCommand) -> usize {
        self.state.lock().commands.iter().filter(|c| *c == command).count()
    }
}
