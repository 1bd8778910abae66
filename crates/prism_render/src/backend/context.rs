use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Affine2, Vec2};
use prism_core::math::Rect;
use prism_core::{PrismError, Result};
use prism_resources::effects::techniques;
use prism_resources::{
    BitmapId, BufferId, DeviceContext, DrawCall, GlobalConstants, LightData, MAX_LIGHTS, ModelConstants,
    RenderBuffer, RenderStage, RenderTarget, TextureId,
};

use super::device::{FILL_STRIDE, WgpuDevice, align_to_copy};

/// Size of the material block the flat-color material uploads.
const MATERIAL_BLOCK_SIZE: u64 = 48;
const CONSTANT_SLOTS: usize = 4;

/// Writes `data` at `offset`, padding the tail to the copy alignment.
pub(crate) fn write_padded(queue: &wgpu::Queue, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) -> Result<()> {
    if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(PrismError::resource("buffer", format!("unaligned write offset {offset}")));
    }
    let padded_len = align_to_copy(data.len() as u64);
    if offset + padded_len > buffer.size() {
        return Err(PrismError::resource(
            "buffer",
            format!("write of {} bytes at {offset} overflows {} byte buffer", data.len(), buffer.size()),
        ));
    }
    if padded_len == data.len() as u64 {
        queue.write_buffer(buffer, offset, data);
    } else {
        let mut padded = data.to_vec();
        padded.resize(usize::try_from(padded_len).unwrap_or(data.len()), 0);
        queue.write_buffer(buffer, offset, &padded);
    }
    Ok(())
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FillVertex {
    position: [f32; 2],
    color: [f32; 4],
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Surface {
    Main,
    PingPong,
    BackBuffer,
    Bitmap(BitmapId),
}

enum Op {
    Target(Surface),
    Clear([f32; 4]),
    Mesh {
        blended: bool,
        vertex: wgpu::Buffer,
        index: Option<wgpu::Buffer>,
        bind_group: wgpu::BindGroup,
        count: u32,
        instances: u32,
    },
    Fill {
        vertices: [FillVertex; 6],
        scissor: Option<[u32; 4]>,
    },
    Copy {
        from: Surface,
        to: Surface,
        origin: [u32; 2],
    },
}

/// Pass-local draw item, in submission order.
enum Item {
    Mesh {
        blended: bool,
        vertex: wgpu::Buffer,
        index: Option<wgpu::Buffer>,
        bind_group: wgpu::BindGroup,
        count: u32,
        instances: u32,
    },
    Fill {
        first: u32,
        scissor: Option<[u32; 4]>,
    },
}

/// Immediate context recording into per-frame ops that are encoded at
/// `end_draw` and `present`.
pub struct WgpuContext {
    gpu: Arc<WgpuDevice>,
    width: u32,
    height: u32,

    main: wgpu::Texture,
    ping_pong: wgpu::Texture,
    back_buffer: wgpu::Texture,

    globals: wgpu::Buffer,
    lights: wgpu::Buffer,
    fallback_model: wgpu::Buffer,
    fallback_material: wgpu::Buffer,

    ops: Vec<Op>,
    pending: Vec<wgpu::CommandBuffer>,
    technique: String,
    constant_slots: [Option<BufferId>; CONSTANT_SLOTS],
    surface: Surface,
    surface_stack: Vec<Surface>,
    transform_2d: Affine2,
    clip_stack: Vec<Rect>,
    skipped_draws: u64,
}

impl WgpuContext {
    fn new(gpu: Arc<WgpuDevice>, width: u32, height: u32) -> Self {
        let globals = gpu.create_uniform("Prism Globals", size_of::<GlobalConstants>() as u64);
        let lights = gpu.create_uniform("Prism Lights", (size_of::<LightData>() * MAX_LIGHTS) as u64);
        let fallback_model = gpu.create_uniform("Prism Identity Model", size_of::<ModelConstants>() as u64);
        let fallback_material = gpu.create_uniform("Prism Default Material", MATERIAL_BLOCK_SIZE);
        gpu.queue
            .write_buffer(&fallback_model, 0, bytemuck::bytes_of(&ModelConstants::from_world(glam::Mat4::IDENTITY)));
        let white: [f32; 12] = [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        gpu.queue.write_buffer(&fallback_material, 0, bytemuck::cast_slice(&white));

        Self {
            main: gpu.create_target("Prism Main Target", width, height),
            ping_pong: gpu.create_target("Prism Ping-Pong Target", width, height),
            back_buffer: gpu.create_target("Prism Back Buffer", width, height),
            gpu,
            width: width.max(1),
            height: height.max(1),
            globals,
            lights,
            fallback_model,
            fallback_material,
            ops: Vec::new(),
            pending: Vec::new(),
            technique: String::new(),
            constant_slots: [None; CONSTANT_SLOTS],
            surface: Surface::Main,
            surface_stack: Vec::new(),
            transform_2d: Affine2::IDENTITY,
            clip_stack: Vec::new(),
            skipped_draws: 0,
        }
    }

    /// Draws recorded with a technique this backend has no pipeline for.
    #[must_use]
    pub fn skipped_draws(&self) -> u64 {
        self.skipped_draws
    }

    fn resize_targets(&mut self, width: u32, height: u32) {
        self.destroy_targets();
        self.width = width.max(1);
        self.height = height.max(1);
        self.main = self.gpu.create_target("Prism Main Target", width, height);
        self.ping_pong = self.gpu.create_target("Prism Ping-Pong Target", width, height);
        self.back_buffer = self.gpu.create_target("Prism Back Buffer", width, height);
    }

    fn destroy_targets(&self) {
        self.main.destroy();
        self.ping_pong.destroy();
        self.back_buffer.destroy();
    }

    fn surface_texture(&self, surface: Surface) -> Option<wgpu::Texture> {
        match surface {
            Surface::Main => Some(self.main.clone()),
            Surface::PingPong => Some(self.ping_pong.clone()),
            Surface::BackBuffer => Some(self.back_buffer.clone()),
            Surface::Bitmap(id) => self.gpu.resources.lock().bitmaps.get(&id.0).cloned(),
        }
    }

    fn surface_size(&self, surface: Surface) -> (u32, u32) {
        self.surface_texture(surface)
            .map_or((self.width, self.height), |t| (t.width(), t.height()))
    }

    fn constant_buffer(&self, slot: usize, fallback: &wgpu::Buffer) -> wgpu::Buffer {
        self.constant_slots[slot]
            .and_then(|id| self.gpu.resources.lock().buffers.get(&id.0).cloned())
            .unwrap_or_else(|| fallback.clone())
    }

    /// Axis-aligned bounds of `rect` under the current 2D transform.
    fn transformed(&self, rect: Rect) -> Rect {
        let a = self.transform_2d.transform_point2(Vec2::new(rect.x, rect.y));
        let b = self.transform_2d.transform_point2(Vec2::new(rect.right(), rect.bottom()));
        let min = a.min(b);
        let max = a.max(b);
        Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn scissor(&self) -> Option<[u32; 4]> {
        let clip = self.clip_stack.last()?;
        let (w, h) = self.surface_size(self.surface);
        let x0 = clip.x.clamp(0.0, w as f32) as u32;
        let y0 = clip.y.clamp(0.0, h as f32) as u32;
        let x1 = clip.right().clamp(0.0, w as f32) as u32;
        let y1 = clip.bottom().clamp(0.0, h as f32) as u32;
        Some([x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0)])
    }

    /// Encodes every recorded op into one command buffer.
    fn flush(&mut self) {
        if self.ops.is_empty() {
            return;
        }
        let ops = std::mem::take(&mut self.ops);
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Prism Frame Encoder"),
            });

        let mut surface = Surface::Main;
        let mut load: Option<[f32; 4]> = None;
        let mut items: Vec<Item> = Vec::new();
        let mut fills: Vec<FillVertex> = Vec::new();

        for op in ops {
            match op {
                Op::Target(next) => {
                    self.encode_pass(&mut encoder, surface, load.take(), &items, &fills);
                    items.clear();
                    fills.clear();
                    surface = next;
                }
                Op::Clear(color) => {
                    if !items.is_empty() {
                        self.encode_pass(&mut encoder, surface, load.take(), &items, &fills);
                        items.clear();
                        fills.clear();
                    }
                    load = Some(color);
                }
                Op::Mesh {
                    blended,
                    vertex,
                    index,
                    bind_group,
                    count,
                    instances,
                } => items.push(Item::Mesh {
                    blended,
                    vertex,
                    index,
                    bind_group,
                    count,
                    instances,
                }),
                Op::Fill { vertices, scissor } => {
                    #[allow(clippy::cast_possible_truncation)]
                    let first = fills.len() as u32;
                    fills.extend_from_slice(&vertices);
                    items.push(Item::Fill { first, scissor });
                }
                Op::Copy { from, to, origin } => {
                    self.encode_pass(&mut encoder, surface, load.take(), &items, &fills);
                    items.clear();
                    fills.clear();
                    self.encode_copy(&mut encoder, from, to, origin);
                }
            }
        }
        self.encode_pass(&mut encoder, surface, load.take(), &items, &fills);
        self.pending.push(encoder.finish());
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        surface: Surface,
        clear: Option<[f32; 4]>,
        items: &[Item],
        fills: &[FillVertex],
    ) {
        if items.is_empty() && clear.is_none() {
            return;
        }
        let Some(texture) = self.surface_texture(surface) else {
            log::warn!("Dropping pass for released surface {surface:?}");
            return;
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let fill_buffer = (!fills.is_empty()).then(|| {
            let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Prism Fill Vertices"),
                size: fills.len() as u64 * FILL_STRIDE,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.gpu.queue.write_buffer(&buffer, 0, bytemuck::cast_slice(fills));
            buffer
        });

        let load = clear.map_or(wgpu::LoadOp::Load, |[r, g, b, a]| {
            wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            })
        });
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Prism Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });

        let (width, height) = (texture.width(), texture.height());
        let pipelines = &self.gpu.pipelines;
        for item in items {
            match item {
                Item::Mesh {
                    blended,
                    vertex,
                    index,
                    bind_group,
                    count,
                    instances,
                } => {
                    pass.set_pipeline(if *blended {
                        &pipelines.mesh_blended
                    } else {
                        &pipelines.mesh_opaque
                    });
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.set_vertex_buffer(0, vertex.slice(..));
                    match index {
                        Some(index) => {
                            pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
                            pass.draw_indexed(0..*count, 0, 0..*instances);
                        }
                        None => pass.draw(0..*count, 0..*instances),
                    }
                }
                Item::Fill { first, scissor } => {
                    let Some(buffer) = fill_buffer.as_ref() else {
                        continue;
                    };
                    let [x, y, w, h] = scissor.unwrap_or([0, 0, width, height]);
                    if w == 0 || h == 0 {
                        continue;
                    }
                    pass.set_scissor_rect(x, y, w, h);
                    pass.set_pipeline(&pipelines.fill);
                    pass.set_vertex_buffer(0, buffer.slice(..));
                    pass.draw(*first..*first + 6, 0..1);
                    pass.set_scissor_rect(0, 0, width, height);
                }
            }
        }
    }

    fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder, from: Surface, to: Surface, origin: [u32; 2]) {
        let (Some(src), Some(dst)) = (self.surface_texture(from), self.surface_texture(to)) else {
            log::warn!("Dropping copy {from:?} -> {to:?}: surface released");
            return;
        };
        let width = src.width().min(dst.width().saturating_sub(origin[0]));
        let height = src.height().min(dst.height().saturating_sub(origin[1]));
        if width == 0 || height == 0 {
            return;
        }
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: origin[0],
                    y: origin[1],
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl DeviceContext for WgpuContext {
    fn begin_stage(&mut self, stage: RenderStage) {
        log::trace!("wgpu stage {stage:?}");
    }

    fn set_render_target(&mut self, target: RenderTarget) -> Result<()> {
        self.surface = match target {
            RenderTarget::Main => Surface::Main,
            RenderTarget::PingPong => Surface::PingPong,
        };
        self.ops.push(Op::Target(self.surface));
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.ops.push(Op::Clear(color));
    }

    fn upload_globals(&mut self, globals: &GlobalConstants, lights: &[LightData]) -> Result<()> {
        self.gpu.check_lost()?;
        self.gpu.queue.write_buffer(&self.globals, 0, bytemuck::bytes_of(globals));
        let lights = &lights[..lights.len().min(MAX_LIGHTS)];
        if !lights.is_empty() {
            self.gpu.queue.write_buffer(&self.lights, 0, bytemuck::cast_slice(lights));
        }
        Ok(())
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let target = self
            .gpu
            .resources
            .lock()
            .buffers
            .get(&buffer.0)
            .cloned()
            .ok_or_else(|| PrismError::resource("buffer", format!("unknown buffer {}", buffer.0)))?;
        write_padded(&self.gpu.queue, &target, offset, data)
    }

    fn set_technique(&mut self, technique: &str, _pass: &str) {
        technique.clone_into(&mut self.technique);
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        log::trace!("wgpu backend ignores texture {} at slot {slot}", texture.0);
    }

    fn bind_constant_buffer(&mut self, slot: u32, buffer: BufferId) {
        if let Some(entry) = usize::try_from(slot).ok().and_then(|s| self.constant_slots.get_mut(s)) {
            *entry = Some(buffer);
        }
    }

    fn draw(&mut self, call: &DrawCall) -> Result<()> {
        self.gpu.check_lost()?;
        let blended = match self.technique.as_str() {
            techniques::MESH | techniques::SCREEN_SPACED => false,
            techniques::TRANSPARENT => true,
            _ => {
                self.skipped_draws += 1;
                log::trace!("No wgpu pipeline for technique '{}'", self.technique);
                return Ok(());
            }
        };

        let (vertex, index) = {
            let resources = self.gpu.resources.lock();
            let lookup = |id: BufferId| {
                resources
                    .buffers
                    .get(&id.0)
                    .cloned()
                    .ok_or_else(|| PrismError::resource("buffer", format!("unknown buffer {}", id.0)))
            };
            let vertex = call
                .vertex_buffer
                .ok_or_else(|| PrismError::resource("draw", "mesh draw without vertex buffer"))
                .and_then(&lookup)?;
            let index = call.index_buffer.map(&lookup).transpose()?;
            (vertex, index)
        };

        let model = self.constant_buffer(1, &self.fallback_model);
        let material = self.constant_buffer(2, &self.fallback_material);
        let layout = self.gpu.pipelines.mesh_opaque.get_bind_group_layout(0);
        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Prism Mesh Bindings"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.globals.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: model.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: material.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.lights.as_entire_binding(),
                },
            ],
        });

        self.ops.push(Op::Mesh {
            blended,
            vertex,
            index,
            bind_group,
            count: call.element_count,
            instances: call.instance_count.max(1),
        });
        Ok(())
    }

    fn resolve_to_ping_pong(&mut self) -> Result<()> {
        self.ops.push(Op::Copy {
            from: Surface::Main,
            to: Surface::PingPong,
            origin: [0, 0],
        });
        Ok(())
    }

    fn composite_to_back_buffer(&mut self) -> Result<()> {
        self.ops.push(Op::Copy {
            from: Surface::Main,
            to: Surface::BackBuffer,
            origin: [0, 0],
        });
        Ok(())
    }

    fn begin_2d(&mut self) -> Result<()> {
        self.gpu.check_lost()?;
        self.transform_2d = Affine2::IDENTITY;
        self.clip_stack.clear();
        self.surface_stack.clear();
        self.surface = Surface::BackBuffer;
        self.ops.push(Op::Target(Surface::BackBuffer));
        Ok(())
    }

    fn end_2d(&mut self) -> Result<()> {
        if !self.surface_stack.is_empty() {
            return Err(PrismError::Backend("end_2d inside an open bitmap".into()));
        }
        self.surface = Surface::Main;
        Ok(())
    }

    fn set_transform_2d(&mut self, transform: Affine2) {
        self.transform_2d = transform;
    }

    fn push_clip(&mut self, rect: Rect) {
        let rect = self.transformed(rect);
        let clip = match self.clip_stack.last() {
            Some(outer) => {
                let x = rect.x.max(outer.x);
                let y = rect.y.max(outer.y);
                let right = rect.right().min(outer.right());
                let bottom = rect.bottom().min(outer.bottom());
                Rect::new(x, y, (right - x).max(0.0), (bottom - y).max(0.0))
            }
            None => rect,
        };
        self.clip_stack.push(clip);
    }

    fn pop_clip(&mut self) {
        self.clip_stack.pop();
    }

    #[allow(clippy::cast_precision_loss)]
    fn fill_rect(&mut self, rect: Rect, color: [f32; 4]) {
        let rect = self.transformed(rect);
        let (w, h) = self.surface_size(self.surface);
        let ndc = |x: f32, y: f32| [x / w as f32 * 2.0 - 1.0, 1.0 - y / h as f32 * 2.0];
        let corner = |x: f32, y: f32| FillVertex {
            position: ndc(x, y),
            color,
        };
        let (l, t, r, b) = (rect.x, rect.y, rect.right(), rect.bottom());
        self.ops.push(Op::Fill {
            vertices: [
                corner(l, t),
                corner(l, b),
                corner(r, b),
                corner(l, t),
                corner(r, b),
                corner(r, t),
            ],
            scissor: self.scissor(),
        });
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn draw_bitmap(&mut self, bitmap: BitmapId, rect: Rect) {
        let origin = self.transformed(rect);
        self.ops.push(Op::Copy {
            from: Surface::Bitmap(bitmap),
            to: self.surface,
            origin: [origin.x.max(0.0) as u32, origin.y.max(0.0) as u32],
        });
    }

    fn begin_bitmap(&mut self, bitmap: BitmapId) -> Result<()> {
        if !self.gpu.resources.lock().bitmaps.contains_key(&bitmap.0) {
            return Err(PrismError::resource("bitmap", format!("unknown bitmap {}", bitmap.0)));
        }
        self.surface_stack.push(self.surface);
        self.surface = Surface::Bitmap(bitmap);
        self.ops.push(Op::Target(self.surface));
        self.ops.push(Op::Clear([0.0; 4]));
        Ok(())
    }

    fn end_bitmap(&mut self) -> Result<()> {
        let previous = self
            .surface_stack
            .pop()
            .ok_or_else(|| PrismError::Backend("end_bitmap without begin_bitmap".into()))?;
        self.surface = previous;
        self.ops.push(Op::Target(previous));
        Ok(())
    }
}

/// Offscreen [`RenderBuffer`]: main, ping-pong and back-buffer textures.
pub struct WgpuRenderBuffer {
    id: u64,
    context: WgpuContext,
}

impl WgpuRenderBuffer {
    pub(crate) fn new(gpu: Arc<WgpuDevice>, width: u32, height: u32) -> Self {
        Self {
            id: gpu.allocate_id(),
            context: WgpuContext::new(gpu, width, height),
        }
    }

    /// Final composited image of the last presented frame.
    #[must_use]
    pub fn back_buffer(&self) -> &wgpu::Texture {
        &self.context.back_buffer
    }
}

impl RenderBuffer for WgpuRenderBuffer {
    fn id(&self) -> u64 {
        self.id
    }

    fn size(&self) -> (u32, u32) {
        (self.context.width, self.context.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.context.gpu.check_lost()?;
        self.context.resize_targets(width, height);
        Ok(())
    }

    fn begin_draw(&mut self) -> Result<()> {
        self.context.gpu.check_lost()?;
        self.context.ops.clear();
        self.context.constant_slots = [None; CONSTANT_SLOTS];
        Ok(())
    }

    fn end_draw(&mut self) -> Result<()> {
        self.context.flush();
        self.context.gpu.check_lost()
    }

    fn present(&mut self) -> Result<()> {
        self.context.flush();
        let buffers: Vec<wgpu::CommandBuffer> = self.context.pending.drain(..).collect();
        self.context.gpu.queue.submit(buffers);
        self.context.gpu.check_lost()
    }

    fn context(&mut self) -> &mut dyn DeviceContext {
        &mut self.context
    }

    fn dispose(&mut self) {
        self.context.ops.clear();
        self.context.pending.clear();
        self.context.destroy_targets();
    }
}
