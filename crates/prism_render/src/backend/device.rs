use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use prism_core::{PrismError, Result};
use prism_resources::{
    BitmapId, BufferDesc, BufferId, BufferUsage, DeviceProvider, GraphicsDevice, RenderBuffer, RenderBufferDesc,
    TextureFormat, TextureId, TextureInfo,
};
use rustc_hash::FxHashMap;

use super::context::WgpuRenderBuffer;

/// Color format of every target and bitmap the backend creates.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const SHADER_SOURCE: &str = include_str!("shaders.wgsl");

/// Pipelines shared by every render buffer of a device.
pub(crate) struct Pipelines {
    pub mesh_opaque: wgpu::RenderPipeline,
    pub mesh_blended: wgpu::RenderPipeline,
    pub fill: wgpu::RenderPipeline,
}

#[derive(Default)]
pub(crate) struct GpuResources {
    pub buffers: FxHashMap<u64, wgpu::Buffer>,
    pub textures: FxHashMap<u64, wgpu::Texture>,
    pub bitmaps: FxHashMap<u64, wgpu::Texture>,
}

/// [`GraphicsDevice`] over a wgpu device and queue.
pub struct WgpuDevice {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) pipelines: Pipelines,
    pub(crate) resources: Mutex<GpuResources>,
    adapter_name: String,
    next_id: AtomicU64,
    lost: Arc<AtomicBool>,
}

impl WgpuDevice {
    fn new(device: wgpu::Device, queue: wgpu::Queue, adapter_name: String) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("wgpu device lost ({reason:?}): {message}");
            flag.store(true, Ordering::Release);
        });

        let pipelines = create_pipelines(&device);
        Self {
            device,
            queue,
            pipelines,
            resources: Mutex::new(GpuResources::default()),
            adapter_name,
            next_id: AtomicU64::new(1),
            lost,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub(crate) fn check_lost(&self) -> Result<()> {
        if self.is_lost() {
            Err(PrismError::DeviceLost(self.adapter_name.clone()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn create_target(&self, label: &str, width: u32, height: u32) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        })
    }

    pub(crate) fn create_uniform(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: align_to_copy(size),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }
}

/// Rounds up to the copy alignment, with a floor of one word.
pub(crate) fn align_to_copy(size: u64) -> u64 {
    size.max(wgpu::COPY_BUFFER_ALIGNMENT).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

fn buffer_usages(usage: BufferUsage) -> wgpu::BufferUsages {
    let mut usages = wgpu::BufferUsages::COPY_DST;
    if usage.contains(BufferUsage::VERTEX) {
        usages |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsage::INDEX) {
        usages |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsage::CONSTANT) {
        usages |= wgpu::BufferUsages::UNIFORM;
    }
    if usage.contains(BufferUsage::STRUCTURED) {
        usages |= wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX;
    }
    usages
}

fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

impl GraphicsDevice for WgpuDevice {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn create_buffer(&self, desc: &BufferDesc, contents: Option<&[u8]>) -> Result<BufferId> {
        self.check_lost()?;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size: align_to_copy(desc.size),
            usage: buffer_usages(desc.usage),
            mapped_at_creation: false,
        });
        if let Some(data) = contents.filter(|d| !d.is_empty()) {
            super::context::write_padded(&self.queue, &buffer, 0, data)?;
        }

        let id = self.allocate_id();
        self.resources.lock().buffers.insert(id, buffer);
        Ok(BufferId(id))
    }

    fn destroy_buffer(&self, id: BufferId) {
        if let Some(buffer) = self.resources.lock().buffers.remove(&id.0) {
            buffer.destroy();
        }
    }

    fn create_texture(&self, info: &TextureInfo) -> Result<TextureId> {
        self.check_lost()?;
        info.validate()?;
        let size = wgpu::Extent3d {
            width: info.width,
            height: info.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&info.label),
            size,
            mip_level_count: info.mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(info.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &info.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(info.width * info.format.bytes_per_pixel()),
                rows_per_image: Some(info.height),
            },
            size,
        );

        let id = self.allocate_id();
        self.resources.lock().textures.insert(id, texture);
        Ok(TextureId(id))
    }

    fn destroy_texture(&self, id: TextureId) {
        if let Some(texture) = self.resources.lock().textures.remove(&id.0) {
            texture.destroy();
        }
    }

    fn create_bitmap(&self, width: u32, height: u32) -> Result<BitmapId> {
        self.check_lost()?;
        if width == 0 || height == 0 {
            return Err(PrismError::resource("bitmap", format!("zero extent {width}x{height}")));
        }
        let texture = self.create_target("Prism Bitmap", width, height);
        let id = self.allocate_id();
        self.resources.lock().bitmaps.insert(id, texture);
        Ok(BitmapId(id))
    }

    fn destroy_bitmap(&self, id: BitmapId) {
        if let Some(texture) = self.resources.lock().bitmaps.remove(&id.0) {
            texture.destroy();
        }
    }
}

// ============================================================================
// Pipelines
// ============================================================================

const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

const FILL_ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4];

/// Byte stride of `prism_scene::cores::Vertex`.
const MESH_STRIDE: u64 = 32;

/// Byte stride of a 2D fill vertex (position + color).
pub(crate) const FILL_STRIDE: u64 = 24;

fn create_pipelines(device: &wgpu::Device) -> Pipelines {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Prism Shaders"),
        source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
    });

    let mesh = |label: &str, blend: wgpu::BlendState| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: None,
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_mesh"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: MESH_STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &MESH_ATTRIBUTES,
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_mesh"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(blend),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        })
    };

    let fill = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Prism Fill Pipeline"),
        layout: None,
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("vs_fill"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: FILL_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &FILL_ATTRIBUTES,
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_fill"),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    });

    Pipelines {
        mesh_opaque: mesh("Prism Mesh Pipeline", wgpu::BlendState::REPLACE),
        mesh_blended: mesh("Prism Transparent Mesh Pipeline", wgpu::BlendState::ALPHA_BLENDING),
        fill,
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Offscreen [`DeviceProvider`] on the default wgpu instance.
pub struct WgpuDeviceProvider {
    instance: wgpu::Instance,
    power_preference: wgpu::PowerPreference,
    device: Option<Arc<WgpuDevice>>,
}

impl WgpuDeviceProvider {
    /// Requests an adapter and device. Fails when no adapter is available.
    pub fn new(power_preference: wgpu::PowerPreference) -> Result<Self> {
        let mut provider = Self {
            instance: wgpu::Instance::default(),
            power_preference,
            device: None,
        };
        provider.device = Some(provider.request_device()?);
        Ok(provider)
    }

    #[must_use]
    pub fn wgpu_device(&self) -> Option<&Arc<WgpuDevice>> {
        self.device.as_ref()
    }

    fn request_device(&self) -> Result<Arc<WgpuDevice>> {
        let adapter = pollster::block_on(self.instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: self.power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| PrismError::Backend(format!("adapter request failed: {e}")))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Prism Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| PrismError::Backend(format!("device request failed: {e}")))?;

        let name = adapter.get_info().name;
        log::info!("wgpu adapter: {name}");
        Ok(Arc::new(WgpuDevice::new(device, queue, name)))
    }
}

impl DeviceProvider for WgpuDeviceProvider {
    fn device(&self) -> Option<Arc<dyn GraphicsDevice>> {
        self.device.as_ref().map(|d| Arc::clone(d) as Arc<dyn GraphicsDevice>)
    }

    fn create_render_buffer(&mut self, desc: &RenderBufferDesc) -> Result<Box<dyn RenderBuffer>> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| PrismError::Backend("no wgpu device".into()))?;
        device.check_lost()?;
        if desc.msaa_samples > 1 {
            log::warn!("wgpu backend renders single-sampled; ignoring msaa_samples = {}", desc.msaa_samples);
        }
        Ok(Box::new(WgpuRenderBuffer::new(Arc::clone(device), desc.width, desc.height)))
    }

    fn on_device_lost(&mut self) -> Result<()> {
        self.device = None;
        self.device = Some(self.request_device()?);
        Ok(())
    }
}
