use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use parking_lot::{Mutex, MutexGuard};
use prism_core::Result;
use prism_core::math::BoundingBox;
use prism_resources::{
    AttachContext, BufferUsage, ConstantBufferProxy, DeviceContext, DrawCall, GraphicsDevice, ImmutableBufferProxy,
    MaterialVariable, ModelConstants, RenderStage,
};

use crate::context::RenderContext;
use crate::core::RenderCore;

/// Constant buffer slot for per-model constants.
pub const MODEL_CB_SLOT: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    #[must_use]
    pub fn new(position: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            uv,
        }
    }
}

/// CPU-side indexed triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshGeometry {
    #[must_use]
    pub fn bounds(&self) -> Option<BoundingBox> {
        let points: Vec<Vec3> = self.vertices.iter().map(|v| Vec3::from(v.position)).collect();
        BoundingBox::from_points(&points)
    }

    #[must_use]
    pub fn triangle_count(&self) -> u64 {
        (self.indices.len() / 3) as u64
    }

    /// Axis-aligned cube centred on the origin.
    #[must_use]
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        let faces = [
            (Vec3::X, Vec3::Y, Vec3::Z),
            (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
            (Vec3::Y, Vec3::Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::NEG_Z, Vec3::X),
            (Vec3::Z, Vec3::Y, Vec3::NEG_X),
            (Vec3::NEG_Z, Vec3::Y, Vec3::X),
        ];
        let mut geometry = Self::default();
        for (normal, up, right) in faces {
            let base = geometry.vertices.len() as u32;
            let center = normal * h;
            for (du, dv, uv) in [(-1.0, -1.0, [0.0, 1.0]), (1.0, -1.0, [1.0, 1.0]), (1.0, 1.0, [1.0, 0.0]), (-1.0, 1.0, [0.0, 0.0])] {
                geometry
                    .vertices
                    .push(Vertex::new(center + right * (du * h) + up * (dv * h), normal, uv));
            }
            geometry
                .indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        geometry
    }

    /// XY plane facing +Z.
    #[must_use]
    pub fn plane(width: f32, height: f32) -> Self {
        let (w, h) = (width * 0.5, height * 0.5);
        Self {
            vertices: vec![
                Vertex::new(Vec3::new(-w, -h, 0.0), Vec3::Z, [0.0, 1.0]),
                Vertex::new(Vec3::new(w, -h, 0.0), Vec3::Z, [1.0, 1.0]),
                Vertex::new(Vec3::new(w, h, 0.0), Vec3::Z, [1.0, 0.0]),
                Vertex::new(Vec3::new(-w, h, 0.0), Vec3::Z, [0.0, 0.0]),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }
}

struct MeshGpu {
    vertices: ImmutableBufferProxy,
    indices: ImmutableBufferProxy,
    constants: ConstantBufferProxy,
}

/// Indexed mesh drawn with a material.
pub struct MeshCore {
    geometry: Arc<MeshGeometry>,
    bounds: Option<BoundingBox>,
    material: Mutex<Box<dyn MaterialVariable>>,
    gpu: Mutex<Option<MeshGpu>>,
    device: Option<Arc<dyn GraphicsDevice>>,
    world: Mat4,
    gpu_dirty: AtomicBool,
    post_effect: Option<String>,
    tag: u64,
}

impl MeshCore {
    #[must_use]
    pub fn new(geometry: impl Into<Arc<MeshGeometry>>, material: Box<dyn MaterialVariable>) -> Self {
        let geometry = geometry.into();
        Self {
            bounds: geometry.bounds(),
            geometry,
            material: Mutex::new(material),
            gpu: Mutex::new(None),
            device: None,
            world: Mat4::IDENTITY,
            gpu_dirty: AtomicBool::new(false),
            post_effect: None,
            tag: 0,
        }
    }

    /// Requests the named post effect (e.g. an outline) for this mesh.
    #[must_use]
    pub fn with_post_effect(mut self, effect: impl Into<String>) -> Self {
        self.post_effect = Some(effect.into());
        self
    }

    /// Tag carried on every draw call.
    #[must_use]
    pub fn with_tag(mut self, tag: u64) -> Self {
        self.tag = tag;
        self
    }

    #[must_use]
    pub fn post_effect(&self) -> Option<&str> {
        self.post_effect.as_deref()
    }

    #[must_use]
    pub fn geometry(&self) -> &Arc<MeshGeometry> {
        &self.geometry
    }

    /// Locks the material for editing. Call [`mark_dirty`](Self::mark_dirty)
    /// afterwards so the change is uploaded.
    pub fn material(&self) -> MutexGuard<'_, Box<dyn MaterialVariable>> {
        self.material.lock()
    }

    pub fn mark_dirty(&self) {
        self.gpu_dirty.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.gpu.lock().is_some()
    }

    fn pass_for(stage: RenderStage) -> &'static str {
        match stage {
            RenderStage::Transparent => "OIT",
            _ => "Default",
        }
    }
}

impl RenderCore for MeshCore {
    fn attach(&mut self, ctx: &AttachContext) -> Result<()> {
        let device = Arc::clone(ctx.device());
        let vertices = ImmutableBufferProxy::create(
            device.as_ref(),
            "MeshVertices",
            BufferUsage::VERTEX,
            &self.geometry.vertices,
        )?;
        let indices = ImmutableBufferProxy::create(
            device.as_ref(),
            "MeshIndices",
            BufferUsage::INDEX,
            &self.geometry.indices,
        )?;
        let constants =
            ConstantBufferProxy::create(device.as_ref(), "ModelConstants", size_of::<ModelConstants>() as u64)?;
        self.material.get_mut().attach(&ctx.effects)?;

        *self.gpu.get_mut() = Some(MeshGpu {
            vertices,
            indices,
            constants,
        });
        self.device = Some(device);
        self.gpu_dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn detach(&mut self) {
        if let (Some(device), Some(mut gpu)) = (self.device.take(), self.gpu.get_mut().take()) {
            gpu.vertices.dispose(device.as_ref());
            gpu.indices.dispose(device.as_ref());
            gpu.constants.dispose(device.as_ref());
        }
        self.material.get_mut().detach();
    }

    fn local_bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    fn on_update(&mut self, _ctx: &RenderContext, world: &Mat4) -> Result<()> {
        if self.world != *world {
            self.world = *world;
            self.gpu_dirty.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn needs_gpu_update(&self) -> bool {
        self.gpu_dirty.load(Ordering::Acquire)
    }

    fn update_gpu(&self, _ctx: &RenderContext, dc: &mut dyn DeviceContext) -> Result<()> {
        let mut gpu = self.gpu.lock();
        let Some(gpu) = gpu.as_mut() else {
            return Ok(());
        };
        gpu.constants.write(0, &ModelConstants::from_world(self.world));
        gpu.constants.flush(dc)?;
        self.material.lock().update_constant_buffer(dc)?;
        self.gpu_dirty.store(false, Ordering::Release);
        Ok(())
    }

    fn render(&self, ctx: &RenderContext, dc: &mut dyn DeviceContext) -> Result<()> {
        let gpu = self.gpu.lock();
        let Some(gpu) = gpu.as_ref() else {
            return Ok(());
        };
        let material = self.material.lock();
        dc.set_technique(material.technique(), Self::pass_for(ctx.stage));
        dc.bind_constant_buffer(MODEL_CB_SLOT, gpu.constants.buffer());
        material.bind_textures(dc);
        dc.draw(&DrawCall {
            stage: ctx.stage,
            vertex_buffer: gpu.vertices.buffer(),
            index_buffer: gpu.indices.buffer(),
            element_count: gpu.indices.element_count(),
            instance_count: 1,
            tag: self.tag,
        })
    }

    fn has_post_effect(&self) -> bool {
        self.post_effect.is_some()
    }

    fn triangle_count(&self) -> u64 {
        self.geometry.triangle_count()
    }
}
