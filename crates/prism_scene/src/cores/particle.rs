use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::{Vec3, Vec4};
use parking_lot::Mutex;
use prism_core::Result;
use prism_core::math::BoundingBox;
use prism_resources::effects::techniques;
use prism_resources::{AttachContext, DeviceContext, DrawCall, DynamicBufferProxy, GraphicsDevice};

use crate::context::RenderContext;
use crate::core::RenderCore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Remaining lifetime in seconds.
    pub life: f32,
}

struct Simulation {
    particles: Vec<Particle>,
    /// xyz position, w remaining life; uploaded as instances.
    instances: Vec<Vec4>,
    spawn_cursor: u32,
}

/// CPU-simulated particle emitter.
///
/// Simulation runs in [`RenderCore::update_not_render`] on a background task;
/// the resulting instance data is uploaded in the next frame's GPU update.
pub struct ParticleCore {
    capacity: u32,
    lifetime: f32,
    speed: f32,
    gravity: Vec3,
    emitter_extent: f32,
    simulation: Mutex<Simulation>,
    instances: Mutex<DynamicBufferProxy>,
    device: Option<Arc<dyn GraphicsDevice>>,
    gpu_dirty: AtomicBool,
    tag: u64,
}

impl ParticleCore {
    #[must_use]
    pub fn new(capacity: u32, lifetime: f32, speed: f32) -> Self {
        let mut simulation = Simulation {
            particles: Vec::with_capacity(capacity as usize),
            instances: Vec::with_capacity(capacity as usize),
            spawn_cursor: 0,
        };
        for _ in 0..capacity {
            let particle = Self::spawn(&mut simulation.spawn_cursor, capacity, lifetime, speed);
            simulation.particles.push(particle);
            simulation.instances.push(particle.position.extend(particle.life));
        }
        Self {
            capacity,
            lifetime,
            speed,
            gravity: Vec3::new(0.0, -9.8, 0.0),
            emitter_extent: speed * lifetime,
            simulation: Mutex::new(simulation),
            instances: Mutex::new(DynamicBufferProxy::structured("ParticleInstances")),
            device: None,
            gpu_dirty: AtomicBool::new(true),
            tag: 0,
        }
    }

    #[must_use]
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: u64) -> Self {
        self.tag = tag;
        self
    }

    /// Deterministic emission on a ring, staggered in lifetime.
    fn spawn(cursor: &mut u32, capacity: u32, lifetime: f32, speed: f32) -> Particle {
        let i = *cursor;
        *cursor = cursor.wrapping_add(1);
        let angle = (i % capacity.max(1)) as f32 / capacity.max(1) as f32 * std::f32::consts::TAU;
        Particle {
            position: Vec3::ZERO,
            velocity: Vec3::new(angle.cos(), 1.0, angle.sin()) * speed,
            life: lifetime * (1.0 - (i % 8) as f32 / 8.0),
        }
    }

    #[must_use]
    pub fn live_particles(&self) -> usize {
        self.simulation.lock().particles.iter().filter(|p| p.life > 0.0).count()
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&self, dt: f32) {
        let mut sim = self.simulation.lock();
        let Simulation {
            particles,
            instances,
            spawn_cursor,
        } = &mut *sim;

        instances.clear();
        for particle in particles.iter_mut() {
            particle.life -= dt;
            if particle.life <= 0.0 {
                *particle = Self::spawn(spawn_cursor, self.capacity, self.lifetime, self.speed);
            }
            particle.velocity += self.gravity * dt;
            particle.position += particle.velocity * dt;
            instances.push(particle.position.extend(particle.life));
        }
        self.gpu_dirty.store(true, Ordering::Release);
    }
}

impl RenderCore for ParticleCore {
    fn attach(&mut self, ctx: &AttachContext) -> Result<()> {
        ctx.effects.technique(techniques::PARTICLE)?;
        self.device = Some(Arc::clone(ctx.device()));
        self.gpu_dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn detach(&mut self) {
        if let Some(device) = self.device.take() {
            self.instances.get_mut().dispose(device.as_ref());
        }
    }

    fn local_bounds(&self) -> Option<BoundingBox> {
        let e = self.emitter_extent.max(0.01);
        Some(BoundingBox::new(Vec3::new(-e, -e, -e), Vec3::new(e, e, e)))
    }

    fn needs_gpu_update(&self) -> bool {
        self.gpu_dirty.load(Ordering::Acquire)
    }

    fn update_gpu(&self, _ctx: &RenderContext, dc: &mut dyn DeviceContext) -> Result<()> {
        let Some(device) = self.device.as_ref() else {
            return Ok(());
        };
        let sim = self.simulation.lock();
        self.instances.lock().upload(device.as_ref(), dc, &sim.instances)?;
        self.gpu_dirty.store(false, Ordering::Release);
        Ok(())
    }

    fn render(&self, ctx: &RenderContext, dc: &mut dyn DeviceContext) -> Result<()> {
        let instances = self.instances.lock();
        let Some(buffer) = instances.buffer() else {
            return Ok(());
        };
        if instances.element_count() == 0 {
            return Ok(());
        }
        dc.set_technique(techniques::PARTICLE, "Default");
        dc.draw(&DrawCall {
            stage: ctx.stage,
            vertex_buffer: Some(buffer),
            index_buffer: None,
            element_count: 4,
            instance_count: instances.element_count(),
            tag: self.tag,
        })
    }

    fn has_async_update(&self) -> bool {
        true
    }

    fn update_not_render(&self, ctx: &RenderContext) -> Result<()> {
        self.step(ctx.delta_seconds);
        Ok(())
    }

    fn triangle_count(&self) -> u64 {
        u64::from(self.capacity) * 2
    }
}
