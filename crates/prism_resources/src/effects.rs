//! Effects Manager
//!
//! Per-device registry shared by every render core of one host:
//!
//! - **Techniques**: named shader programs with their pass names. A default
//!   set covering the built-in cores is registered on construction.
//! - **Constant-buffer pool**: buffers shared by name and size, so cores that
//!   bind the same block reuse one device buffer.
//! - **Texture repository**: see [`TextureModelRepository`].
//!
//! The host builds one manager in `start_d3d` and drops it in `end_d3d`; all
//! pooled device resources are released with it.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use prism_core::{PrismError, Result};
use rustc_hash::FxHashMap;

use crate::device::{BufferDesc, BufferId, BufferUsage, GraphicsDevice};
use crate::texture::TextureModelRepository;

/// Built-in technique names.
pub mod techniques {
    pub const MESH: &str = "Mesh";
    pub const TRANSPARENT: &str = "MeshTransparent";
    pub const PARTICLE: &str = "Particle";
    pub const LIGHT: &str = "Light";
    pub const POST_EFFECT: &str = "PostEffect";
    pub const SCREEN_SPACED: &str = "ScreenSpaced";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Technique {
    pub name: String,
    pub passes: Vec<String>,
}

impl Technique {
    #[must_use]
    pub fn new(name: impl Into<String>, passes: &[&str]) -> Self {
        Self {
            name: name.into(),
            passes: passes.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn has_pass(&self, pass: &str) -> bool {
        self.passes.iter().any(|p| p == pass)
    }

    /// First pass, used when a core does not pick one.
    #[must_use]
    pub fn default_pass(&self) -> &str {
        self.passes.first().map_or("Default", String::as_str)
    }
}

pub struct EffectsManager {
    device: Arc<dyn GraphicsDevice>,
    techniques: RwLock<FxHashMap<String, Arc<Technique>>>,
    constant_buffers: Mutex<FxHashMap<(String, u64), BufferId>>,
    textures: TextureModelRepository,
}

impl EffectsManager {
    #[must_use]
    pub fn new(device: Arc<dyn GraphicsDevice>) -> Self {
        let manager = Self {
            device,
            techniques: RwLock::new(FxHashMap::default()),
            constant_buffers: Mutex::new(FxHashMap::default()),
            textures: TextureModelRepository::new(),
        };
        manager.register_technique(Technique::new(techniques::MESH, &["Default", "Wireframe"]));
        manager.register_technique(Technique::new(techniques::TRANSPARENT, &["OIT", "Default"]));
        manager.register_technique(Technique::new(techniques::PARTICLE, &["Default"]));
        manager.register_technique(Technique::new(techniques::LIGHT, &["Default"]));
        manager.register_technique(Technique::new(techniques::POST_EFFECT, &["Outline", "Blur", "Composite"]));
        manager.register_technique(Technique::new(techniques::SCREEN_SPACED, &["Default"]));
        manager
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    /// Registers (or replaces) a technique.
    pub fn register_technique(&self, technique: Technique) {
        self.techniques
            .write()
            .insert(technique.name.clone(), Arc::new(technique));
    }

    pub fn technique(&self, name: &str) -> Result<Arc<Technique>> {
        self.techniques
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PrismError::TechniqueNotFound(name.to_string()))
    }

    /// Returns the pooled constant buffer for `(name, size)`, creating it on
    /// first request.
    pub fn constant_buffer(&self, name: &str, size: u64) -> Result<BufferId> {
        let mut pool = self.constant_buffers.lock();
        if let Some(id) = pool.get(&(name.to_string(), size)) {
            return Ok(*id);
        }
        let desc = BufferDesc {
            label: name.to_string(),
            size,
            stride: 0,
            usage: BufferUsage::CONSTANT | BufferUsage::DYNAMIC,
        };
        let id = self.device.create_buffer(&desc, None)?;
        pool.insert((name.to_string(), size), id);
        Ok(id)
    }

    #[must_use]
    pub fn constant_buffer_count(&self) -> usize {
        self.constant_buffers.lock().len()
    }

    #[inline]
    #[must_use]
    pub fn textures(&self) -> &TextureModelRepository {
        &self.textures
    }

    /// Releases pooled buffers and cached textures. Safe to call repeatedly.
    pub fn release(&self) {
        for ((name, _), id) in self.constant_buffers.lock().drain() {
            log::trace!("Releasing constant buffer '{name}'");
            self.device.destroy_buffer(id);
        }
        self.textures.clear(self.device.as_ref());
    }
}

impl Drop for EffectsManager {
    fn drop(&mut self) {
        self.release();
    }
}

/// Context handed to render cores when a node attaches.
#[derive(Clone)]
pub struct AttachContext {
    pub effects: Arc<EffectsManager>,
}

impl AttachContext {
    #[must_use]
    pub fn new(effects: Arc<EffectsManager>) -> Self {
        Self { effects }
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        self.effects.device()
    }
}
