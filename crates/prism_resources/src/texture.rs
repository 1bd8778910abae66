//! Texture models and their device-side cache.
//!
//! A [`TextureModel`] names a texture by guid and knows which
//! [`TextureInfoLoader`] produces its pixels. The [`TextureModelRepository`]
//! turns models into device textures on first use and hands out shared
//! [`TextureViewProxy`] values afterwards. The loader's `complete` callback
//! always fires exactly once per load attempt, carrying success or failure.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use prism_core::{PrismError, Result};
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::device::{GraphicsDevice, TextureId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    R8Unorm,
    Rgba16Float,
    Rgba32Float,
}

impl TextureFormat {
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Bgra8Unorm => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Decoded texture description plus its pixel payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub data: Arc<[u8]>,
}

impl TextureInfo {
    #[must_use]
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: TextureFormat, data: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            mip_levels: 1,
            data: data.into(),
        }
    }

    /// Byte size of the base level.
    #[must_use]
    pub fn expected_len(&self) -> usize {
        (self.width * self.height * self.format.bytes_per_pixel()) as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PrismError::TextureLoad(format!(
                "'{}' has zero extent {}x{}",
                self.label, self.width, self.height
            )));
        }
        if self.data.len() < self.expected_len() {
            return Err(PrismError::TextureLoad(format!(
                "'{}' carries {} bytes, expected {}",
                self.label,
                self.data.len(),
                self.expected_len()
            )));
        }
        Ok(())
    }
}

/// On-demand texture source.
pub trait TextureInfoLoader: Send + Sync {
    fn load(&self, guid: Uuid) -> Result<TextureInfo>;

    /// Called once after every load attempt.
    fn complete(&self, guid: Uuid, result: std::result::Result<&TextureInfo, &PrismError>);
}

/// Guid-identified texture plus the loader that can produce it.
#[derive(Clone)]
pub struct TextureModel {
    pub guid: Uuid,
    loader: Arc<dyn TextureInfoLoader>,
}

impl TextureModel {
    #[must_use]
    pub fn new(loader: Arc<dyn TextureInfoLoader>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            loader,
        }
    }

    #[must_use]
    pub fn with_guid(guid: Uuid, loader: Arc<dyn TextureInfoLoader>) -> Self {
        Self { guid, loader }
    }

    #[must_use]
    pub fn loader(&self) -> &Arc<dyn TextureInfoLoader> {
        &self.loader
    }
}

impl fmt::Debug for TextureModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureModel").field("guid", &self.guid).finish_non_exhaustive()
    }
}

/// Device texture handed to materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureViewProxy {
    pub texture: TextureId,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Per-device cache of loaded texture models.
#[derive(Default)]
pub struct TextureModelRepository {
    cache: Mutex<FxHashMap<Uuid, Arc<TextureViewProxy>>>,
}

impl TextureModelRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached view for `model`, loading and creating it on a miss.
    pub fn load(&self, device: &dyn GraphicsDevice, model: &TextureModel) -> Result<Arc<TextureViewProxy>> {
        if let Some(view) = self.cache.lock().get(&model.guid) {
            return Ok(Arc::clone(view));
        }

        let created = model
            .loader
            .load(model.guid)
            .and_then(|info| {
                info.validate()?;
                let texture = device.create_texture(&info)?;
                Ok((info, texture))
            });

        match created {
            Ok((info, texture)) => {
                model.loader.complete(model.guid, Ok(&info));
                let view = Arc::new(TextureViewProxy {
                    texture,
                    width: info.width,
                    height: info.height,
                    format: info.format,
                });
                // Two threads racing on the same guid keep the first insert.
                let mut cache = self.cache.lock();
                let entry = cache.entry(model.guid).or_insert_with(|| Arc::clone(&view));
                if entry.texture != texture {
                    device.destroy_texture(texture);
                }
                Ok(Arc::clone(entry))
            }
            Err(err) => {
                log::warn!("Texture {} failed to load: {err}", model.guid);
                model.loader.complete(model.guid, Err(&err));
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn contains(&self, guid: &Uuid) -> bool {
        self.cache.lock().contains_key(guid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn release(&self, device: &dyn GraphicsDevice, guid: &Uuid) -> bool {
        match self.cache.lock().remove(guid) {
            Some(view) => {
                device.destroy_texture(view.texture);
                true
            }
            None => false,
        }
    }

    /// Destroys every cached texture.
    pub fn clear(&self, device: &dyn GraphicsDevice) {
        for (_, view) in self.cache.lock().drain() {
            device.destroy_texture(view.texture);
        }
    }
}
