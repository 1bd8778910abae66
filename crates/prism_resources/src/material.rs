//! Material variables: the per-core shader parameter block.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use prism_core::Result;

use crate::buffer::ConstantBufferProxy;
use crate::device::{DeviceContext, GraphicsDevice};
use crate::effects::{EffectsManager, techniques};
use crate::texture::{TextureModel, TextureViewProxy};

/// Constant buffer slot materials bind to.
pub const MATERIAL_CB_SLOT: u32 = 2;

/// Call contract between a render core and its shader parameters.
pub trait MaterialVariable: Send + Sync {
    /// Technique the material renders with.
    fn technique(&self) -> &str;

    /// Binds device resources. Called when the owning node attaches.
    fn attach(&mut self, effects: &EffectsManager) -> Result<()>;

    /// Uploads changed parameters.
    fn update_constant_buffer(&mut self, dc: &mut dyn DeviceContext) -> Result<()>;

    /// Binds textures and the parameter block for the next draw.
    fn bind_textures(&self, dc: &mut dyn DeviceContext);

    /// Releases device resources. Called when the owning node detaches.
    fn detach(&mut self);
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct ColorMaterialBlock {
    diffuse: Vec4,
    emissive: Vec4,
    /// x: has texture, y: opacity.
    flags: Vec4,
}

/// Flat-colored material with an optional diffuse texture.
pub struct ColorMaterial {
    technique: &'static str,
    pub diffuse: Vec4,
    pub emissive: Vec4,
    pub texture: Option<TextureModel>,
    device: Option<Arc<dyn GraphicsDevice>>,
    constants: Option<ConstantBufferProxy>,
    view: Option<Arc<TextureViewProxy>>,
}

impl ColorMaterial {
    #[must_use]
    pub fn new(diffuse: Vec4) -> Self {
        Self {
            technique: techniques::MESH,
            diffuse,
            emissive: Vec4::ZERO,
            texture: None,
            device: None,
            constants: None,
            view: None,
        }
    }

    #[must_use]
    pub fn transparent(diffuse: Vec4) -> Self {
        Self {
            technique: techniques::TRANSPARENT,
            ..Self::new(diffuse)
        }
    }

    /// Material drawn with a custom technique.
    #[must_use]
    pub fn with_technique(diffuse: Vec4, technique: &'static str) -> Self {
        Self {
            technique,
            ..Self::new(diffuse)
        }
    }

    #[must_use]
    pub fn with_texture(mut self, texture: TextureModel) -> Self {
        self.texture = Some(texture);
        self
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.constants.is_some()
    }

    #[must_use]
    pub fn texture_view(&self) -> Option<&Arc<TextureViewProxy>> {
        self.view.as_ref()
    }
}

impl MaterialVariable for ColorMaterial {
    fn technique(&self) -> &str {
        self.technique
    }

    fn attach(&mut self, effects: &EffectsManager) -> Result<()> {
        effects.technique(self.technique)?;
        let device = Arc::clone(effects.device());
        let constants = ConstantBufferProxy::create(
            device.as_ref(),
            "ColorMaterial",
            size_of::<ColorMaterialBlock>() as u64,
        )?;
        // A missing texture degrades to the flat color.
        self.view = match &self.texture {
            Some(model) => effects.textures().load(device.as_ref(), model).ok(),
            None => None,
        };
        self.constants = Some(constants);
        self.device = Some(device);
        Ok(())
    }

    fn update_constant_buffer(&mut self, dc: &mut dyn DeviceContext) -> Result<()> {
        let Some(constants) = self.constants.as_mut() else {
            return Ok(());
        };
        let block = ColorMaterialBlock {
            diffuse: self.diffuse,
            emissive: self.emissive,
            flags: Vec4::new(
                if self.view.is_some() { 1.0 } else { 0.0 },
                self.diffuse.w,
                0.0,
                0.0,
            ),
        };
        constants.write(0, &block);
        constants.flush(dc)?;
        Ok(())
    }

    fn bind_textures(&self, dc: &mut dyn DeviceContext) {
        if let Some(constants) = &self.constants {
            dc.bind_constant_buffer(MATERIAL_CB_SLOT, constants.buffer());
        }
        if let Some(view) = &self.view {
            dc.bind_texture(0, view.texture);
        }
    }

    fn detach(&mut self) {
        let device = self.device.take();
        if let (Some(device), Some(constants)) = (device, self.constants.take()) {
            constants.dispose(device.as_ref());
        }
        self.view = None;
    }
}
