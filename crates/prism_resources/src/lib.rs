//! Prism resources: the device boundary and everything render cores allocate
//! through it.
//!
//! - [`device`]: provider / device / render buffer / context contracts
//! - [`buffer`]: immutable, dynamic and constant buffer proxies
//! - [`texture`]: texture models, loaders and the per-device repository
//! - [`effects`]: techniques, constant-buffer pool, [`AttachContext`]
//! - [`material`]: the [`MaterialVariable`] contract and a flat-color material
//! - [`constants`]: `Pod` layouts for globals, lights and per-model data
//! - [`headless`]: recording device used by tests and offscreen tooling

pub mod buffer;
pub mod constants;
pub mod device;
pub mod effects;
pub mod headless;
pub mod material;
pub mod texture;

pub use buffer::{ConstantBufferProxy, DynamicBufferProxy, ImmutableBufferProxy};
pub use constants::{GlobalConstants, LightData, LightKind, MAX_LIGHTS, ModelConstants};
pub use device::{
    BitmapId, BufferDesc, BufferId, BufferUsage, DeviceContext, DeviceProvider, DrawCall, GraphicsDevice,
    RenderBuffer, RenderBufferDesc, RenderStage, RenderTarget, TextureId,
};
pub use effects::{AttachContext, EffectsManager, Technique};
pub use material::{ColorMaterial, MaterialVariable};
pub use texture::{
    TextureFormat, TextureInfo, TextureInfoLoader, TextureModel, TextureModelRepository, TextureViewProxy,
};
