//! Built-in render cores.

pub mod group;
pub mod light;
pub mod mesh;
pub mod particle;
pub mod post_effect;
pub mod screen_spaced;

pub use group::GroupCore;
pub use light::LightCore;
pub use mesh::{MeshCore, MeshGeometry, Vertex};
pub use particle::{Particle, ParticleCore};
pub use post_effect::PostEffectCore;
pub use screen_spaced::ScreenSpacedCore;
