//! # Prism
//!
//! A render-host toolkit: a scene graph whose nodes carry render cores, a
//! per-frame classification and frustum-culling pipeline, and a host that
//! owns the device resources of one viewport and submits ordered passes.
//!
//! ```rust,ignore
//! use prism::prelude::*;
//!
//! let provider = HeadlessDeviceProvider::new();
//! let mut host = RenderHost::new(provider, Viewport::new(800.0, 600.0), RendererSettings::default());
//! host.start_d3d(800, 600)?;
//! host.update_and_render()?;
//! ```
//!
//! The crates re-exported here:
//!
//! | Module        | Crate             |
//! |---------------|-------------------|
//! | [`core`]      | `prism_core`      |
//! | [`resources`] | `prism_resources` |
//! | [`scene`]     | `prism_scene`     |
//! | [`render`]    | `prism_render`    |

use std::sync::Once;

pub use glam;
pub use prism_core as core;
pub use prism_render as render;
pub use prism_resources as resources;
pub use prism_scene as scene;

pub use prism_core::{OrderKey, PrismError, RenderType, Result, Visibility};
pub use prism_render::{HostEvent, HostState, RenderHost, RendererSettings, Viewport, ViewportProvider};
pub use prism_scene::{CameraCore, NodeHandle, Scene, Scene2D, SceneNode};

pub mod prelude {
    pub use glam::{Mat4, Vec2, Vec3, Vec4};
    pub use prism_core::math::{BoundingBox, Frustum, Rect};
    pub use prism_core::{PrismError, RenderType, Result, Visibility};
    pub use prism_render::{
        HostEvent, HostState, InvalidationHandle, RenderHost, RendererSettings, Viewport, ViewportProvider,
    };
    pub use prism_resources::headless::HeadlessDeviceProvider;
    pub use prism_scene::cores::{LightCore, MeshCore, PostEffectCore};
    pub use prism_scene::{CameraCore, InvalidateTypes, NodeHandle, Scene, Scene2D, SceneNode, SceneNode2D};
}

static LOGGER: Once = Once::new();

/// Installs `env_logger` once, honoring `RUST_LOG` (default `info`).
pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
    });
}
