//! Prism render: the render host and everything it runs per frame.
//!
//! - [`host`]: [`RenderHost`] lifecycle, device-loss recovery, events
//! - [`renderables`]: flattening walk and per-frame classification buckets
//! - [`frustum`]: serial / partitioned-parallel frustum filtering
//! - [`renderer`]: ordered pass submission
//! - [`regulator`] / [`clock`]: frame pacing and frame timing
//! - [`viewport`]: the [`ViewportProvider`] contract and a ready-made [`Viewport`]
//! - [`settings`] / [`stats`]: renderer configuration and frame statistics
//! - `backend` (feature `wgpu-backend`): offscreen wgpu device provider

#[cfg(feature = "wgpu-backend")]
pub mod backend;
pub mod clock;
pub mod frustum;
pub mod host;
pub mod regulator;
pub mod renderables;
pub mod renderer;
pub mod settings;
pub mod stats;
pub mod viewport;

pub use clock::{FrameClock, FrameTime};
pub use frustum::{FRUSTUM_PARTITION_SIZE, FrustumStrategy, FrustumTester};
pub use host::{HostEvent, HostState, InvalidationHandle, RenderHost};
pub use regulator::FrameRegulator;
pub use renderables::{PerFrameRenderables, SeparationStats, skip_subtree};
pub use renderer::{Renderer, collect_post_effect_nodes};
pub use settings::RendererSettings;
pub use stats::{PassStats, RenderStatistics};
pub use viewport::{Viewport, ViewportProvider};
