//! wgpu Offscreen Backend
//!
//! A [`DeviceProvider`](prism_resources::DeviceProvider) that renders into
//! offscreen wgpu textures. The host treats it like any other device: the
//! back buffer texture is the surface an embedding application samples or
//! reads back.
//!
//! # Coverage
//!
//! | Technique        | Pipeline                    |
//! |------------------|-----------------------------|
//! | `Mesh`           | lit mesh, opaque            |
//! | `MeshTransparent`| lit mesh, alpha blended     |
//! | `ScreenSpaced`   | lit mesh, opaque            |
//! | anything else    | counted as a skipped draw   |
//!
//! The 2D overlay is drawn as solid fills and bitmap copies into the back
//! buffer. Targets are single-sampled; a multisample request is logged and
//! ignored.
//!
//! # Frame encoding
//!
//! The context records operations while the host walks its passes and encodes
//! them into a command buffer at `end_draw` (3D passes) and `present` (the
//! overlay). `present` submits both. A lost device surfaces as
//! [`PrismError::DeviceLost`](prism_core::PrismError::DeviceLost) from the next
//! context or buffer call, which drives the host's recovery path.

mod context;
mod device;

pub use context::{WgpuContext, WgpuRenderBuffer};
pub use device::{TARGET_FORMAT, WgpuDevice, WgpuDeviceProvider};
