//! Prism scene: the 3D scene graph, the 2D overlay graph and render cores.
//!
//! - [`scene`] / [`node`]: slotmap arena of [`SceneNode`]s, attach/detach,
//!   pre-order flattening and per-node updates
//! - [`invalidation`]: dirty flags with upward propagation
//! - [`core`]: the [`RenderCore`] capability trait
//! - [`cores`]: mesh, light, particle, post-effect and screen-spaced cores
//! - [`scene2d`]: overlay nodes with measure/arrange and alignment
//! - [`camera`] / [`context`]: camera state and the per-frame [`RenderContext`]

pub mod camera;
pub mod context;
pub mod core;
pub mod cores;
pub mod invalidation;
pub mod node;
pub mod scene;
pub mod scene2d;

pub use camera::{CameraCore, Projection};
pub use context::RenderContext;
pub use self::core::{CoreFactory, RenderCore};
pub use invalidation::{DirtyFlags, InvalidateTypes};
pub use node::SceneNode;
pub use scene::{FlattenedNode, NodeHandle, Scene};
pub use scene2d::{Node2DHandle, Scene2D, SceneNode2D};
