//! 2D overlay scene: measure/arrange layout, alignment/clip and optional
//! bitmap caching, drawn after the 3D passes.

pub mod core;
pub mod layout;
pub mod node;
pub mod scene;

use slotmap::new_key_type;

new_key_type! {
    /// Handle to a [`SceneNode2D`] in a [`Scene2D`].
    pub struct Node2DHandle;
}

pub use self::core::{RectangleCore2D, RenderCore2D};
pub use layout::{Arrangement, HorizontalAlignment, VerticalAlignment, align};
pub use node::SceneNode2D;
pub use scene::Scene2D;
