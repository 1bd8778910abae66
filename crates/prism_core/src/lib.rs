//! Prism core: math primitives, render-type tags, ordering keys and the shared
//! error type.

pub mod errors;
pub mod math;
pub mod order_key;
pub mod render_type;

pub use errors::{PrismError, Result};
pub use order_key::OrderKey;
pub use render_type::{RenderType, Visibility};
