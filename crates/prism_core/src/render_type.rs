//! Render-type tags and node visibility.

use serde::{Deserialize, Serialize};

/// Mutually exclusive bucket tag governing which pass consumes a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RenderType {
    #[default]
    Opaque,
    Transparent,
    Particle,
    Light,
    PreProc,
    PostProc,
    ScreenSpaced,
}

impl RenderType {
    /// Every drawable render type, in pass order.
    pub const ALL: [RenderType; 7] = [
        RenderType::PreProc,
        RenderType::Light,
        RenderType::Opaque,
        RenderType::Particle,
        RenderType::Transparent,
        RenderType::PostProc,
        RenderType::ScreenSpaced,
    ];

    /// Default sort priority for nodes of this type. Smaller draws first.
    #[must_use]
    pub const fn default_priority(self) -> u32 {
        match self {
            Self::PreProc => 0,
            Self::Light => 10,
            Self::Opaque => 100,
            Self::Particle => 200,
            Self::Transparent => 300,
            Self::PostProc => 400,
            Self::ScreenSpaced => 500,
        }
    }
}

/// Node visibility.
///
/// `Hidden` keeps layout space in 2D scenes, `Collapsed` does not. Neither is
/// rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
    Collapsed,
}

impl Visibility {
    #[inline]
    #[must_use]
    pub fn is_visible(self) -> bool {
        matches!(self, Self::Visible)
    }
}
