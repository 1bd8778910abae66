//! Single-child alignment and clipping.

use glam::Vec2;
use prism_core::math::{Rect, Thickness};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HorizontalAlignment {
    Left,
    Center,
    Right,
    #[default]
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VerticalAlignment {
    Top,
    Center,
    Bottom,
    #[default]
    Stretch,
}

/// Where an element lands inside its slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Arrangement {
    pub bound: Rect,
    pub clip_enabled: bool,
}

#[derive(Clone, Copy)]
enum AxisAlign {
    Start,
    Center,
    End,
    Stretch,
}

impl From<HorizontalAlignment> for AxisAlign {
    fn from(value: HorizontalAlignment) -> Self {
        match value {
            HorizontalAlignment::Left => Self::Start,
            HorizontalAlignment::Center => Self::Center,
            HorizontalAlignment::Right => Self::End,
            HorizontalAlignment::Stretch => Self::Stretch,
        }
    }
}

impl From<VerticalAlignment> for AxisAlign {
    fn from(value: VerticalAlignment) -> Self {
        match value {
            VerticalAlignment::Top => Self::Start,
            VerticalAlignment::Center => Self::Center,
            VerticalAlignment::Bottom => Self::End,
            VerticalAlignment::Stretch => Self::Stretch,
        }
    }
}

/// Returns `(position, size, clipped)` along one axis.
fn align_axis(desired: f32, start: f32, available: f32, lead: f32, trail: f32, align: AxisAlign) -> (f32, f32, bool) {
    if !available.is_finite() {
        return (start + lead, desired, false);
    }

    let inner = (available - lead - trail).max(0.0);
    if desired > inner {
        return (start + lead, desired, true);
    }

    let size = match align {
        AxisAlign::Stretch => inner,
        _ => desired,
    };
    let offset = match align {
        AxisAlign::Start | AxisAlign::Stretch => 0.0,
        AxisAlign::Center => (inner - size) * 0.5,
        AxisAlign::End => inner - size,
    };
    (start + lead + offset, size, false)
}

/// Places content of size `desired` (margin excluded) inside `available`.
///
/// - An infinite available dimension resolves to the content size.
/// - Content larger than the space left after the margin keeps its size,
///   aligns to the leading edge and enables clipping.
/// - Otherwise the content is stretched or offset per its alignment.
#[must_use]
pub fn align(
    desired: Vec2,
    available: Rect,
    horizontal: HorizontalAlignment,
    vertical: VerticalAlignment,
    margin: Thickness,
) -> Arrangement {
    let (x, width, clip_x) = align_axis(
        desired.x,
        available.x,
        available.width,
        margin.left,
        margin.right,
        horizontal.into(),
    );
    let (y, height, clip_y) = align_axis(
        desired.y,
        available.y,
        available.height,
        margin.top,
        margin.bottom,
        vertical.into(),
    );
    Arrangement {
        bound: Rect::new(x, y, width, height),
        clip_enabled: clip_x || clip_y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_offsets_into_the_remaining_space() {
        let a = align(
            Vec2::new(20.0, 10.0),
            Rect::new(0.0, 0.0, 100.0, 50.0),
            HorizontalAlignment::Center,
            VerticalAlignment::Bottom,
            Thickness::uniform(5.0),
        );
        assert_eq!(a.bound, Rect::new(40.0, 35.0, 20.0, 10.0));
        assert!(!a.clip_enabled);
    }

    #[test]
    fn stretch_fills_the_inner_rect() {
        let a = align(
            Vec2::new(1.0, 1.0),
            Rect::new(10.0, 10.0, 100.0, 50.0),
            HorizontalAlignment::Stretch,
            VerticalAlignment::Stretch,
            Thickness::new(1.0, 2.0, 3.0, 4.0),
        );
        assert_eq!(a.bound, Rect::new(11.0, 12.0, 96.0, 44.0));
    }

    #[test]
    fn infinite_space_resolves_to_content_size() {
        let desired = Vec2::new(30.0, 12.0);
        for horizontal in [HorizontalAlignment::Stretch, HorizontalAlignment::Right] {
            let a = align(
                desired,
                Rect::new(0.0, 0.0, f32::INFINITY, f32::INFINITY),
                horizontal,
                VerticalAlignment::Stretch,
                Thickness::default(),
            );
            assert_eq!(a.bound, Rect::from_origin_size(Vec2::ZERO, desired));
            assert!(!a.clip_enabled);
        }

        // Only one axis unbounded; the margin still offsets it.
        let a = align(
            desired,
            Rect::new(0.0, 0.0, f32::INFINITY, 100.0),
            HorizontalAlignment::Center,
            VerticalAlignment::Top,
            Thickness::uniform(4.0),
        );
        assert_eq!(a.bound, Rect::new(4.0, 4.0, 30.0, 12.0));
        assert!(!a.clip_enabled);
    }
}
