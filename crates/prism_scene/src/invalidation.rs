//! Dirty flags and upward invalidation.
//!
//! Both scene graphs (3D and 2D) store nodes in a `SlotMap` with a parent
//! handle. Invalidating a node sets a bit on it and then walks the parent
//! chain, setting the same bit on each ancestor until one already carries it.
//! A second invalidation of the same bit therefore stops after one step.

use bitflags::bitflags;
use slotmap::{Key, SlotMap};

bitflags! {
    /// Per-node dirty bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u8 {
        const MEASURE   = 1 << 0;
        const ARRANGE   = 1 << 1;
        const TRANSFORM = 1 << 2;
        const VISUAL    = 1 << 3;
    }
}

bitflags! {
    /// Scene-level invalidation drained by the host once per frame.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct InvalidateTypes: u8 {
        /// Something visible changed; draw another frame.
        const RENDER                = 1 << 0;
        /// Topology changed; the flattened list must be rebuilt.
        const SCENE_GRAPH           = 1 << 1;
        /// Bucket membership must be recomputed.
        const PER_FRAME_RENDERABLES = 1 << 2;
    }
}

/// Node view used by [`propagate`].
pub(crate) trait DirtyNode<K: Key> {
    fn dirty_mut(&mut self) -> &mut DirtyFlags;
    fn parent(&self) -> Option<K>;
    fn is_attached(&self) -> bool;
}

/// Sets `flag` on `start` and on every ancestor up to (excluding) the first
/// one that already has it.
///
/// Returns `Some(attached)` for the start node, `None` if the handle is stale.
pub(crate) fn propagate<K, N>(nodes: &mut SlotMap<K, N>, start: K, flag: DirtyFlags) -> Option<bool>
where
    K: Key,
    N: DirtyNode<K>,
{
    let node = nodes.get_mut(start)?;
    node.dirty_mut().insert(flag);
    let attached = node.is_attached();

    let mut cursor = node.parent();
    while let Some(handle) = cursor {
        let Some(ancestor) = nodes.get_mut(handle) else {
            break;
        };
        if ancestor.dirty_mut().contains(flag) {
            break;
        }
        ancestor.dirty_mut().insert(flag);
        cursor = ancestor.parent();
    }

    Some(attached)
}
