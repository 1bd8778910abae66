//! Frustum Testing
//!
//! Filters the Opaque and Transparent buckets down to the nodes whose world
//! bounds intersect the camera frustum, writing each node's `is_in_frustum`
//! flag along the way.
//!
//! # Strategies
//!
//! | Strategy   | When                                         |
//! |------------|----------------------------------------------|
//! | `Disabled` | culling turned off, every node passes        |
//! | `Serial`   | fewer candidates than the parallel threshold |
//! | `Parallel` | at or above the threshold                    |
//!
//! The strategy is only re-selected when the toggle flips or the candidate
//! count crosses the threshold, so a scene hovering on one side of it keeps
//! the same code path frame after frame.
//!
//! The parallel path reads bounds into a flat array, tests fixed-size
//! partitions on the rayon pool into a flag array, then compacts serially.
//! Output order always equals input order.

use prism_core::math::{BoundingBox, BoundingSphere, Frustum};
use prism_scene::{NodeHandle, Scene};
use rayon::prelude::*;

/// Candidates per parallel work item.
pub const FRUSTUM_PARTITION_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrustumStrategy {
    Disabled,
    #[default]
    Serial,
    Parallel,
}

impl FrustumStrategy {
    #[must_use]
    pub fn select(enabled: bool, candidates: usize, threshold: usize) -> Self {
        if !enabled {
            Self::Disabled
        } else if candidates >= threshold {
            Self::Parallel
        } else {
            Self::Serial
        }
    }
}

/// Nodes without bounds always pass.
#[inline]
#[must_use]
pub fn test_bounds(frustum: &Frustum, bounds: Option<&(BoundingBox, BoundingSphere)>) -> bool {
    bounds.is_none_or(|(aabb, sphere)| frustum.test_bounds(aabb, sphere))
}

#[derive(Debug)]
pub struct FrustumTester {
    strategy: FrustumStrategy,
    enabled: bool,
    threshold: usize,
    above_threshold: bool,
    configured: bool,
    selections: u64,

    partitions: usize,
    bounds: Vec<Option<(BoundingBox, BoundingSphere)>>,
    flags: Vec<bool>,
}

impl FrustumTester {
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            strategy: FrustumStrategy::default(),
            enabled: true,
            threshold: threshold.max(1),
            above_threshold: false,
            configured: false,
            selections: 0,
            partitions: 0,
            bounds: Vec::new(),
            flags: Vec::new(),
        }
    }

    #[must_use]
    pub fn strategy(&self) -> FrustumStrategy {
        self.strategy
    }

    /// How many times a strategy has been selected.
    #[must_use]
    pub fn selections(&self) -> u64 {
        self.selections
    }

    #[must_use]
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Updates the toggle, threshold and candidate count, re-selecting the
    /// strategy only when one of them moves the decision. Returns whether a
    /// re-selection happened.
    pub fn configure(&mut self, enabled: bool, threshold: usize, candidates: usize) -> bool {
        let threshold = threshold.max(1);
        let above = candidates >= threshold;
        if self.configured && enabled == self.enabled && above == self.above_threshold && threshold == self.threshold {
            return false;
        }

        self.configured = true;
        self.enabled = enabled;
        self.threshold = threshold;
        self.above_threshold = above;
        self.strategy = FrustumStrategy::select(enabled, candidates, threshold);
        self.selections += 1;
        log::debug!("Frustum strategy: {:?} ({candidates} candidates)", self.strategy);
        true
    }

    /// Resizes the partition scratch space after bucket membership changed.
    pub fn rebuild_partitions(&mut self, candidates: usize) {
        self.partitions = candidates.div_ceil(FRUSTUM_PARTITION_SIZE);
        self.bounds.clear();
        self.bounds.reserve(candidates);
        self.flags.clear();
        self.flags.reserve(candidates);
    }

    /// Writes the nodes of `input` that pass into `output` (cleared first),
    /// preserving order, and updates every tested node's in-frustum flag.
    pub fn filter(&mut self, frustum: &Frustum, scene: &mut Scene, input: &[NodeHandle], output: &mut Vec<NodeHandle>) {
        output.clear();
        match self.strategy {
            FrustumStrategy::Disabled => {
                for &handle in input {
                    if let Some(node) = scene.get_mut(handle) {
                        node.set_in_frustum(true);
                        output.push(handle);
                    }
                }
            }
            FrustumStrategy::Serial => {
                for &handle in input {
                    if let Some(node) = scene.get_mut(handle) {
                        let pass = test_bounds(frustum, node.world_bounds().as_ref());
                        node.set_in_frustum(pass);
                        if pass {
                            output.push(handle);
                        }
                    }
                }
            }
            FrustumStrategy::Parallel => self.filter_parallel(frustum, scene, input, output),
        }
    }

    fn filter_parallel(&mut self, frustum: &Frustum, scene: &mut Scene, input: &[NodeHandle], output: &mut Vec<NodeHandle>) {
        self.bounds.clear();
        self.bounds
            .extend(input.iter().map(|&h| scene.get(h).and_then(prism_scene::SceneNode::world_bounds)));
        self.flags.clear();
        self.flags.resize(input.len(), false);

        self.bounds
            .par_chunks(FRUSTUM_PARTITION_SIZE)
            .zip(self.flags.par_chunks_mut(FRUSTUM_PARTITION_SIZE))
            .for_each(|(bounds, flags)| {
                for (bound, flag) in bounds.iter().zip(flags.iter_mut()) {
                    *flag = test_bounds(frustum, bound.as_ref());
                }
            });

        for (&handle, &pass) in input.iter().zip(&self.flags) {
            if let Some(node) = scene.get_mut(handle) {
                node.set_in_frustum(pass);
                if pass {
                    output.push(handle);
                }
            }
        }
    }
}
