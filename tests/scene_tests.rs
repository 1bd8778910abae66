//! Scene Graph Integration Tests
//!
//! Tests for:
//! - Topology: add, reparent, remove, pre-order flattening
//! - Attachment: auto-attach with a host context, lazy cores, detach
//! - Invalidation: dirty-flag propagation and scene-level requests

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Mat4, Vec3};
use prism::core::{RenderType, Visibility};
use prism::resources::headless::HeadlessDeviceProvider;
use prism::resources::{AttachContext, DeviceProvider, EffectsManager};
use prism::scene::{DirtyFlags, InvalidateTypes, RenderCore, Scene, SceneNode};

use common::{ProbeCore, attach_context, tagged_node, view_context};

// ============================================================================
// Topology
// ============================================================================

#[test]
fn flatten_is_pre_order_with_depth() {
    let mut scene = Scene::new();
    let a = scene.add_node(SceneNode::new("a"));
    let a1 = scene.add_child(a, SceneNode::new("a1")).unwrap();
    let a1x = scene.add_child(a1, SceneNode::new("a1x")).unwrap();
    let a2 = scene.add_child(a, SceneNode::new("a2")).unwrap();
    let b = scene.add_node(SceneNode::new("b"));

    let mut flat = Vec::new();
    scene.flatten(&mut flat);

    let order: Vec<_> = flat.iter().map(|f| (f.handle, f.depth)).collect();
    assert_eq!(order, vec![(a, 0), (a1, 1), (a1x, 2), (a2, 1), (b, 0)]);
}

#[test]
fn add_child_to_stale_parent_fails() {
    let mut scene = Scene::new();
    let parent = scene.add_node(SceneNode::new("parent"));
    assert!(scene.remove_node(parent));
    assert!(scene.add_child(parent, SceneNode::new("orphan")).is_err());
}

#[test]
fn remove_node_drops_the_subtree() {
    let mut scene = Scene::new();
    let root = scene.add_node(SceneNode::new("root"));
    let child = scene.add_child(root, SceneNode::new("child")).unwrap();
    let grandchild = scene.add_child(child, SceneNode::new("grandchild")).unwrap();
    scene.take_invalidation();

    assert!(scene.remove_node(child));
    assert!(scene.get(grandchild).is_none());
    assert!(scene.get(root).unwrap().children().is_empty());
    assert!(scene.pending_invalidation().contains(InvalidateTypes::SCENE_GRAPH));
    assert!(!scene.remove_node(child));
}

#[test]
fn reparent_refuses_cycles() {
    let mut scene = Scene::new();
    let root = scene.add_node(SceneNode::new("root"));
    let child = scene.add_child(root, SceneNode::new("child")).unwrap();

    scene.reparent(root, child).unwrap();
    assert_eq!(scene.get(child).unwrap().parent(), Some(root));
    assert_eq!(scene.roots(), &[root]);
}

#[test]
fn reparent_moves_root_under_new_parent() {
    let mut scene = Scene::new();
    let a = scene.add_node(SceneNode::new("a"));
    let b = scene.add_node(SceneNode::new("b"));
    scene.reparent(b, a).unwrap();

    assert_eq!(scene.roots(), &[a]);
    assert_eq!(scene.get(a).unwrap().children(), &[b]);
    assert_eq!(scene.find("b"), Some(b));
}

#[test]
fn child_transform_composes_with_parent() {
    let mut scene = Scene::new();
    scene.set_attach_context(Some(attach_context()));
    let parent = scene.add_node(SceneNode::new("parent").with_translation(Vec3::new(1.0, 0.0, 0.0)));
    let child = scene
        .add_child(parent, SceneNode::new("child").with_translation(Vec3::new(0.0, 2.0, 0.0)))
        .unwrap();

    let ctx = view_context();
    scene.update_node(parent, &ctx).unwrap();
    scene.update_node(child, &ctx).unwrap();

    let world = scene.get(child).unwrap().total_transform().transform_point3(Vec3::ZERO);
    assert_eq!(world, Vec3::new(1.0, 2.0, 0.0));

    scene.set_model_matrix(parent, Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
    scene.update_node(parent, &ctx).unwrap();
    scene.update_node(child, &ctx).unwrap();
    let world = scene.get(child).unwrap().total_transform().transform_point3(Vec3::ZERO);
    assert_eq!(world, Vec3::new(5.0, 2.0, 0.0));
}

// ============================================================================
// Attachment
// ============================================================================

#[test]
fn nodes_attach_when_a_context_is_set() {
    let mut scene = Scene::new();
    let early = scene.add_node(tagged_node("early", RenderType::Opaque, 1));
    assert!(!scene.get(early).unwrap().is_attached());

    scene.set_attach_context(Some(attach_context()));
    scene.attach_all().unwrap();
    assert!(scene.get(early).unwrap().is_attached());

    let late = scene.add_node(tagged_node("late", RenderType::Opaque, 2));
    assert!(scene.get(late).unwrap().is_attached());
}

#[test]
fn children_of_detached_parents_stay_detached() {
    let mut scene = Scene::new();
    let parent = scene.add_node(SceneNode::new("parent"));
    scene.set_attach_context(Some(attach_context()));
    let child = scene.add_child(parent, SceneNode::new("child")).unwrap();
    assert!(!scene.get(child).unwrap().is_attached());

    scene.attach_all().unwrap();
    assert!(scene.get(child).unwrap().is_attached());
}

#[test]
fn lazy_core_is_built_on_first_attach() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let mut scene = Scene::new();
    let node = scene.add_node(SceneNode::with_lazy_core("lazy", RenderType::Opaque, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::new(ProbeCore::default()) as Box<dyn RenderCore>
    }));
    assert_eq!(built.load(Ordering::SeqCst), 0);

    scene.set_attach_context(Some(attach_context()));
    scene.attach_all().unwrap();
    scene.detach_all();
    scene.attach_all().unwrap();

    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert!(scene.get(node).unwrap().core().is_some());
}

#[test]
fn mesh_resources_are_released_on_detach() {
    let provider = HeadlessDeviceProvider::new();
    let probe = provider.probe();
    let device = provider.device().unwrap();
    let mut scene = Scene::new();
    scene.set_attach_context(Some(AttachContext::new(Arc::new(EffectsManager::new(device)))));

    let handle = scene.add_node(common::cube_node("cube"));
    let live = probe.device().unwrap();
    // vertices, indices, model constants, material constants
    assert_eq!(live.live_buffers(), 4);

    scene.detach(handle);
    assert!(!scene.get(handle).unwrap().is_attached());
    assert_eq!(live.live_buffers(), 0);

    scene.attach_all().unwrap();
    assert_eq!(live.live_buffers(), 4);
    scene.remove_node(handle);
    assert_eq!(live.live_buffers(), 0);
}

#[test]
fn renderable_requires_visible_and_attached() {
    let mut scene = Scene::new();
    let node = scene.add_node(tagged_node("n", RenderType::Opaque, 0));
    assert!(!scene.get(node).unwrap().is_renderable());

    scene.set_attach_context(Some(attach_context()));
    scene.attach_all().unwrap();
    assert!(scene.get(node).unwrap().is_renderable());

    scene.set_visibility(node, Visibility::Hidden);
    assert!(!scene.get(node).unwrap().is_renderable());
}

// ============================================================================
// Invalidation
// ============================================================================

#[test]
fn invalidation_propagates_to_ancestors() {
    let mut scene = Scene::new();
    let root = scene.add_node(SceneNode::new("root"));
    let mid = scene.add_child(root, SceneNode::new("mid")).unwrap();
    let leaf = scene.add_child(mid, SceneNode::new("leaf")).unwrap();

    scene.invalidate(leaf, DirtyFlags::VISUAL);
    for handle in [root, mid, leaf] {
        assert!(scene.get(handle).unwrap().dirty().contains(DirtyFlags::VISUAL));
    }
}

#[test]
fn invalidation_stops_at_an_already_dirty_ancestor() {
    let mut scene = Scene::new();
    let root = scene.add_node(SceneNode::new("root"));
    let mid = scene.add_child(root, SceneNode::new("mid")).unwrap();
    let leaf = scene.add_child(mid, SceneNode::new("leaf")).unwrap();

    // Only `mid` carries the bit; the walk from `leaf` must not reach `root`.
    scene.invalidate(mid, DirtyFlags::ARRANGE);
    let root_before = scene.get(root).unwrap().dirty();
    assert!(root_before.contains(DirtyFlags::ARRANGE));

    scene.update_node(root, &view_context()).unwrap();
    assert!(scene.get(root).unwrap().dirty().is_empty());

    scene.invalidate(leaf, DirtyFlags::ARRANGE);
    assert!(scene.get(leaf).unwrap().dirty().contains(DirtyFlags::ARRANGE));
    assert!(!scene.get(root).unwrap().dirty().contains(DirtyFlags::ARRANGE));
}

#[test]
fn attached_invalidation_requests_a_render() {
    let mut scene = Scene::new();
    let node = scene.add_node(SceneNode::new("n"));
    scene.take_invalidation();

    scene.invalidate_visual(node);
    assert!(scene.take_invalidation().is_empty());

    scene.set_attach_context(Some(attach_context()));
    scene.attach_all().unwrap();
    scene.take_invalidation();

    scene.invalidate_visual(node);
    assert_eq!(scene.take_invalidation(), InvalidateTypes::RENDER);
}

#[test]
fn render_type_change_invalidates_buckets() {
    let mut scene = Scene::new();
    let node = scene.add_node(tagged_node("n", RenderType::Opaque, 0));
    scene.take_invalidation();

    scene.set_render_type(node, RenderType::Transparent);
    let pending = scene.take_invalidation();
    assert!(pending.contains(InvalidateTypes::PER_FRAME_RENDERABLES));
    assert_eq!(
        scene.get(node).unwrap().render_priority(),
        RenderType::Transparent.default_priority()
    );

    scene.set_render_type(node, RenderType::Transparent);
    assert!(scene.take_invalidation().is_empty());
}
