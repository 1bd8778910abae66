//! Frustum filtering and per-frame classification over large scenes.
//!
//! Run with `cargo bench --bench frustum`.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::{Mat4, Vec3, Vec4};
use prism::render::{FrustumStrategy, FrustumTester, PerFrameRenderables, RendererSettings};
use prism::resources::headless::HeadlessDeviceProvider;
use prism::resources::{AttachContext, ColorMaterial, DeviceProvider, EffectsManager};
use prism::scene::cores::{MeshCore, MeshGeometry};
use prism::scene::{CameraCore, InvalidateTypes, NodeHandle, RenderContext, Scene, SceneNode};
use prism::RenderType;

const SIZES: [usize; 3] = [1_000, 10_000, 50_000];

/// `count` unit cubes on a square grid in the XZ plane, roughly half of them
/// behind the camera.
fn build_scene(count: usize) -> (Scene, Vec<NodeHandle>, RenderContext) {
    let provider = HeadlessDeviceProvider::new();
    let device = provider.device().expect("headless provider starts with a device");
    let mut scene = Scene::new();
    scene.set_attach_context(Some(AttachContext::new(Arc::new(EffectsManager::new(device)))));

    let side = (count as f32).sqrt().ceil() as usize;
    let half = side as f32 * 0.5;
    let mut handles = Vec::with_capacity(count);
    for i in 0..count {
        let x = (i % side) as f32 - half;
        let z = (i / side) as f32 - half;
        let core = MeshCore::new(MeshGeometry::cube(0.5), Box::new(ColorMaterial::new(Vec4::ONE)));
        let node = SceneNode::with_core(format!("cube{i}"), RenderType::Opaque, Box::new(core))
            .with_translation(Vec3::new(x, 0.0, z));
        handles.push(scene.add_node(node));
    }

    let mut ctx = RenderContext::default();
    let camera = CameraCore::perspective(60.0, 16.0 / 9.0, 0.1, 500.0).looking_at(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 0.0, -10.0));
    ctx.update_view(camera, Mat4::IDENTITY, 1920.0, 1080.0, 1.0);

    // One classification pass computes world bounds for every node.
    let mut renderables = PerFrameRenderables::default();
    renderables.separate(&mut scene, &mut ctx, &RendererSettings::default(), InvalidateTypes::SCENE_GRAPH);
    (scene, handles, ctx)
}

fn bench_frustum_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("Frustum Filter");

    for &count in &SIZES {
        let (mut scene, handles, ctx) = build_scene(count);
        let mut output = Vec::with_capacity(count);

        for (name, threshold) in [("serial", usize::MAX), ("parallel", 1)] {
            let mut tester = FrustumTester::new(threshold);
            tester.configure(true, threshold, handles.len());
            tester.rebuild_partitions(handles.len());
            let expected = if threshold == 1 {
                FrustumStrategy::Parallel
            } else {
                FrustumStrategy::Serial
            };
            assert_eq!(tester.strategy(), expected);

            group.bench_with_input(BenchmarkId::new(name, count), &count, |b, _| {
                b.iter(|| {
                    tester.filter(&ctx.frustum, &mut scene, &handles, &mut output);
                    black_box(output.len());
                });
            });
        }
    }

    group.finish();
}

fn bench_steady_state_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("Steady-State Separate");
    group.sample_size(20);

    for &count in &SIZES {
        let (mut scene, _, mut ctx) = build_scene(count);
        let settings = RendererSettings::default();
        let mut renderables = PerFrameRenderables::new(settings.frustum_parallel_threshold);
        renderables.separate(&mut scene, &mut ctx, &settings, InvalidateTypes::SCENE_GRAPH);

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let stats = renderables.separate(&mut scene, &mut ctx, &settings, InvalidateTypes::empty());
                black_box(stats.renderable);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_frustum_filter, bench_steady_state_frame);
criterion_main!(benches);
