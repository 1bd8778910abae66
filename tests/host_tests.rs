//! Render Host Integration Tests
//!
//! Drives a [`RenderHost`] over the headless device and checks:
//! - Lifecycle transitions and the events they raise
//! - Pass submission order and post-effect gating
//! - Device-loss recovery and fatal error handling
//! - Frame regulation, async updates and post-render callbacks
//! - The 2D overlay draw after the 3D passes

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use glam::{Vec2, Vec3, Vec4};
use slotmap::Key;
use prism::core::{PrismError, RenderType, Visibility};
use prism::render::{HostEvent, HostState, RenderHost, RendererSettings, Viewport, ViewportProvider};
use prism::resources::headless::{DeviceCommand, FaultPoint, HeadlessDeviceProvider, HeadlessProbe};
use prism::resources::{ColorMaterial, RenderStage, RenderTarget};
use prism::scene::cores::{MeshCore, MeshGeometry, PostEffectCore};
use prism::scene::scene2d::{HorizontalAlignment, RectangleCore2D, VerticalAlignment};
use prism::scene::{NodeHandle, Scene2D, SceneNode, SceneNode2D};

use common::{ProbeCore, ProbeCounters, init_logger, probe_node, tagged_node};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn host_with(viewport: Viewport, settings: RendererSettings) -> (RenderHost, HeadlessProbe) {
    init_logger();
    let provider = HeadlessDeviceProvider::new();
    let probe = provider.probe();
    let host = RenderHost::new(provider, viewport, settings);
    (host, probe)
}

fn started_host(viewport: Viewport, settings: RendererSettings) -> (RenderHost, HeadlessProbe) {
    let (mut host, probe) = host_with(viewport, settings);
    host.start_d3d(WIDTH, HEIGHT).unwrap();
    (host, probe)
}

fn default_viewport() -> Viewport {
    Viewport::new(WIDTH as f32, HEIGHT as f32)
}

/// Draw tags recorded in `stage`, in submission order.
fn tags_in(probe: &HeadlessProbe, stage: RenderStage) -> Vec<u64> {
    probe.draws().into_iter().filter(|d| d.stage == stage).map(|d| d.tag).collect()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn start_announces_target_and_rendering() {
    let (host, _probe) = started_host(default_viewport(), RendererSettings::default());

    assert_eq!(host.state(), HostState::Rendering);
    assert!(host.is_initialized());
    assert_eq!(host.size(), (WIDTH, HEIGHT));
    assert_eq!(
        host.drain_events(),
        vec![
            HostEvent::NewRenderTargetTexture {
                id: 1,
                width: WIDTH,
                height: HEIGHT
            },
            HostEvent::StartRendering,
        ]
    );
}

#[test]
fn second_start_is_a_no_op() {
    let (mut host, probe) = started_host(default_viewport(), RendererSettings::default());
    host.drain_events();

    host.start_d3d(WIDTH, HEIGHT).unwrap();
    assert!(host.drain_events().is_empty());
    assert_eq!(probe.render_buffers_created(), 1);
}

#[test]
fn start_without_device_is_deferred() {
    init_logger();
    let mut host = RenderHost::new(
        HeadlessDeviceProvider::without_device(),
        default_viewport(),
        RendererSettings::default(),
    );
    host.start_d3d(WIDTH, HEIGHT).unwrap();

    assert_eq!(host.state(), HostState::Uninitialized);
    assert!(!host.is_initialized());
    assert!(host.drain_events().is_empty());
    assert!(!host.update_and_render().unwrap());
}

#[test]
fn same_size_resize_raises_nothing() {
    let (mut host, probe) = started_host(default_viewport(), RendererSettings::default());
    host.drain_events();

    host.resize(WIDTH, HEIGHT).unwrap();
    assert!(host.drain_events().is_empty());
    assert_eq!(probe.count(&DeviceCommand::Resize { width: WIDTH, height: HEIGHT }), 0);
}

#[test]
fn resize_announces_the_new_target() {
    let (mut host, probe) = started_host(default_viewport(), RendererSettings::default());
    host.drain_events();

    host.resize(1024, 768).unwrap();
    let events = host.drain_events();

    assert!(events.contains(&HostEvent::NewRenderTargetTexture {
        id: 1,
        width: 1024,
        height: 768
    }));
    assert_eq!(host.state(), HostState::Rendering);
    assert_eq!(probe.count(&DeviceCommand::Resize { width: 1024, height: 768 }), 1);
    assert_eq!(host.viewport().width, 1024.0);
}

#[test]
fn resize_before_start_only_records_the_size() {
    let (mut host, _probe) = host_with(default_viewport(), RendererSettings::default());
    host.resize(320, 200).unwrap();

    assert_eq!(host.size(), (320, 200));
    assert_eq!(host.state(), HostState::Uninitialized);
    assert!(host.drain_events().is_empty());
}

#[test]
fn pause_suspends_frames() {
    let (mut host, _probe) = started_host(default_viewport(), RendererSettings::default());
    host.stop_rendering();
    assert_eq!(host.state(), HostState::Paused);

    host.invalidation_handle().request_render();
    assert!(!host.update_and_render().unwrap());

    host.start_rendering();
    assert!(host.update_and_render().unwrap());
}

#[test]
fn end_d3d_releases_and_start_d3d_restores() {
    let mut viewport = default_viewport();
    let cube = viewport.scene_mut().add_node(common::cube_node("cube"));
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    assert!(host.scene().get(cube).unwrap().is_attached());

    host.end_d3d();
    assert_eq!(host.state(), HostState::Stopped);
    assert!(!host.is_initialized());
    assert!(!host.scene().get(cube).unwrap().is_attached());
    assert_eq!(probe.device().unwrap().live_buffers(), 0);

    host.start_d3d(WIDTH, HEIGHT).unwrap();
    assert_eq!(host.state(), HostState::Rendering);
    assert!(host.scene().get(cube).unwrap().is_attached());
    assert!(host.update_and_render().unwrap());
}

#[test]
fn disposed_host_ignores_everything() {
    let (mut host, probe) = started_host(default_viewport(), RendererSettings::default());
    host.dispose();
    host.drain_events();

    host.start_d3d(WIDTH, HEIGHT).unwrap();
    assert_eq!(host.state(), HostState::Disposed);
    assert!(host.drain_events().is_empty());
    assert!(!host.update_and_render().unwrap());
    assert_eq!(probe.render_buffers_created(), 1);
}

#[test]
fn msaa_change_hot_restarts_the_target() {
    let (mut host, probe) = started_host(default_viewport(), RendererSettings::default());
    host.drain_events();

    host.set_settings(RendererSettings {
        msaa_samples: 4,
        ..RendererSettings::default()
    })
    .unwrap();

    assert_eq!(probe.render_buffers_created(), 2);
    assert!(host.drain_events().contains(&HostEvent::NewRenderTargetTexture {
        id: 2,
        width: WIDTH,
        height: HEIGHT
    }));
    assert_eq!(host.state(), HostState::Rendering);
}

#[test]
fn hot_restart_replaces_only_the_render_buffer() {
    let mut viewport = default_viewport();
    let cube = viewport.scene_mut().add_node(common::cube_node("cube"));
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    let device = host.device().cloned().unwrap();
    let effects = host.effects().cloned().unwrap();
    host.drain_events();

    host.restart(true).unwrap();

    assert_eq!(
        host.drain_events(),
        vec![
            HostEvent::StopRendering,
            HostEvent::NewRenderTargetTexture {
                id: 2,
                width: WIDTH,
                height: HEIGHT
            },
            HostEvent::StartRendering,
        ]
    );
    assert_eq!(host.render_target_id(), Some(2));
    assert!(Arc::ptr_eq(host.device().unwrap(), &device));
    assert!(Arc::ptr_eq(host.effects().unwrap(), &effects));
    assert!(host.scene().get(cube).unwrap().is_attached());
    assert_eq!(probe.device().unwrap().live_buffers(), 4);
    assert!(host.update_and_render().unwrap());
}

#[test]
fn hot_restart_of_a_paused_host_stays_paused() {
    let (mut host, probe) = started_host(default_viewport(), RendererSettings::default());
    host.stop_rendering();

    host.restart(true).unwrap();

    assert_eq!(host.state(), HostState::Paused);
    assert_eq!(probe.render_buffers_created(), 2);
}

#[test]
fn cold_restart_rebuilds_device_resources() {
    let mut viewport = default_viewport();
    let cube = viewport.scene_mut().add_node(common::cube_node("cube"));
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    let effects = host.effects().cloned().unwrap();
    host.drain_events();

    host.restart(false).unwrap();

    assert_eq!(
        host.drain_events(),
        vec![
            HostEvent::StopRendering,
            HostEvent::NewRenderTargetTexture {
                id: 2,
                width: WIDTH,
                height: HEIGHT
            },
            HostEvent::StartRendering,
        ]
    );
    assert_eq!(host.state(), HostState::Rendering);
    assert!(host.is_initialized());
    assert!(!Arc::ptr_eq(host.effects().unwrap(), &effects));
    // Detached and attached again: mesh buffers were released and rebuilt.
    assert!(host.scene().get(cube).unwrap().is_attached());
    assert_eq!(probe.device().unwrap().live_buffers(), 4);
    assert!(host.update_and_render().unwrap());
}

#[test]
fn restart_of_a_stopped_host_starts_it() {
    let (mut host, probe) = started_host(default_viewport(), RendererSettings::default());
    host.end_d3d();

    host.restart(true).unwrap();

    assert_eq!(host.state(), HostState::Rendering);
    assert!(host.is_initialized());
    assert_eq!(probe.render_buffers_created(), 2);
}

#[test]
fn invalid_settings_are_rejected() {
    let (mut host, _probe) = started_host(default_viewport(), RendererSettings::default());
    let err = host
        .set_settings(RendererSettings {
            msaa_samples: 3,
            ..RendererSettings::default()
        })
        .unwrap_err();

    assert!(matches!(err, PrismError::InvalidSettings(_)));
    assert_eq!(host.settings().msaa_samples, 1);
}

// ============================================================================
// Passes
// ============================================================================

fn full_scene_viewport() -> (Viewport, NodeHandle) {
    let mut viewport = default_viewport();
    let scene = viewport.scene_mut();
    scene.add_node(tagged_node("pre", RenderType::PreProc, 1));
    let outlined = scene.add_node(probe_node(
        "outlined",
        RenderType::Opaque,
        ProbeCore {
            post_effect: true,
            ..ProbeCore::tagged(2)
        },
    ));
    scene.add_node(tagged_node("particle", RenderType::Particle, 3));
    scene.add_node(tagged_node("transparent", RenderType::Transparent, 4));
    scene.add_node(SceneNode::with_core(
        "outline",
        RenderType::PostProc,
        Box::new(PostEffectCore::new("Outline")),
    ));
    scene.add_node(tagged_node("screen", RenderType::ScreenSpaced, 6));
    (viewport, outlined)
}

#[test]
fn passes_run_in_fixed_order() {
    let (viewport, _) = full_scene_viewport();
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    probe.clear_commands();

    assert!(host.update_and_render().unwrap());

    assert_eq!(
        probe.stages(),
        vec![
            RenderStage::Setup,
            RenderStage::CoreUpdate,
            RenderStage::PreProc,
            RenderStage::Opaque,
            RenderStage::Particle,
            RenderStage::Transparent,
            RenderStage::PostProc,
            RenderStage::ScreenSpaced,
            RenderStage::Composite,
        ]
    );
    assert_eq!(tags_in(&probe, RenderStage::PreProc), vec![1]);
    assert_eq!(tags_in(&probe, RenderStage::Opaque), vec![2]);
    assert_eq!(tags_in(&probe, RenderStage::Particle), vec![3]);
    assert_eq!(tags_in(&probe, RenderStage::Transparent), vec![4]);
    assert_eq!(tags_in(&probe, RenderStage::ScreenSpaced), vec![6]);

    let commands = probe.commands();
    assert_eq!(commands.first(), Some(&DeviceCommand::BeginDraw));
    assert_eq!(commands.get(2), Some(&DeviceCommand::SetRenderTarget(RenderTarget::Main)));
    assert_eq!(commands.last(), Some(&DeviceCommand::Present));
}

#[test]
fn post_effect_draws_once_per_requesting_node() {
    let (viewport, outlined) = full_scene_viewport();
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    probe.clear_commands();

    host.update_and_render().unwrap();

    assert_eq!(tags_in(&probe, RenderStage::PostProc), vec![outlined.data().as_ffi()]);
    assert_eq!(probe.count(&DeviceCommand::ResolveToPingPong), 1);
    let passes = host.statistics().passes;
    assert!(passes.post_effects_ran);
    assert_eq!(passes.post_effect_nodes, 1);
}

#[test]
fn post_proc_is_skipped_without_requests() {
    let mut viewport = default_viewport();
    viewport.scene_mut().add_node(SceneNode::with_core(
        "outline",
        RenderType::PostProc,
        Box::new(PostEffectCore::new("Outline")),
    ));
    viewport.scene_mut().add_node(tagged_node("plain", RenderType::Opaque, 1));
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    probe.clear_commands();

    host.update_and_render().unwrap();

    assert!(!probe.stages().contains(&RenderStage::PostProc));
    assert_eq!(probe.count(&DeviceCommand::ResolveToPingPong), 0);
    assert!(!host.statistics().passes.post_effects_ran);
}

#[test]
fn forced_post_effects_resolve_every_frame() {
    let settings = RendererSettings {
        enable_post_effects: true,
        ..RendererSettings::default()
    };
    let (mut host, probe) = started_host(default_viewport(), settings);
    probe.clear_commands();

    host.update_and_render().unwrap();
    assert_eq!(probe.count(&DeviceCommand::ResolveToPingPong), 1);
}

#[test]
fn out_of_view_nodes_are_not_drawn() {
    let mut viewport = default_viewport();
    viewport.scene_mut().add_node(tagged_node("visible", RenderType::Opaque, 1));
    viewport
        .scene_mut()
        .add_node(tagged_node("behind", RenderType::Opaque, 2).with_translation(Vec3::new(0.0, 0.0, 50.0)));
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    probe.clear_commands();

    host.update_and_render().unwrap();

    assert_eq!(tags_in(&probe, RenderStage::Opaque), vec![1]);
    let stats = host.statistics();
    assert_eq!(stats.opaque, 2);
    assert_eq!(stats.opaque_in_frustum, 1);
}

#[test]
fn cube_and_transparent_plane_draw_once_each_without_culling() {
    let mut viewport = default_viewport();
    viewport.scene_mut().add_node(common::cube_node("cube"));
    let glass = MeshCore::new(
        MeshGeometry::plane(2.0, 2.0),
        Box::new(ColorMaterial::transparent(Vec4::new(1.0, 1.0, 1.0, 0.5))),
    );
    viewport
        .scene_mut()
        .add_node(SceneNode::with_core("glass", RenderType::Transparent, Box::new(glass)));
    let settings = RendererSettings {
        enable_render_frustum: false,
        ..RendererSettings::default()
    };
    let (mut host, probe) = started_host(viewport, settings);
    probe.clear_commands();

    assert!(host.update_and_render().unwrap());

    let stats = host.statistics();
    assert_eq!((stats.opaque_in_frustum, stats.transparent_in_frustum), (1, 1));
    assert_eq!(tags_in(&probe, RenderStage::Opaque).len(), 1);
    assert_eq!(tags_in(&probe, RenderStage::Transparent).len(), 1);
    assert_eq!(
        probe.count(&DeviceCommand::SetTechnique {
            technique: "MeshTransparent".into(),
            pass: "OIT".into()
        }),
        1
    );
}

#[test]
fn hidden_node_reappears_on_the_next_frame() {
    let mut viewport = default_viewport();
    let a = viewport.scene_mut().add_node(tagged_node("a", RenderType::Opaque, 1));
    viewport.scene_mut().add_node(tagged_node("b", RenderType::Opaque, 2));
    let (mut host, probe) = started_host(viewport, RendererSettings::default());

    probe.clear_commands();
    host.update_and_render().unwrap();
    assert_eq!(tags_in(&probe, RenderStage::Opaque), vec![1, 2]);

    host.scene_mut().set_visibility(a, Visibility::Hidden);
    probe.clear_commands();
    assert!(host.update_and_render().unwrap());
    assert_eq!(tags_in(&probe, RenderStage::Opaque), vec![2]);

    host.scene_mut().set_visibility(a, Visibility::Visible);
    probe.clear_commands();
    assert!(host.update_and_render().unwrap());
    assert_eq!(tags_in(&probe, RenderStage::Opaque), vec![1, 2]);
}

#[test]
fn node_draw_failure_skips_only_that_node() {
    let mut viewport = default_viewport();
    viewport.scene_mut().add_node(tagged_node("a", RenderType::Opaque, 1));
    viewport.scene_mut().add_node(tagged_node("b", RenderType::Opaque, 2));
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    probe.inject_fault(FaultPoint::Draw, PrismError::Backend("shader compile".into()));

    assert!(host.update_and_render().unwrap());
    assert_eq!(host.statistics().passes.failed, 1);
    assert_eq!(host.statistics().passes.drawn, 1);
    assert_eq!(host.state(), HostState::Rendering);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn device_removed_at_present_recovers_on_a_new_device() {
    let mut viewport = default_viewport();
    viewport.scene_mut().add_node(tagged_node("a", RenderType::Opaque, 1));
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    host.drain_events();
    probe.inject_fault(FaultPoint::Present, PrismError::DeviceRemoved("driver update".into()));

    assert!(!host.update_and_render().unwrap());

    let events = host.drain_events();
    assert!(events.contains(&HostEvent::NewRenderTargetTexture {
        id: 2,
        width: WIDTH,
        height: HEIGHT
    }));
    assert_eq!(events.last(), Some(&HostEvent::DeviceLost));
    assert_eq!(host.state(), HostState::Rendering);
    assert_eq!(host.render_target_id(), Some(2));
    assert_eq!(host.statistics().device_losses, 1);
    assert_eq!(probe.device_losses(), 1);
    assert_eq!(probe.device().unwrap().generation(), 2);

    probe.clear_commands();
    assert!(host.update_and_render().unwrap());
    assert_eq!(tags_in(&probe, RenderStage::Opaque), vec![1]);
}

#[test]
fn device_error_during_draw_recovers() {
    let mut viewport = default_viewport();
    viewport.scene_mut().add_node(tagged_node("a", RenderType::Opaque, 1));
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    host.drain_events();
    probe.inject_fault(FaultPoint::Draw, PrismError::DeviceHung("timeout".into()));

    assert!(!host.update_and_render().unwrap());
    assert!(host.drain_events().contains(&HostEvent::DeviceLost));
    assert_eq!(host.state(), HostState::Rendering);
}

#[test]
fn device_error_during_resize_recovers() {
    let (mut host, probe) = started_host(default_viewport(), RendererSettings::default());
    host.drain_events();
    probe.inject_fault(FaultPoint::Resize, PrismError::DeviceReset("reset".into()));

    host.resize(640, 480).unwrap();

    let events = host.drain_events();
    assert!(events.contains(&HostEvent::DeviceLost));
    assert!(events.contains(&HostEvent::NewRenderTargetTexture {
        id: 2,
        width: 640,
        height: 480
    }));
    assert_eq!(host.size(), (640, 480));
}

#[test]
fn unknown_frame_error_stops_the_host() {
    let (mut host, probe) = started_host(default_viewport(), RendererSettings::default());
    host.drain_events();
    probe.inject_fault(FaultPoint::BeginDraw, PrismError::Backend("boom".into()));

    let err = host.update_and_render().unwrap_err();

    assert_eq!(err, PrismError::Backend("boom".into()));
    assert_eq!(host.state(), HostState::Stopped);
    assert!(!host.is_initialized());
    let events = host.drain_events();
    assert_eq!(
        events,
        vec![
            HostEvent::StopRendering,
            HostEvent::ExceptionOccurred("Backend error: boom".into()),
        ]
    );
}

#[test]
fn failed_recovery_is_fatal() {
    let (mut host, probe) = started_host(default_viewport(), RendererSettings::default());
    host.drain_events();
    probe.inject_fault(FaultPoint::Present, PrismError::DeviceLost("gone".into()));
    probe.inject_fault(FaultPoint::CreateRenderBuffer, PrismError::Backend("no adapter".into()));

    assert!(host.update_and_render().is_err());
    assert_eq!(host.state(), HostState::Stopped);
    assert!(
        host.drain_events()
            .iter()
            .any(|e| matches!(e, HostEvent::ExceptionOccurred(msg) if msg.contains("no adapter")))
    );
}

// ============================================================================
// Regulation & Background Work
// ============================================================================

#[test]
fn one_request_renders_a_short_burst() {
    let (mut host, _probe) = started_host(default_viewport(), RendererSettings::default());

    assert!(host.update_and_render().unwrap());
    assert!(host.update_and_render().unwrap());
    assert!(!host.update_and_render().unwrap());
    assert_eq!(host.statistics().frames_rendered, 2);
}

#[test]
fn min_update_count_is_configurable() {
    let settings = RendererSettings {
        min_update_count: 4,
        ..RendererSettings::default()
    };
    let (mut host, _probe) = started_host(default_viewport(), settings);

    let mut frames = 0;
    while host.update_and_render().unwrap() {
        frames += 1;
        assert!(frames <= 4);
    }
    assert_eq!(frames, 4);
}

#[test]
fn requests_from_other_threads_wake_the_host() {
    let (mut host, _probe) = started_host(default_viewport(), RendererSettings::default());
    while host.update_and_render().unwrap() {}

    let handle = host.invalidation_handle();
    thread::spawn(move || handle.request_render()).join().unwrap();

    assert!(host.update_and_render().unwrap());
}

#[test]
fn async_updates_run_in_background_and_inline() {
    for background in [true, false] {
        let counters = ProbeCounters::default();
        let mut viewport = default_viewport();
        viewport.scene_mut().add_node(probe_node(
            "sparks",
            RenderType::Particle,
            ProbeCore {
                async_update: true,
                counters: counters.clone(),
                ..ProbeCore::tagged(1)
            },
        ));
        let settings = RendererSettings {
            enable_async_scene_update: background,
            ..RendererSettings::default()
        };
        let (mut host, _probe) = started_host(viewport, settings);

        host.update_and_render().unwrap();
        assert_eq!(counters.async_runs.load(Ordering::SeqCst), 1);
        assert_eq!(host.statistics().async_updates, 1);
    }
}

#[test]
fn panicking_async_update_does_not_mask_the_frame_result() {
    let unstable_viewport = || {
        let mut viewport = default_viewport();
        viewport.scene_mut().add_node(probe_node(
            "unstable",
            RenderType::Particle,
            ProbeCore {
                async_update: true,
                async_panics: true,
                ..ProbeCore::tagged(1)
            },
        ));
        viewport
    };

    // Healthy frame: the panic is logged and the frame still presents.
    let (mut host, probe) = started_host(unstable_viewport(), RendererSettings::default());
    assert!(host.update_and_render().unwrap());
    assert_eq!(host.statistics().async_updates, 0);
    assert_eq!(probe.count(&DeviceCommand::Present), 1);

    // Failing frame: the frame error wins over the panicked task.
    let (mut host, probe) = started_host(unstable_viewport(), RendererSettings::default());
    host.drain_events();
    probe.inject_fault(FaultPoint::Present, PrismError::Backend("present failed".into()));

    let err = host.update_and_render().unwrap_err();

    assert_eq!(err, PrismError::Backend("present failed".into()));
    assert_eq!(host.state(), HostState::Stopped);
    assert!(
        host.drain_events()
            .contains(&HostEvent::ExceptionOccurred("Backend error: present failed".into()))
    );
}

#[test]
fn post_render_callbacks_run_after_present() {
    let counters = ProbeCounters::default();
    let mut viewport = default_viewport();
    viewport.scene_mut().add_node(probe_node(
        "callback",
        RenderType::Opaque,
        ProbeCore {
            post_render: true,
            counters: counters.clone(),
            ..ProbeCore::tagged(1)
        },
    ));
    let (mut host, _probe) = started_host(viewport, RendererSettings::default());

    host.update_and_render().unwrap();
    host.update_and_render().unwrap();
    assert_eq!(counters.post_renders.load(Ordering::SeqCst), 2);
    assert_eq!(counters.renders.load(Ordering::SeqCst), 2);
}

#[test]
fn triangle_count_covers_drawn_nodes() {
    let mut viewport = default_viewport();
    viewport.scene_mut().add_node(common::cube_node("cube"));
    let settings = RendererSettings {
        show_triangle_count: true,
        ..RendererSettings::default()
    };
    let (mut host, _probe) = started_host(viewport, settings);

    host.update_and_render().unwrap();
    assert_eq!(
        host.statistics().triangle_count,
        Some(MeshGeometry::cube(1.0).triangle_count())
    );
}

// ============================================================================
// Overlay
// ============================================================================

fn overlay_viewport(bitmap_cache: bool) -> Viewport {
    let mut overlay = Scene2D::new();
    overlay.add_node(
        SceneNode2D::new("badge")
            .with_core(Box::new(RectangleCore2D::new(Vec2::new(40.0, 20.0), [1.0, 0.0, 0.0, 1.0])))
            .with_alignment(HorizontalAlignment::Right, VerticalAlignment::Top)
            .with_bitmap_cache(bitmap_cache),
    );
    default_viewport().with_overlay(overlay)
}

#[test]
fn overlay_draws_between_end_draw_and_present() {
    let (mut host, probe) = started_host(overlay_viewport(false), RendererSettings::default());
    probe.clear_commands();

    host.update_and_render().unwrap();

    let commands = probe.commands();
    let position = |needle: &DeviceCommand| commands.iter().position(|c| c == needle).unwrap();
    let end_draw = position(&DeviceCommand::EndDraw);
    let begin_2d = position(&DeviceCommand::Begin2D);
    let end_2d = position(&DeviceCommand::End2D);
    let present = position(&DeviceCommand::Present);
    assert!(end_draw < begin_2d && begin_2d < end_2d && end_2d < present);
    assert_eq!(probe.stages().last(), Some(&RenderStage::Overlay2D));

    let fills: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            DeviceCommand::FillRect(rect) => Some(*rect),
            _ => None,
        })
        .collect();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].size(), Vec2::new(40.0, 20.0));
}

#[test]
fn cached_overlay_node_renders_into_its_bitmap_once() {
    let (mut host, probe) = started_host(overlay_viewport(true), RendererSettings::default());
    probe.clear_commands();

    host.update_and_render().unwrap();
    host.update_and_render().unwrap();

    assert_eq!(probe.count(&DeviceCommand::EndBitmap), 1);
    let bitmap_draws = probe
        .commands()
        .iter()
        .filter(|c| matches!(c, DeviceCommand::DrawBitmap(..)))
        .count();
    assert_eq!(bitmap_draws, 2);
}

#[test]
fn empty_overlay_is_not_drawn() {
    let viewport = default_viewport().with_overlay(Scene2D::new());
    let (mut host, probe) = started_host(viewport, RendererSettings::default());
    probe.clear_commands();

    host.update_and_render().unwrap();
    assert_eq!(probe.count(&DeviceCommand::Begin2D), 0);
}
