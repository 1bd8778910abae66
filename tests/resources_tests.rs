//! Device Resource Tests
//!
//! Tests for:
//! - Buffer proxies: immutable, dynamic growth, constant shadow copies
//! - Effects manager: technique registry and the constant-buffer pool
//! - Texture repository: caching, loader callbacks, failure paths
//! - Color material attach/update/detach

mod common;

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use parking_lot::Mutex;
use prism::core::{PrismError, Result};
use prism::resources::effects::techniques;
use prism::resources::headless::{DeviceCommand, FaultPoint, HeadlessDeviceProvider, HeadlessProbe};
use prism::resources::{
    BufferUsage, ColorMaterial, ConstantBufferProxy, DeviceProvider, DynamicBufferProxy, EffectsManager,
    GraphicsDevice, ImmutableBufferProxy, MaterialVariable, ModelConstants, RenderBuffer, RenderBufferDesc,
    Technique, TextureFormat, TextureInfo, TextureInfoLoader, TextureModel,
};
use uuid::Uuid;

struct Harness {
    probe: HeadlessProbe,
    device: Arc<dyn GraphicsDevice>,
    buffer: Box<dyn RenderBuffer>,
}

impl Harness {
    fn new() -> Self {
        common::init_logger();
        let mut provider = HeadlessDeviceProvider::new();
        let probe = provider.probe();
        let device = provider.device().unwrap();
        let buffer = provider
            .create_render_buffer(&RenderBufferDesc {
                width: 64,
                height: 64,
                msaa_samples: 1,
            })
            .unwrap();
        Self { probe, device, buffer }
    }

    fn live_buffers(&self) -> usize {
        self.probe.device().unwrap().live_buffers()
    }

    fn live_textures(&self) -> usize {
        self.probe.device().unwrap().live_textures()
    }

    fn writes(&self) -> usize {
        self.probe
            .commands()
            .iter()
            .filter(|c| matches!(c, DeviceCommand::WriteBuffer { .. }))
            .count()
    }
}

// ============================================================================
// Buffers
// ============================================================================

#[test]
fn immutable_buffer_records_layout() {
    let h = Harness::new();
    let positions = [[0.0_f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

    let mut proxy = ImmutableBufferProxy::create(h.device.as_ref(), "triangle", BufferUsage::VERTEX, &positions).unwrap();
    assert_eq!(proxy.element_count(), 3);
    assert_eq!(proxy.stride(), 12);
    assert!(proxy.buffer().is_some());
    assert_eq!(h.live_buffers(), 1);

    proxy.dispose(h.device.as_ref());
    assert!(proxy.buffer().is_none());
    assert_eq!(h.live_buffers(), 0);
}

#[test]
fn buffer_creation_fault_propagates() {
    let h = Harness::new();
    h.probe
        .inject_fault(FaultPoint::CreateResource, PrismError::resource("buffer", "out of memory"));

    let err = ImmutableBufferProxy::create(h.device.as_ref(), "indices", BufferUsage::INDEX, &[0_u32, 1, 2]).unwrap_err();
    assert!(matches!(err, PrismError::ResourceCreation { kind: "buffer", .. }));
    assert_eq!(h.live_buffers(), 0);
    assert_eq!(h.probe.pending_faults(), 0);
}

#[test]
fn dynamic_buffer_grows_to_next_power_of_two() {
    let mut h = Harness::new();
    let mut proxy = DynamicBufferProxy::new("instances", BufferUsage::VERTEX);

    proxy.upload(h.device.as_ref(), h.buffer.context(), &[1.0_f32; 3]).unwrap();
    let first = proxy.buffer().unwrap();
    assert_eq!(proxy.capacity(), 16);
    assert_eq!(proxy.element_count(), 3);

    proxy.upload(h.device.as_ref(), h.buffer.context(), &[1.0_f32; 4]).unwrap();
    assert_eq!(proxy.buffer(), Some(first));

    proxy.upload(h.device.as_ref(), h.buffer.context(), &[1.0_f32; 5]).unwrap();
    assert_ne!(proxy.buffer(), Some(first));
    assert_eq!(proxy.capacity(), 32);
    assert_eq!(h.live_buffers(), 1);
    assert_eq!(h.writes(), 3);
}

#[test]
fn empty_upload_keeps_the_allocation() {
    let mut h = Harness::new();
    let mut proxy = DynamicBufferProxy::structured("particles");
    proxy.upload(h.device.as_ref(), h.buffer.context(), &[0_u32; 8]).unwrap();

    proxy.upload::<u32>(h.device.as_ref(), h.buffer.context(), &[]).unwrap();
    assert_eq!(proxy.element_count(), 0);
    assert_eq!(proxy.capacity(), 32);
    assert_eq!(h.writes(), 1);

    proxy.dispose(h.device.as_ref());
    assert_eq!(h.live_buffers(), 0);
}

#[test]
fn constant_buffer_flushes_only_changes() {
    let mut h = Harness::new();
    let size = size_of::<ModelConstants>() as u64;
    let mut proxy = ConstantBufferProxy::create(h.device.as_ref(), "model", size).unwrap();
    assert!(proxy.is_dirty());
    assert!(proxy.flush(h.buffer.context()).unwrap());
    assert!(!proxy.flush(h.buffer.context()).unwrap());

    let constants = ModelConstants::from_world(Mat4::from_translation(Vec3::X));
    proxy.write(0, &constants);
    assert!(proxy.flush(h.buffer.context()).unwrap());

    proxy.write(0, &constants);
    assert!(!proxy.is_dirty());
    assert_eq!(h.writes(), 2);
    assert_eq!(bytemuck::bytes_of(&constants).len() as u64, proxy.size());

    proxy.dispose(h.device.as_ref());
    assert_eq!(h.live_buffers(), 0);
}

#[test]
fn constant_writes_past_the_end_are_truncated() {
    let mut h = Harness::new();
    let mut proxy = ConstantBufferProxy::create(h.device.as_ref(), "small", 8).unwrap();
    proxy.flush(h.buffer.context()).unwrap();

    proxy.write(8, &1_u32);
    assert!(!proxy.is_dirty());

    proxy.write(4, &u64::MAX);
    assert!(proxy.is_dirty());
    assert_eq!(proxy.size(), 8);
}

// ============================================================================
// Effects
// ============================================================================

#[test]
fn default_techniques_are_registered() {
    let h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));

    for name in [
        techniques::MESH,
        techniques::TRANSPARENT,
        techniques::PARTICLE,
        techniques::LIGHT,
        techniques::POST_EFFECT,
        techniques::SCREEN_SPACED,
    ] {
        assert!(effects.technique(name).is_ok(), "{name} missing");
    }
    let post = effects.technique(techniques::POST_EFFECT).unwrap();
    assert!(post.has_pass("Blur"));
    assert_eq!(post.default_pass(), "Outline");
}

#[test]
fn unknown_technique_is_an_error() {
    let h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));

    assert_eq!(
        effects.technique("Toon").unwrap_err(),
        PrismError::TechniqueNotFound("Toon".into())
    );

    effects.register_technique(Technique::new("Toon", &[]));
    assert_eq!(effects.technique("Toon").unwrap().default_pass(), "Default");
}

#[test]
fn constant_buffers_are_pooled_by_name_and_size() {
    let h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));

    let a = effects.constant_buffer("Lights", 256).unwrap();
    let b = effects.constant_buffer("Lights", 256).unwrap();
    let c = effects.constant_buffer("Lights", 512).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(effects.constant_buffer_count(), 2);
    assert_eq!(h.live_buffers(), 2);

    effects.release();
    assert_eq!(effects.constant_buffer_count(), 0);
    assert_eq!(h.live_buffers(), 0);
}

// ============================================================================
// Textures
// ============================================================================

#[derive(Default)]
struct CheckerLoader {
    loads: Mutex<usize>,
    completions: Mutex<Vec<(Uuid, bool)>>,
    fail: bool,
    short_data: bool,
}

impl TextureInfoLoader for CheckerLoader {
    fn load(&self, _guid: Uuid) -> Result<TextureInfo> {
        *self.loads.lock() += 1;
        if self.fail {
            return Err(PrismError::TextureLoad("file not found".into()));
        }
        let len = if self.short_data { 4 } else { 2 * 2 * 4 };
        Ok(TextureInfo::new("checker", 2, 2, TextureFormat::Rgba8Unorm, vec![255; len]))
    }

    fn complete(&self, guid: Uuid, result: std::result::Result<&TextureInfo, &PrismError>) {
        self.completions.lock().push((guid, result.is_ok()));
    }
}

#[test]
fn texture_models_load_once_per_device() {
    let h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));
    let loader = Arc::new(CheckerLoader::default());
    let model = TextureModel::new(loader.clone());

    let first = effects.textures().load(h.device.as_ref(), &model).unwrap();
    let second = effects.textures().load(h.device.as_ref(), &model).unwrap();

    assert_eq!(first, second);
    assert_eq!((first.width, first.height), (2, 2));
    assert_eq!(*loader.loads.lock(), 1);
    assert_eq!(*loader.completions.lock(), vec![(model.guid, true)]);
    assert!(effects.textures().contains(&model.guid));
    assert_eq!(h.live_textures(), 1);

    assert!(effects.textures().release(h.device.as_ref(), &model.guid));
    assert!(!effects.textures().release(h.device.as_ref(), &model.guid));
    assert_eq!(h.live_textures(), 0);
}

#[test]
fn failed_texture_load_completes_with_error() {
    let h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));
    let loader = Arc::new(CheckerLoader {
        fail: true,
        ..CheckerLoader::default()
    });
    let model = TextureModel::new(loader.clone());

    let err = effects.textures().load(h.device.as_ref(), &model).unwrap_err();
    assert!(matches!(err, PrismError::TextureLoad(_)));
    assert_eq!(*loader.completions.lock(), vec![(model.guid, false)]);
    assert!(effects.textures().is_empty());
}

#[test]
fn truncated_pixel_data_is_rejected() {
    let h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));
    let loader = Arc::new(CheckerLoader {
        short_data: true,
        ..CheckerLoader::default()
    });
    let model = TextureModel::new(loader.clone());

    assert!(effects.textures().load(h.device.as_ref(), &model).is_err());
    assert_eq!(*loader.completions.lock(), vec![(model.guid, false)]);
    assert_eq!(h.live_textures(), 0);
}

#[test]
fn releasing_effects_clears_textures() {
    let h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));
    for _ in 0..3 {
        let model = TextureModel::new(Arc::new(CheckerLoader::default()));
        effects.textures().load(h.device.as_ref(), &model).unwrap();
    }
    assert_eq!(effects.textures().len(), 3);

    effects.release();
    assert!(effects.textures().is_empty());
    assert_eq!(h.live_textures(), 0);
}

// ============================================================================
// Materials
// ============================================================================

#[test]
fn color_material_uploads_only_when_changed() {
    let mut h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));
    let mut material = ColorMaterial::new(Vec4::new(1.0, 0.5, 0.25, 1.0));

    material.attach(&effects).unwrap();
    assert!(material.is_attached());
    assert_eq!(material.technique(), techniques::MESH);
    assert_eq!(h.live_buffers(), 1);

    material.update_constant_buffer(h.buffer.context()).unwrap();
    material.update_constant_buffer(h.buffer.context()).unwrap();
    assert_eq!(h.writes(), 1);

    material.diffuse = Vec4::ONE;
    material.update_constant_buffer(h.buffer.context()).unwrap();
    assert_eq!(h.writes(), 2);

    material.detach();
    assert!(!material.is_attached());
    assert_eq!(h.live_buffers(), 0);
}

#[test]
fn material_with_unknown_technique_fails_to_attach() {
    let h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));
    let mut material = ColorMaterial::with_technique(Vec4::ONE, "Hologram");

    assert_eq!(
        material.attach(&effects).unwrap_err(),
        PrismError::TechniqueNotFound("Hologram".into())
    );
    assert!(!material.is_attached());
}

#[test]
fn missing_texture_degrades_to_flat_color() {
    let mut h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));
    let loader = Arc::new(CheckerLoader {
        fail: true,
        ..CheckerLoader::default()
    });
    let mut material = ColorMaterial::transparent(Vec4::new(1.0, 1.0, 1.0, 0.5)).with_texture(TextureModel::new(loader));

    material.attach(&effects).unwrap();
    assert!(material.texture_view().is_none());

    material.bind_textures(h.buffer.context());
    let commands = h.probe.commands();
    assert!(commands.iter().any(|c| matches!(c, DeviceCommand::BindConstantBuffer { slot: 2, .. })));
    assert!(!commands.iter().any(|c| matches!(c, DeviceCommand::BindTexture { .. })));
}

#[test]
fn textured_material_binds_its_view() {
    let mut h = Harness::new();
    let effects = EffectsManager::new(Arc::clone(&h.device));
    let mut material = ColorMaterial::new(Vec4::ONE).with_texture(TextureModel::new(Arc::new(CheckerLoader::default())));

    material.attach(&effects).unwrap();
    let texture = material.texture_view().unwrap().texture;

    material.bind_textures(h.buffer.context());
    assert_eq!(h.probe.count(&DeviceCommand::BindTexture { slot: 0, texture }), 1);
}
