use glam::{Mat4, Vec3};
use prism_core::Result;
use prism_resources::{AttachContext, DeviceContext, LightData, LightKind};

use crate::context::RenderContext;
use crate::core::RenderCore;

/// Light source. Contributes to the global constants, draws nothing.
///
/// Position and direction are given in node space and moved into scene space
/// by the node's total transform every frame.
pub struct LightCore {
    local: LightData,
    world: LightData,
}

impl LightCore {
    #[must_use]
    pub fn new(light: LightData) -> Self {
        Self {
            local: light,
            world: light,
        }
    }

    #[must_use]
    pub fn directional(color: Vec3, intensity: f32, direction: Vec3) -> Self {
        Self::new(LightData::new(LightKind::Directional, color, intensity).with_direction(direction))
    }

    #[must_use]
    pub fn point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self::new(LightData::new(LightKind::Point, color, intensity).with_position(Vec3::ZERO, range))
    }

    #[must_use]
    pub fn ambient(color: Vec3, intensity: f32) -> Self {
        Self::new(LightData::new(LightKind::Ambient, color, intensity))
    }
}

impl RenderCore for LightCore {
    fn attach(&mut self, _ctx: &AttachContext) -> Result<()> {
        Ok(())
    }

    fn detach(&mut self) {}

    fn on_update(&mut self, _ctx: &RenderContext, world: &Mat4) -> Result<()> {
        let position = world.transform_point3(self.local.position.truncate());
        let direction = world.transform_vector3(self.local.direction.truncate()).normalize_or_zero();
        self.world = self.local;
        self.world.position = position.extend(self.local.position.w);
        self.world.direction = direction.extend(self.local.direction.w);
        Ok(())
    }

    fn render(&self, _ctx: &RenderContext, _dc: &mut dyn DeviceContext) -> Result<()> {
        Ok(())
    }

    fn light(&self) -> Option<LightData> {
        Some(self.world)
    }
}
