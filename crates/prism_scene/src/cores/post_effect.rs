use prism_core::Result;
use prism_resources::effects::techniques;
use prism_resources::{AttachContext, DeviceContext, DrawCall};
use slotmap::Key;

use crate::context::RenderContext;
use crate::core::RenderCore;

/// Full-screen post effect applied to every node that requested it.
///
/// Runs in the PostProc pass against the ping-pong target. One full-screen
/// draw is issued per requesting node, tagged with the node's handle.
pub struct PostEffectCore {
    effect: String,
}

impl PostEffectCore {
    #[must_use]
    pub fn new(effect: impl Into<String>) -> Self {
        Self { effect: effect.into() }
    }

    #[must_use]
    pub fn effect(&self) -> &str {
        &self.effect
    }
}

impl RenderCore for PostEffectCore {
    fn attach(&mut self, ctx: &AttachContext) -> Result<()> {
        let technique = ctx.effects.technique(techniques::POST_EFFECT)?;
        if !technique.has_pass(&self.effect) {
            log::warn!(
                "Post effect '{}' has no pass in '{}', using '{}'",
                self.effect,
                technique.name,
                technique.default_pass()
            );
            self.effect = technique.default_pass().to_string();
        }
        Ok(())
    }

    fn detach(&mut self) {}

    fn render(&self, ctx: &RenderContext, dc: &mut dyn DeviceContext) -> Result<()> {
        if ctx.post_effect_nodes.is_empty() {
            return Ok(());
        }
        dc.set_technique(techniques::POST_EFFECT, &self.effect);
        for handle in &ctx.post_effect_nodes {
            dc.draw(&DrawCall {
                stage: ctx.stage,
                vertex_buffer: None,
                index_buffer: None,
                element_count: 3,
                instance_count: 1,
                tag: handle.data().as_ffi(),
            })?;
        }
        Ok(())
    }
}
