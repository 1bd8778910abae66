use prism_core::Result;
use prism_resources::{AttachContext, DeviceContext};

use crate::context::RenderContext;
use crate::core::RenderCore;

/// Core of a plain grouping node: no resources, no bounds, draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupCore;

impl RenderCore for GroupCore {
    fn attach(&mut self, _ctx: &AttachContext) -> Result<()> {
        Ok(())
    }

    fn detach(&mut self) {}

    fn render(&self, _ctx: &RenderContext, _dc: &mut dyn DeviceContext) -> Result<()> {
        Ok(())
    }
}
