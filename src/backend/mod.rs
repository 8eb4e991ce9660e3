use std::time::Duration;

use crate::compositor::Glaze;
use crate::output::OutputId;
use crate::render_helpers::Renderer;

pub mod headless;
pub use headless::Headless;

pub enum Backend {
    Headless(Headless),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderResult {
    /// The frame was submitted to the output.
    Submitted,
    /// Rendering succeeded, but there was no damage.
    NoDamage,
    /// The frame was not rendered and submitted, due to an error or otherwise.
    Skipped,
}

impl Backend {
    pub fn init(&mut self, glaze: &mut Glaze) {
        match self {
            Backend::Headless(headless) => headless.init(glaze),
        }
    }

    pub fn seat_name(&self) -> String {
        match self {
            Backend::Headless(headless) => headless.seat_name(),
        }
    }

    pub fn renderer(&mut self) -> &mut dyn Renderer {
        match self {
            Backend::Headless(headless) => headless.renderer(),
        }
    }

    pub fn render(
        &mut self,
        glaze: &mut Glaze,
        output: OutputId,
        target_presentation_time: Duration,
    ) -> RenderResult {
        match self {
            Backend::Headless(headless) => headless.render(glaze, output, target_presentation_time),
        }
    }

    /// Finishes frames whose presentation time has come.
    pub fn dispatch_vblanks(&mut self, glaze: &mut Glaze, now: Duration) {
        match self {
            Backend::Headless(headless) => headless.dispatch_vblanks(glaze, now),
        }
    }

    /// Time until the next pending vblank, if any.
    pub fn next_vblank_in(&self, now: Duration) -> Option<Duration> {
        match self {
            Backend::Headless(headless) => headless.next_vblank_in(now),
        }
    }

    pub fn headless(&mut self) -> &mut Headless {
        match self {
            Backend::Headless(headless) => headless,
        }
    }
}
