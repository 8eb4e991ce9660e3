//! Headless backend for tests and for running without a display.
//!
//! Frames go to a [`RecordingRenderer`] and are "presented" once the event loop reaches their
//! target presentation time.

use std::mem;
use std::time::Duration;

use smithay::utils::{Rectangle, Size, Transform};

use super::RenderResult;
use crate::compositor::Glaze;
use crate::output::{OutputId, OutputInfo, RedrawState};
use crate::render_helpers::recording::RecordingRenderer;
use crate::render_helpers::Renderer;

const REFRESH_MHZ: u32 = 60_000;

pub struct Headless {
    renderer: RecordingRenderer,
    /// Submitted frames waiting for their presentation time.
    pending_vblanks: Vec<(OutputId, Duration)>,
}

impl Headless {
    pub fn new() -> Self {
        Self::with_renderer(RecordingRenderer::new())
    }

    pub fn with_renderer(renderer: RecordingRenderer) -> Self {
        Self {
            renderer,
            pending_vblanks: Vec::new(),
        }
    }

    pub fn init(&mut self, _glaze: &mut Glaze) {}

    /// Plugs in an output to the right of the existing ones.
    pub fn add_output(&mut self, glaze: &mut Glaze, n: u8, size: (u16, u16)) -> OutputId {
        let x = glaze
            .ctx
            .outputs
            .iter()
            .filter(|o| !o.is_placeholder())
            .map(|o| o.geometry().loc.x + o.geometry().size.w)
            .max()
            .unwrap_or(0);

        let info = OutputInfo {
            name: format!("headless-{n}"),
            geometry: Rectangle::new(
                (x, 0).into(),
                Size::from((i32::from(size.0), i32::from(size.1))),
            ),
            scale: 1.,
            transform: Transform::Normal,
            refresh_mhz: REFRESH_MHZ,
        };

        glaze.add_output(&mut self.renderer, info)
    }

    pub fn remove_output(&mut self, glaze: &mut Glaze, output: OutputId) {
        self.pending_vblanks.retain(|(id, _)| *id != output);
        glaze.remove_output(&mut self.renderer, output);
    }

    pub fn seat_name(&self) -> String {
        "headless".to_owned()
    }

    pub fn renderer(&mut self) -> &mut RecordingRenderer {
        &mut self.renderer
    }

    pub fn render(
        &mut self,
        glaze: &mut Glaze,
        output: OutputId,
        target_presentation_time: Duration,
    ) -> RenderResult {
        let res = glaze.render(&mut self.renderer, output, target_presentation_time);

        let Some(state) = glaze.ctx.outputs.get_mut(output) else {
            return RenderResult::Skipped;
        };

        match mem::take(&mut state.redraw_state) {
            RedrawState::Queued => (),
            other => {
                error!("rendering {output} in unexpected redraw state {other:?}");
            }
        }

        if res == RenderResult::Submitted {
            state.redraw_state = RedrawState::WaitingForVBlank {
                redraw_needed: false,
            };
            self.pending_vblanks.push((output, target_presentation_time));
        }

        res
    }

    pub fn dispatch_vblanks(&mut self, glaze: &mut Glaze, now: Duration) {
        let (due, pending): (Vec<_>, Vec<_>) = mem::take(&mut self.pending_vblanks)
            .into_iter()
            .partition(|(_, time)| *time <= now);
        self.pending_vblanks = pending;

        for (output, time) in due {
            glaze.on_vblank(output, time);
        }
    }

    pub fn next_vblank_in(&self, now: Duration) -> Option<Duration> {
        self.pending_vblanks
            .iter()
            .map(|(_, time)| time.saturating_sub(now))
            .min()
    }

    /// Presents every submitted frame regardless of its presentation time.
    pub fn present_all(&mut self, glaze: &mut Glaze) {
        for (output, time) in mem::take(&mut self.pending_vblanks) {
            glaze.on_vblank(output, time);
        }
    }

    pub fn has_pending_vblanks(&self) -> bool {
        !self.pending_vblanks.is_empty()
    }

    pub fn max_texture_size(&self) -> i32 {
        self.renderer.max_texture_size()
    }
}

impl Default for Headless {
    fn default() -> Self {
        Self::new()
    }
}
