use smithay::utils::{Logical, Rectangle, Serial};

use super::Glaze;
use crate::effect::MoveResize;
use crate::window::{CloseOutcome, Pong, RoleError, Surface, SurfaceRole, WindowId};

impl Glaze {
    /// Maps a new toplevel window and gives it focus.
    pub fn add_window(&mut self, surface: Box<dyn Surface>) -> WindowId {
        let id = self.ctx.windows.add(surface);
        if let Err(err) = self.assign_role(id, SurfaceRole::Toplevel) {
            warn!("error mapping {id}: {err}");
        }

        let Some(window) = self.ctx.windows.get(id).cloned() else {
            return id;
        };
        for effect in self.effects.iter_mut() {
            effect.window_added(&mut self.ctx, &window);
        }

        self.ctx.add_layer_repaint(&window);
        if window.is_normal() && !self.ctx.is_screen_locked() {
            self.focus_window(Some(id));
        }
        id
    }

    /// Gives the surface a role. A surface cannot change its role once it has one.
    pub fn assign_role(&mut self, window: WindowId, role: SurfaceRole) -> Result<(), RoleError> {
        let res = self.ctx.windows.assign_role(window, role);
        if let Err(err) = &res {
            warn!("protocol error from {window}: {err}");
        }
        res
    }

    /// The client committed new state: picks up damage and geometry changes.
    pub fn commit(&mut self, id: WindowId) {
        let _span = tracy_client::span!("Glaze::commit");

        let Some(old) = self.ctx.windows.get(id).map(|w| w.geometry) else {
            return;
        };
        let Some(damage) = self.ctx.windows.refresh(id) else {
            return;
        };
        let Some(window) = self.ctx.windows.get(id).cloned() else {
            return;
        };

        if !damage.is_empty() {
            for effect in self.effects.iter_mut() {
                effect.window_damaged(&mut self.ctx, &window, &damage);
            }
            self.ctx.add_repaint(&damage);
        }

        if old != window.geometry {
            let event = if self.interactive_move == Some(id) {
                MoveResize::Step { old }
            } else {
                MoveResize::Jump { old }
            };
            for effect in self.effects.iter_mut() {
                effect.window_move_resize(&mut self.ctx, &window, event);
            }
            self.ctx.add_layer_repaint(&window);
        }
    }

    pub fn begin_interactive_move(&mut self, id: WindowId) {
        self.begin_interactive(id, false);
    }

    pub fn begin_interactive_resize(&mut self, id: WindowId) {
        self.begin_interactive(id, true);
    }

    fn begin_interactive(&mut self, id: WindowId, resize: bool) {
        let Some(window) = self.ctx.windows.get(id).cloned() else {
            return;
        };
        if let Some(previous) = self.interactive_move.filter(|w| *w != id) {
            self.end_interactive_move(previous);
        }
        self.interactive_move = Some(id);

        for effect in self.effects.iter_mut() {
            effect.window_move_resize(&mut self.ctx, &window, MoveResize::Start { resize });
        }
    }

    pub fn end_interactive_move(&mut self, id: WindowId) {
        if self.interactive_move == Some(id) {
            self.interactive_move = None;
        }

        let Some(window) = self.ctx.windows.get(id).cloned() else {
            return;
        };
        for effect in self.effects.iter_mut() {
            effect.window_move_resize(&mut self.ctx, &window, MoveResize::Finish);
        }
    }

    /// The client destroyed the window.
    ///
    /// Effects get to take keep-alive references first, so closing animations can keep
    /// painting the window after its surface is gone.
    pub fn close_window(&mut self, id: WindowId) {
        let _span = tracy_client::span!("Glaze::close_window");

        let Some(window) = self.ctx.windows.get(id).cloned() else {
            return;
        };
        if window.deleted {
            return;
        }

        for effect in self.effects.iter_mut() {
            effect.window_closed(&mut self.ctx, &window);
        }

        let Some((outcome, snapshot)) = self.ctx.windows.close(id) else {
            return;
        };
        self.ctx.add_layer_repaint(&snapshot);
        self.ping.forget(id);
        self.unresponsive.retain(|w| *w != id);
        self.touch_targets.retain(|_, w| *w != id);
        if self.pointer_grab == Some(id) {
            self.pointer_grab = None;
        }
        if self.interactive_move == Some(id) {
            self.interactive_move = None;
        }
        if self.lock_surface == Some(id) {
            self.lock_surface = None;
        }

        if outcome == CloseOutcome::Deleted {
            self.ctx.clear_expanded_geometry(id);
            for effect in self.effects.iter_mut() {
                effect.window_deleted(&mut self.ctx, id);
            }
        }

        if self.seat.focused_surface() == Some(id) || self.ctx.active_window() == Some(id) {
            let next = self
                .ctx
                .windows
                .stacking_order()
                .rev()
                .filter(|w| !w.deleted && w.is_normal() && !w.is_minimized())
                .map(|w| w.id)
                .next();
            self.focus_window(next);
        }
    }

    /// Tells effects about windows whose last keep-alive reference went away.
    pub(super) fn handle_deleted_windows(&mut self) {
        for window in self.ctx.take_deleted() {
            trace!("{} deleted", window.id);
            for effect in self.effects.iter_mut() {
                effect.window_deleted(&mut self.ctx, window.id);
            }
        }
    }

    pub fn focus_window(&mut self, id: Option<WindowId>) {
        if self.ctx.is_screen_locked() {
            return;
        }

        if let Some(id) = id {
            self.ctx.windows.raise(id);
            if let Some(window) = self.ctx.windows.get(id) {
                self.ctx.add_layer_repaint(&window.clone());
            }
        }

        self.seat.set_focus(id);
        self.ctx.set_active_window(id);

        let rect = id.and_then(|id| self.ctx.windows.get(id)).map(|w| w.geometry);
        if let Some(rect) = rect {
            self.focus_rect_changed(rect);
        }
    }

    /// Keyboard focus or the text caret moved.
    pub fn focus_rect_changed(&mut self, rect: Rectangle<i32, Logical>) {
        for effect in self.effects.iter_mut() {
            effect.focus_rect_changed(&mut self.ctx, rect);
        }
    }

    pub fn set_force_blur(&mut self, id: WindowId, force: bool) {
        self.ctx.windows.set_force_blur(id, force);
        if let Some(window) = self.ctx.windows.get(id).cloned() {
            self.ctx.add_layer_repaint(&window);
        }
    }

    /// Sends a ping, tracked until the client answers or the timeout passes.
    pub fn ping_window(&mut self, id: WindowId) -> Option<Serial> {
        let serial = self.seat.next_serial();
        if !self.ctx.windows.ping(id, serial) {
            return None;
        }

        let now = self.ctx.clock.now_unadjusted();
        self.ping.ping(id, serial, now);
        Some(serial)
    }

    pub fn pong(&mut self, serial: Serial) {
        let now = self.ctx.clock.now_unadjusted();
        match self.ping.pong(serial, now) {
            Pong::Ok(window) => {
                if self.unresponsive.contains(&window) {
                    info!("{window} is responding again");
                    self.unresponsive.retain(|w| *w != window);
                }
            }
            Pong::Late(window) => trace!("late pong from {window}"),
            Pong::Unknown => trace!("pong with unknown serial {serial:?}"),
        }
    }
}
