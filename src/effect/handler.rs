//! Services the compositor offers to effects.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use calloop::LoopHandle;
use glaze_config::Config;
use smithay::utils::{Logical, Physical, Point, Rectangle, Size};

use crate::animation::Clock;
use crate::compositor::State;
use crate::input::screen_edge::{EdgeEvent, ScreenEdges};
use crate::input::shortcuts::{GestureShortcutEvent, GlobalShortcuts};
use crate::output::{OutputId, Outputs};
use crate::render_helpers::TextureId;
use crate::utils::region::Region;
use crate::window::{EffectWindow, WindowId, Windows};

/// Cursor shown while an effect intercepts the mouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Default,
    Pointer,
    Crosshair,
    Move,
    Hidden,
}

/// Current cursor image, RGBA8 pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorImage {
    pub pixels: Rc<[u8]>,
    pub size: Size<i32, Physical>,
    pub scale: i32,
    /// Hotspot in logical coordinates relative to the image origin.
    pub hotspot: Point<i32, Logical>,
    /// Bumped on every change so effects know when to re-upload.
    pub serial: u32,
}

impl CursorImage {
    pub fn logical_size(&self) -> Size<i32, Logical> {
        self.size.to_logical(self.scale.max(1))
    }
}

/// Context handed to every effect callback.
pub struct EffectsHandler {
    pub windows: Windows,
    pub outputs: Outputs,
    pub shortcuts: GlobalShortcuts,
    pub edges: ScreenEdges,
    pub clock: Clock,
    pub config: Config,

    cursor: Point<f64, Logical>,
    cursor_image: Option<CursorImage>,
    cursor_hidden_by: Vec<&'static str>,
    cursor_serial: u32,
    active_output: Option<OutputId>,
    active_window: Option<WindowId>,

    repaint: Region,
    full_repaint: bool,
    /// Window bounds after deformation, reported by effects for the current frame.
    expanded: HashMap<WindowId, Rectangle<i32, Logical>>,

    keyboard_grab: Option<&'static str>,
    mouse_interception: Option<(&'static str, CursorShape)>,
    fullscreen_effect: Option<&'static str>,
    screen_locked: bool,
    support_properties: HashMap<String, Vec<&'static str>>,

    current_desktop: u32,
    desktop_count: u32,

    /// Gesture events produced outside of input handling, e.g. when unregistering.
    pending_gestures: Vec<GestureShortcutEvent>,
    pending_edges: Vec<EdgeEvent>,
    /// Windows whose last keep-alive reference was dropped.
    deleted: Vec<EffectWindow>,
    /// Textures to free once the renderer is at hand.
    garbage: Vec<TextureId>,
    pending_warp: Option<Point<f64, Logical>>,
    pending_activation: Option<WindowId>,
    /// Delays after which effects want another frame.
    repaint_requests: Vec<Duration>,

    event_loop: Option<LoopHandle<'static, State>>,
}

impl EffectsHandler {
    pub fn new(config: Config, clock: Clock) -> Self {
        let shortcuts = GlobalShortcuts::new(config.binds.clone());
        let edges = ScreenEdges::new(&config.gestures);
        Self {
            windows: Windows::new(),
            outputs: Outputs::new(),
            shortcuts,
            edges,
            clock,
            config,
            cursor: Point::from((0., 0.)),
            cursor_image: None,
            cursor_hidden_by: Vec::new(),
            cursor_serial: 0,
            active_output: None,
            active_window: None,
            repaint: Region::new(),
            full_repaint: false,
            expanded: HashMap::new(),
            keyboard_grab: None,
            mouse_interception: None,
            fullscreen_effect: None,
            screen_locked: false,
            support_properties: HashMap::new(),
            current_desktop: 1,
            desktop_count: 1,
            pending_gestures: Vec::new(),
            pending_edges: Vec::new(),
            deleted: Vec::new(),
            garbage: Vec::new(),
            pending_warp: None,
            pending_activation: None,
            repaint_requests: Vec::new(),
            event_loop: None,
        }
    }

    #[cfg(test)]
    pub fn new_for_tests() -> Self {
        Self::new(Config::default(), Clock::with_time(Duration::ZERO))
    }

    pub fn set_event_loop(&mut self, handle: LoopHandle<'static, State>) {
        self.event_loop = Some(handle);
    }

    pub fn event_loop(&self) -> Option<&LoopHandle<'static, State>> {
        self.event_loop.as_ref()
    }

    /// Current time on the animation clock.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn cursor_pos(&self) -> Point<f64, Logical> {
        self.cursor
    }

    pub(crate) fn set_cursor_pos(&mut self, pos: Point<f64, Logical>) {
        self.cursor = pos;
        if let Some(output) = self.outputs.output_at(pos) {
            self.active_output = Some(output);
        }
    }

    pub fn cursor_image(&self) -> Option<&CursorImage> {
        self.cursor_image.as_ref()
    }

    pub(crate) fn set_cursor_image(&mut self, image: Option<CursorImage>) {
        self.cursor_serial = self.cursor_serial.wrapping_add(1);
        let serial = self.cursor_serial;
        self.cursor_image = image.map(|image| CursorImage { serial, ..image });
    }

    /// Hides the real cursor while an effect draws its own.
    pub fn hide_cursor(&mut self, effect: &'static str) {
        if !self.cursor_hidden_by.contains(&effect) {
            self.cursor_hidden_by.push(effect);
        }
    }

    pub fn show_cursor(&mut self, effect: &'static str) {
        self.cursor_hidden_by.retain(|e| *e != effect);
    }

    pub fn is_cursor_hidden(&self) -> bool {
        !self.cursor_hidden_by.is_empty()
    }

    /// Asks the compositor to move the pointer.
    pub fn warp_pointer(&mut self, pos: Point<f64, Logical>) {
        self.pending_warp = Some(pos);
    }

    pub(crate) fn take_pointer_warp(&mut self) -> Option<Point<f64, Logical>> {
        self.pending_warp.take()
    }

    /// Output the user works on: the one under the cursor.
    pub fn active_output(&self) -> Option<OutputId> {
        self.active_output
            .filter(|id| self.outputs.get(*id).is_some())
            .or_else(|| self.outputs.ids().first().copied())
    }

    pub fn active_window(&self) -> Option<WindowId> {
        self.active_window
    }

    pub(crate) fn set_active_window(&mut self, window: Option<WindowId>) {
        self.active_window = window;
    }

    /// Asks the compositor to raise and focus a window once input handling is done.
    pub fn activate_window(&mut self, window: WindowId) {
        if self.windows.contains(window) {
            self.pending_activation = Some(window);
        }
    }

    pub(crate) fn take_activation_request(&mut self) -> Option<WindowId> {
        self.pending_activation.take()
    }

    pub fn active_screen_geometry(&self) -> Rectangle<i32, Logical> {
        self.active_output()
            .and_then(|id| self.outputs.get(id))
            .map(|o| o.geometry())
            .unwrap_or_default()
    }

    pub fn virtual_screen_geometry(&self) -> Rectangle<i32, Logical> {
        self.outputs.virtual_screen_geometry()
    }

    pub fn current_desktop(&self) -> u32 {
        self.current_desktop
    }

    pub fn desktop_count(&self) -> u32 {
        self.desktop_count
    }

    pub fn set_desktop_count(&mut self, count: u32) {
        self.desktop_count = count.max(1);
        self.current_desktop = self.current_desktop.min(self.desktop_count);
    }

    pub fn set_current_desktop(&mut self, desktop: u32) -> bool {
        if desktop == 0 || desktop > self.desktop_count || desktop == self.current_desktop {
            return false;
        }
        debug!("switching to desktop {desktop}");
        self.current_desktop = desktop;
        self.add_repaint_full();
        true
    }

    pub fn add_repaint(&mut self, region: &Region) {
        self.repaint.union(region);
    }

    pub fn add_repaint_rect(&mut self, rect: Rectangle<i32, Logical>) {
        self.repaint.add_rect(rect);
    }

    pub fn add_repaint_full(&mut self) {
        self.full_repaint = true;
    }

    /// Repaints a window's area, including whatever effects draw around it.
    pub fn add_layer_repaint(&mut self, window: &EffectWindow) {
        let rect = self.expanded_geometry(window);
        self.repaint.add_rect(rect);
    }

    pub fn has_pending_repaint(&self) -> bool {
        self.full_repaint || !self.repaint.is_empty()
    }

    /// Asks for a frame once `delay` has passed, even if nothing else changes.
    pub fn request_repaint_after(&mut self, delay: Duration) {
        self.repaint_requests.push(delay);
    }

    pub(crate) fn take_repaint_requests(&mut self) -> Vec<Duration> {
        std::mem::take(&mut self.repaint_requests)
    }

    /// Takes the accumulated repaints. `None` stands for the whole screen.
    pub(crate) fn take_repaints(&mut self) -> Option<Region> {
        let region = std::mem::take(&mut self.repaint);
        if std::mem::take(&mut self.full_repaint) {
            None
        } else {
            Some(region)
        }
    }

    /// Reports how far a deformed window reaches this frame.
    pub fn set_expanded_geometry(&mut self, window: WindowId, rect: Rectangle<i32, Logical>) {
        self.expanded.insert(window, rect);
    }

    pub fn clear_expanded_geometry(&mut self, window: WindowId) {
        self.expanded.remove(&window);
    }

    pub fn expanded_geometry(&self, window: &EffectWindow) -> Rectangle<i32, Logical> {
        match self.expanded.get(&window.id) {
            Some(rect) => crate::utils::united(*rect, window.geometry),
            None => window.geometry,
        }
    }

    pub fn grab_keyboard(&mut self, effect: &'static str) -> bool {
        match self.keyboard_grab {
            Some(owner) if owner != effect => {
                debug!("{effect} cannot grab the keyboard, {owner} holds it");
                false
            }
            _ => {
                self.keyboard_grab = Some(effect);
                true
            }
        }
    }

    pub fn ungrab_keyboard(&mut self, effect: &'static str) {
        if self.keyboard_grab == Some(effect) {
            self.keyboard_grab = None;
        }
    }

    pub fn keyboard_grab(&self) -> Option<&'static str> {
        self.keyboard_grab
    }

    pub fn start_mouse_interception(&mut self, effect: &'static str, shape: CursorShape) -> bool {
        match self.mouse_interception {
            Some((owner, _)) if owner != effect => {
                debug!("{effect} cannot intercept the mouse, {owner} does");
                false
            }
            _ => {
                self.mouse_interception = Some((effect, shape));
                true
            }
        }
    }

    pub fn stop_mouse_interception(&mut self, effect: &'static str) {
        if matches!(self.mouse_interception, Some((owner, _)) if owner == effect) {
            self.mouse_interception = None;
        }
    }

    pub fn mouse_interception(&self) -> Option<(&'static str, CursorShape)> {
        self.mouse_interception
    }

    /// Claims the screen for a whole-screen effect. Only one can run at a time.
    pub fn set_fullscreen_effect(&mut self, effect: &'static str) -> bool {
        match self.fullscreen_effect {
            Some(owner) if owner != effect => false,
            _ => {
                self.fullscreen_effect = Some(effect);
                true
            }
        }
    }

    pub fn unset_fullscreen_effect(&mut self, effect: &'static str) {
        if self.fullscreen_effect == Some(effect) {
            self.fullscreen_effect = None;
        }
    }

    pub fn fullscreen_effect(&self) -> Option<&'static str> {
        self.fullscreen_effect
    }

    pub fn has_active_fullscreen_effect(&self) -> bool {
        self.fullscreen_effect.is_some()
    }

    pub fn is_screen_locked(&self) -> bool {
        self.screen_locked
    }

    pub(crate) fn set_screen_locked(&mut self, locked: bool) {
        self.screen_locked = locked;
    }

    /// Advertises a legacy X11 hint property that `effect` reads from clients.
    pub fn announce_support_property(&mut self, name: &str, effect: &'static str) {
        let owners = self.support_properties.entry(name.to_owned()).or_default();
        if !owners.contains(&effect) {
            owners.push(effect);
        }
    }

    pub fn remove_support_property(&mut self, name: &str, effect: &'static str) {
        if let Some(owners) = self.support_properties.get_mut(name) {
            owners.retain(|o| *o != effect);
            if owners.is_empty() {
                self.support_properties.remove(name);
            }
        }
    }

    pub fn support_properties(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.support_properties.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Expanded geometry of a window by id, if it is still known.
    pub fn expanded_geometry_of(&self, window: WindowId) -> Option<Rectangle<i32, Logical>> {
        self.windows.get(window).map(|w| self.expanded_geometry(w))
    }

    /// Takes a keep-alive reference on the window.
    pub fn ref_window(&mut self, window: WindowId) -> bool {
        self.windows.ref_window(window)
    }

    /// Drops a keep-alive reference. The last one on a closed window deletes it.
    pub fn unref_window(&mut self, window: WindowId) {
        if let Some(deleted) = self.windows.unref_window(window) {
            let rect = self.expanded_geometry(&deleted);
            self.repaint.add_rect(rect);
            self.expanded.remove(&window);
            self.deleted.push(deleted);
        }
    }

    pub(crate) fn take_deleted(&mut self) -> Vec<EffectWindow> {
        std::mem::take(&mut self.deleted)
    }

    /// Queues a texture to be freed before the next frame.
    pub fn release_texture(&mut self, texture: TextureId) {
        self.garbage.push(texture);
    }

    pub(crate) fn take_garbage(&mut self) -> Vec<TextureId> {
        std::mem::take(&mut self.garbage)
    }

    pub(crate) fn push_gesture_events(&mut self, events: Vec<GestureShortcutEvent>) {
        self.pending_gestures.extend(events);
    }

    pub(crate) fn push_edge_events(&mut self, events: Vec<EdgeEvent>) {
        self.pending_edges.extend(events);
    }

    pub(crate) fn take_pending_input_events(
        &mut self,
    ) -> (Vec<GestureShortcutEvent>, Vec<EdgeEvent>) {
        (
            std::mem::take(&mut self.pending_gestures),
            std::mem::take(&mut self.pending_edges),
        )
    }

    /// Rebuilds screen edges after reservations or outputs changed.
    pub fn reserve_edges_done(&mut self) {
        let events = self.edges.recompute(&self.outputs);
        self.pending_edges.extend(events);
    }

    /// Drops everything an effect registered with the compositor.
    pub(crate) fn effect_unloaded(&mut self, effect: &'static str) {
        // The effect is gone, nobody is left to receive these.
        let _ = self.shortcuts.unregister_owner(effect);
        self.edges.unreserve_all(effect);
        let _ = self.edges.recompute(&self.outputs);

        self.ungrab_keyboard(effect);
        self.stop_mouse_interception(effect);
        self.show_cursor(effect);
        self.unset_fullscreen_effect(effect);

        let names: Vec<_> = self.support_properties.keys().cloned().collect();
        for name in names {
            self.remove_support_property(&name, effect);
        }

        self.pending_gestures.retain(|e| e.owner != effect);
        self.pending_edges.retain(|e| e.owner != effect);
        self.add_repaint_full();
    }
}
