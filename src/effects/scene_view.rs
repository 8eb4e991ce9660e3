//! Per-output views of whole-screen effects that draw their own scene.
//!
//! Each view renders into an offscreen texture which is then composited over its output. While
//! the views run, the owning effect grabs the keyboard and intercepts the mouse, and input goes to
//! the view it belongs to: pointer events to the view under the cursor (or the one holding the
//! implicit grab while a button is pressed), keys to the active view, touch points to the view
//! they started on.

use std::collections::{BTreeMap, HashMap, HashSet};

use smithay::backend::input::ButtonState;
use smithay::utils::{Logical, Point, Rectangle};

use crate::animation::{Animation, Curve};
use crate::effect::{CursorShape, EffectsHandler, PaintContext};
use crate::input::togglable_state::{Status, TogglableState};
use crate::input::InputEvent;
use crate::output::{Edge, OutputId};
use crate::render_helpers::offscreen::OffscreenLayer;
use crate::render_helpers::{
    Filter, RenderError, ShaderKind, TextureDraw, TextureFormat, TextureSpec, TransferFunction,
    Wrap,
};
use crate::utils::region::Region;
use crate::utils::to_f64;

const BACKGROUND: [f32; 4] = [0., 0., 0., 1.];

#[derive(Debug)]
pub struct SceneView {
    output: OutputId,
    geometry: Rectangle<i32, Logical>,
    layer: OffscreenLayer,
    dirty: bool,
}

impl SceneView {
    fn new(output: OutputId, geometry: Rectangle<i32, Logical>) -> Self {
        Self {
            output,
            geometry,
            layer: OffscreenLayer::new(),
            dirty: true,
        }
    }

    pub fn output(&self) -> OutputId {
        self.output
    }

    pub fn geometry(&self) -> Rectangle<i32, Logical> {
        self.geometry
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[derive(Debug)]
pub struct SceneViews {
    owner: &'static str,
    views: BTreeMap<OutputId, SceneView>,
    active: Option<OutputId>,
    mouse_grab: Option<OutputId>,
    pressed: HashSet<u32>,
    touches: HashMap<i32, OutputId>,
    running: bool,
}

impl SceneViews {
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            views: BTreeMap::new(),
            active: None,
            mouse_grab: None,
            pressed: HashSet::new(),
            touches: HashMap::new(),
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Creates a view on every output and takes over input.
    ///
    /// Fails when another whole-screen effect is running or the keyboard is grabbed elsewhere.
    pub fn start(&mut self, ctx: &mut EffectsHandler) -> bool {
        if self.running {
            return true;
        }

        if ctx.has_active_fullscreen_effect() {
            debug!("{}: another fullscreen effect is running", self.owner);
            return false;
        }
        if !ctx.grab_keyboard(self.owner) {
            return false;
        }
        if !ctx.start_mouse_interception(self.owner, CursorShape::Default) {
            ctx.ungrab_keyboard(self.owner);
            return false;
        }
        ctx.set_fullscreen_effect(self.owner);

        let outputs: Vec<_> = ctx
            .outputs
            .iter()
            .filter(|o| !o.is_placeholder())
            .map(|o| (o.id(), o.geometry()))
            .collect();
        for (output, geometry) in outputs {
            self.views.insert(output, SceneView::new(output, geometry));
        }

        self.running = true;
        self.active = ctx
            .active_output()
            .filter(|id| self.views.contains_key(id))
            .or_else(|| self.views.keys().next().copied());
        debug!("{}: started with {} views", self.owner, self.views.len());

        ctx.add_repaint_full();
        true
    }

    pub fn stop(&mut self, ctx: &mut EffectsHandler) {
        if !self.running {
            return;
        }

        for (_, mut view) in std::mem::take(&mut self.views) {
            if let Some(texture) = view.layer.take() {
                ctx.release_texture(texture);
            }
        }
        self.active = None;
        self.mouse_grab = None;
        self.pressed.clear();
        self.touches.clear();
        self.running = false;

        ctx.ungrab_keyboard(self.owner);
        ctx.stop_mouse_interception(self.owner);
        ctx.unset_fullscreen_effect(self.owner);
        ctx.add_repaint_full();
        debug!("{}: stopped", self.owner);
    }

    pub fn add_screen(&mut self, ctx: &mut EffectsHandler, output: OutputId) {
        if !self.running {
            return;
        }
        let Some(o) = ctx.outputs.get(output).filter(|o| !o.is_placeholder()) else {
            return;
        };
        self.views.insert(output, SceneView::new(output, o.geometry()));
        if self.active.is_none() {
            self.active = Some(output);
        }
        ctx.add_repaint_rect(o.geometry());
    }

    pub fn remove_screen(&mut self, ctx: &mut EffectsHandler, output: OutputId) {
        let Some(mut view) = self.views.remove(&output) else {
            return;
        };
        if let Some(texture) = view.layer.take() {
            ctx.release_texture(texture);
        }

        if self.mouse_grab == Some(output) {
            self.mouse_grab = None;
        }
        self.touches.retain(|_, o| *o != output);
        if self.active == Some(output) {
            self.active = self.views.keys().next().copied();
        }
    }

    pub fn views(&self) -> impl Iterator<Item = &SceneView> + '_ {
        self.views.values()
    }

    pub fn view(&self, output: OutputId) -> Option<&SceneView> {
        self.views.get(&output)
    }

    pub fn view_at(&self, pos: Point<f64, Logical>) -> Option<OutputId> {
        self.views
            .values()
            .find(|v| to_f64(v.geometry).contains(pos))
            .map(|v| v.output)
    }

    /// View receiving keyboard input.
    pub fn active_view(&self) -> Option<OutputId> {
        self.active
    }

    pub fn activate_view(&mut self, output: OutputId) {
        if self.views.contains_key(&output) && self.active != Some(output) {
            trace!("{}: activating view on {output}", self.owner);
            self.active = Some(output);
        }
    }

    /// Nearest view past the given edge of the active view.
    pub fn view_towards(&self, edge: Edge) -> Option<OutputId> {
        let current = self.views.get(&self.active?)?.geometry;
        let left = |r: Rectangle<i32, Logical>| r.loc.x;
        let top = |r: Rectangle<i32, Logical>| r.loc.y;
        let right = |r: Rectangle<i32, Logical>| r.loc.x + r.size.w;
        let bottom = |r: Rectangle<i32, Logical>| r.loc.y + r.size.h;

        let mut candidate: Option<Rectangle<i32, Logical>> = None;
        let mut result = None;
        for view in self.views.values() {
            let g = view.geometry;
            let better = match edge {
                Edge::Left => {
                    left(g) < left(current)
                        && candidate.map_or(true, |c| {
                            left(g) > left(c) || (left(g) == left(c) && top(g) > top(c))
                        })
                }
                Edge::Top => {
                    top(g) < top(current)
                        && candidate.map_or(true, |c| {
                            top(g) > top(c) || (top(g) == top(c) && left(g) > left(c))
                        })
                }
                Edge::Right => {
                    right(g) > right(current)
                        && candidate.map_or(true, |c| {
                            right(g) < right(c) || (right(g) == right(c) && top(g) > top(c))
                        })
                }
                Edge::Bottom => {
                    bottom(g) > bottom(current)
                        && candidate.map_or(true, |c| {
                            bottom(g) < bottom(c) || (bottom(g) == bottom(c) && left(g) > left(c))
                        })
                }
            };
            if better {
                candidate = Some(g);
                result = Some(view.output);
            }
        }
        result
    }

    /// View that should receive a pointer event.
    ///
    /// A button press grabs the view under the cursor until every button is released.
    pub fn route_pointer(
        &mut self,
        ctx: &EffectsHandler,
        event: &InputEvent,
    ) -> Option<OutputId> {
        let pos = match event {
            InputEvent::PointerMotion { position, .. } => *position,
            InputEvent::PointerButton { button, state, .. } => {
                match state {
                    ButtonState::Pressed => {
                        self.pressed.insert(*button);
                    }
                    ButtonState::Released => {
                        self.pressed.remove(button);
                    }
                }
                ctx.cursor_pos()
            }
            InputEvent::PointerAxis { .. } => ctx.cursor_pos(),
            _ => return None,
        };

        if !self.pressed.is_empty() && self.mouse_grab.is_none() {
            self.mouse_grab = self.view_at(pos);
        }

        let target = self.mouse_grab.or_else(|| self.view_at(pos));

        if self.pressed.is_empty() {
            self.mouse_grab = None;
        }

        if let (Some(output), InputEvent::PointerButton { state: ButtonState::Pressed, .. }) =
            (target, event)
        {
            self.activate_view(output);
        }

        target
    }

    pub fn route_key(&self) -> Option<OutputId> {
        self.active
    }

    pub fn touch_down(&mut self, id: i32, pos: Point<f64, Logical>) -> Option<OutputId> {
        let output = self.view_at(pos)?;
        self.touches.insert(id, output);
        self.activate_view(output);
        Some(output)
    }

    pub fn touch_motion(&self, id: i32) -> Option<OutputId> {
        self.touches.get(&id).copied()
    }

    pub fn touch_up(&mut self, id: i32) -> Option<OutputId> {
        self.touches.remove(&id)
    }

    /// Forgets all touch points, returning the views that had any.
    pub fn touch_cancel(&mut self) -> Vec<OutputId> {
        let mut outputs: Vec<_> = self.touches.drain().map(|(_, o)| o).collect();
        outputs.sort();
        outputs.dedup();
        outputs
    }

    /// Marks the view for re-rendering on the next frame.
    pub fn schedule_repaint(&mut self, ctx: &mut EffectsHandler, output: OutputId) {
        if let Some(view) = self.views.get_mut(&output) {
            view.dirty = true;
            ctx.add_repaint_rect(view.geometry);
        }
    }

    pub fn schedule_repaint_all(&mut self, ctx: &mut EffectsHandler) {
        for view in self.views.values_mut() {
            view.dirty = true;
            ctx.add_repaint_rect(view.geometry);
        }
    }

    /// Composites the view of the output being painted.
    ///
    /// A dirty view is first rendered into its texture by `draw`, which gets the paint context
    /// retargeted at the texture and the view geometry.
    pub fn paint<F>(
        &mut self,
        ctx: &mut EffectsHandler,
        paint: &mut PaintContext,
        draw: F,
    ) -> Result<(), RenderError>
    where
        F: FnOnce(&mut EffectsHandler, &mut PaintContext, Rectangle<i32, Logical>)
            -> Result<(), RenderError>,
    {
        let Some(view) = self.views.get_mut(&paint.output) else {
            return Ok(());
        };

        let format = match paint.target.color.transfer {
            TransferFunction::Srgb => TextureFormat::Rgba8,
            _ => TextureFormat::Rgba16F,
        };
        let spec = TextureSpec::new(paint.target.size, format)
            .with_filter(Filter::Linear)
            .with_wrap(Wrap::ClampToEdge);

        let previous = view.layer.texture();
        let texture = view.layer.ensure(paint.renderer, spec)?;
        if view.dirty || previous != Some(texture) {
            let _span = tracy_client::span!("SceneView::render");

            view.dirty = false;
            let mut target = view
                .layer
                .target(view.geometry)
                .ok_or(RenderError::InvalidTexture)?;
            target.color = paint.target.color;

            let outer = std::mem::replace(&mut paint.target, target);
            let result = paint
                .renderer
                .clear(&paint.target, &Region::from_rect(view.geometry), BACKGROUND)
                .and_then(|()| draw(ctx, paint, view.geometry));
            paint.target = outer;
            result?;
        }

        let draw = TextureDraw::new(texture, ShaderKind::Copy, to_f64(view.geometry))
            .with_region(Region::from_rect(view.geometry));
        paint.renderer.draw_texture(&paint.target, &draw)
    }
}

/// On/off state of a scene effect with its animated visibility.
///
/// The views run while the state is visible and until the closing animation is over.
#[derive(Debug)]
pub struct SceneState {
    pub state: TogglableState,
    pub views: SceneViews,
    animation: Option<Animation>,
    /// Progress shown in the last frame, where the next animation starts from.
    displayed: f64,
    duration_ms: u64,
}

impl SceneState {
    pub fn new(owner: &'static str) -> Self {
        Self {
            state: TogglableState::new(),
            views: SceneViews::new(owner),
            animation: None,
            displayed: 0.,
            duration_ms: 300,
        }
    }

    pub fn set_duration(&mut self, duration_ms: u32) {
        self.duration_ms = u64::from(duration_ms);
    }

    /// How far the scene is shown, from 0 to 1.
    pub fn progress(&self) -> f64 {
        if self.state.in_progress() {
            return self.state.partial_activation_factor();
        }
        match &self.animation {
            Some(animation) => animation.value(),
            None if self.state.is_active() => 1.,
            None => 0.,
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animation.as_ref().is_some_and(|a| !a.is_done())
    }

    /// Follows the state after it changed. Returns whether the views were just started.
    pub fn sync(&mut self, ctx: &mut EffectsHandler) -> bool {
        let from = match &self.animation {
            Some(animation) => animation.value(),
            None => self.displayed,
        };
        if self.state.in_progress() {
            self.animation = None;
        } else {
            let target = if self.state.is_active() { 1. } else { 0. };
            let retarget = match &self.animation {
                Some(animation) => animation.to() != target,
                None => from != target,
            };
            if retarget {
                self.animation = Some(Animation::new(
                    ctx.clock.clone(),
                    from,
                    target,
                    self.duration_ms,
                    Curve::OutCubic,
                ));
            }
        }

        let mut started = false;
        if self.state.is_visible() && !self.views.is_running() {
            if !self.views.start(ctx) {
                self.state.deactivate();
                self.animation = None;
                self.displayed = 0.;
                return false;
            }
            started = true;
        }
        self.displayed = self.progress();

        self.views.schedule_repaint_all(ctx);
        self.stop_if_hidden(ctx);
        started
    }

    /// Keeps animating the views and stops them once fully hidden.
    pub fn frame_done(&mut self, ctx: &mut EffectsHandler) {
        if self.is_animating() || self.state.in_progress() {
            self.views.schedule_repaint_all(ctx);
        }
        self.displayed = self.progress();
        self.stop_if_hidden(ctx);
    }

    fn stop_if_hidden(&mut self, ctx: &mut EffectsHandler) {
        if self.state.status() == Status::Inactive && !self.is_animating() {
            self.animation = None;
            self.views.stop(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use smithay::utils::Transform;

    use super::*;
    use crate::input::{BTN_LEFT, BTN_RIGHT};
    use crate::output::OutputInfo;
    use crate::render_helpers::recording::{RecordingRenderer, RenderOp};
    use crate::render_helpers::{RenderTarget, RenderTargetKind};
    use crate::utils::rect;

    fn info(name: &str, x: i32, y: i32) -> OutputInfo {
        OutputInfo {
            name: name.to_owned(),
            geometry: rect(x, y, 1920, 1080),
            scale: 1.,
            transform: Transform::Normal,
            refresh_mhz: 60_000,
        }
    }

    fn setup() -> (EffectsHandler, SceneViews, OutputId, OutputId) {
        let mut ctx = EffectsHandler::new_for_tests();
        let (left, _) = ctx.outputs.add(info("left", 0, 0));
        let (right, _) = ctx.outputs.add(info("right", 1920, 0));
        let mut views = SceneViews::new("test");
        assert!(views.start(&mut ctx));
        (ctx, views, left, right)
    }

    fn motion(x: f64, y: f64) -> InputEvent {
        InputEvent::PointerMotion {
            position: Point::from((x, y)),
            delta: Point::from((0., 0.)),
            time: 0,
        }
    }

    fn button(button: u32, state: ButtonState) -> InputEvent {
        InputEvent::PointerButton {
            button,
            state,
            time: 0,
        }
    }

    #[test]
    fn start_claims_input_and_stop_releases_it() {
        let (mut ctx, mut views, left, right) = setup();
        assert_eq!(views.views().count(), 2);
        assert_eq!(views.active_view(), Some(left));
        assert_eq!(ctx.keyboard_grab(), Some("test"));
        assert_eq!(ctx.fullscreen_effect(), Some("test"));

        let mut other = SceneViews::new("other");
        assert!(!other.start(&mut ctx));

        views.stop(&mut ctx);
        assert!(!views.is_running());
        assert_eq!(ctx.keyboard_grab(), None);
        assert_eq!(ctx.mouse_interception(), None);
        assert_eq!(ctx.fullscreen_effect(), None);
        assert!(views.view(right).is_none());

        assert!(other.start(&mut ctx));
    }

    #[test]
    fn button_press_grabs_view_until_all_released() {
        let (mut ctx, mut views, left, right) = setup();

        ctx.set_cursor_pos(Point::from((100., 100.)));
        assert_eq!(views.route_pointer(&ctx, &motion(100., 100.)), Some(left));
        assert_eq!(
            views.route_pointer(&ctx, &button(BTN_LEFT, ButtonState::Pressed)),
            Some(left)
        );

        // Dragging over to the other view keeps going to the grabbing one.
        ctx.set_cursor_pos(Point::from((2500., 100.)));
        assert_eq!(views.route_pointer(&ctx, &motion(2500., 100.)), Some(left));
        assert_eq!(
            views.route_pointer(&ctx, &button(BTN_RIGHT, ButtonState::Pressed)),
            Some(left)
        );
        assert_eq!(
            views.route_pointer(&ctx, &button(BTN_LEFT, ButtonState::Released)),
            Some(left)
        );
        assert_eq!(
            views.route_pointer(&ctx, &button(BTN_RIGHT, ButtonState::Released)),
            Some(left)
        );

        assert_eq!(views.route_pointer(&ctx, &motion(2500., 100.)), Some(right));
        assert_eq!(
            views.route_pointer(&ctx, &button(BTN_LEFT, ButtonState::Pressed)),
            Some(right)
        );
        assert_eq!(views.active_view(), Some(right));
    }

    #[test]
    fn touch_points_stick_to_their_view() {
        let (_ctx, mut views, left, right) = setup();

        assert_eq!(views.touch_down(0, Point::from((100., 100.))), Some(left));
        assert_eq!(views.touch_down(1, Point::from((2000., 100.))), Some(right));
        assert_eq!(views.touch_motion(0), Some(left));
        assert_eq!(views.touch_up(0), Some(left));
        assert_eq!(views.touch_motion(0), None);

        assert_eq!(views.touch_cancel(), vec![right]);
        assert_eq!(views.touch_motion(1), None);
    }

    #[test]
    fn views_in_each_direction() {
        let mut ctx = EffectsHandler::new_for_tests();
        let (center, _) = ctx.outputs.add(info("center", 1920, 1080));
        let (left, _) = ctx.outputs.add(info("left", 0, 1080));
        let (far_left, _) = ctx.outputs.add(info("far-left", -1920, 1080));
        let (top, _) = ctx.outputs.add(info("top", 1920, 0));
        let mut views = SceneViews::new("test");
        assert!(views.start(&mut ctx));
        views.activate_view(center);

        assert_eq!(views.view_towards(Edge::Left), Some(left));
        assert_eq!(views.view_towards(Edge::Top), Some(top));
        assert_eq!(views.view_towards(Edge::Right), None);
        assert_eq!(views.view_towards(Edge::Bottom), None);

        views.activate_view(left);
        assert_eq!(views.view_towards(Edge::Left), Some(far_left));
        assert_eq!(views.view_towards(Edge::Right), Some(center));
    }

    #[test]
    fn removing_active_screen_moves_focus() {
        let (mut ctx, mut views, left, right) = setup();
        views.touch_down(3, Point::from((10., 10.)));
        views.remove_screen(&mut ctx, left);
        assert_eq!(views.active_view(), Some(right));
        assert_eq!(views.touch_motion(3), None);
        assert_eq!(views.view_at(Point::from((10., 10.))), None);
    }

    #[test]
    fn dirty_view_is_rendered_then_reused() {
        let (mut ctx, mut views, left, _) = setup();
        let mut renderer = RecordingRenderer::new();
        let target = RenderTarget::for_output(ctx.outputs.get(left).unwrap());
        let screen = target.geometry;
        let mut paint = PaintContext {
            renderer: &mut renderer,
            target,
            output: left,
            screen,
        };

        let mut drawn = 0;
        views
            .paint(&mut ctx, &mut paint, |_, paint, geometry| {
                drawn += 1;
                assert!(matches!(paint.target.kind, RenderTargetKind::Texture(_)));
                assert_eq!(geometry, rect(0, 0, 1920, 1080));
                Ok(())
            })
            .unwrap();
        views
            .paint(&mut ctx, &mut paint, |_, _, _| {
                drawn += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(drawn, 1);
        assert_eq!(paint.target.kind, RenderTargetKind::Output(left));

        views.schedule_repaint(&mut ctx, left);
        assert!(views.view(left).unwrap().is_dirty());
        views
            .paint(&mut ctx, &mut paint, |_, _, _| {
                drawn += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(drawn, 2);

        let composited = renderer
            .ops()
            .iter()
            .filter(|op| {
                matches!(
                    op,
                    RenderOp::DrawTexture { target, .. } if *target == RenderTargetKind::Output(left)
                )
            })
            .count();
        assert_eq!(composited, 3);
    }
}
