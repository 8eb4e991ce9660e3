//! Compositor state tying outputs, windows, input and the effect chain together.

use std::collections::HashMap;
use std::time::Duration;

use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, LoopSignal};
use glaze_config::Config;
use smithay::utils::{Logical, Rectangle};

use crate::animation::Clock;
use crate::backend::Backend;
use crate::effect::{EffectChain, EffectsHandler, ReconfigureFlags};
use crate::input::{FilterOrder, InputFilters};
use crate::output::{GammaRamp, OutputEvent, OutputId, OutputInfo};
use crate::render_helpers::Renderer;
use crate::seat::Seat;
use crate::utils::get_monotonic_time;
use crate::utils::region::Region;
use crate::utils::watchdog::{UnsafeGlFlag, Watchdog};
use crate::window::{PingTracker, WindowId};

mod input;
mod render;
mod windows;

pub use render::FrameStats;

pub struct State {
    pub backend: Backend,
    pub glaze: Glaze,
}

pub struct Glaze {
    pub ctx: EffectsHandler,
    pub effects: EffectChain,
    pub seat: Seat,
    pub filters: InputFilters,
    pub ping: PingTracker,

    event_loop: Option<LoopHandle<'static, State>>,
    stop_signal: Option<LoopSignal>,
    watchdog: Option<Watchdog>,

    /// Damage and statistics per output.
    frames: HashMap<OutputId, FrameStats>,
    /// Deadlines of repaints asked for by effects, used without an event loop.
    delayed_repaints: Vec<Duration>,

    monitors_active: bool,
    lock_surface: Option<WindowId>,
    /// Window under an interactive move or resize.
    interactive_move: Option<WindowId>,
    /// Window receiving pointer events while a button is held.
    pointer_grab: Option<WindowId>,
    touch_targets: HashMap<i32, WindowId>,
    unresponsive: Vec<WindowId>,
    /// Set when the watchdog gave up on the GPU.
    pub gpu_frozen: bool,
}

impl State {
    pub fn new(
        config: Config,
        clock: Clock,
        event_loop: Option<LoopHandle<'static, State>>,
        stop_signal: Option<LoopSignal>,
        mut backend: Backend,
    ) -> Self {
        let _span = tracy_client::span!("State::new");

        let seat_name = backend.seat_name();
        let mut glaze = Glaze::new(config, clock, event_loop, stop_signal, seat_name);
        backend.init(&mut glaze);
        glaze.sync_effects(backend.renderer());

        Self { backend, glaze }
    }

    /// Finishes due frames, then redraws whatever got queued.
    pub fn refresh_and_redraw(&mut self) {
        let _span = tracy_client::span!("State::refresh_and_redraw");

        self.glaze.ctx.clock.clear();
        let now = get_monotonic_time();
        self.backend.dispatch_vblanks(&mut self.glaze, now);
        self.glaze.refresh();
        self.glaze.redraw_queued_outputs(&mut self.backend);
    }

    pub fn reload_config(&mut self, config: Config) {
        self.glaze.reload_config(self.backend.renderer(), config);
    }

    pub fn add_output(&mut self, info: OutputInfo) -> OutputId {
        self.glaze.add_output(self.backend.renderer(), info)
    }

    pub fn remove_output(&mut self, output: OutputId) {
        self.glaze.remove_output(self.backend.renderer(), output);
    }
}

impl Glaze {
    pub fn new(
        config: Config,
        clock: Clock,
        event_loop: Option<LoopHandle<'static, State>>,
        stop_signal: Option<LoopSignal>,
        seat_name: String,
    ) -> Self {
        let mut ctx = EffectsHandler::new(config.clone(), clock);
        ctx.clock.configure(&config.animations);
        if let Some(handle) = &event_loop {
            ctx.set_event_loop(handle.clone());
        }

        let mut filters = InputFilters::new();
        if !ctx.outputs.has_real_outputs() {
            filters.install(FilterOrder::PlaceholderOutput);
        }

        let watchdog = (!config.debug.disable_watchdog).then(|| {
            let timeout = Duration::from_millis(config.debug.watchdog_timeout_ms.into());
            Watchdog::new(timeout, get_monotonic_time())
        });

        let ping = PingTracker::new(Duration::from_millis(config.debug.ping_timeout_ms.into()));

        Self {
            ctx,
            effects: EffectChain::new(),
            seat: Seat::new(seat_name),
            filters,
            ping,
            event_loop,
            stop_signal,
            watchdog,
            frames: HashMap::new(),
            delayed_repaints: Vec::new(),
            monitors_active: true,
            lock_surface: None,
            interactive_move: None,
            pointer_grab: None,
            touch_targets: HashMap::new(),
            unresponsive: Vec::new(),
            gpu_frozen: false,
        }
    }

    /// Starts the watchdog timer. When it expires the unsafe-GL flag is written and the loop
    /// stops.
    pub fn arm_watchdog(&self) -> anyhow::Result<()> {
        let (Some(watchdog), Some(handle)) = (&self.watchdog, &self.event_loop) else {
            return Ok(());
        };

        watchdog.arm(handle, |state: &mut State| {
            if let Some(flag) = UnsafeGlFlag::in_state_dir() {
                if let Err(err) = flag.set() {
                    warn!("error writing the unsafe GL flag: {err:?}");
                }
            }
            state.glaze.gpu_frozen = true;
            state.glaze.stop();
        })?;
        Ok(())
    }

    pub fn stop(&self) {
        match &self.stop_signal {
            Some(signal) => signal.stop(),
            None => debug!("no event loop to stop"),
        }
    }

    /// Periodic work between frames.
    pub fn refresh(&mut self) {
        let _span = tracy_client::span!("Glaze::refresh");

        let now = self.ctx.clock.now_unadjusted();

        let before = self.delayed_repaints.len();
        self.delayed_repaints.retain(|deadline| *deadline > now);
        if self.delayed_repaints.len() != before {
            self.ctx.add_repaint_full();
        }

        for window in self.ping.expire(now) {
            if !self.unresponsive.contains(&window) {
                warn!("{window} is not responding");
                self.unresponsive.push(window);
            }
        }

        self.handle_deleted_windows();
        self.dispatch_pending_input_events();
        self.flush_repaints();
    }

    pub fn is_unresponsive(&self, window: WindowId) -> bool {
        self.unresponsive.contains(&window)
    }

    /// Loads enabled effects and unloads disabled ones.
    pub fn sync_effects(&mut self, renderer: &dyn Renderer) {
        let _span = tracy_client::span!("Glaze::sync_effects");

        for name in crate::effects::NAMES {
            let enabled = crate::effects::is_enabled(name, &self.ctx.config);
            let loaded = self.effects.is_loaded(name);

            if enabled && !loaded {
                if let Some(effect) = crate::effects::create(name) {
                    self.effects.load(&mut self.ctx, renderer, effect);
                }
            } else if !enabled && loaded {
                self.effects.unload(&mut self.ctx, name);
            }
        }

        self.ctx.reserve_edges_done();
    }

    pub fn reload_config(&mut self, renderer: &dyn Renderer, config: Config) {
        let _span = tracy_client::span!("Glaze::reload_config");

        if self.ctx.config == config {
            debug!("config did not change");
            return;
        }

        self.ctx.clock.configure(&config.animations);
        self.ctx.shortcuts.set_binds(config.binds.clone());
        self.ctx.edges.reconfigure(&config.gestures);
        self.ping
            .set_timeout(Duration::from_millis(config.debug.ping_timeout_ms.into()));

        if let Some(watchdog) = &self.watchdog {
            let timeout = Duration::from_millis(config.debug.watchdog_timeout_ms.into());
            if watchdog.timeout() != timeout {
                info!("the new watchdog timeout applies after a restart");
            }
        }

        let damage_tracking_changed =
            self.ctx.config.debug.disable_damage_tracking != config.debug.disable_damage_tracking;
        self.ctx.config = config;

        // Unload first so that effects being turned off never see the new config.
        for name in crate::effects::NAMES {
            if self.effects.is_loaded(name) && !crate::effects::is_enabled(name, &self.ctx.config)
            {
                self.effects.unload(&mut self.ctx, name);
            }
        }
        self.effects
            .reconfigure(&mut self.ctx, ReconfigureFlags::CONFIG);
        self.sync_effects(renderer);

        if damage_tracking_changed {
            debug!("damage tracking toggled");
        }

        self.ctx.add_repaint_full();
        self.dispatch_pending_input_events();
        self.flush_repaints();
    }

    pub fn add_output(&mut self, renderer: &dyn Renderer, info: OutputInfo) -> OutputId {
        let _span = tracy_client::span!("Glaze::add_output");

        debug!("adding output {} at {:?}", info.name, info.geometry);
        let (id, events) = self.ctx.outputs.add(info);
        self.outputs_changed(renderer, events);
        id
    }

    pub fn remove_output(&mut self, renderer: &dyn Renderer, output: OutputId) {
        let _span = tracy_client::span!("Glaze::remove_output");

        let events = self.ctx.outputs.remove(output);
        if events.is_empty() {
            warn!("removing unknown output {output}");
            return;
        }
        self.outputs_changed(renderer, events);
    }

    pub fn set_output_geometry(
        &mut self,
        renderer: &dyn Renderer,
        output: OutputId,
        geometry: Rectangle<i32, Logical>,
        scale: f64,
    ) {
        let events = self.ctx.outputs.set_geometry(output, geometry, scale);
        self.outputs_changed(renderer, events);
    }

    pub fn set_gamma_ramp(
        &mut self,
        output: OutputId,
        ramp: Option<GammaRamp>,
    ) -> anyhow::Result<()> {
        self.ctx.outputs.set_gamma_ramp(output, ramp)?;
        self.queue_redraw(output);
        Ok(())
    }

    fn outputs_changed(&mut self, renderer: &dyn Renderer, events: Vec<OutputEvent>) {
        for event in events {
            match event {
                OutputEvent::Added(id) => {
                    self.frames.insert(id, FrameStats::new());
                    for effect in self.effects.iter_mut() {
                        effect.screen_added(&mut self.ctx, id);
                    }
                }
                OutputEvent::Removed(id) => {
                    self.frames.remove(&id);
                    for effect in self.effects.iter_mut() {
                        effect.screen_removed(&mut self.ctx, id);
                    }
                }
                OutputEvent::GeometryChanged(id) => {
                    if let Some(frame) = self.frames.get_mut(&id) {
                        frame.damage_all();
                    }
                }
            }
        }

        if self.ctx.outputs.has_real_outputs() {
            self.filters.remove(FilterOrder::PlaceholderOutput);
        } else {
            self.filters.install(FilterOrder::PlaceholderOutput);
        }

        self.effects.recheck_support(&mut self.ctx, renderer);
        self.effects
            .reconfigure(&mut self.ctx, ReconfigureFlags::OUTPUTS);
        self.ctx.reserve_edges_done();

        self.ctx.add_repaint_full();
        self.flush_repaints();
    }

    /// Powers outputs down or back up.
    pub fn set_monitors_active(&mut self, active: bool) {
        if self.monitors_active == active {
            return;
        }

        debug!("setting monitors active: {active}");
        self.monitors_active = active;
        if active {
            self.filters.remove(FilterOrder::Dpms);
            self.ctx.add_repaint_full();
            self.flush_repaints();
        } else {
            self.filters.install(FilterOrder::Dpms);
        }
    }

    pub fn monitors_active(&self) -> bool {
        self.monitors_active
    }

    /// Locks the session, routing all input to `surface`.
    pub fn lock(&mut self, surface: Option<WindowId>) {
        info!("locking the session");
        self.lock_surface = surface;
        self.ctx.set_screen_locked(true);
        self.filters.install(FilterOrder::LockScreen);
        self.seat.set_focus(surface);
        self.ctx.add_repaint_full();
    }

    pub fn unlock(&mut self) {
        info!("unlocking the session");
        self.lock_surface = None;
        self.ctx.set_screen_locked(false);
        self.filters.remove(FilterOrder::LockScreen);
        self.seat.set_focus(self.ctx.active_window());
        self.ctx.add_repaint_full();
    }

    /// Runs a repaint once `delay` of animation time has passed.
    fn schedule_repaint(&mut self, delay: Duration) {
        let rate = self.ctx.clock.rate();
        let delay = if rate > 0. { delay.div_f64(rate) } else { delay };

        let Some(handle) = &self.event_loop else {
            let deadline = self.ctx.clock.now_unadjusted() + delay;
            self.delayed_repaints.push(deadline);
            return;
        };

        let timer = Timer::from_duration(delay);
        let res = handle.insert_source(timer, |_, _, state| {
            state.glaze.ctx.add_repaint_full();
            state.glaze.flush_repaints();
            TimeoutAction::Drop
        });
        if let Err(err) = res {
            warn!("error inserting repaint timer: {err}");
        }
    }

    /// Distributes accumulated repaints to the outputs they touch and queues those outputs.
    pub fn flush_repaints(&mut self) {
        let Some(region) = self.ctx.take_repaints() else {
            let ids: Vec<_> = self.frames.keys().copied().collect();
            for id in ids {
                if let Some(frame) = self.frames.get_mut(&id) {
                    frame.damage_all();
                }
                self.queue_redraw(id);
            }
            return;
        };

        if region.is_empty() {
            return;
        }

        let outputs: Vec<_> = self
            .ctx
            .outputs
            .iter()
            .filter(|o| !o.is_placeholder())
            .map(|o| (o.id(), o.geometry()))
            .collect();
        for (id, geometry) in outputs {
            let damage = region.intersected_rect(geometry);
            if damage.is_empty() {
                continue;
            }

            if let Some(frame) = self.frames.get_mut(&id) {
                frame.add_damage(&damage);
            }
            self.queue_redraw(id);
        }
    }

    pub fn frame_stats(&self, output: OutputId) -> Option<&FrameStats> {
        self.frames.get(&output)
    }

    pub fn pending_damage(&self, output: OutputId) -> Option<Region> {
        self.frames.get(&output).map(|f| f.pending())
    }
}
