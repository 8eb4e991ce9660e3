//! On/off state of whole-screen effects that can be driven partially by gestures.

use super::shortcuts::ActionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Inactive,
    Activating,
    Active,
    Deactivating,
}

/// Actions that may be bound to a togglable effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Activate,
    Deactivate,
    Toggle,
}

/// Reported when the state settles on the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Activated,
    Deactivated,
}

/// State machine of effects such as the overview.
///
/// Gestures move it through the partial states with [`set_progress`](Self::set_progress) and
/// [`set_regress`](Self::set_regress). Releasing the gesture commits to whichever side the
/// partial activation factor is closer to.
#[derive(Debug, Clone, PartialEq)]
pub struct TogglableState {
    status: Status,
    partial_activation_factor: f64,
    in_progress: bool,
    /// A gesture reported progress since it began.
    gesture_driven: bool,
}

impl Default for TogglableState {
    fn default() -> Self {
        Self::new()
    }
}

impl TogglableState {
    pub fn new() -> Self {
        Self {
            status: Status::Inactive,
            partial_activation_factor: 0.,
            in_progress: false,
            gesture_driven: false,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn partial_activation_factor(&self) -> f64 {
        self.partial_activation_factor
    }

    /// Whether a gesture currently drives the state.
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Whether anything should be shown, fully or partially.
    pub fn is_visible(&self) -> bool {
        self.status != Status::Inactive
    }

    pub fn perform(&mut self, action: ToggleAction) -> Option<StateChange> {
        match action {
            ToggleAction::Activate => self.activate(),
            ToggleAction::Deactivate => self.deactivate(),
            ToggleAction::Toggle => self.toggle(),
        }
    }

    pub fn activate(&mut self) -> Option<StateChange> {
        self.in_progress = false;
        self.partial_activation_factor = 1.;
        self.set_status(Status::Active)
    }

    pub fn deactivate(&mut self) -> Option<StateChange> {
        self.in_progress = false;
        self.partial_activation_factor = 0.;
        self.set_status(Status::Inactive)
    }

    pub fn toggle(&mut self) -> Option<StateChange> {
        match self.status {
            Status::Inactive => self.activate(),
            Status::Active => self.deactivate(),
            Status::Activating | Status::Deactivating => {
                if self.partial_activation_factor > 0.5 {
                    self.activate()
                } else {
                    self.deactivate()
                }
            }
        }
    }

    /// Moves towards activation.
    ///
    /// Ignored unless inactive or already activating. The factor never decreases within one
    /// activation attempt.
    pub fn set_progress(&mut self, progress: f64) -> Option<StateChange> {
        if !matches!(self.status, Status::Inactive | Status::Activating) {
            return None;
        }

        if progress >= 1. {
            return self.activate();
        }

        if progress <= 0. {
            return None;
        }

        self.in_progress = true;
        self.status = Status::Activating;
        self.partial_activation_factor = self.partial_activation_factor.max(progress);
        None
    }

    /// Moves towards deactivation. Ignored unless active or already deactivating.
    pub fn set_regress(&mut self, regress: f64) -> Option<StateChange> {
        if !matches!(self.status, Status::Active | Status::Deactivating) {
            return None;
        }

        if regress >= 1. {
            return self.deactivate();
        }

        if regress <= 0. {
            return None;
        }

        self.in_progress = true;
        self.status = Status::Deactivating;
        self.partial_activation_factor = self.partial_activation_factor.min(1. - regress);
        None
    }

    /// Applies an event of a gesture bound to `action`.
    ///
    /// Progress of a toggle gesture regresses when the effect is on. A gesture that ends without
    /// ever reporting progress performs the action outright.
    pub fn handle_gesture(&mut self, action: ToggleAction, event: ActionEvent) -> Option<StateChange> {
        match event {
            ActionEvent::Progress(progress) => {
                self.gesture_driven = true;
                let regress = match action {
                    ToggleAction::Activate => false,
                    ToggleAction::Deactivate => true,
                    ToggleAction::Toggle => {
                        matches!(self.status, Status::Active | Status::Deactivating)
                    }
                };

                if regress {
                    self.set_regress(progress)
                } else {
                    self.set_progress(progress)
                }
            }
            ActionEvent::Triggered => {
                if std::mem::take(&mut self.gesture_driven) {
                    self.commit()
                } else {
                    self.perform(action)
                }
            }
            ActionEvent::Cancelled => {
                self.gesture_driven = false;
                self.commit()
            }
        }
    }

    /// Settles a partial state once the driving gesture ends.
    pub fn commit(&mut self) -> Option<StateChange> {
        match self.status {
            Status::Activating => {
                if self.partial_activation_factor > 0.5 {
                    self.activate()
                } else {
                    self.deactivate()
                }
            }
            Status::Deactivating => {
                if self.partial_activation_factor < 0.5 {
                    self.deactivate()
                } else {
                    self.activate()
                }
            }
            Status::Inactive | Status::Active => {
                self.in_progress = false;
                None
            }
        }
    }

    fn set_status(&mut self, status: Status) -> Option<StateChange> {
        let was_on = matches!(self.status, Status::Active | Status::Deactivating);
        self.status = status;

        match status {
            Status::Active if !was_on => Some(StateChange::Activated),
            Status::Inactive if was_on => Some(StateChange::Deactivated),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use proptest_derive::Arbitrary;

    use super::*;

    #[test]
    fn pinch_past_half_activates_once() {
        let mut state = TogglableState::new();
        assert_eq!(state.set_progress(0.3), None);
        assert_eq!(state.set_progress(0.6), None);
        assert_eq!(state.status(), Status::Activating);
        assert_eq!(state.partial_activation_factor(), 0.6);
        assert!(state.in_progress());

        assert_eq!(state.commit(), Some(StateChange::Activated));
        assert_eq!(state.status(), Status::Active);
        assert_eq!(state.partial_activation_factor(), 1.);
        assert_eq!(state.commit(), None);
        assert_eq!(state.activate(), None);
    }

    #[test]
    fn small_progress_falls_back() {
        let mut state = TogglableState::new();
        state.set_progress(0.4);
        assert_eq!(state.commit(), None);
        assert_eq!(state.status(), Status::Inactive);
        assert_eq!(state.partial_activation_factor(), 0.);
    }

    #[test]
    fn factor_is_monotonic_while_activating() {
        let mut state = TogglableState::new();
        state.set_progress(0.7);
        state.set_progress(0.2);
        assert_eq!(state.partial_activation_factor(), 0.7);
    }

    #[test]
    fn regress() {
        let mut state = TogglableState::new();
        state.activate();

        // Progress is meaningless while active.
        assert_eq!(state.set_progress(0.3), None);
        assert_eq!(state.status(), Status::Active);

        state.set_regress(0.3);
        assert_eq!(state.status(), Status::Deactivating);
        assert_abs_diff_eq!(state.partial_activation_factor(), 0.7);
        // Settling back on the active side is not a change.
        assert_eq!(state.commit(), None);
        assert_eq!(state.status(), Status::Active);

        state.set_regress(0.8);
        assert_eq!(state.commit(), Some(StateChange::Deactivated));
        assert_eq!(state.status(), Status::Inactive);
    }

    #[test]
    fn full_progress_activates_immediately() {
        let mut state = TogglableState::new();
        assert_eq!(state.set_progress(1.), Some(StateChange::Activated));
        assert_eq!(state.set_regress(1.), Some(StateChange::Deactivated));
    }

    #[test]
    fn toggle_from_partial_states() {
        let mut state = TogglableState::new();
        state.set_progress(0.8);
        assert_eq!(state.toggle(), Some(StateChange::Activated));

        state.set_regress(0.9);
        assert_eq!(state.toggle(), Some(StateChange::Deactivated));
        assert_eq!(state.toggle(), Some(StateChange::Activated));
        assert_eq!(state.toggle(), Some(StateChange::Deactivated));
    }

    #[test]
    fn gesture_cancelled_past_half_activates() {
        let mut state = TogglableState::new();
        assert_eq!(
            state.handle_gesture(ToggleAction::Activate, ActionEvent::Progress(0.6)),
            None
        );
        assert_eq!(
            state.handle_gesture(ToggleAction::Activate, ActionEvent::Cancelled),
            Some(StateChange::Activated)
        );
    }

    #[test]
    fn toggle_gesture_regresses_when_active() {
        let mut state = TogglableState::new();
        state.activate();
        state.handle_gesture(ToggleAction::Toggle, ActionEvent::Progress(0.7));
        assert_eq!(state.status(), Status::Deactivating);
        assert_eq!(
            state.handle_gesture(ToggleAction::Toggle, ActionEvent::Triggered),
            Some(StateChange::Deactivated)
        );

        // Without progress the trigger simply toggles.
        assert_eq!(
            state.handle_gesture(ToggleAction::Toggle, ActionEvent::Triggered),
            Some(StateChange::Activated)
        );
    }

    #[derive(Debug, Clone, Copy, Arbitrary)]
    enum Op {
        Activate,
        Deactivate,
        Toggle,
        Commit,
        Progress(#[proptest(strategy = "-0.5f64..1.5")] f64),
        Regress(#[proptest(strategy = "-0.5f64..1.5")] f64),
    }

    fn check_invariants(state: &TogglableState) {
        let factor = state.partial_activation_factor();
        match state.status() {
            Status::Inactive => assert_eq!(factor, 0.),
            Status::Active => assert_eq!(factor, 1.),
            Status::Activating => assert!((0. ..1.).contains(&factor)),
            Status::Deactivating => assert!(0. < factor && factor <= 1.),
        }
    }

    fn config() -> ProptestConfig {
        let cases = if std::env::var_os("RUN_SLOW_TESTS").is_some() {
            10_000
        } else {
            256
        };
        ProptestConfig {
            cases,
            ..ProptestConfig::default()
        }
    }

    proptest! {
        #![proptest_config(config())]

        #[test]
        fn invariants_hold(ops: Vec<Op>) {
            let mut state = TogglableState::new();
            let mut active = false;

            for op in ops {
                let prev_status = state.status();
                let prev_factor = state.partial_activation_factor();

                let change = match op {
                    Op::Activate => state.activate(),
                    Op::Deactivate => state.deactivate(),
                    Op::Toggle => state.toggle(),
                    Op::Commit => state.commit(),
                    Op::Progress(p) => state.set_progress(p),
                    Op::Regress(r) => state.set_regress(r),
                };

                check_invariants(&state);

                // Each transition across sides is reported exactly once.
                match change {
                    Some(StateChange::Activated) => {
                        prop_assert!(!active);
                        active = true;
                    }
                    Some(StateChange::Deactivated) => {
                        prop_assert!(active);
                        active = false;
                    }
                    None => (),
                }
                prop_assert_eq!(active, state.status() == Status::Active || state.status() == Status::Deactivating);

                if prev_status == state.status() {
                    match state.status() {
                        Status::Activating => {
                            prop_assert!(state.partial_activation_factor() >= prev_factor)
                        }
                        Status::Deactivating => {
                            prop_assert!(state.partial_activation_factor() <= prev_factor)
                        }
                        _ => (),
                    }
                }
            }
        }
    }
}
