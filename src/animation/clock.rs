use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::utils::get_monotonic_time;

/// Shared animation clock.
///
/// The clock reads the monotonic time once and keeps returning it until [`Clock::clear`] is
/// called, so everything computed within one frame sees the same instant. The time is scaled by
/// a rate derived from the animation slowdown.
#[derive(Debug, Default, Clone)]
pub struct Clock {
    inner: Rc<RefCell<Inner>>,
}

#[derive(Debug)]
struct Inner {
    /// Latched unscaled time, `None` when it needs to be fetched again.
    raw: Option<Duration>,
    last_raw: Duration,
    scaled: Duration,
    rate: f64,
    complete_instantly: bool,
}

impl Clock {
    pub fn with_time(time: Duration) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::new(Some(time)))),
        }
    }

    /// Current scaled time.
    pub fn now(&self) -> Duration {
        self.inner.borrow_mut().now()
    }

    pub fn now_unadjusted(&self) -> Duration {
        self.inner.borrow_mut().raw()
    }

    /// Latches the unscaled time, e.g. to the target presentation time of a frame.
    pub fn set_unadjusted(&mut self, time: Duration) {
        self.inner.borrow_mut().raw = Some(time);
    }

    /// Forgets the latched time so it's fetched again next.
    pub fn clear(&mut self) {
        self.inner.borrow_mut().raw = None;
    }

    pub fn rate(&self) -> f64 {
        self.inner.borrow().rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.inner.borrow_mut().rate = rate.clamp(0., 1000.);
    }

    /// Applies the animation config: slowdown becomes the inverse rate and `off` completes every
    /// animation instantly.
    pub fn configure(&mut self, config: &glaze_config::Animations) {
        let rate = if config.slowdown <= f64::EPSILON {
            1000.
        } else {
            1. / config.slowdown
        };
        self.set_rate(rate);
        self.set_complete_instantly(config.off);
    }

    pub fn should_complete_instantly(&self) -> bool {
        self.inner.borrow().complete_instantly
    }

    pub fn set_complete_instantly(&mut self, value: bool) {
        self.inner.borrow_mut().complete_instantly = value;
    }
}

impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Clock {}

impl Inner {
    fn new(raw: Option<Duration>) -> Self {
        let start = raw.unwrap_or_else(get_monotonic_time);
        Self {
            raw: Some(start),
            last_raw: start,
            scaled: start,
            rate: 1.,
            complete_instantly: false,
        }
    }

    fn raw(&mut self) -> Duration {
        *self.raw.get_or_insert_with(get_monotonic_time)
    }

    fn now(&mut self) -> Duration {
        let raw = self.raw();
        if raw >= self.last_raw {
            let delta = (raw - self.last_raw).mul_f64(self.rate);
            self.scaled = self.scaled.saturating_add(delta);
        } else {
            let delta = (self.last_raw - raw).mul_f64(self.rate);
            self.scaled = self.scaled.saturating_sub(delta);
        }
        self.last_raw = raw;
        self.scaled
    }
}

impl Default for Inner {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn latched_time() {
        let mut clock = Clock::with_time(Duration::ZERO);
        assert_eq!(clock.now(), Duration::ZERO);

        clock.set_unadjusted(100 * MS);
        assert_eq!(clock.now(), 100 * MS);
        assert_eq!(clock.now(), 100 * MS);
    }

    #[test]
    fn slowdown_scales_time() {
        let mut clock = Clock::with_time(Duration::ZERO);
        clock.configure(&glaze_config::Animations {
            slowdown: 2.,
            ..Default::default()
        });

        clock.set_unadjusted(100 * MS);
        assert_eq!(clock.now_unadjusted(), 100 * MS);
        assert_eq!(clock.now(), 50 * MS);

        clock.set_unadjusted(80 * MS);
        assert_eq!(clock.now(), 40 * MS);

        clock.set_rate(2.);
        clock.set_unadjusted(180 * MS);
        assert_eq!(clock.now(), 240 * MS);
    }

    #[test]
    fn animations_off_complete_instantly() {
        let mut clock = Clock::with_time(Duration::ZERO);
        clock.configure(&glaze_config::Animations {
            off: true,
            ..Default::default()
        });
        assert!(clock.should_complete_instantly());
    }
}
