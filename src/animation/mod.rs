use std::time::Duration;

use keyframe::functions::{
    EaseInCubic, EaseInOutCubic, EaseInOutQuad, EaseInQuad, EaseOutCubic, EaseOutQuad,
};
use keyframe::EasingFunction;

mod bezier;
pub use bezier::CubicBezier;

mod clock;
pub use clock::Clock;

/// Clock-driven animation of a single value.
#[derive(Debug, Clone)]
pub struct Animation {
    from: f64,
    to: f64,
    duration: Duration,
    start_time: Duration,
    clock: Clock,
    curve: Curve,
}

/// Easing curves available to effects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    OutExpo,
    InBack,
    OutBack,
    InOutBack,
    OutElastic,
    OutBounce,
    CubicBezier(CubicBezier),
}

/// Elapsed-time progress of an animation advanced by explicit deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeline {
    duration: Duration,
    elapsed: Duration,
    curve: Curve,
    reversed: bool,
}

impl Animation {
    pub fn new(clock: Clock, from: f64, to: f64, duration_ms: u64, curve: Curve) -> Self {
        let duration = if clock.should_complete_instantly() {
            Duration::ZERO
        } else {
            Duration::from_millis(duration_ms)
        };

        Self {
            from,
            to,
            duration,
            start_time: clock.now(),
            clock,
            curve,
        }
    }

    /// Restarts towards `to` from the current value with the same duration and curve.
    pub fn restarted(&self, to: f64) -> Self {
        Self::new(
            self.clock.clone(),
            self.value(),
            to,
            self.duration.as_millis() as u64,
            self.curve,
        )
    }

    pub fn is_done(&self) -> bool {
        if self.clock.should_complete_instantly() {
            return true;
        }

        self.clock.now() >= self.start_time + self.duration
    }

    pub fn value_at(&self, at: Duration) -> f64 {
        if at <= self.start_time {
            return self.from;
        } else if self.start_time + self.duration <= at || self.clock.should_complete_instantly()
        {
            return self.to;
        }

        let passed = (at - self.start_time).as_secs_f64();
        let x = (passed / self.duration.as_secs_f64()).clamp(0., 1.);
        self.curve.y(x) * (self.to - self.from) + self.from
    }

    pub fn value(&self) -> f64 {
        self.value_at(self.clock.now())
    }

    pub fn from(&self) -> f64 {
        self.from
    }

    pub fn to(&self) -> f64 {
        self.to
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn end_time(&self) -> Duration {
        self.start_time + self.duration
    }
}

impl Curve {
    pub fn y(self, x: f64) -> f64 {
        const S: f64 = 1.70158;

        match self {
            Curve::Linear => x,
            Curve::InQuad => EaseInQuad.y(x),
            Curve::OutQuad => EaseOutQuad.y(x),
            Curve::InOutQuad => EaseInOutQuad.y(x),
            Curve::InCubic => EaseInCubic.y(x),
            Curve::OutCubic => EaseOutCubic.y(x),
            Curve::InOutCubic => EaseInOutCubic.y(x),
            Curve::OutExpo => {
                if x >= 1. {
                    1.
                } else {
                    1. - 2f64.powf(-10. * x)
                }
            }
            Curve::InBack => x * x * ((S + 1.) * x - S),
            Curve::OutBack => {
                let t = x - 1.;
                t * t * ((S + 1.) * t + S) + 1.
            }
            Curve::InOutBack => {
                let s = S * 1.525;
                let t = x * 2.;
                if t < 1. {
                    0.5 * (t * t * ((s + 1.) * t - s))
                } else {
                    let t = t - 2.;
                    0.5 * (t * t * ((s + 1.) * t + s) + 2.)
                }
            }
            Curve::OutElastic => {
                if x <= 0. {
                    return 0.;
                }
                if x >= 1. {
                    return 1.;
                }
                let period = 0.3;
                let s = period / 4.;
                2f64.powf(-10. * x) * ((x - s) * std::f64::consts::TAU / period).sin() + 1.
            }
            Curve::OutBounce => out_bounce(x),
            Curve::CubicBezier(b) => b.y(x),
        }
    }

    /// Whether the curve leaves `[0, 1]` on the way to its end value.
    ///
    /// Bits are set for the ends that get overshot: `1` below the start, `2` past the end.
    pub fn overshoot_ends(self) -> u8 {
        match self {
            Curve::InOutBack => 1 | 2,
            Curve::OutBack | Curve::OutElastic => 2,
            Curve::InBack => 1,
            Curve::CubicBezier(b) => {
                let mut ends = 0;
                if (0..=20).any(|i| b.y(f64::from(i) / 20.) < 0.) {
                    ends |= 1;
                }
                if (0..=20).any(|i| b.y(f64::from(i) / 20.) > 1.) {
                    ends |= 2;
                }
                ends
            }
            _ => 0,
        }
    }
}

fn out_bounce(x: f64) -> f64 {
    const N: f64 = 7.5625;
    const D: f64 = 2.75;

    if x < 1. / D {
        N * x * x
    } else if x < 2. / D {
        let t = x - 1.5 / D;
        N * t * t + 0.75
    } else if x < 2.5 / D {
        let t = x - 2.25 / D;
        N * t * t + 0.9375
    } else {
        let t = x - 2.625 / D;
        N * t * t + 0.984375
    }
}

impl Timeline {
    pub fn new(duration: Duration, curve: Curve) -> Self {
        Self {
            duration,
            elapsed: Duration::ZERO,
            curve,
            reversed: false,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Advances by `delta`, never past the duration.
    pub fn advance(&mut self, delta: Duration) {
        self.elapsed = (self.elapsed + delta).min(self.duration);
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed.min(self.duration);
    }

    /// Changes the duration, keeping the elapsed time in range.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
        self.elapsed = self.elapsed.min(duration);
    }

    /// Flips the direction, keeping the current visual progress.
    pub fn reverse(&mut self) {
        self.reversed = !self.reversed;
        self.elapsed = self.duration - self.elapsed;
    }

    pub fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Linear progress in `[0, 1]`, running backwards when reversed.
    pub fn linear_progress(&self) -> f64 {
        let p = if self.duration.is_zero() {
            1.
        } else {
            self.elapsed.as_secs_f64() / self.duration.as_secs_f64()
        };
        if self.reversed {
            1. - p
        } else {
            p
        }
    }

    /// Eased progress, `0` at the start and `1` at the end.
    pub fn value(&self) -> f64 {
        self.curve.y(self.linear_progress())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    const ALL: [Curve; 13] = [
        Curve::Linear,
        Curve::InQuad,
        Curve::OutQuad,
        Curve::InOutQuad,
        Curve::InCubic,
        Curve::OutCubic,
        Curve::InOutCubic,
        Curve::OutExpo,
        Curve::InBack,
        Curve::OutBack,
        Curve::InOutBack,
        Curve::OutElastic,
        Curve::OutBounce,
    ];

    #[test]
    fn curves_hit_endpoints() {
        for curve in ALL {
            assert_abs_diff_eq!(curve.y(0.), 0., epsilon = 1e-9);
            assert_abs_diff_eq!(curve.y(1.), 1., epsilon = 1e-9);
        }
    }

    #[test]
    fn overshooting_curves_are_flagged() {
        for curve in ALL {
            let samples: Vec<f64> = (0..=200).map(|i| curve.y(f64::from(i) / 200.)).collect();
            let below = samples.iter().any(|y| *y < -1e-9);
            let above = samples.iter().any(|y| *y > 1. + 1e-9);
            let ends = curve.overshoot_ends();
            assert_eq!(below, ends & 1 != 0, "{curve:?}");
            assert_eq!(above, ends & 2 != 0, "{curve:?}");
        }
    }

    #[test]
    fn timeline_clamps_and_reverses() {
        let mut t = Timeline::new(Duration::from_millis(200), Curve::Linear);
        t.advance(Duration::from_millis(50));
        assert_abs_diff_eq!(t.value(), 0.25);
        t.reverse();
        assert_abs_diff_eq!(t.value(), 0.25);
        assert_eq!(t.elapsed(), Duration::from_millis(150));
        t.advance(Duration::from_millis(500));
        assert!(t.is_done());
        assert_abs_diff_eq!(t.value(), 0.);
    }

    #[test]
    fn clock_animation() {
        let mut clock = Clock::with_time(Duration::ZERO);
        let anim = Animation::new(clock.clone(), 1., 3., 100, Curve::Linear);
        clock.set_unadjusted(Duration::from_millis(50));
        assert_abs_diff_eq!(anim.value(), 2.);
        assert!(!anim.is_done());
        clock.set_unadjusted(Duration::from_millis(150));
        assert_abs_diff_eq!(anim.value(), 3.);
        assert!(anim.is_done());
    }
}
