use keyframe::EasingFunction;

/// CSS-style cubic Bézier easing through (0, 0), (x1, y1), (x2, y2), (1, 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl CubicBezier {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1: x1.clamp(0., 1.),
            y1,
            x2: x2.clamp(0., 1.),
            y2,
        }
    }

    fn sample(a1: f64, a2: f64, t: f64) -> f64 {
        let omt = 1. - t;
        3. * omt * omt * t * a1 + 3. * omt * t * t * a2 + t * t * t
    }

    fn slope_x(&self, t: f64) -> f64 {
        let omt = 1. - t;
        3. * omt * omt * self.x1 + 6. * omt * t * (self.x2 - self.x1) + 3. * t * t * (1. - self.x2)
    }

    fn t_for_x(&self, x: f64) -> f64 {
        // A few Newton steps converge for most curves.
        let mut t = x;
        for _ in 0..8 {
            let err = Self::sample(self.x1, self.x2, t) - x;
            if err.abs() < 1e-7 {
                return t;
            }
            let slope = self.slope_x(t);
            if slope.abs() < 1e-6 {
                break;
            }
            t = (t - err / slope).clamp(0., 1.);
        }

        // Flat spots: bisect.
        let (mut lo, mut hi) = (0., 1.);
        for _ in 0..40 {
            let mid = (lo + hi) / 2.;
            if Self::sample(self.x1, self.x2, mid) < x {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        (lo + hi) / 2.
    }
}

impl EasingFunction for CubicBezier {
    fn y(&self, x: f64) -> f64 {
        if x <= 0. {
            return 0.;
        }
        if x >= 1. {
            return 1.;
        }
        Self::sample(self.y1, self.y2, self.t_for_x(x))
    }
}
