// SPDX-License-Identifier: MIT OR Apache-2.0
//! Easing curves for timing drivers.

use serde::{Deserialize, Serialize};

/// Easing curve applied to timing progress
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Easing {
    /// Constant speed
    Linear,
    /// Standard ease, `bezier(0.25, 0.1, 0.25, 1)`
    Ease,
    /// `bezier(0.42, 0, 1, 1)`
    EaseIn,
    /// `bezier(0, 0, 0.58, 1)`
    EaseOut,
    /// `bezier(0.42, 0, 0.58, 1)`
    #[default]
    EaseInOut,
    /// `t^2`
    Quad,
    /// `t^3`
    Cubic,
    /// Quarter sine wave
    Sin,
    /// Quarter circle
    Circle,
    /// Exponential, `2^(10(t-1))`
    Exp,
    /// Custom cubic bezier `[x1, y1, x2, y2]`
    Bezier([f64; 4]),
}

impl Easing {
    /// Map progress `t` in `[0, 1]` through the curve
    pub fn ease(self, t: f64) -> f64 {
        match self {
            Self::Linear => t,
            Self::Ease => CubicBezier::new(0.25, 0.1, 0.25, 1.0).solve(t),
            Self::EaseIn => CubicBezier::new(0.42, 0.0, 1.0, 1.0).solve(t),
            Self::EaseOut => CubicBezier::new(0.0, 0.0, 0.58, 1.0).solve(t),
            Self::EaseInOut => CubicBezier::new(0.42, 0.0, 0.58, 1.0).solve(t),
            Self::Quad => t * t,
            Self::Cubic => t * t * t,
            Self::Sin => 1.0 - (t * std::f64::consts::FRAC_PI_2).cos(),
            Self::Circle => 1.0 - (1.0 - t * t).max(0.0).sqrt(),
            Self::Exp => 2f64.powf(10.0 * (t - 1.0)),
            Self::Bezier([x1, y1, x2, y2]) => CubicBezier::new(x1, y1, x2, y2).solve(t),
        }
    }

    /// Check the curve parameters
    pub fn validate(&self) -> Result<(), String> {
        if let Self::Bezier(points) = self {
            if points.iter().any(|p| !p.is_finite()) {
                return Err("bezier control points must be finite".to_string());
            }
            if !(0.0..=1.0).contains(&points[0]) || !(0.0..=1.0).contains(&points[2]) {
                return Err("bezier x control points must lie in [0, 1]".to_string());
            }
        }
        Ok(())
    }
}

/// Cubic bezier from `(0, 0)` to `(1, 1)` with two control points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl CubicBezier {
    const NEWTON_ITERATIONS: usize = 8;
    const EPSILON: f64 = 1e-7;

    /// Create a curve from its control points
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    fn component(p1: f64, p2: f64, t: f64) -> f64 {
        let mt = 1.0 - t;
        3.0 * p1 * mt * mt * t + 3.0 * p2 * mt * t * t + t * t * t
    }

    fn slope(p1: f64, p2: f64, t: f64) -> f64 {
        let mt = 1.0 - t;
        3.0 * p1 * mt * mt + 6.0 * (p2 - p1) * mt * t + 3.0 * (1.0 - p2) * t * t
    }

    /// Curve parameter whose x equals `x`
    fn parameter_for(&self, x: f64) -> f64 {
        let mut t = x;
        for _ in 0..Self::NEWTON_ITERATIONS {
            let error = Self::component(self.x1, self.x2, t) - x;
            if error.abs() < Self::EPSILON {
                return t;
            }
            let slope = Self::slope(self.x1, self.x2, t);
            if slope.abs() < 1e-6 {
                break;
            }
            t -= error / slope;
        }

        // Newton stalled, bisect
        let (mut low, mut high) = (0.0, 1.0);
        t = x;
        while high - low > Self::EPSILON {
            let value = Self::component(self.x1, self.x2, t);
            if (value - x).abs() < Self::EPSILON {
                break;
            }
            if value < x {
                low = t;
            } else {
                high = t;
            }
            t = (low + high) / 2.0;
        }
        t
    }

    /// Eased value for progress `x`
    pub fn solve(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }
        if self.x1 == self.y1 && self.x2 == self.y2 {
            return x;
        }
        Self::component(self.y1, self.y2, self.parameter_for(x))
    }
}
