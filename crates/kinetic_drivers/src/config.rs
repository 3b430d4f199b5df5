// SPDX-License-Identifier: MIT OR Apache-2.0
//! Driver configuration as received from the scripting side.

use crate::clock::ClockAnimation;
use crate::decay::DecayAnimation;
use crate::driver::Animation;
use crate::easing::Easing;
use crate::set::DriverError;
use crate::spring::SpringAnimation;
use crate::timing::{TimingAnimation, TimingCurve};
use serde::Deserialize;

/// How many times an animation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    /// A fixed number of runs, at least one
    Count(u32),
    /// Loop until stopped
    Infinite,
}

impl Iterations {
    /// Parse the config form: `-1` loops forever, positive counts run that
    /// many times
    pub fn from_config(raw: Option<i64>) -> Result<Self, DriverError> {
        match raw {
            None => Ok(Self::Count(1)),
            Some(-1) => Ok(Self::Infinite),
            Some(n) if n >= 1 => u32::try_from(n)
                .map(Self::Count)
                .map_err(|_| DriverError::InvalidConfig(format!("iterations {n} out of range"))),
            Some(n) => Err(DriverError::InvalidConfig(format!(
                "iterations must be -1 or at least 1, got {n}"
            ))),
        }
    }

    /// Whether another run follows `completed` runs
    pub fn continues_after(self, completed: u32) -> bool {
        match self {
            Self::Count(total) => completed < total,
            Self::Infinite => true,
        }
    }
}

/// Driver config, tagged by `"type"`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DriverConfig {
    /// Eased progress toward a value over a duration
    #[serde(rename_all = "camelCase")]
    Timing {
        /// End value
        to_value: f64,
        /// Duration in milliseconds
        #[serde(default)]
        duration: Option<f64>,
        /// Precomputed progress sampled at 60 Hz; overrides duration and easing
        #[serde(default)]
        frames: Option<Vec<f64>>,
        /// Easing curve
        #[serde(default)]
        easing: Option<Easing>,
        /// Run count, `-1` for infinite
        #[serde(default)]
        iterations: Option<i64>,
        /// Milliseconds to hold the start value
        #[serde(default)]
        delay: Option<f64>,
    },
    /// Damped harmonic oscillator
    #[serde(rename_all = "camelCase")]
    Spring {
        /// Rest position
        to_value: f64,
        /// Spring constant
        #[serde(default = "SpringAnimation::default_stiffness")]
        stiffness: f64,
        /// Damping coefficient
        #[serde(default = "SpringAnimation::default_damping")]
        damping: f64,
        /// Mass
        #[serde(default = "SpringAnimation::default_mass")]
        mass: f64,
        /// Starting velocity in units per second
        #[serde(default)]
        initial_velocity: f64,
        /// Finish as soon as the target is crossed
        #[serde(default)]
        overshoot_clamping: bool,
        /// Distance to the target considered at rest
        #[serde(default = "SpringAnimation::default_threshold")]
        rest_displacement_threshold: f64,
        /// Speed considered at rest
        #[serde(default = "SpringAnimation::default_threshold")]
        rest_speed_threshold: f64,
        /// Run count, `-1` for infinite
        #[serde(default)]
        iterations: Option<i64>,
    },
    /// Velocity decaying exponentially
    Decay {
        /// Starting velocity in units per second
        velocity: f64,
        /// Per-millisecond velocity multiplier, in `(0, 1)`
        #[serde(default = "DecayAnimation::default_deceleration")]
        deceleration: f64,
        /// Run count, `-1` for infinite
        #[serde(default)]
        iterations: Option<i64>,
    },
    /// Frame time in milliseconds, until stopped
    Clock {},
}

impl DriverConfig {
    /// Parse a config from its JSON form
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DriverError> {
        serde_json::from_value(value.clone()).map_err(|e| DriverError::InvalidConfig(e.to_string()))
    }

    /// Config name of the kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timing { .. } => "timing",
            Self::Spring { .. } => "spring",
            Self::Decay { .. } => "decay",
            Self::Clock {} => "clock",
        }
    }

    /// Validate the config and build its animation
    pub fn build(&self) -> Result<(Box<dyn Animation>, Iterations), DriverError> {
        let invalid = |msg: String| DriverError::InvalidConfig(msg);
        match self {
            Self::Timing {
                to_value,
                duration,
                frames,
                easing,
                iterations,
                delay,
            } => {
                finite("toValue", *to_value)?;
                let delay = delay.unwrap_or(0.0);
                if !delay.is_finite() || delay < 0.0 {
                    return Err(invalid(format!("delay must be non-negative, got {delay}")));
                }
                let curve = match frames {
                    Some(frames) => {
                        if frames.is_empty() || frames.iter().any(|f| !f.is_finite()) {
                            return Err(invalid("frames must be a non-empty list of numbers".to_string()));
                        }
                        TimingCurve::Frames(frames.clone())
                    }
                    None => {
                        let duration = duration.unwrap_or(TimingAnimation::DEFAULT_DURATION_MS);
                        if !duration.is_finite() || duration < 0.0 {
                            return Err(invalid(format!(
                                "duration must be non-negative, got {duration}"
                            )));
                        }
                        let easing = easing.unwrap_or_default();
                        easing.validate().map_err(invalid)?;
                        TimingCurve::Eased { duration, easing }
                    }
                };
                Ok((
                    Box::new(TimingAnimation::new(*to_value, curve, delay)),
                    Iterations::from_config(*iterations)?,
                ))
            }
            Self::Spring {
                to_value,
                stiffness,
                damping,
                mass,
                initial_velocity,
                overshoot_clamping,
                rest_displacement_threshold,
                rest_speed_threshold,
                iterations,
            } => {
                finite("toValue", *to_value)?;
                finite("initialVelocity", *initial_velocity)?;
                non_negative("stiffness", *stiffness)?;
                non_negative("damping", *damping)?;
                non_negative("restDisplacementThreshold", *rest_displacement_threshold)?;
                non_negative("restSpeedThreshold", *rest_speed_threshold)?;
                if !mass.is_finite() || *mass <= 0.0 {
                    return Err(invalid(format!("mass must be positive, got {mass}")));
                }
                let mut spring = SpringAnimation::new(*to_value);
                spring.stiffness = *stiffness;
                spring.damping = *damping;
                spring.mass = *mass;
                spring.initial_velocity = *initial_velocity;
                spring.overshoot_clamping = *overshoot_clamping;
                spring.rest_displacement_threshold = *rest_displacement_threshold;
                spring.rest_speed_threshold = *rest_speed_threshold;
                Ok((Box::new(spring), Iterations::from_config(*iterations)?))
            }
            Self::Decay {
                velocity,
                deceleration,
                iterations,
            } => {
                finite("velocity", *velocity)?;
                if !(*deceleration > 0.0 && *deceleration < 1.0) {
                    return Err(invalid(format!(
                        "deceleration must lie in (0, 1), got {deceleration}"
                    )));
                }
                Ok((
                    Box::new(DecayAnimation::new(*velocity, *deceleration)),
                    Iterations::from_config(*iterations)?,
                ))
            }
            Self::Clock {} => Ok((Box::new(ClockAnimation), Iterations::Count(1))),
        }
    }
}

fn finite(name: &str, value: f64) -> Result<(), DriverError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(DriverError::InvalidConfig(format!("{name} must be finite")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), DriverError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DriverError::InvalidConfig(format!(
            "{name} must be non-negative, got {value}"
        )))
    }
}
