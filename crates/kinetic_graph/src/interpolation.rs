// SPDX-License-Identifier: MIT OR Apache-2.0
//! Piecewise-linear interpolation nodes.

use crate::graph::GraphError;
use crate::node::NodeTag;
use serde::{Deserialize, Serialize};

/// What to do with an input outside the breakpoint range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extrapolate {
    /// Continue the slope of the outermost segment
    #[default]
    Extend,
    /// Hold the outermost output
    Clamp,
    /// Pass the input through unchanged
    Identity,
}

/// Interpolation node state
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationNode {
    /// Input node
    pub input: Option<NodeTag>,
    input_range: Vec<f64>,
    output_range: Vec<f64>,
    /// Policy below the first breakpoint
    pub extrapolate_left: Extrapolate,
    /// Policy above the last breakpoint
    pub extrapolate_right: Extrapolate,
}

impl InterpolationNode {
    /// Create an interpolation, validating the breakpoints
    pub fn new(
        input: Option<NodeTag>,
        input_range: Vec<f64>,
        output_range: Vec<f64>,
        extrapolate_left: Extrapolate,
        extrapolate_right: Extrapolate,
    ) -> Result<Self, GraphError> {
        if input_range.len() < 2 {
            return Err(GraphError::InvalidConfig(
                "interpolation needs at least two breakpoints".to_string(),
            ));
        }
        if input_range.len() != output_range.len() {
            return Err(GraphError::InvalidConfig(format!(
                "inputRange has {} entries but outputRange has {}",
                input_range.len(),
                output_range.len()
            )));
        }
        if input_range.iter().chain(&output_range).any(|v| !v.is_finite()) {
            return Err(GraphError::InvalidConfig(
                "interpolation breakpoints must be finite".to_string(),
            ));
        }
        if input_range.windows(2).any(|w| w[1] < w[0]) {
            return Err(GraphError::InvalidConfig(
                "inputRange must be non-decreasing".to_string(),
            ));
        }

        Ok(Self {
            input,
            input_range,
            output_range,
            extrapolate_left,
            extrapolate_right,
        })
    }

    /// Input breakpoints
    pub fn input_range(&self) -> &[f64] {
        &self.input_range
    }

    /// Output breakpoints
    pub fn output_range(&self) -> &[f64] {
        &self.output_range
    }

    /// Map an input value through the breakpoints
    pub fn evaluate(&self, value: f64) -> f64 {
        let index = self.find_segment(value);
        interpolate(
            value,
            self.input_range[index],
            self.input_range[index + 1],
            self.output_range[index],
            self.output_range[index + 1],
            self.extrapolate_left,
            self.extrapolate_right,
        )
    }

    /// Index of the segment bracketing `value`; outer segments absorb
    /// out-of-range inputs.
    fn find_segment(&self, value: f64) -> usize {
        let last = self.input_range.len() - 1;
        let mut index = 1;
        while index < last {
            if self.input_range[index] >= value {
                break;
            }
            index += 1;
        }
        index - 1
    }
}

fn interpolate(
    value: f64,
    input_min: f64,
    input_max: f64,
    output_min: f64,
    output_max: f64,
    left: Extrapolate,
    right: Extrapolate,
) -> f64 {
    let mut result = value;

    if result < input_min {
        match left {
            Extrapolate::Identity => return result,
            Extrapolate::Clamp => result = input_min,
            Extrapolate::Extend => {}
        }
    }

    if result > input_max {
        match right {
            Extrapolate::Identity => return result,
            Extrapolate::Clamp => result = input_max,
            Extrapolate::Extend => {}
        }
    }

    if output_min == output_max {
        return output_min;
    }

    if input_min == input_max {
        return if value <= input_min { output_min } else { output_max };
    }

    output_min + (output_max - output_min) * (result - input_min) / (input_max - input_min)
}
