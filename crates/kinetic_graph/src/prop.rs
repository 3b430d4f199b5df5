// SPDX-License-Identifier: MIT OR Apache-2.0
//! Values handed to the view-property layer.

use crate::transform::TransformProperty;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Property name to value, in declaration order
pub type PropMap = IndexMap<String, PropValue>;

/// A single evaluated transform operation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformValue {
    /// Operation kind
    pub property: TransformProperty,
    /// Operand; angles are in radians
    pub value: f64,
}

/// Value of one view property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    /// Scalar property (opacity, color channel, offset...)
    Number(f64),
    /// Ordered transform list
    Transform(Vec<TransformValue>),
    /// Reset the property to the view's own default
    Default,
}

impl PropValue {
    /// Get as number if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as transform list if possible
    pub fn as_transform(&self) -> Option<&[TransformValue]> {
        match self {
            PropValue::Transform(list) => Some(list),
            _ => None,
        }
    }
}
