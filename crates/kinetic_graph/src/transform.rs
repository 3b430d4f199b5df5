// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transform node operations.

use crate::graph::GraphError;
use crate::node::NodeTag;
use serde::{Deserialize, Serialize};

/// Transform operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransformProperty {
    /// Horizontal translation
    TranslateX,
    /// Vertical translation
    TranslateY,
    /// Uniform scale
    Scale,
    /// Horizontal scale
    ScaleX,
    /// Vertical scale
    ScaleY,
    /// Rotation around Z
    Rotate,
    /// Rotation around X
    RotateX,
    /// Rotation around Y
    RotateY,
    /// Rotation around Z
    RotateZ,
    /// Horizontal skew
    SkewX,
    /// Vertical skew
    SkewY,
    /// Perspective distance
    Perspective,
}

impl TransformProperty {
    /// Whether the operand is an angle
    pub fn is_angle(self) -> bool {
        matches!(
            self,
            Self::Rotate | Self::RotateX | Self::RotateY | Self::RotateZ | Self::SkewX | Self::SkewY
        )
    }
}

/// Static operand as written in a config
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StaticOperand {
    /// Plain number; angles are radians
    Number(f64),
    /// Angle with unit suffix, e.g. `"45deg"`
    Text(String),
}

/// Transform entry as written in a config
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransformConfig {
    /// Operand read from a node
    #[serde(rename_all = "camelCase")]
    Animated {
        /// Operation kind
        property: TransformProperty,
        /// Source node
        node_tag: NodeTag,
    },
    /// Constant operand
    Static {
        /// Operation kind
        property: TransformProperty,
        /// Constant value
        value: StaticOperand,
    },
}

/// Operand of a transform entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformOperand {
    /// Read from a node on evaluation
    Animated(NodeTag),
    /// Constant, already normalised
    Static(f64),
}

/// One operation of a transform node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformEntry {
    /// Operation kind
    pub property: TransformProperty,
    /// Operand
    pub operand: TransformOperand,
}

impl TransformEntry {
    /// Build an entry from config, normalising angle strings to radians
    pub fn from_config(config: TransformConfig) -> Result<Self, GraphError> {
        match config {
            TransformConfig::Animated { property, node_tag } => Ok(Self {
                property,
                operand: TransformOperand::Animated(node_tag),
            }),
            TransformConfig::Static { property, value } => {
                let value = match value {
                    StaticOperand::Number(v) => v,
                    StaticOperand::Text(text) if property.is_angle() => parse_angle(&text)?,
                    StaticOperand::Text(text) => {
                        return Err(GraphError::InvalidConfig(format!(
                            "{property:?} expects a number, got {text:?}"
                        )))
                    }
                };
                Ok(Self {
                    property,
                    operand: TransformOperand::Static(value),
                })
            }
        }
    }
}

/// Parse `"45deg"`, `"0.5rad"` or a bare number of degrees into radians
pub fn parse_angle(text: &str) -> Result<f64, GraphError> {
    let text = text.trim();
    let (number, in_radians) = if let Some(rad) = text.strip_suffix("rad") {
        (rad, true)
    } else if let Some(deg) = text.strip_suffix("deg") {
        (deg, false)
    } else {
        (text, false)
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| GraphError::InvalidConfig(format!("invalid angle {text:?}")))?;
    Ok(if in_radians { value } else { value.to_radians() })
}
