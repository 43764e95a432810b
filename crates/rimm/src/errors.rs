//! # Load Errors
//!
//! [`LoadError`] is the single error type of the detection and loading pipeline.
//! A handler that does not recognize a weight map is not an error; `detect`
//! returns `None` for that.

use std::fmt::{Display, Formatter};

/// A single key-level disagreement between a network layout and a weight map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeMismatch {
    /// The layout expects `key`, the weight map does not have it.
    Missing {
        /// Parameter key.
        key: String,
        /// Expected shape.
        expected: Vec<usize>,
    },

    /// Both sides have `key`, with different shapes.
    Shape {
        /// Parameter key.
        key: String,
        /// Expected shape.
        expected: Vec<usize>,
        /// Shape found in the weight map.
        actual: Vec<usize>,
    },
}

impl ShapeMismatch {
    /// The parameter key.
    pub fn key(&self) -> &str {
        match self {
            ShapeMismatch::Missing { key, .. } => key,
            ShapeMismatch::Shape { key, .. } => key,
        }
    }
}

impl Display for ShapeMismatch {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ShapeMismatch::Missing { key, expected } => {
                write!(f, "missing \"{key}\" (expected {expected:?})")
            }
            ShapeMismatch::Shape {
                key,
                expected,
                actual,
            } => write!(f, "\"{key}\": expected {expected:?}, found {actual:?}"),
        }
    }
}

fn summarize<T: Display>(items: &[T]) -> String {
    const LIMIT: usize = 4;
    let mut parts: Vec<String> = items.iter().take(LIMIT).map(|m| m.to_string()).collect();
    if items.len() > LIMIT {
        parts.push(format!("... {} more", items.len() - LIMIT));
    }
    parts.join(", ")
}

/// Errors of the detection, construction, and loading pipeline.
///
/// None of these are retried; the pipeline is deterministic.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// No registered architecture matched the weight map.
    #[error("unrecognized architecture: no handler matched {num_keys} weight keys (top-level: {top_level:?})")]
    UnrecognizedArchitecture {
        /// Number of keys in the rejected weight map.
        num_keys: usize,

        /// Top-level key names, for diagnosis.
        top_level: Vec<String>,
    },

    /// More than one registered architecture matched the weight map.
    #[error("ambiguous architecture: handlers {matches:?} all matched the same weight map")]
    AmbiguousArchitecture {
        /// Ids of every matching handler, in registration order.
        matches: Vec<&'static str>,
    },

    /// A hyperparameter set is internally inconsistent.
    #[error("invalid configuration for {architecture}: {reason}")]
    InvalidConfiguration {
        /// Architecture id.
        architecture: String,

        /// What was wrong.
        reason: String,
    },

    /// A handler could not construct its own detected configuration.
    #[error("internal detection error in {architecture}: {reason}")]
    InternalDetection {
        /// Architecture id.
        architecture: &'static str,

        /// What was wrong.
        reason: String,
    },

    /// Required keys are missing from the weight map, or have the wrong shape.
    #[error("weight shape mismatch for {architecture}: {}", summarize(.mismatches))]
    WeightShapeMismatch {
        /// Network name.
        architecture: String,

        /// Every mismatch, in layout order.
        mismatches: Vec<ShapeMismatch>,
    },

    /// The weight map has keys the network does not declare.
    #[error("unexpected weight keys for {architecture}: {}", summarize(.keys))]
    UnexpectedWeightKeys {
        /// Network name.
        architecture: String,

        /// The unexpected keys, in weight map order.
        keys: Vec<String>,
    },

    /// A tensor could not be converted into network storage.
    #[error("invalid tensor \"{key}\": {reason}")]
    InvalidTensor {
        /// Parameter key.
        key: String,

        /// What was wrong.
        reason: String,
    },

    /// Two handlers were registered under the same id.
    #[error("duplicate architecture id: {id}")]
    DuplicateArchitecture {
        /// The colliding id.
        id: String,
    },
}

impl LoadError {
    /// Build an [`LoadError::InvalidConfiguration`].
    pub fn invalid_config<A: Display, R: Display>(
        architecture: A,
        reason: R,
    ) -> Self {
        LoadError::InvalidConfiguration {
            architecture: architecture.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Why an input size violates a [`crate::descriptor::SizeRequirements`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizeViolation {
    /// An edge is shorter than the minimum.
    #[error("input {width}x{height} is smaller than the minimum edge {minimum}")]
    TooSmall {
        /// Input width.
        width: usize,
        /// Input height.
        height: usize,
        /// Minimum edge length.
        minimum: usize,
    },

    /// An edge is not a multiple of the required alignment.
    #[error("input {width}x{height} is not a multiple of {multiple_of}")]
    NotMultiple {
        /// Input width.
        width: usize,
        /// Input height.
        height: usize,
        /// Required alignment.
        multiple_of: usize,
    },

    /// The input is not square.
    #[error("input {width}x{height} is not square")]
    NotSquare {
        /// Input width.
        width: usize,
        /// Input height.
        height: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_display() {
        let m = ShapeMismatch::Shape {
            key: "conv.weight".to_string(),
            expected: vec![8, 3, 3, 3],
            actual: vec![8, 4, 3, 3],
        };
        assert_eq!(m.key(), "conv.weight");
        assert_eq!(
            m.to_string(),
            "\"conv.weight\": expected [8, 3, 3, 3], found [8, 4, 3, 3]"
        );

        let m = ShapeMismatch::Missing {
            key: "conv.bias".to_string(),
            expected: vec![8],
        };
        assert_eq!(m.to_string(), "missing \"conv.bias\" (expected [8])");
    }

    #[test]
    fn test_summarized_error_display() {
        let err = LoadError::UnexpectedWeightKeys {
            architecture: "Net".to_string(),
            keys: (0..6).map(|i| format!("k{i}")).collect(),
        };
        assert_eq!(
            err.to_string(),
            "unexpected weight keys for Net: k0, k1, k2, k3, ... 2 more"
        );
    }
}
