//! # Input Size Requirements

use crate::errors::SizeViolation;
use serde::{Deserialize, Serialize};

/// Input-size constraints a network imposes.
///
/// All fields are independently optional; the default value is unconstrained.
///
/// ```rust
/// use rimm::descriptor::SizeRequirements;
///
/// let size = SizeRequirements::default().with_multiple_of(8).with_minimum(16);
/// assert!(size.is_satisfied_by(32, 48));
/// assert!(!size.is_satisfied_by(8, 8));
/// assert_eq!(size.padding(20, 9), (4, 7));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizeRequirements {
    /// The smallest allowed edge length.
    pub minimum: Option<usize>,

    /// A required divisor of width and height.
    pub multiple_of: Option<usize>,

    /// Must width equal height?
    pub square: bool,
}

impl SizeRequirements {
    /// Set the minimum edge length.
    ///
    /// A minimum of `0` or `1` is no constraint.
    pub fn with_minimum(
        self,
        minimum: usize,
    ) -> Self {
        Self {
            minimum: (minimum > 1).then_some(minimum),
            ..self
        }
    }

    /// Set the required alignment.
    ///
    /// An alignment of `1` is no constraint.
    ///
    /// # Panics
    ///
    /// If `multiple_of` is zero.
    pub fn with_multiple_of(
        self,
        multiple_of: usize,
    ) -> Self {
        assert!(multiple_of > 0, "multiple_of must be positive");
        Self {
            multiple_of: (multiple_of > 1).then_some(multiple_of),
            ..self
        }
    }

    /// Require square inputs.
    pub fn with_square(
        self,
        square: bool,
    ) -> Self {
        Self { square, ..self }
    }

    /// Is this the unconstrained value?
    pub fn is_none(&self) -> bool {
        self.minimum.is_none() && self.multiple_of.is_none() && !self.square
    }

    /// Check an input size.
    pub fn check(
        &self,
        width: usize,
        height: usize,
    ) -> Result<(), SizeViolation> {
        if let Some(minimum) = self.minimum {
            if width < minimum || height < minimum {
                return Err(SizeViolation::TooSmall {
                    width,
                    height,
                    minimum,
                });
            }
        }
        if let Some(multiple_of) = self.multiple_of {
            if width % multiple_of != 0 || height % multiple_of != 0 {
                return Err(SizeViolation::NotMultiple {
                    width,
                    height,
                    multiple_of,
                });
            }
        }
        if self.square && width != height {
            return Err(SizeViolation::NotSquare { width, height });
        }
        Ok(())
    }

    /// Does an input size satisfy the requirements?
    pub fn is_satisfied_by(
        &self,
        width: usize,
        height: usize,
    ) -> bool {
        self.check(width, height).is_ok()
    }

    /// The smallest `(pad_width, pad_height)` that makes an input acceptable.
    ///
    /// Padding is applied to the right and bottom edges.
    pub fn padding(
        &self,
        width: usize,
        height: usize,
    ) -> (usize, usize) {
        let align = |edge: usize| {
            let edge = edge.max(self.minimum.unwrap_or(0));
            match self.multiple_of {
                Some(m) => edge.div_ceil(m) * m,
                None => edge,
            }
        };

        let (mut w, mut h) = (align(width), align(height));
        if self.square {
            let edge = w.max(h);
            w = edge;
            h = edge;
        }
        (w - width, h - height)
    }
}
