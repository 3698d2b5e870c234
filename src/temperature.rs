//! Validated temperature readings.
//!
//! A temperature in thermwatch is only meaningful relative to other
//! readings of the same fleet; the scale is whatever the subsystems
//! report. Readings that are not finite or not strictly positive are
//! invalid by contract and never admitted, which is what makes the
//! ordering below total.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A validated subsystem temperature reading.
///
/// Construction enforces the invariants the ordered tracker relies on:
/// values are finite and strictly positive, so comparing two readings is
/// always meaningful and `Ord` below agrees with plain `f32` ordering.
///
/// # Examples
///
/// ```
/// use thermwatch::Temperature;
///
/// let t = Temperature::new(37.48).unwrap();
/// assert_eq!(t.value(), 37.48);
/// assert!(Temperature::new(-1.0).is_err());
/// assert!(Temperature::new(f32::NAN).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Temperature(f32);

impl Temperature {
    /// Admits a raw reading.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NonFiniteTemperature` for NaN or infinite
    /// values, and `ValidationError::NonPositiveTemperature` for values at
    /// or below zero.
    pub fn new(value: f32) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteTemperature { value });
        }
        if value <= 0.0 {
            return Err(ValidationError::NonPositiveTemperature { value });
        }
        Ok(Self(value))
    }

    /// The raw reading.
    #[must_use]
    pub const fn value(self) -> f32 {
        self.0
    }
}

// No NaN can be constructed, so equality is an equivalence relation.
impl Eq for Temperature {}

impl Ord for Temperature {
    fn cmp(&self, other: &Self) -> Ordering {
        // total_cmp matches numeric order on the positive finite range
        // enforced by the constructor.
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for Temperature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TryFrom<f32> for Temperature {
    type Error = ValidationError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Temperature> for f32 {
    fn from(temp: Temperature) -> Self {
        temp.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
