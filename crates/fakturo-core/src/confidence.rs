//! Bounded confidence scores.
//!
//! All confidence arithmetic in the pipeline goes through
//! [`Confidence`] so that combination rules (minimum, scaling) stay
//! auditable instead of being ad hoc float math scattered across
//! stages.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A confidence score clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f32);

impl Confidence {
    /// Full confidence.
    pub const CERTAIN: Confidence = Confidence(1.0);

    /// Zero confidence.
    pub const NONE: Confidence = Confidence(0.0);

    /// Create a confidence score, clamping into `[0, 1]`.
    ///
    /// NaN clamps to zero.
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// The raw score.
    pub fn value(self) -> f32 {
        self.0
    }

    /// Minimum of two scores.
    pub fn min(self, other: Confidence) -> Confidence {
        if self.0 <= other.0 { self } else { other }
    }

    /// Scale by a factor in `[0, 1]`.
    ///
    /// The result is never greater than the original score, so stages
    /// that are only allowed to lower confidence use this.
    pub fn scale(self, factor: f32) -> Confidence {
        Self::new(self.0 * factor.clamp(0.0, 1.0))
    }

    /// Arithmetic mean of a non-empty slice; zero for an empty one.
    pub fn mean(scores: &[Confidence]) -> Confidence {
        if scores.is_empty() {
            return Self::NONE;
        }
        let sum: f32 = scores.iter().map(|c| c.0).sum();
        Self::new(sum / scores.len() as f32)
    }

    /// Whether this score is at or above a threshold.
    pub fn at_least(self, threshold: f32) -> bool {
        self.0 >= threshold
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::NONE
    }
}

impl Eq for Confidence {}

impl PartialOrd for Confidence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Confidence {
    fn cmp(&self, other: &Self) -> Ordering {
        // Values are clamped and NaN-free, so total_cmp is a plain
        // numeric order here.
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        assert_eq!(Confidence::new(1.5).value(), 1.0);
        assert_eq!(Confidence::new(-0.3).value(), 0.0);
        assert_eq!(Confidence::new(f32::NAN).value(), 0.0);
    }

    #[test]
    fn test_scale_never_raises() {
        let c = Confidence::new(0.8);
        assert!(c.scale(0.5).value() <= c.value());
        assert!(c.scale(1.0).value() <= c.value());
        // Factors above 1 are clamped, not amplifying.
        assert!(c.scale(2.0).value() <= c.value());
    }

    #[test]
    fn test_min_and_ordering() {
        let a = Confidence::new(0.3);
        let b = Confidence::new(0.9);
        assert_eq!(a.min(b), a);
        assert!(a < b);
        assert_eq!([b, a].iter().min(), Some(&a));
    }

    #[test]
    fn test_mean() {
        let scores = [Confidence::new(0.5), Confidence::new(1.0)];
        assert_eq!(Confidence::mean(&scores), Confidence::new(0.75));
        assert_eq!(Confidence::mean(&[]), Confidence::NONE);
    }
}
