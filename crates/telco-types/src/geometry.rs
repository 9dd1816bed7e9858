//! Planar positions on the simulated map.
//!
//! Coordinates are meters on a flat plane. There is no terrain and no
//! curvature; distance is plain Euclidean.

use serde::{Deserialize, Serialize};

/// Error returned when a coordinate is NaN or infinite.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("position coordinates must be finite, got ({x}, {y})")]
pub struct InvalidPositionError {
    /// The rejected x coordinate.
    pub x: f64,
    /// The rejected y coordinate.
    pub y: f64,
}

/// A point on the map, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// East-west coordinate.
    pub x: f64,
    /// North-south coordinate.
    pub y: f64,
}

impl Position {
    /// Build a position, rejecting non-finite coordinates.
    pub fn new(x: f64, y: f64) -> Result<Self, InvalidPositionError> {
        if x.is_finite() && y.is_finite() {
            Ok(Self { x, y })
        } else {
            Err(InvalidPositionError { x, y })
        }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_finite_coordinates() {
        assert!(Position::new(f64::NAN, 0.0).is_err());
        assert!(Position::new(0.0, f64::INFINITY).is_err());
        assert!(Position::new(-3.5, 12.0).is_ok());
    }

    #[test]
    fn distance_is_euclidean_and_symmetric() {
        let a = Position { x: 0.0, y: 0.0 };
        let b = Position { x: 3.0, y: 4.0 };
        assert!((a.distance_to(b) - 5.0).abs() < 1e-12);
        assert!((b.distance_to(a) - 5.0).abs() < 1e-12);
        assert!(a.distance_to(a).abs() < f64::EPSILON);
    }
}
