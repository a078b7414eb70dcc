//! Common identifier types shared by lifts, floors and passengers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a lift car.
///
/// Lifts are created once at startup, so a small sequential number is
/// enough to keep them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LiftId(pub u32);

impl fmt::Display for LiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Unique, monotonically increasing passenger identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PassengerId(pub u64);

impl PassengerId {
    /// Returns the identifier that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for PassengerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Index of a floor in ascending height order.
///
/// Because floors are stored sorted by height, comparing two `FloorId`s
/// compares the floors' heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FloorId(pub usize);

impl FloorId {
    /// Returns the floor index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FloorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        assert_eq!(LiftId(2).to_string(), "L2");
        assert_eq!(PassengerId(17).to_string(), "P17");
        assert_eq!(FloorId(5).to_string(), "005");
    }

    #[test]
    fn test_floor_order_follows_index() {
        assert!(FloorId(3) > FloorId(1));
        assert_eq!(PassengerId(4).next(), PassengerId(5));
    }
}
