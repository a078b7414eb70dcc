//! Static floor layout.
//!
//! Floors are stored in ascending height order and addressed by their
//! index (`FloorId`), so "above" and "below" are plain id comparisons.

use liftgroup_env::FloorId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FloorError {
    #[error("Building has no floors")]
    Empty,

    #[error("Floor {index} height {height} is not above the previous floor ({previous})")]
    NotAscending {
        index: usize,
        previous: f64,
        height: f64,
    },

    #[error("Floor {index} has an invalid height: {height}")]
    InvalidHeight { index: usize, height: f64 },

    #[error("Unknown floor: {0}")]
    Unknown(FloorId),
}

/// One landing. Immutable after the registry is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Floor {
    pub id: FloorId,
    pub name: String,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloorRegistry {
    floors: Vec<Floor>,
}

impl FloorRegistry {
    /// Builds a registry from `(name, height)` pairs listed bottom to top.
    pub fn new(layout: Vec<(String, f64)>) -> Result<Self, FloorError> {
        if layout.is_empty() {
            return Err(FloorError::Empty);
        }

        let mut floors: Vec<Floor> = Vec::with_capacity(layout.len());
        for (index, (name, height)) in layout.into_iter().enumerate() {
            if !height.is_finite() {
                return Err(FloorError::InvalidHeight { index, height });
            }
            if let Some(previous) = floors.last() {
                if height <= previous.height {
                    return Err(FloorError::NotAscending {
                        index,
                        previous: previous.height,
                        height,
                    });
                }
            }
            floors.push(Floor {
                id: FloorId(index),
                name,
                height,
            });
        }

        Ok(Self { floors })
    }

    /// Floors named "000", "001", ... at the given heights.
    pub fn from_heights(heights: &[f64]) -> Result<Self, FloorError> {
        Self::new(
            heights
                .iter()
                .enumerate()
                .map(|(i, h)| (format!("{:03}", i), *h))
                .collect(),
        )
    }

    /// `count` floors evenly spaced from height 0.
    pub fn uniform(count: usize, spacing: f64) -> Result<Self, FloorError> {
        let heights: Vec<f64> = (0..count).map(|i| i as f64 * spacing).collect();
        Self::from_heights(&heights)
    }

    pub fn len(&self) -> usize {
        self.floors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.floors.is_empty()
    }

    pub fn floors(&self) -> &[Floor] {
        &self.floors
    }

    pub fn ids(&self) -> impl Iterator<Item = FloorId> + '_ {
        self.floors.iter().map(|f| f.id)
    }

    pub fn floor(&self, id: FloorId) -> Result<&Floor, FloorError> {
        self.floors.get(id.index()).ok_or(FloorError::Unknown(id))
    }

    pub fn height(&self, id: FloorId) -> Result<f64, FloorError> {
        self.floor(id).map(|f| f.height)
    }

    pub fn contains(&self, id: FloorId) -> bool {
        id.index() < self.floors.len()
    }

    pub fn lowest(&self) -> FloorId {
        FloorId(0)
    }

    pub fn highest(&self) -> FloorId {
        FloorId(self.floors.len().saturating_sub(1))
    }

    /// Lowest or highest floor, where a car has only one way to go.
    pub fn is_boundary(&self, id: FloorId) -> bool {
        id == self.lowest() || id == self.highest()
    }

    pub fn by_name(&self, name: &str) -> Option<FloorId> {
        self.floors.iter().find(|f| f.name == name).map(|f| f.id)
    }

    /// Floor whose height is closest to `height`.
    pub fn nearest(&self, height: f64) -> FloorId {
        self.floors
            .iter()
            .min_by(|a, b| {
                (a.height - height)
                    .abs()
                    .total_cmp(&(b.height - height).abs())
            })
            .map(|f| f.id)
            .unwrap_or(FloorId(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout() {
        let floors = FloorRegistry::uniform(6, 3.0).unwrap();
        assert_eq!(floors.len(), 6);
        assert_eq!(floors.height(FloorId(5)).unwrap(), 15.0);
        assert_eq!(floors.floor(FloorId(2)).unwrap().name, "002");
        assert_eq!(floors.highest(), FloorId(5));
        assert!(floors.is_boundary(FloorId(0)));
        assert!(!floors.is_boundary(FloorId(3)));
    }

    #[test]
    fn test_rejects_bad_layouts() {
        assert_eq!(FloorRegistry::new(vec![]), Err(FloorError::Empty));
        assert!(matches!(
            FloorRegistry::from_heights(&[0.0, 4.0, 4.0]),
            Err(FloorError::NotAscending { index: 2, .. })
        ));
        assert!(matches!(
            FloorRegistry::from_heights(&[0.0, f64::NAN]),
            Err(FloorError::InvalidHeight { index: 1, .. })
        ));
    }

    #[test]
    fn test_unknown_floor() {
        let floors = FloorRegistry::uniform(3, 3.0).unwrap();
        assert_eq!(floors.height(FloorId(3)), Err(FloorError::Unknown(FloorId(3))));
        assert!(!floors.contains(FloorId(3)));
    }

    #[test]
    fn test_lookup_by_name_and_height() {
        let floors = FloorRegistry::new(vec![
            ("G".to_string(), 0.0),
            ("M".to_string(), 5.5),
            ("L02".to_string(), 9.0),
        ])
        .unwrap();
        assert_eq!(floors.by_name("M"), Some(FloorId(1)));
        assert_eq!(floors.by_name("roof"), None);
        assert_eq!(floors.nearest(8.0), FloorId(2));
        assert_eq!(floors.nearest(-3.0), FloorId(0));
    }
}
