//! Fixed 3D positions of every pixel on the tree.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, TreeError};

/// A pixel position in layout units.
pub type Point = [i32; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Immutable ordered list of pixel positions plus cached per-axis bounds.
///
/// Loaded once at startup and shared read-only by every effect.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateSpace {
    points: Vec<Point>,
    bounds: [(i32, i32); 3],
}

impl CoordinateSpace {
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.is_empty() {
            return Err(TreeError::Layout {
                line: 0,
                message: "layout contains no pixels".into(),
            });
        }

        let mut bounds = [(i32::MAX, i32::MIN); 3];
        for point in &points {
            for (axis, value) in point.iter().enumerate() {
                bounds[axis].0 = bounds[axis].0.min(*value);
                bounds[axis].1 = bounds[axis].1.max(*value);
            }
        }

        Ok(Self { points, bounds })
    }

    /// Reads a layout file with one `x,y,z` line per pixel.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let space = Self::from_csv(&text)?;
        tracing::info!(?path, pixels = space.len(), "loaded layout");
        Ok(space)
    }

    /// Parses `x,y,z` lines. Blank lines are skipped; anything else that does
    /// not hold exactly three integers is rejected.
    pub fn from_csv(text: &str) -> Result<Self> {
        let mut points = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let values = line
                .split(',')
                .map(|value| value.trim().parse::<i32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|err| TreeError::Layout {
                    line: index + 1,
                    message: err.to_string(),
                })?;

            match values.as_slice() {
                [x, y, z] => points.push([*x, *y, *z]),
                other => {
                    return Err(TreeError::Layout {
                        line: index + 1,
                        message: format!("expected 3 values, found {}", other.len()),
                    })
                }
            }
        }
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Cached `[min, max]` along `axis`.
    pub fn bounds(&self, axis: Axis) -> (i32, i32) {
        self.bounds[axis.index()]
    }

    /// Position of `value` between the axis bounds, in `[0, 1]`. Degenerate
    /// axes (min == max) map everything to 0.
    pub fn normalize(&self, axis: Axis, value: i32) -> f32 {
        let (min, max) = self.bounds(axis);
        if max <= min {
            return 0.0;
        }
        ((value - min) as f32 / (max - min) as f32).clamp(0.0, 1.0)
    }
}
