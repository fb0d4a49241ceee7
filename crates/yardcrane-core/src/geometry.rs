//! Crane-space geometry.
//!
//! All coordinates are integer millimetres in the yard frame. `z` is the hoist
//! height above the yard floor.

use serde::{Deserialize, Serialize};

/// A point in crane space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// Bridge travel axis.
    pub x: i32,
    /// Trolley travel axis.
    pub y: i32,
    /// Hoist axis.
    pub z: i32,
}

impl Position {
    /// Create a new position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Return this position with the hoist axis replaced.
    #[must_use]
    pub const fn with_z(self, z: i32) -> Self {
        Self { z, ..self }
    }

    /// Move toward `goal` by at most `step` on each axis without overshooting.
    #[must_use]
    pub fn approach(self, goal: Self, step: AxisStep) -> Self {
        Self {
            x: approach_axis(self.x, goal.x, step.x),
            y: approach_axis(self.y, goal.y, step.y),
            z: approach_axis(self.z, goal.z, step.z),
        }
    }
}

fn approach_axis(current: i32, goal: i32, step: u32) -> i32 {
    let step = i64::from(step);
    let diff = i64::from(goal) - i64::from(current);
    let moved = i64::from(current) + diff.clamp(-step, step);
    // `moved` lies between `current` and `goal`, both of which are i32.
    i32::try_from(moved).unwrap_or(goal)
}

/// Maximum per-tick travel on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisStep {
    /// Millimetres per tick along x.
    pub x: u32,
    /// Millimetres per tick along y.
    pub y: u32,
    /// Millimetres per tick along z.
    pub z: u32,
}

impl AxisStep {
    /// Create a new per-axis step.
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// Axis-aligned box of reachable positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    /// Lowest corner.
    pub min: Position,
    /// Highest corner.
    pub max: Position,
}

impl Bounds {
    /// Create new bounds from two corners.
    #[must_use]
    pub const fn new(min: Position, max: Position) -> Self {
        Self { min, max }
    }

    /// Returns true if `min` does not exceed `max` on any axis.
    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Clamp a position into the box.
    ///
    /// The bounds must be ordered.
    #[must_use]
    pub fn clamp(&self, p: Position) -> Position {
        Position {
            x: p.x.clamp(self.min.x, self.max.x),
            y: p.y.clamp(self.min.y, self.max.y),
            z: p.z.clamp(self.min.z, self.max.z),
        }
    }

    /// Check whether the position lies inside the box.
    #[must_use]
    pub fn contains(&self, p: Position) -> bool {
        self.clamp(p) == p
    }
}

/// Physical dimensions of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    /// Length in millimetres.
    pub length: u32,
    /// Width in millimetres.
    pub width: u32,
    /// Thickness in millimetres.
    pub thickness: u32,
    /// Weight in kilograms.
    pub weight: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(length: u32, width: u32, thickness: u32, weight: u32) -> Self {
        Self {
            length,
            width,
            thickness,
            weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approach_never_overshoots() {
        let start = Position::new(0, 0, 1000);
        let goal = Position::new(150, -500, 1040);
        let next = start.approach(goal, AxisStep::new(200, 200, 80));
        assert_eq!(next, Position::new(150, -200, 1040));
    }

    #[test]
    fn approach_reaches_goal_eventually() {
        let goal = Position::new(1000, 1000, 2000);
        let mut p = Position::new(0, 0, 0);
        for _ in 0..100 {
            p = p.approach(goal, AxisStep::new(200, 200, 80));
        }
        assert_eq!(p, goal);
    }

    #[test]
    fn approach_with_zero_step_stays() {
        let p = Position::new(5, 5, 5);
        assert_eq!(p.approach(Position::new(9, 9, 9), AxisStep::new(0, 0, 0)), p);
    }

    #[test]
    fn bounds_ordering() {
        let bounds = Bounds::new(Position::new(0, 0, 0), Position::new(10_000, 5_000, 6_000));
        assert!(bounds.is_ordered());
        assert!(Bounds::new(Position::new(1, 1, 1), Position::new(1, 1, 1)).is_ordered());
        assert!(!Bounds::new(Position::new(0, 6_000, 0), Position::new(10_000, 5_000, 6_000)).is_ordered());
    }

    #[test]
    fn bounds_clamp() {
        let bounds = Bounds::new(Position::new(0, 0, 0), Position::new(10_000, 5_000, 6_000));
        assert_eq!(
            bounds.clamp(Position::new(-5, 7_000, 3_000)),
            Position::new(0, 5_000, 3_000)
        );
        assert!(bounds.contains(Position::new(1, 1, 1)));
        assert!(!bounds.contains(Position::new(1, 1, 7_000)));
    }
}
