use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DomainError, Result};

/// Symbolic tag names the motion view reads and writes
pub mod tags {
    use super::Axis;

    pub fn position(axis: Axis) -> String {
        format!("motion.{}.position", axis.as_str())
    }

    pub fn target(axis: Axis) -> String {
        format!("motion.{}.target", axis.as_str())
    }

    pub fn speed(axis: Axis) -> String {
        format!("motion.{}.speed", axis.as_str())
    }

    pub fn jog(axis: Axis) -> String {
        format!("motion.{}.jog", axis.as_str())
    }

    pub fn moving(axis: Axis) -> String {
        format!("motion.{}.moving", axis.as_str())
    }

    pub fn homed(axis: Axis) -> String {
        format!("motion.{}.homed", axis.as_str())
    }

    pub fn enabled(axis: Axis) -> String {
        format!("motion.{}.enabled", axis.as_str())
    }

    pub fn home(axis: Axis) -> String {
        format!("motion.{}.home", axis.as_str())
    }

    pub const STOP: &str = "motion.stop";
}

/// Fact names the motion view reports
pub mod facts {
    pub const ALL_HOMED: &str = "motion.all_homed";
    pub const SAFE_TO_MOVE: &str = "motion.safe_to_move";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Self::X),
            "y" => Ok(Self::Y),
            "z" => Ok(Self::Z),
            other => Err(DomainError::InvalidCommand(format!("Unknown axis '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisState {
    pub axis: Axis,
    pub position: f64,
    pub target: f64,
    pub speed: f64,
    pub moving: bool,
    pub homed: bool,
    pub enabled: bool,
}

/// Composed, read-only view of the motion system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionState {
    pub axes: Vec<AxisState>,
    /// Any axis reports moving
    pub in_motion: bool,
    pub all_homed: bool,
    pub safe_to_move: bool,
    pub timestamp: DateTime<Utc>,
}

impl MotionState {
    pub fn axis(&self, axis: Axis) -> Option<&AxisState> {
        self.axes.iter().find(|a| a.axis == axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_parse() {
        assert_eq!(Axis::parse("X").unwrap(), Axis::X);
        assert!(matches!(Axis::parse("w"), Err(DomainError::InvalidCommand(_))));
    }

    #[test]
    fn test_axis_tag_names() {
        assert_eq!(tags::position(Axis::Z), "motion.z.position");
        assert_eq!(tags::home(Axis::Y), "motion.y.home");
    }
}
