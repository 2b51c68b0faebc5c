use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deck coordinate in millimeters.
///
/// Offsets and absolute locations share this type, the meaning
/// depends on where the value came from.
pub type Coordinate = na::Vector3<f64>;

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

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    pub fn factor(self) -> f64 {
        match self {
            Sign::Plus => 1.0,
            Sign::Minus => -1.0,
        }
    }
}

/// Operator facing jog directions
///
/// Back is away from the operator (+y), forward is towards them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogDirection {
    Left,
    Right,
    Back,
    Forward,
    Up,
    Down,
}

impl JogDirection {
    pub const ALL: [JogDirection; 6] = [
        JogDirection::Left,
        JogDirection::Right,
        JogDirection::Back,
        JogDirection::Forward,
        JogDirection::Up,
        JogDirection::Down,
    ];

    pub fn axis_and_sign(self) -> (Axis, Sign) {
        match self {
            JogDirection::Left => (Axis::X, Sign::Minus),
            JogDirection::Right => (Axis::X, Sign::Plus),
            JogDirection::Back => (Axis::Y, Sign::Plus),
            JogDirection::Forward => (Axis::Y, Sign::Minus),
            JogDirection::Up => (Axis::Z, Sign::Plus),
            JogDirection::Down => (Axis::Z, Sign::Minus),
        }
    }
}

impl fmt::Display for JogDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JogDirection::Left => "left",
            JogDirection::Right => "right",
            JogDirection::Back => "back",
            JogDirection::Forward => "forward",
            JogDirection::Up => "up",
            JogDirection::Down => "down",
        };
        write!(f, "{}", name)
    }
}

/// Round every axis to a multiple of `precision`
pub fn round_to(coordinate: Coordinate, precision: f64) -> Coordinate {
    if precision <= 0.0 {
        return coordinate;
    }
    coordinate.map(|value| (value / precision).round() * precision)
}

/// Human readable form matching what the move-plate call expects
pub fn format_coordinate(coordinate: &Coordinate) -> String {
    format!(
        "Coordinate(x={:.1}, y={:.1}, z={:.1})",
        coordinate.x, coordinate.y, coordinate.z
    )
}
