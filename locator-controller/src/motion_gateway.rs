use crate::geometry::{Axis, Coordinate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    #[error("backend rejected {command}: {reason}")]
    Rejected { command: String, reason: String },
    #[error("{axis} target {value:.1} mm is outside travel range {min:.1}..{max:.1} mm")]
    OutOfRange {
        axis: Axis,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("backend is not set up")]
    NotConnected,
    #[error("actuator fault: {0}")]
    Fault(String),
}

pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GripDirection {
    Front,
    Back,
    Left,
    Right,
}

/// Everything a backend needs to grip a resource
#[derive(Debug, Clone, PartialEq)]
pub struct GripTarget {
    pub name: String,
    pub absolute_location: Coordinate,
    pub size: Coordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GripParameters {
    pub direction: GripDirection,
    pub pickup_distance_from_top: f64,
    pub offset: Coordinate,
}

/// A tip position inside a rack
#[derive(Debug, Clone, PartialEq)]
pub struct TipSpot {
    pub rack: String,
    pub cell: String,
    /// absolute location of the spot's center
    pub location: Coordinate,
    pub tip_length: f64,
}

/// Minimum traverse height passed along with plate moves
///
/// Backends expect an integer in their own units, `scale` converts from mm.
/// This is a hint, nothing here checks that the path is collision free.
pub fn minimum_traverse_height_hint(z: f64, plate_height: f64, scale: f64) -> i32 {
    ((z + plate_height / 2.0).trunc() * scale) as i32
}

/// Motion primitives of a liquid handling robot
///
/// Every call either completes or fails, there is no retry at this level.
#[async_trait]
pub trait MotionGateway: Send {
    fn num_channels(&self) -> usize;
    /// Slow initial handshake with the hardware
    async fn setup(&mut self) -> Result<()>;
    async fn prepare_for_manual_operation(&mut self) -> Result<()>;
    async fn move_axis(&mut self, channel: usize, axis: Axis, value: f64) -> Result<()>;
    async fn pick_up_tip(&mut self, spot: &TipSpot, channel: usize) -> Result<()>;
    async fn drop_tip(&mut self, spot: &TipSpot, channel: usize) -> Result<()>;
    async fn pick_up_resource(&mut self, target: &GripTarget, grip: &GripParameters) -> Result<()>;
    async fn move_picked_up_resource(
        &mut self,
        target: &GripTarget,
        location: Coordinate,
        direction: GripDirection,
        minimum_traverse_height: i32,
    ) -> Result<()>;
    async fn release_picked_up_resource(
        &mut self,
        target: &GripTarget,
        location: Coordinate,
        grip: &GripParameters,
        minimum_traverse_height: i32,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traverse_hint_truncates_before_scaling() {
        assert_eq!(minimum_traverse_height_hint(200.0, 14.0, 10.0), 2070);
        assert_eq!(minimum_traverse_height_hint(100.9, 0.0, 10.0), 1000);
    }

    #[test]
    fn hardware_error_reports_range() {
        let error = HardwareError::OutOfRange {
            axis: Axis::Y,
            value: 700.0,
            min: 0.0,
            max: 650.0,
        };
        assert_eq!(
            error.to_string(),
            "y target 700.0 mm is outside travel range 0.0..650.0 mm"
        );
    }
}
