use crate::geometry::{Axis, Coordinate};
use crate::motion_gateway::{
    GripDirection, GripParameters, GripTarget, HardwareError, MotionGateway, Result, TipSpot,
};
use async_trait::async_trait;
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tracing::debug;

/// Command accepted by the simulated backend
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Setup,
    PrepareForManualOperation,
    MoveAxis {
        channel: usize,
        axis: Axis,
        value: f64,
    },
    PickUpTip {
        rack: String,
        cell: String,
        channel: usize,
    },
    DropTip {
        rack: String,
        cell: String,
        channel: usize,
    },
    PickUpResource {
        name: String,
        direction: GripDirection,
    },
    MovePickedUpResource {
        name: String,
        location: Coordinate,
        minimum_traverse_height: i32,
    },
    ReleasePickedUpResource {
        name: String,
        location: Coordinate,
        minimum_traverse_height: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Setup,
    PrepareForManualOperation,
    MoveAxis(Axis),
    PickUpTip,
    DropTip,
    PickUpResource,
    MovePickedUpResource,
    ReleasePickedUpResource,
}

#[derive(Debug, Default)]
struct SimulatedState {
    ready: bool,
    log: Vec<Command>,
    faults: Vec<(CommandKind, String)>,
    channels: Vec<Coordinate>,
    tips: Vec<bool>,
    gripped: Option<String>,
}

impl SimulatedState {
    fn take_fault(&mut self, kind: CommandKind) -> Result<()> {
        if let Some(index) = self.faults.iter().position(|(fault, _)| *fault == kind) {
            let (_, reason) = self.faults.remove(index);
            return Err(HardwareError::Fault(reason));
        }
        Ok(())
    }

    fn check_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(HardwareError::NotConnected)
        }
    }

    fn check_channel(&self, channel: usize) -> Result<()> {
        if channel < self.channels.len() {
            Ok(())
        } else {
            Err(HardwareError::Rejected {
                command: "channel command".to_owned(),
                reason: format!("no channel {}", channel),
            })
        }
    }
}

fn lock(state: &Arc<Mutex<SimulatedState>>) -> MutexGuard<'_, SimulatedState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In memory robot used by the console and the tests
pub struct SimulatedGateway {
    state: Arc<Mutex<SimulatedState>>,
    limits: [(f64, f64); 3],
    setup_delay: Duration,
}

impl SimulatedGateway {
    pub fn new(num_channels: usize) -> SimulatedGateway {
        let state = SimulatedState {
            channels: vec![Coordinate::zeros(); num_channels],
            tips: vec![false; num_channels],
            ..Default::default()
        };
        SimulatedGateway {
            state: Arc::new(Mutex::new(state)),
            limits: [(0.0, 1360.0), (0.0, 653.0), (0.0, 400.0)],
            setup_delay: Duration::from_millis(0),
        }
    }

    /// Travel range per axis as (min, max)
    pub fn with_limits(mut self, limits: [(f64, f64); 3]) -> SimulatedGateway {
        self.limits = limits;
        self
    }

    pub fn with_setup_delay(mut self, delay: Duration) -> SimulatedGateway {
        self.setup_delay = delay;
        self
    }

    /// Skip the setup handshake
    pub fn ready(self) -> SimulatedGateway {
        lock(&self.state).ready = true;
        self
    }

    pub fn handle(&self) -> SimulatedHandle {
        SimulatedHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn check_range(&self, axis: Axis, value: f64) -> Result<()> {
        let (min, max) = self.limits[axis.index()];
        if value < min || value > max {
            return Err(HardwareError::OutOfRange {
                axis,
                value,
                min,
                max,
            });
        }
        Ok(())
    }

    fn check_location(&self, location: &Coordinate) -> Result<()> {
        for axis in Axis::ALL {
            self.check_range(axis, location[axis.index()])?;
        }
        Ok(())
    }
}

/// Inspection and fault injection for a [`SimulatedGateway`] that was boxed away
#[derive(Clone)]
pub struct SimulatedHandle {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedHandle {
    pub fn commands(&self) -> Vec<Command> {
        lock(&self.state).log.clone()
    }

    pub fn clear_commands(&self) {
        lock(&self.state).log.clear();
    }

    /// Next command of this kind fails with a fault
    pub fn fail_next(&self, kind: CommandKind, reason: &str) {
        lock(&self.state).faults.push((kind, reason.to_owned()));
    }

    pub fn channel_position(&self, channel: usize) -> Option<Coordinate> {
        lock(&self.state).channels.get(channel).copied()
    }

    pub fn channel_has_tip(&self, channel: usize) -> bool {
        lock(&self.state).tips.get(channel).copied().unwrap_or(false)
    }

    pub fn gripped(&self) -> Option<String> {
        lock(&self.state).gripped.clone()
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.state).ready
    }
}

#[async_trait]
impl MotionGateway for SimulatedGateway {
    fn num_channels(&self) -> usize {
        lock(&self.state).channels.len()
    }

    async fn setup(&mut self) -> Result<()> {
        tokio::time::sleep(self.setup_delay).await;
        let mut state = lock(&self.state);
        state.take_fault(CommandKind::Setup)?;
        state.ready = true;
        state.log.push(Command::Setup);
        debug!("simulated backend set up");
        Ok(())
    }

    async fn prepare_for_manual_operation(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.check_ready()?;
        state.take_fault(CommandKind::PrepareForManualOperation)?;
        state.log.push(Command::PrepareForManualOperation);
        Ok(())
    }

    async fn move_axis(&mut self, channel: usize, axis: Axis, value: f64) -> Result<()> {
        self.check_range(axis, value)?;
        let mut state = lock(&self.state);
        state.check_ready()?;
        state.check_channel(channel)?;
        state.take_fault(CommandKind::MoveAxis(axis))?;
        state.channels[channel][axis.index()] = value;
        state.log.push(Command::MoveAxis {
            channel,
            axis,
            value,
        });
        Ok(())
    }

    async fn pick_up_tip(&mut self, spot: &TipSpot, channel: usize) -> Result<()> {
        let mut state = lock(&self.state);
        state.check_ready()?;
        state.check_channel(channel)?;
        state.take_fault(CommandKind::PickUpTip)?;
        if state.tips[channel] {
            return Err(HardwareError::Rejected {
                command: "pick up tip".to_owned(),
                reason: format!("channel {} already has a tip", channel),
            });
        }
        state.tips[channel] = true;
        state.channels[channel] = spot.location;
        state.log.push(Command::PickUpTip {
            rack: spot.rack.clone(),
            cell: spot.cell.clone(),
            channel,
        });
        Ok(())
    }

    async fn drop_tip(&mut self, spot: &TipSpot, channel: usize) -> Result<()> {
        let mut state = lock(&self.state);
        state.check_ready()?;
        state.check_channel(channel)?;
        state.take_fault(CommandKind::DropTip)?;
        if !state.tips[channel] {
            return Err(HardwareError::Rejected {
                command: "drop tip".to_owned(),
                reason: format!("channel {} has no tip", channel),
            });
        }
        state.tips[channel] = false;
        state.channels[channel] = spot.location;
        state.log.push(Command::DropTip {
            rack: spot.rack.clone(),
            cell: spot.cell.clone(),
            channel,
        });
        Ok(())
    }

    async fn pick_up_resource(&mut self, target: &GripTarget, grip: &GripParameters) -> Result<()> {
        let mut state = lock(&self.state);
        state.check_ready()?;
        state.take_fault(CommandKind::PickUpResource)?;
        if let Some(gripped) = &state.gripped {
            return Err(HardwareError::Rejected {
                command: "pick up resource".to_owned(),
                reason: format!("already holding {}", gripped),
            });
        }
        state.gripped = Some(target.name.clone());
        state.log.push(Command::PickUpResource {
            name: target.name.clone(),
            direction: grip.direction,
        });
        Ok(())
    }

    async fn move_picked_up_resource(
        &mut self,
        target: &GripTarget,
        location: Coordinate,
        _direction: GripDirection,
        minimum_traverse_height: i32,
    ) -> Result<()> {
        self.check_location(&location)?;
        let mut state = lock(&self.state);
        state.check_ready()?;
        state.take_fault(CommandKind::MovePickedUpResource)?;
        state.log.push(Command::MovePickedUpResource {
            name: target.name.clone(),
            location,
            minimum_traverse_height,
        });
        Ok(())
    }

    async fn release_picked_up_resource(
        &mut self,
        target: &GripTarget,
        location: Coordinate,
        _grip: &GripParameters,
        minimum_traverse_height: i32,
    ) -> Result<()> {
        self.check_location(&location)?;
        let mut state = lock(&self.state);
        state.check_ready()?;
        state.take_fault(CommandKind::ReleasePickedUpResource)?;
        if state.gripped.as_deref() != Some(target.name.as_str()) {
            return Err(HardwareError::Rejected {
                command: "release resource".to_owned(),
                reason: format!("not holding {}", target.name),
            });
        }
        state.gripped = None;
        state.log.push(Command::ReleasePickedUpResource {
            name: target.name.clone(),
            location,
            minimum_traverse_height,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commands_require_setup() {
        let mut gateway = SimulatedGateway::new(8);
        let result = gateway.move_axis(7, Axis::X, 100.0).await;
        assert_eq!(result, Err(HardwareError::NotConnected));
        gateway.setup().await.unwrap();
        gateway.move_axis(7, Axis::X, 100.0).await.unwrap();
        assert_eq!(gateway.handle().channel_position(7).unwrap().x, 100.0);
    }

    #[tokio::test]
    async fn rejects_targets_out_of_range() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let result = gateway.move_axis(0, Axis::Z, 500.0).await;
        assert!(matches!(result, Err(HardwareError::OutOfRange { axis: Axis::Z, .. })));
        assert!(gateway.handle().commands().is_empty());
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let handle = gateway.handle();
        handle.fail_next(CommandKind::MoveAxis(Axis::Y), "encoder lost");
        gateway.move_axis(0, Axis::X, 1.0).await.unwrap();
        assert_eq!(
            gateway.move_axis(0, Axis::Y, 1.0).await,
            Err(HardwareError::Fault("encoder lost".to_owned()))
        );
        gateway.move_axis(0, Axis::Y, 1.0).await.unwrap();
        assert_eq!(handle.commands().len(), 2);
    }

    #[tokio::test]
    async fn cannot_pick_up_two_tips() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let spot = TipSpot {
            rack: "tips".to_owned(),
            cell: "A1".to_owned(),
            location: Coordinate::new(10.0, 10.0, 10.0),
            tip_length: 50.0,
        };
        gateway.pick_up_tip(&spot, 0).await.unwrap();
        assert!(gateway.pick_up_tip(&spot, 0).await.is_err());
        gateway.drop_tip(&spot, 0).await.unwrap();
        assert!(!gateway.handle().channel_has_tip(0));
    }
}
