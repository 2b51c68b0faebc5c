use crate::config::TeachConfig;
use crate::error::{Result, TeachError};
use crate::geometry::{Axis, Coordinate, JogDirection, Sign};
use crate::motion_gateway::{minimum_traverse_height_hint, GripDirection, GripTarget, MotionGateway};
use tracing::debug;

/// Values closer than this are treated as the same position
const POSITION_EPSILON: f64 = 1e-4;

/// What a jog physically moves
#[derive(Debug, Clone, PartialEq)]
pub enum JogTarget {
    /// A pipetting channel, moved one axis at a time
    Channel(usize),
    /// A resource held by the plate gripper, moved as a whole
    PickedUpResource {
        target: GripTarget,
        direction: GripDirection,
        traverse_height_scale: f64,
    },
}

/// Tracks where the operator wants the tool to be
///
/// Axes are committed one by one after the backend accepted them,
/// so a failed move leaves the last accepted value in place.
#[derive(Debug, Clone)]
pub struct JogController {
    axes: [Option<f64>; 3],
    step: f64,
    allowed_steps: Vec<f64>,
    locked: bool,
    target: Option<JogTarget>,
}

impl JogController {
    pub fn new(allowed_steps: Vec<f64>, default_step: f64) -> Result<JogController> {
        if !allowed_steps.contains(&default_step) {
            return Err(TeachError::InvalidStep(default_step));
        }
        Ok(JogController {
            axes: [None; 3],
            step: default_step,
            allowed_steps,
            locked: true,
            target: None,
        })
    }

    pub fn from_config(config: &TeachConfig) -> Result<JogController> {
        JogController::new(config.step_sizes.clone(), config.default_step)
    }

    /// `None` until every axis has been set once
    pub fn position(&self) -> Option<Coordinate> {
        match self.axes {
            [Some(x), Some(y), Some(z)] => Some(Coordinate::new(x, y, z)),
            _ => None,
        }
    }

    pub fn axis(&self, axis: Axis) -> Option<f64> {
        self.axes[axis.index()]
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn allowed_steps(&self) -> &[f64] {
        &self.allowed_steps
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn target(&self) -> Option<&JogTarget> {
        self.target.as_ref()
    }

    pub fn set_step(&mut self, step: f64) -> Result<()> {
        if !self.allowed_steps.contains(&step) {
            return Err(TeachError::InvalidStep(step));
        }
        self.step = step;
        Ok(())
    }

    /// Switch what is moved and unlock jogging.
    /// The old position means nothing for the new target so it is forgotten.
    pub fn engage(&mut self, target: JogTarget) {
        debug!(?target, "jog target engaged");
        self.target = Some(target);
        self.axes = [None; 3];
        self.locked = false;
    }

    pub fn disengage(&mut self) {
        self.locked = true;
    }

    pub async fn jog(
        &mut self,
        gateway: &mut dyn MotionGateway,
        direction: JogDirection,
    ) -> Result<Coordinate> {
        let (axis, sign) = direction.axis_and_sign();
        self.move_relative(gateway, axis, sign).await
    }

    pub async fn move_relative(
        &mut self,
        gateway: &mut dyn MotionGateway,
        axis: Axis,
        sign: Sign,
    ) -> Result<Coordinate> {
        if self.locked {
            return Err(TeachError::invalid_state("jog", "jogging is locked"));
        }
        let current = self
            .position()
            .ok_or_else(|| TeachError::invalid_state("jog", "the position is unknown"))?;
        let mut requested = [None; 3];
        requested[axis.index()] = Some(current[axis.index()] + sign.factor() * self.step);
        self.apply(gateway, requested).await?;
        // position is complete, it was before the move
        Ok(self.position().unwrap_or(current))
    }

    /// Partial absolute move. Omitted axes keep their value,
    /// on the first call every axis must be given.
    pub async fn set_absolute(
        &mut self,
        gateway: &mut dyn MotionGateway,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
    ) -> Result<()> {
        self.apply(gateway, [x, y, z]).await
    }

    pub async fn set_position(
        &mut self,
        gateway: &mut dyn MotionGateway,
        position: Coordinate,
    ) -> Result<()> {
        self.apply(gateway, [Some(position.x), Some(position.y), Some(position.z)])
            .await
    }

    async fn apply(
        &mut self,
        gateway: &mut dyn MotionGateway,
        requested: [Option<f64>; 3],
    ) -> Result<()> {
        let missing: Vec<Axis> = Axis::ALL
            .iter()
            .copied()
            .filter(|axis| {
                requested[axis.index()].is_none() && self.axes[axis.index()].is_none()
            })
            .collect();
        if !missing.is_empty() {
            return Err(TeachError::IncompletePosition(missing));
        }
        match self.target.clone() {
            Some(JogTarget::Channel(channel)) => {
                self.apply_per_axis(gateway, channel, requested).await
            }
            Some(JogTarget::PickedUpResource {
                target,
                direction,
                traverse_height_scale,
            }) => {
                self.apply_whole(gateway, &target, direction, traverse_height_scale, requested)
                    .await
            }
            None => Err(TeachError::invalid_state(
                "move",
                "nothing is engaged for jogging",
            )),
        }
    }

    fn changed(&self, axis: Axis, value: f64) -> bool {
        match self.axes[axis.index()] {
            Some(current) => (current - value).abs() > POSITION_EPSILON,
            None => true,
        }
    }

    async fn apply_per_axis(
        &mut self,
        gateway: &mut dyn MotionGateway,
        channel: usize,
        requested: [Option<f64>; 3],
    ) -> Result<()> {
        for axis in axis_order(&self.axes, &requested) {
            let value = match requested[axis.index()] {
                Some(value) if self.changed(axis, value) => value,
                _ => continue,
            };
            debug!(channel, %axis, value, "moving channel");
            gateway.move_axis(channel, axis, value).await?;
            self.axes[axis.index()] = Some(value);
        }
        Ok(())
    }

    async fn apply_whole(
        &mut self,
        gateway: &mut dyn MotionGateway,
        target: &GripTarget,
        direction: GripDirection,
        traverse_height_scale: f64,
        requested: [Option<f64>; 3],
    ) -> Result<()> {
        let changed = Axis::ALL.iter().any(|axis| {
            requested[axis.index()]
                .map(|value| self.changed(*axis, value))
                .unwrap_or(false)
        });
        if !changed {
            return Ok(());
        }
        let mut location = Coordinate::zeros();
        for axis in Axis::ALL {
            // checked complete by the caller
            location[axis.index()] = requested[axis.index()]
                .or(self.axes[axis.index()])
                .unwrap_or_default();
        }
        let hint = minimum_traverse_height_hint(location.z, target.size.z, traverse_height_scale);
        debug!(resource = %target.name, ?location, hint, "moving picked up resource");
        gateway
            .move_picked_up_resource(target, location, direction, hint)
            .await?;
        self.axes = [Some(location.x), Some(location.y), Some(location.z)];
        Ok(())
    }
}

/// z goes last when rising and first when descending
fn axis_order(current: &[Option<f64>; 3], requested: &[Option<f64>; 3]) -> [Axis; 3] {
    match (current[Axis::Z.index()], requested[Axis::Z.index()]) {
        (Some(current_z), Some(requested_z)) if requested_z < current_z => {
            [Axis::Z, Axis::X, Axis::Y]
        }
        _ => [Axis::X, Axis::Y, Axis::Z],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{Command, CommandKind, SimulatedGateway};
    use approx::assert_relative_eq;

    fn controller() -> JogController {
        JogController::new(vec![0.1, 1.0, 10.0, 100.0], 10.0).unwrap()
    }

    async fn engaged_at(
        gateway: &mut SimulatedGateway,
        start: Coordinate,
    ) -> JogController {
        let mut jog = controller();
        jog.engage(JogTarget::Channel(0));
        jog.set_position(gateway, start).await.unwrap();
        jog
    }

    fn moved_axes(commands: &[Command]) -> Vec<Axis> {
        commands
            .iter()
            .filter_map(|command| match command {
                Command::MoveAxis { axis, .. } => Some(*axis),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn relative_moves_sum_up() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let start = Coordinate::new(100.0, 100.0, 100.0);
        let mut jog = engaged_at(&mut gateway, start).await;

        jog.jog(&mut gateway, JogDirection::Right).await.unwrap();
        jog.jog(&mut gateway, JogDirection::Right).await.unwrap();
        jog.set_step(1.0).unwrap();
        jog.jog(&mut gateway, JogDirection::Back).await.unwrap();
        jog.jog(&mut gateway, JogDirection::Down).await.unwrap();
        jog.set_step(0.1).unwrap();
        jog.jog(&mut gateway, JogDirection::Left).await.unwrap();
        let position = jog.move_relative(&mut gateway, Axis::Z, Sign::Plus).await.unwrap();

        let expected = start + Coordinate::new(20.0 - 0.1, 1.0, -1.0 + 0.1);
        assert_relative_eq!(position, expected, epsilon = 1e-9);
        assert_relative_eq!(
            gateway.handle().channel_position(0).unwrap(),
            expected,
            epsilon = 1e-9
        );
    }

    #[tokio::test]
    async fn first_absolute_needs_every_axis() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let mut jog = controller();
        jog.engage(JogTarget::Channel(0));

        let result = jog
            .set_absolute(&mut gateway, Some(10.0), None, Some(10.0))
            .await;

        assert!(matches!(
            result,
            Err(TeachError::IncompletePosition(missing)) if missing == vec![Axis::Y]
        ));
        assert_eq!(jog.position(), None);
        assert!(gateway.handle().commands().is_empty());
    }

    #[tokio::test]
    async fn failed_axis_keeps_old_value_and_stops() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let mut jog = engaged_at(&mut gateway, Coordinate::new(100.0, 100.0, 100.0)).await;
        gateway
            .handle()
            .fail_next(CommandKind::MoveAxis(Axis::Y), "y drive fault");

        let result = jog
            .set_absolute(&mut gateway, Some(150.0), Some(160.0), Some(170.0))
            .await;

        assert!(matches!(result, Err(TeachError::Hardware(_))));
        assert_eq!(jog.position(), Some(Coordinate::new(150.0, 100.0, 100.0)));
    }

    #[tokio::test]
    async fn partial_update_keeps_other_axes() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let mut jog = engaged_at(&mut gateway, Coordinate::new(100.0, 100.0, 100.0)).await;
        gateway.handle().clear_commands();

        jog.set_absolute(&mut gateway, None, Some(50.0), None)
            .await
            .unwrap();

        assert_eq!(jog.position(), Some(Coordinate::new(100.0, 50.0, 100.0)));
        assert_eq!(moved_axes(&gateway.handle().commands()), vec![Axis::Y]);
    }

    #[tokio::test]
    async fn unchanged_axes_are_not_sent() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let mut jog = engaged_at(&mut gateway, Coordinate::new(100.0, 100.0, 100.0)).await;
        gateway.handle().clear_commands();

        jog.set_absolute(&mut gateway, Some(100.0), Some(100.00001), Some(120.0))
            .await
            .unwrap();

        assert_eq!(moved_axes(&gateway.handle().commands()), vec![Axis::Z]);
    }

    #[tokio::test]
    async fn descending_z_goes_first() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let mut jog = engaged_at(&mut gateway, Coordinate::new(100.0, 100.0, 100.0)).await;
        gateway.handle().clear_commands();

        jog.set_absolute(&mut gateway, Some(200.0), Some(200.0), Some(50.0))
            .await
            .unwrap();
        assert_eq!(
            moved_axes(&gateway.handle().commands()),
            vec![Axis::Z, Axis::X, Axis::Y]
        );

        gateway.handle().clear_commands();
        jog.set_absolute(&mut gateway, Some(300.0), Some(300.0), Some(150.0))
            .await
            .unwrap();
        assert_eq!(
            moved_axes(&gateway.handle().commands()),
            vec![Axis::X, Axis::Y, Axis::Z]
        );
    }

    #[tokio::test]
    async fn locked_controller_does_not_jog() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let mut jog = engaged_at(&mut gateway, Coordinate::new(100.0, 100.0, 100.0)).await;
        jog.disengage();

        let result = jog.jog(&mut gateway, JogDirection::Up).await;

        assert!(matches!(result, Err(TeachError::InvalidState { .. })));
        assert_eq!(jog.position(), Some(Coordinate::new(100.0, 100.0, 100.0)));
    }

    #[tokio::test]
    async fn out_of_range_target_is_reported() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let mut jog = engaged_at(&mut gateway, Coordinate::new(100.0, 100.0, 100.0)).await;
        jog.set_step(100.0).unwrap();

        for _ in 0..3 {
            jog.jog(&mut gateway, JogDirection::Up).await.unwrap();
        }
        let result = jog.jog(&mut gateway, JogDirection::Up).await;

        assert!(matches!(result, Err(TeachError::Hardware(_))));
        assert_relative_eq!(jog.axis(Axis::Z).unwrap(), 400.0);
    }

    #[tokio::test]
    async fn picked_up_resource_moves_as_one() {
        let mut gateway = SimulatedGateway::new(1).ready();
        let mut jog = controller();
        jog.engage(JogTarget::PickedUpResource {
            target: GripTarget {
                name: "plate".to_owned(),
                absolute_location: Coordinate::new(100.0, 100.0, 100.0),
                size: Coordinate::new(127.0, 86.0, 14.0),
            },
            direction: GripDirection::Front,
            traverse_height_scale: 10.0,
        });

        jog.set_absolute(&mut gateway, Some(100.0), Some(100.0), Some(200.0))
            .await
            .unwrap();
        jog.jog(&mut gateway, JogDirection::Left).await.unwrap();

        assert_eq!(
            gateway.handle().commands(),
            vec![
                Command::MovePickedUpResource {
                    name: "plate".to_owned(),
                    location: Coordinate::new(100.0, 100.0, 200.0),
                    minimum_traverse_height: 2070,
                },
                Command::MovePickedUpResource {
                    name: "plate".to_owned(),
                    location: Coordinate::new(90.0, 100.0, 200.0),
                    minimum_traverse_height: 2070,
                },
            ]
        );
    }

    #[test]
    fn rejects_unknown_step() {
        let mut jog = controller();
        assert!(matches!(jog.set_step(5.0), Err(TeachError::InvalidStep(_))));
        jog.set_step(0.1).unwrap();
        assert_relative_eq!(jog.step(), 0.1);
    }

    #[test]
    fn new_controller_is_locked() {
        let jog = controller();
        assert!(jog.is_locked());
        assert!(jog.target().is_none());
    }
}
