use crate::config::TeachConfig;
use crate::deck::Deck;
use crate::error::{Result, TeachError};
use crate::geometry::{Coordinate, JogDirection};
use crate::jog_controller::JogController;
use crate::motion_gateway::MotionGateway;
use crate::path_builder::{Destination, PathBuilder, TransferSpecification};
use crate::resource_teacher::{self, Anchor};
use crate::tip_teacher::{TipState, TipTeacher};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ResourceLocator,
    PathTeacher,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::ResourceLocator => write!(f, "resource locator"),
            Mode::PathTeacher => write!(f, "path teacher"),
        }
    }
}

/// The single gripper/channel slot
#[derive(Debug, Clone, PartialEq)]
pub enum HeldItem {
    None,
    Tip {
        rack: String,
        cell: String,
        tip_length: f64,
    },
    Plate {
        plate: String,
    },
}

impl fmt::Display for HeldItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeldItem::None => write!(f, "nothing"),
            HeldItem::Tip { rack, cell, .. } => write!(f, "tip {} of {}", cell, rack),
            HeldItem::Plate { plate } => write!(f, "plate {}", plate),
        }
    }
}

/// Every operator operation, dispatched through [`TeachSession::dispatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SwitchMode(Mode),
    Jog(JogDirection),
    SetStep(f64),
    GoTo {
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
    },
    /// Pick up the reference tip of a rack, or drop it back when held
    ToggleTip(String),
    Teach(String),
    PickUpPlate(String),
    AddWaypoint,
    RemoveWaypoint(usize),
    ReleaseAtSite(String),
    ReleaseHere,
    CommitTransfer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    Moved(Coordinate),
    Taught { resource: String, location: Coordinate },
    WaypointAdded(usize),
    WaypointRemoved(Coordinate),
    Transfer(TransferSpecification),
}

/// One row of the operator surface
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub id: String,
    pub label: String,
    pub action: Action,
    pub enabled: bool,
}

impl Control {
    fn new(id: String, label: impl Into<String>, action: Action, enabled: bool) -> Control {
        Control {
            id,
            label: label.into(),
            action,
            enabled,
        }
    }
}

/// Owns everything a teaching session touches
pub struct TeachSession {
    gateway: Box<dyn MotionGateway>,
    deck: Deck,
    config: TeachConfig,
    jog: JogController,
    tips: TipTeacher,
    path: PathBuilder,
    mode: Option<Mode>,
}

impl TeachSession {
    pub fn new(
        gateway: Box<dyn MotionGateway>,
        deck: Deck,
        config: TeachConfig,
    ) -> Result<TeachSession> {
        let jog = JogController::from_config(&config)?;
        let path = PathBuilder::new(&deck);
        Ok(TeachSession {
            gateway,
            deck,
            config,
            jog,
            tips: TipTeacher::new(),
            path,
            mode: None,
        })
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn config(&self) -> &TeachConfig {
        &self.config
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn jog(&self) -> &JogController {
        &self.jog
    }

    pub fn position(&self) -> Option<Coordinate> {
        self.jog.position()
    }

    pub fn path_builder(&self) -> &PathBuilder {
        &self.path
    }

    pub fn into_deck(self) -> Deck {
        self.deck
    }

    pub fn held_item(&self) -> HeldItem {
        if let Some(spot) = self.tips.held_spot() {
            return HeldItem::Tip {
                rack: spot.rack.clone(),
                cell: spot.cell.clone(),
                tip_length: spot.tip_length,
            };
        }
        match self.path.held_plate() {
            Some(plate) => HeldItem::Plate {
                plate: plate.to_owned(),
            },
            None => HeldItem::None,
        }
    }

    /// Changing mode is locked while anything is held
    pub async fn switch_mode(&mut self, mode: Mode) -> Result<()> {
        let held = self.held_item();
        if held != HeldItem::None {
            return Err(TeachError::invalid_state(
                "switch mode",
                format!("holding {}", held),
            ));
        }
        if mode == Mode::ResourceLocator {
            self.gateway.prepare_for_manual_operation().await?;
        }
        info!(%mode, "mode selected");
        self.mode = Some(mode);
        Ok(())
    }

    pub async fn dispatch(&mut self, action: Action) -> Result<Outcome> {
        debug!(?action, "dispatching");
        match action {
            Action::SwitchMode(mode) => {
                self.switch_mode(mode).await?;
                Ok(Outcome::Done)
            }
            Action::Jog(direction) => {
                self.require_any_mode("jog")?;
                let position = self.jog.jog(self.gateway.as_mut(), direction).await?;
                Ok(Outcome::Moved(position))
            }
            Action::SetStep(step) => {
                self.jog.set_step(step)?;
                Ok(Outcome::Done)
            }
            Action::GoTo { x, y, z } => {
                self.require_any_mode("go to")?;
                if self.jog.is_locked() {
                    return Err(TeachError::invalid_state("go to", "jogging is locked"));
                }
                self.jog
                    .set_absolute(self.gateway.as_mut(), x, y, z)
                    .await?;
                Ok(self.position().map(Outcome::Moved).unwrap_or(Outcome::Done))
            }
            Action::ToggleTip(rack) => {
                self.require_free_of_plate()?;
                self.require_mode("pick up tip", Mode::ResourceLocator)?;
                match self.tips.state().clone() {
                    TipState::TipHeld {
                        rack: held_rack,
                        cell,
                    } if held_rack == rack => {
                        self.tips
                            .drop_reference_tip(
                                self.gateway.as_mut(),
                                &mut self.jog,
                                &self.deck,
                                &self.config,
                                &rack,
                                &cell,
                            )
                            .await?
                    }
                    _ => {
                        self.tips
                            .pick_up_reference_tip(
                                self.gateway.as_mut(),
                                &mut self.jog,
                                &self.deck,
                                &self.config,
                                &rack,
                            )
                            .await?
                    }
                }
                Ok(Outcome::Done)
            }
            Action::Teach(resource) => {
                self.require_mode("teach", Mode::ResourceLocator)?;
                if !self.tips.is_holding() {
                    return Err(TeachError::invalid_state("teach", "no tip is held"));
                }
                let taught = self
                    .jog
                    .position()
                    .ok_or_else(|| TeachError::invalid_state("teach", "the position is unknown"))?;
                let location = resource_teacher::teach(
                    &mut self.deck,
                    &resource,
                    taught,
                    &self.config.reference_cell,
                )?;
                Ok(Outcome::Taught { resource, location })
            }
            Action::PickUpPlate(plate) => {
                if self.tips.is_holding() {
                    return Err(TeachError::AlreadyHolding(self.held_item().to_string()));
                }
                self.require_mode("pick up plate", Mode::PathTeacher)?;
                self.path
                    .pick_up_plate(
                        self.gateway.as_mut(),
                        &mut self.jog,
                        &self.deck,
                        &self.config,
                        &plate,
                    )
                    .await?;
                Ok(Outcome::Done)
            }
            Action::AddWaypoint => {
                let index = self.path.add_intermediate_waypoint(&self.jog)?;
                Ok(Outcome::WaypointAdded(index))
            }
            Action::RemoveWaypoint(index) => {
                let removed = self.path.remove_waypoint(index)?;
                Ok(Outcome::WaypointRemoved(removed))
            }
            Action::ReleaseAtSite(site) => {
                self.release(Destination::Site(site)).await?;
                Ok(Outcome::Done)
            }
            Action::ReleaseHere => {
                let here = self.jog.position().ok_or_else(|| {
                    TeachError::invalid_state("release plate", "the position is unknown")
                })?;
                self.release(Destination::Coordinate(here)).await?;
                Ok(Outcome::Done)
            }
            Action::CommitTransfer => Ok(Outcome::Transfer(self.path.commit_transfer()?)),
        }
    }

    async fn release(&mut self, destination: Destination) -> Result<()> {
        self.path
            .set_destination_and_release(
                self.gateway.as_mut(),
                &mut self.jog,
                &self.deck,
                &self.config,
                destination,
            )
            .await
    }

    /// Feeds a direction from an input device, ignored while jogging is locked
    pub async fn apply_input(&mut self, direction: JogDirection) -> Result<Option<Coordinate>> {
        if self.mode.is_none() || self.jog.is_locked() {
            debug!(%direction, "input ignored while locked");
            return Ok(None);
        }
        let position = self.jog.jog(self.gateway.as_mut(), direction).await?;
        Ok(Some(position))
    }

    pub fn generate_transfer_specification(&self) -> TransferSpecification {
        self.path.generate_transfer_specification()
    }

    /// Writes the deck with every committed location
    pub fn save(&self, path: &str) -> Result<()> {
        self.deck.save_json(path)?;
        info!(path, "layout saved");
        Ok(())
    }

    fn require_any_mode(&self, operation: &'static str) -> Result<Mode> {
        self.mode
            .ok_or_else(|| TeachError::invalid_state(operation, "no mode is selected"))
    }

    fn require_mode(&self, operation: &'static str, mode: Mode) -> Result<()> {
        match self.mode {
            Some(current) if current == mode => Ok(()),
            Some(current) => Err(TeachError::invalid_state(
                operation,
                format!("in {} mode", current),
            )),
            None => Err(TeachError::invalid_state(operation, "no mode is selected")),
        }
    }

    fn require_free_of_plate(&self) -> Result<()> {
        match self.path.held_plate() {
            Some(plate) => Err(TeachError::AlreadyHolding(format!("plate {}", plate))),
            None => Ok(()),
        }
    }

    /// Operator controls for the current state
    pub fn controls(&self) -> Vec<Control> {
        let held = self.held_item();
        let free = held == HeldItem::None;
        let mut controls = vec![];

        for (id, mode) in [
            ("mode:locator", Mode::ResourceLocator),
            ("mode:path", Mode::PathTeacher),
        ] {
            controls.push(Control::new(
                id.to_owned(),
                mode.to_string(),
                Action::SwitchMode(mode),
                free && self.mode != Some(mode),
            ));
        }
        let mode = match self.mode {
            Some(mode) => mode,
            None => return controls,
        };

        let jog_enabled = !self.jog.is_locked();
        for direction in JogDirection::ALL {
            controls.push(Control::new(
                format!("jog:{}", direction),
                direction.to_string(),
                Action::Jog(direction),
                jog_enabled,
            ));
        }
        for step in self.jog.allowed_steps() {
            controls.push(Control::new(
                format!("step:{}", step),
                format!("{} mm", step),
                Action::SetStep(*step),
                *step != self.jog.step(),
            ));
        }

        match mode {
            Mode::ResourceLocator => self.locator_controls(&held, &mut controls),
            Mode::PathTeacher => self.path_controls(&held, &mut controls),
        }
        controls
    }

    fn locator_controls(&self, held: &HeldItem, controls: &mut Vec<Control>) {
        let cell = &self.config.reference_cell;
        for rack in self.deck.tip_racks() {
            let located = self.deck.absolute_location(&rack.name).is_ok();
            let (label, enabled) = match held {
                HeldItem::Tip { rack: held_rack, .. } if *held_rack == rack.name => {
                    (format!("drop tip {}", cell), true)
                }
                HeldItem::None => (format!("pick up tip {}", cell), located),
                _ => (format!("pick up tip {}", cell), false),
            };
            controls.push(Control::new(
                format!("tip:{}", rack.name),
                format!("{}: {}", rack.name, label),
                Action::ToggleTip(rack.name.clone()),
                enabled,
            ));
        }

        let tip_held = matches!(held, HeldItem::Tip { .. });
        for resource in self
            .deck
            .unlocated_resources()
            .filter(|resource| resource.parent.is_some())
        {
            // a resource can only be taught once its parent is known
            let parent_known = resource
                .parent
                .as_deref()
                .map(|parent| self.deck.absolute_location(parent).is_ok())
                .unwrap_or(false);
            controls.push(Control::new(
                format!("teach:{}", resource.name),
                format!(
                    "{}: {}",
                    resource.name,
                    Anchor::for_kind(&resource.kind).describe(cell)
                ),
                Action::Teach(resource.name.clone()),
                tip_held && parent_known,
            ));
        }
    }

    fn path_controls(&self, held: &HeldItem, controls: &mut Vec<Control>) {
        let plate_held = matches!(held, HeldItem::Plate { .. });
        for plate in self.deck.plates() {
            let located = self.path.plate_location(&self.deck, &plate.name).is_ok();
            controls.push(Control::new(
                format!("pick:{}", plate.name),
                format!("{}: pick up this plate", plate.name),
                Action::PickUpPlate(plate.name.clone()),
                *held == HeldItem::None && located,
            ));
        }
        for site in self.deck.carrier_sites() {
            // occupied sites are not offered at all
            if self.path.is_site_occupied(&site.name) {
                continue;
            }
            controls.push(Control::new(
                format!("put:{}", site.name),
                format!("{}: put plate here", site.name),
                Action::ReleaseAtSite(site.name.clone()),
                plate_held,
            ));
        }
        controls.push(Control::new(
            "waypoint:add".to_owned(),
            "add intermediate point",
            Action::AddWaypoint,
            plate_held,
        ));
        for (index, waypoint) in self.path.waypoints().iter().enumerate() {
            controls.push(Control::new(
                format!("waypoint:remove:{}", index),
                format!("remove ({:.1}, {:.1}, {:.1})", waypoint.x, waypoint.y, waypoint.z),
                Action::RemoveWaypoint(index),
                true,
            ));
        }
        controls.push(Control::new(
            "put:here".to_owned(),
            "put plate at current location",
            Action::ReleaseHere,
            plate_held,
        ));
        controls.push(Control::new(
            "commit".to_owned(),
            "commit transfer",
            Action::CommitTransfer,
            !plate_held && !self.path.generate_transfer_specification().is_empty(),
        ));
    }
}
