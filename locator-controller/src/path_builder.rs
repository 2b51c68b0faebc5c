use crate::config::TeachConfig;
use crate::deck::{Deck, ResourceKind};
use crate::error::{Result, TeachError};
use crate::geometry::{format_coordinate, round_to, Coordinate};
use crate::jog_controller::{JogController, JogTarget};
use crate::motion_gateway::{
    minimum_traverse_height_hint, GripParameters, GripTarget, MotionGateway,
};
use serde::Serialize;
use std::{
    collections::{HashMap, HashSet},
    fmt,
};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlateState {
    Idle,
    PlateHeld { plate: String },
}

/// Where a transfer ends
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Coordinate(Coordinate),
    Site(String),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Coordinate(location) => write!(f, "{}", format_coordinate(location)),
            Destination::Site(name) => write!(f, "lh.deck.get_resource(\"{}\")", name),
        }
    }
}

/// Description of a plate move, rendered as a `move_plate` call by `Display`
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct TransferSpecification {
    pub plate: Option<String>,
    pub destination: Option<Destination>,
    pub waypoints: Vec<Coordinate>,
}

impl TransferSpecification {
    pub fn is_empty(&self) -> bool {
        self.destination.is_none() && self.waypoints.is_empty()
    }
}

impl fmt::Display for TransferSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "# add points or release plate to generate code");
        }
        let plate = match &self.plate {
            Some(name) => format!("lh.deck.get_resource(\"{}\")", name),
            None => "plate".to_owned(),
        };
        let destination = match &self.destination {
            Some(destination) => destination.to_string(),
            None => "<destination>".to_owned(),
        };
        if self.waypoints.is_empty() {
            return write!(f, "lh.move_plate({}, to={})", plate, destination);
        }
        writeln!(
            f,
            "lh.move_plate({}, to={}, intermediate_locations=[",
            plate, destination
        )?;
        for waypoint in &self.waypoints {
            writeln!(f, "  {},", format_coordinate(waypoint))?;
        }
        write!(f, "])")
    }
}

/// Authors a plate transfer: pick up, waypoints, release
///
/// Tracks which carrier sites hold plates and where moved plates ended up,
/// the deck itself is never rewritten by a transfer.
#[derive(Debug)]
pub struct PathBuilder {
    held: Option<GripTarget>,
    transfer_plate: Option<String>,
    waypoints: Vec<Coordinate>,
    destination: Option<Destination>,
    /// plate name to the carrier site it sits on
    plate_sites: HashMap<String, String>,
    /// absolute locations of plates released during this session
    moved: HashMap<String, Coordinate>,
}

impl PathBuilder {
    pub fn new(deck: &Deck) -> PathBuilder {
        let sites: HashSet<&str> = deck.carrier_sites().map(|site| site.name.as_str()).collect();
        let plate_sites = deck
            .resources()
            .filter(|resource| resource.kind == ResourceKind::Plate)
            .filter_map(|plate| {
                let parent = plate.parent.as_deref()?;
                sites
                    .contains(parent)
                    .then(|| (plate.name.clone(), parent.to_owned()))
            })
            .collect();
        PathBuilder {
            held: None,
            transfer_plate: None,
            waypoints: vec![],
            destination: None,
            plate_sites,
            moved: HashMap::new(),
        }
    }

    pub fn state(&self) -> PlateState {
        match &self.held {
            Some(target) => PlateState::PlateHeld {
                plate: target.name.clone(),
            },
            None => PlateState::Idle,
        }
    }

    pub fn held_plate(&self) -> Option<&str> {
        self.held.as_ref().map(|target| target.name.as_str())
    }

    pub fn waypoints(&self) -> &[Coordinate] {
        &self.waypoints
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn is_site_occupied(&self, site: &str) -> bool {
        self.plate_sites.values().any(|occupied| occupied == site)
    }

    /// Current absolute location of a plate, including moves made in this session
    pub fn plate_location(&self, deck: &Deck, plate: &str) -> Result<Coordinate> {
        match self.moved.get(plate) {
            Some(location) => Ok(*location),
            None => Ok(deck.absolute_location(plate)?),
        }
    }

    pub async fn pick_up_plate(
        &mut self,
        gateway: &mut dyn MotionGateway,
        jog: &mut JogController,
        deck: &Deck,
        config: &TeachConfig,
        plate: &str,
    ) -> Result<()> {
        if let Some(held) = &self.held {
            return Err(TeachError::invalid_state(
                "pick up plate",
                format!("holding plate {}", held.name),
            ));
        }
        let size = deck.plate(plate)?.size;
        let target = GripTarget {
            name: plate.to_owned(),
            absolute_location: self.plate_location(deck, plate)?,
            size,
        };
        let grip = grip_parameters(config);

        gateway.pick_up_resource(&target, &grip).await?;
        info!(plate, location = ?target.absolute_location, "picked up plate");
        self.transfer_plate = Some(plate.to_owned());
        self.waypoints.clear();
        self.destination = None;
        self.plate_sites.remove(plate);
        self.held = Some(target.clone());

        let above_plate = round_to(
            target.absolute_location
                + Coordinate::new(0.0, 0.0, target.size.z + config.pickup_distance_from_top),
            config.position_precision,
        );
        jog.engage(JogTarget::PickedUpResource {
            target,
            direction: config.grip_direction,
            traverse_height_scale: config.traverse_height_scale,
        });
        jog.set_position(gateway, above_plate).await.map_err(|error| {
            warn!(%error, "could not move the picked up plate");
            error.into_restation("pick up plate")
        })
    }

    /// Appends the current position, returns its index
    pub fn add_intermediate_waypoint(&mut self, jog: &JogController) -> Result<usize> {
        if self.held.is_none() {
            return Err(TeachError::invalid_state("add waypoint", "no plate is held"));
        }
        let position = jog
            .position()
            .ok_or_else(|| TeachError::invalid_state("add waypoint", "the position is unknown"))?;
        self.waypoints.push(position);
        Ok(self.waypoints.len() - 1)
    }

    pub fn remove_waypoint(&mut self, index: usize) -> Result<Coordinate> {
        if index >= self.waypoints.len() {
            return Err(TeachError::NoSelection);
        }
        Ok(self.waypoints.remove(index))
    }

    pub async fn set_destination_and_release(
        &mut self,
        gateway: &mut dyn MotionGateway,
        jog: &mut JogController,
        deck: &Deck,
        config: &TeachConfig,
        destination: Destination,
    ) -> Result<()> {
        let target = match &self.held {
            Some(target) => target.clone(),
            None => return Err(TeachError::invalid_state("release plate", "no plate is held")),
        };
        let location = match &destination {
            Destination::Coordinate(location) => *location,
            Destination::Site(site) => {
                deck.carrier_site(site)?;
                if self.is_site_occupied(site) {
                    return Err(TeachError::SiteOccupied(site.clone()));
                }
                deck.absolute_location(site)?
            }
        };
        let current_z = jog.position().map(|position| position.z).unwrap_or(location.z);
        let hint = minimum_traverse_height_hint(current_z, target.size.z, config.traverse_height_scale);

        gateway
            .release_picked_up_resource(&target, location, &grip_parameters(config), hint)
            .await?;
        info!(plate = %target.name, ?location, "released plate");
        if let Destination::Site(site) = &destination {
            self.plate_sites.insert(target.name.clone(), site.clone());
        }
        self.moved.insert(target.name.clone(), location);
        self.destination = Some(destination);
        self.held = None;

        let mut safe = round_to(location, config.position_precision);
        safe.z = config.safe_release_height;
        let restation = jog.set_position(gateway, safe).await;
        jog.disengage();
        restation.map_err(|error| {
            warn!(%error, "could not move to safe height after release");
            error.into_restation("release plate")
        })
    }

    pub fn generate_transfer_specification(&self) -> TransferSpecification {
        TransferSpecification {
            plate: self.transfer_plate.clone(),
            destination: self.destination.clone(),
            waypoints: self.waypoints.clone(),
        }
    }

    /// Hands out the finished transfer and starts a new one
    pub fn commit_transfer(&mut self) -> Result<TransferSpecification> {
        if let Some(held) = &self.held {
            return Err(TeachError::invalid_state(
                "commit transfer",
                format!("holding plate {}", held.name),
            ));
        }
        let specification = self.generate_transfer_specification();
        self.transfer_plate = None;
        self.waypoints.clear();
        self.destination = None;
        Ok(specification)
    }
}

fn grip_parameters(config: &TeachConfig) -> GripParameters {
    GripParameters {
        direction: config.grip_direction,
        pickup_distance_from_top: config.pickup_distance_from_top,
        offset: Coordinate::zeros(),
    }
}
