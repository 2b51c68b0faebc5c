use crate::config::TeachConfig;
use crate::deck::Deck;
use crate::error::{Result, TeachError};
use crate::geometry::{round_to, Coordinate};
use crate::jog_controller::{JogController, JogTarget};
use crate::motion_gateway::{MotionGateway, TipSpot};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TipState {
    NoTipHeld,
    TipHeld { rack: String, cell: String },
}

impl fmt::Display for TipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TipState::NoTipHeld => write!(f, "no tip is held"),
            TipState::TipHeld { rack, cell } => write!(f, "holding tip {} of {}", cell, rack),
        }
    }
}

/// Channel used for teaching, the last one unless configured
pub fn reference_channel(config: &TeachConfig, gateway: &dyn MotionGateway) -> usize {
    config
        .reference_channel
        .unwrap_or_else(|| gateway.num_channels().saturating_sub(1))
}

/// Picks a tip from the reference cell of a rack so the operator has
/// a physical point to align resources with.
#[derive(Debug)]
pub struct TipTeacher {
    state: TipState,
    held: Option<TipSpot>,
}

impl Default for TipTeacher {
    fn default() -> Self {
        TipTeacher::new()
    }
}

impl TipTeacher {
    pub fn new() -> TipTeacher {
        TipTeacher {
            state: TipState::NoTipHeld,
            held: None,
        }
    }

    pub fn state(&self) -> &TipState {
        &self.state
    }

    /// Spot the held tip was picked from
    pub fn held_spot(&self) -> Option<&TipSpot> {
        self.held.as_ref()
    }

    pub fn is_holding(&self) -> bool {
        matches!(self.state, TipState::TipHeld { .. })
    }

    pub async fn pick_up_reference_tip(
        &mut self,
        gateway: &mut dyn MotionGateway,
        jog: &mut JogController,
        deck: &Deck,
        config: &TeachConfig,
        rack: &str,
    ) -> Result<()> {
        if let TipState::TipHeld { .. } = &self.state {
            return Err(TeachError::AlreadyHolding(self.state.to_string()));
        }
        let spot = tip_spot(deck, rack, &config.reference_cell)?;
        let channel = reference_channel(config, gateway);

        gateway.pick_up_tip(&spot, channel).await?;
        self.state = TipState::TipHeld {
            rack: spot.rack.clone(),
            cell: spot.cell.clone(),
        };
        self.held = Some(spot.clone());
        info!(rack, cell = %spot.cell, channel, "picked up reference tip");

        jog.engage(JogTarget::Channel(channel));
        jog.set_position(gateway, above_tip(&spot, config))
            .await
            .map_err(|error| {
                warn!(%error, "could not move to the picked up tip");
                error.into_restation("pick up tip")
            })
    }

    pub async fn drop_reference_tip(
        &mut self,
        gateway: &mut dyn MotionGateway,
        jog: &mut JogController,
        deck: &Deck,
        config: &TeachConfig,
        rack: &str,
        cell: &str,
    ) -> Result<()> {
        match &self.state {
            TipState::TipHeld {
                rack: held_rack,
                cell: held_cell,
            } if held_rack == rack && held_cell == cell => {}
            other => return Err(TeachError::invalid_state("drop tip", other.to_string())),
        }
        let spot = tip_spot(deck, rack, cell)?;
        let channel = reference_channel(config, gateway);

        gateway.drop_tip(&spot, channel).await?;
        self.state = TipState::NoTipHeld;
        self.held = None;
        info!(rack, cell, channel, "dropped reference tip");

        let restation = jog.set_position(gateway, above_tip(&spot, config)).await;
        jog.disengage();
        restation.map_err(|error| {
            warn!(%error, "could not move above the dropped tip");
            error.into_restation("drop tip")
        })
    }

    /// Drops the held tip back where it came from
    pub async fn drop_held_tip(
        &mut self,
        gateway: &mut dyn MotionGateway,
        jog: &mut JogController,
        deck: &Deck,
        config: &TeachConfig,
    ) -> Result<()> {
        let (rack, cell) = match &self.state {
            TipState::TipHeld { rack, cell } => (rack.clone(), cell.clone()),
            TipState::NoTipHeld => {
                return Err(TeachError::invalid_state("drop tip", self.state.to_string()))
            }
        };
        self.drop_reference_tip(gateway, jog, deck, config, &rack, &cell)
            .await
    }
}

fn tip_spot(deck: &Deck, rack: &str, cell: &str) -> Result<TipSpot> {
    let tip_rack = deck.resource(rack)?;
    let tip_length = tip_rack.tip_length()?;
    let spot = tip_rack.cell(cell)?;
    let location = deck.cell_absolute_location(rack, cell)? + spot.center();
    Ok(TipSpot {
        rack: rack.to_owned(),
        cell: cell.to_owned(),
        location,
        tip_length,
    })
}

/// Where the end of a tip sitting in `spot` is
fn above_tip(spot: &TipSpot, config: &TeachConfig) -> Coordinate {
    round_to(
        spot.location + Coordinate::new(0.0, 0.0, spot.tip_length + config.tip_clearance),
        config.position_precision,
    )
}
