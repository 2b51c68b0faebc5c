use crate::deck::{Deck, ResourceKind};
use crate::error::{Result, TeachError};
use crate::geometry::Coordinate;
use tracing::info;

/// Which point of a resource the operator aligns the tool with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Center of the reference grid cell
    ReferenceCell,
    /// Front left corner of the top face
    BoundingBox,
}

impl Anchor {
    pub fn for_kind(kind: &ResourceKind) -> Anchor {
        match kind {
            ResourceKind::Plate => Anchor::ReferenceCell,
            ResourceKind::TipRack { .. }
            | ResourceKind::PlateCarrier
            | ResourceKind::CarrierSite
            | ResourceKind::Generic
            | ResourceKind::Deck => Anchor::BoundingBox,
        }
    }

    pub fn describe(&self, reference_cell: &str) -> String {
        match self {
            Anchor::ReferenceCell => format!("well {} at tip location", reference_cell),
            Anchor::BoundingBox => "front top left corner at tip location".to_owned(),
        }
    }
}

/// Location relative to the parent that puts the anchor of `resource` at `taught`
pub fn relative_location(
    deck: &Deck,
    resource: &str,
    taught: Coordinate,
    reference_cell: &str,
) -> Result<Coordinate> {
    let item = deck.resource(resource)?;
    if item.is_located() {
        return Err(TeachError::AlreadyLocated(resource.to_owned()));
    }
    let parent_location = match &item.parent {
        Some(parent) => deck.absolute_location(parent)?,
        None => Coordinate::zeros(),
    };
    let anchor = match Anchor::for_kind(&item.kind) {
        Anchor::ReferenceCell => {
            let cell = item.cell(reference_cell)?;
            cell.location + cell.center()
        }
        Anchor::BoundingBox => Coordinate::new(0.0, 0.0, item.height()),
    };
    Ok(taught - anchor - parent_location)
}

/// Commit the location of an unlocated resource from the taught tool position
pub fn teach(
    deck: &mut Deck,
    resource: &str,
    taught: Coordinate,
    reference_cell: &str,
) -> Result<Coordinate> {
    let location = relative_location(deck, resource, taught, reference_cell)?;
    deck.set_location(resource, location)?;
    info!(resource, ?taught, ?location, "resource taught");
    Ok(location)
}
