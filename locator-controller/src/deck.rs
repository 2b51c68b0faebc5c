use crate::geometry::Coordinate;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("no resource named {0:?} on the deck")]
    UnknownResource(String),
    #[error("resource {0:?} has no location")]
    Unlocated(String),
    #[error("resource {resource:?} has no item {cell:?}")]
    UnknownCell { resource: String, cell: String },
    #[error("resource {0:?} is not a tip rack")]
    NotATipRack(String),
    #[error("resource {0:?} is not a plate")]
    NotAPlate(String),
    #[error("resource {0:?} is not a site on a plate carrier")]
    NotACarrierSite(String),
    #[error("resource {0:?} already has a location")]
    AlreadyLocated(String),
    #[error("resource {0:?} is its own ancestor")]
    ParentCycle(String),
    #[error("resource name {0:?} is used more than once")]
    DuplicateName(String),
    #[error("resource {resource:?} names missing parent {parent:?}")]
    MissingParent { resource: String, parent: String },
    #[error("error while accessing layout file")]
    Io(#[from] std::io::Error),
    #[error("error while parsing layout json")]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, DeckError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceKind {
    Deck,
    Plate,
    TipRack { tip_length: f64 },
    PlateCarrier,
    CarrierSite,
    Generic,
}

/// Addressable item inside a plate or tip rack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub label: String,
    /// offset from the owning resource's origin
    pub location: Coordinate,
    pub size: Coordinate,
}

impl GridCell {
    pub fn new(label: &str, location: Coordinate, size: Coordinate) -> GridCell {
        GridCell {
            label: label.to_owned(),
            location,
            size,
        }
    }

    /// Center of the cell's footprint, at its bottom
    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.size.x / 2.0, self.size.y / 2.0, 0.0)
    }

    /// Lays out `rows` x `columns` cells labelled A1, B1, ... with row A at the back.
    pub fn grid(
        rows: usize,
        columns: usize,
        origin: Coordinate,
        pitch: f64,
        size: Coordinate,
    ) -> Vec<GridCell> {
        let mut cells = Vec::with_capacity(rows * columns);
        for column in 0..columns {
            for row in 0..rows {
                let label = format!("{}{}", row_label(row), column + 1);
                let location = origin
                    + Coordinate::new(
                        column as f64 * pitch,
                        (rows - 1 - row) as f64 * pitch,
                        0.0,
                    );
                cells.push(GridCell::new(&label, location, size));
            }
        }
        cells
    }
}

fn row_label(row: usize) -> String {
    let mut label = String::new();
    let mut index = row;
    loop {
        label.insert(0, (b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    label
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub kind: ResourceKind,
    /// Name of the parent, the deck owns both
    #[serde(default)]
    pub parent: Option<String>,
    /// Offset from the parent's origin, `None` until taught
    #[serde(default)]
    pub location: Option<Coordinate>,
    /// Bounding box
    pub size: Coordinate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<GridCell>,
}

impl Resource {
    pub fn new(name: &str, kind: ResourceKind, size: Coordinate) -> Resource {
        Resource {
            name: name.to_owned(),
            kind,
            parent: None,
            location: None,
            size,
            items: vec![],
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Resource {
        self.parent = Some(parent.to_owned());
        self
    }

    pub fn at(mut self, location: Coordinate) -> Resource {
        self.location = Some(location);
        self
    }

    pub fn with_items(mut self, items: Vec<GridCell>) -> Resource {
        self.items = items;
        self
    }

    pub fn height(&self) -> f64 {
        self.size.z
    }

    pub fn is_located(&self) -> bool {
        self.location.is_some()
    }

    pub fn cell(&self, label: &str) -> Result<&GridCell> {
        self.items
            .iter()
            .find(|cell| cell.label == label)
            .ok_or_else(|| DeckError::UnknownCell {
                resource: self.name.clone(),
                cell: label.to_owned(),
            })
    }

    pub fn tip_length(&self) -> Result<f64> {
        match self.kind {
            ResourceKind::TipRack { tip_length } => Ok(tip_length),
            _ => Err(DeckError::NotATipRack(self.name.clone())),
        }
    }
}

/// Tree of named resources
///
/// Parents are referenced by name. The only mutation the teaching
/// code performs is committing the location of an unlocated resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Deck {
    resources: Vec<Resource>,
}

impl Deck {
    pub fn new(resources: Vec<Resource>) -> Result<Deck> {
        let mut names = HashSet::new();
        for resource in &resources {
            if !names.insert(resource.name.as_str()) {
                return Err(DeckError::DuplicateName(resource.name.clone()));
            }
        }
        for resource in &resources {
            if let Some(parent) = &resource.parent {
                if !names.contains(parent.as_str()) {
                    return Err(DeckError::MissingParent {
                        resource: resource.name.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }
        Ok(Deck { resources })
    }

    pub fn parse_json(json: &str) -> Result<Deck> {
        let deck: Deck = serde_json::from_str(json)?;
        Deck::new(deck.resources)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_json(path: &str) -> Result<Deck> {
        let text = fs::read_to_string(path)?;
        Deck::parse_json(&text)
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn resource(&self, name: &str) -> Result<&Resource> {
        self.resources
            .iter()
            .find(|resource| resource.name == name)
            .ok_or_else(|| DeckError::UnknownResource(name.to_owned()))
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .iter()
            .filter(move |resource| resource.parent.as_deref() == Some(name))
    }

    /// Sum of offsets up to the root. A root without location is the origin.
    pub fn absolute_location(&self, name: &str) -> Result<Coordinate> {
        let mut total = Coordinate::zeros();
        let mut current = self.resource(name)?;
        // a chain longer than the deck can only be a cycle
        for _ in 0..=self.resources.len() {
            match (&current.location, &current.parent) {
                (Some(location), Some(parent)) => {
                    total += location;
                    current = self.resource(parent)?;
                }
                (Some(location), None) => return Ok(total + location),
                (None, None) => return Ok(total),
                (None, Some(_)) => return Err(DeckError::Unlocated(current.name.clone())),
            }
        }
        Err(DeckError::ParentCycle(name.to_owned()))
    }

    pub fn cell(&self, resource: &str, label: &str) -> Result<&GridCell> {
        self.resource(resource)?.cell(label)
    }

    pub fn cell_absolute_location(&self, resource: &str, label: &str) -> Result<Coordinate> {
        let cell = self.cell(resource, label)?;
        Ok(self.absolute_location(resource)? + cell.location)
    }

    /// Only unlocated resources can be given a location.
    pub fn set_location(&mut self, name: &str, location: Coordinate) -> Result<()> {
        let resource = self
            .resources
            .iter_mut()
            .find(|resource| resource.name == name)
            .ok_or_else(|| DeckError::UnknownResource(name.to_owned()))?;
        if resource.location.is_some() {
            return Err(DeckError::AlreadyLocated(name.to_owned()));
        }
        resource.location = Some(location);
        Ok(())
    }

    pub fn unlocated_resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|resource| !resource.is_located())
    }

    pub fn tip_racks(&self) -> impl Iterator<Item = &Resource> {
        self.resources
            .iter()
            .filter(|resource| matches!(resource.kind, ResourceKind::TipRack { .. }))
    }

    pub fn plates(&self) -> impl Iterator<Item = &Resource> {
        self.resources
            .iter()
            .filter(|resource| resource.kind == ResourceKind::Plate)
    }

    pub fn plate(&self, name: &str) -> Result<&Resource> {
        let resource = self.resource(name)?;
        match resource.kind {
            ResourceKind::Plate => Ok(resource),
            _ => Err(DeckError::NotAPlate(name.to_owned())),
        }
    }

    pub fn carrier_site(&self, name: &str) -> Result<&Resource> {
        let resource = self.resource(name)?;
        self.carrier_sites()
            .find(|site| site.name == name)
            .ok_or_else(|| DeckError::NotACarrierSite(resource.name.clone()))
    }

    /// Sites that can receive a plate, those sitting on a plate carrier
    pub fn carrier_sites(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |resource| {
            resource.kind == ResourceKind::CarrierSite
                && resource
                    .parent
                    .as_deref()
                    .and_then(|parent| self.resource(parent).ok())
                    .map(|parent| parent.kind == ResourceKind::PlateCarrier)
                    .unwrap_or(false)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Deck with one carrier holding a located plate, an unlocated plate,
    /// a located tip rack and an unlocated tip rack.
    pub(crate) fn sample_deck() -> Deck {
        let well = Coordinate::new(8.0, 8.0, 10.0);
        let spot = Coordinate::new(9.0, 9.0, 50.0);
        Deck::new(vec![
            Resource::new("deck", ResourceKind::Deck, Coordinate::new(1360.0, 653.0, 900.0)),
            Resource::new("carrier", ResourceKind::PlateCarrier, Coordinate::new(135.0, 497.0, 130.0))
                .with_parent("deck")
                .at(Coordinate::new(100.0, 63.0, 100.0)),
            Resource::new("site_0", ResourceKind::CarrierSite, Coordinate::new(127.0, 86.0, 0.0))
                .with_parent("carrier")
                .at(Coordinate::new(4.0, 8.0, 86.0)),
            Resource::new("site_1", ResourceKind::CarrierSite, Coordinate::new(127.0, 86.0, 0.0))
                .with_parent("carrier")
                .at(Coordinate::new(4.0, 104.0, 86.0)),
            Resource::new("plate", ResourceKind::Plate, Coordinate::new(127.0, 86.0, 14.0))
                .with_parent("site_0")
                .at(Coordinate::zeros())
                .with_items(GridCell::grid(8, 12, Coordinate::new(10.0, 7.0, 1.0), 9.0, well)),
            Resource::new("new_plate", ResourceKind::Plate, Coordinate::new(127.0, 86.0, 14.0))
                .with_parent("deck")
                .with_items(GridCell::grid(8, 12, Coordinate::new(10.0, 7.0, 1.0), 9.0, well)),
            Resource::new("tips", ResourceKind::TipRack { tip_length: 59.9 }, Coordinate::new(122.0, 82.0, 20.0))
                .with_parent("deck")
                .at(Coordinate::new(400.0, 100.0, 100.0))
                .with_items(GridCell::grid(8, 12, Coordinate::new(7.0, 5.0, -40.0), 9.0, spot)),
            Resource::new("new_tips", ResourceKind::TipRack { tip_length: 59.9 }, Coordinate::new(122.0, 82.0, 20.0))
                .with_parent("deck")
                .with_items(GridCell::grid(8, 12, Coordinate::new(7.0, 5.0, -40.0), 9.0, spot)),
        ])
        .unwrap()
    }

    #[test]
    fn absolute_location_sums_offsets() {
        let deck = sample_deck();
        let location = deck.absolute_location("plate").unwrap();
        assert_relative_eq!(location, Coordinate::new(104.0, 71.0, 186.0));
    }

    #[test]
    fn unlocated_ancestor_is_an_error() {
        let mut deck = sample_deck();
        deck.resources.push(
            Resource::new("lid", ResourceKind::Generic, Coordinate::new(1.0, 1.0, 1.0))
                .with_parent("new_plate")
                .at(Coordinate::zeros()),
        );
        assert!(matches!(
            deck.absolute_location("lid"),
            Err(DeckError::Unlocated(name)) if name == "new_plate"
        ));
    }

    #[test]
    fn detects_parent_cycle() {
        let deck = Deck {
            resources: vec![
                Resource::new("a", ResourceKind::Generic, Coordinate::zeros())
                    .with_parent("b")
                    .at(Coordinate::zeros()),
                Resource::new("b", ResourceKind::Generic, Coordinate::zeros())
                    .with_parent("a")
                    .at(Coordinate::zeros()),
            ],
        };
        assert!(matches!(
            deck.absolute_location("a"),
            Err(DeckError::ParentCycle(_))
        ));
    }

    #[test]
    fn grid_labels_and_offsets() {
        let cells = GridCell::grid(8, 12, Coordinate::zeros(), 9.0, Coordinate::new(8.0, 8.0, 10.0));
        assert_eq!(cells.len(), 96);
        assert_eq!(cells[0].label, "A1");
        assert_eq!(cells[1].label, "B1");
        assert_eq!(cells[8].label, "A2");
        assert_relative_eq!(cells[0].location, Coordinate::new(0.0, 63.0, 0.0));
        assert_relative_eq!(cells[0].center(), Coordinate::new(4.0, 4.0, 0.0));
    }

    #[test]
    fn row_labels_past_z() {
        assert_eq!(row_label(0), "A");
        assert_eq!(row_label(25), "Z");
        assert_eq!(row_label(26), "AA");
    }

    #[test]
    fn plates_and_sites_are_checked_by_kind() {
        let deck = sample_deck();
        assert_eq!(deck.plate("plate").unwrap().name, "plate");
        assert!(matches!(deck.plate("carrier"), Err(DeckError::NotAPlate(name)) if name == "carrier"));
        assert!(matches!(deck.plate("missing"), Err(DeckError::UnknownResource(_))));

        assert_eq!(deck.carrier_site("site_1").unwrap().name, "site_1");
        assert!(matches!(deck.carrier_site("tips"), Err(DeckError::NotACarrierSite(name)) if name == "tips"));
        assert!(matches!(deck.carrier_site("carrier"), Err(DeckError::NotACarrierSite(_))));
    }

    #[test]
    fn lists_only_carrier_sites_on_plate_carriers() {
        let deck = sample_deck();
        let sites: Vec<_> = deck.carrier_sites().map(|site| site.name.as_str()).collect();
        assert_eq!(sites, vec!["site_0", "site_1"]);
    }

    #[test]
    fn set_location_keeps_first_value() {
        let mut deck = sample_deck();
        deck.set_location("new_tips", Coordinate::new(1.0, 2.0, 3.0)).unwrap();
        assert!(matches!(
            deck.set_location("new_tips", Coordinate::new(4.0, 5.0, 6.0)),
            Err(DeckError::AlreadyLocated(_))
        ));
        assert_eq!(
            deck.resource("new_tips").unwrap().location,
            Some(Coordinate::new(1.0, 2.0, 3.0))
        );
    }

    #[test]
    fn rejects_duplicate_names() {
        let result = Deck::new(vec![
            Resource::new("a", ResourceKind::Generic, Coordinate::zeros()),
            Resource::new("a", ResourceKind::Generic, Coordinate::zeros()),
        ]);
        assert!(matches!(result, Err(DeckError::DuplicateName(_))));
    }

    #[test]
    fn json_keeps_committed_locations() {
        let mut deck = sample_deck();
        deck.set_location("new_plate", Coordinate::new(91.0, 141.0, 50.0))
            .unwrap();
        let json = deck.to_json().unwrap();
        let parsed = Deck::parse_json(&json).unwrap();
        assert_eq!(
            parsed.resource("new_plate").unwrap().location,
            Some(Coordinate::new(91.0, 141.0, 50.0))
        );
        assert!(parsed.resource("new_tips").unwrap().location.is_none());
    }
}
