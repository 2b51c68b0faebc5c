use crate::motion_gateway::GripDirection;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error while accessing configuration")]
    Io(#[from] std::io::Error),
    #[error("error while parsing json")]
    Json(#[from] serde_json::Error),
    #[error("error while parsing yaml")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

type Result<T> = std::result::Result<T, ConfigError>;

lazy_static! {
    static ref INCLUDED: TeachConfig = {
        let json = include_str!("../config/teach.json");
        TeachConfig::parse_json(json).unwrap()
    };
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TeachConfig {
    /// Grid cell used as landmark for plates and tip racks
    pub reference_cell: String,
    /// Channel used for teaching, last channel when not set
    pub reference_channel: Option<usize>,
    /// Allowed jog steps in mm
    pub step_sizes: Vec<f64>,
    pub default_step: f64,
    /// Added on top of the tip length when moving to a tip spot
    pub tip_clearance: f64,
    pub pickup_distance_from_top: f64,
    pub grip_direction: GripDirection,
    /// Converts mm to the backend's traverse height unit.
    /// Empirical, depends on the backend
    pub traverse_height_scale: f64,
    /// z the gripper goes to after releasing a plate
    pub safe_release_height: f64,
    /// Positions computed from the deck are rounded to this
    pub position_precision: f64,
}

impl Default for TeachConfig {
    fn default() -> Self {
        TeachConfig::included()
    }
}

impl TeachConfig {
    /// Packaged with the binary
    pub fn included() -> TeachConfig {
        INCLUDED.clone()
    }

    pub fn validate(&self) -> Result<()> {
        if self.reference_cell.is_empty() {
            return Err(ConfigError::Invalid("reference cell is empty".to_owned()));
        }
        if self.step_sizes.is_empty() || self.step_sizes.iter().any(|step| *step <= 0.0) {
            return Err(ConfigError::Invalid(
                "step sizes must be positive and non empty".to_owned(),
            ));
        }
        if !self.step_sizes.contains(&self.default_step) {
            return Err(ConfigError::Invalid(format!(
                "default step {} is not one of {:?}",
                self.default_step, self.step_sizes
            )));
        }
        Ok(())
    }

    pub fn parse_json(text: &str) -> Result<TeachConfig> {
        let config: TeachConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse_yaml(text: &str) -> Result<TeachConfig> {
        let config: TeachConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn serialize_to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn serialize_to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        fs::write(path, self.serialize_to_json()?)?;
        Ok(())
    }

    pub fn save_yaml(&self, path: &str) -> Result<()> {
        fs::write(path, self.serialize_to_yaml()?)?;
        Ok(())
    }

    /// Picks the format from the extension, json unless it ends in yml/yaml
    pub fn load(path: &str) -> Result<TeachConfig> {
        let text = fs::read_to_string(path)?;
        if path.ends_with(".yaml") || path.ends_with(".yml") {
            TeachConfig::parse_yaml(&text)
        } else {
            TeachConfig::parse_json(&text)
        }
    }
}
