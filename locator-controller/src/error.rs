use crate::deck::DeckError;
use crate::geometry::Axis;
use crate::motion_gateway::HardwareError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TeachError {
    #[error("motion backend failed")]
    Hardware(#[from] HardwareError),
    #[error("{operation} succeeded but moving the tool afterwards failed")]
    Restation {
        operation: &'static str,
        #[source]
        source: HardwareError,
    },
    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
    #[error("first position must set every axis, missing {0:?}")]
    IncompletePosition(Vec<Axis>),
    #[error("resource {0:?} already has a location")]
    AlreadyLocated(String),
    #[error("already holding {0}")]
    AlreadyHolding(String),
    #[error("nothing selected")]
    NoSelection,
    #[error("step size {0} mm is not one of the configured steps")]
    InvalidStep(f64),
    #[error("carrier site {0:?} already holds a plate")]
    SiteOccupied(String),
    #[error("deck lookup failed")]
    Deck(#[from] DeckError),
}

impl TeachError {
    pub(crate) fn invalid_state(operation: &'static str, state: impl Into<String>) -> Self {
        TeachError::InvalidState {
            operation,
            state: state.into(),
        }
    }

    /// Failure of the follow-up move that re-stations the tool after `operation` succeeded
    pub(crate) fn into_restation(self, operation: &'static str) -> Self {
        match self {
            TeachError::Hardware(source) => TeachError::Restation { operation, source },
            other => other,
        }
    }

    /// Selection errors only mean the operator had nothing selected
    pub fn is_ignorable(&self) -> bool {
        matches!(self, TeachError::NoSelection)
    }

    pub fn is_hardware(&self) -> bool {
        matches!(
            self,
            TeachError::Hardware(_) | TeachError::Restation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TeachError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn hardware_error_keeps_cause() {
        let error: TeachError = HardwareError::Fault("z drive stalled".to_owned()).into();
        assert!(error.is_hardware());
        assert_eq!(
            error.source().map(|source| source.to_string()),
            Some("actuator fault: z drive stalled".to_owned())
        );
    }

    #[test]
    fn restation_wraps_hardware_errors_only() {
        let error = TeachError::from(HardwareError::NotConnected).into_restation("pick up tip");
        assert!(matches!(
            error,
            TeachError::Restation {
                operation: "pick up tip",
                source: HardwareError::NotConnected
            }
        ));
        let error = TeachError::NoSelection.into_restation("pick up tip");
        assert!(matches!(error, TeachError::NoSelection));
    }

    #[test]
    fn no_selection_is_ignorable() {
        assert!(TeachError::NoSelection.is_ignorable());
        assert!(!TeachError::AlreadyLocated("plate".to_owned()).is_ignorable());
    }
}
