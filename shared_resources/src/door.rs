/// ----- DOOR MODULE -----
/// The five door phases a car can be in. `Between` is the only phase in
/// which the car is moving.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid door status")]
pub struct InvalidStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Opening,
    Open,
    Closing,
    Closed,
    Between,
}

impl DoorState {
    pub fn as_str(self) -> &'static str {
        match self {
            DoorState::Opening => "Opening",
            DoorState::Open => "Open",
            DoorState::Closing => "Closing",
            DoorState::Closed => "Closed",
            DoorState::Between => "Between",
        }
    }

    pub fn is_moving(self) -> bool {
        self == DoorState::Between
    }

    pub fn is_valid_label(label: &str) -> bool {
        label.parse::<DoorState>().is_ok()
    }
}

impl FromStr for DoorState {
    type Err = InvalidStatus;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "Opening" => Ok(DoorState::Opening),
            "Open" => Ok(DoorState::Open),
            "Closing" => Ok(DoorState::Closing),
            "Closed" => Ok(DoorState::Closed),
            "Between" => Ok(DoorState::Between),
            _ => Err(InvalidStatus),
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_roundtrip() {
        for state in [
            DoorState::Opening,
            DoorState::Open,
            DoorState::Closing,
            DoorState::Closed,
            DoorState::Between,
        ] {
            assert_eq!(state.as_str().parse::<DoorState>().unwrap(), state);
        }
    }

    #[test]
    fn rejects_unknown_labels() {
        assert!(!DoorState::is_valid_label("open"));
        assert!(!DoorState::is_valid_label("Unknown"));
        assert!(!DoorState::is_valid_label(""));
    }

    #[test]
    fn only_between_is_moving() {
        assert!(DoorState::Between.is_moving());
        assert!(!DoorState::Closed.is_moving());
        assert!(!DoorState::Opening.is_moving());
    }
}
