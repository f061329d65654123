/// ----- MESSAGE MODULE -----
/// The ASCII grammar spoken over the framed TCP links: car registrations
/// and status reports towards the dispatcher, floor orders back to the
/// cars, and the one-shot call-pad exchange.

use std::fmt;

use crate::door::{DoorState, InvalidStatus};
use crate::floor::{Floor, InvalidFloor};

pub const MAX_CAR_NAME: usize = 128;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed message")]
    Malformed,
    #[error("invalid floor label in message")]
    BadFloor,
    #[error("invalid door status in message")]
    BadStatus,
    #[error("car name missing, too long or not a single token")]
    BadName,
}

impl From<InvalidFloor> for ProtocolError {
    fn from(_: InvalidFloor) -> Self {
        ProtocolError::BadFloor
    }
}

impl From<InvalidStatus> for ProtocolError {
    fn from(_: InvalidStatus) -> Self {
        ProtocolError::BadStatus
    }
}

/// Everything a car can send the dispatcher over its persistent link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarMessage {
    Register {
        name: String,
        lowest: Floor,
        highest: Floor,
    },
    Status {
        door: DoorState,
        current: Floor,
        destination: Floor,
    },
    IndividualService,
    Emergency,
}

impl CarMessage {
    pub fn parse(line: &str) -> Result<CarMessage, ProtocolError> {
        if line == "INDIVIDUAL SERVICE" {
            return Ok(CarMessage::IndividualService);
        }
        if line == "EMERGENCY" {
            return Ok(CarMessage::Emergency);
        }
        let mut parts = line.split_whitespace();
        let message = match parts.next() {
            Some("CAR") => {
                let name = parts.next().ok_or(ProtocolError::Malformed)?;
                if name.is_empty() || name.len() > MAX_CAR_NAME {
                    return Err(ProtocolError::BadName);
                }
                let lowest = parts.next().ok_or(ProtocolError::Malformed)?.parse()?;
                let highest = parts.next().ok_or(ProtocolError::Malformed)?.parse()?;
                CarMessage::Register {
                    name: name.to_string(),
                    lowest,
                    highest,
                }
            }
            Some("STATUS") => {
                let door = parts.next().ok_or(ProtocolError::Malformed)?.parse()?;
                let current = parts.next().ok_or(ProtocolError::Malformed)?.parse()?;
                let destination = parts.next().ok_or(ProtocolError::Malformed)?.parse()?;
                CarMessage::Status {
                    door,
                    current,
                    destination,
                }
            }
            _ => return Err(ProtocolError::Malformed),
        };
        if parts.next().is_some() {
            return Err(ProtocolError::Malformed);
        }
        Ok(message)
    }
}

impl fmt::Display for CarMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarMessage::Register {
                name,
                lowest,
                highest,
            } => write!(f, "CAR {} {} {}", name, lowest, highest),
            CarMessage::Status {
                door,
                current,
                destination,
            } => write!(f, "STATUS {} {} {}", door, current, destination),
            CarMessage::IndividualService => f.write_str("INDIVIDUAL SERVICE"),
            CarMessage::Emergency => f.write_str("EMERGENCY"),
        }
    }
}

/// A destination order from the dispatcher to a car.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloorOrder(pub Floor);

impl FloorOrder {
    pub fn parse(line: &str) -> Result<FloorOrder, ProtocolError> {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("FLOOR"), Some(floor), None) => Ok(FloorOrder(floor.parse()?)),
            _ => Err(ProtocolError::Malformed),
        }
    }
}

impl fmt::Display for FloorOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FLOOR {}", self.0)
    }
}

/// The single frame a call pad sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallRequest {
    pub source: Floor,
    pub destination: Floor,
}

impl CallRequest {
    pub fn parse(line: &str) -> Result<CallRequest, ProtocolError> {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("CALL"), Some(source), Some(destination), None) => Ok(CallRequest {
                source: source.parse()?,
                destination: destination.parse()?,
            }),
            _ => Err(ProtocolError::Malformed),
        }
    }
}

impl fmt::Display for CallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CALL {} {}", self.source, self.destination)
    }
}

/// The single frame the dispatcher sends back to a call pad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallReply {
    Car(String),
    Unavailable,
}

impl CallReply {
    pub fn parse(line: &str) -> Result<CallReply, ProtocolError> {
        if line == "UNAVAILABLE" {
            return Ok(CallReply::Unavailable);
        }
        match line.strip_prefix("CAR ") {
            Some(name) if !name.is_empty() => Ok(CallReply::Car(name.to_string())),
            _ => Err(ProtocolError::Malformed),
        }
    }
}

impl fmt::Display for CallReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallReply::Car(name) => write!(f, "CAR {}", name),
            CallReply::Unavailable => f.write_str("UNAVAILABLE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_roundtrip() {
        let message = CarMessage::parse("CAR Alpha B2 10").unwrap();
        assert_eq!(
            message,
            CarMessage::Register {
                name: "Alpha".to_string(),
                lowest: "B2".parse().unwrap(),
                highest: "10".parse().unwrap(),
            }
        );
        assert_eq!(message.to_string(), "CAR Alpha B2 10");
    }

    #[test]
    fn status_roundtrip() {
        let message = CarMessage::parse("STATUS Between 3 7").unwrap();
        assert_eq!(message.to_string(), "STATUS Between 3 7");
    }

    #[test]
    fn mode_messages_parse_exactly() {
        assert_eq!(
            CarMessage::parse("INDIVIDUAL SERVICE").unwrap(),
            CarMessage::IndividualService
        );
        assert_eq!(CarMessage::parse("EMERGENCY").unwrap(), CarMessage::Emergency);
        assert!(CarMessage::parse("INDIVIDUAL").is_err());
    }

    #[test]
    fn rejects_malformed_car_messages() {
        assert!(CarMessage::parse("CAR Alpha 1").is_err());
        assert!(CarMessage::parse("CAR Alpha 0 5").is_err());
        assert!(CarMessage::parse("STATUS Ajar 1 1").is_err());
        assert!(CarMessage::parse("STATUS Closed 1 1 extra").is_err());
        assert!(CarMessage::parse("").is_err());
    }

    #[test]
    fn rejects_oversized_names() {
        let line = format!("CAR {} 1 5", "x".repeat(MAX_CAR_NAME + 1));
        assert_eq!(CarMessage::parse(&line), Err(ProtocolError::BadName));
    }

    #[test]
    fn floor_order_roundtrip() {
        let order = FloorOrder::parse("FLOOR B3").unwrap();
        assert_eq!(order.0.as_int(), -3);
        assert_eq!(order.to_string(), "FLOOR B3");
        assert!(FloorOrder::parse("FLOOR").is_err());
        assert!(FloorOrder::parse("FLOOR 1 2").is_err());
    }

    #[test]
    fn call_roundtrip() {
        let call = CallRequest::parse("CALL 1 B2").unwrap();
        assert_eq!(call.to_string(), "CALL 1 B2");
        assert!(CallRequest::parse("CALL 1").is_err());
        assert!(CallRequest::parse("CALL 0 2").is_err());
    }

    #[test]
    fn reply_roundtrip() {
        assert_eq!(
            CallReply::parse("CAR Alpha").unwrap(),
            CallReply::Car("Alpha".to_string())
        );
        assert_eq!(CallReply::parse("UNAVAILABLE").unwrap(), CallReply::Unavailable);
        assert!(CallReply::parse("CAR ").is_err());
    }
}
