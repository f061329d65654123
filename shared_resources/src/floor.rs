/// ----- FLOOR MODULE -----
/// Textual floor labels and their signed-integer form. Above-ground floors
/// are "1".."999", basements are "B1".."B99" and map to negative integers.
/// There is no floor 0.

use std::fmt;
use std::str::FromStr;

pub const LOWEST: i32 = -99;
pub const HIGHEST: i32 = 999;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid floor label")]
pub struct InvalidFloor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Floor(i32);

impl Floor {
    /// The default floor a freshly created car region starts on.
    pub const FIRST: Floor = Floor(1);

    pub fn from_int(value: i32) -> Result<Floor, InvalidFloor> {
        if value == 0 || !(LOWEST..=HIGHEST).contains(&value) {
            return Err(InvalidFloor);
        }
        Ok(Floor(value))
    }

    pub fn as_int(self) -> i32 {
        self.0
    }

    pub fn next_up(self) -> Option<Floor> {
        match self.0 {
            HIGHEST => None,
            -1 => Some(Floor(1)),
            n => Some(Floor(n + 1)),
        }
    }

    pub fn next_down(self) -> Option<Floor> {
        match self.0 {
            LOWEST => None,
            1 => Some(Floor(-1)),
            n => Some(Floor(n - 1)),
        }
    }

    /// One floor in the direction of `destination`, skipping the
    /// non-existent floor 0. Returns `self` when already there.
    pub fn step_toward(self, destination: Floor) -> Floor {
        if destination.0 > self.0 {
            self.next_up().unwrap_or(self)
        } else if destination.0 < self.0 {
            self.next_down().unwrap_or(self)
        } else {
            self
        }
    }

    pub fn is_valid_label(label: &str) -> bool {
        label.parse::<Floor>().is_ok()
    }
}

impl FromStr for Floor {
    type Err = InvalidFloor;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        if label.is_empty() || label.len() > 3 {
            return Err(InvalidFloor);
        }
        let (digits, sign) = match label.strip_prefix('B') {
            Some(rest) => (rest, -1),
            None => (label, 1),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidFloor);
        }
        let value: i32 = digits.parse().map_err(|_| InvalidFloor)?;
        let limit = if sign < 0 { -LOWEST } else { HIGHEST };
        if value < 1 || value > limit {
            return Err(InvalidFloor);
        }
        Ok(Floor(sign * value))
    }
}

impl fmt::Display for Floor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "B{}", -self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_roundtrip_covers_whole_range() {
        for n in (LOWEST..=HIGHEST).filter(|&n| n != 0) {
            let floor = Floor::from_int(n).unwrap();
            let label = floor.to_string();
            assert!(Floor::is_valid_label(&label), "label {} should validate", label);
            assert_eq!(label.parse::<Floor>().unwrap().as_int(), n);
        }
    }

    #[test]
    fn rejects_bad_labels() {
        for label in ["", "0", "B0", "1000", "B100", "-1", "+1", "B", "1.5", "b2", "12a", "B1a"] {
            assert!(!Floor::is_valid_label(label), "label {:?} should be rejected", label);
        }
    }

    #[test]
    fn rejects_out_of_range_ints() {
        assert_eq!(Floor::from_int(0), Err(InvalidFloor));
        assert_eq!(Floor::from_int(-100), Err(InvalidFloor));
        assert_eq!(Floor::from_int(1000), Err(InvalidFloor));
    }

    #[test]
    fn leading_zeros_pass_the_range_check() {
        assert_eq!("007".parse::<Floor>().unwrap().as_int(), 7);
        assert_eq!("B07".parse::<Floor>().unwrap().as_int(), -7);
    }

    #[test]
    fn ordering_is_numeric() {
        let b99: Floor = "B99".parse().unwrap();
        let b1: Floor = "B1".parse().unwrap();
        let one: Floor = "1".parse().unwrap();
        let top: Floor = "999".parse().unwrap();
        assert!(b99 < b1);
        assert!(b1 < one);
        assert!(one < top);
    }

    #[test]
    fn stepping_skips_floor_zero() {
        let b1: Floor = "B1".parse().unwrap();
        let one: Floor = "1".parse().unwrap();
        assert_eq!(b1.next_up(), Some(one));
        assert_eq!(one.next_down(), Some(b1));
        assert_eq!(b1.step_toward("3".parse().unwrap()), one);
        assert_eq!(one.step_toward("B2".parse().unwrap()), b1);
        assert_eq!(one.step_toward(one), one);
    }

    #[test]
    fn stepping_stops_at_the_boundaries() {
        let bottom = Floor::from_int(LOWEST).unwrap();
        let top = Floor::from_int(HIGHEST).unwrap();
        assert_eq!(bottom.next_down(), None);
        assert_eq!(top.next_up(), None);
    }
}
