/// ----- MONITOR MODULE -----
/// The check sequence run on every wake-up, split into a pure evaluation
/// over a snapshot of the region and the write-back of its outcome. The
/// order matters: heartbeat refresh, obstruction reopen, emergency stop,
/// overload, then the consistency sweep. Emergency mode is latching; once
/// the car is in it, the consistency sweep no longer runs and the state
/// is left frozen.

use shared_resources::car_memory::{CarFields, StateGuard};
use shared_resources::door::DoorState;
use shared_resources::floor::Floor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyCause {
    EmergencyStop,
    Overload,
    Inconsistency,
}

impl EmergencyCause {
    pub fn message(self) -> &'static str {
        match self {
            EmergencyCause::EmergencyStop => "The emergency stop button has been pressed!",
            EmergencyCause::Overload => "The overload sensor has been tripped!",
            EmergencyCause::Inconsistency => "Data consistency error!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepOutcome {
    pub refresh_heartbeat: bool,
    pub reopen_doors: bool,
    pub clear_emergency_stop: bool,
    pub latch_emergency: Option<EmergencyCause>,
}

pub fn evaluate(fields: &CarFields) -> SweepOutcome {
    let mut outcome = SweepOutcome::default();

    if fields.safety_system != 1 {
        outcome.refresh_heartbeat = true;
    }

    if fields.door_obstruction == 1 && fields.status == "Closing" {
        outcome.reopen_doors = true;
    }
    // The consistency sweep judges the status as it will be written back.
    let status = if outcome.reopen_doors {
        DoorState::Opening.as_str()
    } else {
        fields.status.as_str()
    };

    let already_in_emergency = fields.emergency_mode == 1;
    if fields.emergency_stop == 1 && !already_in_emergency {
        outcome.latch_emergency = Some(EmergencyCause::EmergencyStop);
        outcome.clear_emergency_stop = true;
    } else if fields.overload == 1 && !already_in_emergency {
        outcome.latch_emergency = Some(EmergencyCause::Overload);
    } else if !already_in_emergency && !consistent(fields, status) {
        outcome.latch_emergency = Some(EmergencyCause::Inconsistency);
    }

    outcome
}

fn consistent(fields: &CarFields, status: &str) -> bool {
    if !Floor::is_valid_label(&fields.current_floor) {
        return false;
    }
    if !Floor::is_valid_label(&fields.destination_floor) {
        return false;
    }
    if !DoorState::is_valid_label(status) {
        return false;
    }
    let booleans = [
        fields.open_button,
        fields.close_button,
        fields.door_obstruction,
        fields.overload,
        fields.emergency_stop,
        fields.individual_service_mode,
        fields.emergency_mode,
    ];
    if booleans.iter().any(|&value| value >= 2) {
        return false;
    }
    // An obstruction only makes sense while the doors are in motion.
    if fields.door_obstruction == 1 && status != "Opening" && status != "Closing" {
        return false;
    }
    true
}

/// Write the outcome back under the same lock the snapshot was taken
/// under, broadcasting when anything observable changed.
pub fn apply(outcome: &SweepOutcome, state: &mut StateGuard<'_>) {
    let mut changed = false;
    if outcome.refresh_heartbeat {
        state.set_safety_system(1);
        changed = true;
    }
    if outcome.reopen_doors {
        state.set_status(DoorState::Opening);
        changed = true;
    }
    if let Some(cause) = outcome.latch_emergency {
        eprintln!("{}", cause.message());
        state.set_emergency_mode(1);
        changed = true;
    }
    if outcome.clear_emergency_stop {
        state.set_emergency_stop(0);
        changed = true;
    }
    if changed {
        state.broadcast();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_fields() -> CarFields {
        CarFields {
            current_floor: "1".to_string(),
            destination_floor: "1".to_string(),
            status: "Closed".to_string(),
            open_button: 0,
            close_button: 0,
            door_obstruction: 0,
            overload: 0,
            emergency_stop: 0,
            individual_service_mode: 0,
            emergency_mode: 0,
            safety_system: 1,
        }
    }

    #[test]
    fn a_healthy_car_needs_nothing() {
        assert_eq!(evaluate(&healthy_fields()), SweepOutcome::default());
    }

    #[test]
    fn stale_heartbeats_are_refreshed() {
        for stale in [0, 2, 3] {
            let mut fields = healthy_fields();
            fields.safety_system = stale;
            assert!(evaluate(&fields).refresh_heartbeat);
        }
    }

    #[test]
    fn obstruction_while_closing_reopens_the_doors() {
        let mut fields = healthy_fields();
        fields.status = "Closing".to_string();
        fields.door_obstruction = 1;
        let outcome = evaluate(&fields);
        assert!(outcome.reopen_doors);
        // The rewritten status is what gets consistency-checked, so an
        // obstruction mid-close is not an anomaly.
        assert_eq!(outcome.latch_emergency, None);
    }

    #[test]
    fn obstruction_while_parked_is_an_anomaly() {
        let mut fields = healthy_fields();
        fields.door_obstruction = 1;
        let outcome = evaluate(&fields);
        assert!(!outcome.reopen_doors);
        assert_eq!(outcome.latch_emergency, Some(EmergencyCause::Inconsistency));
    }

    #[test]
    fn emergency_stop_latches_and_clears_the_button() {
        let mut fields = healthy_fields();
        fields.emergency_stop = 1;
        let outcome = evaluate(&fields);
        assert_eq!(outcome.latch_emergency, Some(EmergencyCause::EmergencyStop));
        assert!(outcome.clear_emergency_stop);
    }

    #[test]
    fn overload_latches() {
        let mut fields = healthy_fields();
        fields.overload = 1;
        assert_eq!(
            evaluate(&fields).latch_emergency,
            Some(EmergencyCause::Overload)
        );
    }

    #[test]
    fn emergency_stop_outranks_overload() {
        let mut fields = healthy_fields();
        fields.emergency_stop = 1;
        fields.overload = 1;
        assert_eq!(
            evaluate(&fields).latch_emergency,
            Some(EmergencyCause::EmergencyStop)
        );
    }

    #[test]
    fn latched_emergency_freezes_the_checks() {
        let mut fields = healthy_fields();
        fields.emergency_mode = 1;
        fields.emergency_stop = 1;
        fields.overload = 1;
        fields.current_floor = "garbage".to_string();
        let outcome = evaluate(&fields);
        assert_eq!(outcome.latch_emergency, None);
        assert!(!outcome.clear_emergency_stop);
    }

    #[test]
    fn corrupted_fields_are_an_anomaly() {
        let mut bad_floor = healthy_fields();
        bad_floor.current_floor = "B100".to_string();
        assert_eq!(
            evaluate(&bad_floor).latch_emergency,
            Some(EmergencyCause::Inconsistency)
        );

        let mut bad_status = healthy_fields();
        bad_status.status = "Ajar".to_string();
        assert_eq!(
            evaluate(&bad_status).latch_emergency,
            Some(EmergencyCause::Inconsistency)
        );

        let mut bad_boolean = healthy_fields();
        bad_boolean.open_button = 2;
        assert_eq!(
            evaluate(&bad_boolean).latch_emergency,
            Some(EmergencyCause::Inconsistency)
        );
    }
}
