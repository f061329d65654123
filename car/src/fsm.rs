/// ----- FSM MODULE -----
/// The operations thread. Once per tick it advances the safety heartbeat,
/// services the door buttons, and then drives whatever the car should be
/// doing in its current mode: moving leg by leg towards the destination,
/// cycling the doors on arrival or on a dispatcher order, or sitting
/// still in a special mode with the dispatcher link closed.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use shared_resources::door::DoorState;
use shared_resources::message::CarMessage;

use crate::context::CarContext;
use crate::doors;

/// Nap while the door state is externally owned, matching the door-phase
/// polling granularity.
const SHORT_NAP: Duration = Duration::from_millis(1);

enum Step {
    IndividualService,
    Emergency,
    Move,
    DoorCycle,
    FinishClosing,
    Idle,
    Skip,
}

pub fn main(ctx: Arc<CarContext>) {
    let tick = ctx.config.delay;
    let mut last_heartbeat = Instant::now();

    while !ctx.shutdown_requested() {
        if last_heartbeat.elapsed() >= tick {
            last_heartbeat = Instant::now();
            advance_heartbeat(&ctx);
        }

        handle_buttons(&ctx);
        if ctx.shutdown_requested() {
            break;
        }

        let step = match ctx.memory.lock() {
            Ok(state) => {
                if state.individual_service_mode() == 1 {
                    Step::IndividualService
                } else if state.emergency_mode() == 1 {
                    Step::Emergency
                } else {
                    match state.status() {
                        Ok(DoorState::Closed) => {
                            match (state.current_floor(), state.destination_floor()) {
                                (Ok(current), Ok(destination)) if current != destination => {
                                    Step::Move
                                }
                                (Ok(_), Ok(_)) if ctx.take_destination_changed() => {
                                    // The dispatcher ordered us to where we
                                    // already are; serve it with a door cycle.
                                    Step::DoorCycle
                                }
                                _ => Step::Idle,
                            }
                        }
                        Ok(DoorState::Opening) | Ok(DoorState::Open) => Step::DoorCycle,
                        Ok(DoorState::Closing) => Step::FinishClosing,
                        _ => Step::Skip,
                    }
                }
            }
            Err(_) => Step::Skip,
        };

        match step {
            Step::Move => drive_to_destination(&ctx),
            Step::DoorCycle => doors::open_door_sequence(&ctx),
            Step::FinishClosing => doors::finish_closing(&ctx),
            Step::IndividualService => individual_service_tick(&ctx),
            Step::Emergency => emergency_tick(&ctx),
            Step::Idle => thread::sleep(tick),
            Step::Skip => thread::sleep(SHORT_NAP),
        }
    }
}

/// The controller's half of the heartbeat: each tick pushes the counter
/// one step towards stale, and the safety monitor pulls it back to fresh.
/// Reaching stale means the monitor is gone, which immobilises the car.
/// While the counter is still zero no monitor has ever checked in; the
/// broadcast gives a newly attached one a chance to do so.
fn advance_heartbeat(ctx: &CarContext) {
    let escalated = {
        let mut state = match ctx.memory.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        if state.safety_system() == 0 {
            state.broadcast();
            return;
        }
        if !ctx.is_connected()
            || state.individual_service_mode() == 1
            || state.emergency_mode() == 1
        {
            return;
        }
        match state.safety_system() {
            1 => {
                state.set_safety_system(2);
                state.broadcast();
                false
            }
            2 => {
                state.set_safety_system(3);
                state.broadcast();
                false
            }
            _ => {
                println!("Safety system disconnected! Entering emergency mode.");
                state.set_emergency_mode(1);
                state.broadcast();
                true
            }
        }
    };
    if escalated {
        ctx.send_and_disconnect(&CarMessage::Emergency.to_string());
    }
}

enum ButtonAction {
    None,
    FinishClose,
    OpenDoors,
}

/// Button priority: a close press while open always wins; an open press
/// acts from `Closed` at the destination floor, or from `Closed` in any
/// position under individual service. Presses in other phases are
/// consumed and ignored.
fn handle_buttons(ctx: &CarContext) {
    let action = {
        let mut state = match ctx.memory.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        let mut action = ButtonAction::None;
        if state.close_button() == 1 {
            state.set_close_button(0);
            if state.status() == Ok(DoorState::Open) {
                state.set_status(DoorState::Closing);
                state.broadcast();
                action = ButtonAction::FinishClose;
            }
        }
        if matches!(action, ButtonAction::None) && state.open_button() == 1 {
            state.set_open_button(0);
            let at_destination = match (state.current_floor(), state.destination_floor()) {
                (Ok(current), Ok(destination)) => current == destination,
                _ => false,
            };
            let manual = state.individual_service_mode() == 1;
            if state.status() == Ok(DoorState::Closed) && (at_destination || manual) {
                action = ButtonAction::OpenDoors;
            }
        }
        action
    };

    match action {
        ButtonAction::FinishClose => {
            ctx.publish_status();
            doors::finish_closing(ctx);
        }
        ButtonAction::OpenDoors => doors::open_door_sequence(ctx),
        ButtonAction::None => {}
    }
}

/// Normal-mode travel: leg by leg towards the destination, one tick per
/// floor, reporting after every step, doors opening on arrival.
fn drive_to_destination(ctx: &CarContext) {
    let tick = ctx.config.delay;
    ctx.take_destination_changed();
    {
        let mut state = match ctx.memory.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        if state.status() != Ok(DoorState::Closed) {
            return;
        }
        state.set_status(DoorState::Between);
        state.broadcast();
    }
    ctx.publish_status();

    while !ctx.shutdown_requested() {
        thread::sleep(tick);
        let arrived = {
            let mut state = match ctx.memory.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            if state.emergency_mode() == 1 || state.status() != Ok(DoorState::Between) {
                return;
            }
            let (current, destination) =
                match (state.current_floor(), state.destination_floor()) {
                    (Ok(current), Ok(destination)) => (current, destination),
                    _ => return,
                };
            let next = current.step_toward(destination);
            state.set_current_floor(next);
            state.broadcast();
            next == destination
        };
        if arrived {
            doors::open_door_sequence(ctx);
            return;
        }
        ctx.publish_status();
    }
}

/// Individual service: the dispatcher is dismissed, and the car creeps
/// floor by floor towards whatever destination the manual controls set,
/// snapping out-of-range destinations back to the current floor.
fn individual_service_tick(ctx: &CarContext) {
    let tick = ctx.config.delay;

    let stationary = match ctx.memory.lock() {
        Ok(state) => matches!(state.status(), Ok(DoorState::Closed) | Ok(DoorState::Open)),
        Err(_) => {
            thread::sleep(tick);
            return;
        }
    };
    if stationary && ctx.is_connected() {
        ctx.send_and_disconnect(&CarMessage::IndividualService.to_string());
    }

    let moving = {
        let mut state = match ctx.memory.lock() {
            Ok(state) => state,
            Err(_) => {
                thread::sleep(tick);
                return;
            }
        };
        match (
            state.status(),
            state.current_floor(),
            state.destination_floor(),
        ) {
            (Ok(DoorState::Closed), Ok(current), Ok(destination)) if current != destination => {
                if destination < ctx.config.lowest || destination > ctx.config.highest {
                    state.set_destination_floor(current);
                    state.broadcast();
                    false
                } else {
                    state.set_status(DoorState::Between);
                    state.broadcast();
                    true
                }
            }
            _ => false,
        }
    };
    if !moving {
        thread::sleep(tick);
        return;
    }

    while !ctx.shutdown_requested() {
        thread::sleep(tick);
        let mut state = match ctx.memory.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        if state.individual_service_mode() != 1 || state.status() != Ok(DoorState::Between) {
            return;
        }
        let (current, destination) = match (state.current_floor(), state.destination_floor()) {
            (Ok(current), Ok(destination)) => (current, destination),
            _ => return,
        };
        let next = current.step_toward(destination);
        state.set_current_floor(next);
        if next == destination {
            state.set_status(DoorState::Closed);
            state.broadcast();
            return;
        }
        state.broadcast();
    }
}

/// Emergency mode freezes the car; all that is left to do is say goodbye
/// to the dispatcher once.
fn emergency_tick(ctx: &CarContext) {
    if ctx.is_connected() {
        ctx.send_and_disconnect(&CarMessage::Emergency.to_string());
    }
    thread::sleep(ctx.config.delay);
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_resources::car_memory::CarMemory;
    use shared_resources::config::CarConfig;
    use shared_resources::floor::Floor;

    fn test_context(tag: &str, delay_ms: u64) -> Arc<CarContext> {
        let name = format!("fsm-test-{}-{}", tag, std::process::id());
        let memory = CarMemory::create(&name).unwrap();
        let config = CarConfig {
            name,
            lowest: "B2".parse().unwrap(),
            highest: "5".parse().unwrap(),
            delay: Duration::from_millis(delay_ms),
            dispatcher_port: 0,
        };
        Arc::new(CarContext::new(memory, config))
    }

    fn floor(label: &str) -> Floor {
        label.parse().unwrap()
    }

    #[test]
    fn close_button_closes_open_doors() {
        let ctx = test_context("close", 10);
        {
            let mut state = ctx.memory.lock().unwrap();
            state.set_status(DoorState::Open);
            state.set_close_button(1);
        }
        handle_buttons(&ctx);
        let state = ctx.memory.lock().unwrap();
        assert_eq!(state.status().unwrap(), DoorState::Closed);
        assert_eq!(state.close_button(), 0);
        drop(state);
        ctx.memory.unlink();
    }

    #[test]
    fn open_button_is_ignored_away_from_the_destination() {
        let ctx = test_context("open-away", 10);
        {
            let mut state = ctx.memory.lock().unwrap();
            state.set_current_floor(floor("2"));
            state.set_destination_floor(floor("4"));
            state.set_open_button(1);
        }
        handle_buttons(&ctx);
        let state = ctx.memory.lock().unwrap();
        assert_eq!(state.status().unwrap(), DoorState::Closed);
        assert_eq!(state.open_button(), 0, "the press is consumed either way");
        drop(state);
        ctx.memory.unlink();
    }

    #[test]
    fn open_button_works_anywhere_in_individual_service() {
        let ctx = test_context("open-manual", 5);
        {
            let mut state = ctx.memory.lock().unwrap();
            state.set_individual_service_mode(1);
            state.set_current_floor(floor("2"));
            state.set_destination_floor(floor("4"));
            state.set_open_button(1);
        }
        let started = Instant::now();
        handle_buttons(&ctx);
        // The full cycle ran: Opening, Open, Closing, Closed.
        assert!(started.elapsed() >= Duration::from_millis(3 * 5));
        let state = ctx.memory.lock().unwrap();
        assert_eq!(state.status().unwrap(), DoorState::Closed);
        drop(state);
        ctx.memory.unlink();
    }

    #[test]
    fn manual_motion_steps_floor_by_floor() {
        let ctx = test_context("manual-move", 5);
        {
            let mut state = ctx.memory.lock().unwrap();
            state.set_individual_service_mode(1);
            state.set_current_floor(floor("B2"));
            state.set_destination_floor(floor("2"));
        }
        individual_service_tick(&ctx);
        let state = ctx.memory.lock().unwrap();
        assert_eq!(state.current_floor().unwrap(), floor("2"));
        assert_eq!(state.status().unwrap(), DoorState::Closed);
        drop(state);
        ctx.memory.unlink();
    }

    #[test]
    fn manual_motion_snaps_bad_destinations_back() {
        let ctx = test_context("manual-snap", 5);
        {
            let mut state = ctx.memory.lock().unwrap();
            state.set_individual_service_mode(1);
            state.set_current_floor(floor("2"));
            state.set_destination_floor(floor("999"));
        }
        individual_service_tick(&ctx);
        let state = ctx.memory.lock().unwrap();
        assert_eq!(state.destination_floor().unwrap(), floor("2"));
        assert_eq!(state.status().unwrap(), DoorState::Closed);
        drop(state);
        ctx.memory.unlink();
    }

    #[test]
    fn normal_drive_lands_with_a_door_cycle() {
        let ctx = test_context("drive", 5);
        {
            let mut state = ctx.memory.lock().unwrap();
            state.set_current_floor(floor("1"));
            state.set_destination_floor(floor("3"));
        }
        drive_to_destination(&ctx);
        let state = ctx.memory.lock().unwrap();
        assert_eq!(state.current_floor().unwrap(), floor("3"));
        assert_eq!(state.status().unwrap(), DoorState::Closed);
        drop(state);
        ctx.memory.unlink();
    }
}
