use std::env;
use std::process;

use shared_resources::car_memory::StateGuard;
use shared_resources::car_memory::CarMemory;
use shared_resources::door::DoorState;

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() != 2 {
        eprintln!("usage: internal <car name> <operation>");
        eprintln!("operations: open close stop service_on service_off up down");
        process::exit(1);
    }
    let car_name = &args[0];
    let operation = args[1].as_str();

    let memory = match CarMemory::open(car_name) {
        Ok(memory) => memory,
        Err(_) => {
            println!("Unable to access car {}.", car_name);
            process::exit(1);
        }
    };
    let mut state = match memory.lock() {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Unable to lock car {}: {}", car_name, e);
            process::exit(1);
        }
    };

    let result = run_operation(&mut state, operation);
    match result {
        Ok(()) => {
            state.broadcast();
        }
        Err(message) => {
            // The guard must unlock before the process exits, or the other
            // processes deadlock on the region.
            drop(state);
            println!("{}", message);
            process::exit(1);
        }
    }
}

fn run_operation(state: &mut StateGuard<'_>, operation: &str) -> Result<(), String> {
    match operation {
        "open" => state.set_open_button(1),
        "close" => state.set_close_button(1),
        "stop" => state.set_emergency_stop(1),
        "service_on" => {
            // Switching a car into individual service is also how an
            // emergency is recovered from.
            state.set_individual_service_mode(1);
            state.set_emergency_mode(0);
        }
        "service_off" => state.set_individual_service_mode(0),
        "up" | "down" => {
            if state.individual_service_mode() != 1 {
                return Err("Operation only allowed in service mode.".to_string());
            }
            match state.status() {
                Ok(DoorState::Open) | Ok(DoorState::Opening) | Ok(DoorState::Closing) => {
                    return Err("Operation not allowed while doors are open.".to_string());
                }
                Ok(DoorState::Between) => {
                    return Err("Operation not allowed while elevator is moving.".to_string());
                }
                _ => {}
            }
            let current = state
                .current_floor()
                .map_err(|_| format!("Car reports an invalid floor {:?}.", state.current_floor_label()))?;
            let next = if operation == "up" {
                current.next_up()
            } else {
                current.next_down()
            };
            match next {
                Some(next) => state.set_destination_floor(next),
                None => return Err("Already at the terminal floor.".to_string()),
            }
        }
        _ => return Err("Invalid operation.".to_string()),
    }
    Ok(())
}
