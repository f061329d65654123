use std::env;
use std::process;
use std::thread;
use std::time::Duration;

use shared_resources::car_memory::CarMemory;

pub mod monitor;

/// Back-off after a failed lock or wait, so a broken mutex does not turn
/// into a tight loop.
const FAILURE_BACKOFF: Duration = Duration::from_secs(1);

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() != 1 {
        eprintln!("usage: safety <car name>");
        process::exit(1);
    }
    let car_name = &args[0];

    let memory = match CarMemory::open(car_name) {
        Ok(memory) => memory,
        Err(e) => {
            eprintln!("Unable to access car {}: {}", car_name, e);
            process::exit(1);
        }
    };
    println!("Safety monitor watching car {}.", car_name);

    loop {
        let mut state = match memory.lock() {
            Ok(state) => state,
            Err(e) => {
                eprintln!("Mutex lock failed in safety system: {}", e);
                memory.force_emergency();
                thread::sleep(FAILURE_BACKOFF);
                continue;
            }
        };
        if let Err(e) = state.wait() {
            eprintln!("Condition wait failed in safety system: {}", e);
            state.set_emergency_mode(1);
            state.broadcast();
            drop(state);
            thread::sleep(FAILURE_BACKOFF);
            continue;
        }
        let outcome = monitor::evaluate(&state.snapshot());
        monitor::apply(&outcome, &mut state);
    }
}
