use std::process;
use std::sync::Arc;
use std::thread;

use signal_hook::consts::SIGINT;
use signal_hook::iterator::Signals;

use shared_resources::car_memory::CarMemory;
use shared_resources::config::CarConfig;

pub mod context;
pub mod doors;
pub mod fsm;
pub mod network;

use context::CarContext;

fn main() {
    env_logger::init();

    let config = match CarConfig::get() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(1);
        }
    };

    let memory = match CarMemory::create(&config.name) {
        Ok(memory) => memory,
        Err(e) => {
            eprintln!("Unable to set up shared memory for car {}: {}", config.name, e);
            process::exit(1);
        }
    };
    // The car wakes up parked at its lowest floor.
    match memory.lock() {
        Ok(mut state) => {
            state.set_current_floor(config.lowest);
            state.set_destination_floor(config.lowest);
            state.broadcast();
        }
        Err(e) => {
            eprintln!("Unable to initialise car {}: {}", config.name, e);
            process::exit(1);
        }
    }

    let ctx = Arc::new(CarContext::new(memory, config));

    // SIGNAL THREAD
    let mut signals = match Signals::new(&[SIGINT]) {
        Ok(signals) => signals,
        Err(e) => {
            eprintln!("Unable to install the SIGINT handler: {}", e);
            process::exit(1);
        }
    };
    {
        let ctx = ctx.clone();
        thread::spawn(move || {
            if signals.forever().next().is_some() {
                println!("Shutting down...");
                ctx.request_shutdown();
            }
        });
    }

    println!(
        "Car {} in service (floors {} to {}).",
        ctx.config.name, ctx.config.lowest, ctx.config.highest
    );

    // LINK + OPERATIONS THREADS
    let link_handle = {
        let ctx = ctx.clone();
        thread::spawn(move || network::main(ctx))
    };
    let operations_handle = {
        let ctx = ctx.clone();
        thread::spawn(move || fsm::main(ctx))
    };

    operations_handle.join().ok();
    link_handle.join().ok();

    ctx.memory.unlink();
}
