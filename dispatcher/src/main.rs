use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::unbounded;

use dispatcher::debug;
use dispatcher::registry::CarRegistry;
use dispatcher::server;
use shared_resources::config::DispatcherConfig;

fn main() {
    env_logger::init();
    let config = DispatcherConfig::get();

    let listener = match netframe::sock::listen(config.port) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Unable to bind port {}: {}", config.port, e);
            process::exit(1);
        }
    };
    println!("Dispatcher listening on port {}", config.port);

    let shutdown = Arc::new(AtomicBool::new(false));
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGINT, shutdown.clone()) {
        eprintln!("Unable to install the SIGINT handler: {}", e);
        process::exit(1);
    }

    let registry = Arc::new(Mutex::new(CarRegistry::new()));

    // STATUS DISPLAY THREAD
    let (status_tx, status_rx) = unbounded();
    thread::spawn(move || debug::main(status_rx));

    // ACCEPT LOOP
    if let Err(e) = server::main(listener, registry, shutdown, status_tx) {
        eprintln!("Accept loop failed: {}", e);
        process::exit(1);
    }
}
