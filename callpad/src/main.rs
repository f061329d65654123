use std::env;
use std::process;

use netframe::{frame, sock};
use shared_resources::config::DispatcherConfig;
use shared_resources::floor::Floor;
use shared_resources::message::{CallReply, CallRequest};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() != 2 {
        eprintln!("usage: callpad <source floor> <destination floor>");
        process::exit(1);
    }
    let (source, destination) = match validate_call(&args[0], &args[1]) {
        Ok(floors) => floors,
        Err(message) => {
            println!("{}", message);
            process::exit(1);
        }
    };

    let port = DispatcherConfig::get().port;
    let mut stream = match sock::connect_local(port) {
        Ok(stream) => stream,
        Err(_) => {
            println!("Unable to connect to elevator system.");
            process::exit(1);
        }
    };

    let request = CallRequest {
        source,
        destination,
    };
    let reply = frame::send_message(&mut stream, &request.to_string())
        .and_then(|_| frame::receive_message(&mut stream));
    match reply.map(|line| CallReply::parse(&line)) {
        Ok(Ok(CallReply::Car(name))) => println!("Car {} is arriving.", name),
        Ok(Ok(CallReply::Unavailable)) => {
            println!("Sorry, no car is available to take this request.")
        }
        _ => {
            println!("Unable to connect to elevator system.");
            process::exit(1);
        }
    }
}

/// A call never leaves the pad unless it is between two distinct, valid
/// floors.
fn validate_call(source: &str, destination: &str) -> Result<(Floor, Floor), &'static str> {
    if source == destination {
        return Err("You are already on that floor!");
    }
    match (source.parse::<Floor>(), destination.parse::<Floor>()) {
        (Ok(source), Ok(destination)) => Ok((source, destination)),
        _ => Err("Invalid floor(s) specified."),
    }
}
