/// ----- SERVER MODULE -----
/// Connection acceptance and the per-connection workers. Cars hold their
/// connection for as long as they are in service; call pads get exactly
/// one request/reply exchange. The first frame decides which kind of
/// session a connection becomes.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use netframe::frame;
use shared_resources::config::MAX_CLIENTS;
use shared_resources::message::{CallReply, CallRequest, CarMessage};

use crate::registry::{CarRegistry, CarSnapshot};
use crate::scheduler::{self, ScheduleOutcome};

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Bounded pool of connection slots; a connection that cannot claim one
/// is rejected outright.
struct ClientSlots {
    in_use: Mutex<[bool; MAX_CLIENTS]>,
}

impl ClientSlots {
    fn new() -> Self {
        ClientSlots {
            in_use: Mutex::new([false; MAX_CLIENTS]),
        }
    }

    fn acquire(&self) -> Option<usize> {
        let mut slots = self.in_use.lock().unwrap();
        let free = slots.iter().position(|used| !used)?;
        slots[free] = true;
        Some(free)
    }

    fn release(&self, index: usize) {
        self.in_use.lock().unwrap()[index] = false;
    }
}

/// Accept loop. Runs until the shutdown flag is raised, then closes the
/// listener by returning; live car sessions notice EOF on their sockets
/// and wind down on their own.
pub fn main(
    listener: TcpListener,
    registry: Arc<Mutex<CarRegistry>>,
    shutdown: Arc<AtomicBool>,
    status_tx: Sender<Vec<CarSnapshot>>,
) -> io::Result<()> {
    listener.set_nonblocking(true)?;
    let slots = Arc::new(ClientSlots::new());

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(false).ok();
                match slots.acquire() {
                    Some(slot) => {
                        let registry = registry.clone();
                        let slots = slots.clone();
                        let status_tx = status_tx.clone();
                        thread::spawn(move || {
                            handle_client(stream, &registry, &status_tx);
                            slots.release(slot);
                        });
                    }
                    None => {
                        println!("Connection limit reached, rejecting new connection.");
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => return Err(e),
        }
    }
    println!("Shutdown signal received, closing the listener.");
    Ok(())
}

fn handle_client(
    mut stream: TcpStream,
    registry: &Arc<Mutex<CarRegistry>>,
    status_tx: &Sender<Vec<CarSnapshot>>,
) {
    let first = match frame::receive_message(&mut stream) {
        Ok(first) => first,
        Err(_) => return,
    };
    if first.starts_with("CAR ") {
        handle_car(stream, &first, registry, status_tx);
    } else if first.starts_with("CALL ") {
        handle_call(stream, &first, registry, status_tx);
    }
    // Anything else: drop the connection without a reply.
}

/// A car session: register, then consume STATUS reports until the car
/// leaves service or the stream ends.
fn handle_car(
    mut stream: TcpStream,
    registration: &str,
    registry: &Arc<Mutex<CarRegistry>>,
    status_tx: &Sender<Vec<CarSnapshot>>,
) {
    let (name, lowest, highest) = match CarMessage::parse(registration) {
        Ok(CarMessage::Register {
            name,
            lowest,
            highest,
        }) => (name, lowest, highest),
        _ => {
            println!("Failed to parse car registration.");
            return;
        }
    };
    let writer = stream.try_clone().ok();
    let index = {
        let mut cars = registry.lock().unwrap();
        match cars.register(name.clone(), lowest, highest, writer) {
            Some(index) => index,
            None => {
                println!("Car pool full. Rejecting car {}.", name);
                return;
            }
        }
    };
    println!("Car {} registered (floors {} to {}).", name, lowest, highest);
    publish_snapshot(registry, status_tx);

    loop {
        let line = match frame::receive_message(&mut stream) {
            Ok(line) => line,
            Err(_) => break,
        };
        match CarMessage::parse(&line) {
            Ok(CarMessage::Status { door, current, .. }) => {
                registry.lock().unwrap().apply_status(index, door, current);
                publish_snapshot(registry, status_tx);
            }
            Ok(CarMessage::IndividualService) => {
                println!("Car {} switched to individual service.", name);
                break;
            }
            Ok(CarMessage::Emergency) => {
                println!("Car {} reported an emergency.", name);
                break;
            }
            _ => {
                log::warn!("ignoring unexpected message from car {}: {}", name, line);
            }
        }
    }

    registry.lock().unwrap().remove(index);
    println!("Car {} disconnected.", name);
    publish_snapshot(registry, status_tx);
}

/// A call-pad session: one request, one reply, close.
fn handle_call(
    mut stream: TcpStream,
    request: &str,
    registry: &Arc<Mutex<CarRegistry>>,
    status_tx: &Sender<Vec<CarSnapshot>>,
) {
    let call = match CallRequest::parse(request) {
        Ok(call) => call,
        Err(_) => {
            println!("Failed to parse call request.");
            return;
        }
    };
    println!("Received call from floor {} to {}.", call.source, call.destination);

    let outcome = {
        let mut cars = registry.lock().unwrap();
        scheduler::schedule(&mut cars, call.source, call.destination)
    };
    let reply = match &outcome {
        ScheduleOutcome::Assigned { name, .. } => {
            println!(
                "Assigned call ({} -> {}) to car {}.",
                call.source, call.destination, name
            );
            CallReply::Car(name.clone())
        }
        ScheduleOutcome::Unavailable => {
            println!("Call ({} -> {}) is unavailable.", call.source, call.destination);
            CallReply::Unavailable
        }
    };
    if let Err(e) = frame::send_message(&mut stream, &reply.to_string()) {
        log::warn!("failed to answer call pad: {}", e);
    }
    publish_snapshot(registry, status_tx);
}

fn publish_snapshot(registry: &Arc<Mutex<CarRegistry>>, status_tx: &Sender<Vec<CarSnapshot>>) {
    let snapshot = registry.lock().unwrap().snapshot();
    let _ = status_tx.send(snapshot);
}
