/// ----- NETWORK MODULE -----
/// The dispatcher link thread. Holds back while the safety heartbeat is
/// stale or the car is in a special mode, connects and registers when the
/// car is serviceable, then polls the link one frame at a time. Only
/// `FLOOR` orders are expected back; anything else ends the connection.

use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use netframe::frame;
use shared_resources::message::FloorOrder;

use crate::context::CarContext;

/// Upper bound on one condition wait, so the shutdown flag is rechecked
/// even if a broadcast goes missing.
const WAKE_CHECK: Duration = Duration::from_millis(250);

pub fn main(ctx: Arc<CarContext>) {
    let mut reader: Option<TcpStream> = None;

    while !ctx.shutdown_requested() {
        let should_connect = match ctx.memory.lock() {
            Ok(mut state) => {
                while state.safety_system() != 1
                    && state.individual_service_mode() == 0
                    && state.emergency_mode() == 0
                    && !ctx.shutdown_requested()
                {
                    if state.wait_timeout(WAKE_CHECK).is_err() {
                        break;
                    }
                }
                state.safety_system() == 1
                    && state.individual_service_mode() == 0
                    && state.emergency_mode() == 0
            }
            Err(_) => {
                thread::sleep(ctx.config.delay);
                continue;
            }
        };
        if ctx.shutdown_requested() {
            break;
        }

        if !ctx.is_connected() {
            // The operations thread may have dropped the write half; let
            // go of the stale read half too.
            reader = None;
            if !should_connect {
                thread::sleep(ctx.config.delay);
                continue;
            }
            match ctx.connect() {
                Ok(stream) => {
                    reader = Some(stream);
                    ctx.publish_status();
                }
                Err(e) => {
                    log::debug!("dispatcher not reachable: {}", e);
                    thread::sleep(ctx.config.delay);
                    continue;
                }
            }
        }

        let stream = match reader.as_mut() {
            Some(stream) => stream,
            None => continue,
        };
        // Poll before reading: a timed-out read_exact could consume part
        // of a length prefix and desynchronise the framing.
        let mut probe = [0u8; 1];
        match stream.peek(&mut probe) {
            Ok(0) => {
                ctx.disconnect();
                reader = None;
                continue;
            }
            Ok(_) => {}
            Err(ref e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                // Nothing from the dispatcher this tick.
                continue;
            }
            Err(_) => {
                ctx.disconnect();
                reader = None;
                continue;
            }
        }
        match frame::receive_message(stream) {
            Ok(line) => match FloorOrder::parse(&line) {
                Ok(FloorOrder(floor)) => {
                    if ctx.config.lowest <= floor && floor <= ctx.config.highest {
                        if let Ok(mut state) = ctx.memory.lock() {
                            state.set_destination_floor(floor);
                            state.broadcast();
                        }
                        ctx.flag_destination_changed();
                    }
                    ctx.publish_status();
                }
                Err(_) => {
                    log::warn!("unexpected message from dispatcher: {}", line);
                    ctx.disconnect();
                    reader = None;
                }
            },
            Err(_) => {
                // EOF, or a peer that stalled mid-frame; either way the
                // link is no good any more.
                ctx.disconnect();
                reader = None;
            }
        }
    }
}
