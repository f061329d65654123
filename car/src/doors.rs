/// ----- DOORS MODULE -----
/// The door cycle, driven on an absolute-time schedule rooted at the
/// moment the doors start opening: Opening at t0, Open at t0+T, Closing
/// at t0+2T (or as soon as the close button is pressed), Closed one tick
/// after Closing began. Every transition only fires if the doors are
/// still in the phase it expects, since the safety monitor and the manual
/// controls can intervene at any moment.

use std::thread;
use std::time::{Duration, Instant};

use shared_resources::door::DoorState;

use crate::context::CarContext;

/// How often the hold phase looks for an early close-button press.
const BUTTON_POLL: Duration = Duration::from_millis(1);

enum Hold {
    ClosePressed,
    StillOpen,
    Interrupted,
}

/// Run the door cycle from wherever the doors currently are: `Closed`
/// starts a fresh cycle, `Opening`/`Open` re-join one that something else
/// (an obstruction reopen, say) has put in motion.
pub fn open_door_sequence(ctx: &CarContext) {
    let tick = ctx.config.delay;
    let start = Instant::now();

    let rejoined_open = {
        let mut state = match ctx.memory.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        match state.status() {
            Ok(DoorState::Closed) => {
                state.set_status(DoorState::Opening);
                state.broadcast();
                false
            }
            Ok(DoorState::Opening) => false,
            Ok(DoorState::Open) => true,
            _ => return,
        }
    };

    let hold_deadline = if rejoined_open {
        Instant::now() + tick
    } else {
        ctx.publish_status();
        sleep_until(start + tick);
        {
            let mut state = match ctx.memory.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            if state.status() != Ok(DoorState::Opening) {
                return;
            }
            state.set_status(DoorState::Open);
            state.broadcast();
        }
        ctx.publish_status();
        start + 2 * tick
    };

    loop {
        if ctx.shutdown_requested() {
            return;
        }
        match check_hold(ctx) {
            Hold::ClosePressed => {
                ctx.publish_status();
                break;
            }
            Hold::Interrupted => return,
            Hold::StillOpen => {
                if Instant::now() >= hold_deadline {
                    if latch_closing(ctx) {
                        ctx.publish_status();
                    }
                    break;
                }
                thread::sleep(BUTTON_POLL);
            }
        }
    }

    finish_closing(ctx);
}

/// Complete a close already underway: one tick, then `Closed` unless
/// something (an obstruction reopen) intervened.
pub fn finish_closing(ctx: &CarContext) {
    thread::sleep(ctx.config.delay);
    {
        let mut state = match ctx.memory.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        if state.status() != Ok(DoorState::Closing) {
            return;
        }
        state.set_status(DoorState::Closed);
        state.broadcast();
    }
    ctx.publish_status();
}

fn check_hold(ctx: &CarContext) -> Hold {
    let mut state = match ctx.memory.lock() {
        Ok(state) => state,
        Err(_) => return Hold::Interrupted,
    };
    if state.status() != Ok(DoorState::Open) {
        return Hold::Interrupted;
    }
    if state.close_button() == 1 {
        state.set_close_button(0);
        state.set_status(DoorState::Closing);
        state.broadcast();
        return Hold::ClosePressed;
    }
    Hold::StillOpen
}

fn latch_closing(ctx: &CarContext) -> bool {
    let mut state = match ctx.memory.lock() {
        Ok(state) => state,
        Err(_) => return false,
    };
    if state.status() != Ok(DoorState::Open) {
        return false;
    }
    state.set_status(DoorState::Closing);
    state.broadcast();
    true
}

fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use shared_resources::car_memory::CarMemory;
    use shared_resources::config::CarConfig;

    const TICK_MS: u64 = 50;

    fn test_context(tag: &str) -> Arc<CarContext> {
        let name = format!("doors-test-{}-{}", tag, std::process::id());
        let memory = CarMemory::create(&name).unwrap();
        let config = CarConfig {
            name,
            lowest: "1".parse().unwrap(),
            highest: "9".parse().unwrap(),
            delay: Duration::from_millis(TICK_MS),
            dispatcher_port: 0,
        };
        Arc::new(CarContext::new(memory, config))
    }

    fn watch_states(ctx: &Arc<CarContext>) -> std::thread::JoinHandle<Vec<DoorState>> {
        let ctx = ctx.clone();
        thread::spawn(move || {
            let mut seen = Vec::new();
            let deadline = Instant::now() + Duration::from_millis(6 * TICK_MS);
            while Instant::now() < deadline {
                if let Ok(state) = ctx.memory.lock() {
                    if let Ok(door) = state.status() {
                        if seen.last() != Some(&door) {
                            seen.push(door);
                        }
                    }
                }
                thread::sleep(Duration::from_millis(5));
            }
            seen
        })
    }

    fn contains_in_order(seen: &[DoorState], expected: &[DoorState]) -> bool {
        let mut next = 0;
        for state in seen {
            if next < expected.len() && *state == expected[next] {
                next += 1;
            }
        }
        next == expected.len()
    }

    #[test]
    fn full_cycle_runs_on_schedule() {
        let ctx = test_context("cycle");
        let watcher = watch_states(&ctx);
        thread::sleep(Duration::from_millis(10));
        let started = Instant::now();
        open_door_sequence(&ctx);
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(3 * TICK_MS));
        assert!(elapsed < Duration::from_millis(5 * TICK_MS));
        let seen = watcher.join().unwrap();
        assert!(
            contains_in_order(
                &seen,
                &[
                    DoorState::Opening,
                    DoorState::Open,
                    DoorState::Closing,
                    DoorState::Closed,
                ],
            ),
            "unexpected phase order: {:?}",
            seen
        );
        ctx.memory.unlink();
    }

    #[test]
    fn close_button_cuts_the_hold_short() {
        let ctx = test_context("button");
        {
            let presser = ctx.clone();
            thread::spawn(move || {
                // Press partway through the Open hold.
                thread::sleep(Duration::from_millis(TICK_MS + TICK_MS / 4));
                if let Ok(mut state) = presser.memory.lock() {
                    state.set_close_button(1);
                    state.broadcast();
                }
            });
        }
        let started = Instant::now();
        open_door_sequence(&ctx);
        let elapsed = started.elapsed();

        // Closing began at the press, not at the 2T deadline.
        assert!(elapsed >= Duration::from_millis(2 * TICK_MS + TICK_MS / 4));
        assert!(elapsed < Duration::from_millis(3 * TICK_MS));
        let state = ctx.memory.lock().unwrap();
        assert_eq!(state.status().unwrap(), DoorState::Closed);
        assert_eq!(state.close_button(), 0);
        drop(state);
        ctx.memory.unlink();
    }

    #[test]
    fn reopened_doors_never_latch_closed() {
        let ctx = test_context("reopen");
        {
            let mut state = ctx.memory.lock().unwrap();
            state.set_status(DoorState::Closing);
        }
        {
            // The safety monitor reopening on an obstruction, mid-close.
            let safety = ctx.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                if let Ok(mut state) = safety.memory.lock() {
                    state.set_status(DoorState::Opening);
                    state.broadcast();
                }
            });
        }
        finish_closing(&ctx);
        let state = ctx.memory.lock().unwrap();
        assert_eq!(state.status().unwrap(), DoorState::Opening);
        drop(state);
        ctx.memory.unlink();
    }
}
