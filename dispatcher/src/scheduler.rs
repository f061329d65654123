/// ----- SCHEDULER MODULE -----
/// Assigns an incoming call to the car that can pick it up soonest,
/// inserting the pickup and drop-off into that car's stop queue without
/// breaking the direction of any leg already committed.

use shared_resources::floor::Floor;
use shared_resources::door::DoorState;

use crate::registry::{CarRegistry, RegisteredCar, StopQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Idle,
}

pub fn direction_of(from: i32, to: i32) -> Direction {
    if to > from {
        Direction::Up
    } else if to < from {
        Direction::Down
    } else {
        Direction::Idle
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Assigned {
        name: String,
        /// The new queue head, when the insertion changed it and a
        /// `FLOOR` order was pushed to the car.
        ordered_floor: Option<Floor>,
    },
    Unavailable,
}

/// Where the car effectively is for planning: while closing up or mid-leg
/// it is committed to its next stop.
fn effective_floor(car: &RegisteredCar) -> i32 {
    match (car.queue.head(), car.status) {
        (Some(head), Some(DoorState::Closing)) | (Some(head), Some(DoorState::Between)) => {
            head.as_int()
        }
        _ => car.current.as_int(),
    }
}

/// The index at which the pickup floor should enter the queue. Three
/// strategies, in order of preference: ride a leg that already passes the
/// pickup in the right direction, extend the car's current run past its
/// last stop, or append at the end. Only an idle request (equal floors)
/// has no plan.
pub fn plan_pickup(effective: i32, queue: &[Floor], source: i32, destination: i32) -> Option<usize> {
    let request_dir = direction_of(source, destination);
    if request_dir == Direction::Idle {
        return None;
    }
    if let Some(index) = ride_existing_leg(effective, queue, source, destination, request_dir) {
        return Some(index);
    }
    if let Some(index) = extend_current_run(effective, queue, source, request_dir) {
        return Some(index);
    }
    Some(queue.len())
}

fn ride_existing_leg(
    effective: i32,
    queue: &[Floor],
    source: i32,
    destination: i32,
    request_dir: Direction,
) -> Option<usize> {
    let len = queue.len();
    let mut current = effective;
    for i in 0..=len {
        let next = if i < len { queue[i].as_int() } else { current };
        let pickup_here = match request_dir {
            Direction::Up => next > current && source >= current && source < next,
            Direction::Down => next < current && source <= current && source > next,
            Direction::Idle => false,
        };
        if pickup_here && dropoff_before_reversal(queue, i, source, destination, request_dir) {
            return Some(i);
        }
        current = next;
    }
    None
}

/// From pickup segment `start`, check the drop-off can happen before the
/// remaining queue reverses out of the request direction.
fn dropoff_before_reversal(
    queue: &[Floor],
    start: usize,
    source: i32,
    destination: i32,
    request_dir: Direction,
) -> bool {
    let len = queue.len();
    for j in start..=len {
        let check_next = if j < len { queue[j].as_int() } else { destination };
        let reverses = match request_dir {
            Direction::Up => check_next < source,
            Direction::Down => check_next > source,
            Direction::Idle => false,
        };
        if reverses {
            return false;
        }
        let can_drop = j == len
            || match request_dir {
                Direction::Up => destination <= check_next,
                Direction::Down => destination >= check_next,
                Direction::Idle => false,
            };
        if can_drop {
            return true;
        }
    }
    false
}

/// The queue's initial run is the maximal monotonic prefix starting at the
/// effective floor. A request going the same way, from at or past the
/// run's last stop, slots in right after it instead of waiting for the
/// whole plan to finish.
fn extend_current_run(
    effective: i32,
    queue: &[Floor],
    source: i32,
    request_dir: Direction,
) -> Option<usize> {
    if queue.is_empty() {
        return None;
    }
    let run_dir = direction_of(effective, queue[0].as_int());
    if run_dir != request_dir {
        return None;
    }
    let mut run_end = 0;
    while run_end + 1 < queue.len()
        && direction_of(queue[run_end].as_int(), queue[run_end + 1].as_int()) == run_dir
    {
        run_end += 1;
    }
    let last = queue[run_end].as_int();
    let extends = match request_dir {
        Direction::Up => source >= last,
        Direction::Down => source <= last,
        Direction::Idle => false,
    };
    if extends {
        Some(run_end + 1)
    } else {
        None
    }
}

/// Insert the pickup at its planned index and the drop-off at the
/// earliest direction-preserving position after it. The drop-off is
/// skipped entirely when it is already queued. Returns `None` when the
/// queue cannot take the new stops.
pub fn commit_into(
    queue: &mut StopQueue,
    pickup_index: usize,
    source: Floor,
    destination: Floor,
) -> Option<()> {
    let source_position = queue.insert_deduped(pickup_index, source)?;
    if queue.contains(destination) {
        return Some(());
    }
    let request_dir = direction_of(source.as_int(), destination.as_int());
    let mut dropoff_index = queue.len();
    for i in (source_position + 1)..queue.len() {
        let stop = queue.as_slice()[i].as_int();
        // The drop-off goes in front of the first stop it would pass, and
        // never later than where the queue reverses out of the request
        // direction.
        let passes = match request_dir {
            Direction::Up => destination.as_int() < stop || stop < source.as_int(),
            Direction::Down => destination.as_int() > stop || stop > source.as_int(),
            Direction::Idle => false,
        };
        if passes {
            dropoff_index = i;
            break;
        }
    }
    queue.insert_deduped(dropoff_index, destination)?;
    Some(())
}

/// Pick the best car for a call and commit the insertion, replying with
/// the chosen car and pushing a new `FLOOR` order when the queue head
/// changed. Cost is the pickup index (earlier service wins); ties fall to
/// the shorter final queue.
pub fn schedule(registry: &mut CarRegistry, source: Floor, destination: Floor) -> ScheduleOutcome {
    let mut best: Option<(usize, usize, usize)> = None; // (cost, final_len, car index)
    for (index, car) in registry.iter_active() {
        if !car.covers(source) || !car.covers(destination) {
            continue;
        }
        let pickup = match plan_pickup(
            effective_floor(car),
            car.queue.as_slice(),
            source.as_int(),
            destination.as_int(),
        ) {
            Some(pickup) => pickup,
            None => continue,
        };
        let mut simulated = car.queue.clone();
        if commit_into(&mut simulated, pickup, source, destination).is_none() {
            continue;
        }
        let candidate = (pickup, simulated.len(), index);
        let better = match best {
            None => true,
            Some((cost, final_len, _)) => {
                candidate.0 < cost || (candidate.0 == cost && candidate.1 < final_len)
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    let (pickup, _, index) = match best {
        Some(best) => best,
        None => return ScheduleOutcome::Unavailable,
    };
    let car = match registry.get_mut(index) {
        Some(car) => car,
        None => return ScheduleOutcome::Unavailable,
    };
    let old_head = car.queue.head();
    if commit_into(&mut car.queue, pickup, source, destination).is_none() {
        return ScheduleOutcome::Unavailable;
    }
    let new_head = car.queue.head();
    let ordered_floor = if new_head != old_head { new_head } else { None };
    if ordered_floor.is_some() {
        car.send_next_destination();
    }
    ScheduleOutcome::Assigned {
        name: car.name.clone(),
        ordered_floor,
    }
}
