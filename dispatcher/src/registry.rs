/// ----- REGISTRY MODULE -----
/// The dispatcher's fixed pool of connected cars: one slot per car with
/// its floor range, last reported position and door status, the stop
/// queue, and a write handle for pushing new destinations.

use std::net::TcpStream;

use netframe::frame;
use shared_resources::config::{MAX_CARS, MAX_QUEUE_DEPTH};
use shared_resources::door::DoorState;
use shared_resources::floor::Floor;
use shared_resources::message::FloorOrder;

/// The ordered list of floors a car is committed to visit. Never holds
/// two equal adjacent entries; capacity is fixed at compile time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopQueue {
    stops: Vec<Floor>,
}

impl StopQueue {
    pub fn new() -> Self {
        StopQueue {
            stops: Vec::with_capacity(MAX_QUEUE_DEPTH),
        }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn head(&self) -> Option<Floor> {
        self.stops.first().copied()
    }

    pub fn as_slice(&self) -> &[Floor] {
        &self.stops
    }

    pub fn contains(&self, floor: Floor) -> bool {
        self.stops.contains(&floor)
    }

    /// Insert `floor` at `index`, collapsing into an equal neighbour
    /// instead of creating an adjacent duplicate. Returns the index at
    /// which `floor` now resides, or `None` when the queue is full.
    pub fn insert_deduped(&mut self, index: usize, floor: Floor) -> Option<usize> {
        if index > self.stops.len() {
            return None;
        }
        if index > 0 && self.stops[index - 1] == floor {
            return Some(index - 1);
        }
        if index < self.stops.len() && self.stops[index] == floor {
            return Some(index);
        }
        if self.stops.len() >= MAX_QUEUE_DEPTH {
            return None;
        }
        self.stops.insert(index, floor);
        Some(index)
    }

    pub fn pop_head(&mut self) -> Option<Floor> {
        if self.stops.is_empty() {
            None
        } else {
            Some(self.stops.remove(0))
        }
    }
}

/// One registered car. `status` is `None` until the first STATUS report
/// arrives; `writer` is `None` only in tests.
#[derive(Debug)]
pub struct RegisteredCar {
    pub name: String,
    pub lowest: Floor,
    pub highest: Floor,
    pub current: Floor,
    pub status: Option<DoorState>,
    pub queue: StopQueue,
    pub writer: Option<TcpStream>,
}

impl RegisteredCar {
    pub fn covers(&self, floor: Floor) -> bool {
        self.lowest <= floor && floor <= self.highest
    }

    /// Push `FLOOR <head>` to the car, if it has a next stop. Write errors
    /// are logged and otherwise ignored; the car session notices the
    /// broken stream on its next read.
    pub fn send_next_destination(&mut self) {
        let head = match self.queue.head() {
            Some(head) => head,
            None => return,
        };
        if let Some(stream) = self.writer.as_mut() {
            if let Err(e) = frame::send_message(stream, &FloorOrder(head).to_string()) {
                log::warn!("failed to send FLOOR to car {}: {}", self.name, e);
            }
        }
    }
}

/// A row of the status display.
#[derive(Debug, Clone)]
pub struct CarSnapshot {
    pub name: String,
    pub floor: String,
    pub status: String,
    pub queue: String,
}

pub struct CarRegistry {
    cars: Vec<Option<RegisteredCar>>,
}

impl CarRegistry {
    pub fn new() -> Self {
        CarRegistry {
            cars: (0..MAX_CARS).map(|_| None).collect(),
        }
    }

    /// Claim a free slot for a newly registered car. The car starts at its
    /// lowest floor with an unknown door status, as nothing has been
    /// reported yet. Returns `None` when the pool is full.
    pub fn register(
        &mut self,
        name: String,
        lowest: Floor,
        highest: Floor,
        writer: Option<TcpStream>,
    ) -> Option<usize> {
        let slot = self.cars.iter().position(|car| car.is_none())?;
        self.cars[slot] = Some(RegisteredCar {
            name,
            lowest,
            highest,
            current: lowest,
            status: None,
            queue: StopQueue::new(),
            writer,
        });
        Some(slot)
    }

    pub fn remove(&mut self, index: usize) {
        if let Some(slot) = self.cars.get_mut(index) {
            *slot = None;
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut RegisteredCar> {
        self.cars.get_mut(index).and_then(|car| car.as_mut())
    }

    pub fn iter_active(&self) -> impl Iterator<Item = (usize, &RegisteredCar)> {
        self.cars
            .iter()
            .enumerate()
            .filter_map(|(index, car)| car.as_ref().map(|car| (index, car)))
    }

    /// Record a STATUS report. When the car has arrived at its next queued
    /// stop and is opening (or has opened) its doors, that stop is served:
    /// pop it and push the next one. Returns true when the head was popped.
    pub fn apply_status(&mut self, index: usize, door: DoorState, current: Floor) -> bool {
        let car = match self.get_mut(index) {
            Some(car) => car,
            None => return false,
        };
        car.current = current;
        car.status = Some(door);
        let arrived = car.queue.head() == Some(current)
            && matches!(door, DoorState::Open | DoorState::Opening);
        if arrived {
            car.queue.pop_head();
            car.send_next_destination();
        }
        arrived
    }

    pub fn snapshot(&self) -> Vec<CarSnapshot> {
        self.iter_active()
            .map(|(_, car)| CarSnapshot {
                name: car.name.clone(),
                floor: car.current.to_string(),
                status: car
                    .status
                    .map(|door| door.to_string())
                    .unwrap_or_else(|| "Unknown".to_string()),
                queue: car
                    .queue
                    .as_slice()
                    .iter()
                    .map(|floor| floor.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .collect()
    }
}

impl Default for CarRegistry {
    fn default() -> Self {
        CarRegistry::new()
    }
}
