/// ----- DEBUG MODULE -----
/// Live status table for the dispatcher terminal: one row per car slot
/// with its reported floor, door status and stop queue. Redrawn in place
/// whenever the server publishes a fresh snapshot.

use std::io::{stdout, Stdout, Write};

use crossbeam_channel::Receiver;
use crossterm::{cursor, terminal, ExecutableCommand, Result};

use shared_resources::config::MAX_CARS;

use crate::registry::CarSnapshot;

const STATUS_SIZE: u16 = 2 * MAX_CARS as u16 + 3;

pub fn main(status_rx: Receiver<Vec<CarSnapshot>>) {
    let mut debug = Debug::new();
    // Reserve the table area so the first redraw has lines to move over.
    for _ in 0..STATUS_SIZE {
        println!();
    }
    while let Ok(snapshot) = status_rx.recv() {
        debug.printstatus(&snapshot).ok();
    }
}

pub struct Debug {
    stdout: Stdout,
}

impl Debug {
    pub fn new() -> Self {
        Debug { stdout: stdout() }
    }

    pub fn printstatus(&mut self, cars: &[CarSnapshot]) -> Result<()> {
        self.stdout.execute(cursor::MoveUp(STATUS_SIZE))?;
        self.stdout.execute(terminal::Clear(terminal::ClearType::FromCursorDown))?;

        writeln!(self.stdout, "+--------------+--------+----------+----------------------------+")?;
        writeln!(self.stdout, "| {0:<12} | {1:<6} | {2:<8} | {3:<26} |", "CAR", "FLOOR", "STATUS", "QUEUE")?;
        for i in 0..MAX_CARS {
            writeln!(self.stdout, "+--------------+--------+----------+----------------------------+")?;
            match cars.get(i) {
                Some(car) => writeln!(
                    self.stdout,
                    "| {0:<12} | {1:<6} | {2:<8} | {3:<26} |",
                    car.name, car.floor, car.status, car.queue
                )?,
                None => writeln!(
                    self.stdout,
                    "| {0:<12} | {1:<6} | {2:<8} | {3:<26} |",
                    "", "", "", ""
                )?,
            }
        }
        writeln!(self.stdout, "+--------------+--------+----------+----------------------------+")?;

        Ok(())
    }
}

impl Default for Debug {
    fn default() -> Self {
        Debug::new()
    }
}
