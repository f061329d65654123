/// ----- CONTEXT MODULE -----
/// State shared by the controller's two threads: the mapped car region,
/// the dispatcher link, and the process-local flags.
///
/// Lock order: the car-region mutex is always taken before the link
/// mutex, and the link mutex is never held across a region wait.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use netframe::{frame, sock};
use shared_resources::car_memory::CarMemory;
use shared_resources::config::CarConfig;
use shared_resources::message::CarMessage;

pub struct CarContext {
    pub memory: CarMemory,
    pub config: CarConfig,
    link: Mutex<Option<TcpStream>>,
    destination_changed: AtomicBool,
    shutdown: AtomicBool,
}

impl CarContext {
    pub fn new(memory: CarMemory, config: CarConfig) -> Self {
        CarContext {
            memory,
            config,
            link: Mutex::new(None),
            destination_changed: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Raise the shutdown flag and wake every region waiter.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.memory.notify_all();
    }

    pub fn flag_destination_changed(&self) {
        self.destination_changed.store(true, Ordering::SeqCst);
    }

    pub fn take_destination_changed(&self) -> bool {
        self.destination_changed.swap(false, Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.link.lock().unwrap().is_some()
    }

    /// Open the dispatcher link and register. Returns a reader clone for
    /// the link thread; the write half stays behind the link mutex. The
    /// read timeout doubles as the link thread's poll interval.
    pub fn connect(&self) -> io::Result<TcpStream> {
        let mut stream = sock::connect_local(self.config.dispatcher_port)?;
        stream.set_read_timeout(Some(self.config.delay))?;
        let registration = CarMessage::Register {
            name: self.config.name.clone(),
            lowest: self.config.lowest,
            highest: self.config.highest,
        };
        frame::send_message(&mut stream, &registration.to_string())?;
        let reader = stream.try_clone()?;
        *self.link.lock().unwrap() = Some(stream);
        Ok(reader)
    }

    pub fn disconnect(&self) {
        *self.link.lock().unwrap() = None;
    }

    /// Send one line when connected. A failed send drops the link; the
    /// link thread reconnects on a later tick.
    pub fn send_line(&self, line: &str) {
        let mut link = self.link.lock().unwrap();
        if let Some(stream) = link.as_mut() {
            if let Err(e) = frame::send_message(stream, line) {
                log::warn!("dispatcher link lost while sending: {}", e);
                *link = None;
            }
        }
    }

    /// Send a final line (INDIVIDUAL SERVICE / EMERGENCY) and drop the
    /// link deliberately.
    pub fn send_and_disconnect(&self, line: &str) {
        let mut link = self.link.lock().unwrap();
        if let Some(stream) = link.as_mut() {
            if let Err(e) = frame::send_message(stream, line) {
                log::warn!("dispatcher link lost while sending: {}", e);
            }
        }
        *link = None;
    }

    /// Snapshot the region and report STATUS to the dispatcher. Must not
    /// be called while holding a region guard.
    pub fn publish_status(&self) {
        let message = {
            let state = match self.memory.lock() {
                Ok(state) => state,
                Err(_) => return,
            };
            match (
                state.status(),
                state.current_floor(),
                state.destination_floor(),
            ) {
                (Ok(door), Ok(current), Ok(destination)) => CarMessage::Status {
                    door,
                    current,
                    destination,
                },
                // A corrupted region is the safety monitor's business, not
                // the dispatcher's.
                _ => return,
            }
        };
        self.send_line(&message.to_string());
    }
}
