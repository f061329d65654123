/// ----- CAR MEMORY MODULE -----
/// The POSIX shared-memory region one car shares with its safety monitor
/// and the manual-control tool. The embedded mutex and condition variable
/// sit first in the layout and are initialised with process-shared
/// attributes by whichever process creates the region. Every field access
/// holds the mutex; every observable write is followed by a broadcast so
/// waiters in the other processes wake promptly.

use std::ffi::CString;
use std::fmt;
use std::io;
use std::mem;
use std::ptr;
use std::time::Duration;

use crate::door::{DoorState, InvalidStatus};
use crate::floor::{Floor, InvalidFloor};

const LABEL_LEN: usize = 8;

#[repr(C)]
struct SharedState {
    mutex: libc::pthread_mutex_t,
    cond: libc::pthread_cond_t,
    current_floor: [u8; LABEL_LEN],
    destination_floor: [u8; LABEL_LEN],
    status: [u8; LABEL_LEN],
    open_button: u8,
    close_button: u8,
    door_obstruction: u8,
    overload: u8,
    emergency_stop: u8,
    individual_service_mode: u8,
    emergency_mode: u8,
    safety_system: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum ShmError {
    #[error("unable to open shared memory region {name}: {source}")]
    Open { name: String, source: io::Error },
    #[error("unable to size shared memory region: {0}")]
    Resize(io::Error),
    #[error("unable to map shared memory region: {0}")]
    Map(io::Error),
    #[error("invalid car name")]
    BadName,
    #[error("mutex operation failed (errno {0})")]
    Mutex(i32),
    #[error("condition variable operation failed (errno {0})")]
    Cond(i32),
}

fn shm_name_for(car_name: &str) -> Result<CString, ShmError> {
    if car_name.is_empty()
        || car_name.len() > crate::message::MAX_CAR_NAME
        || car_name.contains('/')
    {
        return Err(ShmError::BadName);
    }
    CString::new(format!("/car{}", car_name)).map_err(|_| ShmError::BadName)
}

/// Handle on one car's mapped region. Clonable across threads via `Arc`;
/// the mapping lives until the handle is dropped, the name until `unlink`.
pub struct CarMemory {
    state: *mut SharedState,
    shm_name: CString,
}

unsafe impl Send for CarMemory {}
unsafe impl Sync for CarMemory {}

impl CarMemory {
    /// Create the region for `car_name`, or attach when another process got
    /// there first. Only the creator initialises the process-shared
    /// primitives; either way the payload is reset to power-on defaults
    /// (doors closed, both floors at "1").
    pub fn create(car_name: &str) -> Result<CarMemory, ShmError> {
        let memory = CarMemory::map(car_name, true)?;
        memory.reset()?;
        Ok(memory)
    }

    /// Attach to an existing region. Fails when the controller has not
    /// created it yet; never touches the contents.
    pub fn open(car_name: &str) -> Result<CarMemory, ShmError> {
        CarMemory::map(car_name, false)
    }

    fn map(car_name: &str, allow_create: bool) -> Result<CarMemory, ShmError> {
        let shm_name = shm_name_for(car_name)?;
        let mut created = false;
        let mut fd = -1;
        if allow_create {
            fd = unsafe {
                libc::shm_open(
                    shm_name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                    0o666,
                )
            };
            created = fd != -1;
        }
        if fd == -1 {
            fd = unsafe { libc::shm_open(shm_name.as_ptr(), libc::O_RDWR, 0o666) };
        }
        if fd == -1 {
            return Err(ShmError::Open {
                name: shm_name.to_string_lossy().into_owned(),
                source: io::Error::last_os_error(),
            });
        }
        if created {
            if unsafe { libc::ftruncate(fd, mem::size_of::<SharedState>() as libc::off_t) } == -1 {
                let source = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(ShmError::Resize(source));
            }
        }
        let mapping = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mem::size_of::<SharedState>(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if mapping == libc::MAP_FAILED {
            return Err(ShmError::Map(io::Error::last_os_error()));
        }
        let memory = CarMemory {
            state: mapping as *mut SharedState,
            shm_name,
        };
        if created {
            memory.init_primitives()?;
        }
        Ok(memory)
    }

    fn init_primitives(&self) -> Result<(), ShmError> {
        unsafe {
            let mut mutex_attr: libc::pthread_mutexattr_t = mem::zeroed();
            libc::pthread_mutexattr_init(&mut mutex_attr);
            libc::pthread_mutexattr_setpshared(&mut mutex_attr, libc::PTHREAD_PROCESS_SHARED);
            let rc = libc::pthread_mutex_init(
                ptr::addr_of_mut!((*self.state).mutex),
                &mutex_attr,
            );
            libc::pthread_mutexattr_destroy(&mut mutex_attr);
            if rc != 0 {
                return Err(ShmError::Mutex(rc));
            }

            let mut cond_attr: libc::pthread_condattr_t = mem::zeroed();
            libc::pthread_condattr_init(&mut cond_attr);
            libc::pthread_condattr_setpshared(&mut cond_attr, libc::PTHREAD_PROCESS_SHARED);
            let rc = libc::pthread_cond_init(ptr::addr_of_mut!((*self.state).cond), &cond_attr);
            libc::pthread_condattr_destroy(&mut cond_attr);
            if rc != 0 {
                return Err(ShmError::Cond(rc));
            }
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), ShmError> {
        let mut state = self.lock()?;
        state.set_current_floor(Floor::FIRST);
        state.set_destination_floor(Floor::FIRST);
        state.set_status(DoorState::Closed);
        state.set_open_button(0);
        state.set_close_button(0);
        state.set_door_obstruction(0);
        state.set_overload(0);
        state.set_emergency_stop(0);
        state.set_individual_service_mode(0);
        state.set_emergency_mode(0);
        state.set_safety_system(0);
        state.broadcast();
        Ok(())
    }

    pub fn lock(&self) -> Result<StateGuard<'_>, ShmError> {
        let rc = unsafe { libc::pthread_mutex_lock(ptr::addr_of_mut!((*self.state).mutex)) };
        if rc != 0 {
            return Err(ShmError::Mutex(rc));
        }
        Ok(StateGuard { memory: self })
    }

    /// Wake all waiters without taking the lock. Used from the signal
    /// thread, where blocking on a possibly held mutex is not acceptable.
    pub fn notify_all(&self) {
        unsafe {
            libc::pthread_cond_broadcast(ptr::addr_of_mut!((*self.state).cond));
        }
    }

    /// Latch emergency mode without the lock. Last-resort path for when the
    /// mutex itself is failing.
    pub fn force_emergency(&self) {
        unsafe {
            ptr::write_volatile(ptr::addr_of_mut!((*self.state).emergency_mode), 1);
        }
        self.notify_all();
    }

    /// Remove the region name from the host namespace. Existing mappings
    /// stay valid until unmapped.
    pub fn unlink(&self) {
        unsafe {
            libc::shm_unlink(self.shm_name.as_ptr());
        }
    }
}

impl Drop for CarMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.state as *mut libc::c_void, mem::size_of::<SharedState>());
        }
    }
}

/// A plain copy of the region payload, for validation sweeps and tests.
/// Labels are kept raw so corrupted contents can be inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarFields {
    pub current_floor: String,
    pub destination_floor: String,
    pub status: String,
    pub open_button: u8,
    pub close_button: u8,
    pub door_obstruction: u8,
    pub overload: u8,
    pub emergency_stop: u8,
    pub individual_service_mode: u8,
    pub emergency_mode: u8,
    pub safety_system: u8,
}

/// Holds the region mutex for its lifetime; unlocks on drop.
pub struct StateGuard<'a> {
    memory: &'a CarMemory,
}

fn read_label(bytes: &[u8; LABEL_LEN]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(LABEL_LEN);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn write_label(bytes: &mut [u8; LABEL_LEN], value: impl fmt::Display) {
    let text = value.to_string();
    let raw = text.as_bytes();
    let len = raw.len().min(LABEL_LEN - 1);
    bytes[..len].copy_from_slice(&raw[..len]);
    for slot in bytes[len..].iter_mut() {
        *slot = 0;
    }
}

macro_rules! byte_field {
    ($getter:ident, $setter:ident) => {
        pub fn $getter(&self) -> u8 {
            self.state().$getter
        }

        pub fn $setter(&mut self, value: u8) {
            self.state_mut().$getter = value;
        }
    };
}

impl StateGuard<'_> {
    fn state(&self) -> &SharedState {
        unsafe { &*self.memory.state }
    }

    fn state_mut(&mut self) -> &mut SharedState {
        unsafe { &mut *self.memory.state }
    }

    pub fn current_floor_label(&self) -> String {
        read_label(&self.state().current_floor)
    }

    pub fn current_floor(&self) -> Result<Floor, InvalidFloor> {
        self.current_floor_label().parse()
    }

    pub fn set_current_floor(&mut self, floor: Floor) {
        write_label(&mut self.state_mut().current_floor, floor);
    }

    pub fn destination_floor_label(&self) -> String {
        read_label(&self.state().destination_floor)
    }

    pub fn destination_floor(&self) -> Result<Floor, InvalidFloor> {
        self.destination_floor_label().parse()
    }

    pub fn set_destination_floor(&mut self, floor: Floor) {
        write_label(&mut self.state_mut().destination_floor, floor);
    }

    pub fn status_label(&self) -> String {
        read_label(&self.state().status)
    }

    pub fn status(&self) -> Result<DoorState, InvalidStatus> {
        self.status_label().parse()
    }

    pub fn set_status(&mut self, door: DoorState) {
        write_label(&mut self.state_mut().status, door);
    }

    byte_field!(open_button, set_open_button);
    byte_field!(close_button, set_close_button);
    byte_field!(door_obstruction, set_door_obstruction);
    byte_field!(overload, set_overload);
    byte_field!(emergency_stop, set_emergency_stop);
    byte_field!(individual_service_mode, set_individual_service_mode);
    byte_field!(emergency_mode, set_emergency_mode);
    byte_field!(safety_system, set_safety_system);

    pub fn snapshot(&self) -> CarFields {
        let state = self.state();
        CarFields {
            current_floor: read_label(&state.current_floor),
            destination_floor: read_label(&state.destination_floor),
            status: read_label(&state.status),
            open_button: state.open_button,
            close_button: state.close_button,
            door_obstruction: state.door_obstruction,
            overload: state.overload,
            emergency_stop: state.emergency_stop,
            individual_service_mode: state.individual_service_mode,
            emergency_mode: state.emergency_mode,
            safety_system: state.safety_system,
        }
    }

    pub fn broadcast(&self) {
        self.memory.notify_all();
    }

    /// Block until the next broadcast.
    pub fn wait(&mut self) -> Result<(), ShmError> {
        let rc = unsafe {
            libc::pthread_cond_wait(
                ptr::addr_of_mut!((*self.memory.state).cond),
                ptr::addr_of_mut!((*self.memory.state).mutex),
            )
        };
        if rc != 0 {
            return Err(ShmError::Cond(rc));
        }
        Ok(())
    }

    /// Block until the next broadcast or until `timeout` elapses; a timeout
    /// is not an error, the caller rechecks its predicate either way.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<(), ShmError> {
        let mut now = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_REALTIME, &mut now);
        }
        let total_nanos = now.tv_nsec as i64 + timeout.subsec_nanos() as i64;
        let deadline = libc::timespec {
            tv_sec: now.tv_sec
                + timeout.as_secs() as libc::time_t
                + (total_nanos / 1_000_000_000) as libc::time_t,
            tv_nsec: (total_nanos % 1_000_000_000) as libc::c_long,
        };
        let rc = unsafe {
            libc::pthread_cond_timedwait(
                ptr::addr_of_mut!((*self.memory.state).cond),
                ptr::addr_of_mut!((*self.memory.state).mutex),
                &deadline,
            )
        };
        match rc {
            0 | libc::ETIMEDOUT => Ok(()),
            rc => Err(ShmError::Cond(rc)),
        }
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*self.memory.state).mutex));
        }
    }
}
