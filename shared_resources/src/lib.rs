pub mod car_memory;
pub mod config;
pub mod door;
pub mod floor;
pub mod message;
