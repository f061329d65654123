pub mod frame;
pub mod sock;
