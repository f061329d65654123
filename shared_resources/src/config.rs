/// ----- CONFIG MODULE -----
/// Compile-time capacities, the optional `config.json` port override and
/// the per-binary argument parsing.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::time::Duration;

use crate::floor::Floor;

pub const DEFAULT_PORT: u16 = 3000;
pub const MAX_CARS: usize = 10;
pub const MAX_CLIENTS: usize = MAX_CARS + 20;
pub const MAX_QUEUE_DEPTH: usize = 20;

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct ConfigFile {
    pub dispatcher: HashMap<String, u16>,
}

fn read_config_file() -> Option<ConfigFile> {
    let file_path = "config.json";
    let fallback_file_path = "../config.json";
    let contents = fs::read_to_string(file_path)
        .or_else(|_| fs::read_to_string(fallback_file_path))
        .ok()?;
    match serde_json::from_str(&contents) {
        Ok(file) => Some(file),
        Err(e) => {
            log::warn!("ignoring malformed config.json: {}", e);
            None
        }
    }
}

fn configured_port() -> u16 {
    read_config_file()
        .and_then(|file| file.dispatcher.get("port").copied())
        .unwrap_or(DEFAULT_PORT)
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub port: u16,
}

impl DispatcherConfig {
    pub fn get() -> Self {
        DispatcherConfig {
            port: configured_port(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CarConfig {
    pub name: String,
    pub lowest: Floor,
    pub highest: Floor,
    pub delay: Duration,
    pub dispatcher_port: u16,
}

impl CarConfig {
    /// Parse `<name> <lowest floor> <highest floor> <delay ms>`.
    pub fn parse(args: &[String]) -> Result<CarConfig, String> {
        if args.len() != 4 {
            return Err("usage: car <name> <lowest floor> <highest floor> <delay in ms>".to_string());
        }
        let name = args[0].clone();
        if name.is_empty() || name.len() > crate::message::MAX_CAR_NAME || name.contains('/') {
            return Err(format!("invalid car name {:?}", name));
        }
        let lowest: Floor = args[1]
            .parse()
            .map_err(|_| format!("invalid lowest floor {:?}", args[1]))?;
        let highest: Floor = args[2]
            .parse()
            .map_err(|_| format!("invalid highest floor {:?}", args[2]))?;
        if lowest > highest {
            return Err(format!(
                "lowest floor {} is above highest floor {}",
                lowest, highest
            ));
        }
        let delay_ms: u64 = args[3]
            .parse()
            .map_err(|_| format!("invalid delay {:?}", args[3]))?;
        if delay_ms == 0 {
            return Err("delay must be at least 1 ms".to_string());
        }
        Ok(CarConfig {
            name,
            lowest,
            highest,
            delay: Duration::from_millis(delay_ms),
            dispatcher_port: configured_port(),
        })
    }

    pub fn get() -> Result<CarConfig, String> {
        let args: Vec<String> = env::args().skip(1).collect();
        CarConfig::parse(&args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_a_full_argument_list() {
        let config = CarConfig::parse(&args(&["Alpha", "B2", "10", "100"])).unwrap();
        assert_eq!(config.name, "Alpha");
        assert_eq!(config.lowest.as_int(), -2);
        assert_eq!(config.highest.as_int(), 10);
        assert_eq!(config.delay, Duration::from_millis(100));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(CarConfig::parse(&args(&["Alpha", "1", "4"])).is_err());
        assert!(CarConfig::parse(&args(&["Alpha", "0", "4", "100"])).is_err());
        assert!(CarConfig::parse(&args(&["Alpha", "4", "1", "100"])).is_err());
        assert!(CarConfig::parse(&args(&["Alpha", "1", "4", "0"])).is_err());
        assert!(CarConfig::parse(&args(&["a/b", "1", "4", "100"])).is_err());
    }
}
