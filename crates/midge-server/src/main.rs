//! midge - a last-value MQTT broker for small sensor fleets.

mod clock;
mod config;
mod listener;
mod transport;

use std::sync::{Arc, Mutex};

use log::{error, info};

use midge_core::{PackedKey, Server, StringKey, TopicKey};

use crate::clock::SystemClock;
use crate::config::{Config, KeyRepr};

struct Args {
    config_path: String,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = "midge.toml".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                if i + 1 < args.len() {
                    config_path = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: -c requires a file path");
                    std::process::exit(1);
                }
            }
            "-h" | "--help" => {
                println!("midge - last-value MQTT broker");
                println!();
                println!("Usage: midge [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <FILE>     Config file path (default: midge.toml)");
                println!("  -h, --help              Show this help message");
                println!();
                println!("Configuration:");
                println!("  Config file uses TOML format. All settings can be overridden");
                println!("  with environment variables using the MIDGE__ prefix:");
                println!();
                println!("  MIDGE__SERVER__BIND=0.0.0.0:1884");
                println!("  MIDGE__STORE__KEYS=packed");
                println!("  MIDGE__LIMITS__MAX_PAYLOAD_SIZE=4096");
                println!("  MIDGE__LOG__LEVEL=debug");
                std::process::exit(0);
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                eprintln!("Use --help for usage information");
                std::process::exit(1);
            }
        }
    }

    Args { config_path }
}

fn main() {
    let args = parse_args();

    let config = match Config::load(&args.config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log.level))
        .init();

    info!("loaded configuration from {}", args.config_path);
    info!(
        "starting midge on {} (keys={:?}, max_payload={}KB)",
        config.server.bind,
        config.store.keys,
        config.limits.max_payload_size / 1024
    );

    let result = match config.store.keys {
        KeyRepr::Packed => serve::<PackedKey>(&config),
        KeyRepr::String => serve::<StringKey>(&config),
    };

    if let Err(e) = result {
        error!("server error: {}", e);
        std::process::exit(1);
    }
}

fn serve<K: TopicKey>(config: &Config) -> std::io::Result<()> {
    let server = Server::<K, _>::new(SystemClock::new())
        .with_max_payload(config.limits.max_payload_size);
    listener::run(config.server.bind, Arc::new(Mutex::new(server)))
}
