//! thermwatch demo
//!
//! Spins up a simulated subsystem fleet on loopback gRPC, monitors it, and
//! drives a toy fan controller from the fleet maximum.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use thermwatch::transport::{GrpcSubsystemConnector, SubsystemService};
use thermwatch::{
    MaxTempListener, MonitorConfig, SubsystemId, TempMonitor, TempReadingObserver, Temperature,
};

/// Demo configuration
struct Config {
    /// Number of simulated subsystems
    subsystems: u32,
    /// Poll interval in milliseconds
    interval_ms: u64,
    /// Exit after this many completed scans; None runs until Ctrl+C
    scans: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subsystems: 5,
            interval_ms: 200,
            scans: None,
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--subsystems" | "-n" => {
                if i + 1 < args.len() {
                    let count: u32 = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("error: invalid subsystem count: {}", args[i + 1]);
                        std::process::exit(1);
                    });
                    if count == 0 {
                        eprintln!("error: need at least one subsystem");
                        std::process::exit(1);
                    }
                    config.subsystems = count;
                    i += 2;
                } else {
                    eprintln!("error: --subsystems requires a value");
                    std::process::exit(1);
                }
            }
            "--interval-ms" | "-i" => {
                if i + 1 < args.len() {
                    config.interval_ms = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("error: invalid interval: {}", args[i + 1]);
                        std::process::exit(1);
                    });
                    i += 2;
                } else {
                    eprintln!("error: --interval-ms requires a value");
                    std::process::exit(1);
                }
            }
            "--scans" | "-s" => {
                if i + 1 < args.len() {
                    let budget: u64 = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("error: invalid scan budget: {}", args[i + 1]);
                        std::process::exit(1);
                    });
                    config.scans = Some(budget);
                    i += 2;
                } else {
                    eprintln!("error: --scans requires a value");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                println!("thermwatch-demo - Simulated fleet temperature monitor");
                println!();
                println!("USAGE:");
                println!("    thermwatch-demo [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -n, --subsystems <N>      Simulated subsystems [default: 5]");
                println!("    -i, --interval-ms <MS>    Poll interval in ms [default: 200]");
                println!("    -s, --scans <N>           Exit after N scans [default: until Ctrl+C]");
                println!("    -h, --help                Print help information");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    config
}

/// Maps the fleet maximum onto a fan duty cycle and prints transitions.
struct FanController {
    duty: AtomicU32,
}

impl FanController {
    fn new() -> Self {
        Self {
            duty: AtomicU32::new(0),
        }
    }

    fn duty_cycle(temp: f32) -> u32 {
        if temp < 35.0 {
            20
        } else if temp < 40.0 {
            50
        } else if temp < 50.0 {
            80
        } else {
            100
        }
    }
}

impl MaxTempListener for FanController {
    fn on_new_max_temp(&self, temp: Temperature) {
        let duty = Self::duty_cycle(temp.value());
        let prev = self.duty.swap(duty, Ordering::Relaxed);
        if duty == prev {
            println!("max temp {temp} C, fan duty holds at {duty}%");
        } else {
            println!("max temp {temp} C, fan duty {prev}% -> {duty}%");
        }
    }
}

/// Prints every accepted per-subsystem reading change.
struct ConsoleReadings;

impl TempReadingObserver for ConsoleReadings {
    fn on_subsystem_temp_changed(&self, id: SubsystemId, temp: Temperature) {
        println!("  subsystem {id}: {temp} C");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_args();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thermwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("thermwatch demo v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Simulating {} subsystems, polling every {}ms",
        config.subsystems, config.interval_ms
    );

    // One loopback gRPC server per simulated subsystem, ephemeral ports.
    let ids: Vec<SubsystemId> = (1..=config.subsystems).map(SubsystemId::new).collect();
    let mut servers = Vec::with_capacity(ids.len());
    let mut addresses = HashMap::with_capacity(ids.len());
    for id in &ids {
        let server = SubsystemService::new(*id)
            .spawn("127.0.0.1:0".parse().unwrap())
            .await?;
        addresses.insert(*id, server.uri());
        servers.push(server);
    }

    let connector = Arc::new(GrpcSubsystemConnector::new(addresses, Handle::current()));
    let monitor = TempMonitor::with_observer(
        ids,
        MonitorConfig {
            poll_interval: Duration::from_millis(config.interval_ms),
            ..MonitorConfig::default()
        },
        connector,
        Arc::new(ConsoleReadings),
    )?;
    monitor.register_listener(Arc::new(FanController::new()))?;

    monitor.initialize()?;
    monitor.start()?;

    println!("Monitoring. Press Ctrl+C to stop");
    match config.scans {
        Some(budget) => {
            let used_up = async {
                while monitor.completed_scans() < budget {
                    tokio::time::sleep(Duration::from_millis(config.interval_ms)).await;
                }
            };
            tokio::select! {
                () = used_up => println!("Scan budget reached"),
                _ = signal::ctrl_c() => {}
            }
        }
        None => {
            let _ = signal::ctrl_c().await;
        }
    }

    monitor.stop()?;
    println!(
        "Stopping after {} scans ({} reads skipped)",
        monitor.completed_scans(),
        monitor.skipped_reads()
    );

    // The poll thread blocks on this runtime for its reads, so join it from
    // a blocking task rather than a runtime worker.
    tokio::task::spawn_blocking(move || drop(monitor)).await?;

    for server in servers {
        server.shutdown().await;
    }

    println!("Shut down");
    Ok(())
}
