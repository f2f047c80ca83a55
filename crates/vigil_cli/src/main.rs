use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vigil_core::{MonitorConfig, SafetyLevel, SensorError};
use vigil_monitor::{SafetyMonitor, SensorReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "VIGIL_CONFIG", default_value = "vigil.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Simulated starting temperature (°C)
    #[arg(long, default_value_t = 35.0)]
    ambient: f64,

    /// Simulated heating rate (°C per second)
    #[arg(long, default_value_t = 0.0)]
    heat_rate: f64,

    /// Simulated supply current (mA)
    #[arg(long, default_value_t = 120.0)]
    current: f64,

    /// Simulated neural amplitude (µV)
    #[arg(long, default_value_t = 40.0)]
    neural: f64,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration: Option<u64>,

    /// Process names to check against the restriction table on startup
    #[arg(long = "check")]
    check: Vec<String>,
}

/// Bench simulation: linear heating plus a small ripple on every channel.
struct SimulatedSensors {
    started: Instant,
    ambient: f64,
    heat_rate: f64,
    current: f64,
    neural: f64,
}

impl SimulatedSensors {
    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn ripple(&self, amplitude: f64, period_secs: f64) -> f64 {
        amplitude * (self.elapsed() * std::f64::consts::TAU / period_secs).sin()
    }
}

#[async_trait]
impl SensorReader for SimulatedSensors {
    async fn read_temperature(&self) -> Result<f64, SensorError> {
        Ok(self.ambient + self.heat_rate * self.elapsed() + self.ripple(0.2, 3.0))
    }

    async fn read_current(&self) -> Result<f64, SensorError> {
        Ok(self.current + self.ripple(5.0, 1.7))
    }

    async fn read_neural_activity(&self) -> Result<f64, SensorError> {
        Ok((self.neural + self.ripple(3.0, 0.9)).max(0.0))
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Loading config from {}...", args.config);
    let config = MonitorConfig::load_or_default(&args.config);

    let sensors = Arc::new(SimulatedSensors {
        started: Instant::now(),
        ambient: args.ambient,
        heat_rate: args.heat_rate,
        current: args.current,
        neural: args.neural,
    });
    let monitor = SafetyMonitor::new(sensors)?;

    monitor
        .on_emergency_shutdown(|reason| {
            error!("Shutdown callback: powering down load ({})", reason);
            Ok(())
        })
        .await;
    monitor
        .on_safety_alert(|level, message| {
            if level >= SafetyLevel::Critical {
                error!("[{}] {}", level, message);
            } else {
                warn!("[{}] {}", level, message);
            }
            Ok(())
        })
        .await;
    monitor
        .on_protective_action(|action, channel| {
            info!("Protective action: {} ({})", action, channel);
            Ok(())
        })
        .await;

    // Validation failures are fatal: never sample with unsafe boundaries
    monitor.initialize(config).await?;
    monitor.start().await?;

    for name in &args.check {
        let allowed = monitor.check_process_authorization(name).await;
        println!("{}: {}", name, if allowed { "allowed" } else { "BLOCKED" });
    }

    println!("Vigil online. Press Ctrl-C to stop.");
    match args.duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    monitor.stop().await?;

    let metrics = monitor.get_metrics().await;
    info!(
        "Final level {} after {} ticks ({} shutdowns, {} violations)",
        metrics.level, metrics.ticks, metrics.shutdown_count, metrics.violation_count
    );

    let log = monitor.get_violation_log(None).await;
    println!("{}", serde_json::to_string_pretty(&log)?);

    Ok(())
}
