use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use geoburst::config::{GeoburstConfig, LoggingSection};
use geoburst::simulate::SimulationParams;

#[derive(Parser)]
#[command(
    name = "geoburst",
    about = "Real-time density hotspot detection for geolocated event bursts",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (default: $GEOBURST_CONFIG, then /etc/geoburst/geoburst.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (UDP listener + burst detector + sinks)
    Serve {
        /// UDP bind address
        #[arg(long)]
        bind: Option<String>,

        /// Forward cluster centres to this UDP address
        #[arg(long)]
        forward_to: Option<String>,

        /// Append one JSON line per burst to this file
        #[arg(long)]
        plot_file: Option<PathBuf>,

        /// Emit logs as JSON
        #[arg(long)]
        json_logs: bool,
    },

    /// Send a synthetic burst of reports over UDP
    Simulate {
        /// Destination address
        #[arg(long, default_value = "127.0.0.1:5000")]
        target: String,

        /// Packets in the burst, hotspots included
        #[arg(long, default_value = "300000")]
        total_packets: usize,

        /// Number of hotspots
        #[arg(long, default_value = "3")]
        clusters: usize,

        /// Packets per hotspot
        #[arg(long, default_value = "600")]
        cluster_size: usize,

        /// RNG seed for a reproducible burst
        #[arg(long)]
        seed: Option<u64>,

        /// Packets sent between yields to the runtime
        #[arg(long, default_value = "1000")]
        batch: usize,

        /// Pause between batches in milliseconds
        #[arg(long)]
        pause_ms: Option<u64>,
    },

    /// Measure detector speedup across worker pool sizes
    Bench {
        /// Comma-separated worker counts; the first is the baseline
        #[arg(long, default_value = "1,2,4,8,16,32,64,128")]
        workers: String,

        /// Packets in the synthetic burst
        #[arg(long, default_value = "300000")]
        total_packets: usize,

        /// RNG seed for the synthetic burst
        #[arg(long, default_value = "42")]
        seed: u64,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

fn init_tracing(logging: &LoggingSection) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolve the config file under a stderr subscriber, since the real one
/// depends on the `[logging]` section being loaded.
fn resolve_config(explicit: Option<&Path>) -> Result<GeoburstConfig> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || GeoburstConfig::resolve(explicit))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            bind,
            forward_to,
            plot_file,
            json_logs,
        } => {
            if let Some(bind) = bind {
                config.listener.bind = bind;
            }
            if let Some(target) = forward_to {
                config.forward.enabled = true;
                config.forward.target = target;
            }
            if plot_file.is_some() {
                config.plot.path = plot_file;
            }
            config.logging.json |= json_logs;
            init_tracing(&config.logging);

            tracing::info!(bind = %config.listener.bind, "Starting geoburst daemon");
            let summary = geoburst::serve(config).await?;
            tracing::info!(bursts = summary.bursts, clusters = summary.clusters, "geoburst exited");
        }
        Commands::Simulate {
            target,
            total_packets,
            clusters,
            cluster_size,
            seed,
            batch,
            pause_ms,
        } => {
            init_tracing(&config.logging);
            let params = SimulationParams {
                total_packets,
                clusters,
                cluster_size,
                seed,
            };
            let packets = geoburst::simulate::generate_packets(&params);
            let sent = geoburst::simulate::send_packets(
                &target,
                &packets,
                batch,
                pause_ms.map(Duration::from_millis),
            )
            .await?;
            println!("Sent {} packets to {}", sent, target);
        }
        Commands::Bench {
            workers,
            total_packets,
            seed,
            json,
        } => {
            init_tracing(&config.logging);
            let counts = geoburst::bench::parse_worker_counts(&workers).map_err(anyhow::Error::msg)?;
            let burst = geoburst::simulate::generate_burst(&SimulationParams {
                total_packets,
                seed: Some(seed),
                ..Default::default()
            })
            .context("failed to generate synthetic burst")?;
            let detector_config = config.detector_config();

            let report = tokio::task::spawn_blocking(move || {
                geoburst::bench::run_bench(&detector_config, &counts, &burst)
            })
            .await
            .context("benchmark task failed")??;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\ngeoburst worker scaling ({} records)", report.records);
                println!("{:<8} | {:<10} | {:<8} | Clusters", "Workers", "Seconds", "Speedup");
                println!("{:-<8}-|-{:-<10}-|-{:-<8}-|-{:-<8}", "", "", "", "");
                for s in &report.samples {
                    println!(
                        "{:<8} | {:<10.4} | {:<8.2} | {}",
                        s.workers, s.seconds, s.speedup, s.clusters
                    );
                }
                println!();
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", config.to_toml().context("failed to render configuration")?);
            }
        },
    }

    Ok(())
}
