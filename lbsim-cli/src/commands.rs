use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use lbsim_config::LbSimConfig;
use lbsim_core::balancer::Balancer;
use lbsim_simulator::{load_trace, TraceReplayer};
use lbsim_telemetry::logging::EventLogger;
use lbsim_telemetry::metrics::MetricsRecorder;
use tracing::info;

use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(name = "lbsim", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay the configured trace through a simulated worker pool
    Run(RunArgs),
    /// Parse a trace file and report how many records are usable
    CheckTrace(CheckTraceArgs),
    /// Print the effective configuration as YAML
    ShowConfig(ShowConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Configuration file; `lbsim.yaml` in the working directory is used when present
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Print Prometheus metrics after the run
    #[arg(long, default_value_t = false)]
    pub metrics: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CheckTraceArgs {
    /// Trace file to parse
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ShowConfigArgs {
    /// Configuration file; `lbsim.yaml` in the working directory is used when present
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub async fn run_command(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Run(args) => run_simulation(args).await,
        Commands::CheckTrace(args) => check_trace(args),
        Commands::ShowConfig(args) => show_config(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<LbSimConfig, CliError> {
    Ok(match path {
        Some(path) => LbSimConfig::load_from_path(path)?,
        None => LbSimConfig::load()?,
    })
}

async fn run_simulation(args: RunArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_ref())?;
    EventLogger::init(&config.telemetry.log_level);
    info!(
        pool_size = config.balancer.pool_size,
        strategy = %config.balancer.strategy,
        trace = %config.replay.trace_path.display(),
        "Configuration loaded"
    );

    let trace = load_trace(&config.replay.trace_path)?;
    let skipped = trace.skipped();

    let metrics = Arc::new(MetricsRecorder::new());
    let mut balancer = Balancer::from_config(&config).with_metrics(Arc::clone(&metrics));
    balancer.start()?;

    let summary = TraceReplayer::new(trace)
        .with_time_scale(config.replay.time_scale)
        .run(&balancer)
        .await;

    let mut stdout = std::io::stdout();
    write!(stdout, "Request execution completed. Shutting down ... ")?;
    stdout.flush()?;
    balancer.stop().await?;
    writeln!(stdout, "done.")?;

    EventLogger::log_run_summary(
        summary.sent,
        balancer.dropped(),
        balancer.completed(),
        skipped,
    );

    if args.metrics {
        let rendered = metrics
            .gather_metrics()
            .map_err(|e| CliError::Metrics(e.to_string()))?;
        write!(stdout, "{rendered}")?;
    }
    Ok(())
}

fn check_trace(args: CheckTraceArgs) -> Result<(), CliError> {
    let trace = load_trace(&args.path)?;
    println!(
        "{}: {} requests, {} skipped, spanning {:.3}s",
        args.path.display(),
        trace.len(),
        trace.skipped(),
        trace.span().as_secs_f64()
    );
    Ok(())
}

fn show_config(args: ShowConfigArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_ref())?;
    print!("{}", config.to_yaml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::parse_from(["lbsim", "run", "--config", "sim.yaml", "--metrics"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, Some(PathBuf::from("sim.yaml")));
                assert!(args.metrics);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn run_defaults_to_no_flags() {
        let cli = Cli::parse_from(["lbsim", "run"]);
        assert!(matches!(
            cli.command,
            Commands::Run(RunArgs {
                config: None,
                metrics: false
            })
        ));
    }

    #[test]
    fn parses_check_trace() {
        let cli = Cli::parse_from(["lbsim", "check-trace", "lb_requests.csv"]);
        match cli.command {
            Commands::CheckTrace(args) => assert_eq!(args.path, PathBuf::from("lb_requests.csv")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_show_config() {
        let cli = Cli::parse_from(["lbsim", "show-config", "-c", "sim.yaml"]);
        assert!(matches!(
            cli.command,
            Commands::ShowConfig(ShowConfigArgs { config: Some(_) })
        ));
    }

    #[test]
    fn missing_trace_is_reported() {
        let result = check_trace(CheckTraceArgs {
            path: PathBuf::from("/nonexistent/lbsim/trace.csv"),
        });
        assert!(matches!(result, Err(CliError::Trace(_))));
    }

    #[tokio::test]
    async fn missing_config_file_is_reported() {
        let result = run_simulation(RunArgs {
            config: Some(PathBuf::from("/nonexistent/lbsim.yaml")),
            metrics: false,
        })
        .await;
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
