use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use radload::config::{parse_duration_secs, Overrides, RadloadConfig};
use radload::error::StartupError;

#[derive(Parser)]
#[command(
    name = "radload",
    about = "Concurrent load generator for RADIUS/EAP authentication backends",
    version,
    long_about = None,
    after_help = "Arguments after `--` are passed to every eapol_test invocation, e.g.\n  radload -w 8 -n 1000 -- -a 10.0.0.1 -s testing123"
)]
struct Cli {
    /// Number of authentication attempts to run concurrently
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Credential table: identity,secret[,mac] per line
    #[arg(short = 'f', long = "credentials")]
    credentials: Option<PathBuf>,

    /// Field delimiter of the credential table
    #[arg(long)]
    delimiter: Option<char>,

    /// Directory for the generated eapol_test configuration files
    #[arg(short = 'd', long = "work-dir")]
    work_dir: Option<PathBuf>,

    /// Append per-attempt result lines to this file instead of stdout
    #[arg(short = 'l', long = "log")]
    log: Option<PathBuf>,

    /// Generate this many random MAC addresses and send them as Calling-Station-Id
    #[arg(short = 'm', long = "macs")]
    macs: Option<usize>,

    /// Stop after this many attempts (0 = no limit)
    #[arg(short = 'n', long = "max-requests")]
    max_requests: Option<u64>,

    /// Stop after this long, e.g. 90, 30s, 5m (0 = no limit)
    #[arg(short = 't', long = "max-duration", value_parser = parse_duration_secs)]
    max_duration: Option<u64>,

    /// Delete the generated configuration files on exit
    #[arg(long)]
    cleanup: bool,

    /// eapol_test binary (name in PATH or full path)
    #[arg(long)]
    backend: Option<String>,

    /// TOML configuration file (falls back to $RADLOAD_CONFIG)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Print the final report as JSON (attempt lines move to stderr unless -l is given)
    #[arg(long)]
    json: bool,

    /// Diagnostic log format (stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Extra arguments forwarded verbatim to the backend
    #[arg(last = true)]
    backend_args: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let file = RadloadConfig::resolve(cli.config.as_deref())?;
    let config = file.into_run_config(Overrides {
        workers: cli.workers,
        max_requests: cli.max_requests,
        max_duration_secs: cli.max_duration,
        cleanup: cli.cleanup,
        mac_pool_size: cli.macs,
        credentials_path: cli.credentials,
        delimiter: cli.delimiter,
        work_dir: cli.work_dir,
        log_path: cli.log,
        backend_program: cli.backend,
        backend_args: cli.backend_args,
        json: cli.json,
    })?;

    tracing::info!(
        workers = config.worker_limit,
        credentials = %config.credentials_path.display(),
        "Starting radload"
    );
    let config_json = config.json_report;
    let summary = radload::run(config).await?;

    if config_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!();
        println!("{}", summary.stats.report());
        if let Some(reason) = summary.stop_reason {
            println!("Stopped:          {}", reason);
        }
        println!(
            "Peak in flight:   {} of {}",
            summary.peak_in_flight, summary.worker_limit
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<StartupError>() {
            Some(startup) => {
                eprintln!("radload: {}", startup);
                ExitCode::from(startup.exit_code())
            }
            None => {
                eprintln!("radload: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}
