use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use jitterbench::clock::MonotonicClock;
use jitterbench::config::Config;
use jitterbench::driver;
use jitterbench::report;
use jitterbench::types::{AbortedSamplePolicy, DrawPolicy, OutputFormat, OverflowPolicy, SimulatorKind};

#[derive(Parser)]
#[command(
    name = "jitterbench",
    version,
    about = "Measure the latency and jitter profile of blocking operations"
)]
struct Cli {
    /// "run" (default) or "config" to print the resolved configuration
    command: Option<String>,

    /// Config file (default: <config dir>/jitterbench/config.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    simulator: Option<SimulatorKind>,

    #[arg(short = 'n', long)]
    iterations: Option<u64>,

    /// Divide reported values by this factor (1000 shows microseconds)
    #[arg(long)]
    scale: Option<f64>,

    #[arg(long)]
    min_park_ns: Option<u64>,

    #[arg(long)]
    max_park_ns: Option<u64>,

    #[arg(long)]
    sleep_ms: Option<u64>,

    #[arg(long)]
    draw: Option<DrawPolicy>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    lowest: Option<u64>,

    #[arg(long)]
    highest: Option<u64>,

    #[arg(long)]
    digits: Option<u8>,

    #[arg(long)]
    overflow: Option<OverflowPolicy>,

    /// Whether samples from aborted operations are recorded
    #[arg(long)]
    aborted: Option<AbortedSamplePolicy>,

    #[arg(long, default_value = "table")]
    format: OutputFormat,

    #[arg(long)]
    json: bool,

    /// -v for run progress, -vv for debug detail (RUST_LOG overrides)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    let histogram = &mut config.histogram;
    if let Some(lowest) = cli.lowest {
        histogram.lowest_discernible_value = lowest;
    }
    if let Some(highest) = cli.highest {
        histogram.highest_trackable_value = highest;
    }
    if let Some(digits) = cli.digits {
        histogram.significant_value_digits = digits;
    }
    if let Some(overflow) = cli.overflow {
        histogram.overflow = overflow;
    }

    let simulator = &mut config.simulator;
    if let Some(kind) = cli.simulator {
        simulator.kind = kind;
    }
    if let Some(min) = cli.min_park_ns {
        simulator.min_park_time_nanos = min;
    }
    if let Some(max) = cli.max_park_ns {
        simulator.max_park_time_nanos = max;
    }
    if let Some(sleep_ms) = cli.sleep_ms {
        simulator.sleep_time_millis = sleep_ms;
    }
    if let Some(draw) = cli.draw {
        simulator.draw = draw;
    }
    if cli.seed.is_some() {
        simulator.seed = cli.seed;
    }

    let run = &mut config.run;
    if let Some(iterations) = cli.iterations {
        run.iterations = iterations;
    }
    if let Some(scale) = cli.scale {
        run.scale_factor = scale;
    }
    if let Some(aborted) = cli.aborted {
        run.aborted_samples = aborted;
    }
}

fn measure(config: &Config, format: OutputFormat) -> Result<()> {
    // Build everything up front so bad settings fail before any waiting.
    let histogram = config.histogram.build()?;
    let simulator = config.simulator.build()?;
    let bench = config.run.build()?;

    let completed =
        driver::run_benchmark(&bench, simulator.as_ref(), histogram, &MonotonicClock::new())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Table => {
            write!(out, "{}", report::format_run_header(&completed))?;
            completed.output_percentile_distribution(&mut out)?;
        }
        OutputFormat::Json => writeln!(out, "{}", report::format_json(&completed))?,
    }
    out.flush()?;
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);

    match cli.command.as_deref() {
        None | Some("run") => {
            let format = if cli.json { OutputFormat::Json } else { cli.format };
            measure(&config, format)?;
        }
        Some("config") => {
            config.validate()?;
            print!("{}", config.to_toml()?);
        }
        Some(other) => {
            anyhow::bail!(
                "Unknown command '{}'. Usage: jitterbench [run|config] [OPTIONS]",
                other
            );
        }
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err);
        process::exit(1);
    }
}
