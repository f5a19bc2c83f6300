//! transform-bench - image transform endpoint latency benchmark
//!
//! Prints one line per timed transform request on stdout; logs go to stderr.

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use transform_bench::measure::TimingRecord;
use transform_bench::telemetry::{self, LogFormat};
use transform_bench::{Benchmark, Config};

/// transform-bench - Latency benchmark for on-the-fly image transforms
#[derive(Parser, Debug)]
#[command(name = "transform-bench")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory with the original source images
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Directory the generated examples live in
    #[arg(long)]
    example_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print timing records as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = telemetry::init_subscriber(&args.log_level, args.log_format) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => {
            info!("Finished benchmarking.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Benchmark failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!("Starting transform-bench v{}", transform_bench::VERSION);

    let mut config = Config::load_or_default(args.config.as_deref())
        .with_context(|| format!("loading configuration {:?}", args.config))?;
    if let Some(dir) = args.source_dir {
        config.corpus.source_dir = dir;
    }
    if let Some(dir) = args.example_dir {
        config.corpus.example_dir = dir;
    }
    config.validate()?;

    let records = Benchmark::new(&config)?.run().await?;
    print_records(&records, args.json)?;
    Ok(())
}

fn print_records(records: &[TimingRecord], json: bool) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in records {
        if json {
            writeln!(out, "{}", serde_json::to_string(record)?)?;
        } else {
            writeln!(
                out,
                "{:.1}\t{}\t{}\t{}\t{}",
                record.elapsed_millis(),
                record.width,
                record.asset.image.format,
                record.asset.image.size_string(),
                record.asset.url
            )?;
        }
    }
    out.flush()?;
    Ok(())
}
