use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

mod filter;
mod log;
mod measure;
mod merge;
mod model;
mod render;
mod spec;
mod summary;
mod window;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "gmt-merge")]
#[command(about = "Aggregate GMT measurements into phase and marker windows", long_about = None)]
struct Cli {
    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a measurements export with its phase data into one gzipped report.
    Merge {
        /// Measurements export (.json or .json.gz).
        #[arg(short = 'm', long)]
        measurements: PathBuf,

        /// Phase-data export (*_phase-data.json).
        #[arg(short = 'p', long)]
        phase_data: PathBuf,

        /// Gzip level of the merged report.
        #[arg(short = 'c', long, default_value_t = 9, value_parser = clap::value_parser!(u32).range(0..=9))]
        compress_lvl: u32,

        #[arg(long, default_value = "gmt-data/processed-data")]
        out_dir: PathBuf,
    },

    /// Drop measurement rows a merge would ignore; writes <input>_filtered.json[.gz].
    Filter {
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Write plain JSON instead of gzip.
        #[arg(long)]
        plain: bool,

        #[arg(short = 'c', long, default_value_t = 9, value_parser = clap::value_parser!(u32).range(0..=9))]
        compress_lvl: u32,
    },

    /// Summarize every *_merged.json[.gz] below a directory across runs.
    Summary {
        #[arg(short = 'i', long)]
        input_dir: PathBuf,

        /// Output name without extension; written into the input directory.
        #[arg(short = 'o', long, default_value = "gmt_runs_aggregated")]
        output_name: String,

        #[arg(short = 'c', long, default_value_t = 9, value_parser = clap::value_parser!(u32).range(0..=9))]
        compress_lvl: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Commands::Merge {
            measurements,
            phase_data,
            compress_lvl,
            out_dir,
        } => {
            let report = merge::merge_run(&measurements, &phase_data)?;
            let out = render::write_report(&report, &out_dir, compress_lvl)?;
            println!("Wrote {}", out.display());
        }
        Commands::Filter {
            input,
            plain,
            compress_lvl,
        } => {
            let registry = spec::MetricRegistry::standard();
            let level = (!plain).then_some(compress_lvl);
            let (out, stats) = filter::filter_file(&registry, &input, level)?;
            tracing::info!(
                rows_seen = stats.rows_seen,
                rows_kept = stats.rows_kept,
                "filter finished"
            );
            println!("Wrote {}", out.display());
        }
        Commands::Summary {
            input_dir,
            output_name,
            compress_lvl,
        } => {
            let registry = spec::MetricRegistry::standard();
            let runs = summary::summarize_dir(&input_dir, &registry)?;
            let out = summary::write_summary(&runs, &input_dir, &output_name, compress_lvl)?;
            println!("Wrote {}", out.display());
        }
    }

    Ok(())
}
