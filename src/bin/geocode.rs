//! geocode-cli - Batch reverse-geocoder for the activity feed
//!
//! Usage:
//!   geocode-cli <feed.csv> <gpx-dir> [--endpoint <url>] [--spacing <secs>]
//!
//! Fills in missing City/State columns of the feed CSV by looking up the
//! first trackpoint of each activity's GPX file against a Nominatim
//! `reverse` endpoint. The CSV is rewritten after every resolved row, so a
//! cancelled run can simply be restarted.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use activity_map::{GeocodeConfig, GeocodeJob};

#[derive(Parser)]
#[command(name = "geocode-cli")]
#[command(about = "Fill in missing City/State columns of an activity feed", long_about = None)]
struct Cli {
    /// Activity feed CSV to update in place
    feed: PathBuf,

    /// Directory containing the GPX track files
    gpx_dir: PathBuf,

    /// Nominatim-compatible base URL
    #[arg(long, default_value = "https://nominatim.openstreetmap.org")]
    endpoint: String,

    /// Seconds between requests
    #[arg(long, default_value = "6")]
    spacing: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let cli = Cli::parse();
    let config = GeocodeConfig {
        endpoint: cli.endpoint,
        spacing: Duration::from_secs(cli.spacing),
        ..GeocodeConfig::default()
    };

    let job = match GeocodeJob::new(config) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match job.run(&cli.feed, &cli.gpx_dir).await {
        Ok(report) => {
            println!(
                "{} attempted, {} resolved, {} failed",
                report.attempted, report.resolved, report.failed
            );
            if report.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
