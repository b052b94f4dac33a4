mod app;
mod setup;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rapidwhisper_core::instance::SingleInstance;
use rapidwhisper_core::stats::{Period, StatisticsLedger};

#[derive(Parser)]
#[command(
    name = "rapidwhisper",
    version,
    about = "Push-to-talk dictation via remote speech-to-text"
)]
struct Cli {
    /// Create the config and recordings directories with defaults
    #[arg(long)]
    setup: bool,

    /// Print aggregated statistics: today, 7d, 30d, 365d, all
    #[arg(long, value_name = "PERIOD")]
    stats: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.setup {
        return match setup::run_setup() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("setup failed: {e}");
                ExitCode::FAILURE
            }
        };
    }

    if let Some(period) = cli.stats {
        return match print_stats(&period) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    // One running instance only: the lockfile holds the owner's PID and is
    // released when `instance` drops at the end of a clean run.
    let mut instance = SingleInstance::new("rapidwhisper");
    if let Err(e) = instance.acquire() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    match app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn print_stats(period: &str) -> anyhow::Result<()> {
    let period = match period {
        "today" => Period::Today,
        "7d" => Period::Last7Days,
        "30d" => Period::Last30Days,
        "365d" => Period::Last365Days,
        "all" => Period::AllTime,
        other => anyhow::bail!("unknown period '{other}' (use today, 7d, 30d, 365d, all)"),
    };

    let config_dir = rapidwhisper_core::config::config_dir()?;
    let mut ledger = StatisticsLedger::new(&config_dir);
    let stats = ledger.get_statistics(period);

    println!("Recordings:        {}", stats.recordings_count);
    println!("Transcriptions:    {}", stats.transcriptions_count);
    println!("Recorded audio:    {:.1}s", stats.total_recording_seconds);
    println!("Transcribed audio: {:.1}s", stats.total_transcribed_seconds);
    println!("Characters:        {}", stats.total_characters);
    println!("Words:             {}", stats.total_words);
    println!("Silence removed:   {:.1}s", stats.total_removed_silence_seconds);
    Ok(())
}
