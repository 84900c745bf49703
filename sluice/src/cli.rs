//! Parses the command line arguments.
//!
//! Basic usage for replaying a trace with logging on:
//!
//! ```cargo run --bin sluice -- --trace sluice/traces/fast_retransmit.trace --log```

use crate::{
    replay::{ReplayError, Replayer},
    trace::parse_trace,
};
use clap::Parser;
use sluice_core::{tcp::CongestionAlgorithm, Shutdown, TcpConfig};
use std::{
    fs::{create_dir_all, OpenOptions},
    io,
    sync::Arc,
};
use tracing_subscriber::FmtSubscriber;

/// Stores the different command line arguments.
#[derive(Debug, Parser)]
#[command(version, about = "Replays TCP traces through the sluice engine")]
pub struct Args {
    /// File path to the trace to replay
    #[arg(short, long)]
    pub trace: String,
    /// Logging flag. Used to turn logging on or off.
    #[arg(short, long)]
    pub log: bool,
    /// Use Vegas congestion avoidance unless the trace configures otherwise
    #[arg(long)]
    pub vegas: bool,
    /// Maximum segment size in octets
    #[arg(short, long)]
    pub mss: Option<u32>,
    /// Once the trace ends, keep running timers in real time until the
    /// connection closes or Ctrl-C is pressed
    #[arg(short, long)]
    pub drain: bool,
}

impl Args {
    /// The configuration the trace starts from.
    pub fn config(&self) -> TcpConfig {
        let mut config = TcpConfig::default();
        if self.vegas {
            config = config.congestion(CongestionAlgorithm::Vegas);
        }
        if let Some(mss) = self.mss {
            config = config.mss(mss);
        }
        config
    }
}

/// Parses command line arguments and replays the trace they name.
pub async fn parse_args() {
    let cli = Args::parse();
    // Capture log flag for turning logging on or off
    if cli.log {
        if let Err(e) = initialize_logging() {
            eprintln!("Unable to start logging: {e}");
        }
    }
    if let Err(e) = run(&cli).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

/// Replays the trace, then drains the remaining timers if asked to.
pub async fn run(cli: &Args) -> Result<(), ReplayError> {
    let text = std::fs::read_to_string(&cli.trace)?;
    let lines = parse_trace(&text)?;
    let mut replayer = Replayer::new(cli.config(), io::stdout());
    let mut summary = replayer.run(&lines)?;
    if cli.drain {
        let shutdown = Shutdown::new();
        let interrupt = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.shut_down();
            }
        });
        summary = replayer.drain(shutdown).await?;
    }
    println!("{summary}");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Unable to open the log file: {0}")]
    File(#[from] io::Error),
    #[error(transparent)]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Initializes the event protocol. Only should be called once when the replay
/// starts. Writes JSON events to a timestamped file under ./logs.
fn initialize_logging() -> Result<(), LoggingError> {
    let main_path = "./logs";
    create_dir_all(main_path)?;
    let file_path = format!(
        "{}/debug-{}.log",
        main_path,
        chrono::offset::Local::now().format("%y-%m-%d_%H-%M-%S")
    );
    let file = OpenOptions::new()
        .write(true)
        .append(true)
        .create(true)
        .open(file_path)?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(Arc::new(file))
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
