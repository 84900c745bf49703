use sluice::cli::parse_args;

/// Replays the trace named on the command line
#[tokio::main]
async fn main() {
    println!("Sluice v{}", env!("CARGO_PKG_VERSION"));
    parse_args().await;
}
