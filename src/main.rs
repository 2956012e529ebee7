mod commands;
mod input;
mod pipeline;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "quest-helper",
    version,
    about = "Reads the quest tracker on screen and clicks through task links"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture one frame, analyse it and print the result as JSON
    Once(OnceArgs),
    /// Capture and analyse continuously until stopped
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct OnceArgs {
    /// Quest configuration JSON
    #[arg(long)]
    config: PathBuf,
    /// Click the link target instead of only logging it
    #[arg(long, action = ArgAction::SetTrue)]
    click: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Quest configuration JSON
    #[arg(long)]
    config: PathBuf,
    /// Pause between captures
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
    /// Stop after this many analysed frames (0 = until Ctrl-C)
    #[arg(long, default_value_t = 0)]
    max_cycles: u64,
    /// Click link targets instead of only logging them
    #[arg(long, action = ArgAction::SetTrue)]
    click: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "quest_helper=debug,quest_capture=debug,quest_vision=debug".into()
            }),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Once(args) => commands::once(&args.config, args.click).await,
        Commands::Run(args) => {
            commands::run(&args.config, args.interval_ms, args.max_cycles, args.click).await
        }
    }
}
