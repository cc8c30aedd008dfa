// src/main.rs — funcchat-eval entry point

use clap::Parser;

use funcchat_eval::cli::{evaluate, Cli};
use funcchat_eval::infra::config::Config;
use funcchat_eval::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging (respects RUST_LOG)
    logger::init_logging(logger::level_for(cli.verbose));

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Falls back to defaults when the config file does not exist
    let config = Config::load_from(&cli.config)?;
    evaluate::run_evaluation(&cli.command, config, cli.quiet).await
}
