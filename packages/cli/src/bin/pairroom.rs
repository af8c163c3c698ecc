use clap::Parser;
use colored::*;
use pairroom_cli::{init_tracing, run_server, Cli};
use pairroom_config::Config;
use std::process;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = start(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn start(cli: Cli) -> anyhow::Result<()> {
    let config = cli.apply_to(Config::from_env()?)?;

    println!("{}", "Starting Pairroom server...".green().bold());
    println!(
        "{} http://{}",
        "Server will run on".cyan(),
        config.bind_address()
    );
    println!("{} {}", "CORS origin:".cyan(), config.cors_origin);
    println!("{} {}", "Database:".cyan(), config.database_url);

    run_server(config).await
}
