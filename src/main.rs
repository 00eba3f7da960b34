mod auth;
mod cli;
mod config;
mod error;
mod model;
mod output;
mod pipeline;
mod service;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting maintlens");
    cli.execute().await?;

    Ok(())
}
