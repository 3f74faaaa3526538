mod agent;
mod cli;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agent::dispatch(cli::Cli::parse()).await
}
