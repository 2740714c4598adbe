use clap::Parser;
use delegate_cli::{Cli, commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    commands::run(Cli::parse()).await
}
