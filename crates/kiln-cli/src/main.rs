//! kiln - compile and run templated SQL projects

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{archive, clean, compile, deps, ls, run, seed, test};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.global.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    match &cli.command {
        Commands::Compile(args) => compile::execute(args, &cli.global).await,
        Commands::Run(args) => run::execute(args, &cli.global).await,
        Commands::Test(args) => test::execute(args, &cli.global).await,
        Commands::Archive(args) => archive::execute(args, &cli.global).await,
        Commands::Seed(args) => seed::execute(args, &cli.global).await,
        Commands::Ls(args) => ls::execute(args, &cli.global).await,
        Commands::Clean(args) => clean::execute(args, &cli.global).await,
        Commands::Deps => deps::execute(&cli.global).await,
    }
}
