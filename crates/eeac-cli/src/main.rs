use anyhow::Context;
use clap::Parser;
use eeac_cli::cli::{Cli, Commands};
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    match &cli.command {
        Commands::Run(args) => commands::run::handle(args),
        Commands::Validate { tree } => commands::validate::handle(tree),
        Commands::Reduce { case, out } => commands::reduce::handle(case, out),
    }
}
