use anyhow::Result;
use clap::Parser;
use roomwarden::{
    app,
    cli::{handle_dispatch_command, handle_rooms_command, Cli, CliCommand},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("Roomwarden {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Dispatch(args)) => {
            handle_dispatch_command(args).await?;
            return Ok(());
        }
        Some(CliCommand::Rooms) => {
            handle_rooms_command().await?;
            return Ok(());
        }
        None => {}
    }

    app::run_service().await
}
