mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "judgewire=info";

fn init_tracing(explicit: Option<&str>) {
  let filter = match explicit {
    Some(directives) => EnvFilter::new(directives),
    None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
  };
  tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli_args = Cli::parse();
  init_tracing(cli_args.log.as_deref());

  match cli_args.command {
    Commands::Serve(serve_args) => commands::serve::run_server(serve_args).await,
  }
}
