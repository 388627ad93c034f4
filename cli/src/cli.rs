use clap::Parser;
use std::net::IpAddr;

#[derive(Parser, Debug)]
#[clap(name = "judgewire", version, about = "judgewire evaluation server")]
pub struct Cli {
  /// Log filter, e.g. `judgewire=debug` (falls back to RUST_LOG)
  #[clap(long, global = true, env = "JUDGEWIRE_LOG")]
  pub log: Option<String>,

  #[clap(subcommand)]
  pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
  /// Serve evaluation sessions over TCP
  Serve(ServeArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
  /// Address to listen on
  #[clap(long, env = "JUDGEWIRE_BIND", default_value = "0.0.0.0")]
  pub bind: IpAddr,

  /// TCP port to listen on
  #[clap(long, short, env = "JUDGEWIRE_PORT", default_value_t = judgewire::server::DEFAULT_PORT)]
  pub port: u16,

  /// Wall-clock budget for one step, queue time included
  #[clap(long, env = "JUDGEWIRE_STEP_TIMEOUT_MS", default_value_t = 1000)]
  pub step_timeout_ms: u64,

  /// Worker threads running step logic [default: min(32, cpus + 4)]
  #[clap(long, env = "JUDGEWIRE_WORKERS")]
  pub workers: Option<usize>,

  /// Largest accepted frame payload, in bytes
  #[clap(long, env = "JUDGEWIRE_MAX_FRAME_BYTES", default_value_t = judgewire::protocol::DEFAULT_MAX_FRAME_SIZE)]
  pub max_frame_bytes: usize,

  /// Connections served at once; further clients wait in the accept backlog
  #[clap(long, env = "JUDGEWIRE_MAX_CONNECTIONS", default_value_t = judgewire::server::DEFAULT_MAX_CONNECTIONS)]
  pub max_connections: usize,
}
