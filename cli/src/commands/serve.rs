use crate::cli::ServeArgs;

use anyhow::{Context as AnyhowContext, Result};
use judgewire::server::{default_worker_threads, Server, ServerOptions};
use judgewire::session::baseline::FirstChoiceFactory;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn options_from_args(args: &ServeArgs) -> ServerOptions {
  ServerOptions::default()
    .with_bind_addr(SocketAddr::new(args.bind, args.port))
    .with_step_timeout(Duration::from_millis(args.step_timeout_ms))
    .with_worker_threads(args.workers.unwrap_or_else(default_worker_threads))
    .with_max_frame_size(args.max_frame_bytes)
    .with_max_connections(args.max_connections)
}

pub async fn run_server(args: ServeArgs) -> Result<()> {
  let options = options_from_args(&args);
  let server = Server::bind(options, Arc::new(FirstChoiceFactory))
    .await
    .with_context(|| format!("Failed to start server on {}:{}", args.bind, args.port))?;

  println!("Listening on {}", server.local_addr());
  server
    .run_until(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
      }
      tracing::info!("Ctrl-C received, shutting down");
    })
    .await
    .context("Server stopped with an error")?;
  Ok(())
}
