use super::connection::serve_connection;
use super::dispatcher::Dispatcher;
use super::options::ServerOptions;
use crate::error::JudgeError;
use crate::runtime::{ExecutionBridge, WaitGroup, WorkerPool};
use crate::session::{SessionFactory, SessionRegistry};

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};

/// Bound evaluation server. Every connection shares one registry and one
/// worker pool, so a session started on one connection can be continued on
/// another.
pub struct Server {
  listener: TcpListener,
  local_addr: SocketAddr,
  options: ServerOptions,
  dispatcher: Arc<Dispatcher>,
}

impl std::fmt::Debug for Server {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Server")
      .field("local_addr", &self.local_addr)
      .field("options", &self.options)
      .finish_non_exhaustive()
  }
}

impl Server {
  /// Validates `options`, starts the worker pool and binds the listening socket.
  /// Must be called from within a Tokio runtime.
  pub async fn bind(options: ServerOptions, factory: Arc<dyn SessionFactory>) -> Result<Self, JudgeError> {
    options.validate()?;
    let endpoint = options.bind_addr.to_string();

    let domain = if options.bind_addr.is_ipv4() {
      socket2::Domain::IPV4
    } else {
      socket2::Domain::IPV6
    };
    let socket = socket2::Socket::new(domain, socket2::Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket
      .bind(&options.bind_addr.into())
      .map_err(|e| JudgeError::from_io_endpoint(e, &endpoint))?;
    socket.listen(128)?;

    let std_listener: std::net::TcpListener = socket.into();
    std_listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(std_listener)?;
    let local_addr = listener.local_addr()?;

    let pool = WorkerPool::new("judgewire-worker", options.worker_threads, options.job_queue_capacity)?;
    let bridge = ExecutionBridge::new(pool, options.step_timeout)?;
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(SessionRegistry::new()), bridge, factory));

    tracing::info!(
      %local_addr,
      requested = %endpoint,
      workers = options.worker_threads,
      step_timeout = ?options.step_timeout,
      "Evaluation server bound"
    );
    Ok(Self {
      listener,
      local_addr,
      options,
      dispatcher,
    })
  }

  pub fn local_addr(&self) -> SocketAddr {
    self.local_addr
  }

  pub fn options(&self) -> &ServerOptions {
    &self.options
  }

  pub fn registry(&self) -> &Arc<SessionRegistry> {
    self.dispatcher.registry()
  }

  pub fn dispatcher(&self) -> &Arc<Dispatcher> {
    &self.dispatcher
  }

  /// Serves until the process exits or accepting fails fatally.
  pub async fn run(self) -> Result<(), JudgeError> {
    self.run_until(std::future::pending()).await
  }

  /// Serves until `shutdown` resolves, then stops accepting and gives open
  /// connections `shutdown_grace` to finish before closing them.
  pub async fn run_until<F>(self, shutdown: F) -> Result<(), JudgeError>
  where
    F: Future<Output = ()>,
  {
    let Server {
      listener,
      local_addr,
      options,
      dispatcher,
    } = self;
    let limiter = Arc::new(Semaphore::new(options.max_connections));
    let connections = WaitGroup::new();
    let (stop_tx, _) = broadcast::channel::<()>(1);
    tokio::pin!(shutdown);

    let mut loop_error: Option<JudgeError> = None;
    loop {
      let permit = tokio::select! {
        _ = &mut shutdown => break,
        permit = limiter.clone().acquire_owned() => match permit {
          Ok(p) => p,
          Err(_) => {
            loop_error = Some(JudgeError::Internal("Connection limiter closed".into()));
            break;
          }
        },
      };
      let accepted = tokio::select! {
        _ = &mut shutdown => break,
        accepted = listener.accept() => accepted,
      };

      match accepted {
        Ok((stream, peer)) => {
          if let Err(e) = stream.set_nodelay(options.tcp_nodelay) {
            tracing::warn!(%peer, error = %e, "Failed to set TCP_NODELAY");
          }
          tracing::info!(%peer, %local_addr, "Accepted connection");

          let dispatcher = dispatcher.clone();
          let max_frame_size = options.max_frame_size;
          let guard = connections.enter();
          let mut stop_rx = stop_tx.subscribe();
          tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            tokio::select! {
              result = serve_connection(stream, peer, &dispatcher, max_frame_size) => {
                if let Err(e) = result {
                  tracing::debug!(%peer, error = %e, "Connection ended with error");
                }
              }
              _ = stop_rx.recv() => {
                tracing::debug!(%peer, "Closing connection for shutdown");
              }
            }
          });
        }
        Err(e) => {
          drop(permit);
          tracing::error!(%local_addr, error = %e, "Error accepting connection");
          if is_fatal_accept_error(&e) {
            loop_error = Some(JudgeError::from_io_endpoint(e, &local_addr.to_string()));
            break;
          }
          tokio::time::sleep(Duration::from_millis(100)).await;
        }
      }
    }

    drop(listener);
    let open = connections.get_count();
    tracing::info!(%local_addr, open, grace = ?options.shutdown_grace, "Stopped accepting; draining connections");
    if tokio::time::timeout(options.shutdown_grace, connections.wait()).await.is_err() {
      tracing::warn!(
        remaining = connections.get_count(),
        "Grace period elapsed; closing remaining connections"
      );
      let _ = stop_tx.send(());
      connections.wait().await;
    }
    dispatcher.bridge().pool().close();
    tracing::info!(%local_addr, sessions = dispatcher.registry().len(), "Evaluation server stopped");

    match loop_error {
      Some(e) => Err(e),
      None => Ok(()),
    }
  }
}

fn is_fatal_accept_error(e: &io::Error) -> bool {
  matches!(e.kind(), io::ErrorKind::InvalidInput | io::ErrorKind::BrokenPipe)
}
