// tests/common.rs
#![allow(dead_code)] // Each test binary uses a different subset

use bytes::{BufMut, BytesMut};
use judgewire::message::{Map, Value};
use judgewire::server::{Server, ServerOptions};
use judgewire::session::{Computation, Coroutine, SessionFactory, SessionRegistry, StepError};
use judgewire::{JudgeClient, JudgeError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Can be overridden by RUST_LOG
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("judgewire=debug"));
    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer()
      .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global tracing subscriber");
  });
}

/// Step logic driven by its start fields:
/// - `steps`: actions emitted before completing (default 1)
/// - `sleep_ms`: delay at the beginning of every step
/// - `fail_on`: 1-based step number that fails instead
/// - `stall_on`: 1-based step number that sleeps an extra second
/// - `answer`: completion value (default `"42"`)
/// - `quiet`: emit null actions
///
/// Each action is `{"step": n, "echo": <last response>}` unless quiet.
pub fn scripted_factory(fields: &Map) -> Result<Box<dyn Computation>, StepError> {
  let int = |key: &str| fields.get(key).and_then(Value::as_i64);
  let steps = int("steps").unwrap_or(1);
  let sleep = Duration::from_millis(int("sleep_ms").unwrap_or(0) as u64);
  let fail_on = int("fail_on");
  let stall_on = int("stall_on");
  let answer = fields.get("answer").cloned().unwrap_or_else(|| "42".into());
  let quiet = fields.get("quiet").and_then(Value::as_bool).unwrap_or(false);

  let body = Coroutine::spawn("scripted-session", move |y| {
    let mut last = Value::Null;
    for step in 1..=steps + 1 {
      thread::sleep(sleep);
      if stall_on == Some(step) {
        thread::sleep(Duration::from_secs(1));
      }
      if fail_on == Some(step) {
        return Err(format!("failure at step {}", step).into());
      }
      if step > steps {
        break;
      }
      let action = if quiet {
        Value::Null
      } else {
        Value::map().with("step", step).with("echo", last)
      };
      last = y.suspend(action)?;
    }
    Ok(answer)
  })?;
  Ok(Box::new(body))
}

pub fn local_options() -> ServerOptions {
  ServerOptions::default()
    .with_bind_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
    .with_worker_threads(4)
    .with_step_timeout(Duration::from_millis(300))
    .with_shutdown_grace(Duration::from_millis(50))
}

/// A server running on an ephemeral local port.
pub struct TestServer {
  pub addr: SocketAddr,
  pub registry: Arc<SessionRegistry>,
  stop: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
  pub async fn client(&self) -> JudgeClient {
    JudgeClient::connect(self.addr).await.expect("Failed to connect test client")
  }

  pub async fn raw(&self) -> TcpStream {
    TcpStream::connect(self.addr).await.expect("Failed to connect raw stream")
  }
}

impl Drop for TestServer {
  fn drop(&mut self) {
    if let Some(stop) = self.stop.take() {
      let _ = stop.send(());
    }
  }
}

pub async fn spawn_server_with(options: ServerOptions, factory: Arc<dyn SessionFactory>) -> TestServer {
  setup_tracing();
  let server = Server::bind(options, factory).await.expect("Failed to bind test server");
  let addr = server.local_addr();
  let registry = server.registry().clone();
  let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
  tokio::spawn(server.run_until(async move {
    let _ = stop_rx.await;
  }));
  TestServer {
    addr,
    registry,
    stop: Some(stop_tx),
  }
}

pub async fn spawn_server() -> TestServer {
  spawn_server_with(local_options(), Arc::new(scripted_factory)).await
}

pub fn fields(pairs: &[(&str, Value)]) -> Map {
  pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// Writes `header` as the 16-byte length prefix followed by `payload` as is.
pub async fn write_raw_frame(stream: &mut TcpStream, header: u128, payload: &[u8]) -> std::io::Result<()> {
  let mut buf = BytesMut::with_capacity(16 + payload.len());
  buf.put_u128(header);
  buf.put_slice(payload);
  stream.write_all(&buf).await
}

/// Waits until the server closes `stream`, failing if it sends anything or stays open.
pub async fn expect_closed_without_reply(stream: &mut TcpStream, within: Duration) -> Result<(), JudgeError> {
  let mut buf = [0u8; 64];
  match tokio::time::timeout(within, stream.read(&mut buf)).await {
    Ok(Ok(0)) => Ok(()),
    Ok(Ok(n)) => Err(JudgeError::Internal(format!("server replied with {} bytes", n))),
    Ok(Err(e)) => match e.kind() {
      std::io::ErrorKind::ConnectionReset => Ok(()),
      _ => Err(e.into()),
    },
    Err(_) => Err(JudgeError::Internal("connection still open".into())),
  }
}
