// tests/faults.rs

use judgewire::message::Value;
use judgewire::protocol::{FrameCodec, Response};
use judgewire::runtime::StepFault;
use judgewire::JudgeError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
mod common;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

fn payload(value: &Value) -> Vec<u8> {
  FrameCodec::default().serialize_payload(value).unwrap()
}

// --- Deadlines ---

#[tokio::test]
async fn test_slow_start_times_out_and_frees_id() -> Result<(), JudgeError> {
  let server = common::spawn_server().await;
  let mut client = server.client().await;

  let began = Instant::now();
  let reply = client.start(1, common::fields(&[("sleep_ms", 800i64.into())])).await?;
  let elapsed = began.elapsed();
  match reply {
    Response::Error(exception) => assert!(exception.starts_with(StepFault::TIMEOUT_PREFIX), "{}", exception),
    other => panic!("expected a timeout, got {:?}", other),
  }
  assert!(elapsed < Duration::from_millis(700), "reply took {:?}", elapsed);
  assert!(!server.registry.contains(&1.into()));

  // The id is immediately reusable while the abandoned step is still sleeping.
  let reply = client.start(1, common::fields(&[("answer", "fresh".into())])).await?;
  assert!(matches!(reply, Response::Ok(Some(_))));
  tokio::time::sleep(Duration::from_millis(900)).await;
  assert_eq!(client.resume(1, Value::Null).await?, Response::Done("fresh".into()));
  Ok(())
}

#[tokio::test]
async fn test_slow_continue_times_out_and_removes_session() -> Result<(), JudgeError> {
  let server = common::spawn_server().await;
  let mut client = server.client().await;

  let reply = client.start(2, common::fields(&[("steps", 3i64.into()), ("stall_on", 2i64.into())])).await?;
  assert!(matches!(reply, Response::Ok(Some(_))));

  let reply = client.resume(2, "a").await?;
  assert_eq!(reply, Response::Error(StepFault::Timeout(Duration::from_millis(300)).to_string()));
  assert!(!server.registry.contains(&2.into()));
  assert_eq!(client.resume(2, "b").await?, Response::error("Task not found"));
  Ok(())
}

#[tokio::test]
async fn test_slow_step_does_not_block_other_connections() -> Result<(), JudgeError> {
  let server = common::spawn_server().await;
  let mut slow = server.client().await;
  let mut fast = server.client().await;

  let slow_reply = tokio::spawn(async move { slow.start(10, common::fields(&[("sleep_ms", 250i64.into())])).await });
  tokio::time::sleep(Duration::from_millis(20)).await;

  let began = Instant::now();
  assert!(matches!(fast.start(11, Default::default()).await?, Response::Ok(_)));
  assert!(began.elapsed() < Duration::from_millis(200));

  assert!(matches!(slow_reply.await.unwrap()?, Response::Ok(_)));
  Ok(())
}

#[tokio::test]
async fn test_queue_wait_counts_against_deadline() -> Result<(), JudgeError> {
  let options = common::local_options().with_worker_threads(1);
  let server = common::spawn_server_with(options, Arc::new(common::scripted_factory)).await;
  let mut busy = server.client().await;
  let mut queued = server.client().await;

  let busy_reply = tokio::spawn(async move { busy.start(20, common::fields(&[("sleep_ms", 500i64.into())])).await });
  tokio::time::sleep(Duration::from_millis(20)).await;
  let reply = queued.start(21, Default::default()).await?;
  assert!(reply.is_error(), "{:?}", reply);
  assert!(busy_reply.await.unwrap()?.is_error());
  Ok(())
}

// --- Framing and protocol faults ---

#[tokio::test]
async fn test_eof_mid_frame_is_clean_disconnect() -> Result<(), JudgeError> {
  let server = common::spawn_server().await;
  let mut stream = server.raw().await;
  common::write_raw_frame(&mut stream, 512, &[1, 2, 3]).await?;
  stream.shutdown().await?;
  common::expect_closed_without_reply(&mut stream, CLOSE_TIMEOUT).await?;

  let mut client = server.client().await;
  assert!(matches!(client.start(1, Default::default()).await?, Response::Ok(_)));
  Ok(())
}

#[tokio::test]
async fn test_oversized_header_closes_connection() -> Result<(), JudgeError> {
  let options = common::local_options().with_max_frame_size(1024);
  let server = common::spawn_server_with(options, Arc::new(common::scripted_factory)).await;
  let mut stream = server.raw().await;
  common::write_raw_frame(&mut stream, u128::MAX, &[]).await?;
  common::expect_closed_without_reply(&mut stream, CLOSE_TIMEOUT).await
}

#[tokio::test]
async fn test_undecodable_payload_closes_connection() -> Result<(), JudgeError> {
  let server = common::spawn_server().await;
  let mut stream = server.raw().await;
  common::write_raw_frame(&mut stream, 5, b"junk!").await?;
  common::expect_closed_without_reply(&mut stream, CLOSE_TIMEOUT).await
}

#[tokio::test]
async fn test_deeply_nested_payload_closes_connection_and_server_survives() -> Result<(), JudgeError> {
  let server = common::spawn_server().await;
  let mut stream = server.raw().await;
  // 200k one-element lists: List tag 6, length 1, then a Null leaf.
  let mut hostile = [6u8, 1].repeat(200_000);
  hostile.push(0);
  common::write_raw_frame(&mut stream, hostile.len() as u128, &hostile).await?;
  common::expect_closed_without_reply(&mut stream, CLOSE_TIMEOUT).await?;

  let mut client = server.client().await;
  assert!(matches!(client.start(1, Default::default()).await?, Response::Ok(Some(_))));
  Ok(())
}

#[tokio::test]
async fn test_malformed_requests_close_connection() -> Result<(), JudgeError> {
  let server = common::spawn_server().await;
  let malformed = [
    Value::from("not a map"),
    Value::map().with("question_id", 1i64),
    Value::map().with("type", "start"),
    Value::map().with("type", "start").with("question_id", 1.5f64),
    Value::map().with("type", "continue").with("question_id", 1i64),
  ];
  for request in malformed {
    let mut stream = server.raw().await;
    let bytes = payload(&request);
    common::write_raw_frame(&mut stream, bytes.len() as u128, &bytes).await?;
    common::expect_closed_without_reply(&mut stream, CLOSE_TIMEOUT).await?;
  }
  assert!(server.registry.is_empty());
  Ok(())
}

#[tokio::test]
async fn test_fault_after_valid_requests_keeps_earlier_replies() -> Result<(), JudgeError> {
  let server = common::spawn_server().await;
  let mut client = server.client().await;
  assert!(matches!(client.start(1, Default::default()).await?, Response::Ok(_)));

  client.send_raw(Value::map().with("type", "bogus")).await?;
  assert!(matches!(client.recv().await, Err(JudgeError::ConnectionClosed)));

  // Session state is server-wide, not per connection.
  assert!(server.registry.contains(&1.into()));
  Ok(())
}
