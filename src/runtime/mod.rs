// src/runtime/mod.rs

//! Execution primitives: the worker pool, the deadline bridge, and task tracking.

pub mod bridge;
pub mod waitgroup;
pub mod worker_pool;

pub use bridge::{ExecutionBridge, StepFault, DEFAULT_STEP_TIMEOUT};
pub use waitgroup::{WaitGroup, WaitGroupGuard};
pub use worker_pool::{WorkerPool, DEFAULT_JOB_QUEUE_CAPACITY};

use std::any::Any;

/// Extracts the message from a panic payload (`panic!` with a literal or a
/// formatted string); anything else is reported generically.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&'static str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
