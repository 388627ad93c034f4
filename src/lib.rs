//! judgewire - an asynchronous, session-multiplexing evaluation server.
//!
//! A judge connects over TCP and drives resumable sessions, one per question,
//! with length-prefixed `start`/`continue` requests. Step logic runs on a
//! worker pool under a per-step deadline so a slow or hung step never stalls
//! the connection loop.

pub mod client;
pub mod error;
pub mod judge;
pub mod message;
pub mod protocol;
pub mod runtime;
pub mod server;
pub mod session;

// Re-export core types for user convenience
pub use client::JudgeClient;
pub use error::JudgeError;
pub use judge::{evaluate, Question, Responder, ResponderError, Verdict};
pub use message::{Map, Value};
pub use protocol::{FrameCodec, Request, Response};
pub use runtime::{ExecutionBridge, StepFault, WorkerPool};
pub use server::{Dispatcher, Server, ServerOptions};
pub use session::{Computation, QuestionId, SessionFactory, SessionRegistry, Step, StepError};

// --- Top-Level Functions ---

const VERSION_MAJOR: i32 = 0;
const VERSION_MINOR: i32 = 1;
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}
