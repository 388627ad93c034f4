//! Sessions: suspend/resume step logic keyed by question id.
//!
//! A session wraps one [`Computation`]. The first `advance(None)` runs the
//! logic up to its first action; every later `advance(Some(response))` feeds
//! the client's answer back in and runs to the next action or to the end.

pub mod baseline;
pub mod coroutine;
pub mod registry;

pub use coroutine::{Abandoned, Coroutine, Yielder};
pub use registry::{RegistryError, Session, SessionRegistry, SessionTicket};

use crate::error::JudgeError;
use crate::message::{Map, Value};
use std::fmt;

/// Error type produced by step logic. Its `Display` text is what the client
/// sees in the `exception` field.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Identifier of a session, as sent by the client in `question_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuestionId {
  Int(i64),
  Str(String),
}

impl fmt::Display for QuestionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      QuestionId::Int(i) => write!(f, "{}", i),
      QuestionId::Str(s) => f.write_str(s),
    }
  }
}

impl TryFrom<Value> for QuestionId {
  type Error = JudgeError;

  fn try_from(value: Value) -> Result<Self, Self::Error> {
    match value {
      Value::Int(i) => Ok(QuestionId::Int(i)),
      Value::Str(s) => Ok(QuestionId::Str(s)),
      other => Err(JudgeError::ProtocolViolation(format!(
        "question_id must be an int or string, got {}",
        other.kind()
      ))),
    }
  }
}

impl From<QuestionId> for Value {
  fn from(id: QuestionId) -> Self {
    match id {
      QuestionId::Int(i) => Value::Int(i),
      QuestionId::Str(s) => Value::Str(s),
    }
  }
}

impl From<i64> for QuestionId {
  fn from(i: i64) -> Self {
    QuestionId::Int(i)
  }
}

impl From<i32> for QuestionId {
  fn from(i: i32) -> Self {
    QuestionId::Int(i as i64)
  }
}

impl From<&str> for QuestionId {
  fn from(s: &str) -> Self {
    QuestionId::Str(s.to_string())
  }
}

/// Result of advancing a computation by one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
  /// Suspended with an intermediate action for the client.
  Continue(Value),
  /// Finished with a final value.
  Complete(Value),
}

/// Suspended step logic owned by one session.
///
/// `advance` may block; it is only ever called from a worker thread of the
/// execution bridge, never from the connection loop.
pub trait Computation: Send + 'static {
  fn advance(&mut self, input: Option<Value>) -> Result<Step, StepError>;
}

impl<F> Computation for F
where
  F: FnMut(Option<Value>) -> Result<Step, StepError> + Send + 'static,
{
  fn advance(&mut self, input: Option<Value>) -> Result<Step, StepError> {
    self(input)
  }
}

/// Builds a fresh computation from the initialization fields of a `start`
/// request (everything except `type` and `question_id`).
pub trait SessionFactory: Send + Sync + 'static {
  fn make_session(&self, fields: &Map) -> Result<Box<dyn Computation>, StepError>;
}

impl<F> SessionFactory for F
where
  F: Fn(&Map) -> Result<Box<dyn Computation>, StepError> + Send + Sync + 'static,
{
  fn make_session(&self, fields: &Map) -> Result<Box<dyn Computation>, StepError> {
    self(fields)
  }
}

/// Reads a required string field from initialization fields.
pub fn required_str<'a>(fields: &'a Map, key: &str) -> Result<&'a str, StepError> {
  match fields.get(key) {
    Some(Value::Str(s)) => Ok(s),
    Some(other) => Err(format!("field `{}` must be a string, got {}", key, other.kind()).into()),
    None => Err(format!("missing field `{}`", key).into()),
  }
}
