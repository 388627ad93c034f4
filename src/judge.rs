//! Judge-side model: questions, verdicts, and a driver that runs one
//! question against a server.

use crate::client::JudgeClient;
use crate::error::JudgeError;
use crate::message::{Map, Value};
use crate::protocol::Response;
use crate::runtime::StepFault;
use crate::session::QuestionId;

use std::fmt;
use thiserror::Error;

/// Outcome of evaluating one question.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
  Accepted,
  /// The session finished with this (incorrect) answer.
  WrongAnswer(Value),
  /// The session failed; carries the server's description.
  RuntimeError(String),
  TimeLimitExceeded,
  /// The responder refused to answer any more actions.
  UseLimitExceeded,
}

impl Verdict {
  pub fn accepted(&self) -> bool {
    matches!(self, Verdict::Accepted)
  }
}

impl fmt::Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Verdict::Accepted => f.write_str("AC"),
      Verdict::WrongAnswer(answer) => write!(f, "WA: {}", answer),
      Verdict::RuntimeError(error) => write!(f, "RE: {}", error),
      Verdict::TimeLimitExceeded => f.write_str("TLE"),
      Verdict::UseLimitExceeded => f.write_str("LULE"),
    }
  }
}

/// A single test case.
pub trait Question {
  fn id(&self) -> QuestionId;
  /// Extra fields sent with the `start` request.
  fn start_fields(&self) -> Map;
  fn judge(&self, answer: &Value) -> Verdict;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponderError {
  #[error("use limit exceeded")]
  UseLimitExceeded,
  #[error("{0}")]
  Failed(String),
}

/// Answers the intermediate actions a session emits.
pub trait Responder {
  fn respond(&mut self, action: &Value) -> Result<Value, ResponderError>;
}

impl<F> Responder for F
where
  F: FnMut(&Value) -> Result<Value, ResponderError>,
{
  fn respond(&mut self, action: &Value) -> Result<Value, ResponderError> {
    self(action)
  }
}

/// Wraps a responder so it answers at most `limit` actions.
#[derive(Debug)]
pub struct Limited<R> {
  inner: R,
  remaining: usize,
}

impl<R: Responder> Limited<R> {
  pub fn new(inner: R, limit: usize) -> Self {
    Self { inner, remaining: limit }
  }

  pub fn remaining(&self) -> usize {
    self.remaining
  }
}

impl<R: Responder> Responder for Limited<R> {
  fn respond(&mut self, action: &Value) -> Result<Value, ResponderError> {
    if self.remaining == 0 {
      return Err(ResponderError::UseLimitExceeded);
    }
    self.remaining -= 1;
    self.inner.respond(action)
  }
}

// The server reserves `TIMEOUT_PREFIX` for real step timeouts.
fn fault_verdict(exception: String) -> Verdict {
  if exception.starts_with(StepFault::TIMEOUT_PREFIX) {
    Verdict::TimeLimitExceeded
  } else {
    Verdict::RuntimeError(exception)
  }
}

/// Drives `question` to a verdict over `client`.
///
/// Transport failures are returned as errors; everything the server reports
/// becomes a verdict. When the responder gives up the session is left on the
/// server, so the question id stays occupied for the life of that session.
pub async fn evaluate<Q, R>(client: &mut JudgeClient, question: &Q, responder: &mut R) -> Result<Verdict, JudgeError>
where
  Q: Question + ?Sized,
  R: Responder + ?Sized,
{
  let id = question.id();
  let mut reply = client.start(id.clone(), question.start_fields()).await?;
  let mut rounds: u64 = 0;

  let verdict = loop {
    match reply {
      Response::Ok(action) => {
        let action = action.unwrap_or_default();
        let answer = match responder.respond(&action) {
          Ok(answer) => answer,
          Err(ResponderError::UseLimitExceeded) => break Verdict::UseLimitExceeded,
          Err(ResponderError::Failed(msg)) => break Verdict::RuntimeError(msg),
        };
        rounds += 1;
        reply = client.resume(id.clone(), answer).await?;
      }
      Response::Done(answer) => break question.judge(&answer),
      Response::Error(exception) => break fault_verdict(exception),
    }
  };

  tracing::info!(question_id = %id, rounds, verdict = %verdict, "Question evaluated");
  Ok(verdict)
}
