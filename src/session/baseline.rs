//! Baseline step logic served when no problem-specific logic is linked in.
//!
//! The session asks the client its question once and then commits to the
//! first listed choice, whatever the client answered. It exists so a bare
//! server is useful for smoke-testing a judge end to end.

use super::coroutine::Coroutine;
use super::{required_str, Computation, SessionFactory, StepError};
use crate::message::{Map, Value};

/// Field holding the question text.
pub const FIELD_QUESTION: &str = "question";
/// Field holding the candidate answers.
pub const FIELD_CHOICES: &str = "choices";
/// Optional field holding an encoded context frame.
pub const FIELD_FRAME: &str = "base64_frame";

/// Builds [`Coroutine`] sessions that answer with the first choice.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstChoiceFactory;

impl SessionFactory for FirstChoiceFactory {
  fn make_session(&self, fields: &Map) -> Result<Box<dyn Computation>, StepError> {
    let question = required_str(fields, FIELD_QUESTION)?.to_string();
    let choices = match fields.get(FIELD_CHOICES) {
      Some(Value::List(items)) if !items.is_empty() => items.clone(),
      Some(Value::List(_)) => return Err("field `choices` must not be empty".into()),
      Some(other) => return Err(format!("field `choices` must be a list, got {}", other.kind()).into()),
      None => return Err("missing field `choices`".into()),
    };
    let frame_len = match fields.get(FIELD_FRAME) {
      None | Some(Value::Null) => 0,
      Some(Value::Str(s)) => s.len(),
      Some(Value::Bytes(b)) => b.len(),
      Some(other) => {
        return Err(format!("field `{}` must be a string or bytes, got {}", FIELD_FRAME, other.kind()).into())
      }
    };
    tracing::debug!(choices = choices.len(), frame_len, "Starting first-choice session");

    let session = Coroutine::spawn("judgewire-first-choice", move |y| {
      let ask = Value::map()
        .with(FIELD_QUESTION, question)
        .with(FIELD_CHOICES, Value::List(choices.clone()));
      let _reply = y.suspend(ask)?;
      Ok(choices.into_iter().next().unwrap_or_default())
    })?;
    Ok(Box::new(session))
  }
}
