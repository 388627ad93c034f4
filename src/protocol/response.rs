use super::{KEY_EXCEPTION, KEY_STATUS, KEY_VALUE, STATUS_DONE, STATUS_ERROR, STATUS_OK};
use crate::error::JudgeError;
use crate::message::Value;

/// A reply to exactly one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
  /// Request accepted. Carries the session's next action when there is one.
  Ok(Option<Value>),
  /// Session finished with a final value and has been removed.
  Done(Value),
  /// Request rejected or the step failed.
  Error(String),
}

impl Response {
  pub fn error(exception: impl Into<String>) -> Self {
    Response::Error(exception.into())
  }

  pub fn status(&self) -> &'static str {
    match self {
      Response::Ok(_) => STATUS_OK,
      Response::Done(_) => STATUS_DONE,
      Response::Error(_) => STATUS_ERROR,
    }
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Response::Error(_))
  }

  pub fn into_value(self) -> Value {
    let base = Value::map().with(KEY_STATUS, self.status());
    match self {
      Response::Ok(None) => base,
      Response::Ok(Some(action)) => base.with(KEY_VALUE, action),
      Response::Done(value) => base.with(KEY_VALUE, value),
      Response::Error(exception) => base.with(KEY_EXCEPTION, exception),
    }
  }

  /// Parses a server reply; used by clients.
  pub fn from_value(value: Value) -> Result<Self, JudgeError> {
    let kind = value.kind();
    let mut map = value
      .into_map()
      .ok_or_else(|| JudgeError::ProtocolViolation(format!("response must be a map, got {}", kind)))?;
    let status = match map.remove(KEY_STATUS) {
      Some(Value::Str(s)) => s,
      _ => return Err(JudgeError::ProtocolViolation(format!("response has no string `{}`", KEY_STATUS))),
    };
    match status.as_str() {
      STATUS_OK => Ok(Response::Ok(map.remove(KEY_VALUE))),
      STATUS_DONE => Ok(Response::Done(map.remove(KEY_VALUE).unwrap_or_default())),
      STATUS_ERROR => {
        let exception = match map.remove(KEY_EXCEPTION) {
          Some(Value::Str(s)) => s,
          Some(other) => other.to_string(),
          None => String::new(),
        };
        Ok(Response::Error(exception))
      }
      other => Err(JudgeError::ProtocolViolation(format!("unknown response status `{}`", other))),
    }
  }
}
