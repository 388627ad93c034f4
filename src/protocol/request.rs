use super::{KEY_QUESTION_ID, KEY_RESPONSE, KEY_TYPE, TYPE_CONTINUE, TYPE_START};
use crate::error::JudgeError;
use crate::message::{Map, Value};
use crate::session::QuestionId;

/// A validated client request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
  /// Begin a session. `fields` holds every initialization field of the
  /// request except `type` and `question_id`.
  Start { question_id: QuestionId, fields: Map },
  /// Resume a session with the client's answer to the last action.
  Continue { question_id: QuestionId, response: Value },
}

impl Request {
  pub fn question_id(&self) -> &QuestionId {
    match self {
      Request::Start { question_id, .. } | Request::Continue { question_id, .. } => question_id,
    }
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Request::Start { .. } => TYPE_START,
      Request::Continue { .. } => TYPE_CONTINUE,
    }
  }

  /// Validates a decoded payload.
  ///
  /// Any shape error is a protocol fault: the peer is not speaking this
  /// protocol and the connection cannot continue.
  pub fn from_value(value: Value) -> Result<Self, JudgeError> {
    let kind = value.kind();
    let mut map = value
      .into_map()
      .ok_or_else(|| JudgeError::ProtocolViolation(format!("request must be a map, got {}", kind)))?;

    let type_name = match map.remove(KEY_TYPE) {
      Some(Value::Str(s)) => s,
      Some(other) => {
        return Err(JudgeError::ProtocolViolation(format!(
          "request `{}` must be a string, got {}",
          KEY_TYPE,
          other.kind()
        )))
      }
      None => return Err(JudgeError::ProtocolViolation(format!("request has no `{}`", KEY_TYPE))),
    };

    match type_name.as_str() {
      TYPE_START => {
        let question_id = take_question_id(&mut map)?;
        Ok(Request::Start { question_id, fields: map })
      }
      TYPE_CONTINUE => {
        let question_id = take_question_id(&mut map)?;
        let response = map.remove(KEY_RESPONSE).ok_or_else(|| {
          JudgeError::ProtocolViolation(format!("`{}` request has no `{}`", TYPE_CONTINUE, KEY_RESPONSE))
        })?;
        Ok(Request::Continue { question_id, response })
      }
      _ => Err(JudgeError::UnknownRequestType(type_name)),
    }
  }

  /// Renders the request as the map a client puts on the wire.
  pub fn into_value(self) -> Value {
    match self {
      Request::Start { question_id, mut fields } => {
        fields.insert(KEY_TYPE.to_string(), TYPE_START.into());
        fields.insert(KEY_QUESTION_ID.to_string(), question_id.into());
        Value::Map(fields)
      }
      Request::Continue { question_id, response } => Value::map()
        .with(KEY_TYPE, TYPE_CONTINUE)
        .with(KEY_QUESTION_ID, question_id)
        .with(KEY_RESPONSE, response),
    }
  }
}

fn take_question_id(map: &mut Map) -> Result<QuestionId, JudgeError> {
  let raw = map
    .remove(KEY_QUESTION_ID)
    .ok_or_else(|| JudgeError::ProtocolViolation(format!("request has no `{}`", KEY_QUESTION_ID)))?;
  QuestionId::try_from(raw)
}
