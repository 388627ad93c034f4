// tests/judging.rs

use judgewire::judge::Limited;
use judgewire::message::{Map, Value};
use judgewire::session::baseline::FirstChoiceFactory;
use judgewire::{evaluate, JudgeError, Question, QuestionId, ResponderError, Verdict};
use std::sync::Arc;
use std::time::Duration;
mod common;

struct MultipleChoice {
  id: i64,
  question: &'static str,
  choices: Vec<&'static str>,
  correct: &'static str,
}

impl Question for MultipleChoice {
  fn id(&self) -> QuestionId {
    self.id.into()
  }

  fn start_fields(&self) -> Map {
    common::fields(&[
      ("question", self.question.into()),
      ("choices", Value::List(self.choices.iter().map(|c| Value::from(*c)).collect())),
      ("base64_frame", "iVBORw0KGgo=".into()),
    ])
  }

  fn judge(&self, answer: &Value) -> Verdict {
    if answer.as_str() == Some(self.correct) {
      Verdict::Accepted
    } else {
      Verdict::WrongAnswer(answer.clone())
    }
  }
}

/// Question answered by the scripted sessions used elsewhere in the tests.
struct Scripted {
  id: i64,
  fields: Map,
}

impl Question for Scripted {
  fn id(&self) -> QuestionId {
    self.id.into()
  }

  fn start_fields(&self) -> Map {
    self.fields.clone()
  }

  fn judge(&self, answer: &Value) -> Verdict {
    if answer == &Value::from("42") {
      Verdict::Accepted
    } else {
      Verdict::WrongAnswer(answer.clone())
    }
  }
}

fn echo(_: &Value) -> Result<Value, ResponderError> {
  Ok("seen".into())
}

#[tokio::test]
async fn test_first_choice_session_is_judged() -> Result<(), JudgeError> {
  let server = common::spawn_server_with(common::local_options(), Arc::new(FirstChoiceFactory)).await;
  let mut client = server.client().await;

  let right = MultipleChoice {
    id: 1,
    question: "What animal is in the frame?",
    choices: vec!["cat", "dog"],
    correct: "cat",
  };
  let mut asked = Vec::new();
  let mut responder = |action: &Value| -> Result<Value, ResponderError> {
    asked.push(action.get("question").cloned());
    Ok("a cat, probably".into())
  };
  let verdict = evaluate(&mut client, &right, &mut responder).await?;
  assert_eq!(verdict, Verdict::Accepted);
  assert_eq!(asked, vec![Some(Value::from("What animal is in the frame?"))]);

  let wrong = MultipleChoice {
    id: 2,
    question: "Which is larger?",
    choices: vec!["mouse", "elephant"],
    correct: "elephant",
  };
  let verdict = evaluate(&mut client, &wrong, &mut echo).await?;
  assert_eq!(verdict.to_string(), "WA: mouse");
  assert!(server.registry.is_empty());
  Ok(())
}

#[tokio::test]
async fn test_bad_start_fields_are_runtime_error() -> Result<(), JudgeError> {
  let server = common::spawn_server_with(common::local_options(), Arc::new(FirstChoiceFactory)).await;
  let mut client = server.client().await;

  let empty = MultipleChoice {
    id: 3,
    question: "Nothing to pick from",
    choices: vec![],
    correct: "",
  };
  let verdict = evaluate(&mut client, &empty, &mut echo).await?;
  assert_eq!(verdict, Verdict::RuntimeError("field `choices` must not be empty".into()));
  Ok(())
}

#[tokio::test]
async fn test_timeout_is_tle() -> Result<(), JudgeError> {
  let server = common::spawn_server().await;
  let mut client = server.client().await;

  let q = Scripted {
    id: 4,
    fields: common::fields(&[("stall_on", 2i64.into())]),
  };
  assert_eq!(evaluate(&mut client, &q, &mut echo).await?, Verdict::TimeLimitExceeded);
  Ok(())
}

#[tokio::test]
async fn test_responder_limit_is_lule() -> Result<(), JudgeError> {
  let server = common::spawn_server().await;
  let mut client = server.client().await;

  let q = Scripted {
    id: 5,
    fields: common::fields(&[("steps", 5i64.into())]),
  };
  let mut limited = Limited::new(echo, 2);
  assert_eq!(evaluate(&mut client, &q, &mut limited).await?, Verdict::UseLimitExceeded);
  // The abandoned session is still parked on the server.
  assert!(server.registry.contains(&5.into()));

  let q = Scripted {
    id: 6,
    fields: common::fields(&[("steps", 2i64.into())]),
  };
  let mut limited = Limited::new(echo, 2);
  assert_eq!(evaluate(&mut client, &q, &mut limited).await?, Verdict::Accepted);
  Ok(())
}

#[tokio::test]
async fn test_evaluate_reports_transport_loss() {
  let server = common::spawn_server().await;
  let mut client = server.client().await;
  let addr = server.addr;
  drop(server);
  tokio::time::sleep(Duration::from_millis(200)).await;

  let q = Scripted {
    id: 7,
    fields: Map::new(),
  };
  let result = evaluate(&mut client, &q, &mut echo).await;
  assert!(result.is_err(), "expected transport error against stopped server at {}", addr);
}
