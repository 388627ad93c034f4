use crate::message::{Map, Value};
use crate::protocol::{Request, Response};
use crate::runtime::ExecutionBridge;
use crate::session::{Computation, QuestionId, RegistryError, SessionFactory, SessionRegistry, Step, StepError};

use std::sync::Arc;

/// Interprets requests against the registry and drives steps through the bridge.
///
/// The dispatcher is the only component that mutates the registry. Each
/// request yields exactly one [`Response`]; session-level problems (conflicts,
/// step failures, timeouts) are ordinary error responses.
pub struct Dispatcher {
  registry: Arc<SessionRegistry>,
  bridge: ExecutionBridge,
  factory: Arc<dyn SessionFactory>,
}

impl std::fmt::Debug for Dispatcher {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Dispatcher")
      .field("registry", &self.registry)
      .field("bridge", &self.bridge)
      .finish_non_exhaustive()
  }
}

/// Clears a claimed registry slot if the request is dropped mid-step
/// (e.g. the connection task is aborted), so the id does not stay busy forever.
struct SlotGuard<'a> {
  registry: &'a SessionRegistry,
  id: &'a QuestionId,
  epoch: u64,
  waived: bool,
}

impl<'a> SlotGuard<'a> {
  fn new(registry: &'a SessionRegistry, id: &'a QuestionId, epoch: u64) -> Self {
    Self {
      registry,
      id,
      epoch,
      waived: false,
    }
  }

  fn waive(&mut self) {
    self.waived = true;
  }
}

impl Drop for SlotGuard<'_> {
  fn drop(&mut self) {
    if !self.waived && self.registry.release(self.id, self.epoch) {
      tracing::debug!(question_id = %self.id, epoch = self.epoch, "Released session abandoned mid-step");
    }
  }
}

impl Dispatcher {
  pub fn new(registry: Arc<SessionRegistry>, bridge: ExecutionBridge, factory: Arc<dyn SessionFactory>) -> Self {
    Self {
      registry,
      bridge,
      factory,
    }
  }

  pub fn registry(&self) -> &Arc<SessionRegistry> {
    &self.registry
  }

  pub fn bridge(&self) -> &ExecutionBridge {
    &self.bridge
  }

  /// Handles one request.
  ///
  /// `start` claims the id, builds the session and runs its first step:
  /// an action parks the session and is returned as `ok` with that action as
  /// `value` (no `value` when the action is null); a completion replies
  /// `done` and registers nothing. `continue` resumes a parked session with
  /// the client's response. Failures and timeouts reply `error` and leave the
  /// id free.
  pub async fn dispatch(&self, request: Request) -> Response {
    match request {
      Request::Start { question_id, fields } => self.start(question_id, fields).await,
      Request::Continue { question_id, response } => self.resume(question_id, response).await,
    }
  }

  async fn start(&self, id: QuestionId, fields: Map) -> Response {
    let ticket = match self.registry.reserve(id.clone()) {
      Ok(ticket) => ticket,
      Err(e) => {
        tracing::debug!(question_id = %id, error = %e, "Rejecting start");
        return Response::error(e.to_string());
      }
    };
    let epoch = ticket.epoch();
    let mut guard = SlotGuard::new(&self.registry, &id, epoch);

    let factory = self.factory.clone();
    let outcome = self
      .bridge
      .try_run(move || -> Result<(Box<dyn Computation>, Step), StepError> {
        let mut computation = factory.make_session(&fields)?;
        let step = computation.advance(None)?;
        Ok((computation, step))
      })
      .await;

    match outcome {
      Ok((computation, Step::Continue(action))) => {
        let mut session = ticket.rejoin(computation);
        session.record_step();
        guard.waive();
        if !self.registry.restore(session) {
          return Response::error(RegistryError::NotFound.to_string());
        }
        tracing::info!(question_id = %id, epoch, "Session started");
        Response::Ok(if action.is_null() { None } else { Some(action) })
      }
      Ok((_computation, Step::Complete(value))) => {
        tracing::info!(question_id = %id, epoch, "Session completed on its first step");
        Response::Done(value)
      }
      Err(fault) => {
        tracing::warn!(question_id = %id, epoch, error = %fault, "Session failed to start");
        Response::error(fault.to_string())
      }
    }
  }

  async fn resume(&self, id: QuestionId, response: Value) -> Response {
    let session = match self.registry.checkout(&id) {
      Ok(session) => session,
      Err(e) => {
        tracing::debug!(question_id = %id, error = %e, "Rejecting continue");
        return Response::error(e.to_string());
      }
    };
    let (ticket, mut computation) = session.into_parts();
    let epoch = ticket.epoch();
    let mut guard = SlotGuard::new(&self.registry, &id, epoch);

    let outcome = self
      .bridge
      .try_run(move || -> Result<(Box<dyn Computation>, Step), StepError> {
        let step = computation.advance(Some(response))?;
        Ok((computation, step))
      })
      .await;

    match outcome {
      Ok((computation, Step::Continue(action))) => {
        let mut session = ticket.rejoin(computation);
        session.record_step();
        tracing::debug!(question_id = %id, epoch, steps = session.steps(), "Session suspended");
        guard.waive();
        if !self.registry.restore(session) {
          return Response::error(RegistryError::NotFound.to_string());
        }
        Response::Ok(Some(action))
      }
      Ok((_computation, Step::Complete(value))) => {
        tracing::info!(question_id = %id, epoch, steps = ticket.steps() + 1, "Session completed");
        Response::Done(value)
      }
      Err(fault) => {
        tracing::warn!(question_id = %id, epoch, error = %fault, "Session failed; removing it");
        Response::error(fault.to_string())
      }
    }
  }
}
