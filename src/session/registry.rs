use super::{Computation, QuestionId};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;

/// Logical conflicts reported back to the client as ordinary error replies.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
  #[error("Task already running")]
  AlreadyRunning,
  #[error("Task not found")]
  NotFound,
  /// The session exists but another connection is advancing it right now.
  #[error("Task busy")]
  Busy,
}

/// A parked session: its computation plus bookkeeping.
pub struct Session {
  id: QuestionId,
  epoch: u64,
  computation: Box<dyn Computation>,
  created_at: Instant,
  steps: u64,
}

impl Session {
  pub fn id(&self) -> &QuestionId {
    &self.id
  }

  /// Registry generation of this session. A new session for the same id
  /// always gets a larger epoch.
  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  /// Number of completed steps, including the initial one.
  pub fn steps(&self) -> u64 {
    self.steps
  }

  pub fn created_at(&self) -> Instant {
    self.created_at
  }

  pub fn record_step(&mut self) {
    self.steps += 1;
  }

  pub fn computation_mut(&mut self) -> &mut dyn Computation {
    self.computation.as_mut()
  }

  /// Splits the session so the computation can move onto a worker thread.
  pub fn into_parts(self) -> (SessionTicket, Box<dyn Computation>) {
    (
      SessionTicket {
        id: self.id,
        epoch: self.epoch,
        created_at: self.created_at,
        steps: self.steps,
      },
      self.computation,
    )
  }
}

impl fmt::Debug for Session {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Session")
      .field("id", &self.id)
      .field("epoch", &self.epoch)
      .field("steps", &self.steps)
      .finish_non_exhaustive()
  }
}

/// Everything about a checked-out session except its computation.
#[derive(Debug, Clone)]
pub struct SessionTicket {
  id: QuestionId,
  epoch: u64,
  created_at: Instant,
  steps: u64,
}

impl SessionTicket {
  pub fn id(&self) -> &QuestionId {
    &self.id
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  pub fn steps(&self) -> u64 {
    self.steps
  }

  /// Reassembles the session after a step.
  pub fn rejoin(self, computation: Box<dyn Computation>) -> Session {
    Session {
      id: self.id,
      epoch: self.epoch,
      computation,
      created_at: self.created_at,
      steps: self.steps,
    }
  }
}

enum Slot {
  /// Suspended between steps.
  Parked(Session),
  /// Claimed by a step in flight (or a start being initialized).
  Running { epoch: u64 },
}

impl Slot {
  fn epoch(&self) -> u64 {
    match self {
      Slot::Parked(session) => session.epoch,
      Slot::Running { epoch } => *epoch,
    }
  }
}

/// Maps question ids to their sessions.
///
/// An id is occupied from the moment a `start` reserves it until the session
/// is removed, including while a step is executing, so at most one session
/// per id exists at any time. Epochs make every removal and restore
/// conditional on still talking about the same session.
pub struct SessionRegistry {
  slots: Mutex<HashMap<QuestionId, Slot>>,
  next_epoch: AtomicU64,
}

impl Default for SessionRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for SessionRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SessionRegistry").field("len", &self.len()).finish()
  }
}

impl SessionRegistry {
  pub fn new() -> Self {
    Self {
      slots: Mutex::new(HashMap::new()),
      next_epoch: AtomicU64::new(1),
    }
  }

  fn next_epoch(&self) -> u64 {
    self.next_epoch.fetch_add(1, Ordering::Relaxed)
  }

  /// Registers a ready computation under `id`. Never overwrites.
  pub fn create(&self, id: QuestionId, computation: Box<dyn Computation>) -> Result<u64, RegistryError> {
    let mut slots = self.slots.lock();
    if slots.contains_key(&id) {
      return Err(RegistryError::AlreadyRunning);
    }
    let epoch = self.next_epoch();
    let session = Session {
      id: id.clone(),
      epoch,
      computation,
      created_at: Instant::now(),
      steps: 0,
    };
    slots.insert(id, Slot::Parked(session));
    Ok(epoch)
  }

  /// Claims `id` for a session that is still being initialized.
  /// The returned ticket is turned into a session with [`SessionTicket::rejoin`]
  /// and parked with [`SessionRegistry::restore`], or dropped with
  /// [`SessionRegistry::release`].
  pub fn reserve(&self, id: QuestionId) -> Result<SessionTicket, RegistryError> {
    let mut slots = self.slots.lock();
    if slots.contains_key(&id) {
      return Err(RegistryError::AlreadyRunning);
    }
    let epoch = self.next_epoch();
    slots.insert(id.clone(), Slot::Running { epoch });
    tracing::trace!(question_id = %id, epoch, "Session id reserved");
    Ok(SessionTicket {
      id,
      epoch,
      created_at: Instant::now(),
      steps: 0,
    })
  }

  /// Takes the parked session out for one step. The id stays occupied.
  pub fn checkout(&self, id: &QuestionId) -> Result<Session, RegistryError> {
    let mut slots = self.slots.lock();
    let slot = slots.get_mut(id).ok_or(RegistryError::NotFound)?;
    let epoch = match &*slot {
      Slot::Running { .. } => return Err(RegistryError::Busy),
      Slot::Parked(session) => session.epoch,
    };
    match std::mem::replace(slot, Slot::Running { epoch }) {
      Slot::Parked(session) => Ok(session),
      Slot::Running { .. } => Err(RegistryError::Busy),
    }
  }

  /// Same as [`SessionRegistry::checkout`]: this is a claim, not a peek.
  ///
  /// The slot stays `Busy` until the session is handed back with
  /// [`SessionRegistry::restore`] or its epoch is dropped with
  /// [`SessionRegistry::release`]. Dropping the returned session without
  /// either leaves the id occupied. Use [`SessionRegistry::contains`] to test
  /// for presence.
  #[must_use = "the id stays busy until the session is restored or released"]
  pub fn get(&self, id: &QuestionId) -> Result<Session, RegistryError> {
    self.checkout(id)
  }

  /// Parks a session after a step. Returns `false`, dropping the session,
  /// if its slot was removed or now belongs to a different epoch.
  pub fn restore(&self, session: Session) -> bool {
    let mut slots = self.slots.lock();
    let current = matches!(slots.get(&session.id), Some(Slot::Running { epoch }) if *epoch == session.epoch);
    if current {
      slots.insert(session.id.clone(), Slot::Parked(session));
      true
    } else {
      tracing::debug!(question_id = %session.id, epoch = session.epoch, "Discarding stale session");
      false
    }
  }

  /// Removes `id` only if it still holds `epoch`. Returns whether it did.
  pub fn release(&self, id: &QuestionId, epoch: u64) -> bool {
    let mut slots = self.slots.lock();
    let current = slots.get(id).is_some_and(|slot| slot.epoch() == epoch);
    if current {
      slots.remove(id);
    }
    current
  }

  /// Removes `id` unconditionally. Absent ids are ignored.
  pub fn remove(&self, id: &QuestionId) {
    self.slots.lock().remove(id);
  }

  pub fn contains(&self, id: &QuestionId) -> bool {
    self.slots.lock().contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.slots.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.lock().is_empty()
  }

  /// Snapshot of occupied ids, sorted.
  pub fn ids(&self) -> Vec<QuestionId> {
    let mut ids: Vec<_> = self.slots.lock().keys().cloned().collect();
    ids.sort();
    ids
  }
}
