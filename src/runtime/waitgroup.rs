// src/runtime/waitgroup.rs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Counts live connection tasks so shutdown can wait for them to drain.
///
/// Each task holds a [`WaitGroupGuard`]; dropping the guard (on any exit
/// path, including panics) decrements the count.
#[derive(Debug, Clone, Default)]
pub struct WaitGroup {
  count: Arc<AtomicUsize>,
  notify_on_zero: Arc<Notify>,
}

impl WaitGroup {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers one task and returns its guard.
  pub fn enter(&self) -> WaitGroupGuard {
    self.count.fetch_add(1, Ordering::AcqRel);
    WaitGroupGuard { group: self.clone() }
  }

  fn done(&self) {
    if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
      self.notify_on_zero.notify_waiters();
      tracing::trace!("WaitGroup count reached zero, notifying waiters");
    }
  }

  /// Waits until every guard has been dropped.
  pub async fn wait(&self) {
    loop {
      // Register interest before checking so a concurrent `done` cannot slip between.
      let notified = self.notify_on_zero.notified();
      if self.count.load(Ordering::Acquire) == 0 {
        return;
      }
      notified.await;
    }
  }

  pub fn get_count(&self) -> usize {
    self.count.load(Ordering::Relaxed)
  }
}

/// Membership in a [`WaitGroup`]; see [`WaitGroup::enter`].
#[derive(Debug)]
pub struct WaitGroupGuard {
  group: WaitGroup,
}

impl Drop for WaitGroupGuard {
  fn drop(&mut self) {
    self.group.done();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tokio::time::timeout;

  #[tokio::test]
  async fn wait_on_zero_returns_immediately() {
    let wg = WaitGroup::new();
    assert!(timeout(Duration::from_millis(10), wg.wait()).await.is_ok());
  }

  #[tokio::test]
  async fn wait_blocks_until_all_guards_drop() {
    let wg = WaitGroup::new();
    let g1 = wg.enter();
    let g2 = wg.enter();
    assert_eq!(wg.get_count(), 2);

    let wg_wait = wg.clone();
    let mut wait_task = tokio::spawn(async move { wg_wait.wait().await });

    drop(g1);
    assert!(
      timeout(Duration::from_millis(20), &mut wait_task).await.is_err(),
      "Wait task should still be blocked after one guard dropped"
    );

    drop(g2);
    assert!(timeout(Duration::from_millis(100), wait_task).await.is_ok());
    assert_eq!(wg.get_count(), 0);
  }

  #[tokio::test]
  async fn guard_released_when_task_panics() {
    let wg = WaitGroup::new();
    let guard = wg.enter();
    let handle = tokio::spawn(async move {
      let _guard = guard;
      panic!("connection task died");
    });
    assert!(handle.await.is_err());
    assert_eq!(wg.get_count(), 0);
  }
}
