//! The lazy singleton guard.
//!
//! A [`LazyCell`] runs its factory at most once, on first access, and then
//! hands every caller the same outcome. Success and failure are both cached:
//! a failed construction is replayed, never retried.
//!
//! Readers take a lock-free fast path once the outcome is stored. Until then
//! callers serialize on a per-cell re-entrant mutex. The first holder takes
//! the [`Invoker`] out of the cell, so a nested request from the same thread
//! finds it missing and fails with [`ConstructionError::Reentrant`] instead
//! of deadlocking.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use parking_lot::ReentrantMutex;

use crate::error::ConstructionError;
use crate::key::Key;
use crate::runtime::Invoker;
use crate::service::Instance;

const UNINITIALIZED: u8 = 0;
const COMPUTING: u8 = 1;
const READY: u8 = 2;
const FAILED: u8 = 3;

/// Observable state of a lazy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LazyState {
    /// Nobody has asked for the value yet.
    Uninitialized,
    /// The factory is running.
    Computing,
    /// The value is stored.
    Ready,
    /// The factory failed; the error is stored.
    Failed,
}

pub(crate) struct LazyCell {
    key: Key,
    outcome: OnceLock<Result<Instance, ConstructionError>>,
    state: AtomicU8,
    guard: ReentrantMutex<RefCell<Option<Invoker>>>,
}

impl LazyCell {
    pub(crate) fn new(key: Key, invoker: Invoker) -> Self {
        Self {
            key,
            outcome: OnceLock::new(),
            state: AtomicU8::new(UNINITIALIZED),
            guard: ReentrantMutex::new(RefCell::new(Some(invoker))),
        }
    }

    pub(crate) fn state(&self) -> LazyState {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => LazyState::Uninitialized,
            COMPUTING => LazyState::Computing,
            READY => LazyState::Ready,
            _ => LazyState::Failed,
        }
    }

    pub(crate) fn get(&self) -> Result<Instance, ConstructionError> {
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }

        let guard = self.guard.lock();
        if let Some(outcome) = self.outcome.get() {
            return outcome.clone();
        }

        // Only the same thread can get here with the invoker already taken.
        let Some(invoker) = guard.borrow_mut().take() else {
            return Err(ConstructionError::Reentrant {
                key: self.key.clone(),
            });
        };

        self.state.store(COMPUTING, Ordering::Release);
        let panic_guard = PanicGuard { cell: self };
        let outcome = invoker.invoke();
        core::mem::forget(panic_guard);
        drop(invoker);

        match &outcome {
            Ok(_) => tracing::debug!(key = %self.key, "lazy service constructed"),
            Err(error) => tracing::debug!(key = %self.key, %error, "lazy service failed, caching error"),
        }
        self.store(outcome)
    }

    fn store(&self, outcome: Result<Instance, ConstructionError>) -> Result<Instance, ConstructionError> {
        let state = if outcome.is_ok() { READY } else { FAILED };
        let stored = self.outcome.get_or_init(|| outcome).clone();
        self.state.store(state, Ordering::Release);
        stored
    }
}

/// Stores [`ConstructionError::Panicked`] if the factory unwinds.
struct PanicGuard<'a> {
    cell: &'a LazyCell,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        let _ = self.cell.store(Err(ConstructionError::Panicked {
            key: self.cell.key.clone(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{Factory, IntoFactory, IntoTryFactory};
    use core::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn cell(factory: Arc<dyn Factory>) -> LazyCell {
        let key = Key::of::<u32>();
        LazyCell::new(key.clone(), Invoker::new(key, factory, Vec::new()))
    }

    #[test]
    fn constructs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy = cell(IntoFactory::into_factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            42u32
        }));

        assert_eq!(lazy.state(), LazyState::Uninitialized);
        let first = lazy.get().unwrap();
        let second = lazy.get().unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), LazyState::Ready);
    }

    #[test]
    fn failure_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy = cell(IntoTryFactory::into_factory(move || -> Result<u32, String> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("unavailable".to_string())
        }));

        let first = lazy.get().unwrap_err();
        let second = lazy.get().unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), LazyState::Failed);
    }

    #[test]
    fn panic_is_cached() {
        let lazy = cell(IntoFactory::into_factory(|| -> u32 { panic!("factory exploded") }));

        let caught = std::panic::catch_unwind(core::panic::AssertUnwindSafe(|| lazy.get()));
        assert!(caught.is_err());
        assert_eq!(lazy.state(), LazyState::Failed);
        assert!(matches!(lazy.get(), Err(ConstructionError::Panicked { .. })));
    }
}
