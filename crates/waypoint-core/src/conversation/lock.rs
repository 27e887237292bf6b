//! Reentrant per-conversation lock.
//!
//! While a thread holds a conversation's lock, no other thread can load or
//! save executions of that conversation. The owning thread may acquire it
//! again; each acquisition returns a guard and the lock is released when the
//! last guard drops. Acquisition blocks without a timeout.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct LockState {
    owner: Option<ThreadId>,
    holds: usize,
}

#[derive(Default)]
struct LockInner {
    state: Mutex<LockState>,
    released: Condvar,
}

/// Cloneable handle to one conversation's lock. All clones share the lock.
#[derive(Clone, Default)]
pub struct ConversationLock {
    inner: Arc<LockInner>,
}

impl ConversationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the calling thread owns the lock.
    pub fn acquire(&self) -> ConversationGuard {
        let me = thread::current().id();
        let mut state = self.inner.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.holds = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.holds += 1;
                    break;
                }
                Some(_) => self.inner.released.wait(&mut state),
            }
        }
        drop(state);
        self.guard()
    }

    /// Acquire only if no other thread holds the lock.
    pub fn try_acquire(&self) -> Option<ConversationGuard> {
        let me = thread::current().id();
        let mut state = self.inner.state.lock();
        match state.owner {
            None => {
                state.owner = Some(me);
                state.holds = 1;
            }
            Some(owner) if owner == me => state.holds += 1,
            Some(_) => return None,
        }
        drop(state);
        Some(self.guard())
    }

    pub fn is_locked(&self) -> bool {
        self.inner.state.lock().owner.is_some()
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.inner.state.lock().owner == Some(thread::current().id())
    }

    fn guard(&self) -> ConversationGuard {
        ConversationGuard {
            inner: Arc::clone(&self.inner),
            _not_send: PhantomData,
        }
    }
}

impl fmt::Debug for ConversationLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConversationLock")
            .field("locked", &state.owner.is_some())
            .field("holds", &state.holds)
            .finish()
    }
}

/// Releases one hold on drop. Bound to the acquiring thread.
#[must_use = "the conversation is unlocked as soon as the guard is dropped"]
pub struct ConversationGuard {
    inner: Arc<LockInner>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.holds = state.holds.saturating_sub(1);
        if state.holds == 0 {
            state.owner = None;
            drop(state);
            self.inner.released.notify_one();
        }
    }
}

impl fmt::Debug for ConversationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationGuard").finish_non_exhaustive()
    }
}
