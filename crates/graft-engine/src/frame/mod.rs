//! Per-surface frame state machine.

mod controller;

pub use controller::FrameController;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A session as shared between its owner, the host's frame hooks and
/// deferred cleanup jobs.
pub type SharedSession = Arc<Mutex<FrameController>>;

pub fn share(controller: FrameController) -> SharedSession {
    Arc::new(Mutex::new(controller))
}

/// Locks a session for one host callback.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, FrameController> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
