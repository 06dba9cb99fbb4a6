//! Shared lifecycle state machine composed into every device variant.
//!
//! The machine is Idle until the operator presses the begin key, Started
//! until a reset key is pressed, and reports a pending reset exactly once
//! before dropping back to Idle. Reset hooks fire synchronously on the
//! listener thread when their variant is requested.

use crate::{DeviceError, ResetKind, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Begin teleoperation.
pub const BEGIN_KEY: rdev::Key = rdev::Key::KeyB;
/// Reset, episode discarded.
pub const RESET_KEY: rdev::Key = rdev::Key::KeyR;
/// Reset, episode marked successful.
pub const RESET_SUCCESS_KEY: rdev::Key = rdev::Key::KeyN;

type Hook = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct SessionState {
    started: bool,
    /// Whether the session has ever been started. Resets requested before
    /// the first start fire their hooks but are not reported as steps.
    engaged: bool,
    pending: Option<ResetKind>,
}

/// What the step gate resolved to for this control tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Gate {
    NotStarted,
    Reset(ResetKind),
    Running,
}

/// Cloneable handle to one device's lifecycle state. The listener thread
/// mutates it through [`Session::handle_key`]; the control loop reads it
/// through [`Session::poll_gate`].
#[derive(Clone, Default)]
pub(crate) struct Session {
    state: Arc<Mutex<SessionState>>,
    hooks: Arc<Mutex<HashMap<ResetKind, Hook>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> bool {
        self.state.lock().map(|s| s.started).unwrap_or(false)
    }

    pub fn begin(&self) {
        if let Ok(mut state) = self.state.lock() {
            if !state.started {
                info!("teleoperation started");
            }
            state.started = true;
            state.engaged = true;
            state.pending = None;
        }
    }

    pub fn request_reset(&self, kind: ResetKind) {
        if let Ok(mut state) = self.state.lock() {
            state.started = false;
            state.pending = Some(kind);
        }
        info!(kind = ?kind, "reset requested");
        if let Ok(mut hooks) = self.hooks.lock() {
            if let Some(hook) = hooks.get_mut(&kind) {
                hook();
            }
        }
    }

    /// Interpret a control keypress. Returns true when the key was one of
    /// the session keys.
    pub fn handle_key(&self, key: rdev::Key) -> bool {
        match key {
            k if k == BEGIN_KEY => {
                self.begin();
                true
            }
            k if k == RESET_KEY => {
                self.request_reset(ResetKind::Failure);
                true
            }
            k if k == RESET_SUCCESS_KEY => {
                self.request_reset(ResetKind::Success);
                true
            }
            _ => false,
        }
    }

    pub fn register_hook(&self, kind: ResetKind, hook: Hook) {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.insert(kind, hook);
        }
    }

    /// Resolve the gate for this step. A pending reset is consumed here, so
    /// it is reported exactly once.
    pub fn poll_gate(&self) -> Result<Gate> {
        let mut state = self.state.lock().map_err(|_| DeviceError::PoisonedLock)?;
        if let Some(kind) = state.pending.take() {
            if state.engaged {
                debug!(kind = ?kind, "reporting reset step");
                return Ok(Gate::Reset(kind));
            }
        }
        if !state.started {
            return Ok(Gate::NotStarted);
        }
        Ok(Gate::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_gate_is_sentinel_before_start() {
        let session = Session::new();
        assert_eq!(session.poll_gate().unwrap(), Gate::NotStarted);
        assert_eq!(session.poll_gate().unwrap(), Gate::NotStarted);
    }

    #[test]
    fn test_begin_then_running() {
        let session = Session::new();
        assert!(session.handle_key(BEGIN_KEY));
        assert!(session.started());
        assert_eq!(session.poll_gate().unwrap(), Gate::Running);
    }

    #[test]
    fn test_reset_reported_exactly_once() {
        let session = Session::new();
        session.begin();
        session.request_reset(ResetKind::Failure);
        assert_eq!(session.poll_gate().unwrap(), Gate::Reset(ResetKind::Failure));
        // Consumed: back to the sentinel until the next begin.
        assert_eq!(session.poll_gate().unwrap(), Gate::NotStarted);
        session.begin();
        assert_eq!(session.poll_gate().unwrap(), Gate::Running);
    }

    #[test]
    fn test_reset_before_first_start_stays_sentinel() {
        let session = Session::new();
        session.request_reset(ResetKind::Success);
        assert_eq!(session.poll_gate().unwrap(), Gate::NotStarted);
    }

    #[test]
    fn test_hooks_fire_for_their_variant_only() {
        let session = Session::new();
        let failures = Arc::new(AtomicUsize::new(0));
        let successes = Arc::new(AtomicUsize::new(0));
        let f = failures.clone();
        session.register_hook(ResetKind::Failure, Box::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        let s = successes.clone();
        session.register_hook(ResetKind::Success, Box::new(move || {
            s.fetch_add(1, Ordering::SeqCst);
        }));

        session.begin();
        session.handle_key(RESET_KEY);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(successes.load(Ordering::SeqCst), 0);

        session.begin();
        session.handle_key(RESET_SUCCESS_KEY);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unrelated_keys_are_ignored() {
        let session = Session::new();
        assert!(!session.handle_key(rdev::Key::KeyZ));
        assert_eq!(session.poll_gate().unwrap(), Gate::NotStarted);
    }
}
