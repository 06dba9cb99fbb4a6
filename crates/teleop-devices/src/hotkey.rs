//! Global key listener shared by every device variant.
//!
//! rdev's `listen` has no unsubscribe, so teardown is modeled as a detach
//! flag: once flipped, the hook ignores everything and the parked thread
//! never touches device state again. `Drop` detaches, so release happens on
//! every exit path without relying on finalizer timing.

use rdev::EventType;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

pub(crate) struct KeyListener {
    detached: Arc<AtomicBool>,
}

impl KeyListener {
    /// Spawn the hook thread. `handler` receives `(key, pressed)` for every
    /// press and release edge until the listener is detached.
    pub fn spawn<F>(handler: F) -> Self
    where
        F: Fn(rdev::Key, bool) + Send + 'static,
    {
        let detached = Arc::new(AtomicBool::new(false));
        let flag = detached.clone();
        thread::spawn(move || {
            let outcome = rdev::listen(move |event| {
                if flag.load(Ordering::Relaxed) {
                    return;
                }
                match event.event_type {
                    EventType::KeyPress(key) => handler(key, true),
                    EventType::KeyRelease(key) => handler(key, false),
                    _ => {}
                }
            });
            if let Err(e) = outcome {
                warn!(error = ?e, "keyboard hook unavailable");
            }
        });
        debug!("key listener spawned");
        Self { detached }
    }

    /// Make the hook inert. Idempotent.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Relaxed);
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        self.detach();
    }
}
