use crate::{Result, ServoLink};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// In-process mock transport. Replies are scripted ahead of time and served
/// byte-by-byte; everything transmitted is recorded for assertions.
#[derive(Default)]
pub struct MockLink {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    sent: Vec<Vec<u8>>,
    pending: VecDeque<u8>,
}

/// Assertion-side handle onto a [`MockLink`]'s recorded traffic.
#[derive(Clone)]
pub struct MockTap {
    inner: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply that later `receive` calls will consume.
    pub fn push_reply(&self, bytes: &[u8]) {
        if let Ok(mut state) = self.inner.lock() {
            state.pending.extend(bytes.iter().copied());
        }
    }

    /// Handle for inspecting sent packets after the link has been moved
    /// into a bus.
    pub fn tap(&self) -> MockTap {
        MockTap {
            inner: self.inner.clone(),
        }
    }
}

impl MockTap {
    /// All packets transmitted so far, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.lock().map(|s| s.sent.clone()).unwrap_or_default()
    }

    /// Queue a reply from the assertion side (e.g. between bus calls).
    pub fn push_reply(&self, bytes: &[u8]) {
        if let Ok(mut state) = self.inner.lock() {
            state.pending.extend(bytes.iter().copied());
        }
    }
}

impl ServoLink for MockLink {
    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        if let Ok(mut state) = self.inner.lock() {
            state.sent.push(bytes.to_vec());
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| crate::ServoError::Io("mock link poisoned".to_string()))?;
        for slot in buf.iter_mut() {
            *slot = state.pending.pop_front().ok_or(crate::ServoError::Timeout)?;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        Ok(())
    }
}
