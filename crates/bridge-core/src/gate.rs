use bridge_protocol::RequestId;
use parking_lot::Mutex;

/// Single-slot exclusive lock keyed by `request_id` (spec §4.4). No
/// queueing: a `chat_start` arriving while the slot is held is rejected,
/// not buffered.
///
/// `release` is a no-op unless the caller's id matches the current holder,
/// so a disorderly shutdown path can call it unconditionally without
/// clobbering a different request that acquired in the meantime.
pub struct Gate {
    slot: Mutex<Option<RequestId>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Attempt to take the slot for `id`. Returns `true` on success.
    pub fn acquire(&self, id: RequestId) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(id);
        true
    }

    /// Clear the slot, but only if it currently holds exactly `id`.
    pub fn release(&self, id: &str) {
        let mut slot = self.slot.lock();
        if slot.as_deref() == Some(id) {
            *slot = None;
        }
    }

    pub fn active(&self) -> Option<RequestId> {
        self.slot.lock().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Unconditionally clear the slot. Reserved for supervised shutdown.
    pub fn force_release(&self) {
        *self.slot.lock() = None;
    }
}
