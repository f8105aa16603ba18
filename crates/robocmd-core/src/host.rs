//! Host state oracle: is the robot enabled?
//!
//! Top-level commands cancel themselves while the host reports disabled,
//! unless they were marked to run when disabled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Answers whether the robot is currently disabled.
pub trait HostState: Send {
    fn is_disabled(&self) -> bool;

    fn is_enabled(&self) -> bool {
        !self.is_disabled()
    }
}

/// A host that is never disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysEnabled;

impl HostState for AlwaysEnabled {
    fn is_disabled(&self) -> bool {
        false
    }
}

/// Host state backed by a shared flag, starting enabled.
///
/// Clones share the flag; the driver-station side of the host keeps one
/// copy and flips it while the scheduler holds the other.
#[derive(Debug, Clone, Default)]
pub struct SharedHostState {
    disabled: Arc<AtomicBool>,
}

impl SharedHostState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::SeqCst);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.set_disabled(!enabled);
    }
}

impl HostState for SharedHostState {
    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_enabled_is_enabled() {
        assert!(AlwaysEnabled.is_enabled());
        assert!(!AlwaysEnabled.is_disabled());
    }

    #[test]
    fn shared_state_flips_across_clones() {
        let host = SharedHostState::new();
        let view = host.clone();
        assert!(view.is_enabled());
        host.set_disabled(true);
        assert!(view.is_disabled());
        host.set_enabled(true);
        assert!(view.is_enabled());
    }
}
