//! Global NACM state: access mode, superuser, and the two monotonic denial
//! counters (spec.md SS3 "Access mode", SS4.5 "State machine for mode
//! changes").

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Enforcing,
    Permissive,
    Disabled,
    Off,
}

/// The CRUD/exec operation an edit or invocation is requesting, shared by
/// `nacm::engine` and `nacm::cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Create,
    Merge,
    Replace,
    Delete,
    Remove,
}

impl EditOp {
    pub fn is_delete(self) -> bool {
        matches!(self, EditOp::Delete | EditOp::Remove)
    }

    pub fn is_create(self) -> bool {
        matches!(self, EditOp::Create)
    }
}

/// The single collected piece of global mutable state the design notes
/// (spec.md SS9) call out: access mode, superuser identity, and the two
/// monotonic counters. Everything else lives in per-message/per-session
/// caches built from [`crate::nacm::config::NacmConfig`].
#[derive(Debug)]
pub struct NacmState {
    mode: std::sync::RwLock<AccessMode>,
    superuser: std::sync::RwLock<Option<String>>,
    denied_rpcs: AtomicU64,
    denied_data_writes: AtomicU64,
}

impl Default for NacmState {
    fn default() -> Self {
        NacmState {
            mode: std::sync::RwLock::new(AccessMode::Enforcing),
            superuser: std::sync::RwLock::new(None),
            denied_rpcs: AtomicU64::new(0),
            denied_data_writes: AtomicU64::new(0),
        }
    }
}

impl NacmState {
    pub fn new(mode: AccessMode, superuser: Option<String>) -> Self {
        NacmState {
            mode: std::sync::RwLock::new(mode),
            superuser: std::sync::RwLock::new(superuser),
            denied_rpcs: AtomicU64::new(0),
            denied_data_writes: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> AccessMode {
        *self.mode.read().unwrap()
    }

    pub fn superuser(&self) -> Option<String> {
        self.superuser.read().unwrap().clone()
    }

    pub fn set_superuser(&self, name: Option<String>) {
        *self.superuser.write().unwrap() = name;
    }

    pub fn is_superuser(&self, user: &str) -> bool {
        !user.is_empty() && self.superuser().as_deref().is_some_and(|su| !su.is_empty() && su == user)
    }

    /// Applies an `enable-nacm` edit per the state machine in spec.md SS4.5:
    /// MERGE/REPLACE/CREATE with `true` -> ENFORCING; the same with
    /// `false`, or DELETE/REMOVE -> DISABLED.
    pub fn apply_enable_nacm_edit(&self, op: EditOp, value: Option<bool>) {
        let mut mode = self.mode.write().unwrap();
        *mode = if op.is_delete() {
            AccessMode::Disabled
        } else {
            match value {
                Some(true) => AccessMode::Enforcing,
                _ => AccessMode::Disabled,
            }
        };
    }

    pub fn set_mode(&self, mode: AccessMode) {
        *self.mode.write().unwrap() = mode;
    }

    pub fn record_denied_rpc(&self) {
        self.denied_rpcs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied_data_write(&self) {
        self.denied_data_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn denied_rpcs(&self) -> u64 {
        self.denied_rpcs.load(Ordering::Relaxed)
    }

    pub fn denied_data_writes(&self) -> u64 {
        self.denied_data_writes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_nacm_merge_true_enforces() {
        let state = NacmState::new(AccessMode::Disabled, None);
        state.apply_enable_nacm_edit(EditOp::Merge, Some(true));
        assert_eq!(state.mode(), AccessMode::Enforcing);
    }

    #[test]
    fn enable_nacm_delete_disables() {
        let state = NacmState::new(AccessMode::Enforcing, None);
        state.apply_enable_nacm_edit(EditOp::Delete, None);
        assert_eq!(state.mode(), AccessMode::Disabled);
    }

    #[test]
    fn counters_are_monotonic() {
        let state = NacmState::default();
        state.record_denied_rpc();
        state.record_denied_rpc();
        assert_eq!(state.denied_rpcs(), 2);
    }

    #[test]
    fn empty_superuser_never_matches() {
        let state = NacmState::new(AccessMode::Enforcing, Some(String::new()));
        assert!(!state.is_superuser(""));
        assert!(!state.is_superuser("root"));
    }
}
