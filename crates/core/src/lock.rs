//! Edge-triggered lock state.

use serde::{Deserialize, Serialize};

use crate::installation::{InstallState, InstallationStatus};

/// Payload for the locked screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockReason {
    pub reason: String,
    pub contact_info: Option<String>,
}

impl LockReason {
    pub const DEFAULT_REASON: &'static str = "This installation has been deactivated.";

    pub fn from_status(status: &InstallationStatus) -> Self {
        Self {
            reason: status
                .reason
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| Self::DEFAULT_REASON.to_string()),
            contact_info: status.contact_info.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LockState {
    #[default]
    Unlocked,
    Locked(LockReason),
}

/// A change of lock state. Only produced on an actual edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockTransition {
    Lock(LockReason),
    Unlock,
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked(_))
    }

    /// Compare a poll result against the current state.
    ///
    /// `Unknown` never causes a transition; a repeated `deactivated` while
    /// already locked is not a new edge even if the reason text changed.
    pub fn observe(&self, status: &InstallationStatus) -> Option<LockTransition> {
        match (self, status.status) {
            (LockState::Unlocked, InstallState::Deactivated) => {
                Some(LockTransition::Lock(LockReason::from_status(status)))
            }
            (LockState::Locked(_), InstallState::Active) => Some(LockTransition::Unlock),
            _ => None,
        }
    }

    pub fn apply(&mut self, transition: &LockTransition) {
        *self = match transition {
            LockTransition::Lock(reason) => LockState::Locked(reason.clone()),
            LockTransition::Unlock => LockState::Unlocked,
        };
    }

    /// Lock state implied by a single observation, ignoring history.
    pub fn derive(status: &InstallationStatus) -> Self {
        match status.status {
            InstallState::Deactivated => LockState::Locked(LockReason::from_status(status)),
            _ => LockState::Unlocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SystemId;

    fn status(state: InstallState) -> InstallationStatus {
        InstallationStatus::new(SystemId::new("PH-1").unwrap(), state)
    }

    #[test]
    fn lock_then_unlock() {
        let mut lock = LockState::default();
        let t = lock.observe(&status(InstallState::Deactivated)).unwrap();
        assert!(matches!(t, LockTransition::Lock(_)));
        lock.apply(&t);
        assert!(lock.is_locked());

        assert_eq!(lock.observe(&status(InstallState::Deactivated)), None);
        assert_eq!(lock.observe(&status(InstallState::Unknown)), None);

        let t = lock.observe(&status(InstallState::Active)).unwrap();
        assert_eq!(t, LockTransition::Unlock);
        lock.apply(&t);
        assert_eq!(lock, LockState::Unlocked);
    }

    #[test]
    fn reason_falls_back_to_default() {
        let mut s = status(InstallState::Deactivated);
        s.reason = Some("  ".to_string());
        s.contact_info = Some("support@example.com".to_string());
        let reason = LockReason::from_status(&s);
        assert_eq!(reason.reason, LockReason::DEFAULT_REASON);
        assert_eq!(reason.contact_info.as_deref(), Some("support@example.com"));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_state() -> impl Strategy<Value = InstallState> {
            prop_oneof![
                Just(InstallState::Active),
                Just(InstallState::Deactivated),
                Just(InstallState::Unknown),
            ]
        }

        proptest! {
            /// Property: a Lock edge fires exactly when the sequence moves from
            /// a non-locked state into `deactivated`.
            #[test]
            fn lock_fires_only_on_edges(seq in proptest::collection::vec(any_state(), 0..40)) {
                let mut lock = LockState::default();
                let mut locked = false;
                for state in seq {
                    let t = lock.observe(&status(state));
                    let expect_lock = !locked && state == InstallState::Deactivated;
                    let expect_unlock = locked && state == InstallState::Active;
                    prop_assert_eq!(matches!(t, Some(LockTransition::Lock(_))), expect_lock);
                    prop_assert_eq!(matches!(t, Some(LockTransition::Unlock)), expect_unlock);
                    if let Some(t) = t {
                        lock.apply(&t);
                    }
                    if expect_lock { locked = true; }
                    if expect_unlock { locked = false; }
                    prop_assert_eq!(lock.is_locked(), locked);
                }
            }
        }
    }
}
