//! Copy/evict policy.
//!
//! The decision component is a pure function of object age, parameterized
//! by two optional delays. `None` disables an action; `Some(ZERO)` for the
//! copy delay means copy on every reconciliation pass.

use std::time::Duration;

use strata_core::limits;

// -----------------------------------------------------------------------------
// Action / Outcome
// -----------------------------------------------------------------------------

/// What the policy wants done with an object, before looking at tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Leave the object alone this pass.
    None,
    /// Ensure a far copy exists, keeping the near payload.
    Copy,
    /// Collapse the near payload to a link once a far copy exists.
    Evict,
}

/// Terminal result of one reconciliation pass over one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing needed doing.
    NoOp,
    /// Payload copied to the far tier; near payload kept.
    Copy,
    /// Payload copied to the far tier and near collapsed to a link.
    Move,
    /// Near collapsed to a link over an already-equal far copy.
    Link,
    /// Orphaned far copy deleted after a foreground delete.
    Remove,
}

// -----------------------------------------------------------------------------
// ReconcilePolicy
// -----------------------------------------------------------------------------

/// A reconciliation policy: scheduling delays plus the age decision.
pub trait ReconcilePolicy: Send + Sync {
    /// Policy name, as registered.
    fn name(&self) -> &'static str;

    /// Delay before a fresh mutation should be copied far, `None` when
    /// copying is disabled.
    fn copy_delay(&self) -> Option<Duration>;

    /// Delay before a copied object's near payload should be evicted,
    /// `None` when eviction is disabled.
    fn evict_delay(&self) -> Option<Duration>;

    /// Picks the action for an object of the given age.
    fn decide(&self, age: Duration) -> Action;
}

// -----------------------------------------------------------------------------
// WriteBackPolicy
// -----------------------------------------------------------------------------

/// The standard policy: copy after `copy_delay`, evict after `evict_delay`.
#[derive(Debug, Clone)]
pub struct WriteBackPolicy {
    copy_delay: Option<Duration>,
    evict_delay: Option<Duration>,
}

impl WriteBackPolicy {
    /// Registered name.
    pub const NAME: &'static str = "write-back";

    /// Creates a policy. `None` disables the corresponding action.
    #[must_use]
    pub const fn new(copy_delay: Option<Duration>, evict_delay: Option<Duration>) -> Self {
        Self {
            copy_delay,
            evict_delay,
        }
    }

    /// True when `age` has reached `delay`, with a one-second grace so an
    /// object does not flap at exactly the threshold.
    fn expired(age: Duration, delay: Duration) -> bool {
        age + Duration::from_secs(limits::AGE_GRACE_SECS) >= delay
    }
}

impl ReconcilePolicy for WriteBackPolicy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn copy_delay(&self) -> Option<Duration> {
        self.copy_delay
    }

    fn evict_delay(&self) -> Option<Duration> {
        self.evict_delay
    }

    fn decide(&self, age: Duration) -> Action {
        if let Some(evict) = self.evict_delay {
            if Self::expired(age, evict) {
                return Action::Evict;
            }
        }
        if let Some(copy) = self.copy_delay {
            if copy.is_zero() || Self::expired(age, copy) {
                return Action::Copy;
            }
        }
        Action::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_disabled_policy_never_acts() {
        let policy = WriteBackPolicy::new(None, None);
        assert_eq!(policy.decide(Duration::ZERO), Action::None);
        assert_eq!(policy.decide(HOUR), Action::None);
    }

    #[test]
    fn test_zero_copy_delay_copies_immediately() {
        let policy = WriteBackPolicy::new(Some(Duration::ZERO), None);
        assert_eq!(policy.decide(Duration::ZERO), Action::Copy);
    }

    #[test]
    fn test_copy_waits_for_age() {
        let policy = WriteBackPolicy::new(Some(HOUR), None);
        assert_eq!(policy.decide(Duration::from_secs(10)), Action::None);
        assert_eq!(policy.decide(HOUR), Action::Copy);
    }

    #[test]
    fn test_evict_takes_precedence_once_expired() {
        let policy = WriteBackPolicy::new(Some(Duration::ZERO), Some(HOUR));
        assert_eq!(policy.decide(Duration::from_secs(10)), Action::Copy);
        assert_eq!(policy.decide(HOUR), Action::Evict);
    }

    #[test]
    fn test_grace_covers_threshold_boundary() {
        let policy = WriteBackPolicy::new(Some(HOUR), None);
        // One second short of the delay still decides Copy: the grace
        // prevents flapping at exactly the threshold.
        assert_eq!(policy.decide(HOUR - Duration::from_secs(1)), Action::Copy);
        assert_eq!(
            policy.decide(HOUR - Duration::from_secs(2)),
            Action::None
        );
    }
}
