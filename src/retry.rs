//! Retry policy: classifies external-command failures as transient or
//! permanent, and hands out backoff schedules for the three canonical
//! retry shapes the Mutation Engine and Orchestrator use.
//!
//! Classification is substring matching against a lowercased message:
//! the lists below are the contract. Extend them; do not shrink them
//! without a behavior review.

use crate::error::Error;
use rand::Rng;
use std::time::Duration;

/// The outcome of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Expected to resolve without operator action within budget.
    Transient,
    /// Will not resolve by retrying; surface immediately.
    Permanent,
}

const PERMANENT_MARKERS: &[&str] = &[
    "no such file",
    "permission denied",
    "operation not permitted",
    "invalid argument",
    "not found",
    "does not exist",
    "unknown unit",
    "unit not found",
    "no such user",
    "user does not exist",
];

const TRANSIENT_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "temporarily unavailable",
    "resource temporarily unavailable",
    "device or resource busy",
    "text file busy",
    "eagain",
    "ebusy",
    "etimedout",
    "econnrefused",
    "econnreset",
    "no route to host",
    "network is unreachable",
    "dbus",
    "bus connection",
    "failed to connect",
    "socket not found",
    "operation timed out",
];

/// Additional transient markers recognized only for *service* errors
/// (`ServiceStartFailed`/`ServiceStopFailed`/`ServiceReloadFailed`),
/// since these phrases are too generic to treat as transient for
/// every command (e.g. `useradd` also prints "failed to").
const SERVICE_TRANSIENT_MARKERS: &[&str] = &["exit code", "not active", "failed to"];

/// Classify a lowercased error message. Permanent markers win if both
/// a permanent and a transient marker are present.
#[must_use]
pub fn classify_text(text: &str, is_service_error: bool) -> Classification {
    let text = text.to_lowercase();
    if PERMANENT_MARKERS.iter().any(|m| text.contains(m)) {
        return Classification::Permanent;
    }
    if TRANSIENT_MARKERS.iter().any(|m| text.contains(m)) {
        return Classification::Transient;
    }
    if is_service_error && SERVICE_TRANSIENT_MARKERS.iter().any(|m| text.contains(m)) {
        return Classification::Transient;
    }
    Classification::Permanent
}

/// Classify an [`Error`] value, treating the service-lifecycle
/// variants as service errors for the purpose of the extra markers.
#[must_use]
pub fn classify(err: &Error) -> Classification {
    let is_service = matches!(
        err,
        Error::ServiceStartFailed { .. }
            | Error::ServiceStopFailed { .. }
            | Error::ServiceReloadFailed { .. }
    );
    classify_text(&err.classification_text(), is_service)
}

/// A retry schedule: a fixed or exponential sequence of delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Base delay.
    pub base: Duration,
    /// Number of retries after the first attempt (so `retries + 1`
    /// attempts total).
    pub retries: u32,
    /// Whether delays grow exponentially (2^attempt * base) or stay
    /// fixed.
    pub exponential: bool,
    /// Whether the computed delay is jittered before use.
    pub jitter: bool,
}

impl Schedule {
    /// `Quick`: 100ms spacing, 3 retries (4 attempts total), unjittered.
    #[must_use]
    pub const fn quick() -> Self {
        Self {
            base: Duration::from_millis(100),
            retries: 3,
            exponential: false,
            jitter: false,
        }
    }

    /// `System`: 200ms exponential, 4 retries, jittered.
    #[must_use]
    pub const fn system() -> Self {
        Self {
            base: Duration::from_millis(200),
            retries: 4,
            exponential: true,
            jitter: true,
        }
    }

    /// `Heavy`: 500ms exponential, 3 retries, jittered.
    #[must_use]
    pub const fn heavy() -> Self {
        Self {
            base: Duration::from_millis(500),
            retries: 3,
            exponential: true,
            jitter: true,
        }
    }

    /// The un-jittered delay before the given retry attempt
    /// (`0`-indexed: the delay before the *first* retry, i.e. after the
    /// first failure).
    fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.exponential {
            self.base.saturating_mul(2u32.saturating_pow(attempt))
        } else {
            self.base
        }
    }

    /// The delay before the given retry attempt. On `System`/`Heavy`
    /// schedules this applies equal jitter (half the computed delay is
    /// fixed, half is drawn uniformly from `[0, computed/2)`), so
    /// concurrent callers retrying the same resource don't all wake up
    /// in lockstep. `Quick` has no jitter: its retries are tight and
    /// local, not contending for a shared external resource.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let computed = self.base_delay_for_attempt(attempt);
        if !self.jitter {
            return computed;
        }
        let half = computed / 2;
        let random_part = rand::thread_rng().gen_range(0..=half.as_millis().max(1) as u64);
        half + Duration::from_millis(random_part)
    }
}

/// A fixed-interval polling schedule, capped by a maximum total wait.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    /// Interval between polls.
    pub interval: Duration,
    /// Maximum number of retries (not counting the initial check).
    pub max_retries: u32,
}

impl PollSchedule {
    /// Build a poll schedule for a fixed interval capped at
    /// `max_wait`: `ceil(max_wait / interval) - 1` retries.
    #[must_use]
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let max_wait_ms = max_wait.as_millis();
        let total = max_wait_ms.div_ceil(interval_ms);
        let max_retries = total.saturating_sub(1).try_into().unwrap_or(u32::MAX);
        Self {
            interval,
            max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_is_always_permanent() {
        assert_eq!(
            classify_text("bash: permission denied", false),
            Classification::Permanent
        );
        // Even alongside a transient-looking token.
        assert_eq!(
            classify_text("permission denied, connection refused", false),
            Classification::Permanent
        );
    }

    #[test]
    fn connection_refused_is_transient() {
        assert_eq!(
            classify_text("dial tcp: connection refused", false),
            Classification::Transient
        );
    }

    #[test]
    fn service_only_markers_require_the_service_flag() {
        assert_eq!(
            classify_text("unit exited with exit code 1", false),
            Classification::Permanent
        );
        assert_eq!(
            classify_text("unit exited with exit code 1", true),
            Classification::Transient
        );
    }

    #[test]
    fn unmatched_text_defaults_permanent() {
        assert_eq!(
            classify_text("completely unrelated message", false),
            Classification::Permanent
        );
    }

    #[test]
    fn schedules_have_expected_shapes() {
        assert_eq!(Schedule::quick().retries, 3);
        assert!(!Schedule::quick().exponential);
        assert_eq!(Schedule::system().retries, 4);
        assert!(Schedule::system().exponential);
        assert_eq!(Schedule::heavy().retries, 3);
        assert!(Schedule::heavy().exponential);
    }

    #[test]
    fn unjittered_base_delay_doubles_per_attempt() {
        let s = Schedule::heavy();
        assert_eq!(s.base_delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(s.base_delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(s.base_delay_for_attempt(2), Duration::from_millis(2000));
    }

    #[test]
    fn quick_schedule_is_never_jittered() {
        let s = Schedule::quick();
        assert_eq!(s.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(s.delay_for_attempt(2), Duration::from_millis(100));
    }

    #[test]
    fn jittered_delay_stays_within_the_equal_jitter_bounds() {
        let s = Schedule::heavy();
        let computed = s.base_delay_for_attempt(1);
        let half = computed / 2;
        for _ in 0..200 {
            let d = s.delay_for_attempt(1);
            assert!(d >= half, "{d:?} below lower bound {half:?}");
            assert!(d <= computed, "{d:?} above upper bound {computed:?}");
        }
    }

    #[test]
    fn poll_schedule_caps_retries() {
        let p = PollSchedule::new(Duration::from_millis(100), Duration::from_secs(30));
        assert_eq!(p.max_retries, 299);
    }
}
