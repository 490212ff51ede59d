//! Reconnection policy for status subscriptions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a subscription reconnects after a retryable failure.
///
/// The default is [`RetryPolicy::Never`]: the first failure is reported to
/// the caller and the subscription terminates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Never reconnect.
    #[default]
    Never,

    /// Reconnect after a fixed delay.
    Fixed {
        /// Delay before each reconnection.
        #[serde(with = "millis")]
        delay: Duration,
        /// Maximum consecutive reconnections. `None` is unlimited.
        max_attempts: Option<u32>,
    },

    /// Reconnect with exponentially growing delay.
    Exponential {
        /// Delay before the first reconnection.
        #[serde(with = "millis")]
        initial: Duration,
        /// Upper bound on the delay.
        #[serde(with = "millis")]
        max: Duration,
        /// Maximum consecutive reconnections. `None` is unlimited.
        max_attempts: Option<u32>,
    },
}

impl RetryPolicy {
    /// Returns the delay before reconnection number `attempt` (1-based),
    /// or `None` if the policy gives up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match *self {
            Self::Never => None,
            Self::Fixed { delay, max_attempts } => within(attempt, max_attempts).then_some(delay),
            Self::Exponential { initial, max, max_attempts } => {
                if !within(attempt, max_attempts) {
                    return None;
                }
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                Some(initial.saturating_mul(factor).min(max))
            }
        }
    }

    /// Returns true if this policy ever reconnects.
    pub const fn retries(&self) -> bool {
        !matches!(self, Self::Never)
    }
}

fn within(attempt: u32, max_attempts: Option<u32>) -> bool {
    attempt >= 1 && max_attempts.is_none_or(|max| attempt <= max)
}

/// Serializes durations as integer milliseconds.
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_never() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::Never);
        assert_eq!(RetryPolicy::Never.delay(1), None);
        assert!(!RetryPolicy::Never.retries());
    }

    #[rstest]
    #[case::first(1, Some(100))]
    #[case::last(3, Some(100))]
    #[case::exhausted(4, None)]
    fn test_fixed(#[case] attempt: u32, #[case] expected_ms: Option<u64>) {
        let policy =
            RetryPolicy::Fixed { delay: Duration::from_millis(100), max_attempts: Some(3) };
        assert_eq!(policy.delay(attempt), expected_ms.map(Duration::from_millis));
    }

    #[rstest]
    #[case::first(1, 500)]
    #[case::second(2, 1_000)]
    #[case::third(3, 2_000)]
    #[case::capped(6, 10_000)]
    #[case::huge(200, 10_000)]
    fn test_exponential(#[case] attempt: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy::Exponential {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
            max_attempts: None,
        };
        assert_eq!(policy.delay(attempt), Some(Duration::from_millis(expected_ms)));
    }

    #[test]
    fn test_policy_serde_shape() {
        let policy: RetryPolicy = serde_json::from_str(
            r#"{"kind":"exponential","initial":250,"max":4000,"max_attempts":5}"#,
        )
        .unwrap();
        assert_eq!(
            policy,
            RetryPolicy::Exponential {
                initial: Duration::from_millis(250),
                max: Duration::from_secs(4),
                max_attempts: Some(5),
            }
        );

        let policy: RetryPolicy = serde_json::from_str(r#"{"kind":"never"}"#).unwrap();
        assert_eq!(policy, RetryPolicy::Never);
    }
}
