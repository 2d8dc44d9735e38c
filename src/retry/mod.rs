//! Retry decision table and delay computation (spec.md §7).

pub mod poller;
pub mod schedule;

use crate::store::models::{ErrorCategory, RetryPolicy, RetryStrategy};

/// The operator-overridable defaults from spec.md §7's retry decision
/// table. Seeded into `retry_policy` on first boot; see
/// `store::PgStore::upsert_retry_policy`.
pub fn default_policies() -> Vec<RetryPolicy> {
    use ErrorCategory::*;
    use RetryStrategy::*;

    vec![
        policy(Network, true, 3, Exponential, 1.0, 300.0, 2.0),
        policy(RateLimit, true, 5, Exponential, 2.0, 600.0, 2.0),
        policy(ServerError, true, 3, Exponential, 1.0, 300.0, 2.0),
        policy(BrowserCrash, true, 3, Exponential, 2.0, 300.0, 2.0),
        policy(ResourceUnavailable, true, 3, Linear, 5.0, 60.0, 1.5),
        policy(Timeout, true, 2, Linear, 5.0, 60.0, 1.5),
        policy(ClientError, false, 0, Fixed, 0.0, 0.0, 1.0),
        policy(AuthError, false, 0, Fixed, 0.0, 0.0, 1.0),
        policy(NotFound, false, 0, Fixed, 0.0, 0.0, 1.0),
        policy(ValidationError, false, 0, Fixed, 0.0, 0.0, 1.0),
        policy(BusinessLogicError, false, 0, Fixed, 0.0, 0.0, 1.0),
        policy(Unknown, true, 1, Fixed, 10.0, 10.0, 1.0),
    ]
}

fn policy(
    error_category: ErrorCategory,
    is_retryable: bool,
    max_attempts: i32,
    strategy: RetryStrategy,
    initial_delay_s: f64,
    max_delay_s: f64,
    multiplier: f64,
) -> RetryPolicy {
    RetryPolicy {
        error_category,
        is_retryable,
        max_attempts,
        strategy,
        initial_delay_s,
        max_delay_s,
        multiplier,
    }
}

/// `delay = clamp(initial * f(n), 0, max_cap)` (spec.md §7 "Delay
/// computation"), for attempt `n` (n >= 1).
pub fn compute_delay(policy: &RetryPolicy, attempt_number: u32) -> f64 {
    let n = attempt_number.max(1) as f64;
    let raw = match policy.strategy {
        RetryStrategy::Exponential => policy.initial_delay_s * policy.multiplier.powf(n - 1.0),
        RetryStrategy::Linear => policy.initial_delay_s * (1.0 + (n - 1.0) * (policy.multiplier - 1.0)),
        RetryStrategy::Fixed => policy.initial_delay_s,
    };
    raw.max(0.0).min(policy.max_delay_s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(cat: ErrorCategory) -> RetryPolicy {
        default_policies()
            .into_iter()
            .find(|p| p.error_category == cat)
            .unwrap()
    }

    #[test]
    fn exponential_backoff_matches_spec_example() {
        // spec.md §8 scenario 4: initial=1, multiplier=2, cap=300 -> ~1, 2, 4
        let p = find(ErrorCategory::Network);
        assert_eq!(compute_delay(&p, 1), 1.0);
        assert_eq!(compute_delay(&p, 2), 2.0);
        assert_eq!(compute_delay(&p, 3), 4.0);
    }

    #[test]
    fn exponential_delay_is_capped() {
        let p = find(ErrorCategory::RateLimit);
        let huge = compute_delay(&p, 20);
        assert_eq!(huge, p.max_delay_s);
    }

    #[test]
    fn linear_delay_grows_additively() {
        let p = find(ErrorCategory::Timeout);
        assert_eq!(compute_delay(&p, 1), 5.0);
        assert_eq!(compute_delay(&p, 2), 5.0 * (1.0 + 1.0 * 0.5));
    }

    #[test]
    fn fixed_delay_never_changes() {
        let p = find(ErrorCategory::Unknown);
        assert_eq!(compute_delay(&p, 1), 10.0);
        assert_eq!(compute_delay(&p, 5), 10.0);
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let p = find(ErrorCategory::ValidationError);
        assert!(!p.is_retryable);
        assert_eq!(p.max_attempts, 0);
    }
}
