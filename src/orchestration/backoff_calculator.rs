//! # Backoff Calculator
//!
//! Exponential delay between same-lease retries.
//!
//! `delay(n) = min(max_delay, base_delay * exponential_base^n)`, then, when
//! jitter is enabled, multiplied by a factor drawn uniformly from
//! `[0.5, 1.5)`. Jitter is applied after the cap, so a jittered delay can
//! exceed `max_delay` by up to half.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryPolicy;
use crate::constants::defaults::{JITTER_MAX, JITTER_MIN};

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffCalculator {
    base_delay_secs: f64,
    max_delay_secs: f64,
    exponential_base: f64,
    jitter: bool,
}

impl BackoffCalculator {
    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self {
            base_delay_secs: policy.base_delay().as_secs_f64(),
            max_delay_secs: policy.max_delay().as_secs_f64(),
            exponential_base: policy.exponential_base.max(1.0),
            jitter: policy.jitter,
        }
    }

    /// Delay before retry number `retry_index` (0-based), without jitter
    pub fn capped_delay(&self, retry_index: u32) -> Duration {
        let exponent = retry_index.min(i32::MAX as u32) as i32;
        let raw = self.base_delay_secs * self.exponential_base.powi(exponent);
        // powi can overflow to infinity for large exponents
        let capped = if raw.is_finite() {
            raw.min(self.max_delay_secs)
        } else {
            self.max_delay_secs
        };
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay to actually sleep before retry number `retry_index`
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let capped = self.capped_delay(retry_index);
        if !self.jitter || capped.is_zero() {
            return capped;
        }
        let factor = rand::thread_rng().gen_range(JITTER_MIN..JITTER_MAX);
        Duration::from_secs_f64(capped.as_secs_f64() * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: 2000,
            max_delay_ms: 30_000,
            exponential_base: 2.0,
            jitter,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_exponential_growth_and_cap() {
        let calc = BackoffCalculator::from_policy(&policy(false));
        assert_eq!(calc.capped_delay(0), Duration::from_secs(2));
        assert_eq!(calc.capped_delay(1), Duration::from_secs(4));
        assert_eq!(calc.capped_delay(2), Duration::from_secs(8));
        assert_eq!(calc.capped_delay(3), Duration::from_secs(16));
        assert_eq!(calc.capped_delay(4), Duration::from_secs(30));
        assert_eq!(calc.capped_delay(10_000), Duration::from_secs(30));
        assert_eq!(calc.delay_for(1), Duration::from_secs(4));
    }

    #[test]
    fn test_jitter_bounds() {
        let calc = BackoffCalculator::from_policy(&policy(true));
        for _ in 0..200 {
            let delay = calc.delay_for(0).as_secs_f64();
            assert!((1.0..3.0).contains(&delay), "delay {delay} out of range");
            let capped = calc.delay_for(20).as_secs_f64();
            assert!((15.0..45.0).contains(&capped), "delay {capped} out of range");
        }
    }

    #[test]
    fn test_zero_base_never_sleeps() {
        let calc = BackoffCalculator::from_policy(&RetryPolicy {
            base_delay_ms: 0,
            max_delay_ms: 0,
            ..RetryPolicy::default()
        });
        assert_eq!(calc.delay_for(3), Duration::ZERO);
    }
}
