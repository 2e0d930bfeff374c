//! Backoff policy for failed fetches.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// How long to wait before retrying a failed fetch.
///
/// Shared keys can have several screens mounted at once, so the exponential
/// policy defaults to full jitter: every subscriber-triggered retry lands at
/// an independent point inside the computed window instead of in lockstep.
#[derive(Clone)]
pub enum Backoff {
    /// Exponential backoff with a cap.
    Exponential {
        base: Duration,
        max: Duration,
        multiplier: f64,
        jitter: bool,
    },

    /// Caller-supplied delay as a function of the attempt number (1-based).
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Backoff {
    /// Exponential policy with full jitter and a doubling multiplier.
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Backoff::Exponential {
            base,
            max,
            multiplier: 2.0,
            jitter: true,
        }
    }

    /// Fixed delay for every attempt.
    pub fn fixed(delay: Duration) -> Self {
        Backoff::Custom(Arc::new(move |_| delay))
    }

    /// Delay before the given retry attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential {
                base,
                max,
                multiplier,
                jitter,
            } => {
                let exp = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = (base.as_millis() as f64) * exp;

                let mut delay = Duration::from_millis(delay_ms as u64);
                if delay > *max {
                    delay = *max;
                }

                if *jitter {
                    // Full jitter: anywhere between zero and the computed delay.
                    let ms = delay.as_millis() as u64;
                    if ms > 0 {
                        delay = Duration::from_millis(rand::thread_rng().gen_range(0..=ms));
                    }
                }

                delay
            }
            Backoff::Custom(f) => f(attempt),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::exponential(Duration::from_millis(500), Duration::from_secs(30))
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backoff::Exponential {
                base,
                max,
                multiplier,
                jitter,
            } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max", max)
                .field("multiplier", multiplier)
                .field("jitter", jitter)
                .finish(),
            Backoff::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_calculation() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false, // Disable jitter for predictable testing
        };

        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_max_delay_cap() {
        let backoff = Backoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: false,
        };

        // Would be 16s and beyond, capped to 5s
        assert_eq!(backoff.delay_for(5), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn test_full_jitter_stays_within_window() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: true,
        };

        for _ in 0..50 {
            let delay = backoff.delay_for(3);
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_custom_backoff() {
        let backoff = Backoff::Custom(Arc::new(|attempt| Duration::from_millis(attempt as u64 * 10)));

        assert_eq!(backoff.delay_for(1), Duration::from_millis(10));
        assert_eq!(backoff.delay_for(7), Duration::from_millis(70));
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::fixed(Duration::from_millis(25));

        assert_eq!(backoff.delay_for(1), Duration::from_millis(25));
        assert_eq!(backoff.delay_for(9), Duration::from_millis(25));
    }
}
