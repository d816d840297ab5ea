use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{RaftConfig, RaftError};

/// Source of randomized election timeouts.
///
/// Each node owns its own generator, seeded either explicitly or from the OS, so
/// peers never share random state. Sampling only draws a value: it never touches
/// the election clock.
#[derive(Debug)]
pub struct ElectionJitter {
    min: Duration,
    max: Duration,
    rng: Mutex<StdRng>,
}

impl ElectionJitter {
    /// Uniform sampler over `[min, max]`. The range must not be empty or degenerate.
    pub fn new(min: Duration, max: Duration, seed: Option<u64>) -> Result<Self, RaftError> {
        if min >= max {
            return Err(RaftError::InvalidTimeoutRange {
                min: millis(min),
                max: millis(max),
            });
        }
        Ok(Self::with_rng(min, max, seed))
    }

    pub fn from_config(config: &RaftConfig) -> Result<Self, RaftError> {
        Self::new(
            Duration::from_millis(config.election_timeout_min),
            Duration::from_millis(config.election_timeout_max),
            config.seed,
        )
    }

    /// Always yields `timeout`. Meant for deterministic clusters and tests.
    pub fn fixed(timeout: Duration) -> Self {
        Self::with_rng(timeout, timeout, Some(0))
    }

    fn with_rng(min: Duration, max: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            min,
            max,
            rng: Mutex::new(rng),
        }
    }

    pub fn bounds(&self) -> (Duration, Duration) {
        (self.min, self.max)
    }

    pub fn sample(&self) -> Duration {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let nanos = rng.random_range(nanos(self.min)..=nanos(self.max));
        Duration::from_nanos(nanos)
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_degenerate_range() {
        let d = Duration::from_millis(150);
        assert!(matches!(
            ElectionJitter::new(d, d, None),
            Err(RaftError::InvalidTimeoutRange { min: 150, max: 150 })
        ));
    }

    #[test]
    fn fixed_jitter_always_returns_the_same_timeout() {
        let jitter = ElectionJitter::fixed(Duration::from_millis(150));
        for _ in 0..32 {
            assert_eq!(jitter.sample(), Duration::from_millis(150));
        }
    }

    #[test]
    fn same_seed_reproduces_sequence() {
        let cfg = RaftConfig::new("n1").with_seed(7);
        let a = ElectionJitter::from_config(&cfg).expect("jitter");
        let b = ElectionJitter::from_config(&cfg).expect("jitter");

        let seq_a: Vec<_> = (0..16).map(|_| a.sample()).collect();
        let seq_b: Vec<_> = (0..16).map(|_| b.sample()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn samples_spread_across_the_range() {
        let jitter = ElectionJitter::new(
            Duration::from_millis(150),
            Duration::from_millis(300),
            Some(11),
        )
        .expect("jitter");

        let samples: Vec<_> = (0..200).map(|_| jitter.sample()).collect();
        let lowest = samples.iter().min().copied().unwrap_or_default();
        let highest = samples.iter().max().copied().unwrap_or_default();
        assert!(highest - lowest > Duration::from_millis(50));
    }

    proptest! {
        #[test]
        fn samples_stay_within_bounds(
            min_ms in 1u64..1_000,
            span_ms in 1u64..1_000,
            seed in any::<u64>(),
        ) {
            let min = Duration::from_millis(min_ms);
            let max = Duration::from_millis(min_ms + span_ms);
            let jitter = ElectionJitter::new(min, max, Some(seed)).expect("valid range");

            for _ in 0..64 {
                let t = jitter.sample();
                prop_assert!(min <= t && t <= max, "{:?} outside [{:?}, {:?}]", t, min, max);
            }
        }
    }
}
