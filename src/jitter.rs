use rand::Rng;
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Spreads expiry times so that entries written together don't all expire together.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Jitter {
    spread: f64,
}

impl Jitter {
    /// # Panics
    /// If `spread` is not within `[0, 1)`
    pub fn new(spread: f64) -> Self {
        assert!(
            (0.0..1.0).contains(&spread),
            "jitter spread must be within [0, 1)"
        );

        Jitter { spread }
    }

    pub fn spread(&self) -> f64 {
        self.spread
    }

    /// Returns a duration picked uniformly from `[nominal * (1 - spread), nominal * (1 + spread)]`
    pub fn around(&self, nominal: Duration) -> Duration {
        if self.spread == 0.0 || nominal.is_zero() {
            return nominal;
        }

        let nanos = nominal.as_nanos();

        // spread in parts per billion keeps the band math in integers
        let parts = (self.spread * NANOS_PER_SEC as f64).round() as u128;
        let delta = nanos / NANOS_PER_SEC * parts + nanos % NANOS_PER_SEC * parts / NANOS_PER_SEC;

        let picked = rand::rng().random_range(nanos - delta..=nanos + delta);

        // the upper end of the band can pass `Duration::MAX`
        u64::try_from(picked / NANOS_PER_SEC).map_or(Duration::MAX, |secs| {
            Duration::new(secs, (picked % NANOS_PER_SEC) as u32)
        })
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Jitter::new(0.05)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn within(jitter: &Jitter, nominal: Duration, value: Duration) -> bool {
        let nanos = nominal.as_nanos() as f64;
        let value = value.as_nanos() as f64;

        nanos * (1.0 - jitter.spread()) <= value && value <= nanos * (1.0 + jitter.spread())
    }

    #[test]
    fn test_around_stays_in_band() {
        let jitter = Jitter::new(0.05);

        for _ in 0..1000 {
            let value = jitter.around(Duration::from_secs(1));
            assert!(within(&jitter, Duration::from_secs(1), value), "{value:?} out of band");
        }
    }

    #[test]
    fn test_around_long_ttl() {
        let jitter = Jitter::new(0.05);
        let week = Duration::from_secs(60 * 60 * 24 * 7);

        for _ in 0..1000 {
            assert!(within(&jitter, week, jitter.around(week)));
        }
    }

    #[test]
    fn test_around_centuries() {
        let jitter = Jitter::new(0.05);
        let millennium = Duration::from_secs(60 * 60 * 24 * 365 * 1000);
        let low = millennium - millennium / 20;
        let high = millennium + millennium / 20;

        for _ in 0..1000 {
            let value = jitter.around(millennium);
            assert!(low <= value && value <= high, "{value:?} out of band");
        }
    }

    #[test]
    fn test_around_max_stays_in_band() {
        let jitter = Jitter::new(0.05);

        for _ in 0..100 {
            let value = jitter.around(Duration::MAX);
            assert!(value >= Duration::MAX - Duration::MAX / 20, "{value:?} out of band");
        }
    }

    #[test]
    fn test_around_actually_varies() {
        let jitter = Jitter::new(0.5);

        let first = jitter.around(Duration::from_secs(60));
        let varied = (0..100).any(|_| jitter.around(Duration::from_secs(60)) != first);

        assert!(varied);
    }

    #[test]
    fn test_zero_spread_is_identity() {
        let jitter = Jitter::new(0.0);

        assert_eq!(jitter.around(Duration::from_millis(1500)), Duration::from_millis(1500));
    }

    #[test]
    #[should_panic]
    fn test_spread_of_one_is_rejected() {
        Jitter::new(1.0);
    }
}
