use std::fmt;

use serde::Serialize;

const DEFAULT_BUCKETS: usize = 20;
const BUCKETS_PER_UNIT: f64 = 10.0;

/// Counts of connected-pair `distance / D0` ratios in buckets of 0.1; the
/// last bucket also takes everything above its range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnergyHistogram {
    buckets: Vec<u64>,
}

impl Default for EnergyHistogram {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKETS)
    }
}

impl EnergyHistogram {
    /// # Panics
    /// When `buckets` is zero.
    #[must_use]
    pub fn new(buckets: usize) -> Self {
        assert!(buckets > 0, "histogram needs at least one bucket");
        Self {
            buckets: vec![0; buckets],
        }
    }

    pub fn add(&mut self, ratio: f64) {
        let last = self.buckets.len() - 1;
        let scaled = (ratio * BUCKETS_PER_UNIT).floor();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = if scaled.is_nan() || scaled < 0.0 {
            0
        } else {
            (scaled as usize).min(last)
        };
        self.buckets[idx] += 1;
    }

    pub fn reset(&mut self) {
        self.buckets.fill(0);
    }

    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.buckets
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }
}

impl fmt::Display for EnergyHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HISTO:")?;
        for count in &self.buckets {
            write!(f, " {count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_land_in_tenth_buckets() {
        let mut h = EnergyHistogram::new(5);
        for r in [0.05, 0.15, 0.19, 0.42, 3.0, -1.0, f64::NAN] {
            h.add(r);
        }
        assert_eq!(h.counts(), &[3, 2, 0, 0, 2]);
        assert_eq!(h.total(), 7);
        assert_eq!(h.to_string(), "HISTO: 3 2 0 0 2");
        h.reset();
        assert_eq!(h.total(), 0);
    }
}
