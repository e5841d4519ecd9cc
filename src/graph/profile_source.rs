//! Sources of cross-section profiles for the connection nodes along an edge.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geom::{ParameterisedProfile, ProfileError, RoadbedShape};

/// Profiles between two connectors are blended from keys placed every
/// `KEY_SPACING` steps.
const KEY_SPACING: usize = 5;
const KEY_IMPROVEMENT_ATTEMPTS: usize = 20;
const DEFAULT_SIZES: [f64; 3] = [3.0, 5.0, 8.0];

pub trait ProfileSource {
    /// Any profile this source can produce.
    fn profile(&mut self) -> Arc<ParameterisedProfile>;

    /// `steps` profiles running from `from` to `to`, each a small change from
    /// the previous one.
    fn compatible_sequence(
        &mut self,
        from: &Arc<ParameterisedProfile>,
        to: &Arc<ParameterisedProfile>,
        steps: usize,
    ) -> Result<Vec<Arc<ParameterisedProfile>>, ProfileError>;
}

/// Picks random roadbed profiles from a fixed catalogue.
#[derive(Debug, Clone)]
pub struct RandomProfileSource {
    rng: StdRng,
    profiles: Vec<Arc<ParameterisedProfile>>,
}

impl RandomProfileSource {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            profiles: Vec::new(),
        }
    }

    /// Closed and open width-3 roadbeds with full barriers.
    ///
    /// # Panics
    /// Never; both shapes are consistent at width 3.
    #[must_use]
    pub fn with_demo_roadbeds(seed: u64) -> Self {
        let mut source = Self::new(seed);
        for overhang in [0.5, 0.0] {
            let shape = RoadbedShape::new(1.0, 1.0, overhang, overhang, 6, 11);
            let added = source.add_roadbed(&shape, &[3.0], true);
            assert!(added.is_ok(), "demo roadbeds are consistent");
        }
        source
    }

    /// Add `shape` (used for both halves) at each of `sizes`, or at 3, 5 and 8
    /// when `sizes` is empty. The mirrored shape is added too unless it is
    /// identical or `suppress_mirroring` is set.
    pub fn add_roadbed(
        &mut self,
        shape: &RoadbedShape,
        sizes: &[f64],
        suppress_mirroring: bool,
    ) -> Result<(), ProfileError> {
        let sizes = if sizes.is_empty() { &DEFAULT_SIZES[..] } else { sizes };
        for &width in sizes {
            let profile = ParameterisedProfile::from_roadbed(width, shape, shape)?;
            self.profiles.push(Arc::new(profile));
        }
        if !suppress_mirroring {
            let mirrored = shape.mirrored();
            if mirrored != *shape {
                self.add_roadbed(&mirrored, &DEFAULT_SIZES, true)?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn profiles(&self) -> &[Arc<ParameterisedProfile>] {
        &self.profiles
    }
}

impl ProfileSource for RandomProfileSource {
    /// # Panics
    /// When no roadbed has been added.
    fn profile(&mut self) -> Arc<ParameterisedProfile> {
        assert!(!self.profiles.is_empty(), "profile source has no profiles");
        let idx = self.rng.random_range(0..self.profiles.len());
        Arc::clone(&self.profiles[idx])
    }

    fn compatible_sequence(
        &mut self,
        from: &Arc<ParameterisedProfile>,
        to: &Arc<ParameterisedProfile>,
        steps: usize,
    ) -> Result<Vec<Arc<ParameterisedProfile>>, ProfileError> {
        let interior_keys = (steps / KEY_SPACING).saturating_sub(1);
        let mut keys = Vec::with_capacity(interior_keys + 2);
        keys.push(Arc::clone(from));
        for _ in 0..interior_keys {
            keys.push(self.profile());
        }
        keys.push(Arc::clone(to));

        if keys.len() > 2 {
            for _ in 0..KEY_IMPROVEMENT_ATTEMPTS {
                let k = self.rng.random_range(1..keys.len() - 1);
                let candidate = self.profile();
                let current = keys[k].diff(&keys[k - 1]) + keys[k].diff(&keys[k + 1]);
                let proposed = candidate.diff(&keys[k - 1]) + candidate.diff(&keys[k + 1]);
                if proposed < current {
                    keys[k] = candidate;
                }
            }
        }

        let last_key = keys.len() - 2;
        let mut out = Vec::with_capacity(steps);
        for i in 0..steps {
            let key = (i / KEY_SPACING).min(last_key);
            #[allow(clippy::cast_precision_loss)]
            let frac = ((i - key * KEY_SPACING) as f64 / (KEY_SPACING - 1) as f64).min(1.0);
            out.push(Arc::new(keys[key].interp(&keys[key + 1], frac)?));
        }
        if let Some(last) = out.last_mut() {
            *last = Arc::clone(to);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_roadbed_defaults_sizes_and_mirrors() {
        let mut source = RandomProfileSource::new(1);
        let asymmetric = RoadbedShape::new(1.0, 0.0, 0.5, 0.0, 3, 7);
        source.add_roadbed(&asymmetric, &[], false).unwrap();
        assert_eq!(source.profiles().len(), 6);
        let widths: Vec<f64> = source.profiles().iter().map(|p| p.width()).collect();
        assert_eq!(widths, [3.0, 5.0, 8.0, 3.0, 5.0, 8.0]);

        let mut symmetric = RandomProfileSource::new(1);
        symmetric
            .add_roadbed(&RoadbedShape::new(1.0, 1.0, 0.0, 0.0, 3, 9), &[4.0], false)
            .unwrap();
        assert_eq!(symmetric.profiles().len(), 1);

        // Equal barriers but a lopsided smooth range still mirror, at the
        // default sizes.
        let mut lopsided = RandomProfileSource::new(1);
        lopsided
            .add_roadbed(&RoadbedShape::new(1.0, 1.0, 0.0, 0.0, 6, 11), &[4.0], false)
            .unwrap();
        let widths: Vec<f64> = lopsided.profiles().iter().map(|p| p.width()).collect();
        assert_eq!(widths, [4.0, 3.0, 5.0, 8.0]);
    }

    #[test]
    fn sequence_starts_and_ends_on_the_connectors() {
        let mut source = RandomProfileSource::with_demo_roadbeds(7);
        let from = Arc::clone(&source.profiles()[0]);
        let to = Arc::clone(&source.profiles()[1]);
        for steps in [2, 7, 22] {
            let seq = source.compatible_sequence(&from, &to, steps).unwrap();
            assert_eq!(seq.len(), steps);
            assert_eq!(*seq[0], *from);
            assert_eq!(*seq[steps - 1], *to);
            assert!(seq.iter().all(|p| p.check_consistent().is_ok()));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let run = |seed| {
            let mut source = RandomProfileSource::with_demo_roadbeds(seed);
            let from = Arc::clone(&source.profiles()[0]);
            source.compatible_sequence(&from, &from, 30).unwrap()
        };
        assert_eq!(run(3), run(3));
    }
}
