//! Opt-in phase timing for the generation pipeline.
//!
//! Timing is only collected with the `pipeline_metrics` feature on non-WASM
//! targets (`std::time::Instant` is unavailable in the browser). Otherwise every
//! call is a no-op and [`PipelineMetrics::end`] returns `None`.
//!
//! # Usage
//!
//! ```ignore
//! use pgc_engine::geom::{PipelineMetrics, TimingBucket};
//!
//! let mut metrics = PipelineMetrics::default();
//! metrics.begin();
//! let mesh = metrics.time(TimingBucket::Subdivision, || mesh.subdivide_n(2));
//! if let Some(report) = metrics.end() {
//!     println!("subdivision: {} ns", report.subdivision_ns);
//! }
//! ```

/// Pipeline phases that accumulate time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingBucket {
    /// Layout expansion into the structural skeleton.
    Construction,
    /// Species search over the intermediate graph.
    CoarseSearch,
    /// Spline fill-out of layout edges.
    FillOut,
    /// Parent/forward/rotation propagation.
    Dag,
    /// Gradient-based refinement of positions and ups.
    FinePhase,
    /// Profile extrusion and junction fill.
    Meshing,
    Subdivision,
    /// Triangulation into the flat output buffers.
    Bake,
}

/// Cumulative nanoseconds per bucket.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PhaseTimings {
    pub construction_ns: u64,
    pub coarse_search_ns: u64,
    pub fill_out_ns: u64,
    pub dag_ns: u64,
    pub fine_phase_ns: u64,
    pub meshing_ns: u64,
    pub subdivision_ns: u64,
    pub bake_ns: u64,
}

impl PhaseTimings {
    #[must_use]
    pub fn total_ns(&self) -> u64 {
        self.construction_ns
            .saturating_add(self.coarse_search_ns)
            .saturating_add(self.fill_out_ns)
            .saturating_add(self.dag_ns)
            .saturating_add(self.fine_phase_ns)
            .saturating_add(self.meshing_ns)
            .saturating_add(self.subdivision_ns)
            .saturating_add(self.bake_ns)
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn total_ms(&self) -> f64 {
        self.total_ns() as f64 / 1_000_000.0
    }

    fn bucket_mut(&mut self, bucket: TimingBucket) -> &mut u64 {
        match bucket {
            TimingBucket::Construction => &mut self.construction_ns,
            TimingBucket::CoarseSearch => &mut self.coarse_search_ns,
            TimingBucket::FillOut => &mut self.fill_out_ns,
            TimingBucket::Dag => &mut self.dag_ns,
            TimingBucket::FinePhase => &mut self.fine_phase_ns,
            TimingBucket::Meshing => &mut self.meshing_ns,
            TimingBucket::Subdivision => &mut self.subdivision_ns,
            TimingBucket::Bake => &mut self.bake_ns,
        }
    }

    /// Add `nanos` to `bucket`, saturating.
    pub fn add(&mut self, bucket: TimingBucket, nanos: u64) {
        let slot = self.bucket_mut(bucket);
        *slot = slot.saturating_add(nanos);
    }
}

/// Timing accumulator. Wrap phases with [`time`](Self::time).
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    #[cfg(all(feature = "pipeline_metrics", not(target_arch = "wasm32")))]
    report: PhaseTimings,
}

impl PipelineMetrics {
    /// Reset all counters.
    pub fn begin(&mut self) {
        #[cfg(all(feature = "pipeline_metrics", not(target_arch = "wasm32")))]
        {
            self.report = PhaseTimings::default();
        }
    }

    /// Accumulated timings, or `None` when metrics are compiled out.
    #[must_use]
    pub fn end(&self) -> Option<PhaseTimings> {
        #[cfg(all(feature = "pipeline_metrics", not(target_arch = "wasm32")))]
        {
            Some(self.report.clone())
        }
        #[cfg(not(all(feature = "pipeline_metrics", not(target_arch = "wasm32"))))]
        {
            None
        }
    }

    /// Run `f`, charging its wall time to `bucket`.
    pub fn time<R>(&mut self, bucket: TimingBucket, f: impl FnOnce() -> R) -> R {
        #[cfg(all(feature = "pipeline_metrics", not(target_arch = "wasm32")))]
        {
            let start = std::time::Instant::now();
            let result = f();
            #[allow(clippy::cast_possible_truncation)]
            let nanos = start.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
            self.report.add(bucket, nanos);
            result
        }

        #[cfg(not(all(feature = "pipeline_metrics", not(target_arch = "wasm32"))))]
        {
            let _ = bucket;
            f()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_timings_total() {
        let mut report = PhaseTimings::default();
        report.add(TimingBucket::Meshing, 1000);
        report.add(TimingBucket::Bake, 2000);
        report.add(TimingBucket::Meshing, 3000);
        assert_eq!(report.meshing_ns, 4000);
        assert_eq!(report.total_ns(), 6000);
        assert!((report.total_ms() - 0.006).abs() < 1e-9);
    }

    #[test]
    fn test_add_saturates() {
        let mut report = PhaseTimings::default();
        report.add(TimingBucket::Dag, u64::MAX);
        report.add(TimingBucket::Dag, 5);
        assert_eq!(report.dag_ns, u64::MAX);
    }

    #[test]
    fn test_time_returns_closure_result() {
        let mut metrics = PipelineMetrics::default();
        metrics.begin();
        let result = metrics.time(TimingBucket::FinePhase, || 42);
        assert_eq!(result, 42);
        let report = metrics.end();
        if cfg!(all(feature = "pipeline_metrics", not(target_arch = "wasm32"))) {
            assert!(report.is_some());
        } else {
            assert!(report.is_none());
        }
    }
}
