//! Local minimizers behind the [`Objective`] interface.
//!
//! Derivative-free objectives run subplex: Nelder-Mead on small subspaces of
//! the parameters, picked each cycle by how far every parameter moved in the
//! previous one. Objectives with analytic gradients run L-BFGS with a
//! backtracking line search. Both track the best point seen and write it back
//! before returning, converged or not.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// An energy over a flat parameter vector, backed by a graph it mutates.
pub trait Objective {
    fn size(&self) -> usize;

    /// Write `x` into the underlying graph and return the total energy. When
    /// `grad` is given it receives d(energy)/dx.
    fn evaluate(&mut self, x: &[f64], grad: Option<&mut [f64]>) -> f64;

    fn state(&self, x: &mut [f64]);

    fn set_state(&mut self, x: &[f64]);

    fn initial_step_sizes(&self, steps: &mut [f64]);

    /// Per-parameter `(lower, upper)` limits.
    fn bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        None
    }

    fn energy_term_names(&self) -> &'static [&'static str];

    /// Weighted terms of the last evaluation, in
    /// [`energy_term_names`](Self::energy_term_names) order.
    fn last_energy_terms(&self) -> Vec<f64>;

    fn provides_gradient(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub max_evaluations: usize,
    /// Converged once a cycle improves the energy by less than this fraction...
    pub rel_tolerance: f64,
    /// ...or by less than this amount.
    pub abs_tolerance: f64,
    pub use_bounds: bool,
    /// Evaluations between progress logs; 0 disables them.
    pub log_interval: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_evaluations: 100_000,
            rel_tolerance: 1e-3,
            abs_tolerance: 1e-12,
            use_bounds: true,
            log_interval: 1000,
        }
    }
}

impl OptimizerConfig {
    #[must_use]
    pub fn with_tolerance(mut self, rel_tolerance: f64) -> Self {
        self.rel_tolerance = rel_tolerance;
        self
    }

    #[must_use]
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergyTerm {
    pub name: &'static str,
    pub value: f64,
}

/// Result of one [`Optimizer::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptOutcome {
    /// False when the evaluation budget ran out first.
    pub converged: bool,
    pub energy: f64,
    pub evaluations: usize,
    pub terms: Vec<EnergyTerm>,
}

impl OptOutcome {
    #[must_use]
    pub fn terms_summary(&self) -> String {
        self.terms
            .iter()
            .map(|t| format!("{}={:.4e}", t.name, t.value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

const SUBSPACE_MIN: usize = 2;
const SUBSPACE_MAX: usize = 5;
/// Step rescaling limits between subplex cycles.
const STEP_SCALE_MIN: f64 = 0.1;
const SINGLE_SUBSPACE_STEP_SCALE: f64 = 0.25;
const SIMPLEX_EVALUATIONS_PER_DIM: usize = 200;

const NM_REFLECT: f64 = 1.0;
const NM_EXPAND: f64 = 2.0;
const NM_CONTRACT: f64 = 0.5;
const NM_SHRINK: f64 = 0.5;

const LBFGS_MEMORY: usize = 6;
const ARMIJO: f64 = 1e-4;
const BACKTRACK: f64 = 0.5;
const MAX_BACKTRACKS: usize = 40;
const GRADIENT_FLOOR: f64 = 1e-12;

/// Evaluation counter, budget and best-point bookkeeping around an objective.
struct Tracker<'o, O: Objective + ?Sized> {
    objective: &'o mut O,
    limits: Option<(Vec<f64>, Vec<f64>)>,
    evaluations: usize,
    max_evaluations: usize,
    log_interval: usize,
    best_x: Vec<f64>,
    best_energy: f64,
}

impl<O: Objective + ?Sized> Tracker<'_, O> {
    fn project(&self, x: &mut [f64]) {
        if let Some((lower, upper)) = &self.limits {
            for ((v, &lo), &hi) in x.iter_mut().zip(lower).zip(upper) {
                *v = v.clamp(lo, hi);
            }
        }
    }

    fn exhausted(&self) -> bool {
        self.evaluations >= self.max_evaluations
    }

    /// Infinite once the budget is spent.
    fn evaluate(&mut self, x: &[f64], grad: Option<&mut [f64]>) -> f64 {
        if self.exhausted() {
            return f64::INFINITY;
        }
        let energy = self.objective.evaluate(x, grad);
        let energy = if energy.is_nan() { f64::INFINITY } else { energy };
        self.evaluations += 1;
        if energy < self.best_energy {
            self.best_energy = energy;
            self.best_x.copy_from_slice(x);
        }
        if self.log_interval > 0 && self.evaluations % self.log_interval == 0 {
            log::debug!(
                "optimizer: {} evaluations, best energy {:.6e}",
                self.evaluations,
                self.best_energy
            );
        }
        energy
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn improvement_negligible(config: &OptimizerConfig, before: f64, after: f64) -> bool {
    let improvement = before - after;
    improvement <= config.rel_tolerance * before.abs() || improvement <= config.abs_tolerance
}

#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Minimize from the objective's current state.
    pub fn run<O: Objective + ?Sized>(&self, objective: &mut O) -> OptOutcome {
        let n = objective.size();
        let mut x = vec![0.0; n];
        objective.state(&mut x);
        let limits = if self.config.use_bounds { objective.bounds() } else { None };
        let with_gradient = objective.provides_gradient();

        let mut tracker = Tracker {
            objective,
            limits,
            evaluations: 0,
            max_evaluations: self.config.max_evaluations.max(1),
            log_interval: self.config.log_interval,
            best_x: x.clone(),
            best_energy: f64::INFINITY,
        };
        tracker.project(&mut x);

        let converged = if n == 0 {
            true
        } else if with_gradient {
            self.lbfgs(&mut tracker, x)
        } else {
            self.subplex(&mut tracker, x)
        };

        let Tracker {
            objective,
            evaluations,
            best_x,
            ..
        } = tracker;
        // Evaluating the best point writes it back and refreshes the terms.
        let energy = objective.evaluate(&best_x, None);
        let terms = objective
            .energy_term_names()
            .iter()
            .zip(objective.last_energy_terms())
            .map(|(&name, value)| EnergyTerm { name, value })
            .collect();
        let outcome = OptOutcome {
            converged,
            energy,
            evaluations,
            terms,
        };
        log::debug!(
            "optimizer finished: energy {:.6e} after {} evaluations (converged: {}) {}",
            outcome.energy,
            outcome.evaluations,
            outcome.converged,
            outcome.terms_summary()
        );
        outcome
    }

    fn subplex<O: Objective + ?Sized>(&self, t: &mut Tracker<'_, O>, mut x: Vec<f64>) -> bool {
        let n = x.len();
        let mut steps = vec![0.0; n];
        t.objective.initial_step_sizes(&mut steps);
        for s in &mut steps {
            if *s == 0.0 {
                *s = 1.0;
            }
        }
        let mut movement: Vec<f64> = steps.iter().map(|s| s.abs()).collect();
        let mut fx = t.evaluate(&x, None);

        while !t.exhausted() {
            let x_before = x.clone();
            let f_before = fx;

            let subspaces = partition_subspaces(&movement);
            for dims in &subspaces {
                if t.exhausted() {
                    return false;
                }
                self.nelder_mead(t, &mut x, &mut fx, dims, &steps);
            }

            if improvement_negligible(&self.config, f_before, fx) {
                return true;
            }

            let dx: Vec<f64> = x.iter().zip(&x_before).map(|(a, b)| a - b).collect();
            let dx_norm: f64 = dx.iter().map(|d| d.abs()).sum();
            let step_norm: f64 = steps.iter().map(|s| s.abs()).sum();
            let scale = if subspaces.len() > 1 {
                (dx_norm / step_norm).clamp(STEP_SCALE_MIN, 1.0 / STEP_SCALE_MIN)
            } else {
                SINGLE_SUBSPACE_STEP_SCALE
            };
            for (s, &d) in steps.iter_mut().zip(&dx) {
                *s = if d == 0.0 { -*s * scale } else { d.signum() * s.abs() * scale };
            }
            movement = dx.iter().map(|d| d.abs()).collect();

            let largest_x = x.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
            if steps.iter().all(|s| s.abs() <= f64::EPSILON * largest_x) {
                return true;
            }
        }
        false
    }

    /// Nelder-Mead over the coordinates `dims` of `x`, the others held fixed.
    fn nelder_mead<O: Objective + ?Sized>(
        &self,
        t: &mut Tracker<'_, O>,
        x: &mut [f64],
        fx: &mut f64,
        dims: &[usize],
        steps: &[f64],
    ) {
        let k = dims.len();
        let base: Vec<f64> = dims.iter().map(|&d| x[d]).collect();
        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(k + 1);
        simplex.push((base.clone(), *fx));
        for (j, &d) in dims.iter().enumerate() {
            let mut v = base.clone();
            v[j] += steps[d];
            let f = evaluate_subspace(t, x, dims, &mut v);
            simplex.push((v, f));
        }

        let start = t.evaluations;
        while !t.exhausted() && t.evaluations - start < SIMPLEX_EVALUATIONS_PER_DIM * k {
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
            let best = simplex[0].1;
            let worst = simplex[k].1;
            if worst - best <= self.config.rel_tolerance * best.abs() + self.config.abs_tolerance {
                break;
            }

            let mut centroid = vec![0.0; k];
            for (v, _) in &simplex[..k] {
                for (c, &vi) in centroid.iter_mut().zip(v) {
                    *c += vi;
                }
            }
            #[allow(clippy::cast_precision_loss)]
            let inv = 1.0 / k as f64;
            for c in &mut centroid {
                *c *= inv;
            }
            let along = |from: &[f64], factor: f64| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(from)
                    .map(|(&c, &f)| c + (c - f) * factor)
                    .collect()
            };

            let mut reflected = along(&simplex[k].0, NM_REFLECT);
            let fr = evaluate_subspace(t, x, dims, &mut reflected);
            if fr < best {
                let mut expanded = along(&simplex[k].0, NM_REFLECT * NM_EXPAND);
                let fe = evaluate_subspace(t, x, dims, &mut expanded);
                simplex[k] = if fe < fr { (expanded, fe) } else { (reflected, fr) };
            } else if fr < simplex[k - 1].1 {
                simplex[k] = (reflected, fr);
            } else {
                let (mut contracted, limit) = if fr < worst {
                    (along(&simplex[k].0, NM_REFLECT * NM_CONTRACT), fr)
                } else {
                    (along(&simplex[k].0, -NM_CONTRACT), worst)
                };
                let fc = evaluate_subspace(t, x, dims, &mut contracted);
                if fc < limit {
                    simplex[k] = (contracted, fc);
                } else {
                    let anchor = simplex[0].0.clone();
                    for vertex in simplex.iter_mut().skip(1) {
                        let mut v: Vec<f64> = anchor
                            .iter()
                            .zip(&vertex.0)
                            .map(|(&a, &p)| a + (p - a) * NM_SHRINK)
                            .collect();
                        let f = evaluate_subspace(t, x, dims, &mut v);
                        *vertex = (v, f);
                    }
                }
            }
        }

        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        let (best, f) = &simplex[0];
        for (j, &d) in dims.iter().enumerate() {
            x[d] = best[j];
        }
        *fx = *f;
    }

    fn lbfgs<O: Objective + ?Sized>(&self, t: &mut Tracker<'_, O>, mut x: Vec<f64>) -> bool {
        let n = x.len();
        let mut steps = vec![0.0; n];
        t.objective.initial_step_sizes(&mut steps);
        let max_step = steps.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        let max_step = if max_step > 0.0 { max_step } else { 1.0 };

        let mut g = vec![0.0; n];
        let mut fx = t.evaluate(&x, Some(&mut g));
        let mut history: VecDeque<(Vec<f64>, Vec<f64>, f64)> = VecDeque::with_capacity(LBFGS_MEMORY);

        while !t.exhausted() {
            if dot(&g, &g).sqrt() <= GRADIENT_FLOOR {
                return true;
            }
            let mut d = two_loop_direction(&g, &history);
            if dot(&d, &g) >= 0.0 {
                history.clear();
                d = g.iter().map(|v| -v).collect();
            }
            if history.is_empty() {
                let largest = d.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
                if largest > max_step {
                    let s = max_step / largest;
                    d.iter_mut().for_each(|v| *v *= s);
                }
            }

            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let mut xn: Vec<f64> = x.iter().zip(&d).map(|(xi, di)| xi + alpha * di).collect();
                t.project(&mut xn);
                let taken: Vec<f64> = xn.iter().zip(&x).map(|(a, b)| a - b).collect();
                let mut gn = vec![0.0; n];
                let fnew = t.evaluate(&xn, Some(&mut gn));
                if fnew < fx && fnew <= fx + ARMIJO * dot(&g, &taken) {
                    accepted = Some((xn, gn, fnew));
                    break;
                }
                if t.exhausted() {
                    break;
                }
                alpha *= BACKTRACK;
            }

            let Some((xn, gn, fnew)) = accepted else {
                if t.exhausted() {
                    return false;
                }
                if history.is_empty() {
                    // Not even steepest descent improves any more.
                    return true;
                }
                history.clear();
                continue;
            };

            let s: Vec<f64> = xn.iter().zip(&x).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = gn.iter().zip(&g).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &y);
            if sy > f64::EPSILON * dot(&y, &y).sqrt() * dot(&s, &s).sqrt() {
                if history.len() == LBFGS_MEMORY {
                    history.pop_front();
                }
                history.push_back((s, y, 1.0 / sy));
            }

            let f_before = fx;
            x = xn;
            g = gn;
            fx = fnew;
            if improvement_negligible(&self.config, f_before, fx) {
                return true;
            }
        }
        false
    }
}

/// Evaluate `x` with the coordinates `dims` replaced by `v`, both projected
/// into the limits.
fn evaluate_subspace<O: Objective + ?Sized>(
    t: &mut Tracker<'_, O>,
    x: &mut [f64],
    dims: &[usize],
    v: &mut [f64],
) -> f64 {
    for (j, &d) in dims.iter().enumerate() {
        x[d] = v[j];
    }
    t.project(x);
    for (j, &d) in dims.iter().enumerate() {
        v[j] = x[d];
    }
    t.evaluate(x, None)
}

/// Split the parameters into subspaces of 2..=5, largest movement first.
fn partition_subspaces(movement: &[f64]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..movement.len()).collect();
    order.sort_by(|&a, &b| movement[b].total_cmp(&movement[a]));
    let mut out: Vec<Vec<usize>> = order.chunks(SUBSPACE_MAX).map(<[usize]>::to_vec).collect();
    if out.len() > 1 && out.last().is_some_and(|l| l.len() < SUBSPACE_MIN) {
        if let Some(tail) = out.pop() {
            if let Some(prev) = out.last_mut() {
                prev.extend(tail);
            }
        }
    }
    out
}

/// `-H g` from the stored curvature pairs.
fn two_loop_direction(g: &[f64], history: &VecDeque<(Vec<f64>, Vec<f64>, f64)>) -> Vec<f64> {
    let mut q = g.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    for (s, y, rho) in history.iter().rev() {
        let a = rho * dot(s, &q);
        for (qi, yi) in q.iter_mut().zip(y) {
            *qi -= a * yi;
        }
        alphas.push(a);
    }
    let gamma = history
        .back()
        .map_or(1.0, |(s, y, _)| dot(s, y) / dot(y, y).max(f64::MIN_POSITIVE));
    let mut r: Vec<f64> = q.iter().map(|v| v * gamma).collect();
    for ((s, y, rho), a) in history.iter().zip(alphas.iter().rev()) {
        let b = rho * dot(y, &r);
        for (ri, si) in r.iter_mut().zip(s) {
            *ri += si * (a - b);
        }
    }
    r.iter().map(|v| -v).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sum of (x_i - c_i)^2 weighted by 1..n, or the Rosenbrock valley.
    struct Bowl {
        x: Vec<f64>,
        center: Vec<f64>,
        rosenbrock: bool,
        gradient: bool,
        limits: Option<(Vec<f64>, Vec<f64>)>,
        last: f64,
    }

    impl Bowl {
        fn new(start: Vec<f64>, center: Vec<f64>, gradient: bool) -> Self {
            Self {
                x: start,
                center,
                rosenbrock: false,
                gradient,
                limits: None,
                last: 0.0,
            }
        }

        fn rosenbrock(gradient: bool) -> Self {
            Self {
                rosenbrock: true,
                ..Self::new(vec![-1.2, 1.0], vec![1.0, 1.0], gradient)
            }
        }
    }

    impl Objective for Bowl {
        fn size(&self) -> usize {
            self.x.len()
        }

        fn evaluate(&mut self, x: &[f64], grad: Option<&mut [f64]>) -> f64 {
            self.set_state(x);
            let (value, g) = if self.rosenbrock {
                let (a, b) = (x[0], x[1]);
                let v = (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2);
                let g = vec![-2.0 * (1.0 - a) - 400.0 * a * (b - a * a), 200.0 * (b - a * a)];
                (v, g)
            } else {
                let mut v = 0.0;
                let mut g = Vec::with_capacity(x.len());
                for (i, (&xi, &ci)) in x.iter().zip(&self.center).enumerate() {
                    let w = (i + 1) as f64;
                    v += w * (xi - ci).powi(2);
                    g.push(2.0 * w * (xi - ci));
                }
                (v, g)
            };
            if let Some(grad) = grad {
                grad.copy_from_slice(&g);
            }
            self.last = value;
            value
        }

        fn state(&self, x: &mut [f64]) {
            x.copy_from_slice(&self.x);
        }

        fn set_state(&mut self, x: &[f64]) {
            self.x.copy_from_slice(x);
        }

        fn initial_step_sizes(&self, steps: &mut [f64]) {
            steps.fill(0.5);
        }

        fn bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
            self.limits.clone()
        }

        fn energy_term_names(&self) -> &'static [&'static str] {
            &["total"]
        }

        fn last_energy_terms(&self) -> Vec<f64> {
            vec![self.last]
        }

        fn provides_gradient(&self) -> bool {
            self.gradient
        }
    }

    fn tight() -> Optimizer {
        Optimizer::new(OptimizerConfig::default().with_tolerance(1e-12))
    }

    #[test]
    fn subplex_finds_bowl_minimum() {
        let center = vec![1.0, -2.0, 3.0, 0.5, -1.0, 2.0, 0.0];
        let mut bowl = Bowl::new(vec![0.0; 7], center.clone(), false);
        let outcome = tight().run(&mut bowl);
        assert!(outcome.converged);
        for (x, c) in bowl.x.iter().zip(&center) {
            assert!((x - c).abs() < 1e-3, "{x} vs {c}");
        }
        assert_eq!(outcome.terms.len(), 1);
        assert_eq!(outcome.terms[0].name, "total");
        assert!((outcome.terms[0].value - outcome.energy).abs() < 1e-15);
    }

    #[test]
    fn lbfgs_finds_bowl_minimum() {
        let center = vec![1.0, -2.0, 3.0, 0.5];
        let mut bowl = Bowl::new(vec![10.0; 4], center.clone(), true);
        let outcome = tight().run(&mut bowl);
        assert!(outcome.converged);
        assert!(outcome.energy < 1e-10);
        for (x, c) in bowl.x.iter().zip(&center) {
            assert!((x - c).abs() < 1e-5);
        }
    }

    #[test]
    fn lbfgs_follows_the_rosenbrock_valley() {
        let mut valley = Bowl::rosenbrock(true);
        let outcome = tight().run(&mut valley);
        assert!(outcome.energy < 1e-6, "{outcome:?}");
        assert!((valley.x[0] - 1.0).abs() < 1e-2);
        assert!((valley.x[1] - 1.0).abs() < 1e-2);
    }

    #[test]
    fn exhausted_budget_keeps_best_state() {
        let mut bowl = Bowl::new(vec![5.0; 3], vec![0.0; 3], false);
        let start_energy = 5.0_f64.powi(2) * 6.0;
        let optimizer = Optimizer::new(OptimizerConfig::default().with_max_evaluations(12));
        let outcome = optimizer.run(&mut bowl);
        assert!(!outcome.converged);
        assert!(outcome.evaluations <= 12);
        assert!(outcome.energy < start_energy);
        // The objective holds the reported state.
        let mut x = vec![0.0; 3];
        bowl.state(&mut x);
        assert!((bowl.evaluate(&x, None) - outcome.energy).abs() < 1e-12);
    }

    #[test]
    fn bounds_clamp_the_result() {
        for gradient in [false, true] {
            let mut bowl = Bowl::new(vec![0.0, 0.0], vec![3.0, 3.0], gradient);
            bowl.limits = Some((vec![-1.0, -1.0], vec![1.0, 2.0]));
            tight().run(&mut bowl);
            assert!((bowl.x[0] - 1.0).abs() < 1e-3, "{:?}", bowl.x);
            assert!((bowl.x[1] - 2.0).abs() < 1e-3, "{:?}", bowl.x);
        }
    }

    #[test]
    fn subspaces_cover_every_parameter_once() {
        let movement = [0.1, 5.0, 0.3, 2.0, 0.0, 1.0, 4.0];
        let parts = partition_subspaces(&movement);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], vec![0, 4]);
        assert_eq!(parts[0], vec![1, 6, 3, 5, 2]);
        let mut all: Vec<usize> = parts.concat();
        all.sort_unstable();
        assert_eq!(all, (0..7).collect::<Vec<_>>());

        let single = partition_subspaces(&[1.0; 6]);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].len(), 6);
    }
}
