//! Population search over coarse layouts.
//!
//! Several species of [`IGraph`] candidates are refined locally at each
//! tolerance of a decreasing schedule and improved by mutation in between.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::geom::{BBox, Point3};
use crate::graph::IGraph;
use crate::graph::intermediate::random_point_in;

use super::coarse::{CoarseObjective, CoarseScales, CoarseTopology};
use super::minimizer::{OptOutcome, Optimizer, OptimizerConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub species: usize,
    pub population: usize,
    /// Mutants tried per species at each tolerance.
    pub mutations: usize,
    /// Relative tolerances of the refinement schedule, loosest first.
    pub tolerances: Vec<f64>,
    pub final_tolerance: f64,
    /// Evaluation budget of one refinement.
    pub max_evaluations: usize,
    /// Random placements stay inside the start bounding box grown by this
    /// fraction of its diagonal.
    pub bbox_margin: f64,
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            species: 3,
            population: 4,
            mutations: 6,
            tolerances: vec![1e-1, 1e-2, 1e-3],
            final_tolerance: 1e-5,
            max_evaluations: 5000,
            bbox_margin: 0.25,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Individual<M> {
    graph: IGraph<M>,
    energy: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome<M> {
    pub graph: IGraph<M>,
    /// Result of the final tight refinement.
    pub outcome: OptOutcome,
    /// Local refinements run, final one included.
    pub refinements: usize,
}

pub struct SpeciesSearch {
    config: SearchConfig,
    scales: CoarseScales,
}

fn refine<M>(graph: &mut IGraph<M>, topology: &CoarseTopology, scales: CoarseScales, optimizer: &Optimizer) -> OptOutcome {
    let mut objective = CoarseObjective::new(graph, topology, scales);
    optimizer.run(&mut objective)
}

#[cfg(feature = "parallel")]
fn refine_all<M: Send + Sync>(
    individuals: &mut [Individual<M>],
    topology: &CoarseTopology,
    scales: CoarseScales,
    optimizer: &Optimizer,
) {
    individuals.par_iter_mut().for_each(|ind| {
        ind.energy = refine(&mut ind.graph, topology, scales, optimizer).energy;
    });
}

#[cfg(not(feature = "parallel"))]
fn refine_all<M>(individuals: &mut [Individual<M>], topology: &CoarseTopology, scales: CoarseScales, optimizer: &Optimizer) {
    individuals.iter_mut().for_each(|ind| {
        ind.energy = refine(&mut ind.graph, topology, scales, optimizer).energy;
    });
}

fn sort_by_energy<M>(individuals: &mut [Individual<M>]) {
    individuals.sort_by(|a, b| a.energy.total_cmp(&b.energy));
}

/// Half the time swap the positions of two neighbours of a random referenced
/// node; otherwise, or when no such node exists, move one node to a random
/// spot in `bbox`.
fn mutate<M>(graph: &mut IGraph<M>, bbox: BBox, rng: &mut StdRng) {
    let n = graph.node_count();
    if n == 0 {
        return;
    }
    let hubs: Vec<usize> = (0..n)
        .filter(|&i| graph.node(i).reference.is_some() && graph.node(i).edges.len() >= 2)
        .collect();
    if !hubs.is_empty() && rng.random_bool(0.5) {
        let hub = hubs[rng.random_range(0..hubs.len())];
        let around: Vec<usize> = graph.neighbours(hub).collect();
        let a = rng.random_range(0..around.len());
        let mut b = rng.random_range(0..around.len() - 1);
        if b >= a {
            b += 1;
        }
        let (na, nb) = (around[a], around[b]);
        let (pa, pb) = (graph.node(na).position, graph.node(nb).position);
        graph.set_position(na, pb);
        graph.set_position(nb, pa);
    } else {
        let node = rng.random_range(0..n);
        graph.set_position(node, random_point_in(bbox, rng));
    }
}

impl SpeciesSearch {
    #[must_use]
    pub fn new(config: SearchConfig, scales: CoarseScales) -> Self {
        Self { config, scales }
    }

    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn optimizer(&self, tolerance: f64) -> Optimizer {
        Optimizer::new(
            OptimizerConfig::default()
                .with_tolerance(tolerance)
                .with_max_evaluations(self.config.max_evaluations),
        )
    }

    /// Search from `start`. The first individual of the first species keeps
    /// the start positions; all others are scattered at random.
    pub fn run<M: Clone + Send + Sync>(&self, start: &IGraph<M>) -> SearchOutcome<M> {
        let topology = CoarseTopology::new(start);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let bbox = start
            .bounding_box()
            .map_or(BBox::new(Point3::ORIGIN, Point3::ORIGIN), |b| {
                b.expand_by(b.diagonal() * self.config.bbox_margin)
            });

        let population = self.config.population.max(1);
        let mut species: Vec<Vec<Individual<M>>> = (0..self.config.species.max(1))
            .map(|s| {
                (0..population)
                    .map(|i| {
                        let mut graph = start.clone();
                        if s > 0 || i > 0 {
                            graph.randomize(bbox, &mut rng);
                        }
                        Individual {
                            graph,
                            energy: f64::INFINITY,
                        }
                    })
                    .collect()
            })
            .collect();

        let mut refinements = 0;
        for &tolerance in &self.config.tolerances {
            let optimizer = self.optimizer(tolerance);
            for members in &mut species {
                refine_all(members, &topology, self.scales, &optimizer);
                refinements += members.len();
                sort_by_energy(members);
            }

            for members in &mut species {
                for _ in 0..self.config.mutations {
                    let parent = rng.random_range(0..members.len());
                    let mut mutant = members[parent].graph.clone();
                    mutate(&mut mutant, bbox, &mut rng);
                    let energy = refine(&mut mutant, &topology, self.scales, &optimizer).energy;
                    refinements += 1;
                    let worst = members.len() - 1;
                    if energy < members[worst].energy {
                        members[worst] = Individual { graph: mutant, energy };
                        sort_by_energy(members);
                    }
                }
            }

            let best = species
                .iter()
                .filter_map(|m| m.first())
                .map(|ind| ind.energy)
                .fold(f64::INFINITY, f64::min);
            log::debug!("species search: tolerance {tolerance:e}, best energy {best:.6e}");
        }

        let mut best = species
            .into_iter()
            .flatten()
            .min_by(|a, b| a.energy.total_cmp(&b.energy))
            .map_or_else(|| start.clone(), |ind| ind.graph);
        let outcome = refine(&mut best, &topology, self.scales, &self.optimizer(self.config.final_tolerance));
        refinements += 1;
        log::info!(
            "species search done: energy {:.6e} after {refinements} refinements",
            outcome.energy
        );
        SearchOutcome {
            graph: best,
            outcome,
            refinements,
        }
    }
}
