//! The solver context and trial driver.
//!
//! [`Solver`] owns every mutable buffer of a run: the trail matrices, the
//! colony, the best-so-far / restart-best / global-best records and the RNG
//! stream. A run consists of `max_tries` independent tries; each try loops
//! construct -> local search (with the regression guard) -> statistics ->
//! pheromone update -> search control until the termination condition holds.

use std::time::Instant;

use anyhow::{bail, Result};
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::ant::{arc_distance, find_best, find_worst, Ant};
use crate::heuristics::construction::{build_tour, nearest_neighbour_tour_length, AcsRule};
use crate::heuristics::local_search::{LocalSearch, LsVariant};
use crate::heuristics::packing::PackingEvaluator;
use crate::instance::ThopInstance;
use crate::pheromone::Trails;

/// Hard colony-size limit.
pub const MAX_ANTS: usize = 1024;
/// Hard neighbour-list depth limit.
pub const MAX_NEIGHBOURS: usize = 512;

/// ACS local-update strength.
const ACS_XI: f64 = 0.1;
/// Best-worst mutation rate before the `nn_ants / n` scaling.
const BWAS_MUTATION_RATE: f64 = 0.3;

/// The six supported pheromone-update rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    AntSystem,
    ElitistAntSystem,
    RankBasedAntSystem,
    MaxMinAntSystem,
    BestWorstAntSystem,
    AntColonySystem,
}

/// Tuning parameters of a run.
#[derive(Debug, Clone)]
pub struct AcoConfig {
    pub algorithm: Algorithm,
    pub max_tries: usize,
    /// Minimum number of tour constructions per try (0 defers to the time
    /// limit alone).
    pub max_tours: u64,
    /// Randomised packing fills per tour.
    pub packing_tries: usize,
    /// Runtime budget of one try in seconds; negative means the
    /// `ceil(m / 10)` default of the original solver.
    pub time_limit: f64,
    pub seed: u64,
    /// Fitness bound that ends the try when reached (`UB + 1 - profit`).
    pub optimal: i64,
    /// Colony size; 0 means one ant per city.
    pub n_ants: usize,
    pub nn_ants: usize,
    pub alpha: f64,
    pub beta: f64,
    pub rho: f64,
    pub q_0: f64,
    /// Weight of the best-so-far deposit in EAS; 0 defaults to the number
    /// of cities.
    pub elitist_ants: usize,
    pub ras_ranks: usize,
    pub local_search: Option<LsVariant>,
    pub nn_ls: usize,
    pub use_dlb: bool,
    /// Branching-factor threshold of the MMAS restart test.
    pub branch_fac: f64,
}

impl AcoConfig {
    /// Literature defaults for `algorithm`, with the local-search overrides
    /// applied when a variant is selected.
    pub fn for_algorithm(algorithm: Algorithm, local_search: Option<LsVariant>) -> Self {
        let mut cfg = AcoConfig {
            algorithm,
            max_tries: 1,
            max_tours: 0,
            packing_tries: 1,
            time_limit: -1.0,
            seed: 42,
            optimal: 1,
            n_ants: 25,
            nn_ants: 20,
            alpha: 1.0,
            beta: 2.0,
            rho: 0.02,
            q_0: 0.0,
            elitist_ants: 0,
            ras_ranks: 0,
            local_search,
            nn_ls: 20,
            use_dlb: true,
            branch_fac: 1.00001,
        };

        match algorithm {
            Algorithm::AntSystem => {
                cfg.n_ants = 0;
                cfg.rho = 0.5;
            }
            Algorithm::ElitistAntSystem => {
                cfg.n_ants = 0;
                cfg.rho = 0.5;
            }
            Algorithm::RankBasedAntSystem => {
                cfg.n_ants = 0;
                cfg.rho = 0.1;
                cfg.ras_ranks = 6;
            }
            Algorithm::MaxMinAntSystem => {
                cfg.n_ants = 25;
                cfg.rho = 0.02;
            }
            Algorithm::BestWorstAntSystem => {
                cfg.n_ants = 0;
                cfg.rho = 0.1;
            }
            Algorithm::AntColonySystem => {
                cfg.n_ants = 10;
                cfg.rho = 0.1;
                cfg.q_0 = 0.9;
            }
        }

        if local_search.is_some() {
            cfg.n_ants = 25;
            cfg.rho = 0.5;
            cfg.q_0 = 0.0;
            match algorithm {
                Algorithm::MaxMinAntSystem => {
                    cfg.rho = 0.2;
                }
                Algorithm::AntColonySystem => {
                    cfg.n_ants = 10;
                    cfg.rho = 0.1;
                    cfg.q_0 = 0.98;
                }
                Algorithm::ElitistAntSystem => {
                    cfg.elitist_ants = cfg.n_ants;
                }
                _ => {}
            }
        }

        cfg
    }
}

impl Default for AcoConfig {
    fn default() -> Self {
        Self::for_algorithm(Algorithm::MaxMinAntSystem, None)
    }
}

/// Outcome of one try.
#[derive(Debug, Clone, Serialize)]
pub struct TryStats {
    pub try_index: usize,
    pub best_profit: i64,
    pub best_fitness: i64,
    pub found_at_iteration: u64,
    pub time_best_found: f64,
    pub time_total: f64,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub tries: Vec<TryStats>,
    /// Global best across all tries, a full solution record.
    pub best: Ant,
}

pub struct Solver<'a> {
    instance: &'a ThopInstance,
    cfg: AcoConfig,
    trails: Trails,
    nn_list: Vec<Vec<usize>>,
    ants: Vec<Ant>,
    prev_ls: Vec<Ant>,
    best_so_far: Ant,
    restart_best: Ant,
    global_best: Ant,
    packing: PackingEvaluator,
    local_search: Option<LocalSearch>,
    rng: ChaCha8Rng,
    nn_tour_len: i64,

    // per-try state
    start: Instant,
    iteration: u64,
    restart_iteration: u64,
    restart_time: f64,
    n_tours: u64,
    found_best: u64,
    restart_found_best: u64,
    time_used: f64,
    trail_min: f64,
    trail_max: f64,
    trail_0: f64,
    u_gb: u64,
    lambda: f64,
    branching_factor: f64,
}

impl<'a> Solver<'a> {
    pub fn new(instance: &'a ThopInstance, mut cfg: AcoConfig) -> Result<Self> {
        if cfg.n_ants == 0 {
            cfg.n_ants = instance.n;
        }
        if cfg.algorithm == Algorithm::ElitistAntSystem && cfg.elitist_ants == 0 {
            cfg.elitist_ants = instance.n;
        }
        if cfg.time_limit < 0.0 {
            cfg.time_limit = (instance.m as f64 / 10.0).ceil();
        }
        cfg.nn_ants = cfg.nn_ants.min(instance.n - 1);
        cfg.nn_ls = cfg.nn_ls.min(instance.n - 1);

        if cfg.n_ants >= MAX_ANTS {
            bail!("{} ants requested, limit is {}", cfg.n_ants, MAX_ANTS);
        }
        if cfg.nn_ants >= MAX_NEIGHBOURS {
            bail!("{} construction neighbours requested, limit is {}", cfg.nn_ants, MAX_NEIGHBOURS);
        }
        if cfg.nn_ants == 0 {
            bail!("construction needs at least one neighbour");
        }
        if cfg.algorithm == Algorithm::RankBasedAntSystem && cfg.ras_ranks < 2 {
            bail!("rank-based update needs at least two ranks");
        }

        let depth = cfg.nn_ants.max(cfg.nn_ls);
        let nn_list = instance.compute_nn_lists(depth);
        let trails = Trails::new(instance, cfg.alpha, cfg.beta);
        let ants = (0..cfg.n_ants).map(|_| Ant::new(instance.n, instance.m)).collect();
        let prev_ls = (0..cfg.n_ants).map(|_| Ant::new(instance.n, instance.m)).collect();
        let packing = PackingEvaluator { tries: cfg.packing_tries.max(1) };
        let local_search = cfg.local_search.map(|variant| LocalSearch {
            variant,
            nn_ls: cfg.nn_ls,
            use_dlb: cfg.use_dlb,
        });
        let rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        let nn_tour_len = nearest_neighbour_tour_length(instance);

        Ok(Solver {
            instance,
            trails,
            nn_list,
            ants,
            prev_ls,
            best_so_far: Ant::new(instance.n, instance.m),
            restart_best: Ant::new(instance.n, instance.m),
            global_best: Ant::new(instance.n, instance.m),
            packing,
            local_search,
            rng,
            nn_tour_len,
            start: Instant::now(),
            iteration: 1,
            restart_iteration: 1,
            restart_time: 0.0,
            n_tours: 1,
            found_best: 0,
            restart_found_best: 0,
            time_used: 0.0,
            trail_min: 0.0,
            trail_max: 0.0,
            trail_0: 0.0,
            u_gb: u64::MAX,
            lambda: 0.05,
            branching_factor: 0.0,
            cfg,
        })
    }

    /// The parameter settings of this run, with all defaults resolved.
    pub fn config(&self) -> &AcoConfig {
        &self.cfg
    }

    /// Run all tries and return the per-try statistics plus the global best.
    pub fn run(&mut self) -> RunOutcome {
        let mut tries = Vec::with_capacity(self.cfg.max_tries);

        for n_try in 0..self.cfg.max_tries {
            self.init_try(n_try);
            while !self.termination() {
                self.construct_solutions();
                if self.local_search.is_some() {
                    self.local_search_phase();
                }
                self.update_statistics();
                self.pheromone_trail_update();
                self.search_control();
                self.iteration += 1;
            }
            tries.push(self.exit_try(n_try));
        }

        RunOutcome { tries, best: self.global_best.clone() }
    }

    #[inline]
    fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn termination(&self) -> bool {
        (self.n_tours >= self.cfg.max_tours && self.elapsed() >= self.cfg.time_limit)
            || self.best_so_far.fitness <= self.cfg.optimal
    }

    fn init_try(&mut self, n_try: usize) {
        info!("begin try {}", n_try);
        self.start = Instant::now();
        self.time_used = 0.0;
        self.n_tours = 1;
        self.iteration = 1;
        self.restart_iteration = 1;
        self.restart_time = 0.0;
        self.lambda = 0.05;
        self.found_best = 0;
        self.restart_found_best = 0;
        self.u_gb = u64::MAX;
        self.branching_factor = 0.0;
        self.best_so_far.fitness = i64::MAX;
        self.restart_best.fitness = i64::MAX;

        let nn = self.nn_tour_len as f64;
        let n = self.instance.n as f64;
        match self.cfg.algorithm {
            Algorithm::AntSystem | Algorithm::ElitistAntSystem | Algorithm::RankBasedAntSystem => {
                self.trail_0 = 1.0 / (self.cfg.rho * nn);
                self.trails.init(self.trail_0);
            }
            Algorithm::MaxMinAntSystem => {
                self.trail_max = 1.0 / (self.cfg.rho * nn);
                self.trail_min = self.trail_max / (2.0 * n);
                self.trail_0 = self.trail_max;
                self.trails.init(self.trail_max);
            }
            Algorithm::BestWorstAntSystem | Algorithm::AntColonySystem => {
                self.trail_0 = 1.0 / (n * nn);
                self.trails.init(self.trail_0);
            }
        }
        self.trails.compute_total();
    }

    fn exit_try(&mut self, n_try: usize) -> TryStats {
        if self.best_so_far.fitness < self.global_best.fitness {
            self.global_best.clone_from(&self.best_so_far);
        }
        let stats = TryStats {
            try_index: n_try,
            best_profit: self.best_so_far.profit(self.instance.ub),
            best_fitness: self.best_so_far.fitness,
            found_at_iteration: self.found_best,
            time_best_found: self.time_used,
            time_total: self.elapsed(),
        };
        info!(
            "end try {}: best profit {} found at iteration {}",
            n_try, stats.best_profit, stats.found_at_iteration
        );
        stats
    }

    /// Let every ant build and score a tour.
    fn construct_solutions(&mut self) {
        let acs = if self.cfg.algorithm == Algorithm::AntColonySystem {
            Some(AcsRule { q_0: self.cfg.q_0, xi: ACS_XI, tau_0: self.trail_0 })
        } else {
            None
        };
        let packing = self.packing;

        for k in 0..self.cfg.n_ants {
            build_tour(
                &mut self.ants[k],
                &mut self.trails,
                self.instance,
                &self.nn_list,
                self.cfg.nn_ants,
                acs,
                &mut self.rng,
            );
            let ant = &mut self.ants[k];
            ant.fitness =
                packing.evaluate(self.instance, &ant.tour, &mut ant.packing_plan, &mut self.rng);
        }
        self.n_tours += self.cfg.n_ants as u64;
    }

    /// Optimise every tour, rescoring afterwards. An ant whose fitness got
    /// worse is rolled back: shorter tours are not monotone in ThOP fitness.
    fn local_search_phase(&mut self) {
        let Some(ls) = self.local_search else { return };
        let packing = self.packing;

        for k in 0..self.cfg.n_ants {
            self.prev_ls[k].clone_from(&self.ants[k]);
        }

        for k in 0..self.cfg.n_ants {
            ls.optimize(&mut self.ants[k].tour, self.instance, &self.nn_list, &mut self.rng);
            let ant = &mut self.ants[k];
            ant.fitness =
                packing.evaluate(self.instance, &ant.tour, &mut ant.packing_plan, &mut self.rng);
            if self.termination() {
                break;
            }
        }

        for k in 0..self.cfg.n_ants {
            if self.ants[k].fitness > self.prev_ls[k].fitness {
                self.ants[k].clone_from(&self.prev_ls[k]);
            }
        }
    }

    /// Track best-so-far / restart-best and refresh the MMAS trail limits
    /// when a new best-so-far appears.
    fn update_statistics(&mut self) {
        let best_k = find_best(&self.ants);

        if self.ants[best_k].fitness < self.best_so_far.fitness {
            self.time_used = self.elapsed();
            self.best_so_far.clone_from(&self.ants[best_k]);
            self.found_best = self.iteration;
            self.restart_found_best = self.iteration;
            self.branching_factor =
                self.trails.node_branching(self.lambda, &self.nn_list, self.cfg.nn_ants);

            if self.cfg.algorithm == Algorithm::MaxMinAntSystem {
                let fitness = self.best_so_far.fitness as f64;
                self.trail_max = 1.0 / (self.cfg.rho * fitness);
                if self.local_search.is_some() {
                    self.trail_min = self.trail_max / (2.0 * self.instance.n as f64);
                } else {
                    let p_x = (0.05f64.ln() / self.instance.n as f64).exp();
                    let scale = (1.0 - p_x) / (p_x * ((self.cfg.nn_ants + 1) / 2) as f64);
                    self.trail_min = self.trail_max * scale;
                }
                self.trail_0 = self.trail_max;
            }

            info!(
                "new best: profit {} (fitness {}) at iteration {} after {:.2}s",
                self.best_so_far.profit(self.instance.ub),
                self.best_so_far.fitness,
                self.iteration,
                self.time_used
            );
        }

        if self.ants[best_k].fitness < self.restart_best.fitness {
            self.restart_best.clone_from(&self.ants[best_k]);
            self.restart_found_best = self.iteration;
        }
    }

    /// Evaporation, variant deposit, MMAS clamping and the combined-info
    /// refresh, in that order.
    fn pheromone_trail_update(&mut self) {
        let ls_on = self.local_search.is_some();
        let mmas = self.cfg.algorithm == Algorithm::MaxMinAntSystem;

        // ACS evaporates inside its own deposit
        if self.cfg.algorithm != Algorithm::AntColonySystem {
            if ls_on {
                if mmas {
                    self.trails
                        .evaporate_nn_clamped(self.cfg.rho, &self.nn_list, self.trail_min);
                } else {
                    self.trails.evaporate_nn(self.cfg.rho, &self.nn_list);
                }
            } else {
                self.trails.evaporate(self.cfg.rho);
            }
        }

        match self.cfg.algorithm {
            Algorithm::AntSystem => self.as_update(),
            Algorithm::ElitistAntSystem => self.eas_update(),
            Algorithm::RankBasedAntSystem => self.ras_update(),
            Algorithm::MaxMinAntSystem => self.mmas_update(),
            Algorithm::BestWorstAntSystem => self.bwas_update(),
            Algorithm::AntColonySystem => {
                self.trails
                    .acs_global_update(&self.best_so_far, self.instance.n, self.cfg.rho);
            }
        }

        if mmas && !ls_on {
            self.trails.clamp(self.trail_min, self.trail_max);
        }

        if self.cfg.algorithm != Algorithm::AntColonySystem {
            if ls_on {
                self.trails.compute_total_nn(&self.nn_list);
            } else {
                self.trails.compute_total();
            }
        }
    }

    fn as_update(&mut self) {
        let n = self.instance.n;
        for ant in &self.ants {
            self.trails.deposit(&ant.tour, n, 1.0 / ant.fitness as f64);
        }
    }

    fn eas_update(&mut self) {
        self.as_update();
        let n = self.instance.n;
        let weight = self.cfg.elitist_ants as f64 / self.best_so_far.fitness as f64;
        self.trails.deposit(&self.best_so_far.tour, n, weight);
    }

    fn ras_update(&mut self) {
        let n = self.instance.n;
        let ranks = self.cfg.ras_ranks;
        let mut order: Vec<usize> = (0..self.ants.len()).collect();
        order.sort_by_key(|&k| self.ants[k].fitness);

        for r in 1..ranks.min(self.ants.len() + 1) {
            let ant = &self.ants[order[r - 1]];
            self.trails
                .deposit(&ant.tour, n, (ranks - r) as f64 / ant.fitness as f64);
        }
        self.trails.deposit(
            &self.best_so_far.tour,
            n,
            ranks as f64 / self.best_so_far.fitness as f64,
        );
    }

    fn mmas_update(&mut self) {
        let n = self.instance.n;

        if self.iteration % self.u_gb != 0 {
            let best_k = find_best(&self.ants);
            let ant = &self.ants[best_k];
            self.trails.deposit(&ant.tour, n, 1.0 / ant.fitness as f64);
        } else if self.u_gb == 1 && self.iteration - self.restart_found_best > 50 {
            self.trails.deposit(
                &self.best_so_far.tour,
                n,
                1.0 / self.best_so_far.fitness as f64,
            );
        } else {
            self.trails.deposit(
                &self.restart_best.tour,
                n,
                1.0 / self.restart_best.fitness as f64,
            );
        }

        // frequency schedule for switching to best-so-far deposits
        if self.local_search.is_some() {
            let since_restart = self.iteration - self.restart_iteration;
            self.u_gb = if since_restart < 25 {
                25
            } else if since_restart < 75 {
                5
            } else if since_restart < 125 {
                3
            } else if since_restart < 250 {
                2
            } else {
                1
            };
        } else {
            self.u_gb = 25;
        }
    }

    fn bwas_update(&mut self) {
        let n = self.instance.n;
        self.trails.deposit(
            &self.best_so_far.tour,
            n,
            1.0 / self.best_so_far.fitness as f64,
        );

        let worst_k = find_worst(&self.ants);
        self.trails
            .punish_worst_arcs(&self.ants[worst_k], &self.best_so_far, n, self.cfg.rho);

        let distance = arc_distance(&self.best_so_far, &self.ants[worst_k], n);
        if (distance as f64) < 0.05 * n as f64 {
            debug!("best and worst tours converged, reinitialising trails");
            self.restart_best.fitness = i64::MAX;
            self.trails.init(self.trail_0);
            self.restart_iteration = self.iteration;
            self.restart_time = self.elapsed();
        } else {
            self.bwas_mutation();
        }
    }

    fn bwas_mutation(&mut self) {
        let n = self.instance.n;
        let avg_trail = self.trails.average_on_tour(&self.best_so_far.tour, n);

        let progress = if self.cfg.time_limit > 0.1 {
            ((self.elapsed() - self.restart_time) / (self.cfg.time_limit - self.restart_time))
                .max(0.0)
        } else if self.cfg.max_tours > 100 {
            (self.iteration - self.restart_iteration) as f64
                / (self.cfg.max_tours as f64 - self.restart_iteration as f64)
        } else {
            0.0
        };
        let strength = 4.0 * avg_trail * progress;

        let rate = BWAS_MUTATION_RATE / n as f64 * self.cfg.nn_ants as f64;
        let mutations = if self.restart_iteration < 2 {
            0
        } else {
            (n as f64 * rate / 2.0) as usize
        };
        self.trails.mutate(mutations, strength, &mut self.rng);
    }

    /// Every 100 iterations: population statistics, branching factor and
    /// the MMAS stagnation restart.
    fn search_control(&mut self) {
        if self.iteration % 100 != 0 {
            return;
        }

        self.population_statistics();
        self.branching_factor =
            self.trails.node_branching(self.lambda, &self.nn_list, self.cfg.nn_ants);
        debug!(
            "iteration {}: branching factor {:.5}",
            self.iteration, self.branching_factor
        );

        if self.cfg.algorithm == Algorithm::MaxMinAntSystem
            && self.branching_factor < self.cfg.branch_fac
            && self.iteration - self.restart_found_best > 250
        {
            info!("trail reinitialisation at iteration {}", self.iteration);
            self.trails.init(self.trail_max);
            self.trails.compute_total();
            self.restart_iteration = self.iteration;
            self.restart_time = self.elapsed();
        }
    }

    fn population_statistics(&self) {
        let fitnesses: Vec<f64> = self.ants.iter().map(|a| a.fitness as f64).collect();
        let mean = (&fitnesses).mean();
        let std_dev = (&fitnesses).std_dev();
        debug!(
            "iteration {}: colony fitness mean {:.1}, stddev {:.1}",
            self.iteration, mean, std_dev
        );
    }
}
