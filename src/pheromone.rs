//! Pheromone trails and combined choice information.
//!
//! [`Trails`] owns the symmetric pheromone matrix tau, the cached heuristic
//! matrix eta = 1/(d + 0.1) and the combined matrix
//! `total[i][j] = tau[i][j]^alpha * eta[i][j]^beta` that construction reads.
//! Deposits always write both triangle entries; evaporation over
//! neighbour-list arcs is per-direction, which is why readers must not
//! assume the matrix stays exactly symmetric between paired writes.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::ant::Ant;
use crate::instance::ThopInstance;

/// Floor for mutated trail entries.
const TRAIL_EPSILON: f64 = 1e-10;

pub struct Trails {
    n: usize,
    alpha: f64,
    beta: f64,
    tau: Vec<Vec<f64>>,
    total: Vec<Vec<f64>>,
    eta: Vec<Vec<f64>>,
}

impl Trails {
    pub fn new(instance: &ThopInstance, alpha: f64, beta: f64) -> Self {
        let n = instance.n;
        let mut eta = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                eta[i][j] = 1.0 / (instance.distance[i][j] as f64 + 0.1);
            }
        }
        Trails {
            n,
            alpha,
            beta,
            tau: vec![vec![0.0; n]; n],
            total: vec![vec![0.0; n]; n],
            eta,
        }
    }

    #[inline]
    pub fn tau(&self, i: usize, j: usize) -> f64 {
        self.tau[i][j]
    }

    #[inline]
    pub fn total(&self, i: usize, j: usize) -> f64 {
        self.total[i][j]
    }

    #[inline]
    fn combined(&self, i: usize, j: usize) -> f64 {
        self.tau[i][j].powf(self.alpha) * self.eta[i][j].powf(self.beta)
    }

    /// Reset every trail entry to `value`.
    pub fn init(&mut self, value: f64) {
        for row in &mut self.tau {
            row.fill(value);
        }
    }

    /// Uniform evaporation over the full matrix.
    pub fn evaporate(&mut self, rho: f64) {
        for row in &mut self.tau {
            for entry in row.iter_mut() {
                *entry *= 1.0 - rho;
            }
        }
    }

    /// Evaporation restricted to neighbour-list arcs.
    pub fn evaporate_nn(&mut self, rho: f64, nn_list: &[Vec<usize>]) {
        for i in 0..self.n {
            for &j in &nn_list[i] {
                self.tau[i][j] *= 1.0 - rho;
            }
        }
    }

    /// Neighbour-list evaporation with the MMAS lower limit folded in.
    pub fn evaporate_nn_clamped(&mut self, rho: f64, nn_list: &[Vec<usize>], trail_min: f64) {
        for i in 0..self.n {
            for &j in &nn_list[i] {
                self.tau[i][j] *= 1.0 - rho;
                if self.tau[i][j] < trail_min {
                    self.tau[i][j] = trail_min;
                }
            }
        }
    }

    /// Deposit `amount` on every arc of `tour`, both directions.
    pub fn deposit(&mut self, tour: &[usize], n: usize, amount: f64) {
        for i in 0..n {
            let (a, b) = (tour[i], tour[i + 1]);
            self.tau[a][b] += amount;
            self.tau[b][a] = self.tau[a][b];
        }
    }

    /// Clamp every entry into `[trail_min, trail_max]` (MMAS without local
    /// search).
    pub fn clamp(&mut self, trail_min: f64, trail_max: f64) {
        for row in &mut self.tau {
            for entry in row.iter_mut() {
                *entry = entry.clamp(trail_min, trail_max);
            }
        }
    }

    /// Recompute the combined matrix over all arcs.
    pub fn compute_total(&mut self) {
        for i in 0..self.n {
            for j in 0..self.n {
                self.total[i][j] = self.combined(i, j);
            }
        }
    }

    /// Recompute the combined matrix on neighbour-list arcs only, mirroring
    /// each refreshed entry.
    pub fn compute_total_nn(&mut self, nn_list: &[Vec<usize>]) {
        for i in 0..self.n {
            for idx in 0..nn_list[i].len() {
                let j = nn_list[i][idx];
                let value = self.combined(i, j);
                self.total[i][j] = value;
                self.total[j][i] = value;
            }
        }
    }

    /// ACS step-wise update on a single arc: pull the trail towards `tau_0`
    /// and refresh the combined entry.
    pub fn acs_local_update(&mut self, i: usize, j: usize, xi: f64, tau_0: f64) {
        self.tau[i][j] = (1.0 - xi) * self.tau[i][j] + xi * tau_0;
        self.tau[j][i] = self.tau[i][j];
        let value = self.combined(i, j);
        self.total[i][j] = value;
        self.total[j][i] = value;
    }

    /// ACS global update: coupled evaporation and deposit on the arcs of the
    /// best-so-far tour.
    pub fn acs_global_update(&mut self, best: &Ant, n: usize, rho: f64) {
        let d_tau = 1.0 / best.fitness as f64;
        for i in 0..n {
            let (a, b) = (best.tour[i], best.tour[i + 1]);
            self.tau[a][b] = (1.0 - rho) * self.tau[a][b] + rho * d_tau;
            self.tau[b][a] = self.tau[a][b];
            let value = self.combined(a, b);
            self.total[a][b] = value;
            self.total[b][a] = value;
        }
    }

    /// Extra evaporation on the arcs the iteration-worst tour does not share
    /// with the best-so-far tour (best-worst rule).
    pub fn punish_worst_arcs(&mut self, worst: &Ant, best: &Ant, n: usize, rho: f64) {
        let shared: std::collections::HashSet<(usize, usize)> = (0..n)
            .map(|i| {
                let (a, b) = (best.tour[i], best.tour[i + 1]);
                if a < b {
                    (a, b)
                } else {
                    (b, a)
                }
            })
            .collect();

        for i in 0..n {
            let (a, b) = (worst.tour[i], worst.tour[i + 1]);
            let key = if a < b { (a, b) } else { (b, a) };
            if !shared.contains(&key) {
                self.tau[a][b] *= 1.0 - rho;
                self.tau[b][a] = self.tau[a][b];
            }
        }
    }

    /// Best-worst mutation: perturb randomly chosen entries by `strength`,
    /// keeping trails strictly positive.
    pub fn mutate(&mut self, num_mutations: usize, strength: f64, rng: &mut ChaCha8Rng) {
        for _ in 0..num_mutations {
            let i = rng.gen_range(0..self.n);
            let j = rng.gen_range(0..self.n);
            if rng.gen::<f64>() < 0.5 {
                self.tau[i][j] += strength;
            } else {
                self.tau[i][j] -= strength;
                if self.tau[i][j] <= 0.0 {
                    self.tau[i][j] = TRAIL_EPSILON;
                }
            }
            self.tau[j][i] = self.tau[i][j];
        }
    }

    /// Mean trail level on the arcs of `tour`.
    pub fn average_on_tour(&self, tour: &[usize], n: usize) -> f64 {
        let sum: f64 = (0..n).map(|i| self.tau[tour[i]][tour[i + 1]]).sum();
        sum / n as f64
    }

    /// Mean node branching factor: per city, the count of outgoing
    /// neighbour-list arcs whose trail exceeds
    /// `min + lambda * (max - min)`, averaged and halved for symmetry.
    pub fn node_branching(&self, lambda: f64, nn_list: &[Vec<usize>], depth: usize) -> f64 {
        let mut branches = 0.0;
        for i in 0..self.n {
            let row = &nn_list[i][..depth.min(nn_list[i].len())];
            let mut min = self.tau[i][row[0]];
            let mut max = min;
            for &j in row.iter().skip(1) {
                let t = self.tau[i][j];
                if t > max {
                    max = t;
                }
                if t < min {
                    min = t;
                }
            }
            let cutoff = min + lambda * (max - min);
            for &j in row {
                if self.tau[i][j] > cutoff {
                    branches += 1.0;
                }
            }
        }
        branches / (self.n as f64 * 2.0)
    }

    /// Extremes of the trail matrix, for the MMAS bound invariants.
    pub fn bounds(&self) -> (f64, f64) {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for row in &self.tau {
            for &entry in row {
                lo = lo.min(entry);
                hi = hi.max(entry);
            }
        }
        (lo, hi)
    }
}
