//! Randomised greedy packing evaluator.
//!
//! Converts a fixed tour into a packing plan and a fitness value. Each try
//! draws three normalised weights, scores every item by
//! `-profit^a / (weight^b * remaining_distance^c)`, then greedily commits
//! items in score order, re-simulating the load-dependent travel time after
//! each tentative pick. The best try wins and the fitness returned is
//! `UB + 1 - profit`, so lower is better everywhere in the engine.

use ordered_float::OrderedFloat;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::instance::ThopInstance;

/// Slack applied to the travel-time feasibility comparison.
pub const TIME_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
pub struct PackingEvaluator {
    /// Number of randomised fills per tour (`--ptries`).
    pub tries: usize,
}

impl PackingEvaluator {
    /// Score `tour`, writing the best packing plan found into `plan`.
    ///
    /// The walk skips cities where nothing is collected; the speed at load
    /// `w` is `max_speed - (max_speed - min_speed) * w / capacity`.
    pub fn evaluate(
        &self,
        instance: &ThopInstance,
        tour: &[usize],
        plan: &mut [bool],
        rng: &mut ChaCha8Rng,
    ) -> i64 {
        let n = instance.n;
        let m = instance.m;
        let speed_slope = (instance.max_speed - instance.min_speed) / instance.capacity as f64;

        // cumulative tour distance up to each city
        let mut distance_acc = vec![0i64; n];
        let mut total_distance = 0i64;
        for i in 0..n {
            distance_acc[tour[i]] = total_distance;
            total_distance += instance.dist(tour[i], tour[i + 1]);
        }
        let end_distance = distance_acc[n - 2];

        let mut profit_acc = vec![0i64; n];
        let mut weight_acc = vec![0i64; n];
        let mut tmp_plan = vec![false; m];
        let mut best_profit = 0i64;
        plan.fill(false);

        for _ in 0..self.tries {
            profit_acc.fill(0);
            weight_acc.fill(0);

            let a = rng.gen::<f64>();
            let b = rng.gen::<f64>();
            let c = rng.gen::<f64>();
            let sum = a + b + c;
            let (a, b, c) = (a / sum, b / sum, c / sum);

            let mut order: Vec<usize> = (0..m).collect();
            order.sort_by_key(|&j| {
                let item = instance.items[j];
                let rest = (end_distance - distance_acc[item.city]) as f64;
                OrderedFloat(
                    -(item.profit as f64).powf(a)
                        / ((item.weight as f64).powf(b) * rest.powf(c)),
                )
            });

            let mut total_weight = 0i64;
            let mut total_profit = 0i64;

            for &j in &order {
                tmp_plan[j] = false;
                let item = instance.items[j];

                if total_weight + item.weight > instance.capacity {
                    continue;
                }

                profit_acc[item.city] += item.profit;
                weight_acc[item.city] += item.weight;

                // walk the tour with the tentative pick included
                let mut violates = false;
                let mut time = 0.0f64;
                let mut load = 0i64;
                let mut prev = 0usize;
                for i in 1..n - 1 {
                    let curr = tour[i];
                    if weight_acc[curr] == 0 && curr != n - 2 {
                        continue;
                    }
                    time += instance.dist(prev, curr) as f64
                        / (instance.max_speed - speed_slope * load as f64);
                    if time - TIME_EPSILON > instance.max_time {
                        violates = true;
                        break;
                    }
                    load += weight_acc[curr];
                    prev = curr;
                }

                if !violates {
                    total_profit += item.profit;
                    total_weight += item.weight;
                    tmp_plan[j] = true;
                } else {
                    profit_acc[item.city] -= item.profit;
                    weight_acc[item.city] -= item.weight;
                }
            }

            if total_profit > best_profit {
                best_profit = total_profit;
                plan.copy_from_slice(&tmp_plan);
            }
        }

        instance.ub + 1 - best_profit
    }
}
