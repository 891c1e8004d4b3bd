//! Result and log writers.
//!
//! The solution file uses the two-line bracket format: the 1-based tour
//! cities where items are collected, then the 1-based indices of the
//! collected items. The run log and the JSON summary record the parameter
//! settings and the per-try results.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

use crate::ant::Ant;
use crate::instance::ThopInstance;
use crate::solver::{AcoConfig, RunOutcome, TryStats};

/// Write the best solution in the two-line bracket format.
pub fn write_solution(path: &Path, instance: &ThopInstance, best: &Ant) -> Result<()> {
    let mut has_pick = vec![false; instance.n];
    for (item, &picked) in instance.items.iter().zip(&best.packing_plan) {
        if picked {
            has_pick[item.city] = true;
        }
    }

    let cities: Vec<String> = (1..instance.n - 2)
        .map(|i| best.tour[i])
        .filter(|&city| has_pick[city])
        .map(|city| (city + 1).to_string())
        .collect();
    let items: Vec<String> = best
        .packing_plan
        .iter()
        .enumerate()
        .filter(|(_, &picked)| picked)
        .map(|(i, _)| (i + 1).to_string())
        .collect();

    let mut file =
        File::create(path).with_context(|| format!("cannot create solution file {:?}", path))?;
    writeln!(file, "[{}]", cities.join(","))?;
    writeln!(file, "[{}]", items.join(","))?;
    Ok(())
}

/// Write the text run log: parameter settings plus one line per try.
pub fn write_log(
    path: &Path,
    cfg: &AcoConfig,
    instance: &ThopInstance,
    outcome: &RunOutcome,
) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("cannot create log file {:?}", path))?;

    writeln!(file, "{} run on {}", Local::now().format("%Y-%m-%d %H:%M:%S"), instance.name)?;
    writeln!(file)?;
    writeln!(file, "Parameter settings:")?;
    writeln!(file, "  algorithm     {:?}", cfg.algorithm)?;
    writeln!(file, "  tries         {}", cfg.max_tries)?;
    writeln!(file, "  tours         {}", cfg.max_tours)?;
    writeln!(file, "  ptries        {}", cfg.packing_tries)?;
    writeln!(file, "  time          {:.2}", cfg.time_limit)?;
    writeln!(file, "  seed          {}", cfg.seed)?;
    writeln!(file, "  optimum       {}", cfg.optimal)?;
    writeln!(file, "  ants          {}", cfg.n_ants)?;
    writeln!(file, "  nnants        {}", cfg.nn_ants)?;
    writeln!(file, "  alpha         {:.2}", cfg.alpha)?;
    writeln!(file, "  beta          {:.2}", cfg.beta)?;
    writeln!(file, "  rho           {:.2}", cfg.rho)?;
    writeln!(file, "  q0            {:.2}", cfg.q_0)?;
    writeln!(file, "  elitistants   {}", cfg.elitist_ants)?;
    writeln!(file, "  rasranks      {}", cfg.ras_ranks)?;
    writeln!(file, "  localsearch   {:?}", cfg.local_search)?;
    writeln!(file, "  nnls          {}", cfg.nn_ls)?;
    writeln!(file, "  dlb           {}", cfg.use_dlb)?;
    writeln!(file)?;

    for t in &outcome.tries {
        writeln!(
            file,
            "try {:3},  best {:10},  found at iteration {:8},  found at time {:8.2}",
            t.try_index, t.best_profit, t.found_at_iteration, t.time_best_found
        )?;
    }
    writeln!(file)?;
    writeln!(file, "best profit over all tries: {}", outcome.best.profit(instance.ub))?;
    Ok(())
}

#[derive(Serialize)]
struct RunSummary<'a> {
    instance: &'a str,
    algorithm: String,
    seed: u64,
    tries: &'a [TryStats],
    best_profit: i64,
}

/// Machine-readable counterpart of the run log.
pub fn write_json_summary(
    path: &Path,
    cfg: &AcoConfig,
    instance: &ThopInstance,
    outcome: &RunOutcome,
) -> Result<()> {
    let summary = RunSummary {
        instance: &instance.name,
        algorithm: format!("{:?}", cfg.algorithm),
        seed: cfg.seed,
        tries: &outcome.tries,
        best_profit: outcome.best.profit(instance.ub),
    };
    let json = serde_json::to_string_pretty(&summary)?;
    std::fs::write(path, json).with_context(|| format!("cannot write summary {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{EdgeWeightType, Item, Point};

    fn toy_instance() -> ThopInstance {
        let points = vec![
            Point { x: 0.0, y: 0.0 },
            Point { x: 1.0, y: 0.0 },
            Point { x: 2.0, y: 0.0 },
            Point { x: 3.0, y: 0.0 },
        ];
        let n = 5;
        let mut distance = vec![vec![0i64; n]; n];
        for i in 0..4 {
            for j in 0..4 {
                distance[i][j] = (i as i64 - j as i64).abs();
            }
        }
        ThopInstance {
            name: "toy".to_string(),
            knapsack_data_type: "test".to_string(),
            edge_weight_type: EdgeWeightType::Euc2d,
            n,
            m: 3,
            capacity: 10,
            max_time: 100.0,
            min_speed: 0.5,
            max_speed: 1.0,
            points,
            items: vec![
                Item { profit: 10, weight: 1, city: 1 },
                Item { profit: 20, weight: 1, city: 2 },
                Item { profit: 30, weight: 1, city: 2 },
            ],
            distance,
            ub: 60,
        }
    }

    #[test]
    fn test_solution_format() {
        let instance = toy_instance();
        let mut best = Ant::new(instance.n, instance.m);
        best.tour = vec![0, 2, 1, 3, 4, 0];
        best.packing_plan = vec![false, true, true];
        best.fitness = instance.ub + 1 - 50;

        let path = std::env::temp_dir().join("thop_solution_test.sol");
        write_solution(&path, &instance, &best).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();

        // only city 3 (1-based) carries picked items; both picks are at
        // the same city
        assert_eq!(written, "[3]\n[2,3]\n");
    }

    #[test]
    fn test_solution_format_empty_plan() {
        let instance = toy_instance();
        let mut best = Ant::new(instance.n, instance.m);
        best.tour = vec![0, 1, 2, 3, 4, 0];
        best.fitness = instance.ub + 1;

        let path = std::env::temp_dir().join("thop_solution_empty_test.sol");
        write_solution(&path, &instance, &best).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "[]\n[]\n");
    }
}
