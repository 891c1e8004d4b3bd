//! ThOP Solver Library
//!
//! Ant Colony Optimization for the Thief Orienteering Problem: find a tour
//! fragment from a fixed start city to a fixed end city and a knapsack of
//! items to collect along it, maximising profit under a capacity bound and
//! a load-dependent travel-time budget.
//!
//! # Features
//!
//! - Six pheromone-update variants: AS, EAS, RAS, MMAS, BWAS and ACS
//! - Neighbour-restricted tour construction with the ACS
//!   pseudo-random-proportional rule
//! - 2-opt, 2.5-opt and 3-opt local search with don't-look bits and a
//!   regression guard on the ThOP fitness
//! - Randomised greedy packing evaluator
//! - Branching-factor based restart control
//!
//! # Example
//!
//! ```no_run
//! use thop_solver::instance::ThopInstance;
//! use thop_solver::solver::{AcoConfig, Algorithm, Solver};
//!
//! let instance = ThopInstance::from_file("instance.thop").unwrap();
//! let cfg = AcoConfig::for_algorithm(Algorithm::MaxMinAntSystem, None);
//! let mut solver = Solver::new(&instance, cfg).unwrap();
//! let outcome = solver.run();
//! println!("best profit: {}", outcome.best.profit(instance.ub));
//! ```

pub mod ant;
pub mod heuristics;
pub mod instance;
pub mod pheromone;
pub mod report;
pub mod solver;

pub use ant::Ant;
pub use instance::ThopInstance;
pub use solver::{AcoConfig, Algorithm, Solver};
