//! Command-line interface of the ThOP solver.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

use thop_solver::heuristics::local_search::LsVariant;
use thop_solver::instance::ThopInstance;
use thop_solver::report;
use thop_solver::solver::{AcoConfig, Algorithm, Solver};

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum AlgorithmArg {
    /// Ant System
    As,
    /// Elitist Ant System
    Eas,
    /// Rank-based Ant System
    Ras,
    /// MAX-MIN Ant System
    Mmas,
    /// Best-Worst Ant System
    Bwas,
    /// Ant Colony System
    Acs,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::As => Algorithm::AntSystem,
            AlgorithmArg::Eas => Algorithm::ElitistAntSystem,
            AlgorithmArg::Ras => Algorithm::RankBasedAntSystem,
            AlgorithmArg::Mmas => Algorithm::MaxMinAntSystem,
            AlgorithmArg::Bwas => Algorithm::BestWorstAntSystem,
            AlgorithmArg::Acs => Algorithm::AntColonySystem,
        }
    }
}

#[derive(Parser)]
#[command(name = "thop-solver")]
#[command(version = "1.0")]
#[command(about = "Ant Colony Optimization solver for the Thief Orienteering Problem")]
struct Cli {
    /// Instance file in ThOP format
    #[arg(short, long)]
    inputfile: PathBuf,

    /// Where to write the best solution found
    #[arg(short, long)]
    outputfile: Option<PathBuf>,

    /// Number of independent tries
    #[arg(long, default_value_t = 1)]
    tries: usize,

    /// Minimum number of tour constructions per try
    #[arg(long, default_value_t = 0)]
    tours: u64,

    /// Randomised packing fills per tour
    #[arg(long, default_value_t = 1)]
    ptries: usize,

    /// Runtime budget per try in seconds (default: ceil(items / 10))
    #[arg(long)]
    time: Option<f64>,

    /// RNG seed (default: derived from the system clock)
    #[arg(long)]
    seed: Option<u64>,

    /// Stop a try once this fitness (UB + 1 - profit) is reached
    #[arg(long, default_value_t = 1)]
    optimum: i64,

    /// Colony size (default: per-variant literature value)
    #[arg(long)]
    ants: Option<usize>,

    /// Nearest neighbours considered during construction
    #[arg(long, default_value_t = 20)]
    nnants: usize,

    /// Trail influence
    #[arg(long, default_value_t = 1.0)]
    alpha: f64,

    /// Heuristic-information influence
    #[arg(long, default_value_t = 2.0)]
    beta: f64,

    /// Evaporation rate (default: per-variant literature value)
    #[arg(long)]
    rho: Option<f64>,

    /// ACS exploitation probability (default: per-variant literature value)
    #[arg(long)]
    q0: Option<f64>,

    /// Elitist-deposit weight for EAS (default: number of cities)
    #[arg(long)]
    elitistants: Option<usize>,

    /// Number of ranks for the rank-based update
    #[arg(long)]
    rasranks: Option<usize>,

    /// 0 = off, 1 = 2-opt, 2 = 2.5-opt, 3 = 3-opt
    #[arg(long, default_value_t = 0)]
    localsearch: u8,

    /// Nearest neighbours considered by local-search moves
    #[arg(long, default_value_t = 20)]
    nnls: usize,

    /// Honour don't-look bits in local search (0 or 1)
    #[arg(long, default_value_t = 1)]
    dlb: u8,

    /// ACO variant
    #[arg(long, value_enum, default_value = "mmas")]
    algorithm: AlgorithmArg,

    /// Write a .log and .json run summary next to the output file
    #[arg(long)]
    log: bool,

    /// Print only the negated best profit on stdout
    #[arg(long)]
    calibration: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    if cli.localsearch > 3 {
        bail!("--localsearch takes a value in 0..=3");
    }
    let local_search = LsVariant::from_flag(cli.localsearch);

    let instance = ThopInstance::from_file(&cli.inputfile)?;

    let mut cfg = AcoConfig::for_algorithm(cli.algorithm.into(), local_search);
    cfg.max_tries = cli.tries;
    cfg.max_tours = cli.tours;
    cfg.packing_tries = cli.ptries;
    if let Some(time) = cli.time {
        cfg.time_limit = time;
    }
    cfg.seed = cli.seed.unwrap_or_else(clock_seed);
    cfg.optimal = cli.optimum;
    if let Some(ants) = cli.ants {
        cfg.n_ants = ants;
    }
    cfg.nn_ants = cli.nnants;
    cfg.alpha = cli.alpha;
    cfg.beta = cli.beta;
    if let Some(rho) = cli.rho {
        cfg.rho = rho;
    }
    if let Some(q0) = cli.q0 {
        cfg.q_0 = q0;
    }
    if let Some(elitists) = cli.elitistants {
        cfg.elitist_ants = elitists;
    }
    if let Some(ranks) = cli.rasranks {
        cfg.ras_ranks = ranks;
    }
    cfg.nn_ls = cli.nnls;
    cfg.use_dlb = cli.dlb != 0;

    let mut solver = Solver::new(&instance, cfg)?;
    let cfg = solver.config().clone();
    let outcome = solver.run();

    let profit = outcome.best.profit(instance.ub);
    if cli.calibration {
        println!("{}", -profit);
    } else {
        println!("Best solution: {}", profit);
    }

    if let Some(path) = &cli.outputfile {
        report::write_solution(path, &instance, &outcome.best)?;
    }
    if cli.log {
        let base = cli.outputfile.clone().unwrap_or_else(|| cli.inputfile.clone());
        report::write_log(&base.with_extension("log"), &cfg, &instance, &outcome)?;
        report::write_json_summary(&base.with_extension("json"), &cfg, &instance, &outcome)?;
    }

    Ok(())
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
