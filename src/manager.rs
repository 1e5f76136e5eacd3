use crate::analysis::Analyzer;
use crate::config::Config;
use crate::engine::Engine;
use anyhow::{Context, Result};
use glob::glob;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use std::{
    fs,
    path::{Path, PathBuf},
};

const HISTORY_FILE: &str = "history.csv";
const COUNTS_FILE: &str = "counts.msgpack";

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Perform `n_runs` runs in a row, each with a fresh population.
    ///
    /// All runs draw from one random stream, so a seed reproduces the whole batch.
    pub fn run_simulations(&self, n_runs: usize, seed: Option<u64>) -> Result<()> {
        let mut rng = match seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let first_run_idx = self.next_run_idx().context("failed to find next run index")?;
        for run_idx in first_run_idx..first_run_idx + n_runs {
            rng = self
                .run_simulation(run_idx, rng)
                .with_context(|| format!("failed to run simulation {run_idx}"))?;
        }

        Ok(())
    }

    fn run_simulation(&self, run_idx: usize, rng: ChaCha12Rng) -> Result<ChaCha12Rng> {
        let mut engine = Engine::generate_initial_condition(self.cfg.clone(), rng)
            .context("failed to generate initial condition")?;

        let history = engine
            .run_simulation(|tick, agt_vec| {
                if (tick + 1) % 100 == 0 {
                    log::debug!("completed tick {} with {} agents", tick + 1, agt_vec.len());
                }
                if log::log_enabled!(log::Level::Trace) {
                    for (i_agt, agt) in agt_vec.iter().enumerate() {
                        let [x, y] = agt.position();
                        log::trace!(
                            "tick {} agent {i_agt}: ({x:.2}, {y:.2}) r={} {}",
                            tick + 1,
                            agt.radius(),
                            agt.status().color()
                        );
                    }
                }
            })
            .context("failed to run simulation")?;

        if let Some(counts) = history.counts().last() {
            log::info!(
                "simulation {run_idx} stopped after {} ticks: {counts:?}",
                history.len()
            );
        }

        // Only completed runs get a directory.
        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        history
            .write_csv(run_dir.join(HISTORY_FILE))
            .context("failed to write history")?;
        history
            .write_counts(run_dir.join(COUNTS_FILE))
            .context("failed to write counts")?;

        Ok(engine.into_rng())
    }

    pub fn analyze_sim(&self) -> Result<()> {
        let mut analyzer = Analyzer::new();
        let mut n_runs = 0;
        for run_dir in self.run_dirs().context("failed to list run dirs")? {
            let counts_file = run_dir.join(COUNTS_FILE);
            if !counts_file.is_file() {
                log::warn!("skipping {run_dir:?}: no {COUNTS_FILE}");
                continue;
            }
            analyzer
                .add_file(&counts_file)
                .with_context(|| format!("failed to add {counts_file:?}"))?;
            n_runs += 1;
        }
        log::info!("analyzed {n_runs} runs");

        for report in analyzer.reports() {
            log::info!("{report:?}");
        }

        let results_file = self.results_file();
        analyzer
            .save_results(&results_file)
            .context("failed to save results")?;
        log::info!("saved {results_file:?}");

        Ok(())
    }

    pub fn clean_sim(&self) -> Result<()> {
        for run_dir in self.run_dirs().context("failed to list run dirs")? {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }

        let results_file = self.results_file();
        if results_file.exists() {
            fs::remove_file(&results_file)
                .with_context(|| format!("failed to remove {results_file:?}"))?;
            log::info!("removed {results_file:?}");
        }

        Ok(())
    }

    fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let run_dirs = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .collect();
        Ok(run_dirs)
    }

    #[cfg(test)]
    fn count_run_dirs(&self) -> Result<usize> {
        Ok(self.run_dirs()?.len())
    }

    /// Index after the highest existing `run-NNNN` directory.
    fn next_run_idx(&self) -> Result<usize> {
        let next_run_idx = self
            .run_dirs()?
            .iter()
            .filter_map(|p| p.file_name()?.to_str()?.strip_prefix("run-")?.parse::<usize>().ok())
            .map(|run_idx| run_idx + 1)
            .max()
            .unwrap_or(0);
        Ok(next_run_idx)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn results_file(&self) -> PathBuf {
        self.sim_dir.join("results.msgpack")
    }
}
