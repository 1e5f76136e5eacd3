use crate::history::{StateCounts, read_counts};
use crate::stats::{Accumulator, AccumulatorReport};
use anyhow::{Context, Result, bail};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Statistic collected once per run.
pub trait Obs {
    fn update(&mut self, counts: &[StateCounts]) -> Result<()>;
    fn report(&self) -> Vec<ObsReport>;
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ObsReport {
    pub name: String,
    pub stats: AccumulatorReport,
}

impl ObsReport {
    fn new(name: &str, acc: &Accumulator) -> Self {
        Self {
            name: name.to_string(),
            stats: acc.report(),
        }
    }
}

/// Number of ticks until the run ended.
pub struct RunLength {
    acc: Accumulator,
}

impl RunLength {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
        }
    }
}

impl Obs for RunLength {
    fn update(&mut self, counts: &[StateCounts]) -> Result<()> {
        self.acc.add(counts.len() as f64);
        Ok(())
    }

    fn report(&self) -> Vec<ObsReport> {
        vec![ObsReport::new("duration", &self.acc)]
    }
}

/// Largest number of simultaneously infected agents and the tick it happened.
pub struct Peak {
    size_acc: Accumulator,
    tick_acc: Accumulator,
}

impl Peak {
    pub fn new() -> Self {
        Self {
            size_acc: Accumulator::new(),
            tick_acc: Accumulator::new(),
        }
    }
}

impl Obs for Peak {
    fn update(&mut self, counts: &[StateCounts]) -> Result<()> {
        // First tick wins on ties.
        let (i_tick, peak) = counts
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, c)| c.infected)
            .context("run has no ticks")?;
        self.size_acc.add(peak.infected as f64);
        self.tick_acc.add((i_tick + 1) as f64);
        Ok(())
    }

    fn report(&self) -> Vec<ObsReport> {
        vec![
            ObsReport::new("peak_infected", &self.size_acc),
            ObsReport::new("peak_tick", &self.tick_acc),
        ]
    }
}

/// State counts at the end of the run.
pub struct FinalCounts {
    susceptible_acc: Accumulator,
    recovered_acc: Accumulator,
    dead_acc: Accumulator,
}

impl FinalCounts {
    pub fn new() -> Self {
        Self {
            susceptible_acc: Accumulator::new(),
            recovered_acc: Accumulator::new(),
            dead_acc: Accumulator::new(),
        }
    }
}

impl Obs for FinalCounts {
    fn update(&mut self, counts: &[StateCounts]) -> Result<()> {
        let last = counts.last().context("run has no ticks")?;
        if last.infected != 0 {
            bail!("run ended with {} infected agents", last.infected);
        }
        self.susceptible_acc.add(last.susceptible as f64);
        self.recovered_acc.add(last.recovered as f64);
        self.dead_acc.add(last.dead as f64);
        Ok(())
    }

    fn report(&self) -> Vec<ObsReport> {
        vec![
            ObsReport::new("final_susceptible", &self.susceptible_acc),
            ObsReport::new("final_recovered", &self.recovered_acc),
            ObsReport::new("final_dead", &self.dead_acc),
        ]
    }
}

/// Aggregates run summaries into statistics over runs.
pub struct Analyzer {
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new() -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(RunLength::new()),
            Box::new(Peak::new()),
            Box::new(FinalCounts::new()),
        ];
        Self { obs_ptr_vec }
    }

    pub fn add_run(&mut self, counts: &[StateCounts]) -> Result<()> {
        for obs in &mut self.obs_ptr_vec {
            obs.update(counts).context("failed to update observable")?;
        }
        Ok(())
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let counts = read_counts(file).context("failed to read counts")?;
        self.add_run(&counts)
    }

    pub fn reports(&self) -> Vec<ObsReport> {
        self.obs_ptr_vec.iter().flat_map(|obs| obs.report()).collect()
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write_named(&mut writer, &self.reports()).context("failed to serialize results")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}
