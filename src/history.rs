use crate::model::{Agent, Status};
use anyhow::{Context, Result};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Number of agents in each state at the end of a tick.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct StateCounts {
    pub susceptible: usize,
    pub infected: usize,
    pub recovered: usize,
    pub dead: usize,
}

impl StateCounts {
    pub fn count(agt_vec: &[Agent]) -> Self {
        let mut counts = Self::default();
        for agt in agt_vec {
            match agt.status() {
                Status::Susceptible => counts.susceptible += 1,
                Status::Infected => counts.infected += 1,
                Status::Recovered => counts.recovered += 1,
                Status::Dead => counts.dead += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.susceptible + self.infected + self.recovered + self.dead
    }
}

/// Disease state of one agent at the end of a tick.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub status: Status,
    pub infected_time: u32,
    pub recovery_time: f64,
    pub death_time: f64,
}

impl From<&Agent> for AgentSnapshot {
    fn from(agt: &Agent) -> Self {
        Self {
            status: agt.status(),
            infected_time: agt.infected_time(),
            recovery_time: agt.recovery_time(),
            death_time: agt.death_time(),
        }
    }
}

/// Record of a whole run, one entry per tick.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct History {
    counts: Vec<StateCounts>,
    snapshots: Vec<Vec<AgentSnapshot>>,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Tick")]
    tick: usize,
    #[serde(rename = "State")]
    state: Status,
    #[serde(rename = "Infected Time")]
    infected_time: &'a str,
    #[serde(rename = "Recovery Time")]
    recovery_time: &'a str,
    #[serde(rename = "Death Time")]
    death_time: &'a str,
}

const NOT_APPLICABLE: &str = "N/A";

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the post-tick state of the population and return its counts.
    pub fn record(&mut self, agt_vec: &[Agent]) -> StateCounts {
        let counts = StateCounts::count(agt_vec);
        debug_assert_eq!(counts.total(), agt_vec.len());
        self.counts.push(counts);
        self.snapshots
            .push(agt_vec.iter().map(AgentSnapshot::from).collect());
        counts
    }

    /// Number of recorded ticks.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &[StateCounts] {
        &self.counts
    }

    #[cfg(test)]
    pub fn snapshots(&self) -> &[Vec<AgentSnapshot>] {
        &self.snapshots
    }

    /// Write one CSV row per agent per tick, with 1-indexed ticks.
    ///
    /// Timers of agents that were never infected are written as `N/A`.
    pub fn write_csv<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let mut writer =
            csv::Writer::from_path(file).with_context(|| format!("failed to create {file:?}"))?;

        for (i_tick, snapshot) in self.snapshots.iter().enumerate() {
            for agt in snapshot {
                let (infected_time, recovery_time, death_time) = match agt.status {
                    Status::Susceptible => (
                        NOT_APPLICABLE.to_string(),
                        NOT_APPLICABLE.to_string(),
                        NOT_APPLICABLE.to_string(),
                    ),
                    _ => (
                        format!("{:.2}", agt.infected_time as f64),
                        format!("{:.2}", agt.recovery_time),
                        format!("{:.2}", agt.death_time),
                    ),
                };
                let row = CsvRow {
                    tick: i_tick + 1,
                    state: agt.status,
                    infected_time: &infected_time,
                    recovery_time: &recovery_time,
                    death_time: &death_time,
                };
                writer.serialize(row).context("failed to write csv row")?;
            }
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Save the per-tick state counts as a MessagePack summary.
    pub fn write_counts<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self.counts).context("failed to serialize counts")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}

/// Load a per-tick state count summary written by [`History::write_counts`].
pub fn read_counts<P: AsRef<Path>>(file: P) -> Result<Vec<StateCounts>> {
    let file = file.as_ref();
    let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
    let reader = BufReader::new(file);
    let counts = decode::from_read(reader).context("failed to deserialize counts")?;
    Ok(counts)
}
