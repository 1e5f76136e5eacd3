use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// Missing sections or fields take the reference model values.
/// See [`Config::from_file`] for loading.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub arena: ArenaConfig,
    pub population: PopulationConfig,
    pub disease: DiseaseConfig,
    pub run: RunConfig,
}

/// Bounds of the rectangular arena the agents move in.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArenaConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PopulationConfig {
    /// Number of agents.
    pub n_agents: usize,
    /// Agent radius, used for boundary collisions.
    pub radius: f64,
    /// Distance covered by an agent in one tick.
    pub speed: f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            n_agents: 300,
            radius: 7.5,
            speed: 4.0,
        }
    }
}

/// Distribution from which patient zero draws its recovery time.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexRecovery {
    /// Normal(`index_recovery_mean`, `index_recovery_std_dev`), the reference model.
    Normal,
    /// Same Gamma distribution as propagated infections.
    Gamma,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiseaseConfig {
    /// Contact distance below which an infection attempt is made.
    pub infection_radius: f64,
    /// Mean of the per-contact infection chance.
    pub infection_mean: f64,
    /// Standard deviation of the per-contact infection chance.
    pub infection_std_dev: f64,

    /// Shape of the recovery time Gamma distribution.
    pub recovery_shape: f64,
    /// Rate of the recovery time Gamma distribution.
    pub recovery_rate: f64,

    /// Recovery time distribution of patient zero.
    pub index_recovery: IndexRecovery,
    /// Mean of the patient zero recovery time (normal case).
    pub index_recovery_mean: f64,
    /// Standard deviation of the patient zero recovery time (normal case).
    pub index_recovery_std_dev: f64,

    /// Rate of the death time exponential distribution.
    pub death_time_rate: f64,
    /// Probability of dying on each tick past the death time.
    pub death_chance: f64,
}

impl Default for DiseaseConfig {
    fn default() -> Self {
        Self {
            infection_radius: 20.0,
            infection_mean: 0.1,
            infection_std_dev: 0.02,
            recovery_shape: 800.0,
            recovery_rate: 2.2,
            index_recovery: IndexRecovery::Normal,
            index_recovery_mean: 500.0,
            index_recovery_std_dev: 100.0,
            death_time_rate: 1.0 / 400.0,
            death_chance: 0.05,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Consecutive ticks without infected agents before a run ends.
    pub grace_ticks: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { grace_ticks: 30 }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let arena = &self.arena;
        let population = &self.population;
        let disease = &self.disease;

        check_num(population.n_agents, 1..100_000).context("invalid number of agents")?;
        check_excl(population.radius, 0.0).context("invalid agent radius")?;
        check_float(population.speed, 0.0..).context("invalid agent speed")?;

        // Agents are placed uniformly inside [radius, bound - radius].
        let min_bound = 2.0 * population.radius;
        check_excl(arena.width, min_bound).context("invalid arena width")?;
        check_excl(arena.height, min_bound).context("invalid arena height")?;

        check_excl(disease.infection_radius, 0.0).context("invalid infection radius")?;
        check_num(disease.infection_mean, 0.0..=1.0).context("invalid infection mean")?;
        check_float(disease.infection_std_dev, 0.0..)
            .context("invalid infection standard deviation")?;

        check_excl(disease.recovery_shape, 0.0).context("invalid recovery shape")?;
        check_excl(disease.recovery_rate, 0.0).context("invalid recovery rate")?;
        check_float(disease.index_recovery_mean, ..)
            .context("invalid index recovery mean")?;
        check_float(disease.index_recovery_std_dev, 0.0..)
            .context("invalid index recovery standard deviation")?;

        check_excl(disease.death_time_rate, 0.0).context("invalid death time rate")?;
        check_num(disease.death_chance, 0.0..=1.0).context("invalid death chance")?;

        check_num(self.run.grace_ticks, 1..100_000).context("invalid number of grace ticks")?;

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_float<R>(num: f64, range: R) -> Result<()>
where
    R: RangeBounds<f64> + Debug,
{
    if !num.is_finite() {
        bail!("number must be finite, but is {num:?}");
    }
    check_num(num, range)
}

fn check_excl(num: f64, lower: f64) -> Result<()> {
    // Also rejects NaN.
    if !(num > lower && num.is_finite()) {
        bail!("number must be finite and greater than {lower:?}, but is {num:?}");
    }
    Ok(())
}
