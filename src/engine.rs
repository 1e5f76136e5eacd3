use crate::config::{Config, IndexRecovery};
use crate::history::History;
use crate::model::{Agent, Status};
use crate::sampler::{sample_bernoulli, sample_exponential, sample_gamma, sample_normal};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Uniform;
use std::f64::consts::PI;

/// Simulation engine.
///
/// Holds the configuration, the population, and the random number generator,
/// and runs one epidemic from patient zero until it dies out.
pub struct Engine {
    cfg: Config,
    agt_vec: Vec<Agent>,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with a random initial population.
    ///
    /// Agents are placed uniformly inside the arena with uniformly random
    /// headings. The agent at index 0 starts infected.
    pub fn generate_initial_condition(cfg: Config, mut rng: ChaCha12Rng) -> Result<Self> {
        let arena = &cfg.arena;
        let radius = cfg.population.radius;
        let speed = cfg.population.speed;

        let x_dist = Uniform::new(radius, arena.width - radius)?;
        let y_dist = Uniform::new(radius, arena.height - radius)?;
        let angle_dist = Uniform::new(0.0, 2.0 * PI)?;

        let mut agt_vec = Vec::with_capacity(cfg.population.n_agents);
        for i_agt in 0..cfg.population.n_agents {
            let position = [x_dist.sample(&mut rng), y_dist.sample(&mut rng)];
            let angle: f64 = angle_dist.sample(&mut rng);
            let mut agt = Agent::new(position, [angle.cos(), angle.sin()], radius, speed);

            if i_agt == 0 {
                let recovery_time = match cfg.disease.index_recovery {
                    IndexRecovery::Normal => sample_normal(
                        &mut rng,
                        cfg.disease.index_recovery_mean,
                        cfg.disease.index_recovery_std_dev,
                    ),
                    IndexRecovery::Gamma => sample_gamma(
                        &mut rng,
                        cfg.disease.recovery_shape,
                        cfg.disease.recovery_rate,
                    )
                    .context("failed to sample index recovery time")?,
                };
                let death_time = sample_exponential(&mut rng, cfg.disease.death_time_rate);
                agt.infect(recovery_time, death_time);
            }

            agt_vec.push(agt);
        }

        Ok(Self { cfg, agt_vec, rng })
    }

    /// Create an `Engine` from an explicit population.
    #[cfg(test)]
    pub fn from_agents(cfg: Config, agt_vec: Vec<Agent>, rng: ChaCha12Rng) -> Self {
        Self { cfg, agt_vec, rng }
    }

    #[cfg(test)]
    pub fn agents(&self) -> &[Agent] {
        &self.agt_vec
    }

    /// Give back the random number generator so a following run can continue the stream.
    pub fn into_rng(self) -> ChaCha12Rng {
        self.rng
    }

    /// Run ticks until no agent has been infected for `grace_ticks` consecutive ticks.
    ///
    /// `observe` is called after every tick with the tick index and the
    /// population, and must not influence the simulation.
    pub fn run_simulation<F>(&mut self, mut observe: F) -> Result<History>
    where
        F: FnMut(usize, &[Agent]),
    {
        let grace_ticks = self.cfg.run.grace_ticks;
        let mut history = History::new();
        let mut quiet_ticks = 0;

        loop {
            self.perform_step()
                .with_context(|| format!("failed to perform tick {}", history.len()))?;

            let counts = history.record(&self.agt_vec);
            observe(history.len() - 1, &self.agt_vec);
            log::trace!("tick {}: {counts:?}", history.len());

            if counts.infected == 0 {
                quiet_ticks += 1;
                if quiet_ticks >= grace_ticks {
                    break;
                }
            } else {
                quiet_ticks = 0;
            }
        }

        log::debug!(
            "epidemic over after {} ticks: {:?}",
            history.len(),
            history.counts().last()
        );

        Ok(history)
    }

    fn perform_step(&mut self) -> Result<()> {
        // Move agents and resolve ongoing infections.
        self.update_agents();

        // Let infected agents infect their neighbours.
        self.spread_infection()
            .context("failed to spread infection")?;

        Ok(())
    }

    fn update_agents(&mut self) {
        let width = self.cfg.arena.width;
        let height = self.cfg.arena.height;
        let death_chance = self.cfg.disease.death_chance;

        for agt in &mut self.agt_vec {
            agt.move_step(width, height);
            agt.update_infection(death_chance, &mut self.rng);
        }
    }

    fn spread_infection(&mut self) -> Result<()> {
        let disease = &self.cfg.disease;
        let n_agt = self.agt_vec.len();

        // Agents infected earlier in this pass spread when their turn comes.
        for i_agt in 0..n_agt {
            if self.agt_vec[i_agt].status() != Status::Infected {
                continue;
            }

            for j_agt in 0..n_agt {
                let other = &self.agt_vec[j_agt];
                if other.status() != Status::Susceptible
                    || self.agt_vec[i_agt].distance_to(other) >= disease.infection_radius
                {
                    continue;
                }

                let chance =
                    sample_normal(&mut self.rng, disease.infection_mean, disease.infection_std_dev)
                        .clamp(0.0, 1.0);
                if !sample_bernoulli(&mut self.rng, chance) {
                    continue;
                }

                let recovery_time =
                    sample_gamma(&mut self.rng, disease.recovery_shape, disease.recovery_rate)
                        .context("failed to sample recovery time")?;
                let death_time = sample_exponential(&mut self.rng, disease.death_time_rate);
                self.agt_vec[j_agt].infect(recovery_time, death_time);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::StateCounts;

    fn still_agent(x: f64, y: f64) -> Agent {
        Agent::new([x, y], [1.0, 0.0], 7.5, 0.0)
    }

    fn sure_infection_config() -> Config {
        let mut cfg = Config::default();
        cfg.disease.infection_mean = 1.0;
        cfg.disease.infection_std_dev = 0.0;
        cfg
    }

    fn small_config(n_agents: usize) -> Config {
        let mut cfg = Config::default();
        cfg.arena.width = 200.0;
        cfg.arena.height = 200.0;
        cfg.population.n_agents = n_agents;
        cfg.disease.infection_mean = 0.5;
        cfg.disease.recovery_shape = 40.0;
        cfg.disease.recovery_rate = 1.0;
        cfg.disease.index_recovery_mean = 60.0;
        cfg.disease.index_recovery_std_dev = 5.0;
        cfg.disease.death_time_rate = 1.0 / 20.0;
        cfg
    }

    fn seeded_run(cfg: &Config, seed: u64) -> History {
        let rng = ChaCha12Rng::seed_from_u64(seed);
        let mut engine =
            Engine::generate_initial_condition(cfg.clone(), rng).expect("failed to initialize");
        engine.run_simulation(|_, _| {}).expect("failed to run")
    }

    #[test]
    fn initial_population() {
        let cfg = Config::default();
        let engine = Engine::generate_initial_condition(cfg.clone(), ChaCha12Rng::seed_from_u64(1))
            .expect("failed to initialize");
        let agt_vec = engine.agents();

        assert_eq!(agt_vec.len(), cfg.population.n_agents);
        assert_eq!(agt_vec[0].status(), Status::Infected);
        assert!(agt_vec[0].death_time() >= 0.0);
        assert!(agt_vec[1..].iter().all(|a| a.status() == Status::Susceptible));

        let r = cfg.population.radius;
        for agt in agt_vec {
            let [x, y] = agt.position();
            assert!(x >= r && x <= cfg.arena.width - r);
            assert!(y >= r && y <= cfg.arena.height - r);
        }
    }

    #[test]
    fn index_recovery_uses_configured_distribution() {
        let mut cfg = Config::default();
        cfg.population.n_agents = 1;

        let index_recovery_mean = |cfg: &Config| {
            let mut rng = ChaCha12Rng::seed_from_u64(2);
            let n_samples = 400;
            let mut sum = 0.0;
            for _ in 0..n_samples {
                let engine = Engine::generate_initial_condition(cfg.clone(), rng)
                    .expect("failed to initialize");
                sum += engine.agents()[0].recovery_time();
                rng = engine.into_rng();
            }
            sum / n_samples as f64
        };

        // Reference model: Normal(500, 100) for patient zero only.
        let mean = index_recovery_mean(&cfg);
        assert!((mean - 500.0).abs() < 25.0, "mean was {mean}");

        cfg.disease.index_recovery = IndexRecovery::Gamma;
        let mean = index_recovery_mean(&cfg);
        assert!((mean - 800.0 / 2.2).abs() < 5.0, "mean was {mean}");
    }

    #[test]
    fn infection_radius_is_strict() {
        let mut cfg = sure_infection_config();
        cfg.run.grace_ticks = 1;

        let mut agt_vec = vec![still_agent(100.0, 100.0), still_agent(120.0, 100.0)];
        agt_vec[0].infect(5.0, 1e9);
        let mut engine = Engine::from_agents(cfg.clone(), agt_vec, ChaCha12Rng::seed_from_u64(3));
        let history = engine.run_simulation(|_, _| {}).expect("failed to run");
        assert!(
            history
                .counts()
                .iter()
                .all(|c| c.susceptible == 1 && c.dead == 0)
        );

        let mut agt_vec = vec![still_agent(100.0, 100.0), still_agent(119.99, 100.0)];
        agt_vec[0].infect(5.0, 1e9);
        let mut engine = Engine::from_agents(cfg, agt_vec, ChaCha12Rng::seed_from_u64(3));
        let history = engine.run_simulation(|_, _| {}).expect("failed to run");
        assert_eq!(history.counts()[0].infected, 2);
    }

    #[test]
    fn isolated_index_case_ends_after_grace_period() {
        let cfg = Config::default();
        let grace_ticks = cfg.run.grace_ticks;

        let mut agt_vec = vec![still_agent(50.0, 50.0)];
        agt_vec.extend((1..10).map(|i| still_agent(50.0 + 100.0 * i as f64, 500.0)));
        agt_vec[0].infect(5.0, 1e9);

        let mut engine = Engine::from_agents(cfg, agt_vec, ChaCha12Rng::seed_from_u64(4));
        let history = engine.run_simulation(|_, _| {}).expect("failed to run");

        // Patient zero recovers on tick 5, which is the first quiet tick.
        assert_eq!(history.counts()[3].infected, 1);
        assert_eq!(history.counts()[4].infected, 0);
        assert_eq!(history.len(), 5 + grace_ticks - 1);

        let last = history.counts().last().copied().unwrap_or_default();
        assert_eq!(
            last,
            StateCounts {
                susceptible: 9,
                infected: 0,
                recovered: 1,
                dead: 0,
            }
        );
    }

    #[test]
    fn newly_infected_agents_spread_in_the_same_pass() {
        let cfg = sure_infection_config();

        // A chain 0 -> 1 -> 2 with 2 out of reach of 0.
        let mut agt_vec = vec![
            still_agent(100.0, 100.0),
            still_agent(115.0, 100.0),
            still_agent(130.0, 100.0),
        ];
        agt_vec[0].infect(1e9, 1e9);

        let mut engine = Engine::from_agents(cfg, agt_vec, ChaCha12Rng::seed_from_u64(5));
        engine.perform_step().expect("failed to perform step");
        assert!(engine.agents().iter().all(|a| a.status() == Status::Infected));
    }

    #[test]
    fn earlier_spreaders_do_not_see_later_infections() {
        let cfg = sure_infection_config();

        // Agent 2 infects agent 0 after agent 0's turn, so agent 1 is only
        // exposed on the next tick.
        let mut agt_vec = vec![
            still_agent(115.0, 100.0),
            still_agent(100.0, 100.0),
            still_agent(130.0, 100.0),
        ];
        agt_vec[2].infect(1e9, 1e9);

        let mut engine = Engine::from_agents(cfg, agt_vec, ChaCha12Rng::seed_from_u64(6));
        engine.perform_step().expect("failed to perform step");
        let statuses: Vec<_> = engine.agents().iter().map(Agent::status).collect();
        assert_eq!(
            statuses,
            [Status::Infected, Status::Susceptible, Status::Infected]
        );

        engine.perform_step().expect("failed to perform step");
        assert_eq!(engine.agents()[1].status(), Status::Infected);
    }

    #[test]
    fn seeded_runs_are_deterministic() {
        let cfg = small_config(60);
        let history_a = seeded_run(&cfg, 7);
        let history_b = seeded_run(&cfg, 7);
        assert_eq!(history_a, history_b);
    }

    #[test]
    fn transitions_respect_state_machine() {
        let cfg = small_config(80);
        for seed in 0..5 {
            let history = seeded_run(&cfg, seed);
            for counts in history.counts() {
                assert_eq!(counts.total(), cfg.population.n_agents);
            }

            for pair in history.snapshots().windows(2) {
                for (prev, next) in pair[0].iter().zip(&pair[1]) {
                    let allowed = match prev.status {
                        Status::Susceptible => {
                            matches!(next.status, Status::Susceptible | Status::Infected)
                        }
                        Status::Infected => next.status != Status::Susceptible,
                        Status::Recovered | Status::Dead => next.status == prev.status,
                    };
                    assert!(allowed, "{:?} -> {:?}", prev.status, next.status);
                }
            }

            let last = history.counts().last().copied().unwrap_or_default();
            assert_eq!(last.infected, 0);
        }
    }

    #[test]
    fn observer_sees_every_tick() {
        let cfg = small_config(30);
        let mut engine =
            Engine::generate_initial_condition(cfg, ChaCha12Rng::seed_from_u64(8))
                .expect("failed to initialize");
        let mut ticks = Vec::new();
        let history = engine
            .run_simulation(|tick, agt_vec| {
                assert_eq!(agt_vec.len(), 30);
                ticks.push(tick);
            })
            .expect("failed to run");
        assert_eq!(ticks, (0..history.len()).collect::<Vec<_>>());
    }
}
