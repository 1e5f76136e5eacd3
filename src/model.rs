use crate::sampler::sample_bernoulli;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Epidemiological state of an agent.
///
/// Transitions only go `Susceptible -> Infected -> {Recovered, Dead}`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Susceptible,
    Infected,
    Recovered,
    Dead,
}

impl Status {
    /// Display colour used by renderers.
    pub fn color(self) -> &'static str {
        match self {
            Status::Susceptible => "blue",
            Status::Infected => "red",
            Status::Recovered => "green",
            Status::Dead => "white",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Susceptible => "susceptible",
            Status::Infected => "infected",
            Status::Recovered => "recovered",
            Status::Dead => "dead",
        };
        f.write_str(name)
    }
}

/// Agent of the simulation.
///
/// A disc moving at constant speed inside the arena, with its disease state
/// and the timers that decide how its infection ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    position: [f64; 2],
    direction: [f64; 2],
    radius: f64,
    speed: f64,

    status: Status,
    infected_time: u32,
    recovery_time: f64,
    death_time: f64,
}

impl Agent {
    /// Create a new susceptible agent. `direction` should be a unit vector.
    pub fn new(position: [f64; 2], direction: [f64; 2], radius: f64, speed: f64) -> Self {
        Self {
            position,
            direction,
            radius,
            speed,
            status: Status::Susceptible,
            infected_time: 0,
            recovery_time: 0.0,
            death_time: 0.0,
        }
    }

    pub fn position(&self) -> [f64; 2] {
        self.position
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Ticks spent infected so far.
    pub fn infected_time(&self) -> u32 {
        self.infected_time
    }

    pub fn recovery_time(&self) -> f64 {
        self.recovery_time
    }

    pub fn death_time(&self) -> f64 {
        self.death_time
    }

    /// Infect a susceptible agent and set its recovery and death times.
    ///
    /// Has no effect on agents that are not susceptible.
    pub fn infect(&mut self, recovery_time: f64, death_time: f64) {
        if self.status != Status::Susceptible {
            return;
        }
        self.status = Status::Infected;
        self.recovery_time = recovery_time;
        self.death_time = death_time;
    }

    /// Advance the agent one tick and bounce it off the arena walls.
    ///
    /// Overshoot past a wall is not corrected; the reversed direction brings
    /// the agent back on the following ticks.
    pub fn move_step(&mut self, width: f64, height: f64) {
        if self.status == Status::Dead {
            return;
        }

        for (axis, bound) in [width, height].into_iter().enumerate() {
            self.position[axis] += self.direction[axis] * self.speed;

            let pos = self.position[axis];
            if pos - self.radius < 0.0 || pos + self.radius > bound {
                self.direction[axis] = -self.direction[axis];
            }
        }
    }

    /// Resolve one tick of infection.
    ///
    /// The death check runs first, once `infected_time` reaches `death_time`;
    /// if the agent survives it recovers once `infected_time` reaches
    /// `recovery_time`. Agents that are not infected draw nothing.
    pub fn update_infection<R: Rng + ?Sized>(&mut self, death_chance: f64, rng: &mut R) {
        if self.status != Status::Infected {
            return;
        }

        self.infected_time += 1;
        let infected_time = self.infected_time as f64;

        if infected_time >= self.death_time && sample_bernoulli(rng, death_chance) {
            self.status = Status::Dead;
            return;
        }

        if infected_time >= self.recovery_time {
            self.status = Status::Recovered;
        }
    }

    pub fn distance_to(&self, other: &Agent) -> f64 {
        let dx = self.position[0] - other.position[0];
        let dy = self.position[1] - other.position[1];
        (dx * dx + dy * dy).sqrt()
    }
}
