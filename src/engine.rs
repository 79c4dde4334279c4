use crate::config::Config;
use crate::model::{Individual, Pathogen};
use crate::population::generate_population;
use crate::record::{EndReason, Metadata, Outcome, Record, Sink, StepRecord};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Uniform;
use std::{collections::BTreeSet, rc::Rc, time::SystemTime};

/// Maximum number of interactions of each infected agent per step.
pub const MAX_INTERACTIONS: usize = 100;

/// Lifecycle of an [`Engine`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    NotStarted,
    Running,
    Terminated(EndReason),
}

/// Population counts obtained by scanning every agent.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Tally {
    pub n_infected: usize,
    pub n_susceptible: usize,
    pub n_immune: usize,
    pub n_deaths: usize,
}

/// Simulation engine.
///
/// Holds the configuration, the population, the running counters and the
/// random number generator, and runs steps until the infection dies out.
pub struct Engine {
    cfg: Config,
    pathogen: Rc<Pathogen>,
    pop: Vec<Individual>,

    n_infected: usize,
    n_deaths: usize,
    n_interactions: usize,
    step: usize,

    // Agents infected during the current step, committed at its end.
    pending: BTreeSet<usize>,

    status: Status,
    rng: ChaCha12Rng,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and a random initial population.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn generate_initial_condition(cfg: Config, mut rng: ChaCha12Rng) -> Result<Self> {
        cfg.validate().context("invalid config")?;

        let pathogen = Rc::new(cfg.pathogen.clone());
        let pop = generate_population(&cfg.init, &pathogen, &mut rng)
            .context("failed to generate population")?;
        let n_infected = cfg.init.n_infected;

        Ok(Self {
            cfg,
            pathogen,
            pop,
            n_infected,
            n_deaths: 0,
            n_interactions: 0,
            step: 0,
            pending: BTreeSet::new(),
            status: Status::NotStarted,
            rng,
        })
    }

    /// Run the simulation to the end, writing every record to `sink`.
    ///
    /// Steps are performed while some agent is infected and alive.
    pub fn run<S: Sink + ?Sized>(&mut self, sink: &mut S) -> Result<Outcome> {
        if self.status != Status::NotStarted {
            bail!("simulation has already been run");
        }
        self.status = Status::Running;
        log::info!(
            "starting {} simulation with {} agents",
            self.pathogen.name,
            self.pop.len()
        );

        sink.write(&Record::Metadata(self.metadata()))
            .context("failed to write metadata")?;

        while self.should_continue() {
            let rec = self.perform_step().context("failed to perform step")?;
            log::debug!(
                "step {}: {} infected, {} deaths, {} interactions",
                rec.step,
                rec.n_infected,
                rec.n_deaths,
                rec.n_interactions
            );
            sink.write(&Record::Step(rec))
                .context("failed to write step record")?;
        }

        let reason = self.end_reason();
        self.status = Status::Terminated(reason);

        let n_agents = self.pop.len();
        let outcome = Outcome {
            n_steps: self.step,
            n_agents,
            n_deaths: self.n_deaths,
            n_survivors: n_agents - self.n_deaths,
            n_interactions: self.n_interactions,
            reason,
            mortality: self.n_deaths as f64 / n_agents as f64,
        };
        log::info!("{reason:?} after {} steps", self.step);

        sink.write(&Record::Outcome(outcome.clone()))
            .context("failed to write outcome")?;
        sink.flush().context("failed to flush sink")?;

        Ok(outcome)
    }

    /// Perform one step: interactions, survival resolution, then infection commit.
    pub fn perform_step(&mut self) -> Result<StepRecord> {
        // Snapshot susceptible and infected agents at the start of the step.
        let i_agt_sus: Vec<usize> = self
            .pop
            .iter()
            .filter(|agt| agt.is_susceptible())
            .map(Individual::id)
            .collect();
        let i_agt_inf: Vec<usize> = self
            .pop
            .iter()
            .filter(|agt| agt.is_alive() && agt.is_infected())
            .map(Individual::id)
            .collect();

        let step_interactions = self
            .perform_interactions(&i_agt_inf, &i_agt_sus)
            .context("failed to perform interactions")?;

        let (new_deaths, new_recoveries) = self
            .resolve_infections(&i_agt_inf)
            .context("failed to resolve infections")?;

        // Must come after survival resolution so new infections last a full step.
        let new_infections = self
            .commit_infections()
            .context("failed to commit infections")?;

        self.step += 1;

        let tally = self.tally();
        self.check_counters(&tally)
            .context("counters diverged from population")?;

        Ok(StepRecord {
            step: self.step,
            n_infected: self.n_infected,
            n_susceptible: tally.n_susceptible,
            n_immune: tally.n_immune,
            n_deaths: self.n_deaths,
            n_interactions: self.n_interactions,
            n_agents: self.pop.len(),
            step_interactions,
            new_infections,
            new_deaths,
            new_recoveries,
        })
    }

    /// Whether some agent is still infected and alive.
    pub fn should_continue(&self) -> bool {
        self.pop.iter().any(|agt| agt.is_alive() && agt.is_infected())
    }

    /// Count agents in each state by scanning the population.
    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for agt in &self.pop {
            if !agt.is_alive() {
                tally.n_deaths += 1;
            } else if agt.is_infected() {
                tally.n_infected += 1;
            } else if agt.is_vaccinated() {
                tally.n_immune += 1;
            } else {
                tally.n_susceptible += 1;
            }
        }
        tally
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            n_agents: self.cfg.init.n_agents,
            vacc_frac: self.cfg.init.vacc_frac,
            pathogen_name: self.pathogen.name.clone(),
            mortality_rate: self.pathogen.mortality_rate,
            repro_rate: self.pathogen.repro_rate,
            n_infected_init: self.cfg.init.n_infected,
            timestamp: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
        }
    }

    fn perform_interactions(&mut self, i_agt_inf: &[usize], i_agt_sus: &[usize]) -> Result<usize> {
        if i_agt_sus.is_empty() {
            return Ok(0);
        }
        let sus_dist = Uniform::new(0, i_agt_sus.len())?;

        // Agent ids are their indices in `pop`.
        let mut count = 0;
        for &i_src in i_agt_inf {
            for _ in 0..MAX_INTERACTIONS {
                let i_cand = i_agt_sus[sus_dist.sample(&mut self.rng)];
                interact(
                    &self.pop[i_src],
                    &self.pop[i_cand],
                    &mut self.pending,
                    &mut self.rng,
                );
                count += 1;
            }
        }

        self.n_interactions += count;
        Ok(count)
    }

    fn resolve_infections(&mut self, i_agt_inf: &[usize]) -> Result<(usize, usize)> {
        let mut new_deaths = 0;
        let mut new_recoveries = 0;

        for &i_agt in i_agt_inf {
            let alive = self.pop[i_agt]
                .resolve_infection(&mut self.rng)
                .with_context(|| format!("failed to resolve infection of agent {i_agt}"))?;

            self.n_infected = self
                .n_infected
                .checked_sub(1)
                .context("infected count underflow")?;
            if alive {
                new_recoveries += 1;
            } else {
                new_deaths += 1;
            }
        }

        self.n_deaths += new_deaths;
        Ok((new_deaths, new_recoveries))
    }

    fn commit_infections(&mut self) -> Result<usize> {
        for &i_agt in &self.pending {
            let agt = &mut self.pop[i_agt];
            if !agt.is_susceptible() {
                bail!("agent {i_agt} is not susceptible");
            }
            agt.infect(self.pathogen.clone());
        }

        let count = self.pending.len();
        self.n_infected += count;
        self.pending.clear();
        Ok(count)
    }

    fn check_counters(&self, tally: &Tally) -> Result<()> {
        if tally.n_infected != self.n_infected || tally.n_deaths != self.n_deaths {
            bail!(
                "counted {} infected and {} deaths, but scan gives {tally:?}",
                self.n_infected,
                self.n_deaths
            );
        }
        Ok(())
    }

    fn end_reason(&self) -> EndReason {
        let tally = self.tally();
        if tally.n_deaths == self.pop.len() {
            EndReason::Extinction
        } else if tally.n_susceptible == 0 {
            EndReason::ImmunitySaturation
        } else {
            EndReason::Containment
        }
    }
}

/// Resolve a contact between an infected source and a candidate.
///
/// A susceptible candidate is marked as pending with probability equal to the
/// source pathogen's reproduction rate. The candidate itself is left untouched.
/// Returns whether the candidate was newly marked.
pub fn interact<R: Rng + ?Sized>(
    src: &Individual,
    cand: &Individual,
    pending: &mut BTreeSet<usize>,
    rng: &mut R,
) -> bool {
    let Some(pathogen) = src.infection() else {
        return false;
    };
    if !cand.is_susceptible() {
        return false;
    }
    rng.random::<f64>() < pathogen.repro_rate && pending.insert(cand.id())
}
