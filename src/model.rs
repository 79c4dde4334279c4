use anyhow::{Result, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Pathogen {
    pub name: String,

    /// Per-contact transmission probability (values above 1 always transmit).
    pub repro_rate: f64,
    /// Probability of dying once the infection resolves.
    pub mortality_rate: f64,
}

#[derive(Debug, Clone)]
pub struct Individual {
    id: usize,
    alive: bool,
    vaccinated: bool,
    infection: Option<Rc<Pathogen>>,
}

impl Individual {
    pub fn new(id: usize, vaccinated: bool, infection: Option<Rc<Pathogen>>) -> Self {
        Self {
            id,
            alive: true,
            vaccinated,
            infection,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Vaccinated before the run or immune after surviving an infection.
    pub fn is_vaccinated(&self) -> bool {
        self.vaccinated
    }

    pub fn infection(&self) -> Option<&Rc<Pathogen>> {
        self.infection.as_ref()
    }

    pub fn is_infected(&self) -> bool {
        self.infection.is_some()
    }

    pub fn is_susceptible(&self) -> bool {
        self.alive && !self.vaccinated && self.infection.is_none()
    }

    pub fn infect(&mut self, pathogen: Rc<Pathogen>) {
        self.infection = Some(pathogen);
    }

    /// Resolve the current infection: the individual either dies or becomes immune.
    ///
    /// Returns whether the individual is still alive afterwards.
    pub fn resolve_infection<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<bool> {
        if !self.alive {
            bail!("individual {} is dead", self.id);
        }
        let Some(pathogen) = self.infection.take() else {
            bail!("individual {} has no active infection", self.id);
        };

        if rng.random::<f64>() < pathogen.mortality_rate {
            self.alive = false;
        } else {
            self.vaccinated = true;
        }

        Ok(self.alive)
    }
}
