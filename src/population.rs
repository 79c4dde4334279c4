use crate::config::InitConfig;
use crate::model::{Individual, Pathogen};
use anyhow::{Context, Result};
use rand::prelude::*;
use std::{collections::HashSet, rc::Rc};

/// Build the initial population.
///
/// Agents `0..n_infected` start infected. Vaccinated agents are sampled
/// without replacement from the remaining ones.
pub fn generate_population<R: Rng + ?Sized>(
    init: &InitConfig,
    pathogen: &Rc<Pathogen>,
    rng: &mut R,
) -> Result<Vec<Individual>> {
    let n_agents = init.n_agents;
    let n_infected = init.n_infected;

    let n_rem = n_agents
        .checked_sub(n_infected)
        .context("more infected agents than agents")?;

    let mut n_vacc = (n_agents as f64 * init.vacc_frac).floor() as usize;
    if n_vacc > n_rem {
        log::warn!("only {n_rem} agents left to vaccinate, but {n_vacc} requested");
        n_vacc = n_rem;
    }

    let i_agt_rem: Vec<usize> = (n_infected..n_agents).collect();
    let i_agt_vacc: HashSet<usize> = i_agt_rem
        .choose_multiple(rng, n_vacc)
        .copied()
        .collect();

    let pop = (0..n_agents)
        .map(|i_agt| {
            if i_agt < n_infected {
                Individual::new(i_agt, false, Some(pathogen.clone()))
            } else {
                Individual::new(i_agt, i_agt_vacc.contains(&i_agt), None)
            }
        })
        .collect();

    Ok(pop)
}
