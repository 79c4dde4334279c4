use crate::model::Pathogen;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seed of the random number generator (OS entropy if absent).
    #[serde(default)]
    pub seed: Option<u64>,

    /// Pathogen spreading through the population.
    pub pathogen: Pathogen,

    /// Initial condition parameters.
    pub init: InitConfig,
}

/// Initial condition parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    /// Number of agents (fixed for the whole run).
    pub n_agents: usize,
    /// Fraction of agents vaccinated at the start.
    pub vacc_frac: f64,
    /// Number of agents infected at the start.
    pub n_infected: usize,
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
        Self::from_toml(&contents)
    }

    fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Check every parameter against its allowed range.
    pub fn validate(&self) -> Result<()> {
        check_num(self.pathogen.repro_rate, 0.0..f64::INFINITY)
            .context("invalid reproduction rate")?;
        check_num(self.pathogen.mortality_rate, 0.0..=1.0).context("invalid mortality rate")?;

        check_num(self.init.n_agents, 1..=10_000_000).context("invalid number of agents")?;
        check_num(self.init.vacc_frac, 0.0..=1.0).context("invalid vaccination fraction")?;
        check_num(self.init.n_infected, 0..=self.init.n_agents)
            .context("invalid initial number of infected agents")?;

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

#[cfg(test)]
pub(crate) fn test_config(
    n_agents: usize,
    vacc_frac: f64,
    n_infected: usize,
    repro_rate: f64,
    mortality_rate: f64,
) -> Config {
    Config {
        seed: None,
        pathogen: Pathogen {
            name: "Test".to_string(),
            repro_rate,
            mortality_rate,
        },
        init: InitConfig {
            n_agents,
            vacc_frac,
            n_infected,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
seed = 7

[pathogen]
name = "Sniffles"
repro_rate = 0.5
mortality_rate = 0.12

[init]
n_agents = 1000
vacc_frac = 0.1
n_infected = 10
"#;

    #[test]
    fn parses_valid_config() {
        let cfg = Config::from_toml(VALID).unwrap();
        assert_eq!(cfg, {
            let mut exp = test_config(1000, 0.1, 10, 0.5, 0.12);
            exp.seed = Some(7);
            exp.pathogen.name = "Sniffles".to_string();
            exp
        });
    }

    #[test]
    fn seed_is_optional() {
        let contents = VALID.replace("seed = 7", "");
        let cfg = Config::from_toml(&contents).unwrap();
        assert_eq!(cfg.seed, None);
    }

    #[test]
    fn rejects_out_of_range_values() {
        for (from, to) in [
            ("vacc_frac = 0.1", "vacc_frac = 1.5"),
            ("vacc_frac = 0.1", "vacc_frac = -0.1"),
            ("n_infected = 10", "n_infected = 1001"),
            ("n_agents = 1000", "n_agents = 0"),
            ("mortality_rate = 0.12", "mortality_rate = 1.2"),
            ("repro_rate = 0.5", "repro_rate = -0.5"),
            ("repro_rate = 0.5", "repro_rate = nan"),
        ] {
            let contents = VALID.replace(from, to);
            assert!(Config::from_toml(&contents).is_err(), "accepted {to:?}");
        }
    }

    #[test]
    fn accepts_boundary_values() {
        assert!(test_config(10, 1.0, 10, 0.0, 1.0).validate().is_ok());
        assert!(test_config(1, 0.0, 0, 2.5, 0.0).validate().is_ok());
    }

    #[test]
    fn rejects_missing_fields() {
        let contents = VALID.replace("n_infected = 10", "");
        assert!(Config::from_toml(&contents).is_err());
    }
}
