use crate::record::{EndReason, Outcome};
use crate::stats::Accumulator;
use anyhow::{Context, Result};
use rmp_serde::decode;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

pub trait Obs {
    fn update(&mut self, outcome: &Outcome);
    fn report(&self) -> serde_json::Value;
}

pub struct Mortality {
    acc: Accumulator,
}

impl Mortality {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
        }
    }
}

impl Obs for Mortality {
    fn update(&mut self, outcome: &Outcome) {
        self.acc.add(outcome.mortality);
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "mortality": self.acc.report() })
    }
}

pub struct NSteps {
    acc: Accumulator,
}

impl NSteps {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
        }
    }
}

impl Obs for NSteps {
    fn update(&mut self, outcome: &Outcome) {
        self.acc.add(outcome.n_steps as f64);
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "n_steps": self.acc.report() })
    }
}

pub struct NInteractions {
    acc: Accumulator,
}

impl NInteractions {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
        }
    }
}

impl Obs for NInteractions {
    fn update(&mut self, outcome: &Outcome) {
        self.acc.add(outcome.n_interactions as f64);
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "n_interactions": self.acc.report() })
    }
}

/// Fraction of runs ending for each reason.
pub struct ProbReason {
    acc_vec: Vec<Accumulator>,
}

impl ProbReason {
    pub fn new() -> Self {
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(EndReason::ALL.len(), Accumulator::new);
        Self { acc_vec }
    }
}

impl Obs for ProbReason {
    fn update(&mut self, outcome: &Outcome) {
        for (reason, acc) in EndReason::ALL.iter().zip(&mut self.acc_vec) {
            acc.add(if *reason == outcome.reason { 1.0 } else { 0.0 });
        }
    }

    fn report(&self) -> serde_json::Value {
        let reports: serde_json::Map<_, _> = EndReason::ALL
            .iter()
            .zip(&self.acc_vec)
            .map(|(reason, acc)| (format!("{reason:?}"), serde_json::json!(acc.report())))
            .collect();
        serde_json::json!({ "prob_reason": reports })
    }
}

pub struct Analyzer {
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new() -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(Mortality::new()),
            Box::new(NSteps::new()),
            Box::new(NInteractions::new()),
            Box::new(ProbReason::new()),
        ];
        Self { obs_ptr_vec }
    }

    pub fn add_outcome(&mut self, outcome: &Outcome) {
        for obs in &mut self.obs_ptr_vec {
            obs.update(outcome);
        }
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);

        let outcome: Outcome = decode::from_read(&mut reader).context("failed to read outcome")?;
        self.add_outcome(&outcome);
        Ok(())
    }

    pub fn report(&self) -> Vec<serde_json::Value> {
        self.obs_ptr_vec.iter().map(|obs| obs.report()).collect()
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, &self.report())
            .context("failed to serialize results")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(n_deaths: usize, n_steps: usize, reason: EndReason) -> Outcome {
        Outcome {
            n_steps,
            n_agents: 100,
            n_deaths,
            n_survivors: 100 - n_deaths,
            n_interactions: 100 * n_steps,
            reason,
            mortality: n_deaths as f64 / 100.0,
        }
    }

    #[test]
    fn aggregates_outcomes() {
        let mut analyzer = Analyzer::new();
        analyzer.add_outcome(&outcome(10, 4, EndReason::ImmunitySaturation));
        analyzer.add_outcome(&outcome(30, 6, EndReason::ImmunitySaturation));
        analyzer.add_outcome(&outcome(100, 2, EndReason::Extinction));
        analyzer.add_outcome(&outcome(20, 1, EndReason::Containment));

        let report = analyzer.report();
        assert_eq!(report.len(), 4);

        assert_eq!(report[0]["mortality"]["n_vals"], 4);
        let mean = report[0]["mortality"]["mean"].as_f64().unwrap();
        assert!((mean - 0.4).abs() < 1e-12);

        assert_eq!(report[1]["n_steps"]["mean"].as_f64(), Some(3.25));
        assert_eq!(report[2]["n_interactions"]["mean"].as_f64(), Some(325.0));

        let prob_reason = &report[3]["prob_reason"];
        for (reason, exp) in [
            ("ImmunitySaturation", 0.5),
            ("Extinction", 0.25),
            ("Containment", 0.25),
        ] {
            let prob = prob_reason[reason]["mean"].as_f64().unwrap();
            assert!((prob - exp).abs() < 1e-12, "{reason}: {prob}");
        }
    }
}
