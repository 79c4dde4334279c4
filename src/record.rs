//! Simulation records and the sinks that consume them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Reason a simulation stopped.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum EndReason {
    /// Every agent is dead.
    Extinction,
    /// No susceptible agent is left alive.
    ImmunitySaturation,
    /// The infection died out while susceptible agents remain.
    Containment,
}

impl EndReason {
    pub const ALL: [EndReason; 3] = [
        EndReason::Extinction,
        EndReason::ImmunitySaturation,
        EndReason::Containment,
    ];
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            EndReason::Extinction => "Entire population is dead",
            EndReason::ImmunitySaturation => "Entire population is either vaccinated or immune",
            EndReason::Containment => "Infection died out before reaching the whole population",
        };
        f.write_str(msg)
    }
}

/// Starting situation of a simulation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub n_agents: usize,
    pub vacc_frac: f64,
    pub pathogen_name: String,
    pub mortality_rate: f64,
    pub repro_rate: f64,
    pub n_infected_init: usize,
    pub timestamp: String,
}

/// State of the simulation after a step.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,

    /// Infected and alive agents.
    pub n_infected: usize,
    /// Alive agents that could still be infected.
    pub n_susceptible: usize,
    /// Vaccinated or immune agents.
    pub n_immune: usize,
    /// Cumulative deaths.
    pub n_deaths: usize,
    /// Cumulative interactions.
    pub n_interactions: usize,
    pub n_agents: usize,

    pub step_interactions: usize,
    pub new_infections: usize,
    pub new_deaths: usize,
    pub new_recoveries: usize,
}

/// Final summary of a simulation.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub n_steps: usize,
    pub n_agents: usize,
    pub n_deaths: usize,
    pub n_survivors: usize,
    pub n_interactions: usize,
    pub reason: EndReason,
    pub mortality: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum Record {
    Metadata(Metadata),
    Step(StepRecord),
    Outcome(Outcome),
}

/// Destination of the records emitted by a simulation.
pub trait Sink {
    fn write(&mut self, record: &Record) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Sink for Vec<Record> {
    fn write(&mut self, record: &Record) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Human-readable text log.
pub struct TextLog<W: Write> {
    writer: W,
}

impl TextLog<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> TextLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    fn write_metadata(&mut self, meta: &Metadata) -> std::io::Result<()> {
        let w = &mut self.writer;
        writeln!(w, "- - - - - - - {} Simulation - - - - - - -", meta.pathogen_name)?;
        writeln!(w)?;
        writeln!(w, "Simulation Date: {}", meta.timestamp)?;
        writeln!(w, "Virus: {}", meta.pathogen_name)?;
        writeln!(w, "Population Size: {}", meta.n_agents)?;
        writeln!(
            w,
            "Initial Vaccinated Population: {:.2}%",
            meta.vacc_frac * 100.0
        )?;
        writeln!(w, "Initial Infected Population: {}", meta.n_infected_init)?;
        writeln!(w, "Mortality Rate: {}", meta.mortality_rate)?;
        writeln!(w, "Reproductive Rate: {}", meta.repro_rate)?;
        writeln!(w, "- - - - - - - - - - - - - - - - - - - - - - - - - -")?;
        writeln!(w)
    }

    fn write_step(&mut self, rec: &StepRecord) -> std::io::Result<()> {
        let w = &mut self.writer;
        writeln!(w, "- - - - - - - - STEP NUMBER {} - - - - - - - -", rec.step)?;
        writeln!(w)?;
        writeln!(w, "Interactions: {}", rec.step_interactions)?;
        writeln!(w, "New Infections: {}", rec.new_infections)?;
        writeln!(w, "New Fatalities: {}", rec.new_deaths)?;
        writeln!(w, "New Recoveries: {}", rec.new_recoveries)?;
        writeln!(w, "Infected: {}", rec.n_infected)?;
        writeln!(w, "Susceptible: {}", rec.n_susceptible)?;
        writeln!(w, "Vaccinated or Immune: {}", rec.n_immune)?;
        writeln!(w, "Total Deaths: {}", rec.n_deaths)?;
        writeln!(w, "Total Interactions: {}", rec.n_interactions)?;
        writeln!(w)
    }

    fn write_outcome(&mut self, out: &Outcome) -> std::io::Result<()> {
        let w = &mut self.writer;
        writeln!(w, "- - - - - - - - SIMULATION OUTCOME - - - - - - - -")?;
        writeln!(w)?;
        writeln!(w, "The simulation has ended after {} steps", out.n_steps)?;
        writeln!(w, "**************************************************")?;
        writeln!(w, "{}", out.reason)?;
        writeln!(w, "**************************************************")?;
        writeln!(w, "Initial Population: {}", out.n_agents)?;
        writeln!(w, "Total Deaths: {}", out.n_deaths)?;
        writeln!(w, "Surviving Population: {}", out.n_survivors)?;
        writeln!(w, "Total Interactions: {}", out.n_interactions)?;
        writeln!(w, "Calculated Mortality Rate: {}", out.mortality)
    }
}

impl<W: Write> Sink for TextLog<W> {
    fn write(&mut self, record: &Record) -> Result<()> {
        let res = match record {
            Record::Metadata(meta) => self.write_metadata(meta),
            Record::Step(rec) => self.write_step(rec),
            Record::Outcome(out) => self.write_outcome(out),
        };
        res.context("failed to write record")
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("failed to flush writer stream")
    }
}
