use crate::analysis::Analyzer;
use crate::config::Config;
use crate::engine::Engine;
use crate::record::TextLog;
use anyhow::{Context, Result};
use glob::glob;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use rmp_serde::encode;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

const OUTCOME_FILE: &str = "outcome.msgpack";

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    pub fn create_run(&self) -> Result<()> {
        let run_idx = match self.run_dirs().context("failed to list run dirs")?.last() {
            Some((last_idx, _)) => last_idx + 1,
            None => 0,
        };

        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        if let Err(error) = self.perform_run(run_idx) {
            if let Err(rm_error) = fs::remove_dir_all(&run_dir) {
                log::warn!("failed to remove {run_dir:?}: {rm_error}");
            }
            return Err(error);
        }

        Ok(())
    }

    fn perform_run(&self, run_idx: usize) -> Result<()> {
        let rng = match self.cfg.seed {
            Some(seed) => {
                let mut rng = ChaCha12Rng::seed_from_u64(seed);
                rng.set_stream(run_idx as u64);
                rng
            }
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let mut engine = Engine::generate_initial_condition(self.cfg.clone(), rng)
            .context("failed to generate initial condition")?;

        let log_file = self.log_file(run_idx);
        let mut log = TextLog::create(&log_file)
            .with_context(|| format!("failed to create log {log_file:?}"))?;

        let outcome = engine.run(&mut log).context("failed to run simulation")?;

        let outcome_file = self.outcome_file(run_idx);
        let file = File::create(&outcome_file)
            .with_context(|| format!("failed to create {outcome_file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &outcome).context("failed to serialize outcome")?;
        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    pub fn analyze_sim(&self) -> Result<()> {
        let mut analyzer = Analyzer::new();
        let mut n_runs = 0;
        for (_, run_dir) in self.run_dirs().context("failed to list run dirs")? {
            let outcome_file = run_dir.join(OUTCOME_FILE);
            if !outcome_file.is_file() {
                log::warn!("skipping {run_dir:?}: no outcome file");
                continue;
            }
            analyzer
                .add_file(&outcome_file)
                .context("failed to add file")?;
            n_runs += 1;
        }

        let results_file = self.results_file();
        analyzer
            .save_results(&results_file)
            .context("failed to save results")?;
        log::info!("analyzed {n_runs} runs into {results_file:?}");

        Ok(())
    }

    pub fn clean_sim(&self) -> Result<()> {
        let run_dirs = self.run_dirs().context("failed to list run dirs")?;
        for (_, run_dir) in &run_dirs {
            fs::remove_dir_all(run_dir).with_context(|| format!("failed to remove {run_dir:?}"))?;
        }

        let results_file = self.results_file();
        if results_file.exists() {
            fs::remove_file(&results_file)
                .with_context(|| format!("failed to remove {results_file:?}"))?;
        }
        log::info!("removed {} runs", run_dirs.len());

        Ok(())
    }

    /// Existing run dirs and their indices, sorted by index.
    fn run_dirs(&self) -> Result<Vec<(usize, PathBuf)>> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;

        let mut run_dirs = Vec::new();
        for path in glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
        {
            let run_idx = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix("run-"))
                .and_then(|idx| idx.parse::<usize>().ok());
            match run_idx {
                Some(run_idx) => run_dirs.push((run_idx, path)),
                None => log::warn!("ignoring {path:?}: not a run dir"),
            }
        }
        run_dirs.sort();
        Ok(run_dirs)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn log_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("log.txt")
    }

    fn outcome_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join(OUTCOME_FILE)
    }

    fn results_file(&self) -> PathBuf {
        self.sim_dir.join("results.json")
    }
}
