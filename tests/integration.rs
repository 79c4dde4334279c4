use std::{
    env, fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

const CONFIG: &str = r#"
seed = 42

[pathogen]
name = "Sniffles"
repro_rate = 0.05
mortality_rate = 0.12

[init]
n_agents = 1000
vacc_frac = 0.1
n_infected = 10
"#;

fn run_bin(args: &[&str]) -> Output {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_contagion"));

    Command::new(bin)
        .args(args)
        .output()
        .expect("failed to execute command")
}

fn assert_success(output: &Output, args: &[&str]) {
    let stdout_str = String::from_utf8_lossy(&output.stdout);
    let stderr_str = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "failed to run binary with {args:?}\nstdout:\n{stdout_str}\nstderr:\n{stderr_str}\n"
    );
}

fn setup_dir(name: &str, config: &str) -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);

    fs::remove_dir_all(&test_dir).ok();
    fs::create_dir(&test_dir).expect("failed to create test directory");
    fs::write(test_dir.join("config.toml"), config).expect("failed to write config file");

    test_dir
}

fn path_str(path: &Path) -> &str {
    path.to_str()
        .expect("failed to convert test directory to string")
}

#[test]
fn basic_workflow() {
    let test_dir = setup_dir("basic_workflow", CONFIG);
    let test_dir_str = path_str(&test_dir);

    for _ in 0..3 {
        let args = ["--sim-dir", test_dir_str, "create"];
        assert_success(&run_bin(&args), &args);
    }

    for run_idx in 0..3 {
        let run_dir = test_dir.join(format!("run-{run_idx:04}"));
        assert!(run_dir.join("outcome.msgpack").is_file());

        let log = fs::read_to_string(run_dir.join("log.txt")).expect("failed to read log");
        assert!(log.starts_with("- - - - - - - Sniffles Simulation"));
        assert!(log.contains("Population Size: 1000\n"));
        assert!(log.contains("STEP NUMBER 1 "));
        assert!(log.contains("SIMULATION OUTCOME"));
    }

    // Same seed, different streams.
    let log_0 = fs::read_to_string(test_dir.join("run-0000/log.txt")).unwrap();
    let log_1 = fs::read_to_string(test_dir.join("run-0001/log.txt")).unwrap();
    let body = |log: &str| log.split_once("Virus").unwrap().1.to_string();
    assert_ne!(body(&log_0), body(&log_1));

    let args = ["--sim-dir", test_dir_str, "analyze"];
    assert_success(&run_bin(&args), &args);

    let results = fs::read_to_string(test_dir.join("results.json")).expect("failed to read results");
    let results: serde_json::Value = serde_json::from_str(&results).expect("invalid results");
    assert_eq!(results[0]["mortality"]["n_vals"], 3);

    let args = ["--sim-dir", test_dir_str, "clean"];
    assert_success(&run_bin(&args), &args);
    assert!(!test_dir.join("run-0000").exists());
    assert!(!test_dir.join("results.json").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn workflow_with_missing_runs() {
    let test_dir = setup_dir("workflow_with_missing_runs", CONFIG);
    let test_dir_str = path_str(&test_dir);
    let create = ["--sim-dir", test_dir_str, "create"];

    for _ in 0..3 {
        assert_success(&run_bin(&create), &create);
    }

    let outcome_2 = test_dir.join("run-0002/outcome.msgpack");
    let outcome_2_bytes = fs::read(&outcome_2).expect("failed to read outcome");
    let log_2 = test_dir.join("run-0002/log.txt");
    let log_2_text = fs::read_to_string(&log_2).expect("failed to read log");

    fs::remove_dir_all(test_dir.join("run-0001")).expect("failed to remove run dir");

    // New runs go after the highest existing index.
    assert_success(&run_bin(&create), &create);
    assert!(test_dir.join("run-0003/outcome.msgpack").is_file());
    assert!(!test_dir.join("run-0001").exists());
    assert_eq!(fs::read(&outcome_2).unwrap(), outcome_2_bytes);
    assert_eq!(fs::read_to_string(&log_2).unwrap(), log_2_text);

    // Leftover of an interrupted run.
    fs::create_dir(test_dir.join("run-0007")).expect("failed to create run dir");

    let analyze = ["--sim-dir", test_dir_str, "analyze"];
    assert_success(&run_bin(&analyze), &analyze);

    let results = fs::read_to_string(test_dir.join("results.json")).expect("failed to read results");
    let results: serde_json::Value = serde_json::from_str(&results).expect("invalid results");
    assert_eq!(results[0]["mortality"]["n_vals"], 3);

    assert_success(&run_bin(&create), &create);
    assert!(test_dir.join("run-0008/outcome.msgpack").is_file());

    let clean = ["--sim-dir", test_dir_str, "clean"];
    assert_success(&run_bin(&clean), &clean);
    for run_idx in [0, 2, 3, 7, 8] {
        assert!(!test_dir.join(format!("run-{run_idx:04}")).exists());
    }
    assert!(!test_dir.join("results.json").exists());

    fs::remove_dir_all(&test_dir).ok();
}

#[test]
fn invalid_config_fails() {
    let config = CONFIG.replace("n_infected = 10", "n_infected = 1001");
    let test_dir = setup_dir("invalid_config_fails", &config);

    let output = run_bin(&["--sim-dir", path_str(&test_dir), "create"]);
    assert!(!output.status.success());
    assert!(!test_dir.join("run-0000").exists());

    fs::remove_dir_all(&test_dir).ok();
}
