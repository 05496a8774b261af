use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::error::Error;
use tempfile::tempdir;

fn synbus() -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("synbus")?;
    // Keep the user's config out of the tests
    cmd.env_remove("SYNBUS_CONFIG")
        .env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", "/nonexistent/synbus-test-config");
    Ok(cmd)
}

fn read_summary(path: &std::path::Path) -> Result<Value, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[test]
fn models_lists_all_families() -> Result<(), Box<dyn Error>> {
    synbus()?
        .arg("models")
        .assert()
        .success()
        .stdout(predicate::str::contains("BLIFAT"))
        .stdout(predicate::str::contains("SynapticResourceSTDPDelta"))
        .stdout(predicate::str::contains("KWtaRandom"));
    Ok(())
}

#[test]
fn run_writes_summary() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let out = tmp.path().join("out").join("summary.json");

    synbus()?
        .args(["run", "--model", "additive-stdp", "--inputs", "16", "--neurons", "4"])
        .args(["--steps", "100", "--input-rate", "0.2", "--seed", "3", "--output"])
        .arg(&out)
        .assert()
        .success();

    let summary = read_summary(&out)?;
    assert_eq!(summary["model"], "AdditiveSTDPDelta");
    assert_eq!(summary["steps"], 100);
    assert_eq!(summary["spike_counts"].as_array().map(Vec::len), Some(4));
    Ok(())
}

#[test]
fn same_seed_same_summary() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let mut summaries = Vec::new();
    for (i, threads) in ["1", "3"].iter().enumerate() {
        let out = tmp.path().join(format!("run{}.json", i));
        synbus()?
            .args(["run", "--model", "resource-stdp", "--steps", "150", "--seed", "9"])
            .args(["--threads", threads, "--output"])
            .arg(&out)
            .assert()
            .success();
        summaries.push(read_summary(&out)?);
    }
    assert_eq!(summaries[0], summaries[1]);
    Ok(())
}

#[test]
fn config_file_is_applied() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let config = tmp.path().join("synbus.toml");
    std::fs::write(&config, "[run]\nmax_weight = 0.01\n")?;
    let out = tmp.path().join("summary.json");

    synbus()?
        .arg("--config")
        .arg(&config)
        .args(["run", "--steps", "10", "--output"])
        .arg(&out)
        .assert()
        .success();

    let summary = read_summary(&out)?;
    let max = summary["initial_weights"]["max"].as_f64().unwrap_or(1.0);
    assert!(max < 0.01);
    Ok(())
}

#[test]
fn invalid_rate_fails() -> Result<(), Box<dyn Error>> {
    synbus()?
        .args(["run", "--input-rate", "2.0", "--steps", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("input-rate"));
    Ok(())
}

#[test]
fn missing_config_file_fails() -> Result<(), Box<dyn Error>> {
    synbus()?
        .args(["--config", "/nonexistent/synbus.toml", "models"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    Ok(())
}
