use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::Path};
use tempfile::tempdir;

fn simulate(out: &Path, bpm: &str, extra: &[&str]) {
    let mut cmd = cargo_bin_cmd!("nadi");
    cmd.args(["simulate", "--bpm", bpm, "--out", out.to_str().expect("utf8 path")]);
    cmd.args(extra);
    cmd.assert().success();
}

fn run_json(args: &[&str]) -> Result<Value, Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("nadi");
    cmd.args(args);
    let output = cmd.assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&output)?)
}

#[test]
fn simulate_writes_recording_csv() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let path = temp.path().join("pulse.csv");
    simulate(&path, "72", &["--duration-ms", "1000"]);
    let contents = fs::read_to_string(&path)?;
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("timestamp_ms,brightness,finger"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 30);
    assert!(rows[1].starts_with("33,"));
    assert!(rows.iter().all(|r| r.ends_with(",1")));
    Ok(())
}

#[test]
fn measure_reports_measured_outcome() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let path = temp.path().join("pulse.csv");
    simulate(&path, "72", &[]);
    let outcome = run_json(&["measure", "--input", path.to_str().expect("utf8 path")])?;

    assert_eq!(outcome["state"], "completed");
    assert_eq!(outcome["provenance"]["kind"], "measured");
    assert_eq!(outcome["source"], "spectral");
    assert_eq!(outcome["sample_count"], 600);
    let bpm = outcome["metrics"]["heart_rate_bpm"].as_u64().expect("bpm");
    assert!((69..=75).contains(&bpm), "bpm {}", bpm);
    let dosha = &outcome["dosha"];
    let total: u64 = ["vata", "pitta", "kapha"]
        .iter()
        .map(|k| dosha[*k].as_u64().expect("percentage"))
        .sum();
    assert_eq!(total, 100);
    Ok(())
}

#[test]
fn measure_exhausts_retries_on_sparse_recording() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let path = temp.path().join("sparse.csv");
    fs::write(
        &path,
        "timestamp_ms,brightness\n0,120.0\n33,121.0\n67,122.0\n100,121.0\n133,120.0\n",
    )?;
    let outcome = run_json(&["measure", "--input", path.to_str().expect("utf8 path")])?;

    assert_eq!(outcome["state"], "completed");
    assert_eq!(outcome["provenance"]["kind"], "estimated");
    assert_eq!(outcome["provenance"]["reason"], "retry_budget_exhausted");
    assert_eq!(outcome["attempt"], 0);
    assert!(outcome["quality"].is_null());
    let bpm = outcome["metrics"]["heart_rate_bpm"].as_u64().expect("bpm");
    assert!((69..=75).contains(&bpm), "bpm {}", bpm);
    Ok(())
}

#[test]
fn measure_honours_session_config() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let recording = temp.path().join("pulse.csv");
    simulate(&recording, "66", &[]);
    let config = temp.path().join("session.toml");
    fs::write(&config, "duration_ms = 10000\nanalysis_interval_ms = 1000\n")?;
    let outcome = run_json(&[
        "measure",
        "--input",
        recording.to_str().expect("utf8 path"),
        "--config",
        config.to_str().expect("utf8 path"),
    ])?;
    assert_eq!(outcome["state"], "completed");
    assert_eq!(outcome["sample_count"], 300);
    Ok(())
}

#[test]
fn measure_rejects_invalid_config() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let recording = temp.path().join("pulse.csv");
    simulate(&recording, "72", &["--duration-ms", "2000"]);
    let config = temp.path().join("session.toml");
    fs::write(&config, "max_attempts = 0\n")?;
    let mut cmd = cargo_bin_cmd!("nadi");
    cmd.args([
        "measure",
        "--input",
        recording.to_str().expect("utf8 path"),
        "--config",
        config.to_str().expect("utf8 path"),
    ]);
    cmd.assert().failure();
    Ok(())
}

#[test]
fn estimate_reports_all_methods() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let path = temp.path().join("pulse.csv");
    simulate(&path, "60", &["--noise", "0.1", "--seed", "7"]);
    let report = run_json(&["estimate", "--input", path.to_str().expect("utf8 path")])?;

    let spectral = report["spectral"]["heart_rate_bpm"].as_f64().expect("spectral");
    assert!((spectral - 60.0).abs() <= 3.0, "spectral {}", spectral);
    let autocorr = report["autocorrelation"]["heart_rate_bpm"]
        .as_f64()
        .expect("autocorrelation");
    assert!((autocorr - 60.0).abs() <= 3.0, "autocorrelation {}", autocorr);
    assert!(report["peaks"]["peak_timestamps_ms"].as_array().expect("peaks").len() >= 15);
    let fused = report["fused"]["heart_rate_bpm"].as_f64().expect("fused");
    assert!((fused - 60.0).abs() <= 3.0, "fused {}", fused);
    Ok(())
}

#[test]
fn estimate_reads_text_series() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let path = temp.path().join("series.txt");
    let series: String = (0..600)
        .map(|i| {
            let t = i as f64 / 30.0;
            format!("{}\n", 120.0 + 3.0 * (2.0 * std::f64::consts::PI * 1.2 * t).sin())
        })
        .collect();
    fs::write(&path, format!("# brightness\n{}", series))?;
    let report = run_json(&[
        "estimate",
        "--series",
        path.to_str().expect("utf8 path"),
        "--fps",
        "30",
    ])?;
    assert_eq!(report["sample_count"], 600);
    let fused = report["fused"]["heart_rate_bpm"].as_f64().expect("fused");
    assert!((fused - 72.0).abs() <= 3.0, "fused {}", fused);
    Ok(())
}

#[test]
fn dosha_scores_sum_to_hundred() -> Result<(), Box<dyn Error>> {
    let score = run_json(&[
        "dosha",
        "--hr",
        "95",
        "--hrv-ms",
        "70",
        "--strength",
        "0.3",
        "--regularity",
        "0.5",
    ])?;
    let total: u64 = ["vata", "pitta", "kapha"]
        .iter()
        .map(|k| score[*k].as_u64().expect("percentage"))
        .sum();
    assert_eq!(total, 100);
    assert_eq!(score["dominant"], "vata");
    Ok(())
}

#[test]
fn dosha_rejects_out_of_range_strength() {
    let mut cmd = cargo_bin_cmd!("nadi");
    cmd.args([
        "dosha",
        "--hr",
        "72",
        "--hrv-ms",
        "40",
        "--strength",
        "1.5",
        "--regularity",
        "0.8",
    ]);
    cmd.assert().failure();
}
