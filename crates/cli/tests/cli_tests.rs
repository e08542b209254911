// Integration tests for the `pcorr` binary: exit codes, file naming, archives.
// Run with: cargo test -p pcorr-cli --test cli_tests -- --nocapture

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn pcorr() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pcorr"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn run(args: &[&str]) -> Output {
    pcorr().args(args).output().expect("spawn pcorr")
}

fn assert_ok(output: &Output) {
    assert!(
        output.status.success(),
        "exit code: {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_code(output: &Output, code: i32) {
    assert_eq!(
        output.status.code(),
        Some(code),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn s(p: &Path) -> &str {
    p.to_str().unwrap()
}

/// Raw batch: hosts a and b over `instances`; b flips state with a and its
/// latency is twice a's.
fn write_batch(dir: &Path, name: &str, instances: std::ops::Range<usize>) -> PathBuf {
    let mut text = String::from("host,ip,instance,state,latency\n");
    for k in instances {
        let (sa, sb) = if k % 2 == 0 { ("up", "ok") } else { ("down", "bad") };
        text.push_str(&format!("a,10.0.0.1,i{k},{sa},{}\n", k + 1));
        text.push_str(&format!("b,10.0.0.2,i{k},{sb},{}\n", 2 * (k + 1)));
    }
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

const LAYOUT: &[&str] = &["--key", "0", "--data", "3,4", "--instance", "2"];

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn run_writes_tagged_tables() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_batch(dir.path(), "export.csv", 0..20);

    let mut args = vec!["run", s(&input), "--dir", s(dir.path()), "--tag", "t1"];
    args.extend_from_slice(LAYOUT);
    let output = run(&args);
    assert_ok(&output);

    let pivot = fs::read_to_string(dir.path().join("corr_data_t1.csv")).unwrap();
    assert!(pivot.starts_with("K_host,i0,i1,"));
    assert!(pivot.contains("\na,up|||1,down|||2,"));

    let golden = fs::read_to_string(dir.path().join("golden_t1.csv")).unwrap();
    let lines: Vec<&str> = golden.lines().collect();
    assert_eq!(lines[0], "K_host,Data Index,Golden value,conf_prob");
    assert_eq!(lines[1], "a,0,up,0.5,down,0.5");
    assert_eq!(lines[2], "a,1");

    let rels = fs::read_to_string(dir.path().join("correlations_t1.csv")).unwrap();
    assert!(rels.starts_with("K_host_1,Data Index_1,K_host_2,Data Index_2,Correlation type,"));
    assert!(rels.contains("a,0,b,0,CC_Pos,up,ok,"));
    assert!(rels.contains("a,0,b,0,CC_Neg,up,bad,1"));
    assert!(rels.contains("a,1,b,1,FF_LinReg,2,"));
}

#[test]
fn run_archive_replaces_tables_with_zip() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_batch(dir.path(), "export.csv", 0..6);

    let mut args = vec!["run", s(&input), "--dir", s(dir.path()), "--tag", "z", "--archive"];
    args.extend_from_slice(LAYOUT);
    assert_ok(&run(&args));

    for name in ["corr_data_z.csv", "golden_z.csv", "correlations_z.csv"] {
        assert!(!dir.path().join(name).exists(), "{name} should be archived");
    }
    let zip_file = fs::File::open(dir.path().join("correlation_data_z.zip")).unwrap();
    let archive = zip::ZipArchive::new(zip_file).unwrap();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["corr_data_z.csv", "correlations_z.csv", "golden_z.csv"]);
}

#[test]
fn run_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_batch(dir.path(), "export.csv", 0..20);

    let mut args = vec!["run", s(&input), "--dir", s(dir.path()), "--tag", "j", "--json"];
    args.extend_from_slice(LAYOUT);
    let output = run(&args);
    assert_ok(&output);

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["tag"], "j");
    assert_eq!(report["entities"], 2);
    assert_eq!(report["instances"], 20);
    assert_eq!(report["summary"]["columns"], 4);
    assert_eq!(report["summary"]["pairs_mined"], 6);
    assert_eq!(report["summary"]["relations"], 5);
    let tags: Vec<&String> = report["summary"]["type_counts"].as_object().unwrap().keys().collect();
    assert_eq!(tags, vec!["categorical", "float"]);
}

#[test]
fn run_reads_layout_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_batch(dir.path(), "export.csv", 0..4);
    let config = dir.path().join("pcorr.toml");
    fs::write(
        &config,
        "[layout]\nkey_fields = [0]\ndata_fields = [3]\ninstance_field = 2\n\n[thresholds]\ncat_thresh = 0.4\n",
    )
    .unwrap();

    let output = run(&["run", s(&input), "--dir", s(dir.path()), "--tag", "c", "-c", s(&config)]);
    assert_ok(&output);
    let pivot = fs::read_to_string(dir.path().join("corr_data_c.csv")).unwrap();
    assert!(pivot.contains("\na,up,down,up,down\n"));
}

// ---------------------------------------------------------------------------
// accumulate + mine
// ---------------------------------------------------------------------------

#[test]
fn accumulate_twice_then_mine() {
    let dir = tempfile::tempdir().unwrap();
    let pivot = dir.path().join("corr_data_week.csv");
    let first = write_batch(dir.path(), "monday.csv", 0..10);
    let second = write_batch(dir.path(), "tuesday.csv", 10..20);

    for input in [&first, &second] {
        let mut args = vec!["accumulate", s(input), "--pivot", s(&pivot)];
        args.extend_from_slice(LAYOUT);
        assert_ok(&run(&args));
    }
    let header = fs::read_to_string(&pivot).unwrap();
    assert_eq!(header.lines().next().unwrap().split(',').count(), 21);

    let output = run(&["mine", s(&pivot), "--workers", "2"]);
    assert_ok(&output);
    assert!(dir.path().join("golden_week.csv").exists());
    let rels = fs::read_to_string(dir.path().join("correlations_week.csv")).unwrap();
    assert!(rels.contains("CC_Pos"));
}

#[test]
fn reserved_tokens_keep_pivot_history() {
    let dir = tempfile::tempdir().unwrap();
    let pivot = dir.path().join("corr_data_hist.csv");
    let first = write_batch(dir.path(), "monday.csv", 0..2);
    let mut args = vec!["accumulate", s(&first), "--pivot", s(&pivot)];
    args.extend_from_slice(LAYOUT);
    assert_ok(&run(&args));
    let before = fs::read_to_string(&pivot).unwrap();

    let bad = dir.path().join("tuesday.csv");
    fs::write(
        &bad,
        "host,ip,instance,state,latency\na,10.0.0.1,i9,up|||down,1\nb,10.0.0.2,K_i9,ok,2\n",
    )
    .unwrap();
    let mut args = vec!["accumulate", s(&bad), "--pivot", s(&pivot)];
    args.extend_from_slice(LAYOUT);
    let output = run(&args);
    assert_code(&output, 4);
    assert!(String::from_utf8_lossy(&output.stderr).contains("row 1"));
    assert_eq!(fs::read_to_string(&pivot).unwrap(), before);
}

#[test]
fn mine_honours_out_dir_and_tag() {
    let dir = tempfile::tempdir().unwrap();
    let pivot = dir.path().join("pivot.csv");
    let input = write_batch(dir.path(), "export.csv", 0..4);
    let mut args = vec!["accumulate", s(&input), "--pivot", s(&pivot)];
    args.extend_from_slice(LAYOUT);
    assert_ok(&run(&args));

    let out = dir.path().join("results");
    assert_ok(&run(&["mine", s(&pivot), "--out-dir", s(&out), "--tag", "x"]));
    assert!(out.join("golden_x.csv").exists());
    assert!(out.join("correlations_x.csv").exists());
}

// ---------------------------------------------------------------------------
// split
// ---------------------------------------------------------------------------

#[test]
fn split_writes_one_file_per_host() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_batch(dir.path(), "export.csv", 0..3);
    let out = dir.path().join("parts");

    assert_ok(&run(&["split", s(&input), "--key", "0", "--out", s(&out)]));
    let a = fs::read_to_string(out.join("a.csv")).unwrap();
    assert_eq!(a.lines().count(), 4);
    assert!(a.starts_with("host,ip,instance,state,latency\n"));
    assert!(out.join("b.csv").exists());
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

#[test]
fn missing_layout_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_batch(dir.path(), "export.csv", 0..2);
    let output = run(&["run", s(&input), "--dir", s(dir.path())]);
    assert_code(&output, 2);
    assert!(String::from_utf8_lossy(&output.stderr).contains("hint:"));
}

#[test]
fn invalid_config_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_batch(dir.path(), "export.csv", 0..2);
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[thresholds]\nmin_corr = 7\n").unwrap();

    let output = run(&["run", s(&input), "--dir", s(dir.path()), "-c", s(&config)]);
    assert_code(&output, 3);

    fs::write(&config, "unknown_key = true\n").unwrap();
    let output = run(&["run", s(&input), "--dir", s(dir.path()), "-c", s(&config)]);
    assert_code(&output, 3);
}

#[test]
fn unreadable_input_is_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.csv");
    let mut args = vec!["run", s(&missing), "--dir", s(dir.path())];
    args.extend_from_slice(LAYOUT);
    assert_code(&run(&args), 4);

    assert_code(&run(&["mine", s(&dir.path().join("corr_data_none.csv"))]), 4);
}

#[test]
fn short_rows_are_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("short.csv");
    fs::write(&input, "host,ip,instance,state,latency\na,10.0.0.1,i0,up\n").unwrap();
    let mut args = vec!["run", s(&input), "--dir", s(dir.path())];
    args.extend_from_slice(LAYOUT);
    let output = run(&args);
    assert_code(&output, 4);
    assert!(String::from_utf8_lossy(&output.stderr).contains("out of range"));
}

#[test]
fn unknown_flag_is_usage_error() {
    assert_code(&run(&["run", "x.csv", "--bogus"]), 2);
}
