use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

const FLASK_SETTINGS: &str = r#"
current_profile: Main
profiles:
  Main:
    groups:
      - name: Flasks
        enabled: true
        rules:
          - source: vitals.hp.percent < 50
            key: F1
          - source: '{ SetFlag("low"), DisplayText("low life", 10, 10) }'
            action_shape: multiple_effects
"#;

const BROKEN_SETTINGS: &str = r#"
current_profile: Main
profiles:
  Main:
    groups:
      - name: Broken
        rules:
          - source: "1 +"
          - source: "true"
"#;

fn reagent() -> Command {
    let mut cmd = Command::cargo_bin("reagent").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_init_writes_default_settings() {
    let temp = TempDir::new().unwrap();
    let settings = temp.child("config").child("settings.yaml");

    reagent()
        .args(["init", "--settings"])
        .arg(settings.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized settings"));
    settings.assert(predicate::str::contains("current_profile: Default"));

    reagent()
        .args(["init", "--settings"])
        .arg(settings.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exist"));

    reagent()
        .args(["init", "--if-needed", "--settings"])
        .arg(settings.path())
        .assert()
        .success();
}

#[test]
fn test_check_reports_compile_failures() {
    let temp = TempDir::new().unwrap();
    let settings = temp.child("settings.yaml");
    settings.write_str(BROKEN_SETTINGS).unwrap();

    reagent()
        .args(["check", "--settings"])
        .arg(settings.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAIL  Broken #1"))
        .stdout(predicate::str::contains("ok    Broken #2"))
        .stderr(predicate::str::contains("1 of 2 rules failed to compile"));
}

#[test]
fn test_check_passes_for_valid_rules() {
    let temp = TempDir::new().unwrap();
    let settings = temp.child("settings.yaml");
    settings.write_str(FLASK_SETTINGS).unwrap();

    reagent()
        .args(["check", "--settings"])
        .arg(settings.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("All 2 rules compile"));
}

#[test]
fn test_check_unknown_profile() {
    let temp = TempDir::new().unwrap();
    let settings = temp.child("settings.yaml");
    settings.write_str(FLASK_SETTINGS).unwrap();

    reagent()
        .args(["check", "--profile", "Nope", "--settings"])
        .arg(settings.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Profile 'Nope' not found"));
}

#[test]
fn test_status_lists_groups() {
    let temp = TempDir::new().unwrap();
    let settings = temp.child("settings.yaml");
    settings.write_str(FLASK_SETTINGS).unwrap();

    reagent()
        .args(["status", "--settings"])
        .arg(settings.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile 'Main' (current): 2 rules"))
        .stdout(predicate::str::contains("[x] Flasks [M] - 2 rules"));
}

#[test]
fn test_run_prints_one_json_line_per_tick() {
    let temp = TempDir::new().unwrap();
    let settings = temp.child("settings.yaml");
    settings.write_str(FLASK_SETTINGS).unwrap();
    let snapshot = temp.child("world.json");
    snapshot
        .write_str(r#"{ "vitals": { "hp": { "current": 20, "max": 100 } } }"#)
        .unwrap();

    let output = reagent()
        .args(["run", "--ticks", "2", "--interval-ms", "1", "--settings"])
        .arg(settings.path())
        .arg("--snapshot")
        .arg(snapshot.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["key_to_press"], "F1");
    assert_eq!(lines[0]["texts"][0]["text"], "low life");
    // Second tick is inside the key press cooldown.
    assert!(lines[1]["key_to_press"].is_null());
    assert_eq!(lines[1]["pending"], 1);
}

#[test]
fn test_run_skips_when_player_is_dead() {
    let temp = TempDir::new().unwrap();
    let settings = temp.child("settings.yaml");
    settings.write_str(FLASK_SETTINGS).unwrap();
    let snapshot = temp.child("world.json");
    snapshot
        .write_str(r#"[{ "player": { "is_alive": false } }]"#)
        .unwrap();

    reagent()
        .args(["run", "--ticks", "1", "--interval-ms", "1", "--settings"])
        .arg(settings.path())
        .arg("--snapshot")
        .arg(snapshot.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""skipped":"player_dead""#));
}

#[test]
fn test_run_requires_settings() {
    let temp = TempDir::new().unwrap();
    let snapshot = temp.child("world.json");
    snapshot.write_str("{}").unwrap();

    reagent()
        .args(["run", "--ticks", "1", "--settings"])
        .arg(temp.child("missing.yaml").path())
        .arg("--snapshot")
        .arg(snapshot.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("reagent init"));
}
