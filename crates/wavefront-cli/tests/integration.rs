use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn wavefront(root: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("wavefront").unwrap();
    cmd.current_dir(root.path())
        .env("WAVEFRONT_ROOT", root.path());
    cmd
}

fn write_manifest(root: &TempDir, content: &str) -> std::path::PathBuf {
    let path = root.path().join("run.yaml");
    std::fs::write(&path, content).unwrap();
    path
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("README.md"), "# demo\n").unwrap();
    dir
}

const DIAMOND: &str = "\
objective: Exercise the wave planner
tickets:
  - id: A
    title: base work
    acceptance_criteria: [done]
    command: \"true\"
  - id: B
    title: left branch
    dependencies: [A]
    acceptance_criteria: [done]
    command: \"true\"
  - id: C
    title: right branch
    dependencies: [A]
    acceptance_criteria: [done]
    command: \"true\"
  - id: D
    title: join
    dependencies: [B, C]
    acceptance_criteria: [done]
    command: \"true\"
";

// ---------------------------------------------------------------------------
// wavefront plan
// ---------------------------------------------------------------------------

#[test]
fn plan_prints_three_waves_for_diamond() {
    let root = workspace();
    let manifest = write_manifest(&root, DIAMOND);
    wavefront(&root)
        .arg("plan")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("B, C"));
}

#[test]
fn plan_json_is_structured() {
    let root = workspace();
    let manifest = write_manifest(&root, DIAMOND);
    let output = wavefront(&root)
        .arg("--json")
        .arg("plan")
        .arg(&manifest)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let plan: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(plan["waves"].as_array().unwrap().len(), 3);
    assert!(plan["unschedulable"].as_array().unwrap().is_empty());
}

#[test]
fn plan_reports_cycles() {
    let root = workspace();
    let manifest = write_manifest(
        &root,
        "tickets:\n  - id: A\n    title: a\n    dependencies: [B]\n  - id: B\n    title: b\n    dependencies: [A]\n",
    );
    wavefront(&root)
        .arg("plan")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("unschedulable"));
}

#[test]
fn plan_missing_manifest_fails() {
    let root = workspace();
    wavefront(&root)
        .arg("plan")
        .arg("missing.yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn plan_duplicate_ids_fail() {
    let root = workspace();
    let manifest = write_manifest(
        &root,
        "tickets:\n  - id: A\n    title: one\n  - id: A\n    title: two\n",
    );
    wavefront(&root)
        .arg("plan")
        .arg(&manifest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate ticket id"));
}

// ---------------------------------------------------------------------------
// wavefront run
// ---------------------------------------------------------------------------

#[test]
fn run_completes_diamond_successfully() {
    let root = workspace();
    let manifest = write_manifest(&root, DIAMOND);
    wavefront(&root)
        .arg("run")
        .arg(&manifest)
        .arg("--no-autonomous")
        .assert()
        .success()
        .stdout(predicate::str::contains("WAVEFRONT EXECUTION SUMMARY"))
        .stdout(predicate::str::contains("4/4 completed"))
        .stdout(predicate::str::contains("SUCCESS"));
}

#[test]
fn run_failing_ticket_exits_nonzero() {
    let root = workspace();
    let manifest = write_manifest(
        &root,
        "tickets:\n  - id: A\n    title: doomed\n    acceptance_criteria: [never]\n    command: \"exit 1\"\n",
    );
    wavefront(&root)
        .arg("run")
        .arg(&manifest)
        .arg("--no-autonomous")
        .assert()
        .failure()
        .stdout(predicate::str::contains("NEEDS WORK"));
}

#[test]
fn run_json_summary_is_structured() {
    let root = workspace();
    let manifest = write_manifest(&root, DIAMOND);
    let output = wavefront(&root)
        .arg("--json")
        .arg("run")
        .arg(&manifest)
        .arg("--no-autonomous")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(summary["tickets"]["completed"], 4);
    assert_eq!(summary["success"], true);
    assert_eq!(summary["integration"]["status"], "success");
}

#[test]
fn run_does_not_mutate_the_source_tree() {
    let root = workspace();
    let manifest = write_manifest(
        &root,
        "tickets:\n  - id: A\n    title: scribble\n    acceptance_criteria: [done]\n    command: \"echo scribbled > README.md\"\n",
    );
    wavefront(&root)
        .arg("run")
        .arg(&manifest)
        .arg("--no-autonomous")
        .assert()
        .success();
    assert_eq!(
        std::fs::read_to_string(root.path().join("README.md")).unwrap(),
        "# demo\n"
    );
}

#[test]
fn run_with_cycle_reports_unschedulable_and_fails() {
    let root = workspace();
    let manifest = write_manifest(
        &root,
        "tickets:\n  - id: A\n    title: a\n    dependencies: [B]\n  - id: B\n    title: b\n    dependencies: [A]\n",
    );
    wavefront(&root)
        .arg("run")
        .arg(&manifest)
        .arg("--no-autonomous")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Unschedulable"));
}
