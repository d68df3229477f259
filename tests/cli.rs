use assert_cmd::prelude::*;
use predicates::str::contains;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const CUBE: &str = "\
v -0.15 -0.15 -0.15
v 0.15 -0.15 -0.15
v 0.15 0.15 -0.15
v -0.15 0.15 -0.15
v -0.15 -0.15 0.15
v 0.15 -0.15 0.15
v 0.15 0.15 0.15
v -0.15 0.15 0.15
usemtl denim
f 1 2 3 4
f 5 6 7 8
f 1 2 6 5
f 4 3 7 8
f 1 4 8 5
f 2 3 7 6
";

fn asset_root() -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("cube.obj"), CUBE).expect("write cube");
    fs::write(dir.path().join("cube.mtl"), "newmtl denim\nKd 0.2 0.4 0.6\n").expect("write mtl");
    dir
}

fn viewer(root: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("garment-viewer").expect("binary exists");
    cmd.arg("--asset-root")
        .arg(root.path())
        .arg("--summary-only")
        .arg("--frames")
        .arg("3");
    cmd
}

#[test]
fn cli_loads_scales_and_summarizes_asset() {
    let root = asset_root();
    viewer(&root)
        .arg("cube.obj")
        .arg("--target-size")
        .arg("5")
        .assert()
        .success()
        .stdout(contains("Asset: cube.obj (Loaded)"))
        .stdout(contains("size=(5.00, 5.00, 5.00)"))
        .stdout(contains("Backdrop: grid"))
        .stdout(contains("Frames: 3 rotation=on"));
}

#[test]
fn cli_uses_authored_material_when_hinted() {
    let root = asset_root();
    viewer(&root)
        .arg("cube.obj")
        .arg("--material")
        .arg("cube.mtl")
        .arg("--no-rotate")
        .assert()
        .success()
        .stdout(contains("Colors: #336699"))
        .stdout(contains("rotation=off spin=0.000"));
}

#[test]
fn cli_shows_placeholder_for_missing_asset() {
    let root = asset_root();
    viewer(&root)
        .arg("missing.obj")
        .assert()
        .success()
        .stdout(contains("Asset: missing.obj (Failed)"))
        .stdout(contains("size=(5.00, 8.00, 0.50)"));
}

#[test]
fn cli_reports_scene_backdrop_fallback() {
    let root = asset_root();
    viewer(&root)
        .arg("cube.obj")
        .arg("--backdrop")
        .arg("scene")
        .assert()
        .success()
        .stdout(contains(
            "Backdrop: grid (fallback: no backdrop scene could be loaded (3 candidate(s) tried))",
        ));
}

#[test]
fn cli_reads_json_config() {
    let root = asset_root();
    let config = root.path().join("viewer.json");
    fs::write(
        &config,
        r#"{"assetPath": "cube.obj", "targetSize": 2, "backdropType": "gradient"}"#,
    )
    .expect("write config");
    viewer(&root)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("size=(2.00, 2.00, 2.00)"))
        .stdout(contains("Backdrop: gradient"));
}

#[test]
fn cli_rejects_unknown_arguments() {
    Command::cargo_bin("garment-viewer")
        .expect("binary exists")
        .arg("cube.obj")
        .arg("--bogus")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"));
}
