//! CLI integration tests
//!
//! These tests run the built binary against the fixtures.

#![cfg(feature = "cli")]

use std::path::PathBuf;
use std::process::{Command, Output};

fn gmlstream_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gmlstream"))
}

fn fixtures_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path
}

fn fixture(name: &str) -> String {
    fixtures_dir().join(name).to_string_lossy().into_owned()
}

fn run(args: &[&str]) -> Output {
    Command::new(gmlstream_bin())
        .args(args)
        .output()
        .expect("Failed to execute command")
}

// ============================================================================
// Inspect Command Tests
// ============================================================================

#[test]
fn test_cli_inspect_basic() {
    let roads = fixture("roads.gml");
    let output = run(&["inspect", &roads, "--from", "3.1"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "inspect should succeed");
    assert!(stdout.contains("gmlstream v"), "should show version");
    assert!(stdout.contains("Kind: feature collection"), "should show kind");
    assert!(stdout.contains("Id: FC1"), "should show id");
    assert!(stdout.contains("Members: 2"), "should show member count");
    assert!(stdout.contains("#R3"), "should list the dangling reference");
}

#[test]
fn test_cli_inspect_json_output() {
    let roads = fixture("roads.gml");
    let output = run(&["inspect", "--json", &roads, "--from", "3.1"]);
    assert!(output.status.success(), "inspect --json should succeed");

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("should be valid JSON");
    assert_eq!(json["kind"], "feature collection");
    assert_eq!(json["members"], 2);
    assert_eq!(json["dangling_references"], serde_json::json!(["#R3"]));
}

#[test]
fn test_cli_inspect_with_schema() {
    let roads = fixture("roads.gml");
    let schema = fixture("roads.xsd");
    let output = run(&["inspect", &roads, "--from", "3.1", "--schema", &schema]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "inspect with schema should succeed: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("Members: 2"));
}

#[test]
fn test_cli_inspect_nonexistent_file() {
    let output = run(&["inspect", "/nonexistent/roads.gml"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "should fail for nonexistent file");
    assert!(stderr.contains("Error"), "should report an error");
}

// ============================================================================
// Convert Command Tests
// ============================================================================

#[test]
fn test_cli_convert_to_gml2() {
    let roads = fixture("roads.gml");
    let output = run(&["convert", &roads, "--from", "3.1", "--to", "2"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "convert should succeed");
    assert!(stdout.starts_with("<?xml"), "should write a declaration");
    assert!(stdout.contains(r#"fid="R1""#), "GML 2 ids are fid attributes");
    assert!(stdout.contains("<gml:coordinates"), "GML 2 uses gml:coordinates");
    assert_eq!(stdout.matches("<app:Company").count(), 1, "shared feature written once");
}

#[test]
fn test_cli_convert_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("roads32.gml");
    let roads = fixture("roads.gml");
    let target_arg = target.to_string_lossy().into_owned();
    let output = run(&["convert", &roads, "--from", "3.1", "--to", "3.2", "--output", &target_arg]);

    assert!(output.status.success(), "convert should succeed");
    let written = std::fs::read_to_string(&target).unwrap();
    assert!(written.contains("http://www.opengis.net/gml/3.2"));
    assert!(written.contains(r#"gml:id="R1""#));
}

#[test]
fn test_cli_convert_with_projection() {
    let roads = fixture("roads.gml");
    let output = run(&["convert", &roads, "--from", "3.1", "--property", "{urn:app}name"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "convert should succeed");
    assert!(stdout.contains("<app:name>B9</app:name>"));
    assert!(!stdout.contains("<app:lanes"), "unlisted properties are dropped");
    assert!(stdout.contains("gml:boundedBy"), "GML properties are kept");
}

// ============================================================================
// Negotiate Command Tests
// ============================================================================

#[test]
fn test_cli_negotiate() {
    let output = run(&["negotiate", "text/xml; subtype=gml/3.1.1"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Version: 3.1.1"));
    assert!(stdout.contains("Namespace: http://www.opengis.net/gml\n"));
}

#[test]
fn test_cli_negotiate_default() {
    let output = run(&["negotiate", "application/xml", "--default", "2"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Version: 2.1.2"));
}
