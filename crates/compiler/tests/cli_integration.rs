//! Integration tests for the layerlab CLI.

use clap as _;
use compiler as _;
use rstest as _;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use thiserror as _;
use toml as _;
use tracing as _;
use tracing_subscriber as _;

fn binary_path() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.join("layerlab")
}

fn create_temp_file(dir: &std::path::Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn compile_prints_progress_and_listing() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = create_temp_file(temp_dir.path(), "one.c", "int a = 5;\n");

    let output = Command::new(binary_path())
        .args(["compile", source.to_str().unwrap()])
        .output()
        .expect("failed to run layerlab");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[in-progress] Lexical Analysis"));
    assert!(stdout.contains("[completed] Code Generation"));
    assert!(stdout.contains("C705E803000005000000"));
    assert!(stdout.contains("MOV [1000], 5"));
    assert!(stdout.contains("Compiled 2 instructions"));
}

#[test]
fn compile_json_is_a_compilation_result() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = create_temp_file(temp_dir.path(), "sum.c", simulator_core::DEFAULT_SOURCE);

    let output = Command::new(binary_path())
        .args(["compile", source.to_str().unwrap(), "--json"])
        .output()
        .expect("failed to run layerlab");

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["success"], serde_json::Value::Bool(true));
    assert_eq!(value["instructions"].as_array().map(Vec::len), Some(6));
    assert_eq!(value["errors"].as_array().map(Vec::len), Some(0));
    assert!(value["warnings"][0].as_str().unwrap().contains("printf"));
}

#[test]
fn compile_reports_errors() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = create_temp_file(temp_dir.path(), "bad.c", "int a = b;\n");

    let output = Command::new(binary_path())
        .args(["compile", source.to_str().unwrap()])
        .output()
        .expect("failed to run layerlab");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: 1:9: use of undeclared variable `b`"));
}

#[test]
fn run_steps_to_completion() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = create_temp_file(
        temp_dir.path(),
        "calc.c",
        "int main(int n) { int m = n + 4; return m * 3; }\n",
    );

    let output = Command::new(binary_path())
        .args(["run", source.to_str().unwrap()])
        .output()
        .expect("failed to run layerlab");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("fetch"));
    assert!(stdout.contains("program finished"));
    assert!(stdout.contains("EAX=12"));
    assert!(stdout.contains("[1004] = 4"));
}

#[test]
fn run_reports_runtime_faults() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = create_temp_file(temp_dir.path(), "div.c", "int z = 0; int q = 1 / z;\n");

    let output = Command::new(binary_path())
        .args(["run", source.to_str().unwrap()])
        .output()
        .expect("failed to run layerlab");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("divided by zero"));
}

#[test]
fn config_selects_initial_source() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_temp_file(
        temp_dir.path(),
        "sim.toml",
        "initial_source = \"int x = 2 * 21;\"\nlanguage = \"cpp\"\n",
    );

    let output = Command::new(binary_path())
        .args(["--config", config.to_str().unwrap(), "compile"])
        .output()
        .expect("failed to run layerlab");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("MOV [1000], 42"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("C++ source is compiled with the C front end"));
}

#[test]
fn invalid_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = create_temp_file(temp_dir.path(), "sim.toml", "initial_source = \"  \"\n");

    let status = Command::new(binary_path())
        .args(["--config", config.to_str().unwrap(), "layers"])
        .status()
        .expect("failed to run layerlab");

    assert!(!status.success());
}

#[test]
fn layers_lists_the_catalog() {
    let output = Command::new(binary_path())
        .args(["layers"])
        .output()
        .expect("failed to run layerlab");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("L7 Application"));
    assert!(stdout.contains("L0 Physical"));
}

#[test]
fn help_shows_usage() {
    let output = Command::new(binary_path())
        .arg("--help")
        .output()
        .expect("failed to run layerlab");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"));
    assert!(stdout.contains("compile"));
}

#[test]
fn unknown_command_fails() {
    let status = Command::new(binary_path())
        .arg("assemble")
        .status()
        .expect("failed to run layerlab");

    assert!(!status.success());
}
