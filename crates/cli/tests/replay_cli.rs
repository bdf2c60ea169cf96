//! End-to-end tests running the `pollbind` binary against scenario files.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{Value, json};
use tempfile::TempDir;

fn pollbind_binary() -> PathBuf {
	PathBuf::from(env!("CARGO_BIN_EXE_pollbind"))
}

fn write_scenario(dir: &TempDir, name: &str, scenario: &Value) -> PathBuf {
	let path = dir.path().join(name);
	std::fs::write(&path, serde_json::to_string_pretty(scenario).unwrap()).unwrap();
	path
}

fn run_pollbind(args: &[&str], scenario: &Path) -> (bool, Value, String) {
	let output = Command::new(pollbind_binary())
		.args(args)
		.arg(scenario)
		.output()
		.expect("failed to execute pollbind");
	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	let parsed = serde_json::from_str::<Value>(&stdout).unwrap_or_else(|_| json!({ "raw": stdout }));
	(output.status.success(), parsed, stderr)
}

#[test]
fn replay_reports_calls_and_stats() {
	let dir = tempfile::tempdir().unwrap();
	let path = write_scenario(
		&dir,
		"moving.json",
		&json!({
			"binder": { "label": "assets", "environment": "popup" },
			"steps": [
				{ "sync": { "keys": ["foo", "bar"] } },
				{ "settle": {} },
				{ "sync": { "keys": ["bar", "baz"] } },
				{ "settle": {} },
				{ "teardown": {} }
			]
		}),
	);

	let (success, json, stderr) = run_pollbind(&["-f", "json", "replay"], &path);
	assert!(success, "replay failed: {stderr}");
	assert_eq!(json["ok"], true);
	assert_eq!(json["command"], "replay");

	let data = &json["data"];
	assert_eq!(data["label"], "assets");
	assert_eq!(data["stats"]["starts"], 3);
	assert_eq!(data["stats"]["stops"], 3);
	assert_eq!(data["steps"][2]["outcome"]["started"], 1);
	assert_eq!(data["steps"][2]["outcome"]["stopped"], 1);
	assert_eq!(data["subscribedKeys"], json!([]));
	assert!(data.get("ledger").is_none());

	let starts_for_bar = data["calls"]
		.as_array()
		.unwrap()
		.iter()
		.filter(|call| call["call"] == "start" && call["key"] == "bar")
		.count();
	assert_eq!(starts_for_bar, 1);
}

#[test]
fn replay_without_teardown_notes_the_implicit_shutdown() {
	let dir = tempfile::tempdir().unwrap();
	let path = write_scenario(&dir, "open.json", &json!({ "steps": [{ "sync": { "keys": [{"chainId": "0x1"}] } }] }));

	let (success, json, stderr) = run_pollbind(&["-f", "ndjson", "replay"], &path);
	assert!(success, "replay failed: {stderr}");
	assert_eq!(json["data"]["stats"]["stops"], 1);
	assert_eq!(json["diagnostics"][0]["level"], "info");
}

#[test]
fn validate_counts_steps() {
	let dir = tempfile::tempdir().unwrap();
	let path = write_scenario(
		&dir,
		"single.json",
		&json!({
			"mode": "single",
			"steps": [
				{ "sync": { "key": "0x1" } },
				{ "waitMs": 5 },
				{ "sync": { "key": "0x1", "enabled": false } }
			]
		}),
	);

	let (success, json, stderr) = run_pollbind(&["validate"], &path);
	assert!(success, "validate failed: {stderr}");
	assert_eq!(json["data"]["mode"], "single");
	assert_eq!(json["data"]["steps"], 3);
	assert_eq!(json["data"]["stepCounts"], json!({ "sync": 2, "waitMs": 1 }));
}

#[test]
fn inconsistent_scenario_fails_with_invalid_input() {
	let dir = tempfile::tempdir().unwrap();
	let path = write_scenario(&dir, "bad.json", &json!({ "mode": "single", "steps": [{ "sync": { "keys": ["foo"] } }] }));

	let (success, json, stderr) = run_pollbind(&["replay"], &path);
	assert!(!success);
	assert_eq!(json["ok"], false);
	assert_eq!(json["command"], "replay");
	assert_eq!(json["error"]["code"], "INVALID_INPUT");
	assert_eq!(json["error"]["details"]["index"], 0);
	assert!(stderr.contains("INVALID_INPUT"), "stderr: {stderr}");
}

#[test]
fn missing_scenario_fails_with_io_error() {
	let dir = tempfile::tempdir().unwrap();

	let (success, json, _stderr) = run_pollbind(&["validate"], &dir.path().join("nope.json"));
	assert!(!success);
	assert_eq!(json["error"]["code"], "IO_ERROR");
}
