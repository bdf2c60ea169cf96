//! Scenario loading, checking, and replay.
//!
//! A replay drives one binder through the scenario's steps against a
//! [`MemoryService`] wrapped in a [`LedgeredService`], then shuts the binder
//! down and reports every call the service saw. Anything still subscribed
//! or still in the ledger after shutdown is a leaked session.

use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use pollbind::{BinderStats, LedgeredService, MemoryService, MultiSessionBinder, PollingEnvironment, SessionBinder, SharedLedger, SyncOutcome};
use pollbind_protocol::{BinderMode, REPORT_SCHEMA_VERSION, ReplayReport, Scenario, Step, StepReport};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{CliError, Result};

type Service = LedgeredService<MemoryService>;

/// Reads and parses a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
	let text = std::fs::read_to_string(path).map_err(|source| CliError::ScenarioRead {
		path: path.to_path_buf(),
		source,
	})?;
	serde_json::from_str(&text).map_err(|source| CliError::ScenarioParse {
		path: path.to_path_buf(),
		source,
	})
}

/// Checks that every step makes sense for the scenario's mode.
pub fn check(scenario: &Scenario) -> Result<()> {
	let mut torn_down = false;
	for (index, step) in scenario.steps.iter().enumerate() {
		let invalid = |reason: &str| CliError::InvalidStep {
			index,
			step: step.kind(),
			reason: reason.to_string(),
		};
		match step {
			Step::Sync { .. } if torn_down => return Err(invalid("binder is already torn down")),
			Step::Sync { keys, key, .. } if scenario.mode == BinderMode::Single => {
				if key.is_none() {
					return Err(invalid("single mode needs a `key`"));
				}
				if !keys.is_empty() {
					return Err(invalid("single mode takes `key`, not `keys`"));
				}
			}
			Step::Teardown {} => torn_down = true,
			_ => {}
		}
	}
	Ok(())
}

enum Driver {
	Multi(MultiSessionBinder<Service>),
	Single(SessionBinder<Service>),
}

impl Driver {
	fn sync(&mut self, index: usize, service: &Rc<Service>, keys: &[Value], key: Option<&Value>, enabled: bool) -> Result<SyncOutcome> {
		match self {
			Driver::Multi(binder) => {
				let desired = keys.iter().chain(key).cloned();
				Ok(binder.synchronize(service, desired, enabled)?)
			}
			Driver::Single(binder) => {
				let key = key.ok_or_else(|| CliError::InvalidStep {
					index,
					step: "sync",
					reason: "single mode needs a `key`".into(),
				})?;
				Ok(binder.synchronize(service, key, enabled)?)
			}
		}
	}

	fn teardown(&mut self) {
		match self {
			Driver::Multi(binder) => binder.teardown(),
			Driver::Single(binder) => binder.teardown(),
		}
	}

	async fn settle(&self) {
		match self {
			Driver::Multi(binder) => binder.settle().await,
			Driver::Single(binder) => binder.settle().await,
		}
	}

	async fn shutdown(self) -> BinderStats {
		match self {
			Driver::Multi(binder) => binder.shutdown().await,
			Driver::Single(binder) => binder.shutdown().await,
		}
	}
}

/// Replays `scenario` and reports what happened.
///
/// Must run inside a tokio `LocalSet`.
pub async fn replay(scenario: &Scenario) -> Result<ReplayReport> {
	check(scenario)?;

	let memory = Rc::new(MemoryService::from_settings(&scenario.service).map_err(CliError::ServiceSettings)?);
	let environment = scenario.binder.environment.unwrap_or(PollingEnvironment::Background);
	let ledger: SharedLedger<String> = Rc::default();
	let service = Rc::new(LedgeredService::new(Rc::clone(&memory), Rc::clone(&ledger), environment));

	let config = scenario.binder.clone();
	let mut driver = match scenario.mode {
		BinderMode::Multi => Driver::Multi(MultiSessionBinder::new(config, Rc::clone(&service))),
		BinderMode::Single => Driver::Single(SessionBinder::new(config, Rc::clone(&service))),
	};
	info!(target = "pollbind.replay", label = %scenario.binder.label, mode = ?scenario.mode, steps = scenario.steps.len(), "replaying scenario");

	let mut steps = Vec::with_capacity(scenario.steps.len());
	for (index, step) in scenario.steps.iter().enumerate() {
		let outcome = match step {
			Step::Sync { keys, key, enabled } => Some(driver.sync(index, &service, keys, key.as_ref(), *enabled)?),
			Step::WaitMs(ms) => {
				tokio::time::sleep(Duration::from_millis(*ms)).await;
				None
			}
			Step::Settle {} => {
				driver.settle().await;
				None
			}
			Step::Teardown {} => {
				driver.teardown();
				None
			}
		};
		debug!(target = "pollbind.replay", index, step = step.kind(), ?outcome, "step applied");
		steps.push(StepReport {
			index,
			step: step.kind().to_string(),
			outcome,
		});
	}

	let stats = driver.shutdown().await;
	let ledger = ledger.borrow();
	let leaked_tokens = PollingEnvironment::TRACKED
		.iter()
		.filter(|environment| !ledger.tokens(**environment).is_empty())
		.map(|environment| (environment.bucket_name().to_string(), ledger.tokens(*environment).to_vec()))
		.collect();

	info!(
		target = "pollbind.replay",
		starts = stats.starts,
		stops = stats.stops,
		start_failures = stats.start_failures,
		stale_resolutions = stats.stale_resolutions,
		"replay finished"
	);

	Ok(ReplayReport {
		schema_version: REPORT_SCHEMA_VERSION,
		label: scenario.binder.label.clone(),
		mode: scenario.mode,
		steps,
		calls: memory.calls(),
		stats,
		ledger: leaked_tokens,
		subscribed_keys: memory.active_keys(),
	})
}

#[cfg(test)]
mod tests {
	use pollbind_protocol::CallRecord;
	use serde_json::json;
	use tokio::task::LocalSet;

	use super::*;

	fn scenario(value: Value) -> Scenario {
		serde_json::from_value(value).unwrap()
	}

	async fn run(scenario: &Scenario) -> Result<ReplayReport> {
		LocalSet::new().run_until(replay(scenario)).await
	}

	#[tokio::test(flavor = "current_thread")]
	async fn failing_key_is_isolated_in_the_call_log() {
		let scenario = scenario(json!({
			"service": { "failingKeys": ["bad"] },
			"steps": [
				{ "sync": { "keys": ["foo", "bad"] } },
				{ "settle": {} },
				{ "teardown": {} }
			]
		}));
		let report = run(&scenario).await.unwrap();

		assert_eq!(
			report.calls,
			vec![
				CallRecord::Start { key: json!("foo") },
				CallRecord::Start { key: json!("bad") },
				CallRecord::Started {
					key: json!("foo"),
					token: "1".into()
				},
				CallRecord::StartFailed {
					key: json!("bad"),
					reason: "no polling source for \"bad\"".into()
				},
				CallRecord::Stop {
					token: "1".into(),
					known: true
				},
			]
		);
		assert_eq!(report.stats.starts, 2);
		assert_eq!(report.stats.start_failures, 1);
		assert_eq!(report.steps[0].outcome.map(|outcome| outcome.started), Some(2));
		assert!(report.steps[1].outcome.is_none());
	}

	#[tokio::test(flavor = "current_thread", start_paused = true)]
	async fn late_resolution_is_stopped_and_nothing_leaks() {
		let scenario = scenario(json!({
			"binder": { "label": "assets", "environment": "popup" },
			"service": { "latencyMs": 30 },
			"steps": [
				{ "sync": { "keys": ["foo"] } },
				{ "waitMs": 10 },
				{ "sync": { "keys": ["bar"] } },
				{ "waitMs": 50 },
				{ "teardown": {} }
			]
		}));
		let report = run(&scenario).await.unwrap();

		assert_eq!(report.label, "assets");
		assert_eq!(report.steps[2].outcome.map(|outcome| outcome.retired), Some(1));
		assert_eq!(report.stats.stale_resolutions, 1);
		assert_eq!(report.stats.stops, 2);
		assert!(report.subscribed_keys.is_empty());
		assert!(report.ledger.is_empty());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn single_mode_stops_the_previous_key() {
		let scenario = scenario(json!({
			"mode": "single",
			"steps": [
				{ "sync": { "key": {"chainId": "0x1"} } },
				{ "settle": {} },
				{ "sync": { "key": {"chainId": "0x5"} } },
				{ "settle": {} }
			]
		}));
		let report = run(&scenario).await.unwrap();

		assert_eq!(report.mode, BinderMode::Single);
		assert_eq!(report.steps[2].outcome.map(|outcome| outcome.stopped), Some(1));
		// The second session is stopped by the shutdown that ends every replay.
		assert_eq!(report.stats.stops, 2);
		assert!(report.subscribed_keys.is_empty());
	}

	#[test]
	fn single_mode_requires_a_key() {
		let scenario = scenario(json!({
			"mode": "single",
			"steps": [{ "sync": { "keys": ["foo"] } }]
		}));
		let err = check(&scenario).unwrap_err();
		assert!(matches!(err, CliError::InvalidStep { index: 0, .. }));
	}

	#[test]
	fn sync_after_teardown_is_rejected() {
		let scenario = scenario(json!({
			"steps": [
				{ "teardown": {} },
				{ "settle": {} },
				{ "sync": { "keys": ["foo"] } }
			]
		}));
		let err = check(&scenario).unwrap_err();
		assert!(matches!(err, CliError::InvalidStep { index: 2, step: "sync", .. }));
	}

	#[test]
	fn load_scenario_reports_parse_errors() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("broken.json");
		std::fs::write(&path, "{ \"steps\": [ { \"jump\": {} } ] }").unwrap();

		let err = load_scenario(&path).unwrap_err();
		assert!(matches!(err, CliError::ScenarioParse { .. }));

		let missing = load_scenario(&dir.path().join("missing.json")).unwrap_err();
		assert!(matches!(missing, CliError::ScenarioRead { .. }));
	}
}
