//! Replay scenario files and replay reports.
//!
//! A scenario describes a binder, an in-memory session service, and an
//! ordered list of steps to apply to the binder:
//!
//! ```json
//! {
//!   "binder": { "label": "assets", "environment": "popup" },
//!   "service": { "latencyMs": 10, "failingKeys": ["bad"] },
//!   "steps": [
//!     { "sync": { "keys": ["foo", "bar"], "enabled": true } },
//!     { "waitMs": 20 },
//!     { "teardown": {} }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::options::BinderConfig;
use crate::types::{BinderStats, CallRecord, SyncOutcome};

/// Current schema version for replay reports.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Which binder a scenario drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinderMode {
	/// One session per key in a dynamic key set.
	#[default]
	Multi,
	/// One session for one key.
	Single,
}

/// Start latency override for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyLatency {
	pub key: Value,
	pub latency_ms: u64,
}

/// Behavior of the in-memory session service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSettings {
	/// Delay before every `start` resolves.
	#[serde(default)]
	pub latency_ms: u64,

	/// Per-key delays, overriding `latency_ms`.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub key_latency: Vec<KeyLatency>,

	/// Keys whose `start` always rejects.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub failing_keys: Vec<Value>,
}

/// One replay step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
	/// Run a synchronization pass.
	Sync {
		/// Desired keys (multi mode).
		#[serde(default, skip_serializing_if = "Vec::is_empty")]
		keys: Vec<Value>,
		/// Desired key (single mode; in multi mode, shorthand for a one-key set).
		#[serde(default, skip_serializing_if = "Option::is_none")]
		key: Option<Value>,
		#[serde(default = "default_enabled")]
		enabled: bool,
	},
	/// Let the runtime advance by this many milliseconds.
	WaitMs(u64),
	/// Wait for every outstanding start/stop to finish.
	Settle {},
	/// Tear the binder down.
	Teardown {},
}

fn default_enabled() -> bool {
	true
}

impl Step {
	/// Short step name used in reports.
	pub fn kind(&self) -> &'static str {
		match self {
			Step::Sync { .. } => "sync",
			Step::WaitMs(_) => "waitMs",
			Step::Settle {} => "settle",
			Step::Teardown {} => "teardown",
		}
	}
}

/// A complete replay scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
	#[serde(default)]
	pub binder: BinderConfig,
	#[serde(default)]
	pub mode: BinderMode,
	#[serde(default)]
	pub service: ServiceSettings,
	#[serde(default)]
	pub steps: Vec<Step>,
}

impl Scenario {
	/// Counts steps by kind.
	pub fn step_counts(&self) -> BTreeMap<&'static str, usize> {
		let mut counts = BTreeMap::new();
		for step in &self.steps {
			*counts.entry(step.kind()).or_insert(0) += 1;
		}
		counts
	}
}

/// Result of one replayed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
	pub index: usize,
	pub step: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub outcome: Option<SyncOutcome>,
}

/// Everything observed while replaying a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
	pub schema_version: u32,
	pub label: String,
	pub mode: BinderMode,
	pub steps: Vec<StepReport>,
	pub calls: Vec<CallRecord>,
	pub stats: BinderStats,
	/// Ledger buckets that still hold tokens, by bucket name.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub ledger: BTreeMap<String, Vec<String>>,
	/// Keys the service still holds a subscription for.
	pub subscribed_keys: Vec<Value>,
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::options::PollingEnvironment;

	#[test]
	fn parses_documented_scenario() {
		let scenario: Scenario = serde_json::from_value(json!({
			"binder": { "label": "assets", "environment": "popup" },
			"service": { "latencyMs": 10, "failingKeys": ["bad"] },
			"steps": [
				{ "sync": { "keys": ["foo", "bar"], "enabled": true } },
				{ "waitMs": 20 },
				{ "settle": {} },
				{ "teardown": {} }
			]
		}))
		.unwrap();

		assert_eq!(scenario.binder.label, "assets");
		assert_eq!(scenario.binder.environment, Some(PollingEnvironment::Popup));
		assert_eq!(scenario.mode, BinderMode::Multi);
		assert_eq!(scenario.service.latency_ms, 10);
		assert_eq!(scenario.service.failing_keys, vec![json!("bad")]);
		assert_eq!(scenario.steps.len(), 4);
		assert_eq!(
			scenario.steps[0],
			Step::Sync {
				keys: vec![json!("foo"), json!("bar")],
				key: None,
				enabled: true,
			}
		);
		assert_eq!(scenario.steps[1], Step::WaitMs(20));
	}

	#[test]
	fn sync_step_defaults_to_enabled() {
		let step: Step = serde_json::from_value(json!({ "sync": { "key": {"chainId": "0x1"} } })).unwrap();
		match step {
			Step::Sync { keys, key, enabled } => {
				assert!(keys.is_empty());
				assert_eq!(key, Some(json!({"chainId": "0x1"})));
				assert!(enabled);
			}
			_ => panic!("Expected Sync step"),
		}
	}

	#[test]
	fn step_counts_group_by_kind() {
		let scenario = Scenario {
			steps: vec![
				Step::Sync {
					keys: vec![json!("a")],
					key: None,
					enabled: true,
				},
				Step::WaitMs(5),
				Step::Sync {
					keys: vec![],
					key: None,
					enabled: false,
				},
			],
			..Default::default()
		};
		let counts = scenario.step_counts();
		assert_eq!(counts.get("sync"), Some(&2));
		assert_eq!(counts.get("waitMs"), Some(&1));
		assert_eq!(counts.get("teardown"), None);
	}
}
