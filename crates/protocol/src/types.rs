//! Outcomes, statistics, and service call records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a single synchronization pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
	/// True when inputs were unchanged and the pass was skipped.
	pub skipped: bool,
	/// `start` calls issued.
	pub started: usize,
	/// `stop` calls issued for active sessions.
	pub stopped: usize,
	/// Pending entries marked for stop-on-arrival.
	pub retired: usize,
	/// Retiring entries that became desired again before resolving.
	pub revived: usize,
}

impl SyncOutcome {
	/// Outcome of a pass skipped because nothing changed.
	pub fn unchanged() -> Self {
		Self {
			skipped: true,
			..Self::default()
		}
	}

	/// Returns true if the pass issued any `start` or `stop` call.
	pub fn issued_calls(&self) -> bool {
		self.started > 0 || self.stopped > 0
	}
}

/// Running counters kept by a binder over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinderStats {
	/// `start` calls issued.
	pub starts: u64,
	/// `stop` calls issued, including stale-resolution stops.
	pub stops: u64,
	/// `start` calls that rejected.
	pub start_failures: u64,
	/// `stop` calls that rejected.
	pub stop_failures: u64,
	/// Tokens that arrived after their key stopped being desired.
	pub stale_resolutions: u64,
}

/// One observed call against a session service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum CallRecord {
	/// `start(key)` was called.
	Start { key: Value },
	/// `start(key)` resolved with `token`.
	Started { key: Value, token: String },
	/// `start(key)` rejected.
	StartFailed { key: Value, reason: String },
	/// `stop(token)` was called.
	Stop {
		token: String,
		/// False when the token was unknown or already stopped.
		known: bool,
	},
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn call_record_is_internally_tagged() {
		let record = CallRecord::Started {
			key: json!({"chainId": "0x1"}),
			token: "7".into(),
		};
		let value = serde_json::to_value(&record).unwrap();
		assert_eq!(value, json!({"call": "started", "key": {"chainId": "0x1"}, "token": "7"}));
	}

	#[test]
	fn unchanged_outcome_issues_nothing() {
		let outcome = SyncOutcome::unchanged();
		assert!(outcome.skipped);
		assert!(!outcome.issued_calls());
	}
}
