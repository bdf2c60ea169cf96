//! Binder configuration and polling environments.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Label used when a binder is created without one.
pub const DEFAULT_BINDER_LABEL: &str = "binder";

/// UI surface that requested a polling session.
///
/// Tokens are bucketed per environment so a host can stop everything a
/// surface started once that surface closes. Background tokens are never
/// bucketed: the background owns its own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PollingEnvironment {
	/// Toolbar popup.
	Popup,
	/// Confirmation/notification window.
	Notification,
	/// Full-screen tab.
	FullScreen,
	/// Background process.
	Background,
}

impl PollingEnvironment {
	/// Environments whose tokens are tracked by a ledger.
	pub const TRACKED: [PollingEnvironment; 3] = [PollingEnvironment::Popup, PollingEnvironment::Notification, PollingEnvironment::FullScreen];

	/// Returns true if tokens from this environment are recorded.
	pub fn is_tracked(self) -> bool {
		!matches!(self, PollingEnvironment::Background)
	}

	/// Name of the bucket holding this environment's tokens.
	pub fn bucket_name(self) -> &'static str {
		match self {
			PollingEnvironment::Popup => "popupPollTokens",
			PollingEnvironment::Notification => "notificationPollTokens",
			PollingEnvironment::FullScreen => "fullScreenPollTokens",
			PollingEnvironment::Background => "backgroundPollTokens",
		}
	}
}

impl fmt::Display for PollingEnvironment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PollingEnvironment::Popup => write!(f, "popup"),
			PollingEnvironment::Notification => write!(f, "notification"),
			PollingEnvironment::FullScreen => write!(f, "fullScreen"),
			PollingEnvironment::Background => write!(f, "background"),
		}
	}
}

/// Per-instance binder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinderConfig {
	/// Name of the binder in logs and reports.
	#[serde(default = "default_label")]
	pub label: String,

	/// Ledger bucket for tokens obtained through this binder, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub environment: Option<PollingEnvironment>,
}

fn default_label() -> String {
	DEFAULT_BINDER_LABEL.to_string()
}

impl Default for BinderConfig {
	fn default() -> Self {
		Self {
			label: default_label(),
			environment: None,
		}
	}
}

impl BinderConfig {
	/// Creates a default configuration.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the label.
	pub fn label(mut self, label: impl Into<String>) -> Self {
		self.label = label.into();
		self
	}

	/// Sets the ledger environment.
	pub fn environment(mut self, environment: PollingEnvironment) -> Self {
		self.environment = Some(environment);
		self
	}
}
