//! Error types for session binders and session services.

use std::fmt;

use thiserror::Error;

/// Result type alias for binder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to the owner of a binder.
///
/// Failures of the session service itself never show up here: a rejected
/// `start` or `stop` is recovered inside the binder and only counted in its
/// statistics.
#[derive(Debug, Error)]
pub enum Error {
	/// A key could not be canonicalized.
	#[error("failed to canonicalize session key {key}: {source}")]
	KeySerialization {
		/// Debug rendering of the offending key.
		key: String,
		#[source]
		source: serde_json::Error,
	},

	/// The binder was already torn down.
	#[error("binder '{label}' was torn down; create a new binder instead")]
	TornDown { label: String },
}

impl Error {
	/// Returns true if this error came from key canonicalization.
	pub fn is_key_error(&self) -> bool {
		matches!(self, Error::KeySerialization { .. })
	}
}

/// Error reported by a session service for a rejected `start` or `stop`.
#[derive(Debug)]
pub struct ServiceError {
	message: String,
	source: Option<Box<dyn std::error::Error + 'static>>,
}

impl ServiceError {
	/// Creates an error from a message.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			source: None,
		}
	}

	/// Creates an error wrapping an underlying cause.
	pub fn with_source(message: impl Into<String>, source: impl std::error::Error + 'static) -> Self {
		Self {
			message: message.into(),
			source: Some(Box::new(source)),
		}
	}

	/// Returns the message without the source chain.
	pub fn message(&self) -> &str {
		&self.message
	}
}

impl fmt::Display for ServiceError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.source {
			Some(source) => write!(f, "{}: {}", self.message, source),
			None => f.write_str(&self.message),
		}
	}
}

impl std::error::Error for ServiceError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.source.as_deref()
	}
}

impl From<String> for ServiceError {
	fn from(message: String) -> Self {
		Self::new(message)
	}
}

impl From<&str> for ServiceError {
	fn from(message: &str) -> Self {
		Self::new(message)
	}
}
