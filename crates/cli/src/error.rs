use std::path::PathBuf;

use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("failed to read scenario {}: {source}", path.display())]
	ScenarioRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid scenario {}: {source}", path.display())]
	ScenarioParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("step {index} ({step}): {reason}")]
	InvalidStep { index: usize, step: &'static str, reason: String },

	#[error("invalid service settings: {0}")]
	ServiceSettings(#[source] pollbind::Error),

	#[error(transparent)]
	Binder(#[from] pollbind::Error),
}

impl CliError {
	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let code = match self {
			CliError::ScenarioRead { .. } => ErrorCode::IoError,
			CliError::ScenarioParse { .. } | CliError::InvalidStep { .. } | CliError::ServiceSettings(_) => ErrorCode::InvalidInput,
			CliError::Binder(_) => ErrorCode::BinderError,
		};
		let details = match self {
			CliError::InvalidStep { index, step, .. } => Some(serde_json::json!({ "index": index, "step": step })),
			CliError::ScenarioParse { source, .. } => Some(serde_json::json!({ "line": source.line(), "column": source.column() })),
			_ => None,
		};
		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_step_maps_to_invalid_input_with_details() {
		let err = CliError::InvalidStep {
			index: 2,
			step: "sync",
			reason: "single mode needs a `key`".into(),
		};
		let cmd = err.to_command_error();

		assert_eq!(cmd.code, ErrorCode::InvalidInput);
		assert_eq!(cmd.message, "step 2 (sync): single mode needs a `key`");
		assert_eq!(cmd.details, Some(serde_json::json!({ "index": 2, "step": "sync" })));
	}

	#[test]
	fn parse_error_reports_position() {
		let source = serde_json::from_str::<serde_json::Value>("{\n  \"steps\": [").unwrap_err();
		let err = CliError::ScenarioParse {
			path: PathBuf::from("s.json"),
			source,
		};
		let cmd = err.to_command_error();

		assert_eq!(cmd.code, ErrorCode::InvalidInput);
		assert!(cmd.message.starts_with("invalid scenario s.json"));
		assert_eq!(cmd.details.unwrap()["line"], 2);
	}

	#[test]
	fn missing_file_maps_to_io_error() {
		let err = CliError::ScenarioRead {
			path: PathBuf::from("missing.json"),
			source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
		};
		assert_eq!(err.to_command_error().code, ErrorCode::IoError);
	}
}
