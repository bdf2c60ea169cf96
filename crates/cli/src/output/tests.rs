use serde_json::json;

use super::*;

#[test]
fn result_builder_success() {
	let result: CommandResult<serde_json::Value> = ResultBuilder::new("replay")
		.inputs(CommandInputs {
			scenario: Some(PathBuf::from("s.json")),
		})
		.data(json!({ "steps": [] }))
		.build();

	assert!(result.ok);
	assert_eq!(result.command, "replay");
	assert_eq!(result.schema_version, Some(SCHEMA_VERSION));
	assert!(result.error.is_none());
	assert!(result.timings.is_some());
}

#[test]
fn result_builder_error() {
	let result: CommandResult<serde_json::Value> = ResultBuilder::new("validate")
		.command_error(CommandError {
			code: ErrorCode::InvalidInput,
			message: "bad step".into(),
			details: None,
		})
		.build();

	assert!(!result.ok);
	assert!(result.data.is_none());
	assert_eq!(result.error.as_ref().unwrap().code, ErrorCode::InvalidInput);
}

#[test]
fn error_without_data_is_not_ok_even_with_diagnostics() {
	let result: CommandResult<()> = ResultBuilder::new("replay").diagnostic(DiagnosticLevel::Info, "note").build();

	assert!(!result.ok);
	assert_eq!(result.diagnostics.len(), 1);
}

#[test]
fn error_code_display_matches_serde() {
	for code in [ErrorCode::IoError, ErrorCode::InvalidInput, ErrorCode::BinderError] {
		let serialized = serde_json::to_value(code).unwrap();
		assert_eq!(serialized, json!(code.to_string()));
	}
}

#[test]
fn envelope_omits_empty_fields() {
	let result: CommandResult<u32> = ResultBuilder::new("replay").data(7).build();
	let mut value = serde_json::to_value(&result).unwrap();
	let timings = value.as_object_mut().unwrap().remove("timings").unwrap();
	assert!(timings["durationMs"].is_u64());

	assert_eq!(
		value,
		json!({
			"schemaVersion": 1,
			"ok": true,
			"command": "replay",
			"data": 7
		})
	);
}

#[test]
fn output_format_parses_case_insensitively() {
	use clap::ValueEnum;

	assert_eq!(OutputFormat::from_str("JSON", true).unwrap(), OutputFormat::Json);
	assert_eq!(OutputFormat::from_str("ndjson", true).unwrap(), OutputFormat::Ndjson);
	assert!(OutputFormat::from_str("toon", true).is_err());
}
