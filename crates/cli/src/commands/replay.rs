use std::time::Instant;

use pollbind_protocol::Step;

use crate::cli::ScenarioArgs;
use crate::error::Result;
use crate::output::{CommandInputs, DiagnosticLevel, OutputFormat, ResultBuilder, print_result};
use crate::replay::{load_scenario, replay};

pub async fn execute(args: &ScenarioArgs, format: OutputFormat) -> Result<()> {
	let start = Instant::now();
	let scenario = load_scenario(&args.scenario)?;
	let report = replay(&scenario).await?;

	let mut builder = ResultBuilder::new("replay").started_at(start).inputs(CommandInputs {
		scenario: Some(args.scenario.clone()),
	});
	if !scenario.steps.iter().any(|step| matches!(step, Step::Teardown {})) {
		builder = builder.diagnostic(DiagnosticLevel::Info, "no teardown step; binder was shut down after the last step");
	}
	if report.stats.start_failures > 0 {
		builder = builder.diagnostic(DiagnosticLevel::Info, format!("{} start call(s) rejected", report.stats.start_failures));
	}
	if report.stats.stop_failures > 0 {
		builder = builder.diagnostic(DiagnosticLevel::Warning, format!("{} stop call(s) rejected", report.stats.stop_failures));
	}
	if !report.subscribed_keys.is_empty() || !report.ledger.is_empty() {
		builder = builder.diagnostic(DiagnosticLevel::Error, "sessions still open after shutdown");
	}

	print_result(&builder.data(report).build(), format);
	Ok(())
}
