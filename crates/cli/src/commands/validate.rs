use std::time::Instant;

use crate::cli::ScenarioArgs;
use crate::error::Result;
use crate::output::{CommandInputs, OutputFormat, ResultBuilder, ValidateData, print_result};
use crate::replay::{check, load_scenario};

pub fn execute(args: &ScenarioArgs, format: OutputFormat) -> Result<()> {
	let start = Instant::now();
	let scenario = load_scenario(&args.scenario)?;
	check(&scenario)?;

	let data = ValidateData {
		label: scenario.binder.label.clone(),
		mode: scenario.mode,
		steps: scenario.steps.len(),
		step_counts: scenario.step_counts().into_iter().map(|(kind, count)| (kind.to_string(), count)).collect(),
	};
	let result = ResultBuilder::new("validate")
		.started_at(start)
		.inputs(CommandInputs {
			scenario: Some(args.scenario.clone()),
		})
		.data(data)
		.build();
	print_result(&result, format);
	Ok(())
}
