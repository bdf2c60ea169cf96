
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;
use crate::styles::cli_styles;

/// Replays binder scenarios against an in-memory session service.
#[derive(Parser, Debug)]
#[command(name = "pollbind")]
#[command(about = "Replay session binder scenarios and report every start/stop")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: json (default), ndjson, or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run a scenario and report the resulting service calls.
	Replay(ScenarioArgs),
	/// Parse a scenario and check its steps without running it.
	Validate(ScenarioArgs),
}

impl Commands {
	/// Name used in the output envelope.
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Replay(_) => "replay",
			Commands::Validate(_) => "validate",
		}
	}
}

#[derive(Args, Debug, Clone)]
pub struct ScenarioArgs {
	/// Path to a scenario JSON file.
	#[arg(value_name = "SCENARIO")]
	pub scenario: PathBuf,
}
