use clap::Parser;
use pollbind_cli::cli::Cli;
use pollbind_cli::error::CliError;
use pollbind_cli::output::{self, OutputFormat, ResultBuilder};
use pollbind_cli::{commands, logging};
use tokio::task::LocalSet;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = cli.command.name();

	// Binders spawn their continuations with `spawn_local`.
	let result = LocalSet::new().run_until(commands::dispatch(cli, format)).await;
	if let Err(err) = result {
		handle_error(err, command, format);
		std::process::exit(1);
	}
}

fn handle_error(err: CliError, command: &str, format: OutputFormat) {
	let cmd_error = err.to_command_error();

	// Always print to stderr for humans
	output::print_error_stderr(&cmd_error);

	// Also emit the envelope on stdout with ok=false
	if format != OutputFormat::Text {
		let result: output::CommandResult<()> = ResultBuilder::new(command).command_error(cmd_error).build();
		output::print_result(&result, format);
	}
}
