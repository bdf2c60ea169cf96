mod replay;
mod validate;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use crate::output::OutputFormat;

pub async fn dispatch(cli: Cli, format: OutputFormat) -> Result<()> {
	match cli.command {
		Commands::Replay(args) => replay::execute(&args, format).await,
		Commands::Validate(args) => validate::execute(&args, format),
	}
}
