//! Help output styling.

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;

/// Returns clap Styles matching cargo's help colors: green bold headers and
/// usage, cyan literals and placeholders.
pub fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.valid(AnsiColor::Cyan.on_default())
}
