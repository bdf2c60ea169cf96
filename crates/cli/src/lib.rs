pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod replay;
pub mod styles;
