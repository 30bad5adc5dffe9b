mod command_registry;
mod command_parser;

pub use command_parser::{parse_command, ShellCommand};
pub use command_registry::SHELL_HELP_COMMANDS;
