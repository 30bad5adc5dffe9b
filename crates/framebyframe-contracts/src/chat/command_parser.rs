use super::command_registry::{
    CommandSpec, ShellAction, NO_ARG_COMMANDS, PATH_COMMANDS, RAW_ARG_COMMANDS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Noop,
    Capture { path: String },
    UseClient { name: String },
    Status,
    Story,
    Reset,
    Clients,
    Help,
    Quit,
    Unknown { command: String, arg: String },
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<ShellAction> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    let parts = match shell_words::split(arg) {
        Ok(parts) => parts,
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    };
    parts
        .into_iter()
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses one line of the interactive session shell.
///
/// Bare text is treated as a path to capture, so a dragged-in file name works
/// without the `/capture` prefix. That includes unquoted absolute paths such
/// as `/tmp/frame.png`.
pub fn parse_command(text: &str) -> ShellCommand {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ShellCommand::Noop;
    }

    let Some(slash_tail) = trimmed.strip_prefix('/') else {
        return ShellCommand::Capture {
            path: parse_path_arg(trimmed),
        };
    };

    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    let rest = &slash_tail[command_len..];
    // Command words end at whitespace; anything else is an absolute path.
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return ShellCommand::Capture {
            path: parse_path_arg(trimmed),
        };
    }
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = rest.trim();

    if let Some(ShellAction::Capture) = find_action(&command, PATH_COMMANDS) {
        return ShellCommand::Capture {
            path: parse_path_arg(arg),
        };
    }

    if let Some(ShellAction::UseClient) = find_action(&command, RAW_ARG_COMMANDS) {
        return ShellCommand::UseClient {
            name: arg.to_string(),
        };
    }

    match find_action(&command, NO_ARG_COMMANDS) {
        Some(ShellAction::Status) => ShellCommand::Status,
        Some(ShellAction::Story) => ShellCommand::Story,
        Some(ShellAction::Reset) => ShellCommand::Reset,
        Some(ShellAction::Clients) => ShellCommand::Clients,
        Some(ShellAction::Help) => ShellCommand::Help,
        Some(ShellAction::Quit) => ShellCommand::Quit,
        _ => ShellCommand::Unknown {
            command,
            arg: arg.to_string(),
        },
    }
}
