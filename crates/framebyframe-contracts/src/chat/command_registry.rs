#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ShellAction {
    Capture,
    UseClient,
    Status,
    Story,
    Reset,
    Clients,
    Help,
    Quit,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: ShellAction,
}

pub(crate) const PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "capture",
        action: ShellAction::Capture,
    },
    CommandSpec {
        command: "shutter",
        action: ShellAction::Capture,
    },
];

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "client",
    action: ShellAction::UseClient,
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "status",
        action: ShellAction::Status,
    },
    CommandSpec {
        command: "story",
        action: ShellAction::Story,
    },
    CommandSpec {
        command: "reset",
        action: ShellAction::Reset,
    },
    CommandSpec {
        command: "clients",
        action: ShellAction::Clients,
    },
    CommandSpec {
        command: "help",
        action: ShellAction::Help,
    },
    CommandSpec {
        command: "quit",
        action: ShellAction::Quit,
    },
    CommandSpec {
        command: "exit",
        action: ShellAction::Quit,
    },
];

pub const SHELL_HELP_COMMANDS: &[&str] = &[
    "/capture <path>",
    "/status",
    "/story",
    "/reset",
    "/client <name>",
    "/clients",
    "/help",
    "/quit",
];
