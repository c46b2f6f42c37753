#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Commands whose whole remainder is one free-text value.
pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "add",
    action: "add_manual",
}];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "upload",
    action: "upload",
}];

/// Commands taking a single entry id.
pub(crate) const ENTRY_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "edit",
        action: "begin_edit",
    },
    CommandSpec {
        command: "cancel",
        action: "cancel_edit",
    },
    CommandSpec {
        command: "delete",
        action: "delete",
    },
];

/// Commands taking an entry id followed by a value.
pub(crate) const ENTRY_VALUE_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "save",
        action: "save_edit",
    },
    CommandSpec {
        command: "register",
        action: "register",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "analyze",
        action: "analyze",
    },
    CommandSpec {
        command: "show",
        action: "show",
    },
    CommandSpec {
        command: "proceed",
        action: "proceed",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/upload <path>",
    "/analyze",
    "/add <food>",
    "/edit <id>",
    "/save <id> <food>",
    "/cancel <id>",
    "/delete <id>",
    "/register <id> <slot>",
    "/show",
    "/proceed",
    "/quit",
];
