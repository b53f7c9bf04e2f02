//! Slash commands read from stdin.

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub label: &'static str,
    pub description: &'static str,
}

const COMMAND_SPECS: &[CommandSpec] = &[
    CommandSpec {
        label: "new",
        description: "Start a new thread",
    },
    CommandSpec {
        label: "threads",
        description: "List threads",
    },
    CommandSpec {
        label: "switch <id>",
        description: "Switch to a thread",
    },
    CommandSpec {
        label: "delete <id>",
        description: "Delete a thread",
    },
    CommandSpec {
        label: "memories",
        description: "Leave the chat for the memories view",
    },
    CommandSpec {
        label: "home",
        description: "Leave the chat for the home view",
    },
    CommandSpec {
        label: "stop",
        description: "Stop the active response",
    },
    CommandSpec {
        label: "q, quit",
        description: "Stop and exit",
    },
];

#[must_use]
pub fn help_text() -> String {
    let mut out = String::from("Commands:\n");
    for spec in COMMAND_SPECS {
        out.push_str(&format!("  /{:<14} {}\n", spec.label, spec.description));
    }
    out.push_str("Anything else is sent as a message.");
    out
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    New,
    Threads,
    Switch(Option<&'a str>),
    Delete(Option<&'a str>),
    Memories,
    Home,
    Stop,
    Quit,
    Help,
    Unknown(&'a str),
    /// Not a command: send as a chat message.
    Message(&'a str),
    Empty,
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        let Some(raw) = trimmed.strip_prefix('/') else {
            return if trimmed.is_empty() {
                Command::Empty
            } else {
                Command::Message(trimmed)
            };
        };

        let parts: Vec<&str> = raw.split_whitespace().collect();
        match parts.first().copied() {
            Some("new") => Command::New,
            Some("threads" | "ls") => Command::Threads,
            Some("switch") => Command::Switch(parts.get(1).copied()),
            Some("delete" | "rm") => Command::Delete(parts.get(1).copied()),
            Some("memories") => Command::Memories,
            Some("home") => Command::Home,
            Some("stop" | "cancel") => Command::Stop,
            Some("q" | "quit") => Command::Quit,
            Some("help") => Command::Help,
            Some(cmd) => Command::Unknown(cmd),
            None => Command::Empty,
        }
    }
}
