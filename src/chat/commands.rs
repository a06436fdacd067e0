//! Meta-command parsing for the chat application.
//!
//! Meta-commands start with `.` and are handled locally, never sent to the
//! model. Matching is exact after trimming: no arguments, no abbreviations,
//! no case folding.

/// A parsed meta-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCommand {
    /// Display help information.
    Help,

    /// Clear the conversation transcript.
    Clear,

    /// Print the transcript.
    History,

    /// Print the active configuration.
    Config,

    /// Exit the chat application.
    Exit,
}

impl MetaCommand {
    /// Every command, in the order the help text lists them.
    pub const ALL: [MetaCommand; 5] = [
        MetaCommand::Help,
        MetaCommand::Clear,
        MetaCommand::History,
        MetaCommand::Config,
        MetaCommand::Exit,
    ];

    /// The text typed at the prompt to invoke the command.
    pub fn name(self) -> &'static str {
        match self {
            MetaCommand::Help => ".help",
            MetaCommand::Clear => ".clear",
            MetaCommand::History => ".history",
            MetaCommand::Config => ".config",
            MetaCommand::Exit => ".exit",
        }
    }

    fn description(self) -> &'static str {
        match self {
            MetaCommand::Help => "Show this help",
            MetaCommand::Clear => "Clear messages stack",
            MetaCommand::History => "Show messages stack",
            MetaCommand::Config => "Show config",
            MetaCommand::Exit => "Exit",
        }
    }
}

/// Parses user input for meta-commands.
///
/// Returns `Some(MetaCommand)` if the trimmed input is exactly a command name,
/// or `None` if it should be treated as a chat turn.
///
/// # Examples
///
/// ```
/// # use ai_repl::chat::{MetaCommand, parse_command};
/// assert_eq!(parse_command(".exit"), Some(MetaCommand::Exit));
/// assert_eq!(parse_command(".exit now"), None);
/// assert_eq!(parse_command("Hello!"), None);
/// ```
pub fn parse_command(input: &str) -> Option<MetaCommand> {
    let input = input.trim();
    MetaCommand::ALL
        .into_iter()
        .find(|command| command.name() == input)
}

/// Returns help text describing available commands.
pub fn help_text() -> String {
    MetaCommand::ALL
        .iter()
        .map(|command| format!(" {:<10}# {}", command.name(), command.description()))
        .collect::<Vec<_>>()
        .join("\n")
}
