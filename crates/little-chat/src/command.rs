use std::path::PathBuf;

use little_chat_core::ArchiveId;
use thiserror::Error;

/// One line of user input, interpreted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// A message for the assistant.
    Message(String),
    /// `/new`: archive the chat and start over.
    NewSession,
    /// `/clear`: forget the chat without archiving it.
    Clear,
    /// `/history`: list archived chat logs.
    History,
    /// `/switch <id>`: reopen an archived chat log.
    Switch(ArchiveId),
    /// `/export [dir]`: write the chat log to a text file.
    Export(Option<PathBuf>),
    /// `/register <user> <password>`
    Register {
        /// Requested account name.
        username: String,
        /// Password in plain text, hashed before storage.
        password: String,
    },
    /// `/login <user> <password>`
    Login {
        /// Account name.
        username: String,
        /// Password in plain text.
        password: String,
    },
    /// `/help`
    Help,
    /// `/quit`
    Quit,
}

/// Malformed slash commands.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The command name is not known.
    #[error("unknown command /{0}, type /help for a list")]
    Unknown(String),
    /// A required argument is missing.
    #[error("usage: {usage}")]
    MissingArgument {
        /// Usage line of the command.
        usage: &'static str,
    },
    /// The chat log id is not a number.
    #[error("invalid chat log id '{0}'")]
    InvalidArchiveId(String),
}

/// Usage lines of all commands, for `/help`.
pub const HELP: &str = "\
/new                       archive this chat and start a new one
/clear                     clear this chat without archiving it
/history                   list archived chats
/switch <id>               reopen an archived chat
/export [dir]              save this chat as a text file
/register <user> <pass>    create an account
/login <user> <pass>       log in and load your chats
/help                      show this help
/quit                      leave";

/// Parses one input line.
///
/// Lines that do not start with `/` are messages and are kept as typed,
/// apart from the line terminator.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Ok(Command::Message(line.to_owned()));
    };

    let mut args = rest.split_whitespace();
    let name = args.next().unwrap_or_default();
    let command = match name {
        "new" => Command::NewSession,
        "clear" => Command::Clear,
        "history" => Command::History,
        "switch" => {
            let id = args.next().ok_or(CommandError::MissingArgument {
                usage: "/switch <id>",
            })?;
            let id = id
                .parse()
                .map_err(|_| CommandError::InvalidArchiveId(id.to_owned()))?;
            Command::Switch(id)
        }
        "export" => Command::Export(args.next().map(PathBuf::from)),
        "register" | "login" => {
            let (Some(username), Some(password)) = (args.next(), args.next())
            else {
                return Err(CommandError::MissingArgument {
                    usage: if name == "login" {
                        "/login <user> <pass>"
                    } else {
                        "/register <user> <pass>"
                    },
                });
            };
            let username = username.to_owned();
            let password = password.to_owned();
            if name == "login" {
                Command::Login { username, password }
            } else {
                Command::Register { username, password }
            }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return Err(CommandError::Unknown(name.to_owned())),
    };
    Ok(command)
}
