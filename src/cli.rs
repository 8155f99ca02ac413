//! Command-line parsing.

use std::path::PathBuf;

use crate::dataset::ContactFilter;

pub const USAGE: &str = "\
Usage: roster-mail [OPTIONS] <COMMAND>

Commands:
  init [--write-contacts]        Print the proxy client list for every contact
  send <template> [FILTERS]      Preview, confirm and send one message per contact
  render <template> [FILTERS]    Print the rendered template for each contact
  usage [--stats <PATH>]         Convert proxy traffic stats JSON (stdin by default) to CSV

Filters:
  --filter-email <EMAIL>         Only contacts with this email (repeatable)
  --filter-tag <TAG>             Only contacts with this tag (repeatable)

Options:
  --config <PATH>                Configuration file [default: config.json]
  --contacts <PATH>              Contact CSV [default: contacts.csv]
  --templates <DIR>              Template root [default: templates]
  --data <DIR>                   Auxiliary CSV directory [default: data]
  -h, --help                     Print this help
";

/// Invalid command line.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("missing command")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("{command} requires a template")]
    MissingTemplate { command: String },
}

/// Input locations shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config: PathBuf,
    pub contacts: PathBuf,
    pub templates: PathBuf,
    pub data: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            config: PathBuf::from("config.json"),
            contacts: PathBuf::from("contacts.csv"),
            templates: PathBuf::from("templates"),
            data: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init { write_contacts: bool },
    Send { template: String, filter: ContactFilter },
    Render { template: String, filter: ContactFilter },
    Usage { stats: Option<PathBuf> },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub paths: Paths,
    pub command: Command,
}

impl Cli {
    /// Parse arguments, excluding the program name.
    pub fn parse<I, S>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let mut paths = Paths::default();
        let mut command: Option<String> = None;
        let mut positional: Vec<String> = Vec::new();
        let mut filter = ContactFilter::default();
        let mut write_contacts = false;
        let mut stats: Option<PathBuf> = None;

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| args.next().ok_or_else(|| UsageError::MissingValue(flag.into()));
            match arg.as_str() {
                "-h" | "--help" => {
                    return Ok(Self {
                        paths,
                        command: Command::Help,
                    });
                }
                "--config" => paths.config = value(&arg)?.into(),
                "--contacts" => paths.contacts = value(&arg)?.into(),
                "--templates" => paths.templates = value(&arg)?.into(),
                "--data" => paths.data = value(&arg)?.into(),
                "--filter-email" => filter.emails.push(value(&arg)?),
                "--filter-tag" => filter.tags.push(value(&arg)?),
                "--write-contacts" => write_contacts = true,
                "--stats" => stats = Some(value(&arg)?.into()),
                _ if arg.starts_with('-') => {
                    return Err(UsageError::UnexpectedArgument(arg));
                }
                _ if command.is_none() => command = Some(arg),
                _ => positional.push(arg),
            }
        }

        let command = command.ok_or(UsageError::MissingCommand)?;
        let mut positional = positional.into_iter();
        let filtered = !filter.emails.is_empty() || !filter.tags.is_empty();
        let command = match command.as_str() {
            "init" => {
                if filtered {
                    return Err(UsageError::UnexpectedArgument("--filter-*".into()));
                }
                if stats.is_some() {
                    return Err(UsageError::UnexpectedArgument("--stats".into()));
                }
                Command::Init { write_contacts }
            }
            "send" | "render" => {
                if write_contacts {
                    return Err(UsageError::UnexpectedArgument("--write-contacts".into()));
                }
                if stats.is_some() {
                    return Err(UsageError::UnexpectedArgument("--stats".into()));
                }
                let template = positional.next().ok_or_else(|| UsageError::MissingTemplate {
                    command: command.clone(),
                })?;
                if command == "send" {
                    Command::Send { template, filter }
                } else {
                    Command::Render { template, filter }
                }
            }
            "usage" => {
                if filtered {
                    return Err(UsageError::UnexpectedArgument("--filter-*".into()));
                }
                if write_contacts {
                    return Err(UsageError::UnexpectedArgument("--write-contacts".into()));
                }
                Command::Usage { stats }
            }
            _ => return Err(UsageError::UnknownCommand(command)),
        };
        if let Some(extra) = positional.next() {
            return Err(UsageError::UnexpectedArgument(extra));
        }

        Ok(Self { paths, command })
    }
}
