//! Shell commands typed at the desktop prompt.

use anyhow::{anyhow, bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    List,
    Add,
    Edit { row: usize, text: String },
    Commit { row: usize },
    Check { row: usize, checked: bool },
    Reset,
    Reload,
    Help,
    Quit,
}

pub const HELP: &str = "commands: list | add | edit <row> <text> | commit <row> | check <row> | uncheck <row> | reset | reload | quit";

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim_start()),
            None => (line, ""),
        };
        let command = match verb {
            "list" | "ls" => Self::List,
            "add" => Self::Add,
            "edit" => {
                let (row, text) = match rest.split_once(char::is_whitespace) {
                    Some((row, text)) => (row, text),
                    None => (rest, ""),
                };
                Self::Edit {
                    row: parse_row(row)?,
                    text: text.to_string(),
                }
            }
            "commit" => Self::Commit {
                row: parse_row(rest)?,
            },
            "check" => Self::Check {
                row: parse_row(rest)?,
                checked: true,
            },
            "uncheck" => Self::Check {
                row: parse_row(rest)?,
                checked: false,
            },
            "reset" => Self::Reset,
            "reload" => Self::Reload,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            "" => bail!("empty command"),
            other => bail!("unknown command `{other}`"),
        };
        Ok(command)
    }
}

fn parse_row(raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .map_err(|_| anyhow!("expected a row number, got `{}`", raw.trim()))
}
