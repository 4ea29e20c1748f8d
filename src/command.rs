// Line-oriented console commands
//
// The headless binary reads one command per line from stdin. Row, filter,
// context and suggestion numbers are the zero-based positions printed by
// `show`.
//
//   search <text>          edit the search term (debounced; empty clears)
//   filter <key>=<value>   add a filter, clears the term
//   unfilter <n>           remove filter n
//   page <n> / size <n>    paging
//   live / paged           switch mode
//   select <row>           toggle row selection
//   pin                    add selected rows to context
//   ctx <row>              add one row to context
//   unpin <n> / clear      edit context
//   promote <row> <key>    filter on a row's metadata field
//   suggest <n>            apply suggested filter n
//   open / close           chat socket
//   ask <question>         send a chat question
//   show [what]            print state
//   quit

use crate::model::{Filter, PageSize};
use std::fmt;

/// What `show` prints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowTarget {
    Status,
    Rows,
    Filters,
    Suggestions,
    Context,
    Chat,
    Diagnostics,
    Help,
}

impl ShowTarget {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "status" => Some(Self::Status),
            "rows" | "results" => Some(Self::Rows),
            "filters" => Some(Self::Filters),
            "suggestions" => Some(Self::Suggestions),
            "context" | "ctx" => Some(Self::Context),
            "chat" => Some(Self::Chat),
            "diag" | "diagnostics" => Some(Self::Diagnostics),
            "help" => Some(Self::Help),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetTerm(String),
    AddFilter(Filter),
    RemoveFilter(usize),
    SetPage(u32),
    SetPageSize(PageSize),
    SetLive(bool),
    ToggleSelection(usize),
    AddSelectionToContext,
    AddRowToContext(usize),
    RemoveFromContext(usize),
    ClearContext,
    Promote { row: usize, key: String },
    ApplySuggestion(usize),
    OpenChat,
    CloseChat,
    Ask(String),
    Show(ShowTarget),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    MissingArgument { command: &'static str, argument: &'static str },
    InvalidNumber(String),
    InvalidFilter(String),
    InvalidPageSize(String),
    InvalidShowTarget(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty command"),
            Self::Unknown(cmd) => write!(f, "Unknown command '{}' (try 'show help')", cmd),
            Self::MissingArgument { command, argument } => {
                write!(f, "'{}' needs a {}", command, argument)
            }
            Self::InvalidNumber(s) => write!(f, "Not a valid number: '{}'", s),
            Self::InvalidFilter(s) => write!(f, "Filters look like key=value, got '{}'", s),
            Self::InvalidPageSize(s) => write!(
                f,
                "Page size must be one of 10, 50, 100, 500 (got '{}')",
                s
            ),
            Self::InvalidShowTarget(s) => write!(f, "Nothing called '{}' to show", s),
        }
    }
}

impl std::error::Error for CommandError {}

impl Command {
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb {
            // Term keeps its inner whitespace
            "search" => Ok(Command::SetTerm(rest.to_string())),
            "filter" => parse_filter(rest).map(Command::AddFilter),
            "unfilter" => index(rest, "unfilter", "filter number").map(Command::RemoveFilter),
            "page" => number::<u32>(rest, "page", "page number").map(Command::SetPage),
            "size" => {
                let raw = required(rest, "size", "page size")?;
                PageSize::parse(raw)
                    .map(Command::SetPageSize)
                    .ok_or_else(|| CommandError::InvalidPageSize(raw.to_string()))
            }
            "live" => Ok(Command::SetLive(true)),
            "paged" => Ok(Command::SetLive(false)),
            "select" => index(rest, "select", "row number").map(Command::ToggleSelection),
            "pin" => Ok(Command::AddSelectionToContext),
            "ctx" => index(rest, "ctx", "row number").map(Command::AddRowToContext),
            "unpin" => index(rest, "unpin", "context number").map(Command::RemoveFromContext),
            "clear" => Ok(Command::ClearContext),
            "promote" => {
                let (row, key) = match rest.split_once(char::is_whitespace) {
                    Some((row, key)) => (row, key.trim()),
                    None => (rest, ""),
                };
                let row = index(row, "promote", "row number")?;
                let key = required(key, "promote", "metadata key")?;
                Ok(Command::Promote {
                    row,
                    key: key.to_string(),
                })
            }
            "suggest" => index(rest, "suggest", "suggestion number").map(Command::ApplySuggestion),
            "open" => Ok(Command::OpenChat),
            "close" => Ok(Command::CloseChat),
            "ask" => Ok(Command::Ask(rest.to_string())),
            "show" => ShowTarget::parse(rest)
                .map(Command::Show)
                .ok_or_else(|| CommandError::InvalidShowTarget(rest.to_string())),
            "help" => Ok(Command::Show(ShowTarget::Help)),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn required<'a>(
    rest: &'a str,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, CommandError> {
    if rest.is_empty() {
        Err(CommandError::MissingArgument { command, argument })
    } else {
        Ok(rest)
    }
}

fn number<T: std::str::FromStr>(
    rest: &str,
    command: &'static str,
    argument: &'static str,
) -> Result<T, CommandError> {
    let raw = required(rest, command, argument)?;
    raw.parse()
        .map_err(|_| CommandError::InvalidNumber(raw.to_string()))
}

fn index(rest: &str, command: &'static str, argument: &'static str) -> Result<usize, CommandError> {
    number::<usize>(rest, command, argument)
}

fn parse_filter(rest: &str) -> Result<Filter, CommandError> {
    let raw = required(rest, "filter", "key=value pair")?;
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok(Filter::new(key.trim(), value.trim())),
        _ => Err(CommandError::InvalidFilter(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_keeps_inner_whitespace() {
        assert_eq!(
            Command::parse("search  disk   full "),
            Ok(Command::SetTerm("disk   full".into()))
        );
        // Bare `search` clears the term
        assert_eq!(Command::parse("search"), Ok(Command::SetTerm(String::new())));
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!(
            Command::parse("filter metadata.user_id=u-42"),
            Ok(Command::AddFilter(Filter::new("metadata.user_id", "u-42")))
        );
        // Value may itself contain '='
        assert_eq!(
            Command::parse("filter message=a=b"),
            Ok(Command::AddFilter(Filter::new("message", "a=b")))
        );
        assert!(matches!(
            Command::parse("filter level"),
            Err(CommandError::InvalidFilter(_))
        ));
        assert!(matches!(
            Command::parse("filter =x"),
            Err(CommandError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_numeric_arguments() {
        assert_eq!(Command::parse("page 3"), Ok(Command::SetPage(3)));
        assert_eq!(Command::parse("select 0"), Ok(Command::ToggleSelection(0)));
        assert_eq!(
            Command::parse("page"),
            Err(CommandError::MissingArgument {
                command: "page",
                argument: "page number"
            })
        );
        assert_eq!(
            Command::parse("unpin x"),
            Err(CommandError::InvalidNumber("x".into()))
        );
    }

    #[test]
    fn test_page_size_must_be_allowed_value() {
        assert_eq!(
            Command::parse("size 100"),
            Ok(Command::SetPageSize(PageSize::Hundred))
        );
        assert_eq!(
            Command::parse("size 20"),
            Err(CommandError::InvalidPageSize("20".into()))
        );
    }

    #[test]
    fn test_promote_needs_row_and_key() {
        assert_eq!(
            Command::parse("promote 2 trace_id"),
            Ok(Command::Promote {
                row: 2,
                key: "trace_id".into()
            })
        );
        assert!(matches!(
            Command::parse("promote 2"),
            Err(CommandError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_show_targets() {
        assert_eq!(Command::parse("show"), Ok(Command::Show(ShowTarget::Status)));
        assert_eq!(
            Command::parse("show diag"),
            Ok(Command::Show(ShowTarget::Diagnostics))
        );
        assert_eq!(Command::parse("help"), Ok(Command::Show(ShowTarget::Help)));
        assert!(matches!(
            Command::parse("show everything"),
            Err(CommandError::InvalidShowTarget(_))
        ));
    }

    #[test]
    fn test_empty_and_unknown() {
        assert_eq!(Command::parse("   "), Err(CommandError::Empty));
        assert_eq!(
            Command::parse("frobnicate now"),
            Err(CommandError::Unknown("frobnicate".into()))
        );
        assert_eq!(Command::parse("quit"), Ok(Command::Quit));
    }
}
