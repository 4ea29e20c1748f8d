// Plain-text rendering for the headless console
//
// Everything here is a read-only view of `ConsoleState`; nothing mutates.
// Indices printed in brackets are the ones commands take.

use crate::chat::{ChatSession, ConnectionState, Sender};
use crate::command::ShowTarget;
use crate::logging::DiagnosticBuffer;
use crate::mode::Mode;
use crate::model::{LogRecord, CLICKABLE_METADATA_KEYS};
use crate::state::ConsoleState;
use std::io::{self, Write};

const HELP: &str = "\
commands:
  search <text>          edit the search term (empty clears)
  filter <key>=<value>   add a filter
  unfilter <n>           remove filter n
  page <n>               go to page n
  size <10|50|100|500>   change page size
  live | paged           switch mode
  select <row>           toggle row selection
  pin                    add selected rows to context
  ctx <row>              add one row to context
  unpin <n> | clear      edit context
  promote <row> <key>    filter on user_id, trace_id or source_ip of a row
  suggest <n>            apply suggested filter n
  open | close           connect or disconnect chat
  ask <question>         ask about the context logs
  show [status|rows|filters|suggestions|context|chat|diag|help]
  quit";

pub fn show<W: Write>(
    out: &mut W,
    target: ShowTarget,
    state: &ConsoleState,
    diagnostics: &DiagnosticBuffer,
) -> io::Result<()> {
    match target {
        ShowTarget::Status => status(out, state),
        ShowTarget::Rows => rows(out, state),
        ShowTarget::Filters => filters(out, state),
        ShowTarget::Suggestions => suggestions(out, state),
        ShowTarget::Context => context(out, state),
        ShowTarget::Chat => chat(out, state.chat()),
        ShowTarget::Diagnostics => diagnostics_list(out, diagnostics),
        ShowTarget::Help => writeln!(out, "{}", HELP),
    }
}

fn status<W: Write>(out: &mut W, state: &ConsoleState) -> io::Result<()> {
    let mode = state.mode();
    match mode {
        Mode::Paged => writeln!(
            out,
            "mode: {}  page {}/{}  ({} hits, {} per page)",
            mode.as_str(),
            state.page(),
            state.total_pages().max(1),
            state.total_hits(),
            state.page_size()
        )?,
        Mode::Live => writeln!(
            out,
            "mode: {}  {} rows  ({})",
            mode.as_str(),
            state.view().len(),
            if state.tail_connected() { "connected" } else { "disconnected" }
        )?,
    }

    if state.term_input() != state.term() {
        writeln!(out, "term: '{}' (pending '{}')", state.term(), state.term_input())?;
    } else {
        writeln!(out, "term: '{}'", state.term())?;
    }

    let filters: Vec<String> = state.filters().as_slice().iter().map(|f| f.to_string()).collect();
    writeln!(
        out,
        "filters: {}",
        if filters.is_empty() { "none".to_string() } else { filters.join(", ") }
    )?;
    writeln!(
        out,
        "selected: {}  context: {}",
        state.selection().len(),
        state.context().len()
    )?;

    let chat = state.chat();
    let connection = match chat.connection() {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
    };
    let stream = if chat.is_streaming() { "streaming" } else { "idle" };
    writeln!(out, "chat: {}, {}", connection, stream)
}

fn rows<W: Write>(out: &mut W, state: &ConsoleState) -> io::Result<()> {
    let view = state.view();
    if view.is_empty() {
        return writeln!(out, "(no rows)");
    }
    for (i, record) in view.rows().into_iter().enumerate() {
        let selected = if state.selection().contains(i) { '*' } else { ' ' };
        let pinned = if state.context().contains(record) { '+' } else { ' ' };
        writeln!(out, "[{}]{}{} {}{}", i, selected, pinned, record.summary(), clickable(record))?;
    }
    Ok(())
}

/// Promotable metadata fields, ` key=value` each
fn clickable(record: &LogRecord) -> String {
    let mut text = String::new();
    for key in CLICKABLE_METADATA_KEYS {
        if let Some(value) = record.metadata.get(key) {
            match value.as_str() {
                Some(s) => text.push_str(&format!("  {}={}", key, s)),
                None => text.push_str(&format!("  {}={}", key, value)),
            }
        }
    }
    text
}

fn filters<W: Write>(out: &mut W, state: &ConsoleState) -> io::Result<()> {
    let filters = state.filters().as_slice();
    if filters.is_empty() {
        return writeln!(out, "(no filters)");
    }
    for (i, filter) in filters.iter().enumerate() {
        writeln!(out, "[{}] {}", i, filter)?;
    }
    Ok(())
}

fn suggestions<W: Write>(out: &mut W, state: &ConsoleState) -> io::Result<()> {
    let suggested = state.suggestions().filters();
    if suggested.is_empty() {
        return writeln!(out, "(no suggestions)");
    }
    for (i, filter) in suggested.iter().enumerate() {
        writeln!(out, "[{}] {}", i, filter)?;
    }
    Ok(())
}

fn context<W: Write>(out: &mut W, state: &ConsoleState) -> io::Result<()> {
    let records = state.context().as_slice();
    if records.is_empty() {
        return writeln!(out, "(context is empty)");
    }
    for (i, record) in records.iter().enumerate() {
        writeln!(out, "[{}] {}", i, record.summary())?;
    }
    Ok(())
}

fn chat<W: Write>(out: &mut W, session: &ChatSession) -> io::Result<()> {
    if session.messages().is_empty() {
        return writeln!(out, "(no messages)");
    }
    let open = session.open_message().map(|m| m.id);
    for message in session.messages() {
        let who = match message.sender {
            Sender::User => "you",
            Sender::Assistant => "assistant",
        };
        let marker = if Some(message.id) == open { " ..." } else { "" };
        writeln!(
            out,
            "{} {}> {}{}",
            message.timestamp.format("%H:%M:%S"),
            who,
            message.content,
            marker
        )?;
    }
    Ok(())
}

/// Print the latest assistant message once its turn has ended
pub fn answer<W: Write>(out: &mut W, session: &ChatSession) -> io::Result<()> {
    let last = session
        .messages()
        .iter()
        .rev()
        .find(|m| m.sender == Sender::Assistant);
    match last {
        Some(message) if !message.content.is_empty() => {
            writeln!(out, "assistant> {}", message.content)
        }
        Some(_) => writeln!(out, "assistant> (no answer)"),
        None => Ok(()),
    }
}

fn diagnostics_list<W: Write>(out: &mut W, diagnostics: &DiagnosticBuffer) -> io::Result<()> {
    let entries = diagnostics.get_all();
    if entries.is_empty() {
        return writeln!(out, "(no warnings)");
    }
    for entry in entries {
        writeln!(
            out,
            "{} {:<5} {}: {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.level.as_str(),
            entry.target,
            entry.message
        )?;
    }
    Ok(())
}
