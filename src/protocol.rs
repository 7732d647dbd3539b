//! Wire framing (component E) and command parsing/dispatch glue
//! between the session layer and the document engine.
//!
//! Parsing lives here rather than in `session` so it can be unit
//! tested without any socket or thread machinery, matching the
//! teacher's habit of keeping parsing pure and testable in isolation
//! from I/O.

use std::fmt;
use std::str::FromStr;

use crate::document::Document;
use crate::error::DocError;

/// A client's permission level, looked up from the role table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Read,
    Write,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Read => "read",
            Role::Write => "write",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Role::Read),
            "write" => Ok(Role::Write),
            other => Err(format!("role must be 'read' or 'write', got {other:?}")),
        }
    }
}

/// A parsed command line, ready for dispatch to the document engine.
/// `DocQuery`/`PermQuery` are the out-of-band queries of spec.md §4.C —
/// they never reach the document and are answered directly by the
/// session that received them.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCommand {
    Insert { pos: usize, content: String },
    Del { pos: usize, len: usize },
    Newline { pos: usize },
    Heading { level: i64, pos: usize },
    Bold { start: usize, end: usize },
    Italic { start: usize, end: usize },
    Code { start: usize, end: usize },
    Blockquote { pos: usize },
    OrderedList { pos: usize },
    UnorderedList { pos: usize },
    HorizontalRule { pos: usize },
    Link { start: usize, end: usize, url: String },
    DocQuery,
    PermQuery,
}

impl ParsedCommand {
    /// The canonical opcode token, used both for re-broadcast and for
    /// the `<OP>` slot of an `UNAUTHORISED` reply.
    pub fn opcode_name(&self) -> &'static str {
        use ParsedCommand::*;
        match self {
            Insert { .. } => "INSERT",
            Del { .. } => "DEL",
            Newline { .. } => "NEWLINE",
            Heading { .. } => "HEADING",
            Bold { .. } => "BOLD",
            Italic { .. } => "ITALIC",
            Code { .. } => "CODE",
            Blockquote { .. } => "BLOCKQUOTE",
            OrderedList { .. } => "ORDERED_LIST",
            UnorderedList { .. } => "UNORDERED_LIST",
            HorizontalRule { .. } => "HORIZONTAL_RULE",
            Link { .. } => "LINK",
            DocQuery => "DOC?",
            PermQuery => "PERM?",
        }
    }

    /// Mutating opcodes require `role == "write"` (spec.md §4.C);
    /// `DOC?`/`PERM?` are out-of-band queries anyone may issue.
    pub fn requires_write(&self) -> bool {
        !matches!(self, ParsedCommand::DocQuery | ParsedCommand::PermQuery)
    }
}

fn parse_usize(tok: Option<&str>) -> Result<usize, DocError> {
    tok.and_then(|s| s.parse::<i64>().ok())
        .filter(|v| *v >= 0)
        .map(|v| v as usize)
        .ok_or_else(|| DocError::Parse(format!("expected a non-negative integer, got {:?}", tok)))
}

fn parse_i64(tok: Option<&str>) -> Result<i64, DocError> {
    tok.and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| DocError::Parse(format!("expected an integer, got {:?}", tok)))
}

/// Parses one newline-stripped command line (spec.md §6 "Command wire
/// format"). Positions and lengths are decimal integers; `INSERT`
/// content and `LINK` urls are free-form tails.
pub fn parse_command(line: &str) -> Result<ParsedCommand, DocError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut head = line.splitn(2, ' ');
    let op = head.next().unwrap_or("");
    let rest = head.next().unwrap_or("");

    match op {
        "INSERT" => {
            let mut it = rest.splitn(2, ' ');
            let pos = parse_usize(it.next())?;
            let content = it.next().unwrap_or("").to_string();
            Ok(ParsedCommand::Insert { pos, content })
        }
        "DEL" => {
            let mut it = rest.split_whitespace();
            let pos = parse_usize(it.next())?;
            let len = parse_usize(it.next())?;
            Ok(ParsedCommand::Del { pos, len })
        }
        "NEWLINE" => Ok(ParsedCommand::Newline { pos: parse_usize(rest.split_whitespace().next())? }),
        "HEADING" => {
            let mut it = rest.split_whitespace();
            let level = parse_i64(it.next())?;
            let pos = parse_usize(it.next())?;
            Ok(ParsedCommand::Heading { level, pos })
        }
        "BOLD" => {
            let mut it = rest.split_whitespace();
            let start = parse_usize(it.next())?;
            let end = parse_usize(it.next())?;
            Ok(ParsedCommand::Bold { start, end })
        }
        "ITALIC" => {
            let mut it = rest.split_whitespace();
            let start = parse_usize(it.next())?;
            let end = parse_usize(it.next())?;
            Ok(ParsedCommand::Italic { start, end })
        }
        "CODE" => {
            let mut it = rest.split_whitespace();
            let start = parse_usize(it.next())?;
            let end = parse_usize(it.next())?;
            Ok(ParsedCommand::Code { start, end })
        }
        "BLOCKQUOTE" => Ok(ParsedCommand::Blockquote { pos: parse_usize(rest.split_whitespace().next())? }),
        "ORDERED_LIST" => Ok(ParsedCommand::OrderedList { pos: parse_usize(rest.split_whitespace().next())? }),
        "UNORDERED_LIST" => Ok(ParsedCommand::UnorderedList { pos: parse_usize(rest.split_whitespace().next())? }),
        "HORIZONTAL_RULE" => Ok(ParsedCommand::HorizontalRule { pos: parse_usize(rest.split_whitespace().next())? }),
        "LINK" => {
            let mut it = rest.splitn(3, ' ');
            let start = parse_usize(it.next())?;
            let end = parse_usize(it.next())?;
            let url = it.next().unwrap_or("").to_string();
            Ok(ParsedCommand::Link { start, end, url })
        }
        "DOC?" => Ok(ParsedCommand::DocQuery),
        "PERM?" => Ok(ParsedCommand::PermQuery),
        other => Err(DocError::Parse(format!("unrecognized opcode {other:?}"))),
    }
}

/// Applies a parsed command to the document. `DocQuery`/`PermQuery`
/// never reach here — see the session layer, which answers them
/// directly.
pub fn dispatch(doc: &mut Document, version: u64, cmd: &ParsedCommand) -> Result<(), DocError> {
    use ParsedCommand::*;
    match cmd {
        Insert { pos, content } => doc.insert(version, *pos, content.as_bytes()),
        Del { pos, len } => doc.delete(version, *pos, *len),
        Newline { pos } => doc.newline(version, *pos),
        Heading { level, pos } => doc.heading(version, *level, *pos),
        Bold { start, end } => doc.bold(version, *start, *end),
        Italic { start, end } => doc.italic(version, *start, *end),
        Code { start, end } => doc.code(version, *start, *end),
        Blockquote { pos } => doc.blockquote(version, *pos),
        OrderedList { pos } => doc.ordered_list(version, *pos),
        UnorderedList { pos } => doc.unordered_list(version, *pos),
        HorizontalRule { pos } => doc.horizontal_rule(version, *pos),
        Link { start, end, url } => doc.link(version, *start, *end, url),
        DocQuery | PermQuery => Ok(()),
    }
}

/// Per-command result codes (spec.md §4.C).
#[derive(Debug, Clone, PartialEq)]
pub enum ResultCode {
    Success,
    InvalidPosition,
    /// Reserved: position refers to a tombstoned region. The spec
    /// retains the code though most bad positions surface as
    /// `InvalidPosition` (see DESIGN.md).
    DeletedPosition,
    /// Reserved: see DESIGN.md's note on the retained version-skew gap.
    OutdatedVersion,
    Unauthorised { op: &'static str, required: &'static str, actual: &'static str },
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => write!(f, "SUCCESS"),
            ResultCode::InvalidPosition => write!(f, "INVALID_POSITION"),
            ResultCode::DeletedPosition => write!(f, "DELETED_POSITION"),
            ResultCode::OutdatedVersion => write!(f, "OUTDATED_VERSION"),
            ResultCode::Unauthorised { op, required, actual } => {
                write!(f, "UNAUTHORISED {op} {required} {actual}")
            }
        }
    }
}

impl From<&DocError> for ResultCode {
    fn from(err: &DocError) -> Self {
        match err {
            DocError::PositionOutOfRange { .. }
            | DocError::InvalidHeadingLevel(_)
            | DocError::InvalidRange { .. }
            | DocError::WrongChunkType { .. }
            | DocError::Parse(_) => ResultCode::InvalidPosition,
        }
    }
}

/// One applied edit, recorded for the per-tick broadcast.
#[derive(Debug, Clone)]
pub struct AppliedEdit {
    pub username: String,
    pub raw_text: String,
}

/// Builds the per-tick broadcast frame (spec.md §4.C):
/// ```text
/// VERSION <new_version>
/// EDIT <username> <OPCODE> <args...>
/// ...
/// END
/// ```
/// Only commands that succeeded are ever passed in `edits`.
pub fn format_broadcast(version: u64, edits: &[AppliedEdit]) -> String {
    let mut out = format!("VERSION {version}\n");
    for edit in edits {
        out.push_str(&format!("EDIT {} {}\n", edit.username, edit.raw_text));
    }
    out.push_str("END\n");
    out
}

/// What a completed command record replies with. `Result` covers every
/// mutating opcode (`SUCCESS`/`INVALID_POSITION`/`UNAUTHORISED`/...);
/// `Snapshot` and `PermRole` are the out-of-band `DOC?`/`PERM?` queries.
#[derive(Debug, Clone)]
pub enum Reply {
    Result(ResultCode),
    Snapshot(Vec<u8>),
    PermRole(Role),
}

impl Reply {
    /// Serializes the reply for the sender's outbound channel. The
    /// snapshot reply reuses the handshake's length-prefix convention
    /// (spec.md §4.D) so the client can frame it the same way.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        match self {
            Reply::Result(code) => format!("{code}\n").into_bytes(),
            Reply::Snapshot(bytes) => {
                let mut out = format!("{}\n", bytes.len()).into_bytes();
                out.extend_from_slice(bytes);
                out.push(b'\n');
                out
            }
            Reply::PermRole(role) => format!("{role}\n").into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Result(ResultCode::Success))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert_with_spaces_in_content() {
        let cmd = parse_command("INSERT 0 Hello World").unwrap();
        assert_eq!(cmd, ParsedCommand::Insert { pos: 0, content: "Hello World".to_string() });
    }

    #[test]
    fn parses_bold_range() {
        let cmd = parse_command("BOLD 0 5").unwrap();
        assert_eq!(cmd, ParsedCommand::Bold { start: 0, end: 5 });
    }

    #[test]
    fn rejects_negative_position() {
        assert!(parse_command("INSERT -1 x").is_err());
    }

    #[test]
    fn rejects_unknown_opcode() {
        assert!(parse_command("FROBNICATE 0").is_err());
    }

    #[test]
    fn doc_query_and_perm_query_take_no_args() {
        assert_eq!(parse_command("DOC?").unwrap(), ParsedCommand::DocQuery);
        assert_eq!(parse_command("PERM?").unwrap(), ParsedCommand::PermQuery);
        assert!(!ParsedCommand::DocQuery.requires_write());
        assert!(ParsedCommand::Insert { pos: 0, content: String::new() }.requires_write());
    }

    #[test]
    fn broadcast_frame_matches_scenario_one() {
        let edits = vec![AppliedEdit { username: "alice".to_string(), raw_text: "INSERT 0 Hello".to_string() }];
        assert_eq!(format_broadcast(1, &edits), "VERSION 1\nEDIT alice INSERT 0 Hello\nEND\n");
    }
}
