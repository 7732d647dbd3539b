//! Role table loading (spec.md §6): `<username> <role>` per line.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::RoleFileError;
use crate::protocol::Role;

/// Usernames must be a plain token: letters, digits, `_`, `-`, `.`. This
/// rejects whitespace and control characters early, the same way the
/// teacher's path-matching code pre-compiles a `Regex` once behind
/// `once_cell` rather than recompiling it per call.
static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap());

/// The parsed `roles.txt` contents.
#[derive(Debug, Default)]
pub struct RoleTable {
    users: HashMap<String, Role>,
}

impl RoleTable {
    pub fn lookup(&self, username: &str) -> Option<Role> {
        self.users.get(username).copied()
    }

    /// Loads and parses a role file. Blank lines and `#`-prefixed
    /// comments are skipped; anything else must be exactly
    /// `<username> <role>`.
    pub fn load(path: &Path) -> Result<Self, RoleFileError> {
        let file = std::fs::File::open(path)?;
        Self::parse(std::io::BufReader::new(file))
    }

    fn parse<R: std::io::Read>(reader: std::io::BufReader<R>) -> Result<Self, RoleFileError> {
        let mut users = HashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut parts = trimmed.split_whitespace();
            let username = parts.next().ok_or_else(|| RoleFileError::Malformed { line: idx + 1, text: line.clone() })?;
            let role_tok = parts.next().ok_or_else(|| RoleFileError::Malformed { line: idx + 1, text: line.clone() })?;
            if parts.next().is_some() {
                return Err(RoleFileError::Malformed { line: idx + 1, text: line.clone() });
            }
            if !USERNAME_RE.is_match(username) {
                return Err(RoleFileError::InvalidUsername { line: idx + 1, username: username.to_string() });
            }
            let role: Role = role_tok
                .parse()
                .map_err(|_| RoleFileError::InvalidRole { line: idx + 1, role: role_tok.to_string() })?;
            users.insert(username.to_string(), role);
        }
        Ok(RoleTable { users })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    fn table_from(text: &str) -> RoleTable {
        RoleTable::parse(BufReader::new(Cursor::new(text.to_string()))).unwrap()
    }

    #[test]
    fn parses_basic_entries() {
        let t = table_from("alice write\nbob read\n");
        assert_eq!(t.lookup("alice"), Some(Role::Write));
        assert_eq!(t.lookup("bob"), Some(Role::Read));
        assert_eq!(t.lookup("carol"), None);
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let t = table_from("# comment\n\nalice write\n");
        assert_eq!(t.lookup("alice"), Some(Role::Write));
    }

    #[test]
    fn rejects_unknown_role_token() {
        let err = RoleTable::parse(BufReader::new(Cursor::new("alice admin\n".to_string()))).unwrap_err();
        assert!(matches!(err, RoleFileError::InvalidRole { .. }));
    }

    #[test]
    fn rejects_malformed_line() {
        let err = RoleTable::parse(BufReader::new(Cursor::new("alice\n".to_string()))).unwrap_err();
        assert!(matches!(err, RoleFileError::Malformed { .. }));
    }

    #[test]
    fn rejects_username_with_invalid_characters() {
        let err = RoleTable::parse(BufReader::new(Cursor::new("al ice write\n".to_string())));
        // "al ice write" splits into three whitespace-separated tokens,
        // which is itself malformed before username validation runs.
        assert!(matches!(err.unwrap_err(), RoleFileError::Malformed { .. }));

        let err = RoleTable::parse(BufReader::new(Cursor::new("al/ice write\n".to_string()))).unwrap_err();
        assert!(matches!(err, RoleFileError::InvalidUsername { .. }));
    }
}
