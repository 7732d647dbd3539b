//! The document engine (component B): Markdown edit operations layered
//! over the chunk list, soft-delete, compaction, and the flattened
//! snapshot.
//!
//! Every mutating operation takes a `version` argument (per spec.md
//! §4.B) that is accepted but **not** validated against the accepting
//! slot here — see DESIGN.md's note on the retained `OUTDATED_VERSION`
//! gap. All successful mutations set `dirty`.

use crate::chunk::{ChunkArena, ChunkRole};
use crate::error::DocError;

/// The authoritative document: one chunk arena plus version bookkeeping
/// and a cached flattened snapshot.
pub struct Document {
    pub arena: ChunkArena,
    pub version: u64,
    pub dirty: bool,
    snapshot: Vec<u8>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document { arena: ChunkArena::new(), version: 0, dirty: false, snapshot: Vec::new() }
    }

    /// Returns a copy of the last committed snapshot (spec.md §4.B
    /// FLATTEN) — readers want version-stable reads, not in-flight
    /// mid-tick state.
    pub fn flatten(&self) -> Vec<u8> {
        self.snapshot.clone()
    }

    /// Rebuilds the chunk arena (dropping tombstoned/empty chunks) and
    /// the cached snapshot. Called by the scheduler once per tick, only
    /// when `dirty`. Idempotent: running it twice back to back is a
    /// no-op the second time.
    pub fn compact(&mut self) {
        self.arena.compact();
        self.snapshot = self.arena.flatten();
    }

    fn total_len(&self) -> usize {
        self.arena.total_len()
    }

    fn check_pos(&self, pos: usize) -> Result<usize, DocError> {
        let total = self.total_len();
        if pos > total {
            return Err(DocError::PositionOutOfRange { pos, len: total });
        }
        Ok(total)
    }

    /// Inserts a NEWLINE immediately before `pos` unless `pos` already
    /// begins a line (`pos == 0` or the preceding byte is `\n`).
    /// Returns the position the caller's marker should now be inserted
    /// at. Used by HEADING, BLOCKQUOTE, the list operations, and
    /// HORIZONTAL_RULE to guarantee block markers always start a line.
    fn ensure_line_start(&mut self, pos: usize) -> usize {
        let at_line_start = pos == 0 || self.arena.byte_at(pos - 1) == Some(b'\n');
        if at_line_start {
            pos
        } else {
            self.arena.insert_chunk_at(pos, b"\n".to_vec(), ChunkRole::Newline);
            pos + 1
        }
    }

    /// INSERT(pos, content) — spec.md §4.B. Always succeeds: an
    /// out-of-range position is simply treated as append-at-end.
    pub fn insert(&mut self, _version: u64, pos: usize, content: &[u8]) -> Result<(), DocError> {
        self.arena.insert_chunk_at(pos, content.to_vec(), ChunkRole::Normal);
        self.dirty = true;
        Ok(())
    }

    /// DELETE(pos, len) — spec.md §4.B. `len == 0` is a no-op; a span
    /// exceeding the document length is truncated to the end.
    pub fn delete(&mut self, _version: u64, pos: usize, len: usize) -> Result<(), DocError> {
        if len == 0 {
            return Ok(());
        }
        let total = self.check_pos(pos)?;
        let end = (pos + len).min(total);
        if end <= pos {
            return Ok(());
        }
        let start_id = self.arena.split_boundary(pos);
        let end_id = self.arena.split_boundary(end);
        self.arena.tombstone_range(start_id, end_id);
        self.dirty = true;
        Ok(())
    }

    /// NEWLINE(pos) — spec.md §4.B.
    pub fn newline(&mut self, _version: u64, pos: usize) -> Result<(), DocError> {
        self.check_pos(pos)?;
        if let Some((id, _local)) = self.arena.find_at(pos) {
            if self.arena.get(id).role != ChunkRole::Newline {
                self.arena.get_mut(id).role = ChunkRole::Normal;
            }
        }
        self.arena.insert_chunk_at(pos, b"\n".to_vec(), ChunkRole::Newline);
        self.maintain_list_order();
        self.dirty = true;
        Ok(())
    }

    /// HEADING(level, pos) — spec.md §4.B. `level` must be 1..=3.
    pub fn heading(&mut self, _version: u64, level: i64, pos: usize) -> Result<(), DocError> {
        if !(1..=3).contains(&level) {
            return Err(DocError::InvalidHeadingLevel(level));
        }
        self.check_pos(pos)?;
        let at = self.ensure_line_start(pos);
        let marker = format!("{} ", "#".repeat(level as usize));
        self.arena.insert_chunk_at(at, marker.into_bytes(), ChunkRole::Normal);
        self.dirty = true;
        Ok(())
    }

    fn wrap(&mut self, start: usize, end: usize, open: &str, close: &str) -> Result<(), DocError> {
        if start > end {
            return Err(DocError::InvalidRange { start, end });
        }
        self.check_pos(end)?;
        // Closing delimiter first so it doesn't shift `start`.
        self.arena.insert_chunk_at(end, close.as_bytes().to_vec(), ChunkRole::Normal);
        self.arena.insert_chunk_at(start, open.as_bytes().to_vec(), ChunkRole::Normal);
        self.dirty = true;
        Ok(())
    }

    /// BOLD(start, end) — spec.md §4.B.
    pub fn bold(&mut self, _version: u64, start: usize, end: usize) -> Result<(), DocError> {
        self.wrap(start, end, "**", "**")
    }

    /// ITALIC(start, end) — spec.md §4.B.
    pub fn italic(&mut self, _version: u64, start: usize, end: usize) -> Result<(), DocError> {
        self.wrap(start, end, "*", "*")
    }

    /// CODE(start, end) — spec.md §4.B.
    pub fn code(&mut self, _version: u64, start: usize, end: usize) -> Result<(), DocError> {
        self.wrap(start, end, "`", "`")
    }

    /// BLOCKQUOTE(pos) — spec.md §4.B.
    pub fn blockquote(&mut self, _version: u64, pos: usize) -> Result<(), DocError> {
        self.check_pos(pos)?;
        let at = self.ensure_line_start(pos);
        self.arena.insert_chunk_at(at, b"> ".to_vec(), ChunkRole::Normal);
        self.dirty = true;
        Ok(())
    }

    /// UNORDERED_LIST(pos) — spec.md §4.B. The target chunk must be
    /// `NORMAL`, otherwise `WrongChunkType`.
    pub fn unordered_list(&mut self, _version: u64, pos: usize) -> Result<(), DocError> {
        self.check_pos(pos)?;
        if let Some((id, _local)) = self.arena.find_at(pos) {
            if self.arena.get(id).role != ChunkRole::Normal {
                return Err(DocError::WrongChunkType { pos });
            }
        }
        let at = self.ensure_line_start(pos);
        self.arena.insert_chunk_at(at, b"- ".to_vec(), ChunkRole::UnorderedListItem);
        self.dirty = true;
        Ok(())
    }

    /// ORDERED_LIST(pos) — spec.md §4.B. The marker chunk is tagged
    /// `ORDERED_LIST_ITEM` and list renumbering runs afterward.
    pub fn ordered_list(&mut self, _version: u64, pos: usize) -> Result<(), DocError> {
        self.check_pos(pos)?;
        let at = self.ensure_line_start(pos);
        self.arena.insert_chunk_at(at, b"1. ".to_vec(), ChunkRole::OrderedListItem);
        self.maintain_list_order();
        self.dirty = true;
        Ok(())
    }

    /// HORIZONTAL_RULE(pos) — spec.md §4.B. Net effect: `"\n---\n"`
    /// occupies the position in the next snapshot.
    pub fn horizontal_rule(&mut self, _version: u64, pos: usize) -> Result<(), DocError> {
        self.check_pos(pos)?;
        let at = self.ensure_line_start(pos);
        self.arena.insert_chunk_at(at, b"---".to_vec(), ChunkRole::Normal);
        self.arena.insert_chunk_at(at + 3, b"\n".to_vec(), ChunkRole::Newline);
        self.dirty = true;
        Ok(())
    }

    /// LINK(start, end, url) — spec.md §4.B.
    pub fn link(&mut self, _version: u64, start: usize, end: usize, url: &str) -> Result<(), DocError> {
        if start > end {
            return Err(DocError::InvalidRange { start, end });
        }
        self.check_pos(end)?;
        let closing = format!("]({})", url);
        self.arena.insert_chunk_at(end, closing.into_bytes(), ChunkRole::Normal);
        self.arena.insert_chunk_at(start, b"[".to_vec(), ChunkRole::Normal);
        self.dirty = true;
        Ok(())
    }

    /// List renumbering (spec.md §4.B `maintain_list_order`): scans
    /// from the head, renumbering every ordered-list item that follows
    /// a NEWLINE. A run is broken by any non-list, non-newline content.
    fn maintain_list_order(&mut self) {
        let ids: Vec<_> = self.arena.iter_ids().collect();

        let mut counter: u8 = 1;
        if let Some(&first) = ids.iter().find(|&&id| !self.arena.get(id).is_empty()) {
            if self.arena.get(first).role == ChunkRole::OrderedListItem {
                counter = 2;
            }
        }

        for (i, &id) in ids.iter().enumerate() {
            if self.arena.get(id).role != ChunkRole::Newline {
                continue;
            }
            let next = ids[i + 1..].iter().copied().find(|&nid| !self.arena.get(nid).is_empty());
            match next {
                Some(next_id) if self.arena.get(next_id).role == ChunkRole::OrderedListItem => {
                    let chunk = self.arena.get_mut(next_id);
                    if !chunk.text.is_empty() {
                        chunk.text[0] = b'0' + counter;
                    }
                    counter += 1;
                }
                Some(_) => counter = 1,
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(doc: &Document) -> String {
        String::from_utf8(doc.arena.flatten()).unwrap()
    }

    #[test]
    fn insert_into_empty_document() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"Hello").unwrap();
        assert_eq!(text_of(&doc), "Hello");
        assert!(doc.dirty);
    }

    #[test]
    fn bold_wraps_range() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"Hello").unwrap();
        doc.bold(0, 0, 5).unwrap();
        assert_eq!(text_of(&doc), "**Hello**");
    }

    #[test]
    fn bold_rejects_start_after_end() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"Hello").unwrap();
        let err = doc.bold(0, 3, 1).unwrap_err();
        assert_eq!(err, DocError::InvalidRange { start: 3, end: 1 });
    }

    #[test]
    fn heading_rejects_bad_level() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"Hello").unwrap();
        assert!(doc.heading(0, 4, 0).is_err());
        assert!(doc.heading(0, 0, 0).is_err());
    }

    #[test]
    fn heading_always_begins_a_line() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"Hello").unwrap();
        // pos 3 is mid-line ("Hel|lo"): heading must force a newline first.
        doc.heading(0, 2, 3).unwrap();
        doc.compact();
        let snap = String::from_utf8(doc.flatten()).unwrap();
        assert!(snap.contains("\n## "));
    }

    #[test]
    fn delete_zero_length_is_noop() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"Hello").unwrap();
        doc.dirty = false;
        doc.delete(0, 1, 0).unwrap();
        assert!(!doc.dirty);
    }

    #[test]
    fn delete_truncates_to_document_end() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"Hello").unwrap();
        doc.delete(0, 2, 100).unwrap();
        doc.compact();
        assert_eq!(text_of(&doc), "He");
    }

    #[test]
    fn ordered_list_renumbers_after_interruption() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"a").unwrap();
        doc.newline(0, 1).unwrap();
        doc.insert(0, 2, b"b").unwrap();
        doc.newline(0, 3).unwrap();
        doc.insert(0, 4, b"c").unwrap();
        doc.compact();
        // "a\nb\nc"
        doc.ordered_list(0, 0).unwrap();
        doc.compact();
        let snap = text_of(&doc);
        let second_line_pos = snap.find('\n').unwrap() + 1;
        doc.ordered_list(0, second_line_pos).unwrap();
        doc.compact();
        let snap = text_of(&doc);
        let third_line_pos = snap.rfind('\n').unwrap() + 1;
        doc.ordered_list(0, third_line_pos).unwrap();
        doc.compact();
        let snap = text_of(&doc);
        assert_eq!(snap, "1. a\n2. b\n3. c");
    }

    #[test]
    fn unordered_list_rejects_non_normal_chunk() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"a").unwrap();
        doc.ordered_list(0, 0).unwrap();
        doc.compact();
        // the ordered-list marker chunk itself is not NORMAL
        let err = doc.unordered_list(0, 0).unwrap_err();
        assert!(matches!(err, DocError::WrongChunkType { .. }));
    }

    #[test]
    fn horizontal_rule_effect_is_newline_dashes_newline() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"a").unwrap();
        doc.horizontal_rule(0, 1).unwrap();
        doc.compact();
        assert_eq!(text_of(&doc), "a\n---\n");
    }

    #[test]
    fn link_wraps_text_with_url() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"click").unwrap();
        doc.link(0, 0, 5, "http://example.com").unwrap();
        doc.compact();
        assert_eq!(text_of(&doc), "[click](http://example.com)");
    }

    #[test]
    fn compact_is_idempotent_and_snapshot_matches_flatten() {
        let mut doc = Document::new();
        doc.insert(0, 0, b"Hello").unwrap();
        doc.delete(0, 0, 1).unwrap();
        doc.compact();
        let once = doc.flatten();
        doc.compact();
        let twice = doc.flatten();
        assert_eq!(once, twice);
        assert_eq!(once, doc.arena.flatten());
    }
}
