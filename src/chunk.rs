//! The chunk list (component A): a mutable ordered sequence of text runs.
//!
//! Per the design notes in SPEC_FULL.md §3a, chunks live in an arena
//! (`Vec<Chunk>`) indexed by a stable [`ChunkId`] rather than behind raw
//! `next` pointers. The singly linked order required by the
//! specification is still exactly represented: each chunk's `next`
//! field is a [`ChunkId`], and [`ChunkArena::head`] is the first one.

/// Stable index of a chunk within its [`ChunkArena`].
///
/// Valid only for the arena that produced it; arena compaction
/// invalidates all previously issued ids (the scheduler never holds a
/// `ChunkId` across a tick boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(pub usize);

/// What role a chunk plays in the document's logical structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRole {
    Normal,
    Newline,
    OrderedListItem,
    UnorderedListItem,
}

/// A contiguous text run.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: Vec<u8>,
    pub role: ChunkRole,
    pub tombstone: bool,
    pub next: Option<ChunkId>,
}

impl Chunk {
    fn new(text: Vec<u8>, role: ChunkRole) -> Self {
        Chunk { text, role, tombstone: false, next: None }
    }

    /// Byte length of this chunk. Kept as an accessor rather than a
    /// stored field so it can never desync from `text`.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// The chunk list itself: an arena plus a head pointer.
#[derive(Debug, Default)]
pub struct ChunkArena {
    slots: Vec<Chunk>,
    pub head: Option<ChunkId>,
}

impl ChunkArena {
    pub fn new() -> Self {
        ChunkArena { slots: Vec::new(), head: None }
    }

    pub fn get(&self, id: ChunkId) -> &Chunk {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: ChunkId) -> &mut Chunk {
        &mut self.slots[id.0]
    }

    fn alloc(&mut self, chunk: Chunk) -> ChunkId {
        self.slots.push(chunk);
        ChunkId(self.slots.len() - 1)
    }

    /// Total byte length of the document as currently threaded,
    /// *including* tombstoned chunks (see SPEC_FULL.md §3a / §9: mid-tick
    /// positions must stay stable even after a same-tick delete, so
    /// position arithmetic counts every linked chunk until compaction).
    pub fn total_len(&self) -> usize {
        let mut total = 0;
        let mut cur = self.head;
        while let Some(id) = cur {
            let c = self.get(id);
            total += c.len();
            cur = c.next;
        }
        total
    }

    /// Finds the chunk containing byte `offset`, per spec.md §4.A:
    /// the first chunk where `running_sum + length > offset`.
    ///
    /// Returns `None` when `offset == total_len()` (end of document).
    pub fn find_at(&self, offset: usize) -> Option<(ChunkId, usize)> {
        let mut running = 0usize;
        let mut cur = self.head;
        while let Some(id) = cur {
            let c = self.get(id);
            let len = c.len();
            if running + len > offset {
                return Some((id, offset - running));
            }
            running += len;
            cur = c.next;
        }
        None
    }

    /// Ensures a chunk boundary exists at `local_pos` bytes into chunk
    /// `id`, splitting it if necessary. Returns the id of the chunk that
    /// now starts exactly at that boundary, or `None` if the boundary
    /// is the true end of the document (no chunk follows).
    ///
    /// `local_pos == 0`: boundary already exists before `id`; returns
    /// `Some(id)` unchanged. `local_pos == len`: boundary already
    /// exists after `id`; returns `id`'s successor (or `None`).
    /// Otherwise the chunk is split in place: the left half keeps `id`,
    /// truncated to `[0..local_pos)`, a new right chunk holds
    /// `[local_pos..len)` and inherits `role` (if `Newline`, else
    /// `Normal`) and `tombstone`, and is spliced in as `id`'s immediate
    /// successor.
    pub fn split(&mut self, id: ChunkId, local_pos: usize) -> Option<ChunkId> {
        let len = self.get(id).len();
        if local_pos == 0 {
            return Some(id);
        }
        if local_pos == len {
            return self.get(id).next;
        }
        debug_assert!(local_pos < len);

        let (left_text, right_text) = {
            let c = self.get(id);
            (c.text[..local_pos].to_vec(), c.text[local_pos..].to_vec())
        };

        let (right_role, tombstone, old_next) = {
            let c = self.get(id);
            let right_role = if c.role == ChunkRole::Newline { ChunkRole::Newline } else { ChunkRole::Normal };
            (right_role, c.tombstone, c.next)
        };

        let right_id = self.alloc(Chunk { text: right_text, role: right_role, tombstone, next: old_next });

        let left = self.get_mut(id);
        left.text = left_text;
        if left.is_empty() {
            left.role = ChunkRole::Normal;
        }
        left.next = Some(right_id);

        Some(right_id)
    }

    /// Splices a brand new chunk holding `text`/`role` so that it
    /// begins exactly at `offset`. Handles the empty-document and
    /// past-end cases directly; otherwise delegates to `split`.
    pub fn insert_chunk_at(&mut self, offset: usize, text: Vec<u8>, role: ChunkRole) -> ChunkId {
        let new_id = self.alloc(Chunk::new(text, role));

        if self.head.is_none() {
            self.head = Some(new_id);
            return new_id;
        }

        match self.find_at(offset) {
            None => {
                // past-end: append as tail
                let mut cur = self.head.unwrap();
                loop {
                    let next = self.get(cur).next;
                    match next {
                        Some(n) => cur = n,
                        None => break,
                    }
                }
                self.get_mut(cur).next = Some(new_id);
            }
            Some((at_id, local)) => {
                let right = self.split(at_id, local);
                self.link_before(at_id, local, new_id, right);
            }
        }
        new_id
    }

    /// Links `new_id` into the list so it sits exactly at the boundary
    /// described by `(at_id, local)`/`right` as produced by `split`.
    fn link_before(&mut self, at_id: ChunkId, local: usize, new_id: ChunkId, right: Option<ChunkId>) {
        if local == 0 {
            // new_id goes immediately before at_id.
            if self.head == Some(at_id) {
                self.get_mut(new_id).next = Some(at_id);
                self.head = Some(new_id);
            } else {
                let prev = self.find_predecessor(at_id).expect("at_id must be reachable from head");
                self.get_mut(prev).next = Some(new_id);
                self.get_mut(new_id).next = Some(at_id);
            }
        } else {
            // split already truncated at_id and linked it to `right`.
            self.get_mut(new_id).next = right;
            self.get_mut(at_id).next = Some(new_id);
        }
    }

    fn find_predecessor(&self, id: ChunkId) -> Option<ChunkId> {
        let mut cur = self.head?;
        if cur == id {
            return None;
        }
        loop {
            let next = self.get(cur).next;
            if next == Some(id) {
                return Some(cur);
            }
            cur = next?;
        }
    }

    /// Byte at an absolute offset, counting tombstoned chunks (same
    /// position space as `find_at`/`total_len`).
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        let (id, local) = self.find_at(offset)?;
        Some(self.get(id).text[local])
    }

    /// Ensures a chunk boundary exists at `pos` and returns the id of
    /// the chunk starting there, or `None` if `pos` is the true end of
    /// the document. Thin wrapper combining `find_at` + `split` for
    /// callers (like DELETE) that need both ends of a range split.
    pub fn split_boundary(&mut self, pos: usize) -> Option<ChunkId> {
        match self.find_at(pos) {
            Some((id, local)) => self.split(id, local),
            None => None,
        }
    }

    /// Marks every chunk from `start` (inclusive) up to but not
    /// including `end` as tombstoned, per spec.md §4.B DELETE. Both
    /// boundaries must already be chunk-aligned (callers split first).
    pub fn tombstone_range(&mut self, start: Option<ChunkId>, end: Option<ChunkId>) {
        let mut cur = start;
        while cur != end {
            let id = match cur {
                Some(id) => id,
                None => break,
            };
            self.get_mut(id).tombstone = true;
            cur = self.get(id).next;
        }
    }

    /// Iterates chunk ids in list order.
    pub fn iter_ids(&self) -> impl Iterator<Item = ChunkId> + '_ {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.get(id).next;
            Some(id)
        })
    }

    /// Compaction (spec.md §4.B COMPACT): drops tombstoned and
    /// zero-length chunks, rebuilding the arena so ids are dense again.
    /// Idempotent — running it twice in a row is a no-op the second
    /// time, since no chunk is tombstoned or empty after the first.
    pub fn compact(&mut self) {
        let mut kept: Vec<Chunk> = Vec::with_capacity(self.slots.len());
        let mut cur = self.head;
        while let Some(id) = cur {
            let c = self.get(id);
            let next = c.next;
            if !c.tombstone && !c.is_empty() {
                kept.push(Chunk { text: c.text.clone(), role: c.role, tombstone: false, next: None });
            }
            cur = next;
        }
        for i in 0..kept.len() {
            kept[i].next = if i + 1 < kept.len() { Some(ChunkId(i + 1)) } else { None };
        }
        self.head = if kept.is_empty() { None } else { Some(ChunkId(0)) };
        self.slots = kept;
    }

    /// Flattens the list into one owned byte buffer, walking live
    /// (non-tombstoned, non-empty) chunks in order.
    pub fn flatten(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        let mut cur = self.head;
        while let Some(id) = cur {
            let c = self.get(id);
            if !c.tombstone && !c.is_empty() {
                out.extend_from_slice(&c.text);
            }
            cur = c.next;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with(text: &str) -> ChunkArena {
        let mut a = ChunkArena::new();
        a.insert_chunk_at(0, text.as_bytes().to_vec(), ChunkRole::Normal);
        a
    }

    #[test]
    fn find_at_locates_offset_within_single_chunk() {
        let a = arena_with("hello");
        let (id, local) = a.find_at(2).unwrap();
        assert_eq!(local, 2);
        assert_eq!(a.get(id).text, b"hello");
    }

    #[test]
    fn find_at_end_of_document_is_none() {
        let a = arena_with("hello");
        assert!(a.find_at(5).is_none());
    }

    #[test]
    fn split_at_zero_returns_same_chunk() {
        let mut a = arena_with("hello");
        let head = a.head.unwrap();
        assert_eq!(a.split(head, 0), Some(head));
    }

    #[test]
    fn split_at_length_returns_successor() {
        let mut a = arena_with("hello");
        let head = a.head.unwrap();
        assert_eq!(a.split(head, 5), None);
    }

    #[test]
    fn split_in_middle_produces_two_chunks() {
        let mut a = arena_with("hello");
        let head = a.head.unwrap();
        let right = a.split(head, 2).unwrap();
        assert_eq!(a.get(head).text, b"he");
        assert_eq!(a.get(right).text, b"llo");
        assert_eq!(a.flatten(), b"hello");
    }

    #[test]
    fn insert_into_empty_document_becomes_head() {
        let a = arena_with("abc");
        assert_eq!(a.flatten(), b"abc");
    }

    #[test]
    fn insert_past_end_appends() {
        let mut a = arena_with("abc");
        a.insert_chunk_at(3, b"def".to_vec(), ChunkRole::Normal);
        assert_eq!(a.flatten(), b"abcdef");
    }

    #[test]
    fn insert_at_start_prepends() {
        let mut a = arena_with("bc");
        a.insert_chunk_at(0, b"a".to_vec(), ChunkRole::Normal);
        assert_eq!(a.flatten(), b"abc");
    }

    #[test]
    fn insert_in_middle_splices() {
        let mut a = arena_with("ac");
        a.insert_chunk_at(1, b"b".to_vec(), ChunkRole::Normal);
        assert_eq!(a.flatten(), b"abc");
    }

    #[test]
    fn compaction_drops_tombstoned_and_empty_chunks() {
        let mut a = arena_with("abc");
        let head = a.head.unwrap();
        a.get_mut(head).tombstone = true;
        a.insert_chunk_at(3, b"def".to_vec(), ChunkRole::Normal);
        a.compact();
        assert_eq!(a.flatten(), b"def");
    }

    #[test]
    fn compaction_is_idempotent() {
        let mut a = arena_with("abc");
        a.compact();
        let before = a.flatten();
        a.compact();
        assert_eq!(a.flatten(), before);
    }

    #[test]
    fn tombstone_range_marks_interior_chunks() {
        let mut a = arena_with("abc");
        let head = a.head.unwrap();
        let right = a.split(head, 1).unwrap();
        a.tombstone_range(Some(right), None);
        assert!(a.get(right).tombstone);
        a.compact();
        assert_eq!(a.flatten(), b"a");
    }
}
