//! The tick-based version scheduler (component C).
//!
//! A single `version_lock` mutex covers the version chain, the current
//! command queue, and every document mutation — per SPEC_FULL.md §9,
//! this is deliberate: the workload is low throughput and a single
//! mutex is simpler than finer-grained locking. The scheduler also
//! owns the [`crate::session::SessionRegistry`] (`clients_lock`) and
//! acquires it nested inside `version_lock` while broadcasting, which
//! is the only place the two locks are ever held together and always
//! in this order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;
use log::{debug, info, warn};

use crate::document::Document;
use crate::protocol::{dispatch, format_broadcast, parse_command, AppliedEdit, ParsedCommand, Reply, ResultCode, Role};
use crate::session::SessionRegistry;

/// One submitted command line plus enough context to dispatch it and
/// reply to its sender (spec.md §3 "Command record").
pub struct CommandRecord {
    pub text: String,
    pub sender_username: String,
    pub sender_role: Role,
    reply_tx: Sender<Vec<u8>>,
    done: AtomicBool,
}

impl CommandRecord {
    pub fn new(text: String, sender_username: String, sender_role: Role, reply_tx: Sender<Vec<u8>>) -> Arc<Self> {
        Arc::new(CommandRecord { text, sender_username, sender_role, reply_tx, done: AtomicBool::new(false) })
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn complete(&self, reply: &Reply) {
        let _ = self.reply_tx.try_send(reply.to_wire_bytes());
        self.done.store(true, Ordering::SeqCst);
    }
}

/// The per-version accepting queue (spec.md §3 "Version slot"). Only
/// `current` is retained — per §9, retention of older slots beyond
/// current+previous is optional and nothing in this implementation
/// reads further back.
struct VersionSlot {
    num: u64,
    commands: Vec<Arc<CommandRecord>>,
}

impl VersionSlot {
    fn new(num: u64) -> Self {
        VersionSlot { num, commands: Vec::new() }
    }
}

struct SchedulerState {
    document: Document,
    current: VersionSlot,
}

/// Owns the document, the version chain, and the session registry.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    pub registry: SessionRegistry,
}

impl Scheduler {
    pub fn new() -> Arc<Self> {
        let document = Document::new();
        let current = VersionSlot::new(document.version + 1);
        Arc::new(Scheduler {
            state: Mutex::new(SchedulerState { document, current }),
            registry: SessionRegistry::new(),
        })
    }

    /// Appends a command to the currently accepting version slot.
    /// Commands observed before tick T land in version T; those
    /// observed after land in T+1 (spec.md §5).
    pub fn submit(&self, record: Arc<CommandRecord>) {
        let mut state = self.state.lock().unwrap();
        state.current.commands.push(record);
    }

    pub fn current_version(&self) -> u64 {
        self.state.lock().unwrap().document.version
    }

    pub fn current_snapshot(&self) -> Vec<u8> {
        self.state.lock().unwrap().document.flatten()
    }

    /// Drains the current queue, dispatches every command, compacts
    /// and commits if the document was modified, and broadcasts the
    /// result to every live session — all under `version_lock`, so a
    /// broadcast for version T is fully delivered before version T+1
    /// can ever be observed being built.
    pub fn tick(&self) {
        let mut state = self.state.lock().unwrap();

        let commands = std::mem::take(&mut state.current.commands);
        let target_version = state.current.num;
        let mut applied = Vec::new();

        for record in &commands {
            let reply = Self::dispatch_one(&mut state.document, target_version, record);
            if reply.is_success() {
                applied.push(AppliedEdit { username: record.sender_username.clone(), raw_text: record.text.clone() });
            }
            debug!(target: "mdcollab::scheduler", "{} -> {:?}", record.text, reply);
            record.complete(&reply);
        }

        let broadcast = if state.document.dirty {
            state.document.compact();
            state.document.version += 1;
            state.document.dirty = false;
            state.current = VersionSlot::new(state.document.version + 1);
            info!(
                target: "mdcollab::scheduler",
                "committed version {} ({} edit(s))",
                state.document.version,
                applied.len()
            );
            Some(format_broadcast(state.document.version, &applied))
        } else {
            None
        };

        // Reclaim disconnected sessions and broadcast while still
        // holding version_lock (spec.md §5 ordering guarantee).
        self.registry.reap_and_broadcast(broadcast.as_deref());
    }

    fn dispatch_one(doc: &mut Document, version: u64, record: &CommandRecord) -> Reply {
        let parsed = match parse_command(&record.text) {
            Ok(p) => p,
            Err(err) => {
                warn!(target: "mdcollab::scheduler", "parse failure from {}: {err}", record.sender_username);
                return Reply::Result(ResultCode::InvalidPosition);
            }
        };

        if parsed.requires_write() && record.sender_role != Role::Write {
            return Reply::Result(ResultCode::Unauthorised {
                op: parsed.opcode_name(),
                required: "write",
                actual: record.sender_role.as_str(),
            });
        }

        match &parsed {
            ParsedCommand::DocQuery => Reply::Snapshot(doc.flatten()),
            ParsedCommand::PermQuery => Reply::PermRole(record.sender_role),
            _ => match dispatch(doc, version, &parsed) {
                Ok(()) => Reply::Result(ResultCode::Success),
                Err(err) => Reply::Result(ResultCode::from(&err)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn submit_and_wait(scheduler: &Scheduler, text: &str, username: &str, role: Role) -> Vec<u8> {
        let (tx, rx) = unbounded();
        let record = CommandRecord::new(text.to_string(), username.to_string(), role, tx);
        scheduler.submit(record);
        scheduler.tick();
        rx.try_recv().expect("reply should have been sent")
    }

    #[test]
    fn scenario_one_insert_commits_and_broadcasts() {
        let scheduler = Scheduler::new();
        let reply = submit_and_wait(&scheduler, "INSERT 0 Hello", "alice", Role::Write);
        assert_eq!(reply, b"SUCCESS\n");
        assert_eq!(scheduler.current_version(), 1);
        assert_eq!(scheduler.current_snapshot(), b"Hello");
    }

    #[test]
    fn read_only_client_cannot_mutate() {
        let scheduler = Scheduler::new();
        let reply = submit_and_wait(&scheduler, "INSERT 0 x", "bob", Role::Read);
        assert_eq!(reply, b"UNAUTHORISED INSERT write read\n");
        assert_eq!(scheduler.current_version(), 0);
    }

    #[test]
    fn arrival_order_within_a_tick_is_preserved() {
        let scheduler = Scheduler::new();
        let (tx_a, rx_a) = unbounded();
        let (tx_b, rx_b) = unbounded();
        scheduler.submit(CommandRecord::new("INSERT 0 A".to_string(), "alice".to_string(), Role::Write, tx_a));
        scheduler.submit(CommandRecord::new("INSERT 0 B".to_string(), "bob".to_string(), Role::Write, tx_b));
        scheduler.tick();
        assert_eq!(rx_a.try_recv().unwrap(), b"SUCCESS\n");
        assert_eq!(rx_b.try_recv().unwrap(), b"SUCCESS\n");
        assert_eq!(scheduler.current_snapshot(), b"BA");
    }

    #[test]
    fn doc_query_returns_length_prefixed_snapshot() {
        let scheduler = Scheduler::new();
        submit_and_wait(&scheduler, "INSERT 0 Hi", "alice", Role::Write);
        let reply = submit_and_wait(&scheduler, "DOC?", "alice", Role::Write);
        assert_eq!(reply, b"2\nHi\n");
    }

    #[test]
    fn perm_query_returns_sender_role() {
        let scheduler = Scheduler::new();
        let reply = submit_and_wait(&scheduler, "PERM?", "bob", Role::Read);
        assert_eq!(reply, b"read\n");
    }

    #[test]
    fn tick_with_no_commands_does_not_advance_version() {
        let scheduler = Scheduler::new();
        scheduler.tick();
        assert_eq!(scheduler.current_version(), 0);
    }

    #[test]
    fn bad_position_is_reported_without_committing() {
        let scheduler = Scheduler::new();
        let reply = submit_and_wait(&scheduler, "HEADING 9 0", "alice", Role::Write);
        assert_eq!(reply, b"INVALID_POSITION\n");
        assert_eq!(scheduler.current_version(), 0);
    }
}
