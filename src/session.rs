//! Client session lifecycle (component D): handshake, role check,
//! initial state push, command ingestion, disconnect drain.
//!
//! Per SPEC_FULL.md §6a the named-pipe-plus-signal rendezvous of spec.md
//! §4.D/§6 is substituted with a Unix domain socket; the byte-level
//! handshake (client sends its username, server replies with role,
//! version, snapshot length, and snapshot bytes) is preserved exactly.
//!
//! One reader thread per session does the handshake and then blocks on
//! inbound reads (spec.md §5's "one inbound reader thread per session").
//! Outbound delivery (per-command replies and per-tick broadcasts) goes
//! through a bounded channel to a dedicated writer thread (SPEC_FULL.md
//! §5a), so a stalled client's socket write never blocks the tick thread.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use nix::sys::socket::{getsockopt, sockopt::PeerCredentials};

use crate::error::SessionError;
use crate::protocol::Role;
use crate::roles::RoleTable;
use crate::scheduler::{CommandRecord, Scheduler};

/// Outbound frames per session are replies to that session's own commands
/// plus the per-tick broadcast; this easily drains within one tick unless
/// the client has stopped reading entirely.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// How often a drained-pending reader thread polls `Session::is_drained`
/// (spec.md §4.D "blocks (short-sleep poll)").
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Server-side state for one connected client (spec.md §3 "Session").
pub struct Session {
    pub pid: i32,
    pub username: String,
    pub role: Role,
    outbound: Sender<Vec<u8>>,
    online: AtomicBool,
    drained: AtomicBool,
}

impl Session {
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }

    /// Channel errors (spec.md §7 kind 4) promote a session to offline
    /// and trigger the drain path, same as DISCONNECT or EOF.
    pub fn mark_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    /// A clone of this session's outbound sender, handed to each
    /// [`CommandRecord`] submitted on its behalf so the reply lands on
    /// the same channel as broadcasts.
    pub fn outbound_sender(&self) -> Sender<Vec<u8>> {
        self.outbound.clone()
    }

    /// Enqueues a broadcast frame; a full channel means the client isn't
    /// draining its outbound side, which we treat as unresponsive (same
    /// rule as a channel write failure, per SPEC_FULL.md §5a).
    fn broadcast(&self, frame: &[u8]) {
        if self.outbound.try_send(frame.to_vec()).is_err() {
            warn!(
                target: "mdcollab::session",
                "pid {}: outbound channel full, demoting to offline", self.pid
            );
            self.mark_offline();
        }
    }
}

/// The session registry (`clients_lock` of spec.md §5): every live
/// session, consulted and mutated only by the scheduler tick (for
/// broadcast + drain) and by newly handshaking connections (for
/// registration).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry { sessions: Mutex::new(Vec::new()) }
    }

    pub fn register(&self, session: Arc<Session>) {
        self.sessions.lock().unwrap().push(session);
    }

    /// Called once per tick, under `version_lock` (the scheduler's
    /// `state` mutex is held for the whole call) so that a broadcast for
    /// version T is fully delivered before version T+1 can ever be
    /// observed being built (spec.md §5 ordering guarantee).
    ///
    /// Implements the drain contract of spec.md §4.D: any session the
    /// scheduler observes `!online` is marked `drained` and unlinked
    /// from the registry here, never by the session task itself — this
    /// is what lets the reader thread safely close its channels
    /// afterward, instead of racing a scheduler that might still
    /// dispatch to it.
    pub fn reap_and_broadcast(&self, frame: Option<&str>) {
        let mut sessions = self.sessions.lock().unwrap();

        if let Some(frame) = frame {
            let bytes = frame.as_bytes();
            for session in sessions.iter() {
                if session.is_online() {
                    session.broadcast(bytes);
                }
            }
        }

        sessions.retain(|session| {
            if session.is_online() {
                true
            } else {
                session.drained.store(true, Ordering::SeqCst);
                false
            }
        });
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drives one accepted connection end to end: handshake, role lookup,
/// initial state push, then the read loop that feeds commands to the
/// scheduler, until DISCONNECT/EOF and the subsequent drain. Intended to
/// run on its own thread, one per session (spec.md §5).
pub fn handle_connection(stream: UnixStream, scheduler: Arc<Scheduler>, roles: Arc<RoleTable>) {
    let cred = getsockopt(stream.as_raw_fd(), PeerCredentials).ok();
    let pid = cred.map(|c| c.pid()).unwrap_or(-1);

    // Same permission rule the teacher's control-socket acceptor applies:
    // only the socket's own owner or root may use it (the role table
    // still governs what an accepted connection is allowed to *do*).
    if let Some(cred) = cred {
        let my_uid = unsafe { libc::getuid() };
        if cred.uid() != 0 && cred.uid() != my_uid {
            warn!(
                target: "mdcollab::session",
                "pid {pid}: rejecting connection from uid {} (server runs as uid {my_uid})", cred.uid()
            );
            return;
        }
    }

    let mut reader = match stream.try_clone() {
        Ok(s) => BufReader::new(s),
        Err(err) => {
            warn!(target: "mdcollab::session", "pid {pid}: failed to clone socket for reading: {err}");
            return;
        }
    };

    let (username, role) = match perform_handshake(&stream, &mut reader, &roles, &scheduler) {
        Ok(parts) => parts,
        Err(err) => {
            warn!(target: "mdcollab::session", "pid {pid}: handshake failed: {err}");
            return;
        }
    };

    let (tx, rx) = bounded(OUTBOUND_CHANNEL_CAPACITY);
    let session = Arc::new(Session {
        pid,
        username: username.clone(),
        role,
        outbound: tx,
        online: AtomicBool::new(true),
        drained: AtomicBool::new(false),
    });
    scheduler.registry.register(Arc::clone(&session));
    info!(
        target: "mdcollab::session",
        "pid {pid} ({username}, {role}) connected at version {}", scheduler.current_version()
    );

    let writer_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            warn!(target: "mdcollab::session", "pid {pid}: failed to clone socket for writer thread: {err}");
            session.mark_offline();
            return;
        }
    };
    let writer_pid = pid;
    let writer_handle = thread::spawn(move || run_writer(writer_stream, rx, writer_pid));

    run_reader(reader, &session, &scheduler);

    while !session.is_drained() {
        thread::sleep(DRAIN_POLL_INTERVAL);
    }
    drop(session);
    let _ = writer_handle.join();
    info!(target: "mdcollab::session", "pid {pid} ({username}) drained");
}

/// Reads the username line, looks it up, and writes the handshake reply.
/// Every failure path (EOF before a username arrives, an unrecognised
/// username, or an I/O error on either side) is reported through
/// [`SessionError`] so the caller logs one consistent `Display` message
/// instead of each call site inventing its own wording.
fn perform_handshake(
    stream: &UnixStream,
    reader: &mut BufReader<UnixStream>,
    roles: &RoleTable,
    scheduler: &Scheduler,
) -> Result<(String, Role), SessionError> {
    let mut username = String::new();
    if reader.read_line(&mut username)? == 0 {
        return Err(SessionError::HandshakeEof);
    }
    let username = username.trim_end_matches(['\r', '\n']).to_string();

    let role = match roles.lookup(&username) {
        Some(role) => role,
        None => {
            let mut reject = stream.try_clone()?;
            writeln!(reject, "Reject UNAUTHORISED")?;
            return Err(SessionError::UnknownUser(username));
        }
    };

    let version = scheduler.current_version();
    let snapshot = scheduler.current_snapshot();
    let mut writer = stream.try_clone()?;
    write_handshake_reply(&mut writer, role, version, &snapshot)?;

    Ok((username, role))
}

fn write_handshake_reply(
    writer: &mut UnixStream,
    role: Role,
    version: u64,
    snapshot: &[u8],
) -> std::io::Result<()> {
    writeln!(writer, "{role}")?;
    writeln!(writer, "{version}")?;
    writeln!(writer, "{}", snapshot.len())?;
    writer.write_all(snapshot)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn run_writer(mut stream: UnixStream, rx: Receiver<Vec<u8>>, pid: i32) {
    for frame in rx.iter() {
        if let Err(err) = stream.write_all(&frame) {
            warn!(target: "mdcollab::session", "pid {pid}: outbound write failed: {err}");
            break;
        }
        let _ = stream.flush();
    }
}

fn run_reader(mut reader: BufReader<UnixStream>, session: &Arc<Session>, scheduler: &Arc<Scheduler>) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => {
                debug!(target: "mdcollab::session", "pid {}: EOF on inbound channel", session.pid);
                session.mark_offline();
                return;
            }
            Ok(_) => {
                let text = line.trim_end_matches(['\r', '\n']);
                if text.is_empty() {
                    continue;
                }
                if text == "DISCONNECT" {
                    debug!(target: "mdcollab::session", "pid {}: DISCONNECT", session.pid);
                    session.mark_offline();
                    return;
                }
                let record = CommandRecord::new(
                    text.to_string(),
                    session.username.clone(),
                    session.role,
                    session.outbound_sender(),
                );
                scheduler.submit(record);
            }
            Err(err) => {
                warn!(target: "mdcollab::session", "pid {}: read error: {err}", session.pid);
                session.mark_offline();
                return;
            }
        }
    }
}
