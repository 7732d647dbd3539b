//! `mdcollab` — a multi-client collaborative Markdown document server.
//!
//! # Architecture
//!
//! One server process owns a single authoritative [`document::Document`].
//! Client processes connect over a local Unix domain socket (see
//! [`config`] for the socket path convention), authenticate with a
//! username looked up in a [`roles`] table, and stream newline-delimited
//! edit commands. A [`scheduler::Scheduler`] wakes on a fixed interval,
//! drains every command submitted since the previous tick, applies them
//! in arrival order against the document, commits a new version, and
//! broadcasts the result to every connected [`session::Session`].
//!
//! # Locking
//!
//! Two locks cover the whole system: `version_lock` (inside
//! [`scheduler::Scheduler`]) serializes document mutation, command
//! queueing, and broadcast; `clients_lock` (inside
//! [`session::SessionRegistry`]) guards the set of connected sessions.
//! No finer-grained locking is introduced — see `DESIGN.md`.

pub mod chunk;
pub mod config;
pub mod document;
pub mod error;
pub mod protocol;
pub mod roles;
pub mod scheduler;
pub mod session;
pub mod tools;
