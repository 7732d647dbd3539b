//! Server binary (spec.md §6): `mdcollab-server <tick_interval_ms>`.
//!
//! Owns the one authoritative document, runs the tick thread, accepts
//! client connections on a Unix domain socket (SPEC_FULL.md §6a), and
//! runs an administrative console accepting `QUIT`.

use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};

use mdcollab::config::Config;
use mdcollab::roles::RoleTable;
use mdcollab::scheduler::Scheduler;
use mdcollab::session;
use mdcollab::tools;

fn main() -> Result<()> {
    env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let tick_arg = std::env::args().nth(1);
    let config = Config::from_args(tick_arg.as_deref());

    let pid = std::process::id();
    println!("Server PID: {pid}");
    info!(
        target: "mdcollab::server",
        "starting: tick_interval_ms={} roles_file={:?} snapshot_path={:?}",
        config.tick_interval_ms, config.roles_file, config.snapshot_path
    );

    let roles = Arc::new(
        RoleTable::load(&config.roles_file)
            .with_context(|| format!("failed to load role file {:?}", config.roles_file))?,
    );

    std::fs::create_dir_all(&config.run_dir)
        .with_context(|| format!("failed to create run dir {:?}", config.run_dir))?;
    let socket_path = config.socket_path(pid);
    tools::remove_if_exists(&socket_path)?;
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("failed to bind socket {socket_path:?}"))?;
    info!(target: "mdcollab::server", "listening on {socket_path:?}");

    let scheduler = Scheduler::new();
    let running = Arc::new(AtomicBool::new(true));

    let tick_thread = {
        let scheduler = Arc::clone(&scheduler);
        let running = Arc::clone(&running);
        let interval = Duration::from_millis(config.tick_interval_ms);
        thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                thread::sleep(interval);
                scheduler.tick();
            }
        })
    };

    let console_thread = {
        let scheduler = Arc::clone(&scheduler);
        let running = Arc::clone(&running);
        let snapshot_path = config.snapshot_path.clone();
        let socket_path = socket_path.clone();
        thread::spawn(move || run_console(scheduler, running, snapshot_path, socket_path))
    };

    let acceptor_scheduler = Arc::clone(&scheduler);
    let acceptor_roles = Arc::clone(&roles);
    let acceptor_running = Arc::clone(&running);
    for incoming in listener.incoming() {
        if !acceptor_running.load(Ordering::SeqCst) {
            break;
        }
        match incoming {
            Ok(stream) => {
                let scheduler = Arc::clone(&acceptor_scheduler);
                let roles = Arc::clone(&acceptor_roles);
                thread::spawn(move || session::handle_connection(stream, scheduler, roles));
            }
            Err(err) => {
                warn!(target: "mdcollab::server", "accept() failed: {err}");
            }
        }
    }

    let _ = tick_thread.join();
    let _ = console_thread.join();
    Ok(())
}

/// The administrative console (spec.md §5 "one console thread reading
/// administrative input"): the only recognized command is `QUIT`, which
/// is refused while any session is registered (spec.md §5), and which on
/// acceptance persists the snapshot and tears everything down.
fn run_console(
    scheduler: Arc<Scheduler>,
    running: Arc<AtomicBool>,
    snapshot_path: std::path::PathBuf,
    socket_path: std::path::PathBuf,
) {
    use rustyline::error::ReadlineError;

    let mut editor = match rustyline::DefaultEditor::new() {
        Ok(e) => e,
        Err(err) => {
            error!(target: "mdcollab::server", "failed to start console: {err}");
            return;
        }
    };

    loop {
        match editor.readline("mdcollab> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if line == "QUIT" {
                    if !scheduler.registry.is_empty() {
                        println!(
                            "refusing to quit: {} session(s) still registered",
                            scheduler.registry.len()
                        );
                        continue;
                    }
                    if let Err(err) = tools::atomic_write(&snapshot_path, &scheduler.current_snapshot()) {
                        error!(target: "mdcollab::server", "failed to persist snapshot: {err}");
                    } else {
                        info!(target: "mdcollab::server", "snapshot persisted to {snapshot_path:?}");
                    }
                    let _ = tools::remove_if_exists(&socket_path);
                    running.store(false, Ordering::SeqCst);
                    std::process::exit(0);
                } else {
                    println!("unknown command: {line:?} (only QUIT is recognized)");
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                continue;
            }
            Err(err) => {
                error!(target: "mdcollab::server", "console read error: {err}");
                break;
            }
        }
    }
}
