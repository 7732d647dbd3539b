//! Runtime configuration: paths and the tick interval.
//!
//! Mirrors the teacher's `buildcfg.rs` convention of a handful of named
//! constants for well-known filesystem locations, with environment
//! variables available to override them for testing.

use std::path::PathBuf;

/// Default directory for the server's Unix domain socket.
pub const DEFAULT_RUN_DIR: &str = "/run/mdcollab";

/// Default path to the role table, relative to the server's working
/// directory.
pub const DEFAULT_ROLES_FILE: &str = "roles.txt";

/// Default path the final snapshot is written to on `QUIT`.
pub const DEFAULT_SNAPSHOT_PATH: &str = "doc.md";

/// Tick interval used when the CLI argument is missing or non-positive.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

/// Resolved configuration for one server process.
#[derive(Debug, Clone)]
pub struct Config {
    pub tick_interval_ms: u64,
    pub run_dir: PathBuf,
    pub roles_file: PathBuf,
    pub snapshot_path: PathBuf,
}

impl Config {
    /// Builds a `Config` from the server's single CLI argument
    /// (`tick_interval_ms`), falling back to `DEFAULT_TICK_INTERVAL_MS`
    /// when it is missing, unparsable, or non-positive (spec.md §6).
    pub fn from_args(tick_interval_arg: Option<&str>) -> Self {
        let tick_interval_ms = tick_interval_arg
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .map(|v| v as u64)
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS);

        Config {
            tick_interval_ms,
            run_dir: env_path("MDCOLLAB_RUN_DIR", DEFAULT_RUN_DIR),
            roles_file: env_path("MDCOLLAB_ROLES_FILE", DEFAULT_ROLES_FILE),
            snapshot_path: env_path("MDCOLLAB_SNAPSHOT_PATH", DEFAULT_SNAPSHOT_PATH),
        }
    }

    /// Path of the Unix domain socket a server with the given pid
    /// listens on (see §6a of SPEC_FULL.md for the transport
    /// substitution rationale).
    pub fn socket_path(&self, server_pid: u32) -> PathBuf {
        self.run_dir.join(format!("mdcollab-{server_pid}.sock"))
    }
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_interval_falls_back_to_default() {
        assert_eq!(Config::from_args(Some("0")).tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert_eq!(Config::from_args(Some("-5")).tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert_eq!(Config::from_args(Some("garbage")).tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert_eq!(Config::from_args(None).tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
    }

    #[test]
    fn positive_interval_is_honored() {
        assert_eq!(Config::from_args(Some("250")).tick_interval_ms, 250);
    }

    #[test]
    fn socket_path_includes_pid() {
        let cfg = Config::from_args(None);
        let path = cfg.socket_path(4242);
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "mdcollab-4242.sock");
    }
}
