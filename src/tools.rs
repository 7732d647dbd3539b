//! Small filesystem helpers shared by the server and client binaries.
//!
//! `atomic_write` follows the teacher's `file_set_contents` discipline:
//! write to a sibling temp file, fsync-free rename over the target. On
//! the same filesystem `rename(2)` is atomic, so readers never observe
//! a partially written snapshot.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use nix::unistd;

pub fn atomic_write<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let path = path.as_ref();

    let mut template = path.to_owned();
    let mut file_name = template.file_name().unwrap_or_default().to_os_string();
    file_name.push(".tmp_XXXXXX");
    template.set_file_name(file_name);

    let (fd, tmp_path) = unistd::mkstemp(&template)
        .with_context(|| format!("mkstemp {template:?} failed"))?;

    let result = (|| -> Result<()> {
        use std::os::unix::io::FromRawFd;
        let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
        file.write_all(data).context("write failed")?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("atomic rename to {path:?} failed"))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = unistd::unlink(&tmp_path);
    }

    result
}

/// Removes a path if it exists; a missing path is not an error (the
/// server may be cleaning up after a socket it never fully created).
pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> Result<()> {
    match std::fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => bail!("failed to remove {:?}: {err}", path.as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_creates_file_with_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.md");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn atomic_write_replaces_existing_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.md");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn remove_if_exists_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");
        assert!(remove_if_exists(&path).is_ok());
    }
}
