//! Exclusive lock guarding the report queue against concurrent runs.

use crate::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Held for the duration of a run.
///
/// Backed by an OS advisory lock on the lock file, so the lock goes away with
/// the owning process even if it is killed. The file itself is left in place
/// and records the PID of the last holder.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock, failing with [`CoreError::Locked`] if it is held.
    pub fn acquire(path: &Path) -> CoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                let mut owner = String::new();
                let _ = file.read_to_string(&mut owner);
                return Err(CoreError::Locked(format!(
                    "{} (pid {})",
                    path.display(),
                    owner.trim()
                )));
            }
            Err(e) => return Err(e.into()),
        }

        // A leftover PID from a process that died without cleanup is replaced.
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        debug!(path = %path.display(), "Acquired run lock");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match self.file.unlock() {
            Ok(()) => debug!(path = %self.path.display(), "Released run lock"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to release run lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.lock");

        let _lock = RunLock::acquire(&path).unwrap();

        let second = RunLock::acquire(&path);
        match second {
            Err(CoreError::Locked(msg)) => {
                assert!(msg.contains(&std::process::id().to_string()));
            }
            other => panic!("expected Locked, got {:?}", other),
        }
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.lock");

        drop(RunLock::acquire(&path).unwrap());
        assert!(RunLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_leftover_lock_file_from_dead_process_is_taken_over() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.lock");
        // What a killed run leaves behind: the file and its PID, but no OS lock.
        std::fs::write(&path, "4294967\n").unwrap();

        let _lock = RunLock::acquire(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }

    const HOLDER_ENV: &str = "STUMBLER_TEST_LOCK_HOLDER";

    /// Runs only as a child of `test_lock_released_when_holder_is_killed`.
    #[test]
    #[ignore]
    fn lock_holder_process() {
        if let Ok(path) = std::env::var(HOLDER_ENV) {
            let _lock = RunLock::acquire(Path::new(&path)).unwrap();
            std::thread::sleep(std::time::Duration::from_secs(60));
        }
    }

    #[test]
    fn test_lock_released_when_holder_is_killed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.lock");

        let mut child = std::process::Command::new(std::env::current_exe().unwrap())
            .args(["lock::tests::lock_holder_process", "--exact", "--ignored"])
            .env(HOLDER_ENV, &path)
            .stdout(std::process::Stdio::null())
            .spawn()
            .unwrap();
        let child_pid = child.id().to_string();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(20);
        while std::fs::read_to_string(&path).unwrap_or_default().trim() != child_pid {
            assert!(std::time::Instant::now() < deadline, "holder never took the lock");
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(matches!(RunLock::acquire(&path), Err(CoreError::Locked(_))));

        child.kill().unwrap();
        child.wait().unwrap();

        // The file survives the kill but the lock does not.
        assert!(path.exists());
        assert!(RunLock::acquire(&path).is_ok());
    }
}
