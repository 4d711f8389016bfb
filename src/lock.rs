//! Advisory file locks shared by the daemon and CLI invocations.
//!
//! Every process that touches the interaction log takes the lock for the
//! length of one read or one read-modify-write, so a `bookswipe like` run
//! next to a running daemon never overwrites rows the daemon just wrote.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Lock file guarding `path`, placed next to it.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// A held `flock`, released on drop.
pub struct FileLock {
    #[allow(dead_code)]
    file: File,
}

impl FileLock {
    /// Block until an exclusive lock on `lock_path` is held.
    pub fn exclusive(lock_path: &Path) -> io::Result<Self> {
        let file = Self::open(lock_path)?;
        Self::flock(&file, LockKind::Exclusive)?;
        Ok(FileLock { file })
    }

    /// Block until a shared lock on `lock_path` is held.
    pub fn shared(lock_path: &Path) -> io::Result<Self> {
        let file = Self::open(lock_path)?;
        Self::flock(&file, LockKind::Shared)?;
        Ok(FileLock { file })
    }

    /// Take an exclusive lock without waiting, `WouldBlock` when it is held.
    #[cfg(test)]
    pub fn try_exclusive(lock_path: &Path) -> io::Result<Self> {
        let file = Self::open(lock_path)?;
        Self::flock(&file, LockKind::TryExclusive)?;
        Ok(FileLock { file })
    }

    fn open(lock_path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
    }

    #[cfg(unix)]
    fn flock(file: &File, kind: LockKind) -> io::Result<()> {
        let operation = match kind {
            LockKind::Exclusive => libc::LOCK_EX,
            LockKind::Shared => libc::LOCK_SH,
            #[cfg(test)]
            LockKind::TryExclusive => libc::LOCK_EX | libc::LOCK_NB,
        };

        let result = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if result != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(io::Error::new(
                    io::ErrorKind::WouldBlock,
                    "interaction log is locked by another process",
                ));
            }
            return Err(err);
        }
        Ok(())
    }

    // TODO: use LockFileEx on windows, for now only in-process locking applies there
    #[cfg(not(unix))]
    fn flock(_file: &File, _kind: LockKind) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for FileLock {
    fn drop(&mut self) {
        unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
    }
}

#[derive(Clone, Copy)]
enum LockKind {
    Exclusive,
    Shared,
    #[cfg(test)]
    TryExclusive,
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn exclusive_lock_excludes_others_until_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = lock_path_for(&tmp.path().join("interactions.csv"));

        let held = FileLock::exclusive(&path).unwrap();
        let second = FileLock::try_exclusive(&path);
        assert_eq!(second.err().map(|e| e.kind()), Some(io::ErrorKind::WouldBlock));

        drop(held);
        assert!(FileLock::try_exclusive(&path).is_ok());
    }

    #[test]
    fn shared_locks_coexist_but_block_writers() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.lock");

        let first = FileLock::shared(&path).unwrap();
        let _second = FileLock::shared(&path).unwrap();
        assert!(FileLock::try_exclusive(&path).is_err());

        drop(first);
        assert!(FileLock::try_exclusive(&path).is_err());
    }

    #[test]
    fn lock_file_sits_next_to_the_log() {
        let path = lock_path_for(Path::new("/data/interactions.csv"));
        assert_eq!(path, PathBuf::from("/data/interactions.csv.lock"));
    }
}
