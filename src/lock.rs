// Advisory lock around a cache file so two installs racing on the same
// manifest don't interleave a download with a read.
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Holds an exclusive lock until dropped.
#[derive(Debug)]
pub struct CacheLock {
    _file: File,
}

impl CacheLock {
    pub fn lock_path(cached: &Path) -> PathBuf {
        let mut name = cached
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        cached.with_file_name(name)
    }

    #[cfg(unix)]
    pub fn acquire(cached: &Path) -> io::Result<CacheLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(CacheLock::lock_path(cached))?;

        // SAFETY: `file` owns a valid descriptor for the duration of the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(CacheLock { _file: file })
    }

    #[cfg(not(unix))]
    pub fn acquire(cached: &Path) -> io::Result<CacheLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(CacheLock::lock_path(cached))?;

        Ok(CacheLock { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use crate::lock::CacheLock;
    use std::path::Path;

    #[test]
    fn test_lock_path() {
        assert_eq!(
            CacheLock::lock_path(Path::new("/tmp/emojivoto.yml")),
            Path::new("/tmp/emojivoto.yml.lock")
        );
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("booksapp.yml");

        {
            let _lock = CacheLock::acquire(&cached).unwrap();
            assert!(dir.path().join("booksapp.yml.lock").exists());
        }

        // released on drop, so a second acquire doesn't block
        let _again = CacheLock::acquire(&cached).unwrap();
    }
}
