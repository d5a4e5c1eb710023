//! Exclusive lock on a journal directory.
//!
//! Only one guard may append to a journal at a time. The lock is held for
//! the lifetime of [`FileLock`] and released when it is dropped.

use std::fs::{File, OpenOptions};
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::{Path, PathBuf};

use crate::error::PersistenceError;

/// Name of the lock file inside a journal directory.
pub const LOCK_FILE: &str = ".lock";

/// Exclusive, non-blocking lock on a journal directory.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Locks `dir`, failing immediately if another holder exists.
    ///
    /// # Errors
    /// - `Locked` if the directory is already locked
    /// - `Io` for any other filesystem failure
    pub fn acquire(dir: &Path) -> Result<Self, PersistenceError> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        match Self::try_lock(&file) {
            Ok(()) => Ok(Self { _file: file, path }),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(PersistenceError::Locked {
                path: dir.display().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> IoResult<()> {
        use std::os::unix::io::AsRawFd;

        // SAFETY: the descriptor is owned by `file` and stays open for the call.
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = IoError::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(IoError::new(ErrorKind::WouldBlock, "journal is locked"));
            }
            return Err(err);
        }
        Ok(())
    }

    #[cfg(windows)]
    fn try_lock(file: &File) -> IoResult<()> {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::Foundation::HANDLE;
        use windows_sys::Win32::Storage::FileSystem::{
            LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
        };

        let handle = file.as_raw_handle() as HANDLE;
        // SAFETY: `handle` is valid for the lifetime of `file`; OVERLAPPED is
        // plain data and may be zeroed.
        let result = unsafe {
            let mut overlapped = std::mem::zeroed::<windows_sys::Win32::System::IO::OVERLAPPED>();
            LockFileEx(
                handle,
                LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
                0,
                1,
                0,
                &mut overlapped,
            )
        };
        if result == 0 {
            let err = IoError::last_os_error();
            return Err(IoError::new(ErrorKind::WouldBlock, format!("journal is locked: {err}")));
        }
        Ok(())
    }

    #[cfg(not(any(unix, windows)))]
    fn try_lock(_file: &File) -> IoResult<()> {
        Err(IoError::new(ErrorKind::Unsupported, "file locking not supported on this platform"))
    }
}
