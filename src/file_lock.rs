use anyhow::anyhow;
use std::fs::File;
use syscalls::{syscall2, Sysno};

/// Exclusive advisory lock held for the lifetime of the file handle. A journal
/// has a single writer; a second open fails instead of waiting.
pub(crate) trait FileLock: Sized {
    fn lock_exclusive(self) -> anyhow::Result<Self>;
}

#[cfg(unix)]
use std::os::unix::io::AsRawFd;
#[cfg(unix)]
impl FileLock for File {
    fn lock_exclusive(self) -> anyhow::Result<Self> {
        let fd = self.as_raw_fd();
        const LOCK_EX: usize = 0x2;
        const LOCK_NB: usize = 0x4;
        let result = unsafe { syscall2(Sysno::flock, fd as usize, LOCK_EX | LOCK_NB) };
        match result {
            Ok(_) => Ok(self),
            Err(err) => Err(anyhow!(
                "cannot lock journal file fd={fd} errno={err}, is it opened elsewhere?"
            )),
        }
    }
}
