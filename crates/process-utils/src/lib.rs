//! Small process-related helpers shared across the workspace.
//!
//! Capture processes are spawned through [`tokio_command`] so they never pop a
//! console window on Windows, and stopped through [`interrupt`] so the capture
//! tool gets a chance to finalize its output before a hard kill.

use std::ffi::OsStr;
use std::io;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
///
/// The child is killed when its handle is dropped, so an aborted supervisor task
/// can never leave the process running behind it.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window().kill_on_drop(true);
    cmd
}

/// Deliver an interrupt (SIGINT) to a single process.
///
/// A pid that no longer exists is treated as success: the process already exited,
/// which is the outcome the caller wanted.
#[cfg(unix)]
pub fn interrupt(pid: u32) -> io::Result<()> {
    let Ok(pid) = i32::try_from(pid) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("pid {pid} out of range"),
        ));
    };
    if pid <= 0 {
        return Ok(());
    }

    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    if rc == 0 {
        return Ok(());
    }

    let err = io::Error::last_os_error();
    if is_no_such_process(&err) {
        Ok(())
    } else {
        Err(err)
    }
}

/// Interrupts are not deliverable to a detached child on this platform.
///
/// Callers fall back to forced termination when this returns `Unsupported`.
#[cfg(not(unix))]
pub fn interrupt(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "console interrupts are not supported for background children",
    ))
}

/// Whether an OS error means the target process does not exist.
pub fn is_no_such_process(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(err.raw_os_error(), Some(code) if code == libc::ESRCH)
    }
    #[cfg(not(unix))]
    {
        err.kind() == io::ErrorKind::NotFound
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn interrupt_ignores_zero_pid() {
        assert!(interrupt(0).is_ok());
    }

    #[test]
    fn interrupt_rejects_out_of_range_pid() {
        let err = interrupt(u32::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn esrch_is_no_such_process() {
        let err = io::Error::from_raw_os_error(libc::ESRCH);
        assert!(is_no_such_process(&err));
        let other = io::Error::from_raw_os_error(libc::EPERM);
        assert!(!is_no_such_process(&other));
    }

    #[tokio::test]
    async fn interrupt_stops_a_sleeping_child() {
        let mut child = tokio_command("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        let pid = child.id().expect("pid");

        interrupt(pid).expect("send SIGINT");
        let status = child.wait().await.expect("wait");
        assert!(!status.success());

        // Already reaped: the pid is gone, which still counts as success.
        assert!(interrupt(pid).is_ok());
    }
}
