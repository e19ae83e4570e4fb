//! The shell-child factory and termios setup collaborator (§6).
//!
//! Opens a PTY, forks, and execs the shell in the child with the PTY slave
//! as its controlling terminal and stdio. The parent gets back the PTY
//! master (used for both writing commands and reading output) and a
//! control-read fd fed by the shell's fd 109.

use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;

use nix::pty::{openpty, OpenptyResult};
use nix::sys::termios::{self, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices, Termios};
use nix::unistd::{self, ForkResult, Pid};

use crate::error::Result;

/// fd the shell-side `timeout()` function writes control directives to.
/// Chosen only to stay clear of 0/1/2; any unused descriptor would do.
pub const CONTROL_FD: RawFd = 109;

pub struct ShellChild {
    pub ptm: OwnedFd,
    pub control_read: OwnedFd,
    pub pid: Pid,
}

/// Forks a child that execs `shell` with its stdio (and stderr, if
/// `forward_stderr`) wired to a freshly allocated PTY slave, and fd 109
/// wired to the write end of a fresh control pipe.
pub fn spawn_shell(shell: &Path, forward_stderr: bool) -> Result<ShellChild> {
    let OpenptyResult { master, slave } = openpty(None, None)?;
    let (control_read, control_write) = unistd::pipe()?;

    let slave_fd = slave.as_raw_fd();
    let control_write_fd = control_write.as_raw_fd();

    match unsafe { unistd::fork()? } {
        ForkResult::Child => {
            drop(master);
            drop(control_read);

            if unistd::setsid().is_err() {
                std::process::exit(1);
            }
            unsafe {
                if libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0) < 0 {
                    std::process::exit(1);
                }
            }

            let _ = unistd::dup2(slave_fd, libc::STDIN_FILENO);
            let _ = unistd::dup2(slave_fd, libc::STDOUT_FILENO);
            if forward_stderr {
                let _ = unistd::dup2(slave_fd, libc::STDERR_FILENO);
            }
            let _ = unistd::dup2(control_write_fd, CONTROL_FD);
            drop(slave);
            drop(control_write);

            let shell_cstr = match CString::new(shell.as_os_str().to_string_lossy().into_owned()) {
                Ok(c) => c,
                Err(_) => std::process::exit(1),
            };
            let _ = unistd::execv(&shell_cstr, &[shell_cstr.clone()]);
            // Only reached if exec fails.
            std::process::exit(1);
        }
        ForkResult::Parent { child } => {
            drop(slave);
            drop(control_write);
            Ok(ShellChild {
                ptm: master,
                control_read,
                pid: child,
            })
        }
    }
}

/// If `fd` is a TTY, disables local echo and `ONLCR` translation and
/// returns the now-current termios (used to read back `VEOF`). Returns
/// `None` if `fd` isn't a TTY.
pub fn setup_terminal(fd: RawFd) -> Result<Option<Termios>> {
    if unsafe { libc::isatty(fd) } == 0 {
        return Ok(None);
    }

    let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
    let mut term = termios::tcgetattr(borrowed)?;

    term.local_flags.remove(
        LocalFlags::ECHO | LocalFlags::ECHOE | LocalFlags::ECHOK | LocalFlags::ECHONL,
    );
    term.output_flags.remove(OutputFlags::ONLCR);

    termios::tcsetattr(borrowed, SetArg::TCSANOW, &term)?;
    Ok(Some(term))
}

/// The byte the line discipline turns into end-of-file on read, given the
/// terminal's current `VEOF` setting (falls back to ASCII `EOT` when the
/// output isn't a TTY, which the PTY variant never actually hits).
pub fn veof_byte(term: Option<&Termios>) -> u8 {
    term.map(|t| t.control_chars[SpecialCharacterIndices::VEOF as usize])
        .unwrap_or(0x04)
}
