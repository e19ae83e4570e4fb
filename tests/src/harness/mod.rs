//! PTY test harness for driving the compiled `shrun` binary end-to-end.
//!
//! Adapted from the teacher's own `TestShell`, which drives a shell over a
//! PTY and reads back its output; here `shrun` itself is the process under
//! test, so the harness drives *it* instead of a shell.

use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::pty::{openpty, OpenptyResult};
use nix::sys::termios::{self, LocalFlags, SetArg};
use nix::unistd::{self, ForkResult, Pid};

/// The outcome of running `shrun` against a script with stdout/stderr piped
/// normally (no PTY). Good enough for every scenario that doesn't depend on
/// TTY detection or the interactive handoff.
pub struct ShrunRun {
    pub stdout: String,
    pub stderr: String,
    pub status: ExitStatus,
}

impl ShrunRun {
    pub fn passed(&self) -> bool {
        self.status.success()
    }
}

/// Writes `script` to a temp file and runs the compiled `shrun` binary
/// against it with the given extra arguments.
pub fn run_script(script: &str, extra_args: &[&str]) -> ShrunRun {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("script.shrun");
    std::fs::write(&path, script).expect("write script");

    let output = Command::new(env!("CARGO_BIN_EXE_shrun"))
        .arg("--color")
        .arg("never")
        .args(extra_args)
        .arg(&path)
        .stdin(Stdio::null())
        .output()
        .expect("spawn shrun");

    ShrunRun {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        status: output.status,
    }
}

/// Runs the compiled `shrun` binary reading its script from stdin instead
/// of a file, exercising the `effective_stop_at`/no-seekable-script path.
pub fn run_script_via_stdin(script: &str) -> ShrunRun {
    use std::io::Write;

    let mut child = Command::new(env!("CARGO_BIN_EXE_shrun"))
        .arg("--color")
        .arg("never")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn shrun");

    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(script.as_bytes())
        .expect("write script to stdin");

    let output = child.wait_with_output().expect("wait for shrun");
    ShrunRun {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        status: output.status,
    }
}

/// Drives the compiled `shrun` binary with its stdio wired to a real PTY,
/// for tests that depend on TTY detection (`--color auto`) or the
/// interactive `--stop-at` handoff.
pub struct PtySession {
    master: OwnedFd,
    pid: Pid,
}

impl PtySession {
    pub fn spawn(script_path: &Path, extra_args: &[&str]) -> Self {
        let OpenptyResult { master, slave } = openpty(None, None).expect("openpty");
        let slave_fd = slave.as_raw_fd();

        match unsafe { unistd::fork() }.expect("fork") {
            ForkResult::Child => {
                drop(master);
                unistd::setsid().ok();
                unsafe {
                    libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0);
                }
                unistd::dup2(slave_fd, libc::STDIN_FILENO).ok();
                unistd::dup2(slave_fd, libc::STDOUT_FILENO).ok();
                unistd::dup2(slave_fd, libc::STDERR_FILENO).ok();
                drop(slave);

                let bin = CString::new(env!("CARGO_BIN_EXE_shrun")).unwrap();
                let mut args: Vec<CString> = vec![bin.clone()];
                for a in extra_args {
                    args.push(CString::new(*a).unwrap());
                }
                args.push(CString::new(script_path.to_string_lossy().into_owned()).unwrap());
                let _ = unistd::execv(&bin, &args);
                std::process::exit(1);
            }
            ForkResult::Parent { child } => {
                drop(slave);
                let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(master.as_raw_fd()) };
                if let Ok(mut term) = termios::tcgetattr(borrowed) {
                    term.local_flags.remove(LocalFlags::ECHO);
                    let _ = termios::tcsetattr(borrowed, SetArg::TCSANOW, &term);
                }
                PtySession { master, pid: child }
            }
        }
    }

    pub fn fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }

    /// Reads until `needle` appears in the accumulated output or `timeout`
    /// elapses, returning everything read so far.
    pub fn read_until(&mut self, needle: &str, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        let mut acc = Vec::new();
        let mut buf = [0u8; 4096];
        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let ready =
                poll_readable(self.fd(), remaining.as_millis().min(i32::MAX as u128) as i32);
            if !ready {
                continue;
            }
            match unistd::read(self.fd(), &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    acc.extend_from_slice(&buf[..n]);
                    if String::from_utf8_lossy(&acc).contains(needle) {
                        break;
                    }
                }
            }
        }
        String::from_utf8_lossy(&acc).into_owned()
    }

    pub fn write(&mut self, bytes: &[u8]) {
        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(self.fd()) };
        let _ = unistd::write(borrowed, bytes);
    }

    pub fn send_eof(&mut self) {
        // VEOF defaults to ^D; the session was put in non-canonical-echo but
        // still canonical mode, so a lone ^D closes the current line.
        self.write(&[0x04]);
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        let _ = nix::sys::wait::waitpid(self.pid, None);
    }
}

fn poll_readable(fd: RawFd, timeout_ms: i32) -> bool {
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
    let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
    let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];
    let timeout = if timeout_ms < 0 {
        PollTimeout::NONE
    } else {
        PollTimeout::from(timeout_ms.min(u16::MAX as i32) as u16)
    };
    matches!(poll(&mut fds, timeout), Ok(n) if n > 0)
}
