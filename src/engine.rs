//! The non-blocking multiplexer (§4.4): the single event loop that shuttles
//! bytes between the script source, the shell's PTY, and the control
//! channel, one test case at a time.

use std::io::Write;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

use log::{debug, trace, warn};
use nix::sys::select::{pselect, FdSet};
use nix::sys::signal::SigSet;
use nix::sys::time::{TimeSpec, TimeValLike};
use nix::sys::termios::Termios;
use nix::unistd::{read, write};

use crate::error::{Result, ShrunError};
use crate::marker::{strip_end_marker, END_MARKER_CMD, PREAMBLE};
use crate::options::Options;
use crate::parser::{ParseOutcome, Parser};
use crate::pty::{veof_byte, ShellChild};
use crate::queue::ByteQueue;
use crate::report::{report_begin, report_end, Palette, Verdict};
use crate::signal;

const READ_CHUNK: usize = 8 * 1024;

/// Final pass/fail count for a run; `main` maps this onto the process exit code.
pub struct Tally {
    pub passed: u64,
    pub failed: u64,
}

impl Tally {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Replaces the original's process globals (`opt_*`, the ansi palette,
/// `first_lineno`): one value owns everything the loop needs across
/// iterations except the signal-handler flag, which has to be a `static`.
pub struct Engine {
    opts: Options,
    palette: Palette,
    parser: Parser,
}

/// Every byte stream the loop juggles. Grouped so the loop body reads like
/// the state-machine table in the design rather than a wall of locals.
struct Streams {
    script: ByteQueue,
    control: ByteQueue,
    testcase: ByteQueue,
    expected: ByteQueue,
    stdin: ByteQueue,
    output: ByteQueue,
}

impl Engine {
    pub fn new(opts: Options, palette: Palette) -> Self {
        let parser = Parser::new(opts.stop_at);
        Engine { opts, palette, parser }
    }

    /// Drives `script_fd` against the shell in `child` until the script is
    /// exhausted, a timeout fires, or a signal interrupts the loop.
    ///
    /// Mirrors the original's unified exit accounting: whatever way the
    /// loop ends, `failed` is bumped by one before reporting; a clean
    /// end-of-script run reverses that bump, so any abnormal exit — a
    /// timeout, a signal, a protocol or I/O error — always leaves a
    /// nonzero failure count even if every case so far had passed.
    pub fn run(
        &mut self,
        script_fd: RawFd,
        child: &ShellChild,
        term: Option<Termios>,
        out: &mut impl Write,
    ) -> Result<Tally> {
        let mut passed: u64 = 0;
        let mut failed: u64 = 0;

        let outcome = self.drive(script_fd, child, term, out, &mut passed, &mut failed);

        failed += 1;
        match &outcome {
            Ok(()) => {
                failed -= 1;
                if passed + failed > 0 {
                    print_tally(out, &self.palette, passed, failed)?;
                }
            }
            Err(ShrunError::TimedOut) => {
                writeln!(out, "{}command timed out{}", self.palette.red, self.palette.clear)?;
            }
            Err(ShrunError::Interrupted) => {
                writeln!(out, "{}interrupted{}", self.palette.red, self.palette.clear)?;
            }
            Err(other) => {
                writeln!(out, "{}{}{}", self.palette.red, other, self.palette.clear)?;
            }
        }

        match outcome {
            Ok(()) => Ok(Tally { passed, failed }),
            Err(e) => Err(e),
        }
    }

    /// The actual event loop; see `run` for the unified exit accounting
    /// wrapped around it.
    fn drive(
        &mut self,
        script_fd: RawFd,
        child: &ShellChild,
        term: Option<Termios>,
        out: &mut impl Write,
        passed: &mut u64,
        failed: &mut u64,
    ) -> Result<()> {
        let ptm_fd = child.ptm.as_raw_fd();
        let control_fd = child.control_read.as_raw_fd();
        let veof = veof_byte(term.as_ref());

        let mut s = Streams {
            script: ByteQueue::new(),
            control: ByteQueue::new(),
            testcase: ByteQueue::new(),
            expected: ByteQueue::new(),
            stdin: ByteQueue::new(),
            output: ByteQueue::new(),
        };
        s.testcase.append(PREAMBLE.as_bytes());
        let mut preamble = s.testcase.len();

        let mut reading_testcase = true;
        let mut script_eof = false;
        let mut in_eof = false;
        let mut testcase_eof = false;
        let mut control_open = true;
        let mut timeout = self.opts.timeout;

        loop {
            if !reading_testcase && (testcase_eof || in_eof) {
                let verdict = report_end(out, &self.palette, &s.output, &s.expected, testcase_eof)?;
                match verdict {
                    Verdict::Pass => *passed += 1,
                    Verdict::Fail => *failed += 1,
                }
                debug!("case finished: {:?}", verdict);
                s.expected.reset();
                s.stdin.reset();
                s.output.reset();
                reading_testcase = true;
                preamble = 0;
            }

            if reading_testcase {
                if script_eof && s.script.is_empty() && s.testcase.len() == preamble {
                    break;
                }

                match self.parser.read_testcase(
                    &mut s.script,
                    script_eof,
                    &mut s.testcase,
                    &mut s.expected,
                    &mut s.stdin,
                    preamble,
                ) {
                    ParseOutcome::NeedMoreInput => {}
                    ParseOutcome::Stop => {
                        debug!("breakpoint reached at line {}", self.parser.first_lineno());
                        run_interactive(out, ptm_fd, veof)?;
                        self.parser.clear_stop_at();
                        continue;
                    }
                    ParseOutcome::CaseReady => {
                        debug!("case ready at line {}", self.parser.first_lineno());
                        report_begin(out, &self.palette, self.parser.first_lineno(), &s.testcase, preamble)?;

                        if !s.stdin.is_empty() {
                            let stdin_bytes = s.stdin.readable().to_vec();
                            let dst = s.testcase.reserve(stdin_bytes.len() + 1);
                            dst[..stdin_bytes.len()].copy_from_slice(&stdin_bytes);
                            dst[stdin_bytes.len()] = veof;
                            s.testcase.commit_write(stdin_bytes.len() + 1);
                            s.stdin.commit_read(stdin_bytes.len());
                        }
                        s.testcase.append(END_MARKER_CMD);

                        reading_testcase = false;
                        testcase_eof = false;
                        // `in_eof` is deliberately left as-is: once the PTY has
                        // closed, every subsequent case reports short result
                        // immediately, cascading to the end of the script
                        // rather than being special-cased as a hard stop.
                    }
                }
            }

            let mut rfds = FdSet::new();
            let mut wfds = FdSet::new();
            let mut maxfd: RawFd = -1;

            let mut watch_read = |set: &mut FdSet, fd: RawFd, maxfd: &mut RawFd| {
                set.insert(fd);
                *maxfd = (*maxfd).max(fd);
            };

            if reading_testcase {
                if !script_eof {
                    watch_read(&mut rfds, script_fd, &mut maxfd);
                }
            } else {
                if !in_eof {
                    watch_read(&mut rfds, ptm_fd, &mut maxfd);
                }
                if !s.testcase.is_empty() {
                    wfds.insert(ptm_fd);
                    maxfd = maxfd.max(ptm_fd);
                }
            }
            if control_open {
                watch_read(&mut rfds, control_fd, &mut maxfd);
            }

            let deadline = if reading_testcase {
                None
            } else {
                Some(TimeSpec::seconds(timeout as i64))
            };

            let unblocked = SigSet::empty();
            let ready = loop {
                let mut rfds_try = rfds;
                let mut wfds_try = wfds;
                match pselect(maxfd + 1, Some(&mut rfds_try), Some(&mut wfds_try), None, deadline, Some(&unblocked)) {
                    Ok(n) => {
                        rfds = rfds_try;
                        wfds = wfds_try;
                        break n;
                    }
                    Err(nix::Error::EINTR) => {
                        if signal::interrupted() {
                            return Err(ShrunError::Interrupted);
                        }
                        continue;
                    }
                    Err(e) => return Err(ShrunError::Nix(e)),
                }
            };

            if signal::interrupted() {
                return Err(ShrunError::Interrupted);
            }
            if !reading_testcase && ready == 0 {
                return Err(ShrunError::TimedOut);
            }

            if rfds.contains(script_fd) {
                let dst = s.script.reserve(READ_CHUNK);
                let n = read(script_fd, dst)?;
                s.script.commit_write(n);
                trace!("read {} bytes from script", n);
                if n == 0 {
                    script_eof = true;
                }
            }

            if wfds.contains(ptm_fd) {
                let readable = s.testcase.readable();
                if !readable.is_empty() {
                    let n = write(unsafe { BorrowedFd::borrow_raw(ptm_fd) }, readable)?;
                    s.testcase.commit_read(n);
                    trace!("wrote {} bytes to pty", n);
                }
            }

            if rfds.contains(ptm_fd) {
                let dst = s.output.reserve(READ_CHUNK);
                let n = read(ptm_fd, dst)?;
                if n == 0 {
                    in_eof = true;
                    warn!("pty closed before end marker arrived");
                } else {
                    s.output.commit_write(n);
                    trace!("read {} bytes from pty", n);
                    if strip_end_marker(&mut s.output) {
                        testcase_eof = true;
                    }
                }
            }

            if control_open && rfds.contains(control_fd) {
                let dst = s.control.reserve(256);
                let n = read(control_fd, dst)?;
                if n == 0 {
                    control_open = false;
                } else {
                    s.control.commit_write(n);
                    if let Some(new_timeout) = parse_control_directive(&mut s.control)? {
                        debug!("timeout directive: {}s", new_timeout);
                        timeout = new_timeout;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Proxies the process's own stdin/stdout against the PTY until the local
/// user sends EOF, then injects the end marker and waits for it to come
/// back before resuming normal testing. Counts toward neither tally.
fn run_interactive(out: &mut impl Write, ptm_fd: RawFd, veof: u8) -> Result<()> {
    writeln!(out, "-- interactive mode, press ^D to resume --")?;
    out.flush()?;

    let mut pending = ByteQueue::new();
    let mut output = ByteQueue::new();
    let mut stdin_eof = false;
    let stdin_fd = libc::STDIN_FILENO;
    let stdout_fd = libc::STDOUT_FILENO;

    loop {
        let mut rfds = FdSet::new();
        let mut wfds = FdSet::new();
        let mut maxfd = ptm_fd;

        if !stdin_eof {
            rfds.insert(stdin_fd);
            maxfd = maxfd.max(stdin_fd);
        }
        rfds.insert(ptm_fd);
        if !pending.is_empty() {
            wfds.insert(ptm_fd);
        }

        let unblocked = SigSet::empty();
        loop {
            match pselect(maxfd + 1, Some(&mut rfds), Some(&mut wfds), None, None, Some(&unblocked)) {
                Ok(_) => break,
                Err(nix::Error::EINTR) => {
                    if signal::interrupted() {
                        return Err(ShrunError::Interrupted);
                    }
                    continue;
                }
                Err(e) => return Err(ShrunError::Nix(e)),
            }
        }
        if signal::interrupted() {
            return Err(ShrunError::Interrupted);
        }

        if rfds.contains(stdin_fd) {
            let dst = pending.reserve(READ_CHUNK);
            let n = read(stdin_fd, dst)?;
            if n == 0 {
                stdin_eof = true;
                pending.append(&[veof]);
                pending.append(END_MARKER_CMD);
            } else {
                pending.commit_write(n);
            }
        }

        if wfds.contains(ptm_fd) && !pending.is_empty() {
            let n = write(unsafe { BorrowedFd::borrow_raw(ptm_fd) }, pending.readable())?;
            pending.commit_read(n);
        }

        if rfds.contains(ptm_fd) {
            let dst = output.reserve(READ_CHUNK);
            let n = read(ptm_fd, dst)?;
            if n == 0 {
                return Ok(());
            }
            output.commit_write(n);
            let done = strip_end_marker(&mut output);
            let chunk = output.readable().to_vec();
            if !chunk.is_empty() {
                write(unsafe { BorrowedFd::borrow_raw(stdout_fd) }, &chunk)?;
            }
            output.commit_read(chunk.len());
            if done {
                return Ok(());
            }
        }
    }
}

/// Parses at most one complete `timeout N` line out of the control queue.
/// Anything else is a fatal protocol violation.
fn parse_control_directive(control: &mut ByteQueue) -> Result<Option<u64>> {
    let readable = control.readable();
    let Some(nl) = readable.iter().position(|&b| b == b'\n') else {
        return Ok(None);
    };
    let line = &readable[..nl];
    let consumed = nl + 1;

    let directive = std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.strip_prefix("timeout "))
        .and_then(|s| s.trim().parse::<u64>().ok());

    let result = match directive {
        Some(seconds) => Ok(Some(seconds)),
        None => Err(ShrunError::UnknownControlCommand(String::from_utf8_lossy(line).into_owned())),
    };
    control.commit_read(consumed);
    result
}

fn print_tally(out: &mut impl Write, palette: &Palette, passed: u64, failed: u64) -> std::io::Result<()> {
    let total = passed + failed;
    let color = if failed == 0 { palette.green } else { palette.red };
    writeln!(
        out,
        "{}{} commands ({} passed, {} failed){}",
        color, total, passed, failed, palette.clear
    )
}
