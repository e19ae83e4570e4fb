//! Splits a literate test script into test cases.
//!
//! A script is read line by line. Each line's first non-whitespace byte
//! selects what happens to the rest of the line: `$` starts a command,
//! `+` continues one, `>` is expected output, `<` is supplied stdin, and
//! anything else is prose and is dropped on the floor.

use crate::queue::ByteQueue;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The script queue doesn't hold a full line yet; wait for more bytes.
    NeedMoreInput,
    /// A complete test case is sitting in `testcase`/`expected`/`stdin`.
    CaseReady,
    /// `first_lineno` reached the caller's breakpoint; hand off to interactive mode.
    Stop,
}

pub struct Parser {
    lineno: usize,
    first_lineno: usize,
    stop_at: Option<usize>,
}

impl Parser {
    pub fn new(stop_at: Option<usize>) -> Self {
        Parser {
            lineno: 1,
            first_lineno: 1,
            stop_at,
        }
    }

    pub fn first_lineno(&self) -> usize {
        self.first_lineno
    }

    /// Disarms the breakpoint after interactive mode has fired once.
    pub fn clear_stop_at(&mut self) {
        self.stop_at = None;
    }

    /// Attempts to extend the in-progress test case with as many complete
    /// lines as `script` currently holds, stopping at the next `CaseReady`,
    /// `Stop`, or a partial trailing line.
    ///
    /// `preamble` is the number of bytes already sitting in `testcase`
    /// before any user command (the `timeout()` shell function); it's used
    /// to tell "no command collected yet" apart from "mid-command".
    pub fn read_testcase(
        &mut self,
        script: &mut ByteQueue,
        eof: bool,
        testcase: &mut ByteQueue,
        expected: &mut ByteQueue,
        stdin: &mut ByteQueue,
        preamble: usize,
    ) -> ParseOutcome {
        loop {
            let readable = script.readable();
            if readable.is_empty() {
                return ParseOutcome::NeedMoreInput;
            }

            let (content_end, consumed) = match readable.iter().position(|&b| b == b'\n') {
                Some(p) => (p, p + 1),
                None if eof => (readable.len(), readable.len()),
                None => return ParseOutcome::NeedMoreInput,
            };

            let line = &readable[..content_end];
            let start = line
                .iter()
                .position(|&b| b != b' ' && b != b'\t')
                .unwrap_or(line.len());
            let trimmed = &line[start..];
            let prefix = trimmed.first().copied();
            let in_progress = testcase.len() > preamble;

            if prefix == Some(b'$') && in_progress {
                // Stop *before* consuming this line; it belongs to the next case.
                return ParseOutcome::CaseReady;
            }

            match prefix {
                Some(b'$') => {
                    self.first_lineno = self.lineno;
                    if let Some(stop) = self.stop_at {
                        if stop <= self.first_lineno {
                            return ParseOutcome::Stop;
                        }
                    }
                    Self::append_line(testcase, trimmed);
                }
                Some(b'+') if in_progress => Self::append_line(testcase, trimmed),
                Some(b'>') if in_progress => Self::append_line(expected, trimmed),
                Some(b'<') if in_progress => Self::append_line(stdin, trimmed),
                _ => {}
            }

            script.commit_read(consumed);
            self.lineno += 1;
        }
    }

    /// Strips the prefix byte and one optional following space, then
    /// writes the remainder to `queue` terminated by a single `\n` —
    /// whether or not the source line carried one.
    fn append_line(queue: &mut ByteQueue, line: &[u8]) {
        let mut rest = &line[1..];
        if rest.first() == Some(&b' ') {
            rest = &rest[1..];
        }
        let dst = queue.reserve(rest.len() + 1);
        dst[..rest.len()].copy_from_slice(rest);
        dst[rest.len()] = b'\n';
        queue.commit_write(rest.len() + 1);
    }
}
