//! Per-test begin/end messaging and the side-by-side diff printed on failure.

use std::io::{self, Write};

use crate::queue::ByteQueue;

#[derive(Clone, Copy)]
pub struct Palette {
    pub red: &'static str,
    pub green: &'static str,
    pub clear: &'static str,
}

impl Palette {
    pub fn colored() -> Self {
        Palette {
            red: "\x1b[31m\x1b[1m",
            green: "\x1b[32m",
            clear: "\x1b[m",
        }
    }

    pub fn plain() -> Self {
        Palette {
            red: "",
            green: "",
            clear: "",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

/// Prints `[L] $ first-line ... -- ` (no trailing newline) ahead of a case.
pub fn report_begin(
    out: &mut impl Write,
    palette: &Palette,
    first_lineno: usize,
    testcase: &ByteQueue,
    preamble: usize,
) -> io::Result<()> {
    let _ = palette;
    let body = &testcase.readable()[preamble..];
    let newline_pos = body
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or_else(|| body.len().saturating_sub(1));
    let first_line = &body[..newline_pos];
    let ellipsis = if newline_pos + 1 == body.len() { "" } else { "..." };
    write!(
        out,
        "[{}] $ {}{} -- ",
        first_lineno,
        String::from_utf8_lossy(first_line),
        ellipsis
    )?;
    out.flush()
}

/// Compares `actual` against `expected` and prints the verdict: `ok`,
/// `short result`, or `failed` followed by a line-by-line diff.
pub fn report_end(
    out: &mut impl Write,
    palette: &Palette,
    actual: &ByteQueue,
    expected: &ByteQueue,
    testcase_eof: bool,
) -> io::Result<Verdict> {
    let a = actual.readable();
    let e = expected.readable();

    if !testcase_eof {
        writeln!(out, "{}short result{}", palette.red, palette.clear)?;
        return Ok(Verdict::Fail);
    }
    if a == e {
        writeln!(out, "{}ok{}", palette.green, palette.clear)?;
        return Ok(Verdict::Pass);
    }
    writeln!(out, "{}failed{}", palette.red, palette.clear)?;

    let a_lines = split_lines(a);
    let e_lines = split_lines(e);
    let width = a_lines
        .iter()
        .chain(e_lines.iter())
        .map(|l| l.len())
        .max()
        .unwrap_or(0);

    let rows = a_lines.len().max(e_lines.len());
    for i in 0..rows {
        let (al, has_a) = a_lines.get(i).map(|&l| (l, true)).unwrap_or((&b"~"[..], false));
        let (el, has_e) = e_lines.get(i).map(|&l| (l, true)).unwrap_or((&b"~"[..], false));
        let eq = has_a && has_e && al == el;

        let mut left = String::from_utf8_lossy(al).into_owned();
        for _ in al.len()..width {
            left.push(' ');
        }
        let (lcolor, rcolor, sep) = if eq {
            ("", "", '|')
        } else {
            (palette.red, palette.green, '?')
        };
        writeln!(
            out,
            "{}{}{} {} {}{}{}",
            lcolor,
            left,
            palette.clear,
            sep,
            rcolor,
            String::from_utf8_lossy(el),
            palette.clear
        )?;
    }

    Ok(Verdict::Fail)
}

/// Splits on `\n`, treating a trailing unterminated remainder as its own
/// final line (actual shell output need not end with a newline).
fn split_lines(buf: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut rest = buf;
    while !rest.is_empty() {
        match rest.iter().position(|&b| b == b'\n') {
            Some(p) => {
                lines.push(&rest[..p]);
                rest = &rest[p + 1..];
            }
            None => {
                lines.push(rest);
                rest = &rest[rest.len()..];
            }
        }
    }
    lines
}
