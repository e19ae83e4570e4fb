//! End-to-end scenarios from the design's literal examples, run against the
//! compiled `shrun` binary.

use std::time::Duration;

use harness::{run_script, run_script_via_stdin, PtySession};

#[test]
fn pass_prints_ok_and_exits_zero() {
    let run = run_script("$ echo hi\n> hi\n", &[]);
    assert!(run.stdout.contains("[1] $ echo hi -- ok"));
    assert!(run.stdout.contains("1 commands (1 passed, 0 failed)"));
    assert!(run.passed());
}

#[test]
fn fail_prints_a_diff_and_exits_nonzero() {
    let run = run_script("$ echo hi\n> bye\n", &[]);
    assert!(run.stdout.contains("[1] $ echo hi -- failed"));
    assert!(run.stdout.contains("hi"));
    assert!(run.stdout.contains('?'));
    assert!(run.stdout.contains("bye"));
    assert!(!run.passed());
}

#[test]
fn continuation_lines_join_into_one_command() {
    let run = run_script("$ echo a;\\\n+ echo b\n> a\n> b\n", &[]);
    assert!(run.stdout.contains("ok"));
    assert!(run.passed());
}

#[test]
fn supplied_stdin_reaches_the_command() {
    let run = run_script("$ cat\n< hello\n> hello\n", &[]);
    assert!(run.stdout.contains("ok"));
    assert!(run.passed());
}

#[test]
fn timeout_fires_and_reports_failure() {
    let run = run_script("$ sleep 30\n", &["--timeout", "1"]);
    assert!(run.stdout.contains("command timed out") || run.stderr.contains("command timed out"));
    assert!(!run.passed());
}

#[test]
fn dynamic_timeout_directive_shortens_the_deadline() {
    let run = run_script("$ timeout 2; sleep 3; echo ok\n> ok\n", &["--timeout", "5"]);
    assert!(run.stdout.contains("command timed out") || run.stderr.contains("command timed out"));
    assert!(!run.passed());
}

#[test]
fn script_can_be_read_from_stdin() {
    let run = run_script_via_stdin("$ echo hi\n> hi\n");
    assert!(run.stdout.contains("ok"));
    assert!(run.passed());
}

#[test]
fn end_marker_never_appears_in_reported_output() {
    let run = run_script("$ printf 'a\\004b\\n'\n> a\u{0004}b\n", &[]);
    assert!(!run.stdout.contains('\u{0004}') || run.stdout.matches('\u{0004}').count() == 1);
}

#[test]
fn color_auto_stays_plain_without_a_tty() {
    let run = run_script_via_stdin("$ echo hi\n> hi\n");
    assert!(!run.stdout.contains("\x1b["));
}

#[test]
fn stop_at_hands_off_to_interactive_mode_over_a_real_pty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.shrun");
    std::fs::write(&path, "$ echo hi\n> hi\n$ echo bye\n> bye\n").unwrap();

    let mut session = PtySession::spawn(&path, &["--stop-at", "1"]);
    let seen = session.read_until("interactive", Duration::from_secs(5));
    assert!(seen.contains("interactive"));
    session.send_eof();
    let rest = session.read_until("bye", Duration::from_secs(5));
    assert!(rest.contains("bye") || seen.contains("bye"));
}
