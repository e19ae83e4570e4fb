//! Signal wiring (§4.4, §9).
//!
//! `SIGHUP`/`SIGINT` flip a flag the main loop checks after every wait;
//! `SIGPIPE` and `SIGCHLD` are ignored outright (the engine learns about a
//! dead shell from PTY EOF, not from a `SIGCHLD` handler — a deliberate
//! omission carried over from the reference implementation). The flag has
//! to be a process-wide `static`: signal handlers can't capture state.
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SigHandler, SigSet, Signal};

use crate::error::Result;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// The set of signals the multiplexer's wait is allowed to be woken by.
pub fn watched_signals() -> SigSet {
    let mut set = SigSet::empty();
    set.add(Signal::SIGHUP);
    set.add(Signal::SIGINT);
    set.add(Signal::SIGCHLD);
    set
}

/// Installs handlers and blocks the watched signals in the process mask;
/// they're only unblocked for the duration of each `pselect` call.
pub fn install() -> Result<()> {
    let set = watched_signals();
    set.thread_block()?;

    unsafe {
        signal::signal(Signal::SIGHUP, SigHandler::Handler(on_interrupt))?;
        signal::signal(Signal::SIGINT, SigHandler::Handler(on_interrupt))?;
        signal::signal(Signal::SIGCHLD, SigHandler::SigIgn)?;
        signal::signal(Signal::SIGPIPE, SigHandler::SigIgn)?;
    }
    Ok(())
}
