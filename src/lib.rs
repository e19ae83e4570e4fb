//! `shrun` drives a shell through a PTY against a literate test script and
//! reports per-command pass/fail verdicts as a side-by-side diff.

pub mod cli;
pub mod engine;
pub mod error;
pub mod marker;
pub mod options;
pub mod parser;
pub mod pty;
pub mod queue;
pub mod report;
pub mod signal;

pub use engine::{Engine, Tally};
pub use error::{Result, ShrunError};
pub use options::Options;
