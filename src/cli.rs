//! Command-line surface (§4.6, §6). A thin `clap` front end that turns raw
//! flags into an `Options` value; nothing downstream of `Options` knows
//! flags were ever involved.

use std::path::PathBuf;

use clap::{Parser as ClapParser, ValueEnum};

#[derive(Debug, ClapParser)]
#[command(name = "shrun", about = "Runs a literate shell-session test script")]
pub struct Cli {
    /// Per-command timeout in seconds.
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,

    /// 1-based script line to break into interactive mode at. Ignored when
    /// the script is read from stdin.
    #[arg(long, value_name = "N")]
    pub stop_at: Option<usize>,

    /// Shell binary to drive.
    #[arg(long, default_value = "/bin/sh")]
    pub shell: PathBuf,

    /// When to colorize output.
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto, num_args = 0..=1, default_missing_value = "always")]
    pub color: ColorChoice,

    /// Don't redirect the shell's stderr into the output stream.
    #[arg(long)]
    pub no_stderr: bool,

    /// Print verbose engine logging.
    #[arg(long, env = "SHRUN_DEBUG")]
    pub debug: bool,

    /// Test script to run; reads stdin if omitted.
    pub script: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    Never,
    Always,
    Auto,
}

impl Cli {
    /// `--stop-at` only makes sense against a seekable script file; a
    /// script piped in on stdin can't be re-read for interactive resume.
    pub fn effective_stop_at(&self) -> Option<usize> {
        if self.script.is_none() {
            None
        } else {
            self.stop_at
        }
    }
}
