use std::path::PathBuf;

use crate::cli::{Cli, ColorChoice as CliColorChoice};
use crate::report::Palette;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChoice {
    Never,
    Always,
    Auto,
}

/// The engine's configuration, assembled once from the CLI and threaded by
/// reference into every core function instead of living in process
/// globals the way the original's `opt_*` variables did.
#[derive(Debug, Clone)]
pub struct Options {
    pub shell: PathBuf,
    pub timeout: u64,
    pub stop_at: Option<usize>,
    pub color: ColorChoice,
    pub forward_stderr: bool,
}

impl Options {
    pub fn from_cli(cli: &Cli) -> Self {
        let color = match cli.color {
            CliColorChoice::Never => ColorChoice::Never,
            CliColorChoice::Always => ColorChoice::Always,
            CliColorChoice::Auto => ColorChoice::Auto,
        };
        Options {
            shell: cli.shell.clone(),
            timeout: cli.timeout,
            stop_at: cli.effective_stop_at(),
            color,
            forward_stderr: !cli.no_stderr,
        }
    }

    /// Resolves `--color` against whether stdout is currently a TTY.
    pub fn palette(&self, stdout_is_tty: bool) -> Palette {
        let colorize = match self.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => stdout_is_tty,
        };
        if colorize {
            Palette::colored()
        } else {
            Palette::plain()
        }
    }
}
