use std::fs::File;
use std::os::fd::AsRawFd;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser as ClapParser;
use log::error;
use nix::unistd::AccessFlags;

use shrun::cli::Cli;
use shrun::error::ShrunError;
use shrun::options::Options;
use shrun::{pty, signal, Engine};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(&cli) {
        Ok(all_passed) => {
            if all_passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            error!("{err:#}");
            eprintln!("shrun: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(debug: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if debug && std::env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    check_shell_executable(&cli.shell)
        .with_context(|| format!("shell {:?} is not executable", cli.shell))?;

    let options = Options::from_cli(cli);

    let script_file;
    let script_fd = match &cli.script {
        Some(path) => {
            script_file = File::open(path).with_context(|| format!("opening script {path:?}"))?;
            script_file.as_raw_fd()
        }
        None => libc::STDIN_FILENO,
    };

    signal::install().context("installing signal handlers")?;

    let child =
        pty::spawn_shell(&options.shell, options.forward_stderr).context("spawning shell")?;
    let term = pty::setup_terminal(child.ptm.as_raw_fd()).context("configuring pty termios")?;

    let stdout_is_tty = unsafe { libc::isatty(libc::STDOUT_FILENO) } != 0;
    let palette = options.palette(stdout_is_tty);

    let mut engine = Engine::new(options, palette);
    let mut stdout = std::io::stdout().lock();

    // `Engine::run` has already printed its own red diagnostic line for any
    // of these outcomes (timeout, signal, protocol/I/O failure); nothing
    // left to add here beyond the exit code.
    Ok(engine
        .run(script_fd, &child, term, &mut stdout)
        .map(|tally| tally.all_passed())
        .unwrap_or(false))
}

fn check_shell_executable(shell: &std::path::Path) -> Result<(), ShrunError> {
    nix::unistd::access(shell, AccessFlags::X_OK).map_err(|errno| ShrunError::ShellNotExecutable {
        path: shell.to_path_buf(),
        source: std::io::Error::from_raw_os_error(errno as i32),
    })
}
