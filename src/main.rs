//! PyLogChop CLI entry point (§6, §4.9)
//!
//! Thin `start`/`reload`/`quit` wiring around the `Supervisor`: daemonizing,
//! PID-file handling, and signal translation are external collaborators to
//! the core, not part of it (§1).

use anyhow::{Context, Result};
use daemonize::Daemonize;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{dup2, Pid};
use pylogchop::config::cli::{Cli, Command};
use pylogchop::supervisor::{self, Supervisor};
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let cli = Cli::parse_args();
    let result = match cli.command {
        Command::Start => cmd_start(&cli),
        Command::Reload => cmd_reload(&cli),
        Command::Quit => cmd_quit(&cli),
    };

    if let Err(err) = result {
        eprintln!("pylogchop: {err:#}");
        std::process::exit(1);
    }
}

/// `start`: daemonize (unless `--nodaemon`), write the PID file, redirect
/// stdout/stderr to `main.dlog_file`, install SIGHUP/SIGTERM handlers, then
/// bootstrap and run the Supervisor until quit (§6). Only the fork/detach
/// step is conditional on `--nodaemon` - the PID file and the stdout/stderr
/// redirection to `main.dlog_file` happen either way (§4.9).
fn cmd_start(cli: &Cli) -> Result<()> {
    let raw = pylogchop::config::ini::load(&cli.cfg).context("loading configuration")?;
    let main = pylogchop::config::validator::validate_main(&raw).context("validating [main]")?;

    let stdout = File::create(&main.dlog_file)
        .with_context(|| format!("opening {}", main.dlog_file.display()))?;
    let stderr = stdout.try_clone().context("cloning stdout handle for stderr")?;

    if cli.nodaemon {
        std::fs::write(&cli.pid, std::process::id().to_string())
            .with_context(|| format!("writing PID file {}", cli.pid.display()))?;
        redirect_stdio(&stdout, &stderr).context("redirecting stdout/stderr to dlog_file")?;
    } else {
        Daemonize::new()
            .pid_file(&cli.pid)
            .stdout(stdout)
            .stderr(stderr)
            .start()
            .map_err(|err| anyhow::anyhow!("failed to daemonize: {err}"))?;
    }

    let reload_flag = Arc::new(AtomicBool::new(false));
    let quit_flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGHUP, Arc::clone(&reload_flag))
        .context("installing SIGHUP handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&quit_flag))
        .context("installing SIGTERM handler")?;

    let mut supervisor = Supervisor::bootstrap(cli.cfg.clone()).context("starting PyLogChop")?;
    supervisor.run(&reload_flag, &quit_flag);

    let _ = std::fs::remove_file(&cli.pid);
    Ok(())
}

/// `reload`: read the PID file and send SIGHUP. Exit code `1` if the PID
/// file is absent (§6, §7).
fn cmd_reload(cli: &Cli) -> Result<()> {
    let pid = read_pid(&cli.pid)?;
    kill(pid, Signal::SIGHUP).with_context(|| format!("sending SIGHUP to pid {pid}"))?;
    Ok(())
}

/// `quit`: read the PID file, send SIGTERM, then poll until the PID file
/// disappears (§6, §7).
fn cmd_quit(cli: &Cli) -> Result<()> {
    let pid = read_pid(&cli.pid)?;
    kill(pid, Signal::SIGTERM).with_context(|| format!("sending SIGTERM to pid {pid}"))?;

    let pid_path = cli.pid.clone();
    let disappeared = supervisor::poll_until(|| !pid_path.exists(), Duration::from_secs(30));
    if !disappeared {
        anyhow::bail!("pid file {} still present after waiting for shutdown", cli.pid.display());
    }
    Ok(())
}

/// Duplicate `stdout`/`stderr`'s file descriptors onto the process's own
/// fd 1/2, without forking - the `--nodaemon` counterpart to what
/// `Daemonize::stdout`/`stderr` does as part of detaching (§4.9).
fn redirect_stdio(stdout: &File, stderr: &File) -> Result<()> {
    dup2(stdout.as_raw_fd(), 1).context("dup2 onto stdout")?;
    dup2(stderr.as_raw_fd(), 2).context("dup2 onto stderr")?;
    Ok(())
}

fn read_pid(pid_path: &Path) -> Result<Pid> {
    let text = std::fs::read_to_string(pid_path)
        .with_context(|| format!("pid file {} not found", pid_path.display()))?;
    let raw: i32 = text
        .trim()
        .parse()
        .with_context(|| format!("pid file {} does not contain a valid pid", pid_path.display()))?;
    Ok(Pid::from_raw(raw))
}
