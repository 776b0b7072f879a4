//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

fn default_cfg() -> PathBuf {
    PathBuf::from("/etc/pylogchop/pylogchop.ini")
}

fn default_pid() -> PathBuf {
    PathBuf::from("/var/run/pylogchop.pid")
}

/// PyLogChop - tails log files and ships structured records to syslog
#[derive(Parser, Debug)]
#[command(name = "pylogchop")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Full path to configuration file
    #[arg(long, default_value_os_t = default_cfg())]
    pub cfg: PathBuf,

    /// Full path to PID file
    #[arg(long, default_value_os_t = default_pid())]
    pub pid: PathBuf,

    /// Do not daemonize, run in foreground
    #[arg(long)]
    pub nodaemon: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start PyLogChop
    Start,
    /// Reload the running daemon's configuration
    Reload,
    /// Stop the running daemon
    Quit,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
