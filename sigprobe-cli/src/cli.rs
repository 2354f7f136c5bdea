//! Command-line arguments

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sigprobe::opener::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use sigprobe::probe::DEFAULT_PROBE_TIMEOUT;
use sigprobe::{ProbeConfig, RetryPolicy};

/// Find serial devices by sending them a probe and checking the reply
#[derive(Debug, Parser)]
#[command(name = "sigscan", version)]
pub struct Cli {
    /// Log retries, filter decisions and received bytes
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Probe response deadline in milliseconds
    #[arg(long, global = true, default_value_t = DEFAULT_PROBE_TIMEOUT.as_millis() as u64)]
    pub timeout_ms: u64,

    /// Delay between attempts on a locked port, in milliseconds
    #[arg(long, global = true, default_value_t = DEFAULT_RETRY_DELAY.as_millis() as u64)]
    pub retry_delay_ms: u64,

    /// Open attempts on a locked port before giving up
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub attempts: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List serial ports, optionally only those passing a spec's filter
    List {
        /// JSON probe spec whose filter selects ports
        #[arg(long)]
        spec: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Probe every matching port and report those that answer
    Scan {
        /// JSON probe spec
        #[arg(long)]
        spec: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Open a single port and check that it answers
    Open {
        /// Port path, e.g. /dev/ttyUSB0 or COM3
        path: String,
        /// JSON probe spec
        #[arg(long)]
        spec: PathBuf,
    },
}

impl Cli {
    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            retry: RetryPolicy {
                delay: Duration::from_millis(self.retry_delay_ms),
                max_attempts: self.attempts,
            },
            probe_timeout: Duration::from_millis(self.timeout_ms),
            debug: self.verbose,
        }
    }
}
