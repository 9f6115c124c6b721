use clap::{ArgAction, Parser, Subcommand};
use lease::LockConfig;

use crate::prelude::{DEFAULT_HOLD_MS, DEFAULT_KEY, DEFAULT_STORE, DEFAULT_WORKERS};

#[derive(Parser, Debug)]
#[command(name = "leasehold", version, about, long_about = None)]
pub struct Cli {
    /// Lease store address: a redis:// URL, or `memory` for an in-process store
    #[arg(long, env = "LEASEHOLD_STORE", default_value = DEFAULT_STORE, global = true)]
    pub store: String,

    /// Lease time-to-live in seconds
    #[arg(long = "ttl", env = "LEASEHOLD_TTL_SECS", default_value_t = 5, global = true)]
    pub ttl_secs: u64,

    /// Give up acquiring after this many seconds [default: 2 x ttl]
    #[arg(long = "max-wait", env = "LEASEHOLD_MAX_WAIT_SECS", global = true)]
    pub max_wait_secs: Option<u64>,

    /// Milliseconds between acquisition attempts [default: ttl / 50, at least 20]
    #[arg(long = "poll-ms", env = "LEASEHOLD_POLL_MS", global = true)]
    pub poll_ms: Option<u64>,

    /// Verbose mode (-v, -vv, -vvv)
    #[arg(short, action = ArgAction::Count, global = true)]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            ttl_secs: self.ttl_secs,
            max_wait_secs: self.max_wait_secs,
            poll_ms: self.poll_ms,
        }
    }
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Runs concurrent workers against one key and checks the shared counter
    Contend {
        #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
        /// Time each worker spends inside the critical section
        #[arg(long, default_value_t = DEFAULT_HOLD_MS)]
        hold_ms: u64,
        #[arg(short, long, default_value = DEFAULT_KEY)]
        key: String,
        /// Delete any lease left on the key before starting
        #[arg(long)]
        reset: bool,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Acquires a key, holds it for a while, then releases it
    Hold {
        #[arg(short, long, default_value = DEFAULT_KEY)]
        key: String,
        #[arg(long, default_value_t = DEFAULT_HOLD_MS)]
        hold_ms: u64,
    },
}
