//! Command-line surface, per spec.md §6: `profiler <command> [args...]`.
//! Grounded in the teacher crate's `samply/src/cli.rs` use of clap's derive
//! API, trimmed to the one subcommand this profiler supports.

use clap::Parser;

/// A sampling CPU profiler for a launched command on Linux.
#[derive(Parser, Debug)]
#[command(name = "profiler", version, about)]
pub struct Opt {
    /// The command to launch and profile.
    pub command: String,

    /// Arguments passed through to the launched command.
    pub args: Vec<String>,

    /// Sample period, in reference CPU cycles, between counter overflows.
    #[arg(long, default_value_t = 10_000_000)]
    pub sample_period: u64,
}

impl Opt {
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(1 + self.args.len());
        argv.push(self.command.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}
