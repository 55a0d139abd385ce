//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rule-driven automation agent: evaluates rule groups against game state snapshots.
#[derive(Parser, Debug)]
#[command(name = "reagent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write default settings with one empty profile.
    Init(InitArgs),

    /// Compile every rule of a profile and report failures.
    Check(CheckArgs),

    /// Show profiles, groups and rule counts.
    Status(StatusArgs),

    /// Drive ticks against world snapshots and print each tick's output as JSON.
    Run(RunArgs),
}

/// Arguments for the init command.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Only initialize if not already initialized.
    #[arg(long)]
    pub if_needed: bool,

    /// Settings file to write instead of the default location.
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

/// Arguments for the check command.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Settings file to read instead of the default location.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Profile to check; defaults to the current profile.
    #[arg(long)]
    pub profile: Option<String>,
}

/// Arguments for the status command.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Settings file to read instead of the default location.
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// JSON file holding one world snapshot or an array of them, one per tick.
    #[arg(long)]
    pub snapshot: PathBuf,

    /// Settings file to read instead of the default location.
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Profile to run; defaults to the current profile.
    #[arg(long)]
    pub profile: Option<String>,

    /// Stop after this many ticks; runs until interrupted when omitted.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Time between ticks in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "reagent",
            "run",
            "--snapshot",
            "world.json",
            "--ticks",
            "3",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.snapshot, PathBuf::from("world.json"));
        assert_eq!(args.ticks, Some(3));
        assert_eq!(args.interval_ms, 100);
        assert!(args.profile.is_none());
    }
}
