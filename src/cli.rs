use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gatesync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative configuration sync for API gateways", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub gateway: GatewayArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection settings shared by every command
#[derive(Args, Debug, Default)]
pub struct GatewayArgs {
    /// Admin API base URL
    #[arg(long, env = "GATESYNC_ADMIN_URL", global = true)]
    pub admin_url: Option<String>,

    /// Extra request header, as `Name:Value` (repeatable)
    #[arg(long = "header", value_name = "NAME:VALUE", global = true)]
    pub headers: Vec<String>,

    /// Only manage entities carrying this tag (repeatable)
    #[arg(long = "select-tag", value_name = "TAG", global = true)]
    pub select_tags: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the changes a sync would make
    Diff(StateArgs),

    /// Make the gateway match the declarative state
    Sync(SyncArgs),

    /// Write the current gateway state to a file
    Dump {
        /// Output file; the format follows the extension (.json or .toml)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Check declarative state without contacting the gateway
    Validate(StateArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct StateArgs {
    /// Declarative state file or directory
    #[arg(short, long)]
    pub state: PathBuf,
}

#[derive(Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Apply without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Number of parallel gateway calls
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Stop starting new changes after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync_with_globals() {
        let cli = Cli::try_parse_from([
            "gatesync",
            "sync",
            "-s",
            "kong.toml",
            "--yes",
            "--jobs",
            "8",
            "--header",
            "Kong-Admin-Token:secret",
            "--select-tag",
            "team-a",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.gateway.headers, ["Kong-Admin-Token:secret"]);
        assert_eq!(cli.gateway.select_tags, ["team-a"]);
        match cli.command {
            Command::Sync(args) => {
                assert_eq!(args.state.state, PathBuf::from("kong.toml"));
                assert!(args.yes);
                assert_eq!(args.jobs, Some(8));
                assert_eq!(args.timeout, None);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_state_is_required() {
        assert!(Cli::try_parse_from(["gatesync", "diff"]).is_err());
    }
}
