//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Toolbelt utilities
#[derive(Debug, Parser)]
#[command(name = "toolbelt")]
#[command(author, version, about = "A belt of small network tools")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration directory
    #[arg(short, long, global = true, env = "TOOLBELT_CONFIG_DIR")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Open an interactive remote shell
    #[command(about = "Open an interactive SSH shell on a remote host")]
    Ssh(SshArgs),
}

#[derive(Debug, clap::Args)]
pub struct SshArgs {
    /// Host name or address
    #[arg(short = 'H', long, env = "TOOLBELT_SSH_HOST")]
    pub host: String,

    /// Port (defaults to the configured port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// User to log in as
    #[arg(short, long, env = "USER")]
    pub user: String,

    /// Authenticate with keys from the running SSH agent instead of a password
    #[arg(long)]
    pub agent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn ssh_arguments_parse() {
        let cli = parse(&[
            "toolbelt", "ssh", "--host", "db1", "--port", "2222", "--user", "ops", "--agent",
        ]);
        let Commands::Ssh(args) = cli.command;
        assert_eq!(args.host, "db1");
        assert_eq!(args.port, Some(2222));
        assert_eq!(args.user, "ops");
        assert!(args.agent);
    }

    #[test]
    fn config_dir_is_global() {
        let cli = parse(&["toolbelt", "ssh", "-H", "db1", "-u", "ops", "--config", "/tmp/tb"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/tb")));
    }

    #[test]
    fn rejects_bad_port() {
        assert!(Cli::try_parse_from(["toolbelt", "ssh", "-H", "db1", "-u", "ops", "-p", "70000"]).is_err());
    }
}
