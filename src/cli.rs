use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "posturecheck",
    version,
    about = "Endpoint security posture checker"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Config file (default: <local data dir>/posturecheck/config.json)"
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        default_value_t = 30,
        help = "Timeout for each external command"
    )]
    pub timeout: u64,
    #[arg(long, short, global = true, conflicts_with = "quiet", help = "Debug logging")]
    pub verbose: bool,
    #[arg(long, short, global = true, help = "Only log warnings and errors")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every probe and print the security report.
    Scan {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long, default_value_t = false, help = "Do not record the report date")]
        no_record: bool,
    },
    /// Run a single probe.
    Check {
        #[arg(value_enum)]
        probe: ProbeKind,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Report whether a new scan is due.
    Status,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    Show,
    Set {
        #[arg(long, action = clap::ArgAction::Set, value_name = "BOOL")]
        keep_in_background: Option<bool>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeKind {
    Antivirus,
    Encryption,
    ScreenLock,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn set_takes_explicit_bool() {
        let cli = Cli::try_parse_from([
            "posturecheck",
            "config",
            "set",
            "--keep-in-background",
            "false",
        ])
        .unwrap();
        match cli.command {
            Commands::Config {
                command: ConfigCommands::Set { keep_in_background },
            } => assert_eq!(keep_in_background, Some(false)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["posturecheck", "check", "screen-lock", "--timeout", "5"])
                .unwrap();
        assert_eq!(cli.timeout, 5);
        assert!(matches!(
            cli.command,
            Commands::Check {
                probe: ProbeKind::ScreenLock
            }
        ));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["posturecheck", "-v", "-q", "status"]).is_err());
    }
}
