//! Command-line interface, built on clap.
//!
//! Defines the [`Cli`] struct with subcommands [`Command`] (serve,
//! terminate, targets) and global flags (--config, --verbose).

use clap::{Parser, Subcommand, ValueEnum};

use crate::job::RelyingParty;

/// sesterm — cross-relying-party session termination orchestrator.
#[derive(Debug, Parser)]
#[command(name = "sesterm", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "sesterm.toml")]
    pub config: String,

    /// Enable verbose (debug-level) logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Relying party accepted on the command line, mapped to
/// [`RelyingParty`](crate::job::RelyingParty) internally.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RpArg {
    Sso,
    Gsuite,
    Slack,
    Aws,
    Gcp,
}

impl From<RpArg> for RelyingParty {
    fn from(arg: RpArg) -> Self {
        match arg {
            RpArg::Sso => RelyingParty::Sso,
            RpArg::Gsuite => RelyingParty::Gsuite,
            RpArg::Slack => RelyingParty::Slack,
            RpArg::Aws => RelyingParty::Aws,
            RpArg::Gcp => RelyingParty::Gcp,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API server.
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8080. Overrides the config file.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Terminate sessions for the given users and wait for convergence.
    Terminate {
        /// Email addresses of the users whose sessions should be terminated.
        #[arg(required = true)]
        usernames: Vec<String>,

        /// Relying parties to terminate sessions for. Defaults to all.
        #[arg(long = "rp", value_enum)]
        rps: Vec<RpArg>,
    },

    /// List supported relying parties and whether each one is configured.
    Targets,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_serve_subcommand() {
        let cli = Cli::parse_from(["sesterm", "serve", "--bind", "0.0.0.0:9000"]);
        match cli.command {
            Command::Serve { bind } => assert_eq!(bind.unwrap(), "0.0.0.0:9000"),
            _ => panic!("expected Serve command"),
        }
        assert_eq!(cli.config, "sesterm.toml");
    }

    #[test]
    fn cli_parses_terminate_with_relying_parties() {
        let cli = Cli::parse_from([
            "sesterm",
            "terminate",
            "a@x.com",
            "b@x.com",
            "--rp",
            "sso",
            "--rp",
            "slack",
        ]);
        match cli.command {
            Command::Terminate { usernames, rps } => {
                assert_eq!(usernames, vec!["a@x.com", "b@x.com"]);
                assert_eq!(rps.len(), 2);
                assert!(matches!(rps[0], RpArg::Sso));
                assert!(matches!(rps[1], RpArg::Slack));
            }
            _ => panic!("expected Terminate command"),
        }
    }

    #[test]
    fn cli_requires_at_least_one_username() {
        assert!(Cli::try_parse_from(["sesterm", "terminate"]).is_err());
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "sesterm",
            "--config",
            "/etc/sesterm/prod.toml",
            "--verbose",
            "targets",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, "/etc/sesterm/prod.toml");
        assert!(matches!(cli.command, Command::Targets));
    }

    #[test]
    fn rp_args_map_onto_the_closed_set() {
        for (arg, expected) in [
            (RpArg::Sso, RelyingParty::Sso),
            (RpArg::Gsuite, RelyingParty::Gsuite),
            (RpArg::Slack, RelyingParty::Slack),
            (RpArg::Aws, RelyingParty::Aws),
            (RpArg::Gcp, RelyingParty::Gcp),
        ] {
            assert_eq!(RelyingParty::from(arg), expected);
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
