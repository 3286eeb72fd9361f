// # Command line surface
//
// `fwsync` keeps a cloud firewall allow-list in step with the public IP you
// are connecting from. Every invocation is one-shot; run `fwsync update` from
// a shell profile, a cron job or a network hook.

use clap::{Parser, Subcommand};
use fwsync_core::DEFAULT_IP_LIMIT;
use fwsync_ip_http::DEFAULT_IP_URL;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "fwsync",
    version,
    about = "A CLI utility to keep your development VM firewall up to date.",
    long_about = "fwsync uses a local file to keep track of the latest IP addresses you've been \
connecting from and keeps your development VM firewall rule up to date with that list."
)]
pub struct Cli {
    /// Path of the local record [default: ~/.fwsync]
    #[clap(long, global = true, env = "FWSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Endpoint answering with your public IP as plain text
    #[clap(long, global = true, env = "FWSYNC_IP_URL", default_value = DEFAULT_IP_URL, hide = true)]
    pub ip_url: String,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize fwsync configuration.
    Init(InitArgs),

    /// Allow a new IP on the firewall.
    #[clap(alias = "add")]
    Update,

    /// Push the local IP list to the firewall.
    Sync,

    /// Display your firewall's allowed IPs.
    List,

    /// Fetches your current public IP.
    GetIp,

    /// Display version information.
    Version,
}

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Cloud provider (google, linode)
    #[clap(long)]
    pub provider: String,

    /// Cloud project (required for google)
    #[clap(long)]
    pub project: Option<String>,

    /// Number of recent IPs to keep allowed
    #[clap(long, default_value_t = DEFAULT_IP_LIMIT)]
    pub ip_limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_add_is_alias_of_update() {
        let cli = Cli::try_parse_from(["fwsync", "add"]).unwrap();
        assert!(matches!(cli.command, Commands::Update));
    }

    #[test]
    fn test_init_defaults() {
        let cli = Cli::try_parse_from(["fwsync", "init", "--provider", "linode"]).unwrap();
        match cli.command {
            Commands::Init(args) => {
                assert_eq!(args.provider, "linode");
                assert_eq!(args.project, None);
                assert_eq!(args.ip_limit, 5);
            }
            other => panic!("expected init, got {:?}", other),
        }
    }

    #[test]
    fn test_init_requires_provider() {
        assert!(Cli::try_parse_from(["fwsync", "init"]).is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["fwsync", "list", "--config", "/tmp/record"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/record")));
    }
}
