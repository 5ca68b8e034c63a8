use std::path::PathBuf;

use clap::{Parser, Subcommand};

use lumo_stack::services::ServiceKind;
use lumo_stack::validation::PhpVersion;

#[derive(Parser)]
#[command(name = "lumo-stack")]
#[command(version)]
#[command(
    about = "Manage a local web-development stack: services, nginx sites, hosts entries and xdebug",
    long_about = None
)]
pub(crate) struct Cli {
    /// Path to configuration file (default: the per-user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// List discovered services
    Services,

    /// Show the live state of a service
    Status { service: ServiceKind },

    /// Start a service
    Start { service: ServiceKind },

    /// Stop a service
    Stop { service: ServiceKind },

    /// Restart a service
    Restart { service: ServiceKind },

    /// Start a service at boot
    Enable { service: ServiceKind },

    /// Stop starting a service at boot
    Disable { service: ServiceKind },

    /// List virtual hosts
    Sites,

    /// Manage one virtual host
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },

    /// Add or remove a hosts-file entry
    Hosts {
        #[command(subcommand)]
        command: HostsCommands,
    },

    /// Installed PHP versions
    Php {
        #[command(subcommand)]
        command: PhpCommands,
    },

    /// Toggle xdebug for a PHP version
    Xdebug {
        #[command(subcommand)]
        command: XdebugCommands,
    },

    /// Show the detected distribution and its paths
    Distro,

    /// Print service state changes until interrupted
    Watch,

    /// Print the configuration file path
    ConfigPath,
}

#[derive(Subcommand)]
pub(crate) enum SiteCommands {
    /// Show one virtual host
    Show { host: String },

    /// Create a virtual host (disabled unless --enable)
    Create {
        host: String,

        /// Document root, created when missing
        docroot: String,

        /// PHP version to bind (default: the distribution's default)
        #[arg(long)]
        php: Option<PhpVersion>,

        /// Enable the site and reload the web server
        #[arg(long)]
        enable: bool,

        /// Add a hosts-file entry for the site
        #[arg(long)]
        hosts: bool,
    },

    /// Enable a virtual host
    Enable { host: String },

    /// Disable a virtual host
    Disable { host: String },

    /// Bind a virtual host to a PHP version
    Php { host: String, version: PhpVersion },

    /// Disable, unregister and remove a virtual host
    Delete { host: String },
}

#[derive(Subcommand)]
pub(crate) enum HostsCommands {
    /// Map a hostname to the configured address
    Add { host: String },

    /// Drop a hostname's entry
    Remove { host: String },
}

#[derive(Subcommand)]
pub(crate) enum PhpCommands {
    /// List installed PHP versions
    Versions,
}

#[derive(Subcommand)]
pub(crate) enum XdebugCommands {
    /// Load xdebug (default PHP version if omitted)
    On { version: Option<PhpVersion> },

    /// Stop loading xdebug
    Off { version: Option<PhpVersion> },

    /// Show whether xdebug is loaded
    Status { version: Option<PhpVersion> },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("lumo-stack").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_site_create_flags_in_any_order() {
        let cli = parse(&["site", "create", "a.test", "--php", "8.2", "/srv/a", "--hosts"]);
        match cli.command {
            Commands::Site {
                command:
                    SiteCommands::Create {
                        host,
                        docroot,
                        php,
                        enable,
                        hosts,
                    },
            } => {
                assert_eq!(host, "a.test");
                assert_eq!(docroot, "/srv/a");
                assert_eq!(php, Some(PhpVersion::new(8, 2)));
                assert!(!enable);
                assert!(hosts);
            }
            _ => panic!("expected site create"),
        }
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = parse(&["restart", "nginx", "--json", "-c", "/tmp/lumo.toml"]);
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/lumo.toml")));
        assert!(matches!(
            cli.command,
            Commands::Restart {
                service: ServiceKind::Nginx
            }
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bare = |args: &[&str]| {
            Cli::try_parse_from(std::iter::once("lumo-stack").chain(args.iter().copied()))
        };
        assert!(bare(&["status", "apache-tomcat"]).is_err());
        assert!(bare(&["site", "php", "a.test", "eight"]).is_err());
        assert!(bare(&["site", "create", "a.test"]).is_err());
        assert!(matches!(
            parse(&["xdebug", "status"]).command,
            Commands::Xdebug {
                command: XdebugCommands::Status { version: None }
            }
        ));
    }
}
