//! Lumo Stack - manage a local web-development stack from the command line.

mod args;

use std::fmt::Debug;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lumo_stack::config::Settings;
use lumo_stack::error::{StackError, StackResult, ValidationErrorKind};
use lumo_stack::php::FpmRestart;
use lumo_stack::services::{ServiceAction, ServiceKind};
use lumo_stack::sites::{ReloadOutcome, SiteUpdate, VirtualHost};
use lumo_stack::validation::PhpVersion;
use lumo_stack::Stack;

use args::{Cli, Commands, HostsCommands, PhpCommands, SiteCommands, XdebugCommands};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

/// Exit code when the user refused the authorization prompt.
const EXIT_DENIED: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);

    if matches!(cli.command, Commands::ConfigPath) {
        println!("{}", config_path.display());
        return ExitCode::SUCCESS;
    }

    let settings = match Settings::load_or_default(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!(config = %config_path.display(), "Starting {} v{}", NAME, VERSION);

    let result = Stack::from_settings(&settings).and_then(|stack| run(&stack, cli.command, cli.json));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(code = e.code(), error = %e, "Command failed");
            eprintln!("Error: {}", e);
            if e.is_denied() {
                ExitCode::from(EXIT_DENIED)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn invalid(param: &str, message: impl Into<String>) -> StackError {
    StackError::Validation {
        kind: ValidationErrorKind::InvalidParameter {
            param: param.to_string(),
            message: message.into(),
        },
    }
}

/// Lowercase name of a unit-like enum variant.
fn word<T: Debug>(value: T) -> String {
    format!("{:?}", value).to_lowercase()
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T) -> String) -> StackResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text(value));
    }
    Ok(())
}

fn site_line(site: &VirtualHost) -> String {
    format!(
        "{:<28} {:<9} php {:<5} {:<6} {}",
        site.hostname,
        if site.enabled { "enabled" } else { "disabled" },
        site.php_version.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
        if site.host_registered { "hosts" } else { "" },
        site.document_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
    )
}

fn reload_line(reload: &ReloadOutcome) -> String {
    match reload {
        ReloadOutcome::Reloaded => "web server reloaded".to_string(),
        ReloadOutcome::NotNeeded => "no reload needed".to_string(),
        ReloadOutcome::Skipped => "web server not running, reload skipped".to_string(),
        ReloadOutcome::Failed { error } => format!("web server reload failed: {}", error),
        ReloadOutcome::InvalidConfig { error } => {
            format!("configuration test failed, reload skipped: {}", error)
        }
    }
}

fn update_lines(update: &SiteUpdate) -> String {
    format!("{}\n{}", site_line(&update.site), reload_line(&update.reload))
}

/// Dispatch one command against the stack.
fn run(stack: &Stack, command: Commands, json: bool) -> StackResult<()> {
    match command {
        Commands::Services => emit(json, &stack.services().list(), |services| {
            services
                .iter()
                .map(|s| {
                    format!(
                        "{:<12} {:<8} {:<9} {:<22} {}",
                        s.kind.name(),
                        word(s.state.status),
                        word(s.state.enabled_at_boot),
                        s.unit,
                        s.version.as_deref().unwrap_or("")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }),
        Commands::Status { service } => emit(json, &stack.services().status(service)?, |state| {
            format!(
                "{}: {} ({} at boot)",
                service,
                word(state.status),
                word(state.enabled_at_boot)
            )
        }),
        Commands::Start { service } => apply(stack, ServiceAction::Start, service, json),
        Commands::Stop { service } => apply(stack, ServiceAction::Stop, service, json),
        Commands::Restart { service } => apply(stack, ServiceAction::Restart, service, json),
        Commands::Enable { service } => apply(stack, ServiceAction::Enable, service, json),
        Commands::Disable { service } => apply(stack, ServiceAction::Disable, service, json),
        Commands::Sites => emit(json, &stack.sites().list()?, |sites| {
            sites.iter().map(site_line).collect::<Vec<_>>().join("\n")
        }),
        Commands::Site { command } => run_site(stack, command, json),
        Commands::Hosts { command } => {
            let (host, changed) = match command {
                HostsCommands::Add { host } => {
                    let changed = stack.sites().register_host(&host)?;
                    (host, changed)
                }
                HostsCommands::Remove { host } => {
                    let changed = stack.sites().unregister_host(&host)?;
                    (host, changed)
                }
            };
            emit(json, &serde_json::json!({ "hostname": host, "changed": changed }), |_| {
                (if changed { "hosts file updated" } else { "hosts file unchanged" }).to_string()
            })
        }
        Commands::Php {
            command: PhpCommands::Versions,
        } => emit(json, &stack.php_versions()?, |versions| {
            versions
                .iter()
                .map(|p| {
                    format!(
                        "{}{:<6} {:<22} {}",
                        if p.is_default { "*" } else { " " },
                        p.version.to_string(),
                        p.fpm_unit,
                        p.binary.display()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        }),
        Commands::Xdebug { command } => run_xdebug(stack, command, json),
        Commands::Distro => {
            let profile = stack.profile();
            let resources = stack.resources()?;
            let report = serde_json::json!({
                "family": profile.family(),
                "layout": profile.layout(),
                "root": profile.root(),
                "default_php": profile.default_php(),
                "resources": &resources,
            });
            emit(json, &report, |_| {
                let mut lines = vec![format!(
                    "{} ({:?} layout, PHP {})",
                    profile.family(),
                    profile.layout(),
                    profile.default_php()
                )];
                lines.extend(resources.iter().map(|r| {
                    format!(
                        "  {:<28} {}",
                        r.resource,
                        r.value.as_deref().unwrap_or("unsupported")
                    )
                }));
                lines.join("\n")
            })
        }
        Commands::Watch => run_watch(stack, json),
        // Handled before the stack is built
        Commands::ConfigPath => Ok(()),
    }
}

fn apply(stack: &Stack, action: ServiceAction, kind: ServiceKind, json: bool) -> StackResult<()> {
    emit(json, &stack.services().apply(kind, action)?, |s| {
        format!("{}: {} after {}", s.kind, word(s.state.status), action)
    })
}

fn run_site(stack: &Stack, command: SiteCommands, json: bool) -> StackResult<()> {
    let sites = stack.sites();

    match command {
        SiteCommands::Create {
            host,
            docroot,
            php,
            enable,
            hosts,
        } => {
            let mut site = sites.create(&host, &docroot, php)?;
            if hosts {
                sites.register_host(&host)?;
                site = sites.get(&host)?;
            }
            if enable {
                return emit(json, &sites.set_enabled(&host, true)?, update_lines);
            }
            emit(json, &site, site_line)
        }
        SiteCommands::Show { host } => emit(json, &sites.get(&host)?, site_line),
        SiteCommands::Enable { host } => emit(json, &sites.set_enabled(&host, true)?, update_lines),
        SiteCommands::Disable { host } => {
            emit(json, &sites.set_enabled(&host, false)?, update_lines)
        }
        SiteCommands::Php { host, version } => {
            emit(json, &sites.set_php_version(&host, version)?, update_lines)
        }
        SiteCommands::Delete { host } => {
            let reload = sites.delete(&host)?;
            emit(json, &reload, |r| format!("{} deleted\n{}", host, reload_line(r)))
        }
    }
}

fn run_xdebug(stack: &Stack, command: XdebugCommands, json: bool) -> StackResult<()> {
    let (version, enabled) = match command {
        XdebugCommands::On { version } => (version, Some(true)),
        XdebugCommands::Off { version } => (version, Some(false)),
        XdebugCommands::Status { version } => (version, None),
    };
    let version: PhpVersion = version.unwrap_or_else(|| stack.profile().default_php());

    let Some(enabled) = enabled else {
        return match stack.xdebug().status(version)? {
            Some(state) => emit(json, &state, |s| {
                format!(
                    "xdebug for PHP {}: {} ({})",
                    s.php_version,
                    if s.enabled { "on" } else { "off" },
                    s.config_path.display()
                )
            }),
            None => emit(json, &serde_json::Value::Null, |_| {
                format!("xdebug is not installed for PHP {}", version)
            }),
        };
    };

    match stack.xdebug().set_enabled(version, enabled)? {
        Some(update) => emit(json, &update, |u| {
            format!(
                "xdebug for PHP {}: {}\nPHP-FPM: {}",
                u.state.php_version,
                if u.state.enabled { "on" } else { "off" },
                match &u.restart {
                    FpmRestart::Restarted => "restarted".to_string(),
                    FpmRestart::NotNeeded => "no restart needed".to_string(),
                    FpmRestart::Failed { error } => format!("restart failed: {}", error),
                }
            )
        }),
        None => Err(invalid(
            "version",
            format!("xdebug is not installed for PHP {}", version),
        )),
    }
}

/// Poll service state until interrupted, printing every change.
fn run_watch(stack: &Stack, json: bool) -> StackResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let poller = stack.poller();
        let (changes_tx, mut changes_rx) = mpsc::channel(32);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move { poller.run(changes_tx, shutdown_rx).await });
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                change = changes_rx.recv() => match change {
                    Some(change) => emit(json, &change, |c| {
                        format!("{}: {} -> {}", c.service, word(c.before.status), word(c.after.status))
                    })?,
                    None => break,
                },
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        let _ = shutdown_tx.send(true);
        if let Err(e) = task.await {
            error!(error = %e, "Poller task failed");
        }
        Ok::<(), StackError>(())
    })
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize logging based on settings.
///
/// Logs go to stderr so that command output on stdout stays parseable.
fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            // Default to pretty format
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
