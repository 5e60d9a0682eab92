//! filegate operator CLI
//!
//! Inspects the trust store and exercises the gatekeeper from the shell.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gatekeeper::audit::AUDIT_TARGET;
use gatekeeper::auth::LocalFs;
use gatekeeper::config::Config;
use gatekeeper::identity::{fingerprint, PublicKeyEntry};
use gatekeeper::{
    Authenticator, Credentials, PathDecision, PathGuard, TracingAuditSink, TrustStoreReader,
};
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// filegate - access-control gatekeeper for a file-browsing service.
#[derive(Parser, Debug)]
#[command(name = "filegate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the fingerprint of a public key line or bare base64 key blob
    Fingerprint {
        /// Key line (`<type> <base64> [comment]`) or base64 blob
        #[arg(required = true, num_args = 1..)]
        key: Vec<String>,
    },

    /// List the keys in the trust store
    Keys {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Verify a key against the trust store and print a session token
    Login {
        /// Key line (`<type> <base64> [comment]`)
        #[arg(required = true, num_args = 1..)]
        key: Vec<String>,
    },

    /// Resolve a session token to a user
    Whoami {
        /// Session token
        token: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run a path through the access-control pipeline
    Check {
        /// Path as a client would send it
        path: String,

        /// Session token identifying the acting user
        #[arg(long, short)]
        token: Option<String>,

        /// Apply the directory listing gate instead of a plain path check
        #[arg(long)]
        list: bool,
    },

    /// Print the effective configuration
    Config,
}

/// A trust store line as shown by `filegate keys`.
#[derive(Debug, Serialize)]
struct KeyListing {
    line: usize,
    key_type: String,
    fingerprint: String,
    comment: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => Config::load(config_path)?,
        None => Config::load_default()?,
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    // Validate configuration
    config.validate()?;

    // Initialize tracing; the guard flushes the audit file on exit
    let _audit_guard = init_tracing(cli.verbose, &config)?;

    if let Some(config_path) = &cli.config {
        tracing::debug!("Using config file: {:?}", config_path);
    }

    let keys_path = config.authorized_keys_path();

    match cli.command {
        Commands::Fingerprint { key } => {
            let key = key.join(" ");
            let fp = if key.split_whitespace().count() > 1 {
                PublicKeyEntry::parse_line(&key)?.fingerprint
            } else {
                fingerprint(&key)?
            };
            println!("{}", fp);
        }
        Commands::Keys { json } => {
            let keys = TrustStoreReader::new(LocalFs)
                .load_entries(&keys_path)
                .with_context(|| format!("Failed to load trust store: {}", keys_path.display()))?;

            let mut listings = Vec::new();
            let mut malformed = 0usize;
            for (line, parsed) in keys.scan() {
                match parsed {
                    Ok(entry) => listings.push(KeyListing {
                        line,
                        key_type: entry.key_type,
                        fingerprint: entry.fingerprint.to_string(),
                        comment: entry.comment,
                    }),
                    Err(e) => {
                        tracing::warn!("Malformed trust store line {}: {}", line, e);
                        malformed += 1;
                    }
                }
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&listings)?);
            } else if listings.is_empty() {
                println!("No keys in {}", keys_path.display());
            } else {
                println!("Authorized keys ({}):", keys_path.display());
                for listing in &listings {
                    println!(
                        "  {:>4}  {}  {:<12} {}",
                        listing.line, listing.fingerprint, listing.key_type, listing.comment
                    );
                }
            }
            if malformed > 0 {
                eprintln!("{} malformed line(s) skipped", malformed);
            }
        }
        Commands::Login { key } => {
            let key = key.join(" ");
            let auth = authenticator(&config);
            match auth.verify(&key, &keys_path) {
                Some(user) => {
                    let token = auth.issue_token(&key)?;
                    eprintln!("Authenticated as {} ({})", user.username, user.fingerprint);
                    println!("{}", token);
                }
                None => {
                    eprintln!("Authentication failed");
                    std::process::exit(1);
                }
            }
        }
        Commands::Whoami { token, json } => {
            let auth = authenticator(&config);
            match auth.authenticate(&Credentials::SessionToken(&token), &keys_path) {
                Some(user) if json => println!("{}", serde_json::to_string_pretty(&user)?),
                Some(user) => {
                    println!("User:        {}", user.username);
                    println!("ID:          {}", user.id);
                    println!("Fingerprint: {}", user.fingerprint);
                }
                None => {
                    eprintln!("Not authenticated");
                    std::process::exit(1);
                }
            }
        }
        Commands::Check { path, token, list } => {
            let audit = Arc::new(TracingAuditSink);
            let user = token.as_deref().and_then(|token| {
                authenticator(&config)
                    .authenticate(&Credentials::SessionToken(token), &keys_path)
            });
            let guard = PathGuard::with_policy(config.root(), config.guard_policy(), audit)?;

            if list {
                if guard.can_list_directory(&path, user.as_ref()) {
                    println!("listing allowed");
                } else {
                    eprintln!("access denied");
                    std::process::exit(1);
                }
            } else {
                match guard.resolve(&path, user.as_ref()) {
                    PathDecision::Allow(resolved) => println!("{}", resolved.display()),
                    PathDecision::Deny(_) => {
                        eprintln!("access denied");
                        std::process::exit(1);
                    }
                }
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn authenticator(config: &Config) -> Authenticator {
    Authenticator::new(Arc::new(TracingAuditSink)).with_token_policy(config.token_policy())
}

/// Installs the console subscriber and, if configured, the audit file layer.
///
/// `RUST_LOG` wins over `--verbose`, which wins over the configured level.
fn init_tracing(verbose: bool, config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let default_level = if verbose {
        "debug"
    } else {
        config.logging.log_level.as_str()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let (audit_layer, guard) = match &config.logging.audit_log {
        Some(path) => {
            let (writer, guard) = audit_writer(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(audit_layer)
        .init();

    Ok(guard)
}

fn audit_writer(
    path: &Path,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("Audit log path has no file name: {}", path.display()))?;

    fs::create_dir_all(&directory).with_context(|| {
        format!("Failed to create audit log directory: {}", directory.display())
    })?;

    let appender = tracing_appender::rolling::never(&directory, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
