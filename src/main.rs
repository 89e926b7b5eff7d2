use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use gmdex::index::{EntityKind, load_catalogs, stats};
use gmdex::output;
use gmdex::query::QueryEngine;
use gmdex::server::{ConnectionState, LoggingDispatcher, RelayClient, RelayServer, StaticSession};
use gmdex::utils::{AppConfig, get_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gmdex", version)]
#[command(about = "Search game item/map catalogs and relay admin commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to config.json in the app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build both catalogs and print their statistics
    Index {
        /// Derive enrichment from item XML again and rewrite the cache
        #[arg(long)]
        rebuild_cache: bool,
    },
    /// Print entities matching a query
    Search {
        /// Search maps instead of items
        #[arg(long)]
        maps: bool,

        /// Maximum results to print (0 = all)
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
        color: ColorMode,

        /// Instance argument for map commands
        #[arg(long, default_value = "0")]
        instance: String,

        /// Query tokens (prefix match, all must match)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        query: Vec<String>,
    },
    /// Show catalog statistics
    Stats {
        #[arg(long)]
        maps: bool,
    },
    /// Browse catalogs interactively and relay commands
    Browse {
        /// Session id commands are addressed to
        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Instance argument for map commands
        #[arg(long, default_value = "0")]
        instance: String,

        /// Connect to the relay on startup
        #[arg(long)]
        connect: bool,
    },
    /// Send one command to a relay server
    Send {
        #[arg(long)]
        session: String,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Command text, e.g. /item 00001001 1 1
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Run a development relay server that logs received commands
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Session ids to accept (repeatable)
        #[arg(long = "session")]
        sessions: Vec<String>,
    },
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorMode {
    Auto,
    Never,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let stored = AppConfig::load_stored(cli.config.as_deref())?;
    let mut config = stored.clone().with_env_overrides();

    // The browser owns the terminal; log output would corrupt it
    if !matches!(cli.command, Commands::Browse { .. }) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .target(env_logger::Target::Stderr)
            .init();
    }

    match cli.command {
        Commands::Index { rebuild_cache } => {
            if rebuild_cache {
                config.use_enrichment_cache = false;
            }
            let catalogs = load_catalogs(&config, false)?;
            stats::show_stats(&catalogs, EntityKind::Item);
            println!();
            stats::show_stats(&catalogs, EntityKind::Map);
        }
        Commands::Search {
            maps,
            limit,
            color,
            instance,
            query,
        } => {
            let kind = entity_kind(maps);
            let catalogs = load_catalogs(&config, true)?;
            let Some(catalog) = catalogs.get(kind) else {
                bail!("No {} catalog available", kind);
            };

            let result = QueryEngine::new(catalog).query(&query.join(" "));
            let shown = if limit == 0 {
                result.len()
            } else {
                limit.min(result.len())
            };
            output::print_entities(result.iter().take(shown), color == ColorMode::Auto, &instance)?;
            output::print_summary(shown, result.len())?;
        }
        Commands::Stats { maps } => {
            let catalogs = load_catalogs(&config, true)?;
            stats::show_stats(&catalogs, entity_kind(maps));
        }
        Commands::Browse {
            session,
            host,
            port,
            instance,
            connect,
        } => {
            apply_endpoint(&mut config, host, port);
            browse(config, session, instance, connect)?;
        }
        Commands::Send {
            session,
            host,
            port,
            command,
        } => {
            apply_endpoint(&mut config, host, port);
            let relay = &config.relay;

            let mut client = RelayClient::new(relay);
            if client.connect(&relay.host, relay.port) != ConnectionState::Connected {
                bail!("Could not connect to relay {}:{}", relay.host, relay.port);
            }
            let command = command.join(" ");
            client.send(&session, &command)?;
            println!("Sent {}*{}", session, command);
        }
        Commands::Serve {
            host,
            port,
            sessions,
        } => {
            apply_endpoint(&mut config, host, port);
            serve(&config, sessions)?;
        }
        Commands::Config { init } => {
            // Environment overrides are not persisted
            if init {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => get_config_path()?,
                };
                stored.save_to(&path)?;
                println!("Wrote {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn entity_kind(maps: bool) -> EntityKind {
    if maps { EntityKind::Map } else { EntityKind::Item }
}

fn apply_endpoint(config: &mut AppConfig, host: Option<String>, port: Option<u16>) {
    if let Some(host) = host {
        config.relay.host = host;
    }
    if let Some(port) = port {
        config.relay.port = port;
    }
}

#[cfg(feature = "interactive")]
fn browse(config: AppConfig, session: Option<String>, instance: String, connect: bool) -> Result<()> {
    let options = gmdex::tui::BrowseOptions {
        session_id: session,
        host: config.relay.host.clone(),
        port: config.relay.port,
        map_instance: instance,
        auto_connect: connect,
    };
    gmdex::tui::run(config, options)
}

#[cfg(not(feature = "interactive"))]
fn browse(_config: AppConfig, _session: Option<String>, _instance: String, _connect: bool) -> Result<()> {
    bail!("gmdex was built without the `interactive` feature")
}

fn serve(config: &AppConfig, sessions: Vec<String>) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&stop))
        .context("Failed to register SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&stop))
        .context("Failed to register SIGTERM handler")?;

    let server = RelayServer::<StaticSession>::start(&config.relay, LoggingDispatcher)?;
    for session in sessions {
        log::info!("Accepting session {}", session);
        server.register_session(session.clone(), StaticSession::new(session));
    }

    while !stop.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(200));
    }

    let status = server.status();
    server.shutdown();
    log::info!(
        "Served {} connections, {} commands, {} dropped, {} failed",
        status.connections_accepted,
        status.commands_dispatched,
        status.messages_dropped,
        status.dispatch_failures
    );
    Ok(())
}
