use clap::{Parser, Subcommand};
use varflow::config::Config;
use varflow::resolver::loader::load_graph_from_yaml;
use varflow::resolver::{build_request_payload, resolve_display};
use varflow::runtime::dispatcher::{Dispatcher, Resolution};
use varflow::runtime::session::{SessionManager, StaticToken};
use varflow::runtime::store::VariableStore;
use varflow::variables::{Variable, VariableGraph};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the display form of a variable
    Display {
        /// Path to the variable graph YAML file
        #[arg(long, short)]
        file: PathBuf,

        /// Uid of the variable to resolve
        #[arg(long, short = 'V')]
        variable: String,

        /// Plain variable values (uid=value)
        #[arg(long, short = 'D', value_parser = parse_key_val)]
        vars: Vec<(String, Value)>,
    },

    /// Print the request payload and cache key of a derived variable
    Payload {
        #[arg(long, short)]
        file: PathBuf,

        #[arg(long, short = 'V')]
        variable: String,

        #[arg(long, short = 'D', value_parser = parse_key_val)]
        vars: Vec<(String, Value)>,
    },

    /// Resolve a derived variable against the execution service
    Resolve {
        #[arg(long, short)]
        file: PathBuf,

        #[arg(long, short = 'V')]
        variable: String,

        #[arg(long, short = 'D', value_parser = parse_key_val)]
        vars: Vec<(String, Value)>,

        /// Seconds to wait for the result
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

fn parse_key_val(s: &str) -> Result<(String, Value), String> {
    let pos = s.find('=').ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    let key = s[..pos].to_string();
    let val_str = &s[pos + 1..];
    // Try parsing as JSON, otherwise treat as string
    let val = serde_json::from_str(val_str).unwrap_or_else(|_| Value::String(val_str.to_string()));
    Ok((key, val))
}

fn load(file: &Path, uid: &str, vars: Vec<(String, Value)>) -> Result<(Variable, Arc<VariableStore>)> {
    let graph: VariableGraph = load_graph_from_yaml(file)?;
    let variable = graph
        .get(uid)
        .cloned()
        .ok_or_else(|| anyhow!("Variable {} not found in {}", uid, file.display()))?;

    let store = Arc::new(VariableStore::new());
    for (k, v) in vars {
        store.set(&k, v);
    }
    Ok((variable, store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Display { file, variable, vars } => {
            let (variable, store) = load(&file, &variable, vars)?;
            let resolved = resolve_display(&variable, store.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }

        Commands::Payload { file, variable, vars } => {
            let (variable, store) = load(&file, &variable, vars)?;
            let payload = build_request_payload(&variable, store.as_ref())?;
            let cache_key = payload.cache_key()?;
            let output = json!({ "payload": payload, "cache_key": cache_key });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Resolve { file, variable, vars, timeout } => {
            let (variable, store) = load(&file, &variable, vars)?;
            let service = Arc::new(config.execution_service()?);
            let tokens = Arc::new(StaticToken(config.remote.session_token.clone()));

            let sessions = SessionManager::new(service.clone(), tokens);
            let session = sessions.open();
            let _push = session.listen();
            let cache = config.result_cache(&session.ws_channel)?;

            let dispatcher = Dispatcher::new(session.clone(), service, cache, store);
            info!(variable = %variable.uid(), ws_channel = %session.ws_channel, "Resolving");

            let value = match dispatcher.resolve(&variable, true)? {
                Resolution::Ready(resolved) => resolved.to_json()?,
                Resolution::Pending(pending) => {
                    tokio::time::timeout(Duration::from_secs(timeout), pending)
                        .await
                        .map_err(|_| anyhow!("Timed out after {}s waiting for {}", timeout, variable.uid()))??
                }
            };
            println!("{}", serde_json::to_string_pretty(&value)?);

            sessions.close(&session.ws_channel)?;
        }
    }

    Ok(())
}
