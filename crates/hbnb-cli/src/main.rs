use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use hbnb_core::{open_storage, Model, ModelKind, Storage, StorageConfig};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// HBNB CLI - manage stored users, places, states, cities, amenities and reviews
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML storage configuration (defaults to HBNB_* environment variables)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an object and print its id
    Create {
        /// Type name, e.g. State
        class: ModelKind,
        /// Attributes as key=value; strings quoted, `_` for spaces
        params: Vec<String>,
    },

    /// Print one object
    Show { class: ModelKind, id: String },

    /// Print every object, or every object of one type
    All { class: Option<ModelKind> },

    /// Delete an object
    Destroy { class: ModelKind, id: String },

    /// Count objects, optionally of one type
    Count { class: Option<ModelKind> },

    /// Set attributes on an existing object
    Update {
        class: ModelKind,
        id: String,
        #[arg(required = true)]
        params: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => StorageConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => StorageConfig::from_env().context("reading HBNB_* environment")?,
    };
    tracing::debug!(?config, "resolved storage configuration");

    let mut storage = open_storage(&config).context("opening storage")?;
    let result = run(cli.command, storage.as_mut());
    storage.close().context("closing storage")?;
    result
}

fn run(command: Commands, storage: &mut dyn Storage) -> anyhow::Result<()> {
    match command {
        Commands::Create { class, params } => {
            let mut obj = Model::blank(class);
            obj.apply(&parse_params(&params))
                .with_context(|| format!("invalid attributes for {class}"))?;
            obj.save_to(storage).context("saving new object")?;
            println!("{}", obj.id());
        }
        Commands::Show { class, id } => {
            let obj = find(storage, class, &id)?;
            println!("{}", serde_json::to_string_pretty(&obj.to_dict()?)?);
        }
        Commands::All { class } => {
            let objects = storage.all(class)?;
            let dicts = objects
                .values()
                .map(Model::to_dict)
                .collect::<Result<Vec<_>, _>>()?;
            println!("{}", serde_json::to_string_pretty(&dicts)?);
        }
        Commands::Destroy { class, id } => {
            let obj = find(storage, class, &id)?;
            storage.delete(Some(&obj))?;
            storage.save().context("committing delete")?;
        }
        Commands::Count { class } => {
            println!("{}", storage.count(class)?);
        }
        Commands::Update { class, id, params } => {
            let mut obj = find(storage, class, &id)?;
            let attrs = parse_params(&params);
            if attrs.is_empty() {
                bail!("no valid key=value attribute given");
            }
            obj.apply(&attrs)
                .with_context(|| format!("invalid attributes for {}", obj.key()))?;
            obj.save_to(storage).context("saving updated object")?;
        }
    }
    Ok(())
}

fn find(storage: &dyn Storage, class: ModelKind, id: &str) -> anyhow::Result<Model> {
    match storage.get(class, id)? {
        Some(obj) => Ok(obj),
        None => bail!("no instance found: {}", class.key(id)),
    }
}

/// Collect `key=value` pairs; malformed pairs are skipped with a warning.
fn parse_params(params: &[String]) -> Map<String, Value> {
    let mut attrs = Map::new();
    for param in params {
        let parsed = param
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .and_then(|(key, raw)| parse_value(raw).map(|value| (key.to_string(), value)));
        match parsed {
            Some((key, value)) => {
                attrs.insert(key, value);
            }
            None => tracing::warn!(param = %param, "skipping malformed attribute"),
        }
    }
    attrs
}

/// `"quoted"` → string (`_` → space, `\"` → `"`), then integer, then float.
fn parse_value(raw: &str) -> Option<Value> {
    if let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        let text = inner.replace("\\\"", "\"").replace('_', " ");
        return Some(Value::String(text));
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Some(Value::from(n));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::from)
}
