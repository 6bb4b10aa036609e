//! minz administration tool
//!
//! Runs registry and row queries against the configured backend.
//!
//! # Configuration
//!
//! The tool reads configuration from:
//! 1. `--config <path>`
//! 2. `MINZ_CONFIG` environment variable (path to TOML file)
//! 3. `./minz.toml` in current directory
//! 4. Defaults plus `MINZ_*` environment overrides
//!
//! # Example Usage
//!
//! ```bash
//! minz-admin check-config
//! minz-admin list comu
//! minz-admin export > dimensions.json
//! minz-admin import dimensions.json
//! minz-admin rows comuna --filter '{"provincia": {"region": "05"}}' --start 0 --limit 20
//! ```

use clap::{Parser, Subcommand};
use minz::config::{EngineConfig, StorageBackend};
use minz::{Dimension, DimensionEngine, FilterExpr};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// minz - dimension and classifier engine administration
#[derive(Parser)]
#[command(name = "minz-admin")]
#[command(version)]
#[command(about = "Inspect and maintain dimension definitions and rows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (overrides MINZ_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and print a summary
    CheckConfig,

    /// List dimensions whose code or name contains the filter
    List {
        /// Case-insensitive substring
        filter: Option<String>,
    },

    /// Print every dimension definition as JSON
    Export,

    /// Define or update dimensions from a JSON file
    Import {
        /// File produced by `export`
        file: PathBuf,
    },

    /// Print matching rows of a dimension as JSON
    Rows {
        /// Dimension code
        dimension: String,

        /// Substring matched against code or name
        #[arg(short, long)]
        text: Option<String>,

        /// Filter expression (JSON)
        #[arg(short, long)]
        filter: Option<String>,

        /// Rows to skip (requires --limit)
        #[arg(long)]
        start: Option<u64>,

        /// Maximum rows (requires --start)
        #[arg(long)]
        limit: Option<u64>,

        /// Add `<field>_name` display columns
        #[arg(long)]
        names: bool,
    },
}

fn load_config(cli: &Cli) -> minz::Result<EngineConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| std::env::var("MINZ_CONFIG").ok().map(PathBuf::from))
        .or_else(|| {
            let local = Path::new("minz.toml");
            local.exists().then(|| local.to_path_buf())
        });

    match path {
        Some(path) => EngineConfig::from_file_with_env(&path.to_string_lossy()),
        None => Ok(EngineConfig::from_env()),
    }
}

fn cmd_check_config(config: &EngineConfig) -> minz::Result<()> {
    config.validate()?;

    println!("Configuration is valid!");
    println!();
    println!("Storage Settings:");
    println!("  Backend: {:?}", config.storage.backend);
    println!(
        "  Dimensions collection: {}",
        config.storage.dimensions_collection
    );
    if config.storage.backend == StorageBackend::Redis {
        println!();
        println!("Redis Settings:");
        println!("  URL: {}", minz::redis::util::sanitize_url(&config.redis.url));
        println!("  Pool size: {}", config.redis.pool_size);
        println!("  Key prefix: {}", config.redis.key_prefix);
    }
    println!();
    println!("Filter max depth: {}", config.filter.max_depth);
    println!("Log level: {}", config.logging.level);
    Ok(())
}

fn cmd_list(engine: &DimensionEngine, filter: Option<&str>) {
    let mut dimensions = engine.list_dimensions(filter);
    dimensions.sort_by(|a, b| a.code.cmp(&b.code));
    for dimension in dimensions {
        let targets: Vec<String> = dimension
            .classifiers
            .iter()
            .map(|c| format!("{}→{}", c.field_name, c.dimension_code))
            .collect();
        println!("{:<24} {:<32} {}", dimension.code, dimension.name, targets.join(", "));
    }
}

async fn cmd_import(
    engine: &DimensionEngine,
    file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(file)?;
    let dimensions: Vec<Dimension> = serde_json::from_str(&contents)?;
    let applied = engine.import_dimensions(dimensions).await?;
    println!("Imported {} dimension(s)", applied);
    Ok(())
}

async fn cmd_rows(
    engine: &DimensionEngine,
    dimension: &str,
    text: Option<&str>,
    filter: Option<&str>,
    start: Option<u64>,
    limit: Option<u64>,
    names: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = match filter {
        Some(raw) => FilterExpr::parse(raw)?,
        None => None,
    };

    let total = engine.count(dimension, text, filter.as_ref()).await?;
    let rows = if names {
        engine
            .rows_with_names(
                dimension,
                text,
                filter.as_ref(),
                start.unwrap_or(0),
                limit.unwrap_or(0),
            )
            .await?
    } else {
        engine
            .rows(dimension, text, filter.as_ref(), start, limit)
            .await?
    };

    let docs: Vec<_> = rows.iter().map(|row| row.to_document()).collect();
    println!("{}", serde_json::to_string_pretty(&docs)?);
    eprintln!("{} of {} row(s)", rows.len(), total);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!(backend = ?config.storage.backend, "Loaded configuration");

    if let Commands::CheckConfig = cli.command {
        cmd_check_config(&config)?;
        return Ok(());
    }

    let engine = DimensionEngine::builder()
        .with_config(config)
        .build()
        .await?;
    info!("minz-admin v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::CheckConfig => {},
        Commands::List { filter } => cmd_list(&engine, filter.as_deref()),
        Commands::Export => {
            println!("{}", serde_json::to_string_pretty(&engine.export_dimensions())?);
        },
        Commands::Import { file } => cmd_import(&engine, file).await?,
        Commands::Rows {
            dimension,
            text,
            filter,
            start,
            limit,
            names,
        } => {
            cmd_rows(
                &engine,
                dimension,
                text.as_deref(),
                filter.as_deref(),
                *start,
                *limit,
                *names,
            )
            .await?
        },
    }

    Ok(())
}
