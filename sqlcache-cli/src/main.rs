use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sqlcache::{
    CacheStore, CacherConfig, KeyBuilder, LoggingConfig, Param, Query, StoreBackend,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sqlcache-cli")]
#[command(about = "sqlcache CLI - derive cache keys and inspect cached query results", long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the cache key a query is stored under
    Key {
        /// Statement text with `?` or `$n` placeholders
        #[arg(long)]
        sql: String,

        /// Bound parameter, parsed as JSON (`42`, `true`, `null`) or taken as text
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
    },
    /// Print the effective configuration
    Config,
    /// Fetch and decode a stored payload (requires `store.backend: redis`)
    Get {
        key: String,
    },
    /// Derive the key of a query and fetch its stored payload (requires `store.backend: redis`)
    Inspect {
        #[arg(long)]
        sql: String,

        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
    },
}

struct Inspector {
    config: CacherConfig,
    keys: KeyBuilder,
}

impl Inspector {
    fn new(config: CacherConfig) -> Self {
        let keys = KeyBuilder::from_config(&config.key);
        Self { config, keys }
    }

    async fn execute(&self, command: &Command) -> Result<String> {
        let start = Instant::now();

        let response = match command {
            Command::Key { sql, params } => self.cmd_key(sql, params),
            Command::Config => self.cmd_config()?,
            Command::Get { key } => self.cmd_get(key).await?,
            Command::Inspect { sql, params } => {
                let key = self.cmd_key(sql, params);
                format!("{}\n{}", key.bold(), self.cmd_get(&key).await?)
            }
        };

        let elapsed = start.elapsed();
        Ok(format!(
            "{}\n{}",
            response,
            format!("({:.2?})", elapsed).dimmed()
        ))
    }

    fn cmd_key(&self, sql: &str, params: &[String]) -> String {
        self.keys.key_for(&build_query(sql, params))
    }

    fn cmd_config(&self) -> Result<String> {
        serde_yaml::to_string(&self.config).context("Failed to render configuration")
    }

    async fn cmd_get(&self, key: &str) -> Result<String> {
        if self.config.store.backend == StoreBackend::Memory {
            return Err(anyhow::anyhow!(
                "The memory store lives inside the application process; configure `store.backend: redis` to inspect a shared cache"
            ));
        }

        let store = self.config.store.open().await?;
        let Some(payload) = store.get(key).await? else {
            return Ok("(nil)".dimmed().to_string());
        };

        let value = self
            .config
            .codec
            .build()
            .unmarshal(payload.as_bytes())
            .with_context(|| format!("Payload under `{}` is not valid {:?}", key, self.config.codec))?;
        let records = match &value {
            serde_json::Value::Array(items) => format!("{} records", items.len()),
            _ => "1 record".to_string(),
        };

        Ok(format!(
            "{}\n{}",
            serde_json::to_string_pretty(&value)?,
            records.green()
        ))
    }
}

/// Parse a command-line parameter as a JSON scalar, falling back to text
fn parse_param(raw: &str) -> Param {
    serde_json::from_str::<Param>(raw).unwrap_or_else(|_| Param::Text(raw.to_string()))
}

fn build_query(sql: &str, params: &[String]) -> Query {
    Query::with_params(sql, params.iter().map(|raw| parse_param(raw)).collect())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CacherConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CacherConfig::default(),
    };
    init_tracing(&config.logging);

    let inspector = Inspector::new(config);
    match inspector.execute(&args.command).await {
        Ok(output) => {
            info!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "{}", format!("Error: {:#}", e).red());
            std::process::exit(1);
        }
    }
}
