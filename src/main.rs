use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use listcache::cache::{ListingQuery, SnapshotReader, WildcardPattern};
use listcache::config::Config;
use listcache::error::ListCacheError;
use listcache::logging::{init_subscriber, LogFormat};
use listcache::registry::{init_cached_containers, Registry};
use listcache::shutdown::{Shutdown, ShutdownHandle};
use listcache::snapshot::{SnapshotPaths, TokioSnapshotFs};
use listcache::source::{ListingSource, S3ListingSource};
use std::path::PathBuf;
use std::sync::Arc;

/// Listcache - serves container listings from periodically refreshed local snapshots
#[derive(Parser, Debug)]
#[command(name = "listcache")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "listcache.yaml")]
    config: PathBuf,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Log output format (text or json)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize every configured container and keep the snapshots fresh (default)
    Serve,
    /// Query the current snapshot of a container without refreshing it
    Query {
        /// Container name as configured
        container: String,
        /// Only names starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
        /// Only names strictly after this one
        #[arg(long, default_value = "")]
        cursor: String,
        /// Maximum number of results, 0 for all
        #[arg(long, default_value_t = 0)]
        limit: i64,
        /// Wildcard filter (`*` and `?`)
        #[arg(long)]
        pattern: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_subscriber(args.log_format).map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    config.validate()?;

    tracing::info!(
        config_file = %args.config.display(),
        containers = config.containers.len(),
        tick_seconds = config.tick_seconds,
        "Configuration loaded successfully"
    );

    if args.test {
        for container in &config.containers {
            container.validate()?;
        }
        println!("configuration file {} is valid", args.config.display());
        return Ok(());
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Query {
            container,
            prefix,
            cursor,
            limit,
            pattern,
        } => {
            let mut query = ListingQuery::new(prefix, cursor, limit);
            if let Some(pattern) = pattern {
                query = query.with_pattern(WildcardPattern::new(&pattern)?);
            }
            query_snapshot(&config, &container, &query).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let (handle, shutdown) = ShutdownHandle::new();
    let registry = Registry::global();

    let summary = init_cached_containers(
        registry,
        &config,
        |container| async move {
            let source = S3ListingSource::from_config(&container).await?;
            Ok::<Arc<dyn ListingSource>, ListCacheError>(Arc::new(source))
        },
        shutdown,
    )
    .await;

    if summary.registered.is_empty() && !config.containers.is_empty() {
        return Err(anyhow!("no container could be cached"));
    }

    tracing::info!(containers = ?registry.containers(), "Serving cached listings");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("Shutdown requested");

    handle.trigger();
    for task in summary.tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Refresh scheduler ended abnormally");
        }
    }
    Ok(())
}

async fn query_snapshot(config: &Config, container: &str, query: &ListingQuery) -> anyhow::Result<()> {
    let container_config = config
        .containers
        .iter()
        .find(|c| c.name == container)
        .ok_or_else(|| anyhow!("container '{}' is not configured", container))?;

    let reader = SnapshotReader::new(
        container,
        SnapshotPaths::new(container_config.storage_dir(), container),
        Arc::new(TokioSnapshotFs::new()),
        config.retry_policy(),
        Shutdown::never(),
    );

    for entry in reader.query(query).await? {
        println!(
            "{}\t{}\t{}",
            entry.name,
            entry.size_bytes,
            entry.modified.to_rfc3339()
        );
    }
    Ok(())
}
