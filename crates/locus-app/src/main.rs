mod cli;
mod simulation;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use locus_common::{new_id, ConfigError, UserId};
use locus_config::LocusConfig;
use locus_sync::backend::memory::{
    MemoryCache, MemoryDocumentStore, MemoryPushProvider, MemoryRealtimeStore,
};
use locus_sync::backend::FileCache;
use locus_sync::{KeyValueCache, PermissionStatus, Platform, SyncCoordinator, SyncServices};

use crate::simulation::Simulation;

fn load_config(path: Option<&str>) -> Result<LocusConfig, ConfigError> {
    match path {
        Some(path) => locus_config::load_from_path(Path::new(path)),
        None => locus_config::load_config(),
    }
}

fn open_cache(ephemeral: bool, config: &LocusConfig) -> Arc<dyn KeyValueCache> {
    if ephemeral {
        return Arc::new(MemoryCache::new());
    }
    match FileCache::from_config(&config.cache) {
        Ok(cache) => {
            info!(path = %cache.path().display(), "Using file cache");
            Arc::new(cache)
        }
        Err(e) => {
            warn!(error = %e, "File cache unavailable, falling back to memory");
            Arc::new(MemoryCache::new())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = cli::parse();

    // Config picks the default log level, so it is read before logging is up
    // and any load error is reported right after.
    let loaded = load_config(args.config.as_deref());
    let directive = match (&args.log_level, &loaded) {
        (Some(level), _) => format!("locus={level}"),
        (None, Ok(config)) => config.logging.level.directive().to_string(),
        (None, Err(_)) => "locus=info".to_string(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive)),
        )
        .init();

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Using default config");
            LocusConfig::default()
        }
    };

    let provider = MemoryPushProvider::new(format!("sim-{}", new_id()))
        .with_platform(Platform::Desktop, "locus simulator");
    let provider = if args.deny_notifications {
        provider.answering(PermissionStatus::Denied)
    } else {
        provider
    };

    let documents = Arc::new(MemoryDocumentStore::new());
    let realtime = Arc::new(MemoryRealtimeStore::new());
    let services = SyncServices {
        documents: documents.clone(),
        realtime: realtime.clone(),
        cache: open_cache(args.ephemeral, &config),
        push_provider: Arc::new(provider),
    };
    let coordinator = SyncCoordinator::new(services, &config);

    let simulation = Simulation {
        coordinator,
        documents,
        realtime,
        config,
    };
    let summary = simulation.run(&UserId::new(args.user), args.crash).await;

    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to render summary: {e}"),
    }
}
