use anyhow::{Context, Result};
use config::{Config, MatcherBackend};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vipwatch_backends::{MemoryMatcher, RemoteMatcher, RemoteMatcherConfig, SchemaOptions, SqliteStore};
use vipwatch_core::{
    DetectionPipeline, IdentityMatcher, PipelineSettings, ProfileStore, Roster, StandardPolicy,
};

mod api;
mod channel;
mod config;
mod http;
#[cfg(test)]
mod testutil;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vipwatchd starting");

    let config = Config::load().context("invalid configuration")?;
    let call_timeout = Duration::from_secs(config.call_timeout_secs);

    let matcher: Arc<dyn IdentityMatcher> = match &config.matcher {
        MatcherBackend::Remote {
            endpoint,
            collection_id,
            api_key,
        } => Arc::new(RemoteMatcher::new(RemoteMatcherConfig {
            endpoint: endpoint.clone(),
            collection_id: collection_id.clone(),
            api_key: api_key.clone(),
            request_timeout: call_timeout,
        })?),
        MatcherBackend::Memory => {
            tracing::warn!("using in-memory face matcher; enrollments are lost on restart");
            Arc::new(MemoryMatcher::new())
        }
    };

    let schema = SchemaOptions {
        provision_date_index: config.provision_date_index,
    };
    let sqlite = if config.in_memory_db() {
        SqliteStore::open_in_memory(schema).await?
    } else {
        SqliteStore::open(&config.db_path, schema)
            .await
            .with_context(|| format!("cannot open {}", config.db_path.display()))?
    };
    if !sqlite.has_date_index().await? {
        tracing::warn!("detection log has no date index; analytics requests will fail until it exists");
    }
    let store: Arc<dyn ProfileStore> = Arc::new(sqlite);
    tracing::info!(matcher = matcher.backend(), store = store.backend(), "backends initialised");

    let settings = PipelineSettings {
        similarity_threshold: config.similarity_threshold,
        call_timeout,
    };
    let state = http::AppState {
        info: Arc::new(http::ServiceInfo {
            matcher: matcher.backend(),
            store: store.backend(),
            similarity_threshold: settings.similarity_threshold,
        }),
        roster: Arc::new(Roster::new(matcher.clone(), store.clone(), call_timeout)),
        pipeline: Arc::new(DetectionPipeline::new(
            matcher,
            store,
            Arc::new(StandardPolicy {
                returning_after_days: config.returning_after_days,
            }),
            settings,
        )),
    };

    let app = http::router(
        state,
        http::RouterOptions {
            static_dir: config.static_dir.as_deref(),
            max_upload_bytes: config.max_upload_bytes,
        },
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("cannot bind {}", config.bind))?;
    tracing::info!(
        addr = %config.bind,
        threshold = config.similarity_threshold,
        "vipwatchd ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("vipwatchd shutting down");
    Ok(())
}
