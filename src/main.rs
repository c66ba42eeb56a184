use std::{path::PathBuf, sync::Arc};

use echoes::{
    AppState,
    backend::{
        local::{self, LocalAuth, LocalMediaStore, SqliteGateway},
        supabase::Supabase,
    },
    client::{Backend, EchoClient},
    config::{BackendConfig, Config},
    news::{NewsClient, NewsFeed},
    web,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("echoes=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let news: Arc<dyn NewsFeed> = Arc::new(NewsClient::new(config.news.clone()));

    let (backend, media_dir) = match &config.backend {
        BackendConfig::Supabase { url, anon_key, media_bucket } => {
            let supabase = Supabase::new(reqwest::Client::new(), url, anon_key);
            tracing::info!(%url, "using supabase backend");
            let backend = Backend {
                auth: Arc::new(supabase.auth()),
                gateway: Arc::new(supabase.gateway()),
                media: Arc::new(supabase.storage(media_bucket)),
                news,
            };
            (backend, None)
        }
        BackendConfig::Local { database_url, media_dir } => {
            let db_pool = local::connect(database_url).await?;
            tracing::info!(%database_url, "using local backend");
            let backend = Backend {
                auth: Arc::new(LocalAuth::new(db_pool.clone())),
                gateway: Arc::new(SqliteGateway::new(db_pool)),
                media: Arc::new(LocalMediaStore::new(media_dir, &config.public_url)),
                news,
            };
            (backend, Some(PathBuf::from(media_dir)))
        }
    };

    let client = Arc::new(EchoClient::start(backend, config.trending.clone()).await);

    tokio::spawn({
        let client = client.clone();
        async move {
            while let Some(redirect) = client.next_redirect().await {
                tracing::info!(?redirect, "session ended, sign in again at /auth");
            }
        }
    });

    let mut notices = client.notices();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => tracing::warn!(post_id = %notice.post_id, "{}", notice.message),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = web::router(AppState { client }, media_dir);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
