//! Live Quiz Back binary entrypoint wiring REST, WebSocket, storage and authentication layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_quiz_back::{
    auth::{Authenticator, StaticAuthenticator},
    config::AppConfig,
    dao::{
        quiz_catalog::{MemoryQuizCatalog, QuizCatalog},
        session_store::{MemorySessionStore, SessionStore},
    },
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let (store, quizzes) = storage(&config).await?;
    let auth = authenticator(&config)?;
    let app_state = AppState::new(store, quizzes, auth, config);

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the session store and quiz catalog: MongoDB when `MONGO_URI` is set, memory otherwise.
async fn storage(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn SessionStore>, Arc<dyn QuizCatalog>)> {
    #[cfg(feature = "mongo-store")]
    {
        if env::var_os("MONGO_URI").is_some() {
            use live_quiz_back::dao::mongodb::{MongoConfig, MongoStore};

            let mongo_config = MongoConfig::from_env()
                .await
                .context("reading MongoDB configuration")?;
            let mongo = Arc::new(
                MongoStore::connect(mongo_config)
                    .await
                    .context("connecting to MongoDB")?,
            );
            info!("using MongoDB storage");
            let store: Arc<dyn SessionStore> = mongo.clone();
            let quizzes: Arc<dyn QuizCatalog> = mongo;
            return Ok((store, quizzes));
        }
    }

    info!(
        quizzes = config.quizzes().len(),
        "using in-memory storage seeded from configuration"
    );
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let quizzes: Arc<dyn QuizCatalog> =
        Arc::new(MemoryQuizCatalog::with_quizzes(config.quizzes().to_vec()));
    Ok((store, quizzes))
}

/// Pick the token resolver: the authentication service when `AUTH_SERVICE_URL` is set,
/// the configured development tokens otherwise.
fn authenticator(config: &AppConfig) -> anyhow::Result<Arc<dyn Authenticator>> {
    #[cfg(feature = "http-auth")]
    {
        if env::var_os("AUTH_SERVICE_URL").is_some() {
            let client = live_quiz_back::auth::HttpAuthenticator::from_env()
                .context("building authentication client")?;
            info!("resolving tokens with the authentication service");
            return Ok(Arc::new(client));
        }
    }

    let users = StaticAuthenticator::new(config.dev_users().iter().cloned());
    if users.is_empty() {
        warn!("no authentication service and no development users; every request will be rejected");
    } else {
        info!(users = users.len(), "resolving tokens from development users");
    }
    Ok(Arc::new(users))
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
