//! convo-coach server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::ExposeSecret;
use tokio::sync::watch;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use convo_coach::adapters::{
    app_router, postgres, AppState, GeminiConfig, GeminiResponder, InMemoryConversationRepository,
    InMemoryRateLimiter, JwtSessionValidator, MockResponder, PostgresConversationRepository,
};
use convo_coach::application::SessionManager;
use convo_coach::config::{AppConfig, ResponderConfig, ResponderProvider};
use convo_coach::ports::{ConversationRepository, RateLimiter, Responder, SessionValidator};

/// Library modules that are too chatty at `debug`.
const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "tungstenite"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = AppConfig::load()?;
    init_logging(&config.server.log_level, config.is_production());
    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting convo-coach"
    );

    let conversations: Arc<dyn ConversationRepository> = match &config.database {
        Some(database) => {
            let pool = postgres::connect(database).await?;
            tracing::info!("Using PostgreSQL conversation storage");
            Arc::new(PostgresConversationRepository::new(pool))
        }
        None => {
            tracing::warn!("No database configured, conversations are kept in memory");
            Arc::new(InMemoryConversationRepository::new())
        }
    };
    let responder = build_responder(&config.responder)?;
    let validator: Arc<dyn SessionValidator> =
        Arc::new(JwtSessionValidator::from_config(&config.auth));

    let rate_limiter: Arc<dyn RateLimiter> =
        Arc::new(InMemoryRateLimiter::new(config.rate_limit.clone()));
    if !config.rate_limit.enabled {
        tracing::warn!("Rate limiting is disabled");
    }

    let sessions = Arc::new(
        SessionManager::new(
            conversations.clone(),
            responder,
            validator.clone(),
            config.session.clone(),
        )
        .with_frame_limiter(rate_limiter.clone()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let timers = sessions.spawn_timers(shutdown_rx.clone());

    let app = app_router(
        AppState {
            sessions,
            conversations,
            validator,
            rate_limiter,
        },
        &config.server,
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    let mut server_shutdown = shutdown_rx;
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });

    let signal = tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;
    signal.abort();

    for timer in timers {
        if let Err(e) = timer.await {
            tracing::error!(error = %e, "Timer task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_responder(
    config: &ResponderConfig,
) -> Result<Arc<dyn Responder>, Box<dyn Error + Send + Sync>> {
    match config.provider {
        ResponderProvider::Mock => {
            tracing::info!(delay_ms = config.mock_delay_ms, "Using scripted responder");
            Ok(Arc::new(MockResponder::new().with_delay(config.mock_delay())))
        }
        ResponderProvider::Gemini => {
            let key = config
                .gemini_api_key
                .as_ref()
                .ok_or("responder.gemini_api_key is required for the gemini provider")?;
            let gemini = GeminiConfig::new(key.expose_secret().clone())
                .with_model(config.model.clone())
                .with_base_url(config.base_url.clone())
                .with_timeout(config.timeout());
            tracing::info!(model = %config.model, "Using Gemini responder");
            Ok(Arc::new(GeminiResponder::new(gemini)?))
        }
    }
}

/// `RUST_LOG` wins when set; otherwise the configured level with chatty
/// libraries held at `warn`.
fn init_logging(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = String::from(log_level);
        for module in NOISY_MODULES {
            directives.push_str(&format!(",{}=warn", module));
        }
        EnvFilter::new(directives)
    });

    let subscriber = tracing_subscriber::registry().with(filter);
    if json {
        let _ = subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init();
    } else {
        let _ = subscriber
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
