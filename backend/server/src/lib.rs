//! School lunch menus with generated reviews and live reactions.
//!
//!
//!
//! # Flow
//! - Client asks for a date's meals, served from the store or synced from NEIS on a miss
//! - Client asks for a school's review, served from the store or generated once and stored
//! - Client likes a review, the count is stored and pushed to every realtime client
//! - Realtime clients also receive the number of clients online whenever it changes
//!
//!
//!
//! # Components
//!
//! ## Store
//! Redis hashes per record kind, see [`database`]. Without `REDIS_URL` the same contract is
//! served from process memory by [`memory::MemoryStore`].
//!
//! ## Upstream
//! NEIS school list and daily menus, see [`neis`]. The per-date sync in [`meals`] fans out one
//! fetch per school and waits for all of them.
//!
//! ## Reviews
//! [`generator`] builds the prompt and parses the scores, [`openai`] carries the request.
//! A failed generation is stored with its error flag set, so the next read tries again.
//!
//! ## Realtime
//! [`registry`] keeps one outbox per client id, [`socket`] bridges outboxes to websockets.
//!
//!
//!
//! # API
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/` | home page, counts a visit |
//! | GET | `/ws?client_id=` | realtime frames |
//! | GET | `/api/meals/{date}` | meals with a menu |
//! | GET | `/api/review/{date}/{school_code}` | review, generated on a miss |
//! | GET | `/api/reviews/{date}` | stored reviews |
//! | POST | `/api/reaction/{date}/{school_code}/like` | add a like |
//! | GET | `/api/reactions/{date}` | likes per school |
//! | GET | `/api/visits/today`, `/api/visits/total` | visit counts |
//! | GET | `/api/dates` | 3 days either side of today |
//!
//! Dates are `YYYY-MM-DD`.
//!
//!
//!
//! # Setup
//!
//! Secrets are read from `/run/secrets/<NAME>`, falling back to the environment.
//! ```sh
//! export NEIS_API_KEY=...
//! export OPENAI_API_KEY=...
//! export REDIS_URL=redis://127.0.0.1:6379
//! RUST_LOG=info cargo run -p lunch
//! ```
//!
//! Log raw completion responses.
//! ```sh
//! cargo run -p lunch --features server/verbose
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod generator;
pub mod meals;
pub mod memory;
pub mod models;
pub mod neis;
pub mod openai;
pub mod registry;
pub mod review;
pub mod routes;
pub mod socket;
pub mod state;
pub mod utils;

use config::Config;
use routes::{
    dates_handler, home_handler, meals_handler, reaction_handler, reactions_handler,
    review_handler, reviews_handler, today_visits_handler, total_visits_handler,
};
use socket::socket_handler;
use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(home_handler))
        .route("/ws", get(socket_handler))
        .route("/api/meals/{date}", get(meals_handler))
        .route("/api/review/{date}/{school_code}", get(review_handler))
        .route("/api/reviews/{date}", get(reviews_handler))
        .route(
            "/api/reaction/{date}/{school_code}/{reaction}",
            post(reaction_handler),
        )
        .route("/api/reactions/{date}", get(reactions_handler))
        .route("/api/visits/today", get(today_visits_handler))
        .route("/api/visits/total", get(total_visits_handler))
        .route("/api/dates", get(dates_handler))
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load().inspect_err(|e| error!("Config misconfigured: {e}"))?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            return std::future::pending().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
