use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence_common::events::EventName;
use cadence_common::protocol::PresenceChangedPayload;
use cadence_hub::config::Config;
use cadence_hub::gateway::fanout::RoomDispatch;
use cadence_hub::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    let grace = Duration::from_secs(config.presence_grace_seconds);
    let sweep_interval = Duration::from_secs(config.sweep_interval_seconds);

    let state = AppState::new(config);

    // Background sweeper: expire dropped participants past the grace period
    // and announce the resulting presence changes.
    {
        let presence = state.presence.clone();
        let broadcast = state.broadcast.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                for outcome in presence.sweep(grace) {
                    if outcome.room_destroyed {
                        continue;
                    }
                    broadcast.dispatch(RoomDispatch::server(
                        &outcome.room_key,
                        EventName::PRESENCE_CHANGED,
                        serde_json::to_value(PresenceChangedPayload {
                            participants: outcome.participants,
                            leader_id: outcome.leader_id,
                        })
                        .unwrap_or_default(),
                    ));
                }
            }
        });
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(cadence_hub::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "cadence-hub listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("server error");
}
