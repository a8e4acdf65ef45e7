use std::net::SocketAddr;

use cadence_hub::config::Config;
use cadence_hub::AppState;

pub fn test_config() -> Config {
    Config {
        port: 0,
        presence_grace_seconds: 60,
        sweep_interval_seconds: 15,
    }
}

pub fn test_state() -> AppState {
    AppState::new(test_config())
}

/// Start a real server on an ephemeral port. Returns (addr, state); the
/// server runs in the background for the rest of the test.
pub async fn start_server() -> (SocketAddr, AppState) {
    let state = test_state();
    let app = cadence_hub::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}
