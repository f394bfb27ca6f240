use std::sync::{Arc, RwLock};

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rust_embed::Embed;

use crate::control::{Command, CommandBus};
use crate::slot::FrameSlot;

use super::mjpeg;

#[derive(Embed)]
#[folder = "src/assets/"]
struct Assets;

#[derive(Clone)]
pub struct AppState {
    pub slot: Arc<FrameSlot>,
    pub devices: Arc<RwLock<Vec<String>>>,
    pub bus: CommandBus,
}

pub async fn start_server(state: AppState, port: u16) -> Result<(), std::io::Error> {
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/assets/{*path}", get(static_handler))
        .route("/video_feed", get(video_feed_handler))
        .route("/snapshot", get(snapshot_handler))
        .route("/api/devices", get(devices_handler))
        .route("/red", get(red_handler))
        .route("/yellow", get(yellow_handler))
        .route("/green", get(green_handler))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    match Assets::get("index.html") {
        Some(content) => Html(content.data.to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, "index.html not found").into_response(),
    }
}

async fn static_handler(Path(path): Path<String>) -> impl IntoResponse {
    match Assets::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref())],
                content.data.to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

async fn video_feed_handler(State(state): State<AppState>) -> Response {
    mjpeg::stream_response(Arc::clone(&state.slot))
}

async fn snapshot_handler(State(state): State<AppState>) -> Response {
    match state.slot.snapshot() {
        Some(image) => match mjpeg::encode_jpeg(&image) {
            Some(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response(),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "encode failed").into_response(),
        },
        None => (StatusCode::SERVICE_UNAVAILABLE, "no montage yet").into_response(),
    }
}

async fn devices_handler(State(state): State<AppState>) -> Response {
    match state.devices.read() {
        Ok(devices) => axum::Json(devices.clone()).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "device list lock error").into_response(),
    }
}

async fn red_handler(State(state): State<AppState>) -> &'static str {
    state.bus.send(Command::Red).await;
    Command::Red.token()
}

async fn yellow_handler(State(state): State<AppState>) -> &'static str {
    state.bus.send(Command::Yellow).await;
    Command::Yellow.token()
}

async fn green_handler(State(state): State<AppState>) -> &'static str {
    state.bus.send(Command::Green).await;
    Command::Green.token()
}
