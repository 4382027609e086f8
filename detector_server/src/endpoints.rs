//! Endpoints of HTTP server.
//!
use std::{future::Future, net::TcpListener, sync::Arc};

use anyhow::Result;
use axum::{
    body::StreamBody,
    http::header,
    response::{Html, IntoResponse},
    routing::{get, post},
    Extension, Json, Router,
};
use bytes::Bytes;
use common::protocol::StatusReport;
use futures::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::{detector::Detector, meter::METER, sensors::FrameFeed};

/// Serve the detector on `listener` until `signal` resolves.
///
/// On the signal the session is disarmed and open video streams end, so that
/// the server can drain its connections.
pub async fn serve<F>(
    listener: TcpListener,
    detector: Arc<Detector>,
    feed: FrameFeed,
    signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let shutdown = CancellationToken::new();
    let app = router(Arc::clone(&detector), feed, shutdown.clone());

    axum::Server::from_tcp(listener)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            signal.await;
            log::info!("Shutting down");
            detector.shutdown();
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

/// Build the router of the detector UI and API. Video streams end once
/// `shutdown` is cancelled.
pub fn router(detector: Arc<Detector>, feed: FrameFeed, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthcheck", get(healthcheck))
        .route("/stream", get(video_stream))
        .route("/status", get(status))
        .route("/detect/toggle", post(toggle_detect))
        .route("/mute/toggle", post(toggle_mute))
        .layer(Extension(detector))
        .layer(Extension(feed))
        .layer(Extension(shutdown))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

pub async fn status(Extension(detector): Extension<Arc<Detector>>) -> Json<StatusReport> {
    Json(detector.status())
}

pub async fn toggle_detect(Extension(detector): Extension<Arc<Detector>>) -> Json<StatusReport> {
    Json(detector.toggle_detect())
}

pub async fn toggle_mute(Extension(detector): Extension<Arc<Detector>>) -> Json<StatusReport> {
    Json(detector.toggle_mute())
}

// Endpoint of the live camera stream.
pub async fn video_stream(
    Extension(feed): Extension<FrameFeed>,
    Extension(shutdown): Extension<CancellationToken>,
) -> impl IntoResponse {
    log::info!("Video stream requested");

    let stream = WatchStream::new(feed.subscribe())
        .take_until(async move { shutdown.cancelled().await })
        .filter_map(|frame| async move {
            frame.map(|data| {
                METER.tick_streamed();
                Ok::<_, String>(as_jpeg_stream_item(&data))
            })
        });

    // Set body and headers for multipart streaming
    let body = StreamBody::new(stream);
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    (headers, body)
}

fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Indian Currency Detector</title>
  <style>
    body { background: #111827; color: #fff; font-family: sans-serif; text-align: center; }
    .panel { background: #1f2937; margin: 1em auto; padding: 1em; max-width: 640px; border-radius: 8px; }
    .error { color: #ef4444; }
    button { padding: 0.8em 1.2em; margin: 0.5em; border: none; border-radius: 999px; color: #fff; }
    #detect { background: #22c55e; }
    #mute { background: #3b82f6; }
    #about-toggle { background: #3b82f6; border-radius: 4px; }
    img { width: 100%; max-width: 640px; }
  </style>
</head>
<body>
  <h1>Indian Currency Detector</h1>
  <button id="about-toggle">About</button>
  <div id="about" class="panel" hidden>
    <h2>About This Project</h2>
    <p>
      This project detects Indian currency notes using a camera. A neural network classifies
      the current frame and the detected note is announced by voice, to help identifying
      currency notes quickly.
    </p>
  </div>
  <p id="loading">Loading model...</p>
  <p id="error" class="error" hidden></p>
  <div id="camera" class="panel" hidden>
    <img src="./stream" alt="Camera stream">
    <div>
      <button id="detect">Start detection</button>
      <button id="mute">Mute</button>
    </div>
  </div>
  <p id="status">No Indian currency detected yet</p>
  <script>
    const byId = (id) => document.getElementById(id);

    function render(report) {
      const state = report.model.state;
      byId("loading").hidden = state !== "loading";
      byId("error").hidden = !report.error;
      byId("error").textContent = report.error || "";
      byId("camera").hidden = state !== "ready";
      byId("detect").textContent = report.phase === "idle" ? "Start detection" : "Stop detection";
      byId("mute").textContent = report.muted ? "Unmute" : "Mute";
      byId("status").textContent = report.status_text;
    }

    async function call(method, path) {
      const response = await fetch(path, { method });
      render(await response.json());
    }

    byId("about-toggle").onclick = () => { byId("about").hidden = !byId("about").hidden; };
    byId("detect").onclick = () => call("POST", "./detect/toggle");
    byId("mute").onclick = () => call("POST", "./mute/toggle");

    call("GET", "./status");
    setInterval(() => call("GET", "./status"), 500);
  </script>
</body>
</html>
"#;
