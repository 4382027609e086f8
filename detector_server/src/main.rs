//! Detector server binary.
//!
use std::{net::TcpListener, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use detector_server::{
    detector::Detector,
    endpoints::serve,
    feedback::FeedbackSink,
    meter::spawn_meter_logger,
    nn::DEFAULT_MODEL_PATH,
    sensors::FrameFeed,
    speech::{EspeakEngine, SpeechContext, PREFERRED_LANGUAGE},
};
use env_logger::TimestampPrecision;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve the UI and API on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    /// Path of the ONNX currency classifier
    #[clap(long, default_value = DEFAULT_MODEL_PATH)]
    model_path: PathBuf,

    /// Camera device, defaults to the environment facing camera if one is found
    #[clap(long)]
    camera_device: Option<String>,

    /// Use a still image instead of the camera
    #[clap(long)]
    image: Option<PathBuf>,

    /// Text-to-speech program
    #[clap(long, default_value = "espeak-ng")]
    speech_program: String,

    /// Start with speech muted
    #[clap(long)]
    muted: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let feed = match &args.image {
        Some(path) => FrameFeed::from_still(path)?,
        None => open_camera(args.camera_device.as_deref())?,
    };

    let speech = SpeechContext::load(
        Box::new(EspeakEngine::new(args.speech_program)),
        PREFERRED_LANGUAGE,
    )
    .await?;
    let detector = Arc::new(Detector::new(
        Arc::new(feed.clone()),
        FeedbackSink::new(speech),
        args.muted,
    ));

    // Load the model in the background, the UI shows the loading state meanwhile
    {
        let detector = Arc::clone(&detector);
        let model_path = args.model_path.clone();
        tokio::spawn(async move { detector.load_model_from_path(model_path).await });
    }

    spawn_meter_logger();

    // Serve HTTP server
    let listener = TcpListener::bind(&args.server_address)?;
    log::info!("Serving on http://{}", listener.local_addr()?);
    serve(listener, detector, feed, async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;
    log::info!("Shut down");

    Ok(())
}

#[cfg(feature = "camera")]
fn open_camera(device: Option<&str>) -> Result<FrameFeed> {
    let device = device
        .map(str::to_owned)
        .unwrap_or_else(detector_server::sensors::find_preferred_device);
    let capture_fn = detector_server::sensors::get_capture_fn_linux(&device, None, None)?;

    FrameFeed::spawn_capture(capture_fn)
}

#[cfg(not(feature = "camera"))]
fn open_camera(_device: Option<&str>) -> Result<FrameFeed> {
    anyhow::bail!("built without camera support, pass --image")
}
