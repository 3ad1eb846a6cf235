//! detect_image - run one image through the detection relay.
//!
//! Prints each detection with its size, distance and angle from the image
//! center, and optionally writes an annotated PNG.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use detection_relay::overlay::OverlayStyle;
use detection_relay::{
    annotate, ClientConfig, DetectionSummary, EncodedFrame, InferenceClient, OverlayRenderer,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect objects in a single image")]
struct Args {
    /// JPEG or PNG image to upload.
    image: PathBuf,

    /// Relay base URL, tried before scanning localhost:5050-5060.
    #[arg(long, env = "DETECT_API_BASE")]
    api_base: Option<String>,

    /// Write the annotated image here (PNG).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print the raw relay response as JSON instead of summaries.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("read image {}", args.image.display()))?;
    let decoded = image::load_from_memory(&bytes)
        .with_context(|| format!("decode image {}", args.image.display()))?
        .to_rgb8();
    let (width, height) = decoded.dimensions();
    let filename = args
        .image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.jpg".to_string());
    let frame = EncodedFrame::from_file_bytes(bytes, &filename, width, height);

    let mut client_config = ClientConfig::from_env()?;
    if let Some(base) = &args.api_base {
        client_config = client_config.with_api_base(base)?;
    }
    let client = InferenceClient::new(client_config);
    let response = client.detect_response(&frame)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    let detections = response.into_detection_set();
    if !args.json {
        println!("Detections ({})", detections.len());
        for detection in &detections {
            println!("  {}", DetectionSummary::describe(detection, width, height));
        }
    }

    if let Some(out) = &args.out {
        let renderer = OverlayRenderer::new(OverlayStyle::default());
        annotate(&decoded, &detections, &renderer)
            .save(out)
            .with_context(|| format!("write {}", out.display()))?;
        log::info!("annotated image written to {}", out.display());
    }
    Ok(())
}
