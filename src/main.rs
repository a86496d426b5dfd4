#![cfg_attr(debug_assertions, allow(dead_code, unused_imports))]

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use domain::{
    job::JobStatus,
    render::{AnalyzeOptions, AnalyzeRequest, RenderOffset, RenderOptions, RenderRequest, VideoFormat, DEFAULT_FPS, DEFAULT_HEIGHT, DEFAULT_WIDTH},
};
use model::ModelController;
use server::ServerArgs;
use tools::log::{init_logging, log_error, log_info, log_warn, LogServiceType};
pub use self::error::{Result, Error};

mod model;
mod error;
mod tools;
mod server;
mod domain;

/// Turns a folder of portraits into a face stabilized video.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Folder with the photos, imported in natural file name order
    input: PathBuf,

    #[arg(long, default_value_t = DEFAULT_FPS)]
    fps: u32,

    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: u32,

    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: u32,

    /// mp4, avi or webm
    #[arg(short, long, default_value_t = VideoFormat::Mp4)]
    format: VideoFormat,

    /// Horizontal shift of the eye target in pixels
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    offset_x: f64,

    /// Vertical shift of the eye target in pixels
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    offset_y: f64,

    /// Draw the detected landmarks on every frame
    #[arg(short, long)]
    landmarks: bool,

    /// Output file name, written in the job folder
    #[arg(short, long)]
    output: Option<String>,

    #[command(flatten)]
    server: ServerArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    log_info(LogServiceType::Register, "Initializing config".to_string());
    let config = server::initialize_config(&cli.server).await?;
    let min_confidence = config.min_confidence;
    let mc = ModelController::from_config(config);

    if let Err(error) = mc.cleanup_old_jobs().await {
        log_error(LogServiceType::Store, format!("Cleanup failed: {}", error.client_message()));
    }

    let job = mc.create_job().await?;
    let images = mc.import_folder(&job.id, &cli.input).await?;
    if images.is_empty() {
        return Err(Error::Error(format!("No photos found in {:?}", cli.input)));
    }

    let order: Vec<String> = images.iter().map(|i| i.id.clone()).collect();
    let results = mc.analyze_images(AnalyzeRequest {
        job_id: job.id.clone(),
        order,
        options: AnalyzeOptions { min_confidence },
    }).await?;
    for result in results.iter().filter(|r| r.flagged) {
        let filename = images.iter().find(|i| i.id == result.id).map(|i| i.filename.as_str()).unwrap_or(&result.id);
        log_warn(LogServiceType::Analysis, format!("Flagged {}: {}", filename, result.reason.map(|r| r.to_string()).unwrap_or_default()));
    }

    let request = RenderRequest {
        job_id: job.id.clone(),
        order: None,
        options: RenderOptions {
            fps: cli.fps,
            width: cli.width,
            height: cli.height,
            format: cli.format,
            offset: Some(RenderOffset { x: cli.offset_x, y: cli.offset_y }),
            include_landmarks: cli.landmarks,
            filename: cli.output,
        },
    };
    mc.start_render(request).await?;
    wait_for_render(&mc, &job.id).await
}

async fn wait_for_render(mc: &ModelController, job_id: &str) -> Result<()> {
    let mut last = None;
    loop {
        let progress = mc.get_progress(job_id).await?;
        let current = (progress.status, progress.progress);
        if last != Some(current) {
            log_info(LogServiceType::Render, format!("{} {}% {}", progress.status, progress.progress, progress.step.clone().unwrap_or_default()));
            last = Some(current);
        }
        match progress.status {
            JobStatus::Completed => {
                if let Some(path) = progress.result_path {
                    println!("{}", path.display());
                }
                return Ok(());
            },
            JobStatus::Error => {
                let message = progress.error.unwrap_or_else(|| "Unknown error".to_string());
                log_error(LogServiceType::Render, message.clone());
                return Err(Error::Error(message));
            },
            _ => tokio::time::sleep(Duration::from_millis(250)).await,
        }
    }
}
