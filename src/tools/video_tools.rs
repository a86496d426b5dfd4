use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::Sender;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use which::which;

use crate::domain::render::VideoFormat;
use crate::error::{RsError, RsResult};
use crate::server::ServerConfig;
use crate::tools::clock::now;

use super::log::{log_error, log_info, LogServiceType};

/// Frame rate of the produced file, input frames are repeated to reach it.
pub const OUTPUT_FRAMERATE: u32 = 30;

/// ffmpeg log lines kept for error reporting.
pub const OUTPUT_TAIL_LINES: usize = 50;

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncodeRequest {
    /// Numbered input frames, as an ffmpeg pattern such as `aligned/%05d.jpg`.
    pub frames_pattern: PathBuf,
    pub frame_count: usize,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub format: VideoFormat,
    pub output: PathBuf,
}

impl EncodeRequest {
    /// Number of frames ffmpeg will write once input frames are resampled to the output rate.
    pub fn expected_output_frames(&self) -> Option<u64> {
        if self.fps == 0 || self.frame_count == 0 {
            return None;
        }
        Some(((self.frame_count as u64 * OUTPUT_FRAMERATE as u64) / self.fps as u64).max(1))
    }
}

#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Encodes the frames matching `request.frames_pattern`. Fractions in `0.0..=1.0` are sent on `progress`.
    async fn encode(&self, request: &EncodeRequest, progress: Option<Sender<f64>>) -> RsResult<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: String,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: String) -> Self {
        Self { ffmpeg }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.ffmpeg_path.clone())
    }

    pub fn resolve_binary(&self) -> RsResult<PathBuf> {
        which(&self.ffmpeg).map_err(|_| RsError::FfmpegNotFound(self.ffmpeg.clone()))
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, request: &EncodeRequest, progress: Option<Sender<f64>>) -> RsResult<()> {
        let program = self.resolve_binary()?;
        let mut builder = VideoCommandBuilder::new(program);
        builder.set_request(request);
        if let Some(sender) = progress {
            builder.set_progress(sender);
        }
        builder.run_file(&request.output).await
    }
}

#[derive(Debug)]
pub struct VideoCommandBuilder {
    program: PathBuf,
    inputs: Vec<String>,
    input_options: Vec<String>,
    output_options: Vec<String>,
    expected_frames: Option<u64>,
    progress: Option<Sender<f64>>,
}

impl VideoCommandBuilder {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            inputs: Vec::new(),
            input_options: Vec::new(),
            output_options: Vec::new(),
            expected_frames: None,
            progress: None,
        }
    }

    pub fn set_progress(&mut self, sender: Sender<f64>) {
        self.progress = Some(sender);
    }

    pub fn set_expected_frames(&mut self, frames: Option<u64>) -> &mut Self {
        self.expected_frames = frames;
        self
    }

    pub fn add_input<S: Into<String>>(&mut self, path: S) -> &mut Self {
        self.inputs.push(path.into());
        self
    }

    pub fn add_input_option<S: Into<String>>(&mut self, value: S) -> &mut Self {
        self.input_options.push(value.into());
        self
    }

    pub fn add_out_option<S: Into<String>>(&mut self, value: S) -> &mut Self {
        self.output_options.push(value.into());
        self
    }

    pub fn set_request(&mut self, request: &EncodeRequest) -> &mut Self {
        self.add_input_option("-framerate").add_input_option(request.fps.to_string());
        self.add_input(request.frames_pattern.to_string_lossy().to_string());
        self.set_expected_frames(request.expected_output_frames());
        self.set_video_codec(request.format, request.width, request.height);
        self.add_out_option("-r").add_out_option(OUTPUT_FRAMERATE.to_string());
        self.add_metadata();
        self
    }

    pub fn set_video_codec(&mut self, format: VideoFormat, width: u32, height: u32) -> &mut Self {
        match format {
            VideoFormat::Mp4 => {
                self.add_out_option("-c:v").add_out_option("libx264")
                    .add_out_option("-pix_fmt").add_out_option("yuv420p")
                    .add_out_option("-profile:v").add_out_option("high")
                    .add_out_option("-level").add_out_option("4.0")
                    .add_out_option("-movflags").add_out_option("+faststart")
                    .add_out_option("-s").add_out_option(format!("{}x{}", width, height))
                    .add_out_option("-preset").add_out_option("medium")
                    .add_out_option("-crf").add_out_option("23");
            },
            VideoFormat::Avi => {
                self.add_out_option("-c:v").add_out_option("libxvid")
                    .add_out_option("-q:v").add_out_option("5");
            },
            VideoFormat::Webm => {
                self.add_out_option("-c:v").add_out_option("libvpx-vp9")
                    .add_out_option("-crf").add_out_option("30")
                    .add_out_option("-b:v").add_out_option("0");
            },
        }
        self
    }

    fn add_metadata(&mut self) -> &mut Self {
        let tags = [
            "title=Facelapse Video".to_string(),
            "description=Generated face montage video".to_string(),
            format!("creation_time={}", now().to_rfc3339()),
            "tool=facelapse".to_string(),
        ];
        for tag in tags {
            self.add_out_option("-metadata").add_out_option(tag);
        }
        self
    }

    /// Full argument list for an output file.
    pub fn args(&self, to: &Path) -> Vec<String> {
        let mut args = self.input_options.clone();
        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.clone());
        }
        args.extend(self.output_options.iter().cloned());
        args.push("-y".to_string());
        args.push("-progress".to_string());
        args.push("pipe:1".to_string());
        args.push(to.to_string_lossy().to_string());
        args
    }

    pub async fn run_file(&mut self, to: &Path) -> RsResult<()> {
        let args = self.args(to);
        log_info(LogServiceType::Encoder, format!("Video command: {} {}", self.program.display(), args.join(" ")));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RsError::Encoder(format!("unable to start ffmpeg: {}", e)))?;

        let stdout = child.stdout.take().ok_or_else(|| RsError::Encoder("ffmpeg stdout unavailable".to_string()))?;
        let stderr = child.stderr.take().ok_or_else(|| RsError::Encoder("ffmpeg stderr unavailable".to_string()))?;

        // Wrap them up and merge them. stdout only carries -progress blocks.
        let stdout = LinesStream::new(BufReader::new(stdout).lines()).map(|line| (true, line));
        let stderr = LinesStream::new(BufReader::new(stderr).lines()).map(|line| (false, line));
        let mut merged = StreamExt::merge(stdout, stderr);

        let mut last_fraction = 0.0;
        let mut tail = OutputTail::new(OUTPUT_TAIL_LINES);
        while let Some((is_progress, line)) = merged.next().await {
            let line = line?;
            if !is_progress {
                tail.push(line);
                continue;
            }
            if let Some(fraction) = parse_progress_line(&line, self.expected_frames) {
                // ffmpeg can repeat or overshoot frame counts near the end
                if fraction > last_fraction || fraction >= 1.0 {
                    last_fraction = fraction.max(last_fraction);
                    if let Some(sender) = &self.progress {
                        let _ = sender.send(last_fraction).await;
                    }
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            for line in tail.lines() {
                log_error(LogServiceType::Encoder, line.clone());
            }
            return Err(RsError::Encoder(tail.last_message().unwrap_or_else(|| format!("ffmpeg exited with {}", status))));
        }
        Ok(())
    }
}

/// Last lines of the ffmpeg log, oldest dropped first.
#[derive(Debug)]
pub struct OutputTail {
    capacity: usize,
    lines: VecDeque<String>,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, lines: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }

    /// Last non blank line, usually the reason ffmpeg gave up.
    pub fn last_message(&self) -> Option<String> {
        self.lines.iter().rev().find(|l| !l.trim().is_empty()).cloned()
    }
}

/// Reads one line of `-progress` output. `frame=N` becomes `N / expected`, `progress=end` is 1.
pub fn parse_progress_line(line: &str, expected_frames: Option<u64>) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key.trim() {
        "frame" => {
            let expected = expected_frames.filter(|e| *e > 0)?;
            match value.trim().parse::<u64>() {
                Ok(frame) => Some((frame as f64 / expected as f64).clamp(0.0, 1.0)),
                Err(_) => {
                    log_error(LogServiceType::Encoder, format!("ffmpeg error parsing progress: {}", line));
                    None
                }
            }
        },
        "progress" if value.trim() == "end" => Some(1.0),
        _ => None,
    }
}
