use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{RsError, RsResult};

use super::image::{FlagReason, LandmarkSet};

pub const DEFAULT_WIDTH: u32 = 1080;
pub const DEFAULT_HEIGHT: u32 = 1920;
pub const DEFAULT_FPS: u32 = 4;
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Avi,
    Webm,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct RenderOffset {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub format: VideoFormat,
    pub offset: Option<RenderOffset>,
    pub include_landmarks: bool,
    pub filename: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            format: VideoFormat::default(),
            offset: None,
            include_landmarks: false,
            filename: None,
        }
    }
}

impl RenderOptions {
    pub fn validate(&self) -> RsResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RsError::InvalidRenderOptions("width/height must be non-zero".to_string()));
        }
        if self.fps == 0 {
            return Err(RsError::InvalidRenderOptions("fps must be non-zero".to_string()));
        }
        if let Some(filename) = &self.filename {
            if filename.is_empty() || filename.contains('/') || filename.contains('\\') || filename.contains("..") {
                return Err(RsError::InvalidRenderOptions(format!("invalid output filename {:?}", filename)));
            }
        }
        Ok(())
    }

    pub fn offset_or_default(&self) -> RenderOffset {
        self.offset.unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub job_id: String,
    /// Restricts and orders the images to render. `None` renders every image in job order.
    pub order: Option<Vec<String>>,
    #[serde(default)]
    pub options: RenderOptions,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzeOptions {
    pub min_confidence: f32,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self { min_confidence: DEFAULT_MIN_CONFIDENCE }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub job_id: String,
    pub order: Vec<String>,
    #[serde(default)]
    pub options: AnalyzeOptions,
}

/// Outcome of the analysis of one image, tagged with its id.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: String,
    pub face_count: u32,
    pub confidence: f32,
    pub flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FlagReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<LandmarkSet>,
}
