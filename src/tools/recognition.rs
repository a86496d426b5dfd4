use std::{path::Path, process::Stdio};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::{
    domain::image::LandmarkSet,
    error::{RsError, RsResult},
    server::ServerConfig,
    tools::log::{log_warn, LogServiceType},
};

/// Raw detector answer for one image.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkDetection {
    #[serde(default)]
    pub face_count: u32,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub landmarks: Vec<LandmarkSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LandmarkDetection {
    /// Parses the detector JSON. An `error` field turns into a detector failure.
    pub fn parse(output: &str) -> RsResult<Self> {
        let detection: LandmarkDetection = serde_json::from_str(output.trim())?;
        if let Some(error) = detection.error {
            return Err(RsError::Detector(error));
        }
        Ok(detection)
    }

    /// Landmarks of the first face, even when more than one face was found.
    pub fn first_face(&self) -> Option<&LandmarkSet> {
        if self.face_count == 0 {
            return None;
        }
        self.landmarks.first().filter(|l| !l.is_empty())
    }
}

#[async_trait]
pub trait LandmarkDetector: Send + Sync {
    async fn detect(&self, image_path: &Path) -> RsResult<LandmarkDetection>;
}

/// Runs an external program with the image path as last argument and reads JSON from stdout.
#[derive(Debug, Clone)]
pub struct CommandLandmarkDetector {
    program: String,
    args: Vec<String>,
}

impl CommandLandmarkDetector {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.detector_program.clone(), config.detector_args.clone())
    }
}

#[async_trait]
impl LandmarkDetector for CommandLandmarkDetector {
    async fn detect(&self, image_path: &Path) -> RsResult<LandmarkDetection> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RsError::Detector(format!("unable to start {}: {}", self.program, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            log_warn(LogServiceType::Analysis, format!("Detector stderr for {:?}: {}", image_path, stderr.trim()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let last_line = stdout.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        match LandmarkDetection::parse(last_line) {
            Ok(detection) if output.status.success() => Ok(detection),
            Ok(_) => Err(RsError::Detector(format!("detector exited with {}", output.status))),
            Err(RsError::Serde(error)) if output.status.success() => Err(RsError::Detector(format!("invalid detector output: {}", error))),
            Err(RsError::Serde(_)) => Err(RsError::Detector(format!("detector exited with {}", output.status))),
            Err(error) => Err(error),
        }
    }
}
