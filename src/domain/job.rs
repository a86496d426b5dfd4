use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use super::image::ImageRecord;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display, EnumString, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Uploading,
    Analyzing,
    Aligning,
    Encoding,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// A render task owns the job while in these states.
    pub fn is_rendering(&self) -> bool {
        matches!(self, JobStatus::Aligning | JobStatus::Encoding)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    pub id: String,
    pub created: i64,
    pub images: Vec<ImageRecord>,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,
}

impl RenderJob {
    pub fn new(id: String, created: i64) -> Self {
        Self {
            id,
            created,
            ..Default::default()
        }
    }

    pub fn image(&self, image_id: &str) -> Option<&ImageRecord> {
        self.images.iter().find(|i| i.id == image_id)
    }

    pub fn image_mut(&mut self, image_id: &str) -> Option<&mut ImageRecord> {
        self.images.iter_mut().find(|i| i.id == image_id)
    }

    pub fn apply(&mut self, update: JobForUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(message) = update.current_step_message {
            self.current_step_message = message;
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        if let Some(result_path) = update.result_path {
            self.result_path = result_path;
        }
    }
}

/// Partial job update, last write wins per field.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobForUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub current_step_message: Option<Option<String>>,
    pub error: Option<Option<String>>,
    pub result_path: Option<Option<PathBuf>>,
}

impl JobForUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self { status: Some(status), ..Default::default() }
    }

    pub fn progress(progress: u8) -> Self {
        Self { progress: Some(progress), ..Default::default() }
    }

    pub fn failed(message: String) -> Self {
        Self { status: Some(JobStatus::Error), error: Some(Some(message)), ..Default::default() }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.current_step_message = Some(Some(message.into()));
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_updates_only_touch_set_fields() {
        let mut job = RenderJob::new("job".into(), 0);
        job.apply(JobForUpdate::status(JobStatus::Aligning).with_progress(0).with_message("Computing reference..."));
        assert_eq!(job.status, JobStatus::Aligning);
        assert_eq!(job.current_step_message.as_deref(), Some("Computing reference..."));

        job.apply(JobForUpdate::progress(140));
        assert_eq!(job.progress, 100);
        assert_eq!(job.status, JobStatus::Aligning);

        job.apply(JobForUpdate::failed("boom".into()));
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert!(job.status.is_terminal());
        assert!(!job.status.is_rendering());
        assert!(JobStatus::Encoding.is_rendering());
    }

    #[test]
    fn status_tokens() {
        assert_eq!(serde_json::to_string(&JobStatus::Encoding).unwrap(), "\"ENCODING\"");
        assert_eq!(JobStatus::Completed.to_string(), "COMPLETED");
        assert_eq!(JobStatus::default(), JobStatus::Uploading);
    }
}
