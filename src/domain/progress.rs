use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::job::{JobStatus, RenderJob};

/// What a poller sees of a job.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub status: JobStatus,
    pub progress: u8,
    pub step: Option<String>,
    pub error: Option<String>,
    pub result_path: Option<PathBuf>,
}

impl From<&RenderJob> for JobProgress {
    fn from(job: &RenderJob) -> Self {
        Self {
            status: job.status,
            progress: job.progress,
            step: job.current_step_message.clone(),
            error: job.error.clone(),
            result_path: if job.status == JobStatus::Completed { job.result_path.clone() } else { None },
        }
    }
}

impl JobProgress {
    pub fn percent(&self) -> f32 {
        self.progress as f32 / 100.0
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_only_when_completed() {
        let mut job = RenderJob::new("j".into(), 0);
        job.result_path = Some(PathBuf::from("/tmp/old.mp4"));
        job.status = JobStatus::Encoding;
        job.progress = 75;
        let progress = JobProgress::from(&job);
        assert_eq!(progress.result_path, None);
        assert_eq!(progress.percent(), 0.75);

        job.status = JobStatus::Completed;
        assert_eq!(JobProgress::from(&job).result_path, Some(PathBuf::from("/tmp/old.mp4")));
    }
}
