use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, RwLock};

use crate::{
    domain::{image::{ImageForUpdate, ImageRecord}, job::{JobForUpdate, JobStatus, RenderJob}},
    error::{RsError, RsResult},
    tools::log::{log_info, LogServiceType},
};

/// In memory job registry. Each job sits behind its own mutex so stages of
/// different jobs never wait on each other.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, Arc<Mutex<RenderJob>>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, id: &str, created: i64) -> RenderJob {
        let job = RenderJob::new(id.to_string(), created);
        let mut jobs = self.jobs.write().await;
        jobs.insert(id.to_string(), Arc::new(Mutex::new(job.clone())));
        log_info(LogServiceType::Store, format!("Created job {}", id));
        job
    }

    async fn handle(&self, id: &str) -> RsResult<Arc<Mutex<RenderJob>>> {
        let jobs = self.jobs.read().await;
        jobs.get(id).cloned().ok_or_else(|| RsError::JobNotFound(id.to_string()))
    }

    /// Snapshot of the job.
    pub async fn get(&self, id: &str) -> RsResult<RenderJob> {
        let handle = self.handle(id).await?;
        let job = handle.lock().await;
        Ok(job.clone())
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.jobs.read().await.contains_key(id)
    }

    pub async fn update(&self, id: &str, update: JobForUpdate) -> RsResult<RenderJob> {
        let handle = self.handle(id).await?;
        let mut job = handle.lock().await;
        job.apply(update);
        Ok(job.clone())
    }

    /// Applies `update` only when `allowed` accepts the current status, under the job lock.
    /// Two callers racing for the same job can never both succeed.
    pub async fn try_transition<F>(&self, id: &str, allowed: F, update: JobForUpdate) -> RsResult<RenderJob>
    where
        F: Fn(JobStatus) -> bool,
    {
        let handle = self.handle(id).await?;
        let mut job = handle.lock().await;
        if !allowed(job.status) {
            return Err(RsError::JobBusy { job: id.to_string(), status: job.status });
        }
        job.apply(update);
        Ok(job.clone())
    }

    pub async fn update_image(&self, job_id: &str, image_id: &str, update: ImageForUpdate) -> RsResult<ImageRecord> {
        let handle = self.handle(job_id).await?;
        let mut job = handle.lock().await;
        let image = job.image_mut(image_id).ok_or_else(|| RsError::ImageNotFound { job: job_id.to_string(), image: image_id.to_string() })?;
        image.apply(update);
        Ok(image.clone())
    }

    /// Appends in the given order, returns the new image count.
    pub async fn append_images(&self, job_id: &str, images: Vec<ImageRecord>) -> RsResult<usize> {
        let handle = self.handle(job_id).await?;
        let mut job = handle.lock().await;
        job.images.extend(images);
        Ok(job.images.len())
    }

    pub async fn remove(&self, id: &str) -> Option<RenderJob> {
        let removed = self.jobs.write().await.remove(id)?;
        let job = removed.lock().await;
        Some(job.clone())
    }

    pub async fn list(&self) -> Vec<RenderJob> {
        let handles: Vec<Arc<Mutex<RenderJob>>> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(handles.len());
        for handle in handles {
            jobs.push(handle.lock().await.clone());
        }
        jobs
    }
}


#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::domain::image::FlagReason;

    use super::*;

    fn image(id: &str) -> ImageRecord {
        ImageRecord::new(id.into(), format!("{}.jpg", id), PathBuf::from(format!("/tmp/{}.jpg", id)))
    }

    #[tokio::test]
    async fn create_get_update() {
        let store = JobStore::new();
        store.create("j", 42).await;
        assert!(store.exists("j").await);
        let job = store.update("j", JobForUpdate::status(JobStatus::Analyzing).with_message("Analyzing")).await.unwrap();
        assert_eq!(job.status, JobStatus::Analyzing);
        assert_eq!(store.get("j").await.unwrap().created, 42);
        assert!(matches!(store.get("nope").await, Err(RsError::JobNotFound(id)) if id == "nope"));
    }

    #[tokio::test]
    async fn images_keep_order_and_take_updates() {
        let store = JobStore::new();
        store.create("j", 0).await;
        assert_eq!(store.append_images("j", vec![image("a"), image("b")]).await.unwrap(), 2);
        assert_eq!(store.append_images("j", vec![image("c")]).await.unwrap(), 3);

        let updated = store.update_image("j", "b", ImageForUpdate { face_count: Some(0), flag_reason: Some(Some(FlagReason::NoFace)), ..Default::default() }).await.unwrap();
        assert!(updated.flagged());

        let job = store.get("j").await.unwrap();
        let ids: Vec<&str> = job.images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(job.image("b").unwrap().face_count, Some(0));

        assert!(matches!(store.update_image("j", "z", ImageForUpdate::default()).await, Err(RsError::ImageNotFound { .. })));
        assert!(store.append_images("x", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn transition_checks_status_under_the_lock() {
        let store = Arc::new(JobStore::new());
        store.create("j", 0).await;
        let claim = || JobForUpdate::status(JobStatus::Aligning).with_progress(0);

        let mut handles = vec![];
        for _ in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.try_transition("j", |status| !status.is_rendering(), claim()).await.is_ok()
            }));
        }
        let mut won = 0;
        for handle in handles {
            if handle.await.unwrap() {
                won += 1;
            }
        }
        assert_eq!(won, 1);

        let busy = store.try_transition("j", |status| !status.is_rendering(), claim()).await;
        assert!(matches!(busy, Err(RsError::JobBusy { status: JobStatus::Aligning, .. })));
        assert!(matches!(store.try_transition("nope", |_| true, claim()).await, Err(RsError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn remove_and_list() {
        let store = JobStore::new();
        store.create("a", 0).await;
        store.create("b", 1).await;
        assert_eq!(store.list().await.len(), 2);
        assert_eq!(store.remove("a").await.unwrap().id, "a");
        assert!(store.remove("a").await.is_none());
        assert_eq!(store.list().await.len(), 1);
    }
}
