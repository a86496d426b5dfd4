use std::path::PathBuf;

use nanoid::nanoid;
use tokio::fs::{copy, create_dir_all, read_dir, remove_dir_all};

use crate::{
	domain::{image::{ImageForUpdate, ImageRecord}, job::{JobStatus, RenderJob}, progress::JobProgress},
	error::{RsError, RsResult},
	tools::{
		clock::{is_expired, now_millis},
		file_tools::{extension_with_dot, filename_from_path, is_supported_image},
		image_tools::read_dimensions,
		log::{log_info, log_warn, LogServiceType},
		scheduler::run_blocking,
		text_tools::sort_natural,
	},
};

use super::ModelController;


impl ModelController {

	pub async fn create_job(&self) -> RsResult<RenderJob> {
		let id = nanoid!();
		create_dir_all(self.config.original_dir(&id)).await?;
		create_dir_all(self.config.aligned_dir(&id)).await?;
		Ok(self.store.create(&id, now_millis()).await)
	}

	pub async fn get_job(&self, job_id: &str) -> RsResult<RenderJob> {
		self.store.get(job_id).await
	}

	/// Copies the photos into the job under generated names and appends them in natural file name order.
	/// Files that are not images are skipped.
	pub async fn import_images(&self, job_id: &str, paths: Vec<PathBuf>) -> RsResult<Vec<ImageRecord>> {
		if !self.store.exists(job_id).await {
			return Err(RsError::JobNotFound(job_id.to_string()));
		}
		let original_dir = self.config.original_dir(job_id);
		create_dir_all(&original_dir).await?;

		let mut images = vec![];
		for path in paths {
			if !is_supported_image(&path) {
				log_warn(LogServiceType::Register, format!("Skipping unsupported file {:?}", path));
				continue;
			}
			let id = nanoid!();
			let filename = filename_from_path(&path.to_string_lossy()).unwrap_or_else(|| id.clone());
			let original_path = original_dir.join(format!("{}{}", id, extension_with_dot(&path)));
			copy(&path, &original_path).await?;

			let mut image = ImageRecord::new(id, filename, original_path.clone());
			match run_blocking(move || read_dimensions(&original_path)).await {
				Ok((width, height)) => image.apply(ImageForUpdate { width: Some(width), height: Some(height), ..Default::default() }),
				Err(error) => log_warn(LogServiceType::Register, format!("Unable to read size of {}: {}", image.filename, error.client_message())),
			}
			images.push(image);
		}
		sort_natural(&mut images, |i| i.filename.as_str());

		let total = self.store.append_images(job_id, images.clone()).await?;
		log_info(LogServiceType::Register, format!("Imported {} images into job {} ({} total)", images.len(), job_id, total));
		Ok(images)
	}

	/// Imports every supported image directly inside `dir`.
	pub async fn import_folder(&self, job_id: &str, dir: &PathBuf) -> RsResult<Vec<ImageRecord>> {
		let mut entries = read_dir(dir).await?;
		let mut paths = vec![];
		while let Some(entry) = entries.next_entry().await? {
			let path = entry.path();
			if entry.file_type().await?.is_file() && is_supported_image(&path) {
				paths.push(path);
			}
		}
		self.import_images(job_id, paths).await
	}

	pub async fn get_progress(&self, job_id: &str) -> RsResult<JobProgress> {
		let job = self.store.get(job_id).await?;
		Ok(JobProgress::from(&job))
	}

	/// Path of the produced video, only once the job completed.
	pub async fn result_path(&self, job_id: &str) -> RsResult<Option<PathBuf>> {
		let job = self.store.get(job_id).await?;
		if job.status == JobStatus::Completed {
			Ok(job.result_path)
		} else {
			Ok(None)
		}
	}

	/// Drops jobs older than the configured ttl, files included. Returns the removed ids.
	pub async fn cleanup_old_jobs(&self) -> RsResult<Vec<String>> {
		let now = now_millis();
		let ttl = self.config.job_ttl_seconds;
		let mut removed = vec![];
		for job in self.store.list().await {
			if !is_expired(job.created, ttl, now) {
				continue;
			}
			if job.status.is_rendering() {
				log_warn(LogServiceType::Store, format!("Job {} expired while rendering, kept", job.id));
				continue;
			}
			self.store.remove(&job.id).await;
			let dir = self.config.job_dir(&job.id);
			if let Err(error) = remove_dir_all(&dir).await {
				if error.kind() != std::io::ErrorKind::NotFound {
					log_warn(LogServiceType::Store, format!("Failed to cleanup job dir {}: {}", job.id, error));
				}
			}
			removed.push(job.id);
		}
		if !removed.is_empty() {
			log_info(LogServiceType::Store, format!("Cleaned up {} old jobs", removed.len()));
		}
		Ok(removed)
	}
}
