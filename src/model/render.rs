use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::{
	domain::{image::ImageRecord, job::{JobForUpdate, JobStatus, RenderJob}, render::{RenderOptions, RenderRequest, VideoFormat}},
	error::{RsError, RsResult},
	tools::{
		clock::now_millis,
		image_tools::{alignment::{align_file, AlignOptions}, reference::{estimate_reference, ReferenceGeometry, ReferenceSample}},
		log::{log_error, log_info, log_warn, LogServiceType},
		scheduler::{frames::{frame_file_name, FrameSequence}, is_report_point, run_blocking, span_progress},
		video_tools::EncodeRequest,
	},
};

use super::{store::JobStore, ModelController};

pub const ALIGNING_PROGRESS_START: u8 = 10;
pub const ALIGNING_PROGRESS_SPAN: u8 = 40;
pub const ENCODING_PROGRESS_START: u8 = 50;
pub const ENCODING_PROGRESS_SPAN: u8 = 50;

/// Job progress for an encoder fraction: 0 -> 50, 0.5 -> 75, 1 -> 100.
pub fn encode_progress(fraction: f64) -> u8 {
	let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
	ENCODING_PROGRESS_START + (fraction * ENCODING_PROGRESS_SPAN as f64).round() as u8
}

pub fn default_output_filename(format: VideoFormat, millis: i64) -> String {
	format!("facelapse_{}.{}", millis, format)
}

/// Images to render: the requested ones in request order, or every image in job order.
/// Only images carrying landmarks are kept, flagged ones included.
pub fn select_images(job: &RenderJob, order: Option<&[String]>) -> Vec<ImageRecord> {
	match order {
		Some(order) => order.iter()
			.filter_map(|id| job.image(id))
			.filter(|image| image.has_landmarks())
			.cloned()
			.collect(),
		None => job.images.iter()
			.filter(|image| image.has_landmarks())
			.cloned()
			.collect(),
	}
}

fn validate_request(request: &RenderRequest) -> RsResult<()> {
	request.options.validate()?;
	if let Some(order) = &request.order {
		if order.is_empty() {
			return Err(RsError::InvalidOrder);
		}
	}
	Ok(())
}

/// Sole writer of status and progress during one render attempt. Progress never goes back.
pub struct ProgressTracker<'a> {
	store: &'a JobStore,
	job_id: &'a str,
	current: u8,
}

impl<'a> ProgressTracker<'a> {
	/// Tracks a job already claimed for rendering, `floor` being the progress written by the claim.
	pub fn new(store: &'a JobStore, job_id: &'a str, floor: u8) -> ProgressTracker<'a> {
		Self { store, job_id, current: floor }
	}

	pub async fn set(&mut self, mut update: JobForUpdate) -> RsResult<()> {
		if let Some(progress) = update.progress {
			let progress = progress.max(self.current);
			self.current = progress;
			update.progress = Some(progress);
		}
		self.store.update(self.job_id, update).await?;
		Ok(())
	}

	pub async fn advance(&mut self, progress: u8) -> RsResult<()> {
		if progress <= self.current {
			return Ok(());
		}
		self.set(JobForUpdate::progress(progress)).await
	}

	pub fn current(&self) -> u8 {
		self.current
	}
}


impl ModelController {

	/// Checks the request then moves the job to ALIGNING in one step under the job lock.
	/// Malformed requests and jobs already rendering are rejected without touching the job.
	pub async fn claim_render(&self, request: &RenderRequest) -> RsResult<RenderJob> {
		validate_request(request)?;
		self.store.try_transition(&request.job_id, |status| !status.is_rendering(), JobForUpdate {
			status: Some(JobStatus::Aligning),
			progress: Some(0),
			current_step_message: Some(Some("Computing reference...".to_string())),
			error: Some(None),
			result_path: Some(None),
		}).await
	}

	/// Claims the job then renders in the background. Poll [`ModelController::get_progress`] for the outcome.
	pub async fn start_render(&self, request: RenderRequest) -> RsResult<()> {
		let job = self.claim_render(&request).await?;
		let mc = self.clone();
		tokio::spawn(async move {
			if let Err(error) = mc.render_claimed(job, request).await {
				log_error(LogServiceType::Render, format!("Background render job failed: {}", error.client_message()));
			}
		});
		Ok(())
	}

	/// Runs the whole render and returns the video path. Failures after the claim are stored on the job.
	pub async fn run_render(&self, request: RenderRequest) -> RsResult<PathBuf> {
		let job = self.claim_render(&request).await?;
		self.render_claimed(job, request).await
	}

	async fn render_claimed(&self, job: RenderJob, request: RenderRequest) -> RsResult<PathBuf> {
		match self.render_pipeline(&job, &request).await {
			Ok(path) => Ok(path),
			Err(error) => {
				let message = error.client_message();
				log_error(LogServiceType::Render, format!("Render of job {} failed: {}", job.id, message));
				self.store.update(&job.id, JobForUpdate::failed(message)).await?;
				Err(error)
			}
		}
	}

	async fn render_pipeline(&self, job: &RenderJob, request: &RenderRequest) -> RsResult<PathBuf> {
		let options = &request.options;
		let images = select_images(job, request.order.as_deref());
		if images.is_empty() {
			return Err(RsError::NoFacesFound);
		}

		let mut progress = ProgressTracker::new(&self.store, &job.id, 0);

		let samples: Vec<ReferenceSample> = images.iter().filter_map(ReferenceSample::from_record).collect();
		let reference = estimate_reference(&samples, options.width, options.height, options.offset_or_default())?;
		log_info(LogServiceType::Render, format!(
			"Reference for job {}: {} samples, average eye distance {:.1}px, target {:.1}px",
			job.id, reference.samples, reference.average_eye_distance, reference.geometry.target_eye_distance
		));

		let frames = self.align_images(&images, reference.geometry, options, &mut progress).await?;

		progress.set(JobForUpdate::status(JobStatus::Encoding)
			.with_progress(ENCODING_PROGRESS_START)
			.with_message("Encoding video...")).await?;

		let filename = options.filename.clone().unwrap_or_else(|| default_output_filename(options.format, now_millis()));
		let output = self.config.job_dir(&job.id).join(filename);
		let encode_request = EncodeRequest {
			frames_pattern: frames.pattern(),
			frame_count: frames.len(),
			fps: options.fps,
			width: options.width,
			height: options.height,
			format: options.format,
			output: output.clone(),
		};

		let (sender, mut receiver) = mpsc::channel::<f64>(32);
		let encode = self.encoder.encode(&encode_request, Some(sender));
		let forward = async {
			while let Some(fraction) = receiver.recv().await {
				if let Err(error) = progress.advance(encode_progress(fraction)).await {
					log_warn(LogServiceType::Render, format!("Unable to publish encode progress: {}", error.client_message()));
				}
			}
		};
		let (encoded, _) = tokio::join!(encode, forward);
		encoded?;

		progress.set(JobForUpdate {
			status: Some(JobStatus::Completed),
			progress: Some(100),
			current_step_message: Some(Some("Success!".to_string())),
			result_path: Some(Some(output.clone())),
			..Default::default()
		}).await?;
		log_info(LogServiceType::Render, format!("Job {} rendered {} frames to {:?}", job.id, frames.len(), output));
		Ok(output)
	}

	/// Aligns one image at a time into a fresh frame directory. Failed images are skipped and do not use a frame number.
	async fn align_images(&self, images: &[ImageRecord], reference: ReferenceGeometry, options: &RenderOptions, progress: &mut ProgressTracker<'_>) -> RsResult<FrameSequence> {
		let job_id = progress.job_id.to_string();
		let mut frames = FrameSequence::reset(self.config.aligned_dir(&job_id)).await?;
		let align_options = AlignOptions {
			output_width: options.width,
			output_height: options.height,
			include_landmarks: options.include_landmarks,
		};

		let total = images.len();
		let mut last_error = String::new();
		for (index, image) in images.iter().enumerate() {
			let Some(landmarks) = image.landmarks.clone() else { continue };
			let image_id = image.id.clone();
			let input = image.original_path.clone();
			let output = frames.next_path();
			let aligned = run_blocking(move || align_file(&image_id, &input, &output, &landmarks, &reference, &align_options)).await;

			match aligned {
				Ok(_) => {
					let frame = frames.commit();
					log_info(LogServiceType::Render, format!("Image {} aligned as frame {}", image.id, frame_file_name(frame)));
					if is_report_point(index) {
						progress.advance(span_progress(index, total, ALIGNING_PROGRESS_START, ALIGNING_PROGRESS_SPAN)).await?;
					}
				},
				Err(error) => {
					last_error = error.client_message();
					log_error(LogServiceType::Render, format!("Align fail for {}: {}", image.id, last_error));
					if let Err(error) = frames.discard_pending().await {
						log_warn(LogServiceType::Render, format!("Unable to remove partial frame: {}", error.client_message()));
					}
				},
			}
		}

		if frames.is_empty() {
			return Err(RsError::NoAlignedFrames(last_error));
		}
		log_info(LogServiceType::Render, format!("Aligned {}/{} images of job {}", frames.len(), total, job_id));
		Ok(frames)
	}
}
