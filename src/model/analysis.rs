use std::path::PathBuf;

use crate::{
	domain::{image::{FlagReason, ImageForUpdate}, job::{JobForUpdate, JobStatus}, render::{AnalysisResult, AnalyzeRequest}},
	error::{RsError, RsResult},
	tools::{log::{log_error, log_info, log_warn, LogServiceType}, recognition::LandmarkDetection, scheduler::bounded_fan_out},
};

use super::ModelController;


impl ModelController {

	/// Detects landmarks for the listed images, a few at a time, and flags the doubtful ones.
	/// One image failing never stops the others. Unknown image ids are ignored.
	pub async fn analyze_images(&self, request: AnalyzeRequest) -> RsResult<Vec<AnalysisResult>> {
		if request.order.is_empty() {
			return Err(RsError::InvalidOrder);
		}
		let job = self.store.get(&request.job_id).await?;
		let job_id = request.job_id.clone();
		let min_confidence = request.options.min_confidence;

		let mut targets: Vec<(String, PathBuf)> = vec![];
		for image_id in &request.order {
			match job.image(image_id) {
				Some(image) => targets.push((image.id.clone(), image.original_path.clone())),
				None => log_warn(LogServiceType::Analysis, format!("Image {} not in job {}, skipped", image_id, job_id)),
			}
		}

		self.store.try_transition(&job_id, |status| !status.is_rendering(), JobForUpdate::status(JobStatus::Analyzing)
			.with_progress(0)
			.with_message(format!("Analyzing {} images...", targets.len()))).await?;

		let detector = self.detector.clone();
		let outcomes = bounded_fan_out(targets, self.config.analysis_concurrency, move |path: PathBuf| {
			let detector = detector.clone();
			async move { detector.detect(&path).await }
		}).await;

		let mut results = Vec::with_capacity(outcomes.len());
		for (image_id, outcome) in outcomes {
			let (update, result) = match outcome.and_then(|detection| detection) {
				Ok(detection) => classify_detection(&image_id, detection, min_confidence),
				Err(error) => {
					let message = error.client_message();
					log_error(LogServiceType::Analysis, format!("Analyze error for {}: {}", image_id, message));
					failed_detection(&image_id, message)
				}
			};
			self.store.update_image(&job_id, &image_id, update).await?;
			results.push(result);
		}

		let flagged = results.iter().filter(|r| r.flagged).count();
		log_info(LogServiceType::Analysis, format!("Analyzed {} images of job {}, {} flagged", results.len(), job_id, flagged));
		self.store.update(&job_id, JobForUpdate::default().with_message(format!("Analysis complete: {} flagged", flagged))).await?;
		Ok(results)
	}
}

fn classify_detection(image_id: &str, detection: LandmarkDetection, min_confidence: f32) -> (ImageForUpdate, AnalysisResult) {
	let reason = FlagReason::classify(detection.face_count, detection.confidence, min_confidence);
	let landmarks = detection.first_face().cloned();
	let update = ImageForUpdate {
		face_count: Some(detection.face_count),
		confidence: Some(detection.confidence),
		landmarks: Some(landmarks.clone()),
		flag_reason: Some(reason),
		..Default::default()
	};
	let result = AnalysisResult {
		id: image_id.to_string(),
		face_count: detection.face_count,
		confidence: detection.confidence,
		flagged: reason.is_some(),
		reason,
		error: None,
		landmarks,
	};
	(update, result)
}

fn failed_detection(image_id: &str, message: String) -> (ImageForUpdate, AnalysisResult) {
	let update = ImageForUpdate {
		flag_reason: Some(Some(FlagReason::LandmarkFail)),
		..Default::default()
	};
	let result = AnalysisResult {
		id: image_id.to_string(),
		flagged: true,
		reason: Some(FlagReason::LandmarkFail),
		error: Some(message),
		..Default::default()
	};
	(update, result)
}


#[cfg(test)]
mod tests {
	use crate::{domain::render::AnalyzeOptions, model::tests::{cleanup, controller, job_with_photos}};

	use super::*;

	fn request(job_id: &str, order: Vec<String>) -> AnalyzeRequest {
		AnalyzeRequest { job_id: job_id.to_string(), order, options: AnalyzeOptions::default() }
	}

	#[tokio::test]
	async fn one_face_missing_out_of_five() {
		let mc = controller();
		let names = ["p1.png", "p2.png", "noface3.png", "p4.png", "p5.png"];
		let (job_id, ids) = job_with_photos(&mc, &names).await;
		let order: Vec<String> = names.iter().map(|n| ids[*n].clone()).collect();

		let results = mc.analyze_images(request(&job_id, order.clone())).await.unwrap();
		let result_ids: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
		assert_eq!(result_ids, order);

		let job = mc.get_job(&job_id).await.unwrap();
		assert_eq!(job.status, JobStatus::Analyzing);
		let flagged: Vec<&str> = job.images.iter().filter(|i| i.flagged()).map(|i| i.filename.as_str()).collect();
		assert_eq!(flagged, vec!["noface3.png"]);
		assert_eq!(job.image(&ids["noface3.png"]).unwrap().flag_reason(), Some(FlagReason::NoFace));
		assert_eq!(job.images.iter().filter(|i| i.has_landmarks()).count(), 4);
		cleanup(&mc).await;
	}

	#[tokio::test]
	async fn every_failure_stays_with_its_image() {
		let mc = controller();
		let names = ["multi.png", "low.png", "fail.png", "panic.png", "good.png"];
		let (job_id, ids) = job_with_photos(&mc, &names).await;
		let order: Vec<String> = names.iter().map(|n| ids[*n].clone()).collect();

		let results = mc.analyze_images(request(&job_id, order)).await.unwrap();
		let reasons: Vec<Option<FlagReason>> = results.iter().map(|r| r.reason).collect();
		assert_eq!(reasons, vec![
			Some(FlagReason::MultiFace),
			Some(FlagReason::LowConfidence),
			Some(FlagReason::LandmarkFail),
			Some(FlagReason::LandmarkFail),
			None,
		]);
		assert!(results[2].error.as_deref().unwrap_or_default().contains("model crashed"));
		assert!(results[3].error.is_some());

		let job = mc.get_job(&job_id).await.unwrap();
		// the first face is kept for multi face photos
		assert!(job.image(&ids["multi.png"]).unwrap().has_landmarks());
		assert!(!job.image(&ids["fail.png"]).unwrap().has_landmarks());
		assert!(!job.image(&ids["good.png"]).unwrap().flagged());
		cleanup(&mc).await;
	}

	#[tokio::test]
	async fn confidence_threshold_is_an_option() {
		let mc = controller();
		let (job_id, ids) = job_with_photos(&mc, &["low.png"]).await;
		let mut req = request(&job_id, vec![ids["low.png"].clone()]);
		req.options.min_confidence = 0.1;
		let results = mc.analyze_images(req).await.unwrap();
		assert!(!results[0].flagged);
		cleanup(&mc).await;
	}

	#[tokio::test]
	async fn malformed_requests() {
		let mc = controller();
		let (job_id, ids) = job_with_photos(&mc, &["a.png"]).await;
		assert!(matches!(mc.analyze_images(request(&job_id, vec![])).await, Err(RsError::InvalidOrder)));
		assert_eq!(mc.get_job(&job_id).await.unwrap().status, JobStatus::Uploading);
		assert!(matches!(mc.analyze_images(request("nope", vec!["x".into()])).await, Err(RsError::JobNotFound(_))));

		let results = mc.analyze_images(request(&job_id, vec!["unknown".into(), ids["a.png"].clone()])).await.unwrap();
		assert_eq!(results.len(), 1);
		cleanup(&mc).await;
	}

	#[tokio::test]
	async fn rendering_job_cannot_be_analyzed() {
		let mc = controller();
		let (job_id, ids) = job_with_photos(&mc, &["a.png"]).await;
		mc.store().update(&job_id, JobForUpdate::status(JobStatus::Encoding).with_progress(60)).await.unwrap();

		let result = mc.analyze_images(request(&job_id, vec![ids["a.png"].clone()])).await;
		assert!(matches!(result, Err(RsError::JobBusy { status: JobStatus::Encoding, .. })));
		let job = mc.get_job(&job_id).await.unwrap();
		assert_eq!((job.status, job.progress), (JobStatus::Encoding, 60));
		assert_eq!(job.images[0].face_count, None);
		cleanup(&mc).await;
	}
}
