pub mod store;
pub mod jobs;
pub mod analysis;
pub mod render;

use std::sync::Arc;

use crate::{
	server::ServerConfig,
	tools::{recognition::{CommandLandmarkDetector, LandmarkDetector}, video_tools::{FfmpegEncoder, VideoEncoder}},
};

use self::store::JobStore;


#[derive(Clone)]
pub struct ModelController {
	store: Arc<JobStore>,
	detector: Arc<dyn LandmarkDetector>,
	encoder: Arc<dyn VideoEncoder>,
	config: Arc<ServerConfig>,
}


// Constructor
impl ModelController {
	pub fn new(config: ServerConfig, detector: Arc<dyn LandmarkDetector>, encoder: Arc<dyn VideoEncoder>) -> Self {
		Self {
			store: Arc::new(JobStore::new()),
			detector,
			encoder,
			config: Arc::new(config),
		}
	}

	/// Wires the external python detector and ffmpeg.
	pub fn from_config(config: ServerConfig) -> Self {
		let detector = Arc::new(CommandLandmarkDetector::from_config(&config));
		let encoder = Arc::new(FfmpegEncoder::from_config(&config));
		Self::new(config, detector, encoder)
	}
}

impl ModelController {
	pub fn config(&self) -> &ServerConfig {
		&self.config
	}

	pub fn store(&self) -> &JobStore {
		&self.store
	}
}


#[cfg(test)]
pub(crate) mod tests {
	use std::{collections::HashMap, path::{Path, PathBuf}, sync::{Arc, Mutex}};

	use async_trait::async_trait;
	use image::{Rgb, RgbImage};
	use nanoid::nanoid;
	use tokio::sync::mpsc::Sender;

	use crate::{
		error::{RsError, RsResult},
		server::ServerConfig,
		tools::{geometry::tests::landmarks_with_eyes, recognition::{LandmarkDetection, LandmarkDetector}, video_tools::{EncodeRequest, VideoEncoder}},
	};

	use super::ModelController;

	/// Behaviour code stored in the red channel of pixel (0, 0), see [`write_photos`].
	fn photo_code(name: &str) -> u8 {
		match name {
			n if n.starts_with("noface") => 10,
			n if n.starts_with("multi") => 20,
			n if n.starts_with("low") => 30,
			n if n.starts_with("fail") => 40,
			n if n.starts_with("panic") => 50,
			n if n.starts_with("short") => 60,
			_ => 0,
		}
	}

	/// Answers from the code written by [`write_photos`]: `noface*`, `multi*`, `low*`, `fail*` (detector error),
	/// `panic*`, `short*` (landmarks too short to align), anything else one good face.
	pub struct FakeDetector;

	#[async_trait]
	impl LandmarkDetector for FakeDetector {
		async fn detect(&self, image_path: &Path) -> RsResult<LandmarkDetection> {
			let code = image::open(image_path)?.to_rgb8().get_pixel(0, 0)[0];
			let face = landmarks_with_eyes((0.4, 0.5), (0.6, 0.5));
			let detection = match code {
				10 => LandmarkDetection { face_count: 0, confidence: 0.0, ..Default::default() },
				20 => LandmarkDetection { face_count: 2, confidence: 1.0, landmarks: vec![face.clone(), face], error: None },
				30 => LandmarkDetection { face_count: 1, confidence: 0.2, landmarks: vec![face], error: None },
				40 => return Err(RsError::Detector("model crashed".into())),
				50 => panic!("detector panicked"),
				60 => LandmarkDetection { face_count: 1, confidence: 1.0, landmarks: vec![face[..10].to_vec()], error: None },
				_ => LandmarkDetection { face_count: 1, confidence: 1.0, landmarks: vec![face], error: None },
			};
			Ok(detection)
		}
	}

	/// Records requests, replays `fractions` on the progress channel and writes an empty output file.
	#[derive(Default)]
	pub struct FakeEncoder {
		pub fractions: Vec<f64>,
		pub fail: Option<String>,
		pub requests: Mutex<Vec<EncodeRequest>>,
	}

	#[async_trait]
	impl VideoEncoder for FakeEncoder {
		async fn encode(&self, request: &EncodeRequest, progress: Option<Sender<f64>>) -> RsResult<()> {
			if let Ok(mut requests) = self.requests.lock() {
				requests.push(request.clone());
			}
			if let Some(sender) = progress {
				for fraction in &self.fractions {
					let _ = sender.send(*fraction).await;
				}
			}
			if let Some(message) = &self.fail {
				return Err(RsError::Encoder(message.clone()));
			}
			tokio::fs::write(&request.output, b"video").await?;
			Ok(())
		}
	}

	pub fn temp_config() -> ServerConfig {
		ServerConfig::with_data_dir(std::env::temp_dir().join(format!("facelapse-mc-{}", nanoid!())))
	}

	pub fn controller_with(encoder: Arc<FakeEncoder>) -> ModelController {
		ModelController::new(temp_config(), Arc::new(FakeDetector), encoder)
	}

	pub fn controller() -> ModelController {
		controller_with(Arc::new(FakeEncoder { fractions: vec![0.0, 0.5, 1.0], ..Default::default() }))
	}

	/// Writes 200x200 png photos named after `names`, a bright square sits between the eyes.
	pub fn write_photos(names: &[&str]) -> (PathBuf, Vec<PathBuf>) {
		let dir = std::env::temp_dir().join(format!("facelapse-photos-{}", nanoid!()));
		std::fs::create_dir_all(&dir).unwrap();
		let mut paths = vec![];
		for name in names {
			let mut image = RgbImage::from_pixel(200, 200, Rgb([0, 40, 40]));
			for y in 90..110 {
				for x in 90..110 {
					image.put_pixel(x, y, Rgb([250, 250, 250]));
				}
			}
			image.put_pixel(0, 0, Rgb([photo_code(name), 0, 0]));
			let path = dir.join(name);
			image.save(&path).unwrap();
			paths.push(path);
		}
		(dir, paths)
	}

	/// Imports `names` into a new job and returns the job id with image ids keyed by file name.
	pub async fn job_with_photos(mc: &ModelController, names: &[&str]) -> (String, HashMap<String, String>) {
		let job = mc.create_job().await.unwrap();
		let (dir, paths) = write_photos(names);
		let images = mc.import_images(&job.id, paths).await.unwrap();
		let _ = std::fs::remove_dir_all(dir);
		let ids = images.into_iter().map(|i| (i.filename.clone(), i.id.clone())).collect();
		(job.id, ids)
	}

	pub async fn cleanup(mc: &ModelController) {
		let _ = tokio::fs::remove_dir_all(&mc.config().data_dir).await;
	}
}
