use serde::Serialize;
use derive_more::From;
use serde_with::{serde_as, DisplayFromStr};

use crate::domain::job::JobStatus;

pub type Result<T> = core::result::Result<T, Error>;
pub type RsResult<T> = core::result::Result<T, RsError>;
pub type RsError = Error;

#[serde_as]
#[derive(Debug, Serialize, From, strum_macros::AsRefStr)]
#[serde(tag = "type", content = "data")]
pub enum Error {
	Error(String),

	// -- Request errors.

	JobNotFound(String),
	ImageNotFound { job: String, image: String },
	InvalidOrder,
	InvalidRenderOptions(String),
	JobBusy { job: String, status: JobStatus },

	// -- Geometry errors.

	EmptyIndexSet,
	LandmarkIndexOutOfRange { index: usize, len: usize },
	NoValidGeometry,

	// -- Pipeline errors.

	NoFacesFound,
	AlignmentFailed(String, String),
	NoAlignedFrames(String),
	InvalidImageSize { width: u32, height: u32 },
	CropOutOfBounds { left: i64, top: i64 },

	// -- Externals collaborators.

	Detector(String),
	Encoder(String),
	FfmpegNotFound(String),

	ServerUnableToAccessLocalFolder,
	ServerMalformatedConfigFile,

	#[from]
	Io(#[serde_as(as = "DisplayFromStr")] std::io::Error),

	#[from]
	Serde(#[serde_as(as = "DisplayFromStr")] serde_json::Error),

	#[from]
	Image(#[serde_as(as = "DisplayFromStr")] image::ImageError),

	#[from]
	Join(#[serde_as(as = "DisplayFromStr")] tokio::task::JoinError),
}

// region:    --- Error Boilerplate
impl core::fmt::Display for Error {
	fn fmt(
		&self,
		fmt: &mut core::fmt::Formatter,
	) -> core::result::Result<(), core::fmt::Error> {
		write!(fmt, "{self:?}")
	}
}

impl std::error::Error for Error {}

impl From<&str> for Error {
	fn from(message: &str) -> Self {
		Error::Error(message.to_string())
	}
}
// endregion: --- Error Boilerplate

impl Error {
	/// Human readable message stored on a job when a stage fails.
	pub fn client_message(&self) -> String {
		match self {
			Self::Error(message) => message.clone(),
			Self::JobNotFound(id) => format!("Job {} not found", id),
			Self::ImageNotFound { job, image } => format!("Image {} not found in job {}", image, job),
			Self::InvalidOrder => "Invalid input: order must be a non-empty list of image ids".to_string(),
			Self::InvalidRenderOptions(message) => format!("Invalid render options: {}", message),
			Self::JobBusy { job, status } => format!("Job {} is busy ({})", job, status),
			Self::EmptyIndexSet => "Empty landmark index set".to_string(),
			Self::LandmarkIndexOutOfRange { index, len } => format!("Landmark {} missing (set has {} points)", index, len),
			Self::NoValidGeometry => "Could not compute face geometry".to_string(),
			Self::NoFacesFound => "No analyzed images with faces found".to_string(),
			Self::AlignmentFailed(image, cause) => format!("{}: {}", image, cause),
			Self::NoAlignedFrames(last) => format!("Alignment failed: {}", if last.is_empty() { "Unknown error" } else { last }),
			Self::InvalidImageSize { width, height } => format!("Invalid image size {}x{}", width, height),
			Self::CropOutOfBounds { left, top } => format!("Crop window at {},{} is outside the padded image", left, top),
			Self::Detector(message) => format!("Face detection failed: {}", message),
			Self::Encoder(message) => format!("Encoding failed: {}", message),
			Self::FfmpegNotFound(path) => format!("ffmpeg not found ({})", path),
			Self::Io(err) => err.to_string(),
			Self::Serde(err) => err.to_string(),
			Self::Image(err) => err.to_string(),
			Self::Join(err) => err.to_string(),
			_ => format!("{self:?}"),
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kind_names_are_stable() {
		assert_eq!(Error::NoValidGeometry.as_ref(), "NoValidGeometry");
		assert_eq!(Error::AlignmentFailed("a".into(), "b".into()).as_ref(), "AlignmentFailed");
	}

	#[test]
	fn batch_fatal_messages() {
		assert_eq!(Error::NoFacesFound.client_message(), "No analyzed images with faces found");
		assert_eq!(Error::NoAlignedFrames("".into()).client_message(), "Alignment failed: Unknown error");
		assert_eq!(Error::NoAlignedFrames("img1: boom".into()).client_message(), "Alignment failed: img1: boom");
	}

	#[test]
	fn busy_job_message() {
		let err = Error::JobBusy { job: "j1".into(), status: JobStatus::Encoding };
		assert_eq!(err.client_message(), "Job j1 is busy (ENCODING)");
	}

	#[test]
	fn io_errors_convert() {
		let err: RsError = std::io::Error::other("disk").into();
		assert!(err.client_message().contains("disk"));
		let serialized = serde_json::to_value(&err).unwrap();
		assert_eq!(serialized["type"], "Io");
	}
}
