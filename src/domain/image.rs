use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Landmark coordinate normalized to the source image width and height.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn to_pixels(&self, width: u32, height: u32) -> Point {
        Point::new(self.x * width as f64, self.y * height as f64)
    }
}

pub type LandmarkSet = Vec<Point>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagReason {
    NoFace,
    MultiFace,
    LowConfidence,
    LandmarkFail,
}

impl FlagReason {
    /// Quality flag for a successful detection. Face count checks win over confidence.
    pub fn classify(face_count: u32, confidence: f32, min_confidence: f32) -> Option<FlagReason> {
        if face_count == 0 {
            Some(FlagReason::NoFace)
        } else if face_count > 1 {
            Some(FlagReason::MultiFace)
        } else if confidence < min_confidence {
            Some(FlagReason::LowConfidence)
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: String,
    pub filename: String,
    pub original_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<LandmarkSet>,
    flagged: bool,
    flag_reason: Option<FlagReason>,
}

impl ImageRecord {
    pub fn new(id: String, filename: String, original_path: PathBuf) -> Self {
        Self {
            id,
            filename,
            original_path,
            ..Default::default()
        }
    }

    pub fn flagged(&self) -> bool {
        self.flagged
    }

    pub fn flag_reason(&self) -> Option<FlagReason> {
        self.flag_reason
    }

    /// Only way to touch the flag pair, keeps `flagged == flag_reason.is_some()`.
    pub fn set_flag(&mut self, reason: Option<FlagReason>) {
        self.flagged = reason.is_some();
        self.flag_reason = reason;
    }

    pub fn has_landmarks(&self) -> bool {
        self.landmarks.as_ref().map(|l| !l.is_empty()).unwrap_or(false)
    }

    pub fn apply(&mut self, update: ImageForUpdate) {
        if let Some(face_count) = update.face_count {
            self.face_count = Some(face_count);
        }
        if let Some(confidence) = update.confidence {
            self.confidence = Some(confidence);
        }
        if let Some(landmarks) = update.landmarks {
            self.landmarks = landmarks;
        }
        if let Some(flag) = update.flag_reason {
            self.set_flag(flag);
        }
        if let Some(width) = update.width {
            self.width = Some(width);
        }
        if let Some(height) = update.height {
            self.height = Some(height);
        }
    }
}

/// Partial image update. Outer `None` leaves the field untouched.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageForUpdate {
    pub face_count: Option<u32>,
    pub confidence: Option<f32>,
    pub landmarks: Option<Option<LandmarkSet>>,
    pub flag_reason: Option<Option<FlagReason>>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}


#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn classification_priority() {
        assert_eq!(FlagReason::classify(0, 0.0, 0.5), Some(FlagReason::NoFace));
        assert_eq!(FlagReason::classify(2, 0.1, 0.5), Some(FlagReason::MultiFace));
        assert_eq!(FlagReason::classify(1, 0.4, 0.5), Some(FlagReason::LowConfidence));
        assert_eq!(FlagReason::classify(1, 0.5, 0.5), None);
    }

    #[test]
    fn flag_invariant_holds_through_updates() {
        let mut image = ImageRecord::new("a".into(), "a.jpg".into(), PathBuf::from("/tmp/a.jpg"));
        assert!(!image.flagged());
        image.apply(ImageForUpdate { flag_reason: Some(Some(FlagReason::NoFace)), ..Default::default() });
        assert!(image.flagged());
        assert_eq!(image.flag_reason(), Some(FlagReason::NoFace));
        image.apply(ImageForUpdate { face_count: Some(1), ..Default::default() });
        assert!(image.flagged());
        image.apply(ImageForUpdate { flag_reason: Some(None), ..Default::default() });
        assert!(!image.flagged());
        assert_eq!(image.flag_reason(), None);
    }

    #[test]
    fn reason_serialization() {
        assert_eq!(serde_json::to_string(&FlagReason::LowConfidence).unwrap(), "\"LOW_CONFIDENCE\"");
        assert_eq!(FlagReason::from_str("LANDMARK_FAIL").unwrap(), FlagReason::LandmarkFail);
        assert_eq!(FlagReason::MultiFace.to_string(), "MULTI_FACE");
    }

    #[test]
    fn empty_landmarks_do_not_count() {
        let mut image = ImageRecord::new("a".into(), "a.jpg".into(), PathBuf::from("/tmp/a.jpg"));
        image.landmarks = Some(vec![]);
        assert!(!image.has_landmarks());
        image.landmarks = Some(vec![Point::new(0.1, 0.2)]);
        assert!(image.has_landmarks());
    }
}
