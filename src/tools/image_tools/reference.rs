use serde::{Deserialize, Serialize};

use crate::{
    domain::{image::{ImageRecord, Point}, render::RenderOffset},
    error::{RsError, RsResult},
    tools::{geometry::EyeGeometry, log::{log_warn, LogServiceType}},
};

/// Target eye distance as a share of the output width.
pub const TARGET_EYE_DISTANCE_RATIO: f64 = 0.2;
pub const TARGET_EYE_X_RATIO: f64 = 0.5;
pub const TARGET_EYE_Y_RATIO: f64 = 0.45;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGeometry {
    pub target_eye_distance: f64,
    pub target_eye_center: Point,
}

impl ReferenceGeometry {
    pub fn for_output(width: u32, height: u32, offset: RenderOffset) -> Self {
        Self {
            target_eye_distance: width as f64 * TARGET_EYE_DISTANCE_RATIO,
            target_eye_center: Point::new(
                width as f64 * TARGET_EYE_X_RATIO + offset.x,
                height as f64 * TARGET_EYE_Y_RATIO + offset.y,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEstimate {
    pub geometry: ReferenceGeometry,
    /// Mean source eye distance in pixels, informative only.
    pub average_eye_distance: f64,
    pub samples: usize,
}

/// One image's contribution: landmarks plus the pixel size they are relative to.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceSample<'a> {
    pub id: &'a str,
    pub landmarks: &'a [Point],
    pub width: u32,
    pub height: u32,
}

impl<'a> ReferenceSample<'a> {
    pub fn from_record(record: &'a ImageRecord) -> Option<Self> {
        let landmarks = record.landmarks.as_deref().filter(|l| !l.is_empty())?;
        Some(Self {
            id: &record.id,
            landmarks,
            width: record.width.unwrap_or(0),
            height: record.height.unwrap_or(0),
        })
    }
}

pub fn estimate_reference(samples: &[ReferenceSample], width: u32, height: u32, offset: RenderOffset) -> RsResult<ReferenceEstimate> {
    let mut total = 0.0;
    let mut count = 0usize;
    for sample in samples {
        if sample.width == 0 || sample.height == 0 {
            log_warn(LogServiceType::Render, format!("Reference skipped {}: unknown image size", sample.id));
            continue;
        }
        match EyeGeometry::from_landmarks(sample.landmarks, sample.width, sample.height) {
            Ok(eyes) => {
                total += eyes.distance();
                count += 1;
            }
            Err(error) => {
                log_warn(LogServiceType::Render, format!("Reference compute failed for {}: {}", sample.id, error.client_message()));
            }
        }
    }
    if count == 0 {
        return Err(RsError::NoValidGeometry);
    }
    Ok(ReferenceEstimate {
        geometry: ReferenceGeometry::for_output(width, height, offset),
        average_eye_distance: total / count as f64,
        samples: count,
    })
}


#[cfg(test)]
mod tests {
    use crate::tools::geometry::tests::landmarks_with_eyes;

    use super::*;

    fn sample<'a>(id: &'a str, landmarks: &'a [Point], width: u32, height: u32) -> ReferenceSample<'a> {
        ReferenceSample { id, landmarks, width, height }
    }

    #[test]
    fn targets_follow_output_size() {
        let landmarks = landmarks_with_eyes((0.4, 0.5), (0.6, 0.5));
        let estimate = estimate_reference(&[sample("a", &landmarks, 1000, 800)], 1080, 1920, RenderOffset { x: 10.0, y: -20.0 }).unwrap();
        assert_eq!(estimate.samples, 1);
        assert!((estimate.geometry.target_eye_distance - 216.0).abs() < 1e-9);
        assert!((estimate.geometry.target_eye_center.x - 550.0).abs() < 1e-9);
        assert!((estimate.geometry.target_eye_center.y - 844.0).abs() < 1e-9);
        assert!((estimate.average_eye_distance - 200.0).abs() < 1e-9);
    }

    #[test]
    fn order_does_not_matter() {
        let a = landmarks_with_eyes((0.4, 0.5), (0.6, 0.5));
        let b = landmarks_with_eyes((0.3, 0.4), (0.7, 0.45));
        let c = landmarks_with_eyes((0.45, 0.6), (0.52, 0.58));
        let forward = vec![sample("a", &a, 640, 480), sample("b", &b, 1920, 1080), sample("c", &c, 333, 777)];
        let mut shuffled = forward.clone();
        shuffled.rotate_left(1);
        shuffled.swap(0, 1);
        let one = estimate_reference(&forward, 1080, 1920, RenderOffset::default()).unwrap();
        let two = estimate_reference(&shuffled, 1080, 1920, RenderOffset::default()).unwrap();
        assert!((one.average_eye_distance - two.average_eye_distance).abs() < 1e-9);
        assert_eq!(one.geometry, two.geometry);
    }

    #[test]
    fn bad_samples_are_skipped() {
        let good = landmarks_with_eyes((0.4, 0.5), (0.6, 0.5));
        let short = vec![Point::new(0.5, 0.5); 10];
        let estimate = estimate_reference(&[sample("short", &short, 100, 100), sample("nosize", &good, 0, 0), sample("good", &good, 100, 100)], 100, 100, RenderOffset::default()).unwrap();
        assert_eq!(estimate.samples, 1);
    }

    #[test]
    fn no_geometry_fails() {
        let short = vec![Point::new(0.5, 0.5); 10];
        assert!(matches!(
            estimate_reference(&[sample("short", &short, 100, 100)], 100, 100, RenderOffset::default()),
            Err(RsError::NoValidGeometry)
        ));
        assert!(matches!(estimate_reference(&[], 100, 100, RenderOffset::default()), Err(RsError::NoValidGeometry)));
    }

    #[test]
    fn records_without_landmarks_are_not_samples() {
        let mut record = ImageRecord::new("a".into(), "a.jpg".into(), "/tmp/a.jpg".into());
        assert!(ReferenceSample::from_record(&record).is_none());
        record.landmarks = Some(landmarks_with_eyes((0.4, 0.5), (0.6, 0.5)));
        record.width = Some(10);
        assert_eq!(ReferenceSample::from_record(&record).unwrap().height, 0);
    }
}
