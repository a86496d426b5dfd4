//! Rotate, scale, pad and crop one photo so its eyes land on the reference geometry.
//!
//! The geometry is computed up front in an [`AlignmentPlan`], then applied to the
//! pixels. Landmark overlays reuse the same plan, so drawn markers and pixels can
//! not drift apart.

use std::path::Path;

use image::{imageops::{self, FilterType}, Rgb, RgbImage};
use imageproc::{drawing::draw_filled_circle_mut, geometric_transformations::{warp_into, Interpolation, Projection}};
use serde::Serialize;

use crate::{
    domain::image::Point,
    error::{RsError, RsResult},
    tools::{geometry::{rotate_vector, EyeGeometry}, log::{log_warn, LogServiceType}},
};

use super::{open_rgb, save_jpeg, reference::ReferenceGeometry};

/// Floor for the measured eye distance, avoids dividing by zero on degenerate landmarks.
pub const MIN_EYE_DISTANCE: f64 = 1e-6;
/// Largest intermediate image we agree to allocate (16383 x 16383).
pub const MAX_PIXELS: u64 = 0x3FFF * 0x3FFF;
pub const LANDMARK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const LANDMARK_RADIUS: i32 = 2;

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransformParameters {
    pub rotation_deg: f64,
    pub scale: f64,
    /// Eye midpoint in source pixels.
    pub eye_center: Point,
}

impl TransformParameters {
    pub fn compute(landmarks: &[Point], width: u32, height: u32, reference: &ReferenceGeometry) -> RsResult<Self> {
        let eyes = EyeGeometry::from_landmarks(landmarks, width, height)?;
        let rotation_deg = -eyes.angle().to_degrees();
        let scale = reference.target_eye_distance / eyes.distance().max(MIN_EYE_DISTANCE);
        Ok(Self {
            rotation_deg,
            scale,
            eye_center: eyes.midpoint(),
        })
    }

    pub fn rotation_radians(&self) -> f64 {
        self.rotation_deg.to_radians()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignOptions {
    pub output_width: u32,
    pub output_height: u32,
    pub include_landmarks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentPlan {
    pub params: TransformParameters,
    pub source_width: u32,
    pub source_height: u32,
    pub rotated_width: u32,
    pub rotated_height: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_width: u32,
    pub pad_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub rotated_eye_center: Point,
    pub scaled_eye_center: Point,
    pub crop_left: u32,
    pub crop_top: u32,
    /// The wanted crop origin was negative and got clamped to 0, the frame is off target.
    pub clamped: bool,
}

impl AlignmentPlan {
    pub fn new(params: TransformParameters, width: u32, height: u32, reference: &ReferenceGeometry, output_width: u32, output_height: u32) -> RsResult<Self> {
        if width == 0 || height == 0 {
            return Err(RsError::InvalidImageSize { width, height });
        }
        if output_width == 0 || output_height == 0 {
            return Err(RsError::InvalidImageSize { width: output_width, height: output_height });
        }

        let (sin, cos) = params.rotation_radians().sin_cos();
        let (w, h) = (width as f64, height as f64);
        let rotated_width = ((w * cos.abs() + h * sin.abs()).round() as u32).max(1);
        let rotated_height = ((w * sin.abs() + h * cos.abs()).round() as u32).max(1);

        let scaled_width = (rotated_width as f64 * params.scale).round();
        let scaled_height = (rotated_height as f64 * params.scale).round();
        if !(scaled_width >= 1.0 && scaled_height >= 1.0) || scaled_width * scaled_height > MAX_PIXELS as f64 {
            return Err(RsError::InvalidImageSize { width: scaled_width as u32, height: scaled_height as u32 });
        }
        let (scaled_width, scaled_height) = (scaled_width as u32, scaled_height as u32);

        let mut plan = Self {
            params,
            source_width: width,
            source_height: height,
            rotated_width,
            rotated_height,
            scaled_width,
            scaled_height,
            pad_width: output_width,
            pad_height: output_height,
            output_width,
            output_height,
            rotated_eye_center: Point::default(),
            scaled_eye_center: Point::default(),
            crop_left: 0,
            crop_top: 0,
            clamped: false,
        };
        plan.rotated_eye_center = plan.rotate_point(&params.eye_center);
        plan.scaled_eye_center = Point::new(plan.rotated_eye_center.x * params.scale, plan.rotated_eye_center.y * params.scale);

        let target = reference.target_eye_center;
        let left = (plan.scaled_eye_center.x + plan.pad_width as f64 - target.x).round() as i64;
        let top = (plan.scaled_eye_center.y + plan.pad_height as f64 - target.y).round() as i64;
        plan.clamped = left < 0 || top < 0;
        let (left, top) = (left.max(0), top.max(0));

        let padded_width = scaled_width as i64 + 2 * plan.pad_width as i64;
        let padded_height = scaled_height as i64 + 2 * plan.pad_height as i64;
        if left + output_width as i64 > padded_width || top + output_height as i64 > padded_height {
            return Err(RsError::CropOutOfBounds { left, top });
        }
        plan.crop_left = left as u32;
        plan.crop_top = top as u32;
        Ok(plan)
    }

    /// Source pixel -> pixel of the rotated, expanded canvas.
    pub fn rotate_point(&self, point: &Point) -> Point {
        let dx = point.x - self.source_width as f64 / 2.0;
        let dy = point.y - self.source_height as f64 / 2.0;
        let (dx_rot, dy_rot) = rotate_vector(dx, dy, self.params.rotation_radians());
        Point::new(self.rotated_width as f64 / 2.0 + dx_rot, self.rotated_height as f64 / 2.0 + dy_rot)
    }

    /// Source pixel -> output frame pixel.
    pub fn project(&self, point: &Point) -> Point {
        let rotated = self.rotate_point(point);
        Point::new(
            rotated.x * self.params.scale + self.pad_width as f64 - self.crop_left as f64,
            rotated.y * self.params.scale + self.pad_height as f64 - self.crop_top as f64,
        )
    }

    pub fn project_normalized(&self, point: &Point) -> Point {
        self.project(&point.to_pixels(self.source_width, self.source_height))
    }

    pub fn projected_eye_center(&self) -> Point {
        self.project(&self.params.eye_center)
    }
}

pub fn rotate_expanded(image: &RgbImage, plan: &AlignmentPlan) -> RgbImage {
    if plan.params.rotation_deg == 0.0 && image.dimensions() == (plan.rotated_width, plan.rotated_height) {
        return image.clone();
    }
    let projection = Projection::translate(plan.rotated_width as f32 / 2.0, plan.rotated_height as f32 / 2.0)
        * Projection::rotate(plan.params.rotation_radians() as f32)
        * Projection::translate(-(plan.source_width as f32) / 2.0, -(plan.source_height as f32) / 2.0);
    let mut rotated = RgbImage::new(plan.rotated_width, plan.rotated_height);
    warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut rotated);
    rotated
}

pub fn scale_image(image: &RgbImage, plan: &AlignmentPlan) -> RgbImage {
    if image.dimensions() == (plan.scaled_width, plan.scaled_height) {
        return image.clone();
    }
    imageops::resize(image, plan.scaled_width, plan.scaled_height, FilterType::Lanczos3)
}

/// Pads by the output size on every side and extracts the output window.
/// The padded canvas is never allocated: only the part of the scaled image under the window is copied.
pub fn pad_and_crop(image: &RgbImage, plan: &AlignmentPlan) -> RgbImage {
    let mut frame = RgbImage::new(plan.output_width, plan.output_height);
    let x = plan.pad_width as i64 - plan.crop_left as i64;
    let y = plan.pad_height as i64 - plan.crop_top as i64;
    imageops::replace(&mut frame, image, x, y);
    frame
}

pub fn draw_landmarks(frame: &mut RgbImage, landmarks: &[Point], plan: &AlignmentPlan) {
    for landmark in landmarks {
        let projected = plan.project_normalized(landmark);
        draw_filled_circle_mut(frame, (projected.x.round() as i32, projected.y.round() as i32), LANDMARK_RADIUS, LANDMARK_COLOR);
    }
}

pub struct AlignedFrame {
    pub image: RgbImage,
    pub plan: AlignmentPlan,
}

pub fn align_image(source: &RgbImage, landmarks: &[Point], reference: &ReferenceGeometry, options: &AlignOptions) -> RsResult<AlignedFrame> {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(RsError::InvalidImageSize { width, height });
    }
    let params = TransformParameters::compute(landmarks, width, height, reference)?;
    let plan = AlignmentPlan::new(params, width, height, reference, options.output_width, options.output_height)?;

    let rotated = rotate_expanded(source, &plan);
    let scaled = scale_image(&rotated, &plan);
    drop(rotated);
    let mut image = pad_and_crop(&scaled, &plan);
    if options.include_landmarks {
        draw_landmarks(&mut image, landmarks, &plan);
    }
    Ok(AlignedFrame { image, plan })
}

/// Aligns the photo at `input` and writes the frame to `output` as jpeg.
/// Every failure is reported as `AlignmentFailed(image_id, cause)`.
pub fn align_file(image_id: &str, input: &Path, output: &Path, landmarks: &[Point], reference: &ReferenceGeometry, options: &AlignOptions) -> RsResult<AlignmentPlan> {
    let run = || -> RsResult<AlignmentPlan> {
        let source = open_rgb(input)?;
        let frame = align_image(&source, landmarks, reference, options)?;
        save_jpeg(&frame.image, output)?;
        Ok(frame.plan)
    };
    let plan = run().map_err(|error| match error {
        RsError::AlignmentFailed(..) => error,
        other => RsError::AlignmentFailed(image_id.to_string(), other.client_message()),
    })?;
    if plan.clamped {
        log_warn(LogServiceType::Render, format!("Crop origin clamped for {}, frame is shifted off the reference", image_id));
    }
    Ok(plan)
}
