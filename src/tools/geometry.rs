use crate::{domain::image::Point, error::{RsError, RsResult}};

/// Outer and inner corner of the left eye in the 468 point face mesh.
pub const LEFT_EYE_INDICES: [usize; 2] = [33, 133];
/// Inner and outer corner of the right eye in the 468 point face mesh.
pub const RIGHT_EYE_INDICES: [usize; 2] = [362, 263];

pub fn center(points: &[Point], indices: &[usize]) -> RsResult<Point> {
    if indices.is_empty() {
        return Err(RsError::EmptyIndexSet);
    }
    let mut x = 0.0;
    let mut y = 0.0;
    for &index in indices {
        let point = points.get(index).ok_or(RsError::LandmarkIndexOutOfRange { index, len: points.len() })?;
        x += point.x;
        y += point.y;
    }
    let count = indices.len() as f64;
    Ok(Point::new(x / count, y / count))
}

pub fn distance(p1: &Point, p2: &Point) -> f64 {
    (p2.x - p1.x).hypot(p2.y - p1.y)
}

/// Angle of the vector p1 -> p2 in radians.
pub fn angle(p1: &Point, p2: &Point) -> f64 {
    (p2.y - p1.y).atan2(p2.x - p1.x)
}

pub fn midpoint(p1: &Point, p2: &Point) -> Point {
    Point::new((p1.x + p2.x) / 2.0, (p1.y + p2.y) / 2.0)
}

/// Rotates a vector by `radians` (clockwise on screen, y pointing down).
pub fn rotate_vector(dx: f64, dy: f64, radians: f64) -> (f64, f64) {
    let (sin, cos) = radians.sin_cos();
    (dx * cos - dy * sin, dx * sin + dy * cos)
}

/// Eye centers of one face, in pixel space of its source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeGeometry {
    pub left: Point,
    pub right: Point,
}

impl EyeGeometry {
    pub fn from_landmarks(landmarks: &[Point], width: u32, height: u32) -> RsResult<Self> {
        let left = center(landmarks, &LEFT_EYE_INDICES)?.to_pixels(width, height);
        let right = center(landmarks, &RIGHT_EYE_INDICES)?.to_pixels(width, height);
        Ok(Self { left, right })
    }

    pub fn distance(&self) -> f64 {
        distance(&self.left, &self.right)
    }

    pub fn angle(&self) -> f64 {
        angle(&self.left, &self.right)
    }

    pub fn midpoint(&self) -> Point {
        midpoint(&self.left, &self.right)
    }
}
