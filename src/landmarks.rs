//! Hand landmark types at the provider boundary.
//!
//! The landmark provider streams one JSON line per video frame; each hand
//! is 21 ordered points in normalized image coordinates plus a handedness
//! label. Everything here is validated before it reaches the classifier.

use serde::Deserialize;
use thiserror::Error;

pub const LANDMARK_COUNT: usize = 21;

// MediaPipe hand skeleton indices (only the ones classification reads).
pub const WRIST: usize = 0;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum HandLabel {
    Left,
    Right,
    #[serde(other)]
    Unknown,
}

impl HandLabel {
    /// Mirror Left/Right, for webcams that deliver a flipped image.
    pub fn swapped(self) -> Self {
        match self {
            HandLabel::Left => HandLabel::Right,
            HandLabel::Right => HandLabel::Left,
            HandLabel::Unknown => HandLabel::Unknown,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PoseError {
    #[error("expected {LANDMARK_COUNT} landmarks, got {0}")]
    WrongPointCount(usize),
    #[error("landmark {0} has a non-finite coordinate")]
    NonFinite(usize),
}

/// One hand's full 21-point snapshot for one frame. Construction
/// validates shape and coordinates; a `HandPose` is never partial.
#[derive(Debug, Clone, PartialEq)]
pub struct HandPose {
    points: [Point; LANDMARK_COUNT],
}

impl HandPose {
    pub fn from_points(points: &[Point]) -> Result<Self, PoseError> {
        let points: [Point; LANDMARK_COUNT] = points
            .try_into()
            .map_err(|_| PoseError::WrongPointCount(points.len()))?;
        if let Some(bad) = points.iter().position(|p| !p.is_finite()) {
            return Err(PoseError::NonFinite(bad));
        }
        Ok(Self { points })
    }

    pub fn point(&self, idx: usize) -> &Point {
        &self.points[idx]
    }

    pub fn wrist(&self) -> &Point {
        &self.points[WRIST]
    }
}

/// One hand as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct HandObservation {
    pub label: HandLabel,
    pub points: Vec<[f32; 3]>,
}

impl HandObservation {
    pub fn pose(&self) -> Result<HandPose, PoseError> {
        let pts: Vec<Point> = self
            .points
            .iter()
            .map(|p| Point::new(p[0], p[1], p[2]))
            .collect();
        HandPose::from_points(&pts)
    }
}

/// One provider frame: pixel dimensions plus zero or more hands.
#[derive(Debug, Clone, Deserialize)]
pub struct LandmarkFrame {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub hands: Vec<HandObservation>,
}
