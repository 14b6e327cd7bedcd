use serde::{Deserialize, Serialize};

/// Landmark index of the index fingertip, as per the 21-point hand model
pub const INDEX_FINGER_TIP: usize = 8;

/// A single hand keypoint, normalised to [0,1] in the camera image
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Landmark { x, y, z: 0. }
    }
}

/// All landmarks for one detected hand, in detector order
pub type HandLandmarks = Vec<Landmark>;

/// Normalised location in image space, already oriented to match the viewport
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ImageLocation {
    pub x: f32,
    pub y: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub fn new(x: f32, y: f32) -> Self {
        ScreenPoint { x, y }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Size { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0. || self.height <= 0.
    }
}

/// Native resolution of the camera images, in pixels
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageResolution {
    pub width: u32,
    pub height: u32,
}

impl ImageResolution {
    pub fn new(width: u32, height: u32) -> Self {
        ImageResolution { width, height }
    }

    /// Height over width
    pub fn aspect(&self) -> f32 {
        self.height as f32 / self.width as f32
    }
}

/// Axis-aligned rectangle in screen space
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        ScreenRect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, p: &ScreenPoint) -> bool {
        p.x >= self.x && p.y >= self.y && p.x <= self.x + self.width && p.y <= self.y + self.height
    }
}

/// How the detector's landmark axes relate to the on-screen image axes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LandmarkOrientation {
    /// Camera buffers are landscape while the viewport is portrait, so the
    /// axes are swapped and the horizontal one flipped
    RotatedPortrait,
    AsIs,
}

impl LandmarkOrientation {
    pub fn image_location(&self, landmark: &Landmark) -> ImageLocation {
        match self {
            LandmarkOrientation::RotatedPortrait => ImageLocation {
                x: 1.0 - landmark.y,
                y: landmark.x,
            },
            LandmarkOrientation::AsIs => ImageLocation {
                x: landmark.x,
                y: landmark.y,
            },
        }
    }
}

/// Pick the pointer landmark out of a detected hand; None if the detector
/// returned too few landmarks
pub fn fingertip_location(
    landmarks: &[Landmark],
    index: usize,
    orientation: LandmarkOrientation,
) -> Option<ImageLocation> {
    landmarks
        .get(index)
        .map(|landmark| orientation.image_location(landmark))
}
