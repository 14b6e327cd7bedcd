use log::debug;
use map_range::MapRange;

use crate::tracking::{ImageLocation, ImageResolution, ScreenPoint, Size};

/// Maps normalised image locations into viewport pixels.
///
/// The camera image is scaled to fill the viewport height and cropped
/// equally on the left and right, so its on-screen width is generally
/// larger than the viewport's.
pub struct CoordinateMapper {
    camera_resolution: ImageResolution,
    viewport: Option<Size>,
}

impl CoordinateMapper {
    pub fn new(camera_resolution: ImageResolution) -> Self {
        CoordinateMapper {
            camera_resolution,
            viewport: None,
        }
    }

    pub fn update_viewport(&mut self, viewport: Size) {
        debug!("Viewport updated to {}x{}", viewport.width, viewport.height);
        self.viewport = Some(viewport);
    }

    pub fn viewport(&self) -> Option<Size> {
        self.viewport
    }

    /// Only usable after the first layout pass has produced a non-empty viewport
    pub fn is_ready(&self) -> bool {
        self.viewport.is_some_and(|v| !v.is_empty())
    }

    pub fn to_screen(&self, location: ImageLocation) -> Option<ScreenPoint> {
        match self.viewport {
            Some(viewport) if !viewport.is_empty() => Some(image_to_screen(
                location,
                viewport,
                self.camera_resolution.aspect(),
            )),
            _ => None,
        }
    }
}

/// `camera_aspect` is the camera image height over its width
pub fn image_to_screen(location: ImageLocation, viewport: Size, camera_aspect: f32) -> ScreenPoint {
    let image_width_in_screen = viewport.height * camera_aspect;
    let x_offset = (image_width_in_screen - viewport.width) / 2.;

    ScreenPoint {
        x: location
            .x
            .map_range(0. ..1., -x_offset..image_width_in_screen - x_offset),
        y: location.y.map_range(0. ..1., 0. ..viewport.height),
    }
}
