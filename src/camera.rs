use std::{thread, time::Duration};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::PipelineError,
    pipeline::{FrameSender, Submission},
    scene::PlaneDetection,
    session_config::TrackingReset,
    tracking::ImageResolution,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PixelFormat {
    /// Luma plane plus an interleaved, half-resolution CbCr plane (full range)
    YCbCr420BiPlanarFullRange,
    Bgra32,
    /// Single 8-bit channel, e.g. segmentation masks
    OneComponent8,
}

#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<Vec<u8>>,
}

fn chroma_width(width: u32) -> usize {
    (width as usize).div_ceil(2)
}

fn chroma_height(height: u32) -> usize {
    (height as usize).div_ceil(2)
}

impl PixelBuffer {
    /// A uniformly coloured bi-planar YCbCr buffer
    pub fn ycbcr_filled(width: u32, height: u32, y: u8, cb: u8, cr: u8) -> Self {
        let luma = vec![y; width as usize * height as usize];
        let chroma = [cb, cr].repeat(chroma_width(width) * chroma_height(height));
        PixelBuffer {
            format: PixelFormat::YCbCr420BiPlanarFullRange,
            width,
            height,
            planes: vec![luma, chroma],
        }
    }

    /// BGRA value at the pixel, for BGRA buffers only
    pub fn bgra_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if self.format != PixelFormat::Bgra32 || x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let data = self.planes.first()?;
        Some([data[i], data[i + 1], data[i + 2], data[i + 3]])
    }
}

/// One camera image as delivered by the frame source
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub pixel_buffer: PixelBuffer,
    pub capture_timestamp: Duration,
    pub video_format: ImageResolution,
}

/// Options the frame source runs its session with, resolved from the
/// session config and the device's capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub plane_detection: PlaneDetection,
    pub person_segmentation: bool,
    pub tracking_reset: TrackingReset,
}

/// The camera session: pushes frames into the pipeline, one at a time.
pub trait FrameSource {
    fn video_format(&self) -> ImageResolution;

    fn pixel_format(&self) -> PixelFormat;

    fn supports_person_segmentation(&self) -> bool;

    /// Run the session until the source is exhausted or the pipeline closes
    fn run(&mut self, options: &RunOptions, frames: FrameSender) -> Result<(), PipelineError>;
}

/// Converts camera buffers into the pixel format the landmark detector
/// requires. Construction fails if that conversion is impossible.
#[derive(Debug, Clone, Copy)]
pub struct BgraConverter {
    source: PixelFormat,
}

impl BgraConverter {
    pub fn new(source: PixelFormat, required: PixelFormat) -> Result<Self, PipelineError> {
        match (source, required) {
            (PixelFormat::YCbCr420BiPlanarFullRange | PixelFormat::Bgra32, PixelFormat::Bgra32) => {
                Ok(BgraConverter { source })
            }
            (found, required) => Err(PipelineError::UnsupportedPixelFormat { found, required }),
        }
    }

    pub fn convert(&self, buffer: &PixelBuffer) -> Result<PixelBuffer, PipelineError> {
        if buffer.format != self.source {
            return Err(PipelineError::UnsupportedPixelFormat {
                found: buffer.format,
                required: self.source,
            });
        }
        match buffer.format {
            PixelFormat::Bgra32 => Ok(buffer.clone()),
            PixelFormat::YCbCr420BiPlanarFullRange => ycbcr_to_bgra(buffer),
            found => Err(PipelineError::UnsupportedPixelFormat {
                found,
                required: PixelFormat::Bgra32,
            }),
        }
    }
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0., 255.) as u8
}

/// BT.601 full-range conversion
fn ycbcr_to_bgra(buffer: &PixelBuffer) -> Result<PixelBuffer, PipelineError> {
    let width = buffer.width as usize;
    let height = buffer.height as usize;
    let chroma_stride = chroma_width(buffer.width) * 2;

    let (luma, chroma) = match buffer.planes.as_slice() {
        [luma, chroma] => (luma, chroma),
        planes => {
            return Err(PipelineError::MalformedPixelBuffer(format!(
                "expected 2 planes, got {}",
                planes.len()
            )));
        }
    };
    if luma.len() < width * height || chroma.len() < chroma_stride * chroma_height(buffer.height) {
        return Err(PipelineError::MalformedPixelBuffer(format!(
            "planes too small for {}x{}",
            width, height
        )));
    }

    let mut bgra = Vec::with_capacity(width * height * 4);
    for row in 0..height {
        for col in 0..width {
            let y = luma[row * width + col] as f32;
            let c = (row / 2) * chroma_stride + (col / 2) * 2;
            let cb = chroma[c] as f32 - 128.;
            let cr = chroma[c + 1] as f32 - 128.;

            let r = y + 1.402 * cr;
            let g = y - 0.344_136 * cb - 0.714_136 * cr;
            let b = y + 1.772 * cb;
            bgra.extend_from_slice(&[clamp_to_u8(b), clamp_to_u8(g), clamp_to_u8(r), 255]);
        }
    }

    Ok(PixelBuffer {
        format: PixelFormat::Bgra32,
        width: buffer.width,
        height: buffer.height,
        planes: vec![bgra],
    })
}

/// Produces a fixed number of plain grey frames at a steady rate; stands in
/// for a camera when replaying recorded landmarks.
pub struct SyntheticFrameSource {
    video_format: ImageResolution,
    buffer_size: ImageResolution,
    frame_count: usize,
    interval: Duration,
    block_when_busy: bool,
}

impl SyntheticFrameSource {
    pub fn new(video_format: ImageResolution, frame_count: usize, interval: Duration) -> Self {
        SyntheticFrameSource {
            video_format,
            // Small buffers keep conversion cheap; only the video format's
            // aspect ratio matters downstream
            buffer_size: ImageResolution::new(
                (video_format.width / 8).max(2),
                (video_format.height / 8).max(2),
            ),
            frame_count,
            interval,
            block_when_busy: false,
        }
    }

    /// Wait for the worker instead of dropping frames while it is busy
    pub fn block_when_busy(mut self, block: bool) -> Self {
        self.block_when_busy = block;
        self
    }
}

impl FrameSource for SyntheticFrameSource {
    fn video_format(&self) -> ImageResolution {
        self.video_format
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::YCbCr420BiPlanarFullRange
    }

    fn supports_person_segmentation(&self) -> bool {
        false
    }

    fn run(&mut self, options: &RunOptions, frames: FrameSender) -> Result<(), PipelineError> {
        info!(
            "Synthetic session running {} frames; options {:?}",
            self.frame_count, options
        );
        let mut dropped = 0;
        for i in 0..self.frame_count {
            let frame = CameraFrame {
                pixel_buffer: PixelBuffer::ycbcr_filled(
                    self.buffer_size.width,
                    self.buffer_size.height,
                    128,
                    128,
                    128,
                ),
                capture_timestamp: self.interval * i as u32,
                video_format: self.video_format,
            };
            if self.block_when_busy {
                frames.submit_blocking(frame)?;
            } else if let Submission::Dropped = frames.submit(frame)? {
                dropped += 1;
            }
            if !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
        }
        debug!("Synthetic session finished; {} frames dropped", dropped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ycbcr_converter() -> BgraConverter {
        BgraConverter::new(PixelFormat::YCbCr420BiPlanarFullRange, PixelFormat::Bgra32).unwrap()
    }

    #[test]
    fn test_grey_stays_grey() {
        let converter = ycbcr_converter();
        let bgra = converter
            .convert(&PixelBuffer::ycbcr_filled(4, 2, 128, 128, 128))
            .unwrap();
        assert_eq!(bgra.format, PixelFormat::Bgra32);
        assert_eq!(bgra.planes[0].len(), 4 * 2 * 4);
        assert_eq!(bgra.bgra_at(3, 1), Some([128, 128, 128, 255]));
    }

    #[test]
    fn test_strong_red_chroma() {
        let converter = ycbcr_converter();
        // Pure red in BT.601 full range is roughly (76, 85, 255)
        let bgra = converter
            .convert(&PixelBuffer::ycbcr_filled(2, 2, 76, 85, 255))
            .unwrap();
        let [b, g, r, a] = bgra.bgra_at(0, 0).unwrap();
        assert!(r >= 250, "r = {}", r);
        assert!(g <= 5, "g = {}", g);
        assert!(b <= 5, "b = {}", b);
        assert_eq!(a, 255);
    }

    #[test]
    fn test_odd_dimensions() {
        let converter = ycbcr_converter();
        let bgra = converter
            .convert(&PixelBuffer::ycbcr_filled(3, 3, 200, 128, 128))
            .unwrap();
        assert_eq!(bgra.bgra_at(2, 2), Some([200, 200, 200, 255]));
    }

    #[test]
    fn test_unsupported_source_fails_fast() {
        assert!(matches!(
            BgraConverter::new(PixelFormat::OneComponent8, PixelFormat::Bgra32),
            Err(PipelineError::UnsupportedPixelFormat {
                found: PixelFormat::OneComponent8,
                required: PixelFormat::Bgra32
            })
        ));
        assert!(BgraConverter::new(PixelFormat::Bgra32, PixelFormat::OneComponent8).is_err());
    }

    #[test]
    fn test_frame_in_unexpected_format() {
        let converter = ycbcr_converter();
        let mask = PixelBuffer {
            format: PixelFormat::OneComponent8,
            width: 2,
            height: 2,
            planes: vec![vec![0; 4]],
        };
        assert!(matches!(
            converter.convert(&mask),
            Err(PipelineError::UnsupportedPixelFormat { .. })
        ));
    }

    #[test]
    fn test_truncated_planes() {
        let converter = ycbcr_converter();
        let mut buffer = PixelBuffer::ycbcr_filled(4, 4, 128, 128, 128);
        buffer.planes[1].truncate(2);
        assert!(matches!(
            converter.convert(&buffer),
            Err(PipelineError::MalformedPixelBuffer(_))
        ));
    }
}
