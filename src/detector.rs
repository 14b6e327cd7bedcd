use std::{
    collections::VecDeque,
    sync::mpsc::{self, Sender},
    thread::{self, JoinHandle},
};

use log::{debug, warn};

use crate::{
    camera::{PixelBuffer, PixelFormat},
    error::PipelineError,
    tracking::HandLandmarks,
};

/// Monotonic id given to every frame accepted by the pipeline
pub type FrameId = u64;

#[derive(Debug, Clone)]
pub enum DetectorOutput {
    /// Landmarks for the hand found in the given frame
    Landmarks {
        frame_id: FrameId,
        landmarks: HandLandmarks,
    },
    /// Auxiliary annotated-image channel; nothing consumes it yet
    PixelBuffer { frame_id: FrameId, buffer: PixelBuffer },
}

/// Hand-landmark detector. Results are delivered asynchronously on the
/// channel given to `start`, never from within `process_frame`.
pub trait LandmarkDetector: Send {
    /// The pixel format `process_frame` accepts
    fn required_format(&self) -> PixelFormat {
        PixelFormat::Bgra32
    }

    /// Called once, before the first frame
    fn start(&mut self, output: Sender<DetectorOutput>) -> Result<(), PipelineError>;

    fn process_frame(&mut self, frame_id: FrameId, buffer: &PixelBuffer)
        -> Result<(), PipelineError>;
}

struct Job {
    frame_id: FrameId,
    landmarks: Option<HandLandmarks>,
    buffer: Option<PixelBuffer>,
}

/// Replays pre-recorded landmarks, one entry per processed frame, from its
/// own delivery thread. `None` entries are frames with no hand in view.
pub struct ScriptedDetector {
    script: VecDeque<Option<HandLandmarks>>,
    emit_pixel_buffers: bool,
    jobs: Option<Sender<Job>>,
    delivery: Option<JoinHandle<()>>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Option<HandLandmarks>>) -> Self {
        ScriptedDetector {
            script: VecDeque::from(script),
            emit_pixel_buffers: false,
            jobs: None,
            delivery: None,
        }
    }

    /// Also echo every processed frame on the pixel-buffer channel
    pub fn with_pixel_output(mut self, enabled: bool) -> Self {
        self.emit_pixel_buffers = enabled;
        self
    }
}

impl LandmarkDetector for ScriptedDetector {
    fn start(&mut self, output: Sender<DetectorOutput>) -> Result<(), PipelineError> {
        if self.jobs.is_some() {
            return Err(PipelineError::Detector(String::from("already started")));
        }
        let (tx, rx) = mpsc::channel::<Job>();
        let delivery = thread::Builder::new()
            .name(String::from("landmark-delivery"))
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    if let Some(buffer) = job.buffer {
                        let _ = output.send(DetectorOutput::PixelBuffer {
                            frame_id: job.frame_id,
                            buffer,
                        });
                    }
                    if let Some(landmarks) = job.landmarks {
                        if output
                            .send(DetectorOutput::Landmarks {
                                frame_id: job.frame_id,
                                landmarks,
                            })
                            .is_err()
                        {
                            debug!("Landmark consumer gone; stopping delivery");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| PipelineError::Detector(format!("failed to spawn delivery: {}", e)))?;
        self.jobs = Some(tx);
        self.delivery = Some(delivery);
        Ok(())
    }

    fn process_frame(
        &mut self,
        frame_id: FrameId,
        buffer: &PixelBuffer,
    ) -> Result<(), PipelineError> {
        if buffer.format != self.required_format() {
            return Err(PipelineError::UnsupportedPixelFormat {
                found: buffer.format,
                required: self.required_format(),
            });
        }
        let jobs = self
            .jobs
            .as_ref()
            .ok_or_else(|| PipelineError::Detector(String::from("not started")))?;
        let landmarks = self.script.pop_front().flatten();
        if landmarks.is_none() {
            debug!("No hand in frame {}", frame_id);
        }
        jobs.send(Job {
            frame_id,
            landmarks,
            buffer: self.emit_pixel_buffers.then(|| buffer.clone()),
        })
        .map_err(|_| PipelineError::Detector(String::from("delivery thread stopped")))
    }
}

impl Drop for ScriptedDetector {
    fn drop(&mut self) {
        // Closing the job queue lets the delivery thread drain and exit
        self.jobs = None;
        if let Some(delivery) = self.delivery.take() {
            if delivery.join().is_err() {
                warn!("Landmark delivery thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::Landmark;

    fn bgra() -> PixelBuffer {
        PixelBuffer {
            format: PixelFormat::Bgra32,
            width: 1,
            height: 1,
            planes: vec![vec![0, 0, 0, 255]],
        }
    }

    #[test]
    fn test_results_arrive_on_channel_in_order() {
        let (tx, rx) = mpsc::channel();
        let mut detector = ScriptedDetector::new(vec![
            Some(vec![Landmark::new(0.1, 0.1)]),
            None,
            Some(vec![Landmark::new(0.2, 0.2)]),
        ]);
        detector.start(tx).unwrap();
        for frame_id in 1..=4 {
            detector.process_frame(frame_id, &bgra()).unwrap();
        }
        drop(detector);

        let frame_ids: Vec<FrameId> = rx
            .iter()
            .map(|output| match output {
                DetectorOutput::Landmarks { frame_id, .. } => frame_id,
                DetectorOutput::PixelBuffer { frame_id, .. } => frame_id,
            })
            .collect();
        assert_eq!(frame_ids, vec![1, 3]);
    }

    #[test]
    fn test_pixel_side_channel() {
        let (tx, rx) = mpsc::channel();
        let mut detector = ScriptedDetector::new(vec![None]).with_pixel_output(true);
        detector.start(tx).unwrap();
        detector.process_frame(7, &bgra()).unwrap();
        drop(detector);
        let outputs: Vec<DetectorOutput> = rx.iter().collect();
        assert_eq!(outputs.len(), 1);
        assert!(matches!(
            outputs[0],
            DetectorOutput::PixelBuffer { frame_id: 7, .. }
        ));
    }

    #[test]
    fn test_rejects_wrong_format_and_unstarted() {
        let mut detector = ScriptedDetector::new(vec![]);
        assert!(matches!(
            detector.process_frame(1, &bgra()),
            Err(PipelineError::Detector(_))
        ));

        let (tx, _rx) = mpsc::channel();
        detector.start(tx).unwrap();
        let grey = PixelBuffer::ycbcr_filled(2, 2, 128, 128, 128);
        assert!(matches!(
            detector.process_frame(1, &grey),
            Err(PipelineError::UnsupportedPixelFormat { .. })
        ));
    }
}
